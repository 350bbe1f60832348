//! Validated experiment configuration

use crate::schema::{RawConfig, RawInspectorConfig, RawOrchestratorConfig};
use crate::validation::parse_listen;
use aftershock_util::{millis_or_unlimited, DEFAULT_INSPECTOR_LISTEN};
use serde_json::{Map, Value};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default exploration policy
pub const DEFAULT_EXPLORE_POLICY: &str = "random";

/// Default deadline for a single outstanding occurrence
pub const DEFAULT_DECISION_TIMEOUT_MS: u64 = 30_000;

/// Validated configuration ready for a run
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Workload scripts, relative to the materials directory
    pub scripts: Scripts,

    /// Keep leftovers when validation fails
    pub not_clean_if_validation_fail: bool,

    /// Exploration policy name
    pub explore_policy: String,

    /// Parameters handed verbatim to the exploration policy
    pub explore_policy_param: Map<String, Value>,

    pub inspector: InspectorConfig,

    pub orchestrator: OrchestratorConfig,
}

impl ExperimentConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let explore_policy_param = match serde_json::to_value(&raw.explore_policy_param) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        Self {
            scripts: Scripts {
                run: raw.run,
                validate: raw.validate,
                clean: raw.clean,
            },
            not_clean_if_validation_fail: raw.not_clean_if_validation_fail,
            explore_policy: raw
                .explore_policy
                .unwrap_or_else(|| DEFAULT_EXPLORE_POLICY.to_string()),
            explore_policy_param,
            inspector: InspectorConfig::from_raw(raw.inspector),
            orchestrator: OrchestratorConfig::from_raw(raw.orchestrator),
        }
    }
}

/// Workload scripts
#[derive(Debug, Clone)]
pub struct Scripts {
    pub run: String,
    pub validate: Option<String>,
    pub clean: Option<String>,
}

/// Inspector listener configuration
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    pub listen: SocketAddr,
    pub emulate_rest: bool,
}

impl InspectorConfig {
    fn from_raw(raw: RawInspectorConfig) -> Self {
        let listen = raw
            .listen
            .as_deref()
            .and_then(|s| parse_listen(s).ok())
            .unwrap_or_else(default_listen);

        Self {
            listen,
            emulate_rest: raw.emulate_rest,
        }
    }
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            emulate_rest: false,
        }
    }
}

fn default_listen() -> SocketAddr {
    parse_listen(DEFAULT_INSPECTOR_LISTEN)
        .unwrap_or_else(|_| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 10000)))
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for a single outstanding occurrence. None means unlimited.
    pub decision_timeout: Option<Duration>,
}

impl OrchestratorConfig {
    fn from_raw(raw: RawOrchestratorConfig) -> Self {
        Self {
            decision_timeout: millis_or_unlimited(
                raw.decision_timeout_ms.unwrap_or(DEFAULT_DECISION_TIMEOUT_MS),
            ),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            decision_timeout: Some(Duration::from_millis(DEFAULT_DECISION_TIMEOUT_MS)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(s: &str) -> ExperimentConfig {
        ExperimentConfig::from_raw(toml::from_str(s).unwrap())
    }

    #[test]
    fn defaults_apply() {
        let config = from_toml("config_version = 1\nrun = \"run.sh\"");
        assert_eq!(config.explore_policy, "random");
        assert_eq!(config.inspector.listen.port(), 10000);
        assert!(!config.inspector.emulate_rest);
        assert_eq!(
            config.orchestrator.decision_timeout,
            Some(Duration::from_secs(30))
        );
        assert!(config.explore_policy_param.is_empty());
    }

    #[test]
    fn zero_timeout_means_unlimited() {
        let config = from_toml(
            "config_version = 1\nrun = \"run.sh\"\n[orchestrator]\ndecision_timeout_ms = 0",
        );
        assert_eq!(config.orchestrator.decision_timeout, None);
    }

    #[test]
    fn policy_params_become_json() {
        let config = from_toml(
            r#"
            config_version = 1
            run = "run.sh"
            explore_policy = "dumb"

            [explore_policy_param]
            interval = 25

            [explore_policy_param.killRatePerEntity]
            zk1 = 20
            "#,
        );
        assert_eq!(config.explore_policy, "dumb");
        assert_eq!(config.explore_policy_param["interval"], 25);
        assert_eq!(config.explore_policy_param["killRatePerEntity"]["zk1"], 20);
    }
}
