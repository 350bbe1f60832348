//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};

/// Raw experiment configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Workload script, relative to the materials directory
    pub run: String,

    /// Script deciding whether the run behaved correctly (exit status 0)
    pub validate: Option<String>,

    /// Script cleaning up after a run
    pub clean: Option<String>,

    /// Keep the run's leftovers around when validation fails
    #[serde(default)]
    pub not_clean_if_validation_fail: bool,

    /// Exploration policy name (default: "random")
    pub explore_policy: Option<String>,

    /// Free-form parameters handed to the exploration policy
    #[serde(default)]
    pub explore_policy_param: toml::Table,

    /// Inspector listener settings
    #[serde(default)]
    pub inspector: RawInspectorConfig,

    /// Orchestrator settings
    #[serde(default)]
    pub orchestrator: RawOrchestratorConfig,
}

/// Inspector listener settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawInspectorConfig {
    /// Listen address (default: 0.0.0.0:10000)
    pub listen: Option<String>,

    /// Translate every wire message into an opaque JSON occurrence
    #[serde(default)]
    pub emulate_rest: bool,
}

/// Orchestrator settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawOrchestratorConfig {
    /// How long an entity may wait for a decision. 0 means unlimited.
    pub decision_timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1
            run = "run.sh"
            validate = "validate.sh"
            clean = "clean.sh"
            not_clean_if_validation_fail = true
            explore_policy = "random"

            [explore_policy_param]
            minBound = 10
            maxBound = 200

            [explore_policy_param.killRatePerEntity]
            zk1 = 20

            [inspector]
            listen = "127.0.0.1:10000"
            emulate_rest = true

            [orchestrator]
            decision_timeout_ms = 5000
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.run, "run.sh");
        assert_eq!(config.explore_policy.as_deref(), Some("random"));
        assert_eq!(config.explore_policy_param["maxBound"].as_integer(), Some(200));
        assert!(config.inspector.emulate_rest);
        assert_eq!(config.orchestrator.decision_timeout_ms, Some(5000));
    }

    #[test]
    fn optional_sections_default() {
        let config: RawConfig = toml::from_str("config_version = 1\nrun = \"run.sh\"").unwrap();
        assert!(config.validate.is_none());
        assert!(config.explore_policy_param.is_empty());
        assert!(config.inspector.listen.is_none());
        assert!(!config.not_clean_if_validation_fail);
    }
}
