//! Configuration validation

use crate::schema::RawConfig;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Script '{field}': {message}")]
    ScriptError { field: &'static str, message: String },

    #[error("Invalid listen address '{value}': {message}")]
    InvalidListenAddress { value: String, message: String },

    #[error("Explore policy name cannot be empty")]
    EmptyPolicyName,

    #[error("Explore policy parameters are not representable as JSON: {0}")]
    InvalidPolicyParam(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_script("run", Some(&config.run)));
    errors.extend(validate_script("validate", config.validate.as_deref()));
    errors.extend(validate_script("clean", config.clean.as_deref()));

    if let Some(name) = &config.explore_policy
        && name.trim().is_empty()
    {
        errors.push(ValidationError::EmptyPolicyName);
    }

    if let Err(e) = serde_json::to_value(&config.explore_policy_param) {
        errors.push(ValidationError::InvalidPolicyParam(e.to_string()));
    }

    if let Some(listen) = &config.inspector.listen
        && let Err(e) = parse_listen(listen)
    {
        errors.push(ValidationError::InvalidListenAddress {
            value: listen.clone(),
            message: e,
        });
    }

    errors
}

fn validate_script(field: &'static str, script: Option<&str>) -> Option<ValidationError> {
    let script = script?;
    if script.trim().is_empty() {
        return Some(ValidationError::ScriptError {
            field,
            message: "script cannot be empty".into(),
        });
    }
    if Path::new(script).is_absolute() {
        return Some(ValidationError::ScriptError {
            field,
            message: "script must be relative to the materials directory".into(),
        });
    }
    None
}

/// Parse an inspector listen address (e.g. "0.0.0.0:10000")
pub fn parse_listen(s: &str) -> Result<SocketAddr, String> {
    s.parse::<SocketAddr>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(run: &str) -> RawConfig {
        toml::from_str(&format!("config_version = 1\nrun = \"{}\"", run)).unwrap()
    }

    #[test]
    fn minimal_config_is_valid() {
        assert!(validate_config(&raw("run.sh")).is_empty());
    }

    #[test]
    fn empty_and_absolute_scripts_are_rejected() {
        let errors = validate_config(&raw(""));
        assert!(matches!(errors[0], ValidationError::ScriptError { field: "run", .. }));

        let mut config = raw("run.sh");
        config.clean = Some("/usr/local/bin/clean.sh".into());
        let errors = validate_config(&config);
        assert!(matches!(errors[0], ValidationError::ScriptError { field: "clean", .. }));
    }

    #[test]
    fn errors_are_collected() {
        let mut config = raw("");
        config.explore_policy = Some("  ".into());
        config.inspector.listen = Some("localhost".into());

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::EmptyPolicyName)));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidListenAddress { .. })));
    }

    #[test]
    fn test_parse_listen() {
        assert!(parse_listen("0.0.0.0:10000").is_ok());
        assert!(parse_listen("[::1]:9000").is_ok());
        assert!(parse_listen("10000").is_err());
    }
}
