//! Config validation CLI tool
//!
//! Validates an aftershock experiment configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("Usage: validate-config <config-file>");
            eprintln!();
            eprintln!("Validates an aftershock experiment configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config storage/{}", aftershock_util::CONFIG_FILENAME);
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match aftershock_config::load_config(&config_path) {
        Ok(experiment) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", aftershock_config::CURRENT_CONFIG_VERSION);
            println!("  Run script: {}", experiment.scripts.run);
            if let Some(validate) = &experiment.scripts.validate {
                println!("  Validate script: {}", validate);
            }
            if let Some(clean) = &experiment.scripts.clean {
                println!("  Clean script: {}", clean);
            }
            println!("  Explore policy: {}", experiment.explore_policy);
            if !experiment.explore_policy_param.is_empty() {
                println!(
                    "  Policy parameters: {}",
                    serde_json::Value::Object(experiment.explore_policy_param.clone())
                );
            }
            println!("  Inspector listen: {}", experiment.inspector.listen);
            if experiment.inspector.emulate_rest {
                println!("  Inspector mode: emulated REST (opaque JSON occurrences)");
            }
            match experiment.orchestrator.decision_timeout {
                Some(timeout) => println!("  Decision timeout: {}ms", timeout.as_millis()),
                None => println!("  Decision timeout: unlimited"),
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                aftershock_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                aftershock_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                aftershock_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                aftershock_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        aftershock_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
