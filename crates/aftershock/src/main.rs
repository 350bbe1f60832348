//! aftershock - interleaving exploration driver
//!
//! Prepares storage directories and drives experiment runs. A run wires
//! together:
//! - Configuration loading
//! - History storage
//! - Exploration policy
//! - Inspector server
//! - Orchestrator
//! - Workload scripts

use aftershock_config::{load_config, ExperimentConfig};
use aftershock_core::{Orchestrator, RunContext, WorkloadRunner};
use aftershock_ipc::{EventTranslator, InspectorServer, READY_CHANNEL_CAPACITY};
use aftershock_policy::{create_policy, ExplorePolicy};
use aftershock_store::{HistoryStorage, SqliteHistoryStorage};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// aftershock - Systematic exploration of concurrency interleavings
#[derive(Parser, Debug)]
#[command(name = "aftershock")]
#[command(about = "Systematic exploration of concurrency interleavings", long_about = None)]
struct Cli {
    /// Log level
    #[arg(short, long, global = true, default_value = "info", env = "AFTERSHOCK_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create a storage directory from a config file and a materials directory
    Init {
        /// Experiment configuration (TOML)
        config: PathBuf,

        /// Directory holding the workload scripts
        materials: PathBuf,

        /// Storage directory to create
        storage: PathBuf,
    },

    /// Run one experiment in an initialized storage directory
    Run {
        /// Storage directory created by `init`
        storage: PathBuf,
    },
}

fn init_storage(config: &Path, materials: &Path, storage: &Path) -> Result<()> {
    // Refuse configs the run command would reject
    load_config(config).with_context(|| format!("Failed to load config from {:?}", config))?;

    if !materials.is_dir() {
        bail!("Materials directory {:?} does not exist", materials);
    }
    if storage.exists() {
        bail!("Storage directory {:?} already exists", storage);
    }

    fs::create_dir_all(storage)
        .with_context(|| format!("Failed to create storage directory {:?}", storage))?;
    fs::copy(config, aftershock_util::config_path(storage))
        .with_context(|| format!("Failed to copy config {:?}", config))?;
    copy_dir_all(materials, &aftershock_util::materials_dir(storage))
        .with_context(|| format!("Failed to copy materials from {:?}", materials))?;

    info!(storage = %storage.display(), "Storage directory initialized");
    Ok(())
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            // fs::copy keeps permission bits, scripts stay executable
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Raise the soft open-file limit to the hard limit. Every inspected
/// entity holds a connection for the whole run.
fn raise_nofile_limit() {
    use nix::sys::resource::{getrlimit, setrlimit, Resource};

    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((soft, hard)) if soft < hard => {
            match setrlimit(Resource::RLIMIT_NOFILE, hard, hard) {
                Ok(()) => debug!(from = soft, to = hard, "Raised open file limit"),
                Err(e) => warn!(error = %e, "Failed to raise open file limit"),
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Failed to read open file limit"),
    }
}

/// One experiment run
struct Experiment {
    config: ExperimentConfig,
    storage: Arc<dyn HistoryStorage>,
    policy: Box<dyn ExplorePolicy>,
    server: InspectorServer,
    runner: WorkloadRunner,
}

impl Experiment {
    async fn new(storage_dir: &Path) -> Result<Self> {
        let config_path = aftershock_util::config_path(storage_dir);
        let config = load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?;

        info!(
            config_path = %config_path.display(),
            policy = %config.explore_policy,
            "Configuration loaded"
        );

        let storage: Arc<dyn HistoryStorage> = Arc::new(
            SqliteHistoryStorage::open(storage_dir)
                .context("Failed to open history storage")?,
        );
        let stored = storage
            .nr_stored_histories()
            .context("Failed to read history storage")?;
        info!(stored, "History storage opened");

        let mut policy = create_policy(&config.explore_policy)
            .context("Failed to create exploration policy")?;
        policy
            .init(storage.clone(), &config.explore_policy_param)
            .context("Failed to initialize exploration policy")?;

        let working_dir = storage
            .create_new_working_dir()
            .context("Failed to create working directory")?;
        info!(working_dir = %working_dir.display(), "Working directory created");

        let server = InspectorServer::bind(
            config.inspector.listen,
            EventTranslator::new(config.inspector.emulate_rest),
        )
        .await
        .context("Failed to start inspector server")?;

        let runner = WorkloadRunner::new(RunContext::new(storage_dir, working_dir));

        Ok(Self {
            config,
            storage,
            policy,
            server,
            runner,
        })
    }

    async fn run(self) -> Result<()> {
        let decision_timeout = self.config.orchestrator.decision_timeout;
        let (ready_tx, ready_rx) = mpsc::channel(READY_CHANNEL_CAPACITY);

        let server = self.server;
        let server_task = tokio::spawn(async move {
            server.run(ready_tx, decision_timeout).await;
        });

        let orchestrator = Orchestrator::new(self.policy, ready_rx, decision_timeout)
            .context("Failed to start orchestrator")?
            .spawn();

        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;

        let started = Instant::now();
        // Dropping the script future kills the workload
        tokio::select! {
            status = self.runner.run_script(&self.config.scripts.run) => {
                let status = status?;
                if !status.success() {
                    warn!(status = %status, "Run script exited unsuccessfully");
                }
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, ending run");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, ending run");
            }
        }

        let trace = orchestrator.finish().await?;
        let required_time = started.elapsed();
        info!(
            decisions = trace.len(),
            elapsed_ms = required_time.as_millis() as u64,
            "Run finished"
        );

        self.storage
            .record_new_trace(&trace)
            .context("Failed to record trace")?;

        let successful = match &self.config.scripts.validate {
            Some(script) => {
                let status = self.runner.run_script(script).await?;
                status.success()
            }
            None => true,
        };
        if successful {
            info!("Validation succeeded");
        } else {
            warn!("Validation failed");
        }
        self.storage
            .record_result(successful, required_time)
            .context("Failed to record result")?;

        self.storage
            .close()
            .context("Failed to close history storage")?;

        if let Some(script) = &self.config.scripts.clean {
            if !successful && self.config.not_clean_if_validation_fail {
                info!(
                    working_dir = %self.runner.context().working_dir.display(),
                    "Validation failed, keeping working directory"
                );
            } else {
                let status = self.runner.run_script(script).await?;
                if !status.success() {
                    warn!(status = %status, "Clean script exited unsuccessfully");
                }
            }
        }

        server_task.abort();
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "aftershock starting"
    );

    match cli.command {
        Cmd::Init {
            config,
            materials,
            storage,
        } => init_storage(&config, &materials, &storage),
        Cmd::Run { storage } => {
            raise_nofile_limit();
            let experiment = Experiment::new(&storage).await?;
            experiment.run().await.inspect_err(|e| {
                error!(error = %e, "Run failed");
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["aftershock", "run", "/tmp/exp"]).unwrap();
        assert!(matches!(cli.command, Cmd::Run { ref storage } if storage == Path::new("/tmp/exp")));
        assert_eq!(cli.log_level, "info");

        let cli = Cli::try_parse_from([
            "aftershock",
            "--log-level",
            "debug",
            "init",
            "config.toml",
            "materials",
            "/tmp/exp",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Cmd::Init { .. }));

        assert!(Cli::try_parse_from(["aftershock", "init", "config.toml"]).is_err());
    }

    #[test]
    fn test_init_storage_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("exp.toml");
        fs::write(&config, "config_version = 1\nrun = \"run.sh\"\n").unwrap();

        let materials = dir.path().join("mat");
        fs::create_dir_all(materials.join("lib")).unwrap();
        let script = materials.join("run.sh");
        fs::write(&script, "#!/bin/sh\ntrue\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(materials.join("lib/helper.txt"), "x").unwrap();

        let storage = dir.path().join("storage");
        init_storage(&config, &materials, &storage).unwrap();

        assert!(aftershock_util::config_path(&storage).is_file());
        let copied = aftershock_util::materials_dir(&storage);
        assert_eq!(fs::read_to_string(copied.join("lib/helper.txt")).unwrap(), "x");
        let mode = fs::metadata(copied.join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        // a second init into the same directory is refused
        assert!(init_storage(&config, &materials, &storage).is_err());
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("exp.toml");
        fs::write(&config, "config_version = 1\n").unwrap();
        fs::create_dir_all(dir.path().join("mat")).unwrap();

        let storage = dir.path().join("storage");
        assert!(init_storage(&config, &dir.path().join("mat"), &storage).is_err());
        assert!(!storage.exists());
    }
}
