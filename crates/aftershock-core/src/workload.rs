//! Workload script execution

use std::process::ExitStatus;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{CoreError, CoreResult, RunContext};

/// Runs the experiment's scripts with the run's environment
#[derive(Debug, Clone)]
pub struct WorkloadRunner {
    ctx: RunContext,
}

impl WorkloadRunner {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Run `sh -c <materials>/<script>` to completion, inheriting stdio
    pub async fn run_script(&self, script: &str) -> CoreResult<ExitStatus> {
        let path = self.ctx.script_path(script);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&path).kill_on_drop(true);
        for (key, value) in self.ctx.env_vars() {
            cmd.env(key, value);
        }

        info!(script = %path.display(), "Starting script");
        let status = cmd.status().await.map_err(|source| CoreError::Script {
            script: path.display().to_string(),
            source,
        })?;

        if status.success() {
            info!(script = %path.display(), "Script finished");
        } else {
            debug!(script = %path.display(), status = %status, "Script exited unsuccessfully");
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_script(materials: &Path, name: &str, body: &str) {
        let path = materials.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn runner(storage: &Path) -> WorkloadRunner {
        let working = storage.join("00000000");
        std::fs::create_dir_all(&working).unwrap();
        std::fs::create_dir_all(storage.join("materials")).unwrap();
        WorkloadRunner::new(RunContext::new(storage, working))
    }

    #[tokio::test]
    async fn test_script_sees_run_environment() {
        let dir = tempdir().unwrap();
        let runner = runner(dir.path());
        write_script(
            &runner.context().materials_dir,
            "run.sh",
            "echo \"$AFTERSHOCK_MATERIALS_DIR\" > \"$AFTERSHOCK_WORKING_DIR/out\"",
        );

        let status = runner.run_script("run.sh").await.unwrap();
        assert!(status.success());

        let out = std::fs::read_to_string(dir.path().join("00000000/out")).unwrap();
        assert_eq!(out.trim(), runner.context().materials_dir.to_str().unwrap());
    }

    #[tokio::test]
    async fn test_exit_status_is_reported() {
        let dir = tempdir().unwrap();
        let runner = runner(dir.path());
        write_script(&runner.context().materials_dir, "validate.sh", "exit 3");

        let status = runner.run_script("validate.sh").await.unwrap();
        assert_eq!(status.code(), Some(3));

        let missing = runner.run_script("absent.sh").await.unwrap();
        assert!(!missing.success());
    }
}
