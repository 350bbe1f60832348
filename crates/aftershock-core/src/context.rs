//! Explicit run context handed to the workload runner

use aftershock_util::{MATERIALS_DIR_ENV, WORKING_DIR_ENV};
use std::path::{Path, PathBuf};

/// Directories of the current run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub storage_dir: PathBuf,
    pub working_dir: PathBuf,
    pub materials_dir: PathBuf,
}

impl RunContext {
    pub fn new(storage_dir: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        let storage_dir = storage_dir.into();
        let materials_dir = aftershock_util::materials_dir(&storage_dir);
        Self {
            storage_dir,
            working_dir: working_dir.into(),
            materials_dir,
        }
    }

    /// Path of a script named relative to the materials directory
    pub fn script_path(&self, script: &str) -> PathBuf {
        self.materials_dir.join(script)
    }

    /// Environment exported to every script
    pub fn env_vars(&self) -> [(&'static str, &Path); 2] {
        [
            (WORKING_DIR_ENV, self.working_dir.as_path()),
            (MATERIALS_DIR_ENV, self.materials_dir.as_path()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let ctx = RunContext::new("/srv/exp", "/srv/exp/00000003");
        assert_eq!(ctx.materials_dir, PathBuf::from("/srv/exp/materials"));
        assert_eq!(ctx.script_path("run.sh"), PathBuf::from("/srv/exp/materials/run.sh"));

        let env = ctx.env_vars();
        assert_eq!(env[0], ("AFTERSHOCK_WORKING_DIR", Path::new("/srv/exp/00000003")));
        assert_eq!(env[1], ("AFTERSHOCK_MATERIALS_DIR", Path::new("/srv/exp/materials")));
    }
}
