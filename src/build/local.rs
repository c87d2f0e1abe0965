use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::error::{ForgeError, Result};

/// Runs the source tree's own build step before anything is uploaded.
pub trait LocalBuilder {
    fn build(&self, source_dir: &Path, parallel: bool) -> Result<()>;
}

/// `./configure` (when present) followed by `make`.
#[derive(Debug, Clone)]
pub struct MakeBuilder {
    make: String,
}

impl MakeBuilder {
    pub fn new(make: impl Into<String>) -> Self {
        Self { make: make.into() }
    }
}

impl Default for MakeBuilder {
    fn default() -> Self {
        Self::new("make")
    }
}

const MAKEFILES: [&str; 3] = ["GNUmakefile", "makefile", "Makefile"];

impl LocalBuilder for MakeBuilder {
    fn build(&self, source_dir: &Path, parallel: bool) -> Result<()> {
        let configure = source_dir.join("configure");
        if configure.is_file() {
            info!("running ./configure");
            run(Command::new("./configure").current_dir(source_dir), "./configure")?;
        }

        if !MAKEFILES.iter().any(|f| source_dir.join(f).is_file()) {
            debug!(dir = %source_dir.display(), "no Makefile; nothing to build");
            return Ok(());
        }

        let make = which::which(&self.make)
            .map_err(|_| ForgeError::LocalBuild(format!("{} not found on PATH", self.make)))?;
        let mut command = Command::new(make);
        command.current_dir(source_dir);
        if parallel {
            let jobs = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
            command.arg(format!("-j{jobs}"));
        }
        info!(parallel, "running {}", self.make);
        run(&mut command, &self.make)
    }
}

fn run(command: &mut Command, label: &str) -> Result<()> {
    let status = command
        .status()
        .map_err(|e| ForgeError::LocalBuild(format!("could not run {label}: {e}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(ForgeError::LocalBuild(format!("{label} exited with {status}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn tree_without_makefile_is_a_no_op() {
        let dir = tempdir().unwrap();
        MakeBuilder::default().build(dir.path(), true).unwrap();
    }

    #[test]
    fn failing_make_is_local_build_error() {
        if which::which("make").is_err() {
            return;
        }
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Makefile"), "all:\n\tfalse\n").unwrap();
        let err = MakeBuilder::default().build(dir.path(), false).unwrap_err();
        assert!(matches!(err, ForgeError::LocalBuild(_)), "{err}");
    }

    #[test]
    fn successful_make_runs_in_source_dir() {
        if which::which("make").is_err() {
            return;
        }
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Makefile"), "all:\n\ttouch built.txt\n").unwrap();
        MakeBuilder::default().build(dir.path(), true).unwrap();
        assert!(dir.path().join("built.txt").exists());
    }

    #[test]
    fn missing_make_binary_is_reported() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Makefile"), "all:\n").unwrap();
        let err = MakeBuilder::new("appforge-no-such-make")
            .build(dir.path(), false)
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
