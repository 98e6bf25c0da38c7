//! Collaborators the apply engine calls around its transaction
//!
//! The backup hook runs before any mutation; the cache invalidator runs after
//! commit. Both have wp-cli backed implementations for WordPress hosts.

use crate::plan::PlannedTerm;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether missing terms may be created without asking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreationPolicy {
    #[default]
    Auto,
    /// Ask a `CreationConfirmer` before creating anything
    Confirm,
}

/// Snapshot the store before the apply transaction starts
pub trait BackupHook {
    fn backup(&self) -> Result<(), HookError>;
}

/// Drop whatever term data the host system caches
pub trait CacheInvalidator {
    fn invalidate(&self) -> Result<(), HookError>;
}

/// Approves the creation of new terms (a prompt, a UI, a test double)
pub trait CreationConfirmer {
    fn confirm(&self, terms: &[PlannedTerm]) -> bool;
}

impl<F> CreationConfirmer for F
where
    F: Fn(&[PlannedTerm]) -> bool,
{
    fn confirm(&self, terms: &[PlannedTerm]) -> bool {
        self(terms)
    }
}

/// Runs wp-cli commands inside a WordPress installation
#[derive(Debug, Clone)]
pub struct WpCli {
    wp_path: PathBuf,
    program: String,
}

impl WpCli {
    pub fn new(wp_path: impl Into<PathBuf>) -> Self {
        Self {
            wp_path: wp_path.into(),
            program: "wp".to_string(),
        }
    }

    /// Use another executable instead of `wp`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn run(&self, args: &[&str]) -> Result<String, HookError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(%command, cwd = %self.wp_path.display(), "running wp-cli");

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(&self.wp_path)
            .output()
            .map_err(|source| HookError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(HookError::Failed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// `wp db export <output>`
#[derive(Debug, Clone)]
pub struct WpCliBackup {
    cli: WpCli,
    output: PathBuf,
}

impl WpCliBackup {
    pub fn new(cli: WpCli, output: impl Into<PathBuf>) -> Self {
        Self {
            cli,
            output: output.into(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl BackupHook for WpCliBackup {
    fn backup(&self) -> Result<(), HookError> {
        if let Some(dir) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let output = self.output.to_string_lossy();
        self.cli.run(&["db", "export", output.as_ref()])?;
        info!(path = %self.output.display(), "database backup created");
        Ok(())
    }
}

/// `wp cache flush`
#[derive(Debug, Clone)]
pub struct WpCliCacheFlush {
    cli: WpCli,
}

impl WpCliCacheFlush {
    pub fn new(cli: WpCli) -> Self {
        Self { cli }
    }
}

impl CacheInvalidator for WpCliCacheFlush {
    fn invalidate(&self) -> Result<(), HookError> {
        self.cli.run(&["cache", "flush"])?;
        debug!("host cache flushed");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn successful_command_passes() {
        let dir = tempfile::tempdir().unwrap();
        let flush = WpCliCacheFlush::new(WpCli::new(dir.path()).with_program("true"));
        assert!(flush.invalidate().is_ok());
    }

    #[test]
    fn failing_command_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let flush = WpCliCacheFlush::new(WpCli::new(dir.path()).with_program("false"));
        let err = flush.invalidate().unwrap_err();
        assert!(matches!(err, HookError::Failed { .. }));
        assert!(err.to_string().contains("false cache flush"));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = WpCli::new(dir.path()).with_program("definitely-not-a-wp-binary");
        assert!(matches!(cli.run(&["cli", "version"]), Err(HookError::Spawn { .. })));
    }

    #[test]
    fn backup_creates_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("backups/db.sql");
        let backup = WpCliBackup::new(WpCli::new(dir.path()).with_program("true"), &target);
        backup.backup().unwrap();
        assert!(target.parent().unwrap().is_dir());
    }

    #[test]
    fn closures_confirm_creation() {
        let deny = |_: &[PlannedTerm]| false;
        assert!(!deny.confirm(&[]));
    }
}
