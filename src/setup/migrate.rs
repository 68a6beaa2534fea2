//! Runs the external migration tool once the database is provisioned.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

pub const DEFAULT_MIGRATE_COMMAND: &str = "sequelize db:migrate";

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("Migration command is empty")]
    EmptyCommand,
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Migration command exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRunner {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MigrationOutput {
    pub stdout: String,
    pub stderr: String,
}

impl MigrationRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current_dir: None,
        }
    }

    /// Split a command line on whitespace. No shell quoting is applied.
    pub fn from_command_line(command: &str) -> Result<Self, MigrateError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(MigrateError::EmptyCommand)?;
        Ok(Self::new(program, parts.collect()))
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub async fn run(&self) -> Result<MigrationOutput, MigrateError> {
        info!("running migrations: {} {}", self.program, self.args.join(" "));

        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|source| MigrateError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            info!(target: "pgsetup::migrate", "{}", line);
        }
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            warn!(target: "pgsetup::migrate", "{}", line);
        }

        if !output.status.success() {
            return Err(MigrateError::Failed {
                status: output.status,
                stderr,
            });
        }
        Ok(MigrationOutput { stdout, stderr })
    }
}

impl Default for MigrationRunner {
    fn default() -> Self {
        // DEFAULT_MIGRATE_COMMAND is never empty.
        let mut parts = DEFAULT_MIGRATE_COMMAND.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self::new(program, parts.collect())
    }
}
