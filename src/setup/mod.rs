//! Environment setup: provision the database, then stage and run migrations.
//!
//! Staging and migration only start after provisioning has returned `Ok`.

pub mod migrate;
pub mod staging;

pub use migrate::{MigrateError, MigrationOutput, MigrationRunner, DEFAULT_MIGRATE_COMMAND};
pub use staging::{StagedFiles, StagingError, StagingLayout};

use crate::error::DbError;
use crate::provision::{DatabaseManager, ProvisionOutcome};
use thiserror::Error;

#[derive(Debug, Default, Clone)]
pub struct SetupPlan {
    pub staging: Option<StagingLayout>,
    pub migration: Option<MigrationRunner>,
}

#[derive(Debug)]
pub struct SetupReport {
    pub provisioned: ProvisionOutcome,
    pub staged: Option<StagedFiles>,
    pub migrated: bool,
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Provision(#[from] DbError),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error(transparent)]
    Migrate(#[from] MigrateError),
}

pub async fn run(manager: &DatabaseManager, plan: &SetupPlan) -> Result<SetupReport, SetupError> {
    let provisioned = manager.recreate_database().await?;

    let staged = match &plan.staging {
        Some(layout) => Some(layout.stage()?),
        None => None,
    };

    let migrated = match &plan.migration {
        Some(runner) => {
            runner.run().await?;
            true
        }
        None => false,
    };

    Ok(SetupReport {
        provisioned,
        staged,
        migrated,
    })
}
