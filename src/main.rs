use pgsetup::setup::{self, MigrationRunner, SetupPlan, StagingLayout};
use pgsetup::{ConnectionConfig, DatabaseManager};
use std::path::PathBuf;

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(std::env::var(key).unwrap_or_else(|_| default.to_string()))
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match ConnectionConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let migrate_flag = std::env::args().skip(1).any(|arg| arg == "--migrate");
    let migration = match std::env::var("MIGRATE_COMMAND") {
        Ok(command) => match MigrationRunner::from_command_line(&command) {
            Ok(runner) => Some(runner),
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                std::process::exit(1);
            }
        },
        Err(_) if migrate_flag => Some(MigrationRunner::default()),
        Err(_) => None,
    };

    let staging = match std::env::var("MODULES_DIR") {
        Ok(modules_dir) if migration.is_some() => Some(StagingLayout {
            modules_root: PathBuf::from(modules_dir),
            migrations_target: env_path("MIGRATIONS_DIR", "db/migrations"),
            models_target: env_path("MODELS_DIR", "db/models"),
        }),
        _ => None,
    };

    let manager = DatabaseManager::postgres(config);
    let plan = SetupPlan { staging, migration };

    match setup::run(&manager, &plan).await {
        Ok(report) => {
            tracing::info!(
                "Setup complete: database {:?}, migrations run: {}",
                report.provisioned,
                report.migrated
            );
        }
        Err(e) => {
            eprintln!("Setup failed: {}", e);
            std::process::exit(1);
        }
    }
}
