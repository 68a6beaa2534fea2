use pgsetup::provision::MockEvent;
use pgsetup::setup::{self, MigrationRunner, SetupPlan, StagingLayout};
use pgsetup::{
    ConfigError, ConnectionConfig, DatabaseManager, DbError, MockServerConnector, ProvisionOutcome,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn literal_config() -> ConnectionConfig {
    ConnectionConfig::from_json(&json!({
        "host": "localhost",
        "port": "5432",
        "database": "app_test",
        "username": "u",
        "password": "p",
    }))
    .expect("valid config")
}

#[tokio::test]
async fn test_literal_scenario_creates_database() {
    let mock = MockServerConnector::new();
    let manager = DatabaseManager::new(Arc::new(mock.clone()), literal_config());

    let outcome = assert_ok!(manager.recreate_database().await);
    assert_eq!(outcome, ProvisionOutcome::Created);
    assert_eq!(
        mock.queries(),
        vec![
            "SELECT 1 FROM pg_database WHERE datname='app_test'".to_string(),
            "CREATE DATABASE app_test".to_string(),
        ]
    );
    assert_eq!(mock.events().last(), Some(&MockEvent::Closed));
}

#[tokio::test]
async fn test_existing_database_issues_single_check() {
    let mock = MockServerConnector::new().with_database("app_test");
    let manager = DatabaseManager::new(Arc::new(mock.clone()), literal_config());

    let outcome = assert_ok!(manager.recreate_database().await);
    assert_eq!(outcome, ProvisionOutcome::AlreadyExists);
    assert_eq!(mock.queries().len(), 1);
    assert!(mock.is_closed());
}

#[tokio::test]
async fn test_connect_failure_propagates() {
    let mock = MockServerConnector::new().with_connect_error("ECONNREFUSED");
    let manager = DatabaseManager::new(Arc::new(mock.clone()), literal_config());

    let err = assert_err!(manager.recreate_database().await);
    assert!(matches!(err, DbError::Connection { .. }));
    assert!(mock.queries().is_empty());
}

#[tokio::test]
async fn test_parallel_provisioning_both_succeed() {
    let mock = MockServerConnector::new();
    let a = DatabaseManager::new(Arc::new(mock.clone()), literal_config());
    let b = a.clone();

    let (ra, rb) = tokio::join!(a.recreate_database(), b.recreate_database());
    let mut outcomes = vec![assert_ok!(ra), assert_ok!(rb)];
    outcomes.sort_by_key(|o| *o == ProvisionOutcome::AlreadyExists);
    assert_eq!(
        outcomes,
        vec![ProvisionOutcome::Created, ProvisionOutcome::AlreadyExists]
    );
    assert!(mock.has_database("app_test"));
}

#[test]
fn test_missing_field_fails_before_connecting() {
    let err = ConnectionConfig::from_json(&json!({
        "host": "localhost",
        "port": "5432",
        "username": "u",
        "password": "p",
    }))
    .unwrap_err();
    assert_eq!(err, ConfigError::MissingField("database".to_string()));
}

#[tokio::test]
async fn test_setup_stages_and_migrates() {
    let dir = TempDir::new().unwrap();
    let service = dir.path().join("modules/user/user_service/lib");
    std::fs::create_dir_all(service.join("migrations")).unwrap();
    std::fs::write(service.join("user.js"), "").unwrap();
    std::fs::write(service.join("migrations/20160314092724-initial.js"), "").unwrap();

    let mock = MockServerConnector::new();
    let manager = DatabaseManager::new(Arc::new(mock), literal_config());
    let plan = SetupPlan {
        staging: Some(StagingLayout {
            modules_root: dir.path().join("modules"),
            migrations_target: dir.path().join("db/migrations"),
            models_target: dir.path().join("db/models"),
        }),
        migration: Some(
            MigrationRunner::from_command_line("ls db/migrations")
                .unwrap()
                .in_dir(dir.path()),
        ),
    };

    let report = assert_ok!(setup::run(&manager, &plan).await);
    assert_eq!(report.provisioned, ProvisionOutcome::Created);
    assert!(report.migrated);
    let staged = report.staged.expect("staging ran");
    assert_eq!(staged.migrations.len(), 1);
    assert_eq!(staged.models.len(), 1);
}
