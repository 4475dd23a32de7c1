//! CLI command handlers.
//!
//! Administrative actions print a JSON result on success. Failures are
//! returned to `main`, which reports them and exits non-zero.

use anyhow::{Context, Result};
use provider_core::ProviderConfig;
use provider_mysql::MysqlGateway;
use provider_reconciler::{BackendGateway, UnitStatus};
use serde_json::json;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::serve;

const NOT_READY_MESSAGE: &str = "MySQL not ready yet";

/// Execute a CLI command.
///
/// This is the main command dispatcher that routes to the appropriate handler.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or the command fails.
pub async fn execute_command(cli: Cli) -> Result<()> {
    let config = ProviderConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve => serve::run(&config).await,

        Commands::CreateUser { username, password } => {
            cmd_create_user(&config, &username, &password).await
        }

        Commands::DeleteUser { username } => cmd_delete_user(&config, &username).await,

        Commands::SetUserPassword { username, password } => {
            cmd_set_user_password(&config, &username, &password).await
        }

        Commands::CreateDatabase { database } => cmd_create_database(&config, &database).await,

        Commands::Status => cmd_status(&config).await,
    }
}

async fn cmd_create_user(config: &ProviderConfig, username: &str, password: &str) -> Result<()> {
    MysqlGateway::new(&config.mysql)
        .new_super_user(username, password)
        .await
        .with_context(|| format!("Failed to create user {username}"))?;
    print_json(&json!({ "username": username }))
}

async fn cmd_delete_user(config: &ProviderConfig, username: &str) -> Result<()> {
    MysqlGateway::new(&config.mysql)
        .delete_user(username)
        .await
        .with_context(|| format!("Failed to delete user {username}"))?;
    print_json(&json!({ "username": username }))
}

async fn cmd_set_user_password(
    config: &ProviderConfig,
    username: &str,
    password: &str,
) -> Result<()> {
    MysqlGateway::new(&config.mysql)
        .set_user_password(username, password)
        .await
        .with_context(|| format!("Failed to set password for {username}"))?;
    print_json(&json!({ "username": username }))
}

async fn cmd_create_database(config: &ProviderConfig, database: &str) -> Result<()> {
    MysqlGateway::new(&config.mysql)
        .create_database(database)
        .await
        .with_context(|| format!("Failed to create database {database}"))?;
    print_json(&json!({ "database": database }))
}

async fn cmd_status(config: &ProviderConfig) -> Result<()> {
    let gateway = MysqlGateway::new(&config.mysql);
    let status = unit_status(&gateway).await;
    info!(status = %status, "Unit status");
    print_json(&serde_json::to_value(&status)?)
}

/// Unit status as seen from the backend's readiness.
pub async fn unit_status(gateway: &dyn BackendGateway) -> UnitStatus {
    if gateway.is_ready().await {
        UnitStatus::Active
    } else {
        UnitStatus::Waiting(NOT_READY_MESSAGE.to_string())
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let line = serde_json::to_string(value).context("Failed to encode result")?;
    println!("{line}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use provider_reconciler::InMemoryGateway;

    use super::*;

    #[tokio::test]
    async fn test_status_active_when_ready() {
        let gateway = InMemoryGateway::new();
        assert_eq!(unit_status(&gateway).await, UnitStatus::Active);
    }

    #[tokio::test]
    async fn test_status_waiting_when_not_ready() {
        let gateway = InMemoryGateway::new();
        gateway.set_ready(false).await;
        assert_eq!(
            unit_status(&gateway).await,
            UnitStatus::Waiting("MySQL not ready yet".to_string())
        );
    }
}
