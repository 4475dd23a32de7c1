//! Process-wide provider configuration.
//!
//! Loaded once at startup from a TOML (or JSON) file, then overridden by
//! `MYSQL_PROVIDER_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "MYSQL_PROVIDER_";

/// Top-level configuration for the provider process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Drop a relation's databases when the relation is broken.
    #[serde(default)]
    pub autodelete: bool,

    /// Backend readiness grace period.
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Deferred event redelivery.
    #[serde(default)]
    pub redelivery: RedeliveryConfig,

    /// MySQL server connection.
    #[serde(default)]
    pub mysql: MysqlConfig,

    /// Credential store location.
    #[serde(default)]
    pub store: StoreSettings,

    /// Identity of this provider unit.
    #[serde(default)]
    pub unit: UnitConfig,
}

/// Readiness gate settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Delay before the single readiness recheck.
    #[serde(
        rename = "grace_delay_secs",
        with = "duration_secs",
        default = "default_grace_delay"
    )]
    pub grace_delay: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            grace_delay: default_grace_delay(),
        }
    }
}

/// Deferred event redelivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeliveryConfig {
    /// How often deferred events are handed back for another pass.
    #[serde(
        rename = "interval_secs",
        with = "duration_secs",
        default = "default_redelivery_interval"
    )]
    pub interval: Duration,
}

impl Default for RedeliveryConfig {
    fn default() -> Self {
        Self {
            interval: default_redelivery_interval(),
        }
    }
}

/// MySQL connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MysqlConfig {
    #[serde(default = "default_mysql_host")]
    pub host: String,

    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Administrative user the provider connects as.
    #[serde(default = "default_mysql_user")]
    pub user: String,

    #[serde(default)]
    pub root_password: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(
        rename = "connect_timeout_secs",
        with = "duration_secs",
        default = "default_connect_timeout"
    )]
    pub connect_timeout: Duration,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: default_mysql_host(),
            port: default_mysql_port(),
            user: default_mysql_user(),
            root_password: None,
            max_connections: default_max_connections(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Credential store location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Connection URL, e.g. `surrealkv://path` or `mem://`.
    #[serde(default = "default_store_url")]
    pub url: String,

    #[serde(default = "default_store_namespace")]
    pub namespace: String,

    #[serde(default = "default_store_database")]
    pub database: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            namespace: default_store_namespace(),
            database: default_store_database(),
        }
    }
}

/// Identity of this provider unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitConfig {
    /// Address published to consumers as the credential `address`.
    #[serde(default)]
    pub address: String,

    /// Whether this unit is the elected leader.
    #[serde(default)]
    pub leader: bool,
}

impl ProviderConfig {
    /// Load configuration from an optional file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// environment override holds an invalid value.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// JSON is used when the extension is `.json`, TOML otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;

        if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content).map_err(|e| Error::json_parse_failed(e.to_string()))
        } else {
            Self::from_toml(&content)
        }
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration TOML.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::toml_parse_failed(e.to_string()))
    }

    /// Apply `MYSQL_PROVIDER_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a boolean or numeric override cannot be parsed.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = var("AUTODELETE") {
            self.autodelete = parse_bool("AUTODELETE", &value)?;
        }
        if let Some(value) = var("LEADER") {
            self.unit.leader = parse_bool("LEADER", &value)?;
        }
        if let Some(value) = var("UNIT_ADDRESS") {
            self.unit.address = value;
        }
        if let Some(value) = var("MYSQL_HOST") {
            self.mysql.host = value;
        }
        if let Some(value) = var("MYSQL_PORT") {
            self.mysql.port = value
                .parse()
                .map_err(|_| Error::invalid_config("MYSQL_PORT", format!("'{value}' is not a port")))?;
        }
        if let Some(value) = var("MYSQL_PASSWORD") {
            self.mysql.root_password = Some(value);
        }
        if let Some(value) = var("STORE_URL") {
            self.store.url = value;
        }

        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::invalid_config(
            key,
            format!("'{other}' is not a boolean"),
        )),
    }
}

const fn default_grace_delay() -> Duration {
    Duration::from_secs(20)
}

const fn default_redelivery_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_mysql_host() -> String {
    "localhost".to_string()
}

const fn default_mysql_port() -> u16 {
    3306
}

fn default_mysql_user() -> String {
    "root".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_store_url() -> String {
    "surrealkv://.mysql-provider/credentials".to_string()
}

fn default_store_namespace() -> String {
    "mysql_provider".to_string()
}

fn default_store_database() -> String {
    "credentials".to_string()
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert!(!config.autodelete);
        assert!(!config.unit.leader);
        assert_eq!(config.readiness.grace_delay, Duration::from_secs(20));
        assert_eq!(config.redelivery.interval, Duration::from_secs(60));
        assert_eq!(config.mysql.port, 3306);
        assert_eq!(config.mysql.user, "root");
        assert_eq!(config.store.namespace, "mysql_provider");
    }

    #[test]
    fn test_from_toml_partial() -> Result<()> {
        let config = ProviderConfig::from_toml(
            r#"
            autodelete = true

            [readiness]
            grace_delay_secs = 5

            [mysql]
            host = "10.0.0.4"
            root_password = "D10S!"

            [unit]
            address = "10.0.0.4"
            leader = true
            "#,
        )?;

        assert!(config.autodelete);
        assert_eq!(config.readiness.grace_delay, Duration::from_secs(5));
        assert_eq!(config.redelivery.interval, Duration::from_secs(60));
        assert_eq!(config.mysql.host, "10.0.0.4");
        assert_eq!(config.mysql.port, 3306);
        assert_eq!(config.mysql.root_password.as_deref(), Some("D10S!"));
        assert!(config.unit.leader);
        Ok(())
    }

    #[test]
    fn test_from_toml_rejects_wrong_type() {
        let result = ProviderConfig::from_toml("autodelete = \"maybe\"");
        assert!(matches!(result, Err(Error::TomlParseFailed { .. })));
    }

    #[test]
    fn test_from_file_json() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile()?;
        file.write_all(br#"{"autodelete": true, "unit": {"leader": true}}"#)?;

        let config = ProviderConfig::from_file(file.path())?;
        assert!(config.autodelete);
        assert!(config.unit.leader);
        Ok(())
    }

    #[test]
    fn test_from_file_missing() {
        let result = ProviderConfig::from_file(Path::new("/nonexistent/provider.toml"));
        assert!(matches!(result, Err(Error::FileReadFailed { .. })));
    }

    #[test]
    fn test_apply_env_overrides() -> Result<()> {
        let vars = env(&[
            ("MYSQL_PROVIDER_AUTODELETE", "yes"),
            ("MYSQL_PROVIDER_LEADER", "1"),
            ("MYSQL_PROVIDER_UNIT_ADDRESS", "192.168.1.20"),
            ("MYSQL_PROVIDER_MYSQL_PORT", "3307"),
            ("MYSQL_PROVIDER_STORE_URL", "mem://"),
        ]);
        let mut config = ProviderConfig::default();
        config.apply_env(|key| vars.get(key).cloned())?;

        assert!(config.autodelete);
        assert!(config.unit.leader);
        assert_eq!(config.unit.address, "192.168.1.20");
        assert_eq!(config.mysql.port, 3307);
        assert_eq!(config.store.url, "mem://");
        Ok(())
    }

    #[test]
    fn test_apply_env_invalid_bool() {
        let vars = env(&[("MYSQL_PROVIDER_AUTODELETE", "sometimes")]);
        let mut config = ProviderConfig::default();
        let result = config.apply_env(|key| vars.get(key).cloned());
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
        assert!(!config.autodelete);
    }
}
