//! Configuration management for the webhook delivery service.
//!
//! Loaded in priority order: environment variables over `config.toml` over
//! built-in defaults. The service works out of the box against a local
//! PostgreSQL with the defaults below.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use conveyor_delivery::ClientConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Database
    /// Database host. Environment variable: `DB_HOST`.
    #[serde(default = "default_db_host", alias = "DB_HOST")]
    pub db_host: String,
    /// Database port. Environment variable: `DB_PORT`.
    #[serde(default = "default_db_port", alias = "DB_PORT")]
    pub db_port: u16,
    /// Database user. Environment variable: `DB_USER`.
    #[serde(default = "default_db_user", alias = "DB_USER")]
    pub db_user: String,
    /// Database password. Environment variable: `DB_PASSWORD`.
    #[serde(default = "default_db_password", alias = "DB_PASSWORD")]
    pub db_password: String,
    /// Database name. Environment variable: `DB_NAME`.
    #[serde(default = "default_db_name", alias = "DB_NAME")]
    pub db_name: String,
    /// Database TLS mode. Environment variable: `DB_SSL_MODE`.
    #[serde(default = "default_db_ssl_mode", alias = "DB_SSL_MODE")]
    pub db_ssl_mode: String,
    /// Maximum connections in the pool. Environment variable:
    /// `DB_MAX_OPEN_CONNS`.
    #[serde(default = "default_db_max_open_conns", alias = "DB_MAX_OPEN_CONNS")]
    pub db_max_open_conns: u32,
    /// Minimum idle connections kept in the pool. Environment variable:
    /// `DB_MAX_IDLE_CONNS`.
    #[serde(default = "default_db_max_idle_conns", alias = "DB_MAX_IDLE_CONNS")]
    pub db_max_idle_conns: u32,

    // Outbound HTTP client
    /// Per-call outbound timeout in seconds. Environment variable:
    /// `HTTP_CLIENT_TIMEOUT`.
    #[serde(default = "default_http_client_timeout", alias = "HTTP_CLIENT_TIMEOUT")]
    pub http_client_timeout: u64,
    /// Maximum idle outbound connections. Environment variable:
    /// `HTTP_CLIENT_MAX_IDLE_CONNS`.
    #[serde(default = "default_http_client_max_idle_conns", alias = "HTTP_CLIENT_MAX_IDLE_CONNS")]
    pub http_client_max_idle_conns: usize,
    /// Idle outbound connection timeout in seconds. Environment variable:
    /// `HTTP_CLIENT_IDLE_CONN_TIMEOUT`.
    #[serde(
        default = "default_http_client_idle_conn_timeout",
        alias = "HTTP_CLIENT_IDLE_CONN_TIMEOUT"
    )]
    pub http_client_idle_conn_timeout: u64,

    // Intake server
    /// Server bind host. Environment variable: `HOST`.
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port. Environment variable: `API_PORT`.
    #[serde(default = "default_api_port", alias = "API_PORT")]
    pub api_port: u16,
    /// Request read timeout in seconds. Environment variable:
    /// `HTTP_SERVER_READ_TIMEOUT`.
    #[serde(default = "default_server_read_timeout", alias = "HTTP_SERVER_READ_TIMEOUT")]
    pub server_read_timeout: u64,
    /// Response write timeout in seconds. Environment variable:
    /// `HTTP_SERVER_WRITE_TIMEOUT`.
    #[serde(default = "default_server_write_timeout", alias = "HTTP_SERVER_WRITE_TIMEOUT")]
    pub server_write_timeout: u64,
    /// Idle connection timeout in seconds. Environment variable:
    /// `HTTP_SERVER_IDLE_TIMEOUT`.
    #[serde(default = "default_server_idle_timeout", alias = "HTTP_SERVER_IDLE_TIMEOUT")]
    pub server_idle_timeout: u64,
}

impl Config {
    /// Loads configuration from defaults, `config.toml`, and environment
    /// variable overrides (highest priority).
    ///
    /// # Errors
    ///
    /// Returns error when extraction or validation fails.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the PostgreSQL connection URL from its parts.
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name,
            self.db_ssl_mode
        )
    }

    /// Returns the connection URL with the password masked for logging.
    pub fn database_url_masked(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}?sslmode={}",
            self.db_user, self.db_host, self.db_port, self.db_name, self.db_ssl_mode
        )
    }

    /// Converts to the delivery crate's outbound client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.http_client_timeout),
            max_idle_connections: self.http_client_max_idle_conns,
            idle_timeout: Duration::from_secs(self.http_client_idle_conn_timeout),
            ..Default::default()
        }
    }

    /// Parses the intake server bind address.
    ///
    /// # Errors
    ///
    /// Returns error for an invalid host/port combination.
    pub fn server_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.api_port);
        SocketAddr::from_str(&addr).context("invalid server address")
    }

    /// Validates configuration values.
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.db_host.is_empty() {
            anyhow::bail!("database host is required");
        }
        if self.db_user.is_empty() {
            anyhow::bail!("database user is required");
        }
        if self.db_name.is_empty() {
            anyhow::bail!("database name is required");
        }
        if self.db_max_open_conns == 0 {
            anyhow::bail!("db_max_open_conns must be greater than 0");
        }
        if self.db_max_idle_conns > self.db_max_open_conns {
            anyhow::bail!("db_max_idle_conns cannot exceed db_max_open_conns");
        }
        if self.http_client_timeout == 0 {
            anyhow::bail!("HTTP client timeout must be positive");
        }
        if self.api_port == 0 {
            anyhow::bail!("API port must be greater than 0");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_host: default_db_host(),
            db_port: default_db_port(),
            db_user: default_db_user(),
            db_password: default_db_password(),
            db_name: default_db_name(),
            db_ssl_mode: default_db_ssl_mode(),
            db_max_open_conns: default_db_max_open_conns(),
            db_max_idle_conns: default_db_max_idle_conns(),
            http_client_timeout: default_http_client_timeout(),
            http_client_max_idle_conns: default_http_client_max_idle_conns(),
            http_client_idle_conn_timeout: default_http_client_idle_conn_timeout(),
            host: default_host(),
            api_port: default_api_port(),
            server_read_timeout: default_server_read_timeout(),
            server_write_timeout: default_server_write_timeout(),
            server_idle_timeout: default_server_idle_timeout(),
        }
    }
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_password() -> String {
    "root".to_string()
}

fn default_db_name() -> String {
    "webhook_processor".to_string()
}

fn default_db_ssl_mode() -> String {
    "disable".to_string()
}

fn default_db_max_open_conns() -> u32 {
    25
}

fn default_db_max_idle_conns() -> u32 {
    5
}

fn default_http_client_timeout() -> u64 {
    30
}

fn default_http_client_max_idle_conns() -> usize {
    100
}

fn default_http_client_idle_conn_timeout() -> u64 {
    90
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_server_read_timeout() -> u64 {
    30
}

fn default_server_write_timeout() -> u64 {
    30
}

fn default_server_idle_timeout() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.db_port, 5432);
        assert_eq!(config.http_client_timeout, 30);
        assert_eq!(config.api_port, 8080);
    }

    #[test]
    fn env_variables_override_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("DB_HOST", "db.internal");
            jail.set_env("DB_PORT", "5433");
            jail.set_env("DB_USER", "conveyor");
            jail.set_env("DB_PASSWORD", "secret123");
            jail.set_env("DB_NAME", "deliveries");
            jail.set_env("HTTP_CLIENT_TIMEOUT", "10");
            jail.set_env("HTTP_CLIENT_MAX_IDLE_CONNS", "50");
            jail.set_env("API_PORT", "9090");

            let config = Config::load().expect("config should load with env overrides");

            assert_eq!(config.db_host, "db.internal");
            assert_eq!(config.db_port, 5433);
            assert_eq!(config.http_client_timeout, 10);
            assert_eq!(config.http_client_max_idle_conns, 50);
            assert_eq!(config.api_port, 9090);

            Ok(())
        });
    }

    #[test]
    fn config_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                db_name = "from_file"
                http_client_timeout = 15
                "#,
            )?;

            let config = Config::load().expect("config should load from file");
            assert_eq!(config.db_name, "from_file");
            assert_eq!(config.http_client_timeout, 15);

            Ok(())
        });
    }

    #[test]
    fn database_url_is_built_from_parts() {
        let config = Config {
            db_user: "app".to_string(),
            db_password: "pw".to_string(),
            db_host: "db.example.com".to_string(),
            db_port: 6543,
            db_name: "hooks".to_string(),
            ..Default::default()
        };

        assert_eq!(
            config.database_url(),
            "postgres://app:pw@db.example.com:6543/hooks?sslmode=disable"
        );
    }

    #[test]
    fn masked_url_hides_password() {
        let config = Config { db_password: "supersecret".to_string(), ..Default::default() };

        let masked = config.database_url_masked();
        assert!(!masked.contains("supersecret"));
        assert!(masked.contains("***"));
        assert!(masked.contains("postgres"));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let config = Config { db_host: String::new(), ..Default::default() };
        assert!(config.validate().is_err());

        let config = Config { http_client_timeout: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = Config { api_port: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config =
            Config { db_max_idle_conns: 50, db_max_open_conns: 10, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn client_config_conversion_carries_timeouts() {
        let config = Config {
            http_client_timeout: 12,
            http_client_max_idle_conns: 7,
            http_client_idle_conn_timeout: 45,
            ..Default::default()
        };

        let client = config.to_client_config();
        assert_eq!(client.timeout, Duration::from_secs(12));
        assert_eq!(client.max_idle_connections, 7);
        assert_eq!(client.idle_timeout, Duration::from_secs(45));
        assert_eq!(client.user_agent, conveyor_delivery::USER_AGENT);
    }

    #[test]
    fn server_addr_parses_host_and_port() {
        let config = Config { api_port: 9000, ..Default::default() };
        let addr = config.server_addr().expect("address should parse");
        assert_eq!(addr.port(), 9000);
    }
}
