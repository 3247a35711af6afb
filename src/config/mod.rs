/// Configuration management for the customer notification service
///
/// Handles server configuration, database connections, request gating and
/// notification timing parameters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Header gating configuration
    pub auth: AuthConfig,
    /// Notification task timing
    pub notification: NotificationConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Read isolation applied to every pooled SQLite connection
///
/// This changes what a lookup can observe while a notification task is
/// mid-transaction, so it is always an explicit choice:
/// - `ReadUncommitted`: enables `PRAGMA read_uncommitted` over a shared cache,
///   which lets readers see rows another connection has not committed yet.
///   This is what the service has always shipped with.
/// - `Serializable`: SQLite's normal behaviour, readers only see committed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadIsolation {
    ReadUncommitted,
    Serializable,
}

impl ReadIsolation {
    /// Parse from the environment representation ("read_uncommitted" / "serializable")
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "read_uncommitted" | "read-uncommitted" => Some(Self::ReadUncommitted),
            "serializable" => Some(Self::Serializable),
            _ => None,
        }
    }
}

/// Database configuration for the customer record store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file (created if missing)
    pub path: String,
    /// Read isolation level for all connections
    pub read_isolation: ReadIsolation,
    /// Maximum number of pooled connections shared by handlers and tasks
    pub max_connections: u32,
}

/// Request gating configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret expected in the `x-session-token` header
    pub session_token: String,
}

/// Notification delay parameters
///
/// Each task sleeps `unit * (base_units + jitter)` where jitter is drawn
/// uniformly from `0..jitter_units`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Deterministic lower bound, in units
    pub base_units: u32,
    /// Exclusive upper bound of the random jitter, in units
    pub jitter_units: u32,
    /// Length of a single unit
    pub unit: Duration,
    /// Optional RNG seed for reproducible delays
    pub seed: Option<u64>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            base_units: 10,
            jitter_units: 10,
            unit: Duration::from_secs(1),
            seed: None,
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("CUSTOMER_NOTIFY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("CUSTOMER_NOTIFY_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .unwrap_or(8080),
            },
            database: DatabaseConfig {
                path: std::env::var("CUSTOMER_NOTIFY_DB_PATH")
                    .unwrap_or_else(|_| "customers.db".to_string()),
                read_isolation: std::env::var("CUSTOMER_NOTIFY_READ_ISOLATION")
                    .ok()
                    .and_then(|value| ReadIsolation::parse(&value))
                    .unwrap_or(ReadIsolation::ReadUncommitted),
                max_connections: std::env::var("CUSTOMER_NOTIFY_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(5),
            },
            auth: AuthConfig {
                session_token: std::env::var("CUSTOMER_NOTIFY_SESSION_TOKEN")
                    .unwrap_or_else(|_| "authorized-user".to_string()),
            },
            notification: NotificationConfig {
                seed: std::env::var("CUSTOMER_NOTIFY_DELAY_SEED")
                    .ok()
                    .and_then(|value| value.parse().ok()),
                ..NotificationConfig::default()
            },
        }
    }
}
