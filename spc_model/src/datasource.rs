//! Data sources: registered external database connections.

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::validation::{ValidationErrors, check_text};

/// A stored data source as returned to callers. The password is write-only
/// and has no field here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: i64,
    pub name: String,
    pub engine: Engine,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// What a caller submits to create a data source.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSourceDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

// Keeps the password out of logs.
impl std::fmt::Debug for DataSourceDraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceDraft")
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A draft that passed validation, with the port resolved.
#[derive(Clone, PartialEq)]
pub struct NewDataSource {
    pub name: String,
    pub engine: Engine,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for NewDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewDataSource")
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl DataSourceDraft {
    pub fn new(
        name: impl Into<String>,
        engine: Engine,
        host: impl Into<String>,
        database_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            engine,
            host: host.into(),
            port: None,
            database_name: database_name.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn with_port(mut self, port: i64) -> Self {
        self.port = Some(port);
        self
    }

    /// The explicit port, or the engine's default when none was given.
    pub fn effective_port(&self) -> i64 {
        self.port
            .unwrap_or_else(|| i64::from(self.engine.default_port()))
    }

    pub fn validate(&self) -> Result<NewDataSource, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        check_text(&mut errors, "name", &self.name, true, 100);
        check_text(&mut errors, "host", &self.host, true, 255);
        if !self.host.trim().is_empty() && !is_valid_host(&self.host) {
            errors.add("host", "Enter a valid host name or IP address.");
        }
        check_text(&mut errors, "database_name", &self.database_name, true, 255);
        check_text(&mut errors, "username", &self.username, true, 255);
        check_text(&mut errors, "password", &self.password, true, 255);

        let port = self.effective_port();
        if port < 1 {
            errors.add("port", "Ensure this value is greater than or equal to 1.");
        } else if port > i64::from(u16::MAX) {
            errors.add("port", "Ensure this value is less than or equal to 65535.");
        }
        let port = u16::try_from(port).unwrap_or_default();

        errors.into_result(NewDataSource {
            name: self.name.trim().to_string(),
            engine: self.engine,
            host: self.host.trim().to_string(),
            port,
            database_name: self.database_name.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

/// A DNS host name (optionally `HOST\INSTANCE` for SQL Server), an IPv4
/// address, or a bracketed IPv6 address. Ports belong in `port`.
fn is_valid_host(host: &str) -> bool {
    let host = host.trim();
    if let Some(inner) = host.strip_prefix('[') {
        return inner
            .strip_suffix(']')
            .is_some_and(|addr| addr.parse::<Ipv6Addr>().is_ok());
    }

    let (name, instance) = match host.split_once('\\') {
        Some((name, instance)) => (name, Some(instance)),
        None => (host, None),
    };
    let instance_ok = instance.is_none_or(|instance| {
        !instance.is_empty()
            && instance
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$'))
    });
    let name_ok = if name.chars().all(|c| c.is_ascii_digit() || c == '.') {
        name.parse::<Ipv4Addr>().is_ok()
    } else {
        name.split('.').all(is_valid_label)
    };
    instance_ok && name_ok
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Outcome of a connection test. A failed test is a normal result, not an
/// error; `message` is opaque text meant for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResult {
    pub success: bool,
    pub message: String,
}

impl ConnectionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "Connection Successful".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "Connection failed".to_string()
        } else {
            message
        };
        Self {
            success: false,
            message,
        }
    }
}
