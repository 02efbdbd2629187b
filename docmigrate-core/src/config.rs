//! Connection configuration as read from the host framework's database settings.
//!
//! The configuration is read once, never mutated, and consumed by
//! [`ConnectionUri::build`](crate::uri::ConnectionUri::build) to produce the single
//! connection string used for every dispatched command.
//!
//! # Example
//!
//! ```ignore
//! use docmigrate_core::config::Configuration;
//!
//! let config = Configuration::from_json_str(r#"{
//!     "host": ["db1:27018", "db2"],
//!     "database": "app",
//!     "replicaSet": "rs0"
//! }"#)?;
//! ```

use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::Value;

use crate::error::DriverResult;

/// Port used for every host that does not carry its own.
pub const DEFAULT_PORT: u16 = 27017;

/// One entry of a host list.
///
/// Lists may hold plain `"host"` / `"host:port"` strings or `{host, port}` objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostEntry {
    Address(String),
    Server {
        host: String,
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "port_value")]
        port: Option<u16>,
    },
}

/// The shapes accepted for the `host` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostSpec {
    Single(String),
    List(Vec<HostEntry>),
}

/// Connection settings for the document database.
///
/// Field names follow the camelCase keys used by the host framework's
/// configuration files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostSpec>,
    /// Legacy alias for a host list; wins over `host` when present.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "host_list_value")]
    pub hosts: Option<Vec<HostEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "port_value")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_preference: Option<String>,
    #[serde(default)]
    pub ssl: bool,
    /// Legacy comma-separated seed list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repl_set: Option<String>,
}

/// Ports may be written as numbers or numeric strings.
fn port_value<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        Text(String),
    }

    match Option::<PortValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortValue::Number(port)) => Ok(Some(port)),
        Some(PortValue::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid port {text:?}"))),
    }
}

/// `hosts` only counts when it is a list; any other value is ignored.
fn host_list_value<'de, D>(deserializer: D) -> Result<Option<Vec<HostEntry>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        value @ Value::Array(_) => serde_json::from_value(value)
            .map(Some)
            .map_err(D::Error::custom),
        _ => Ok(None),
    }
}

impl Configuration {
    /// Creates a configuration targeting `database` on `localhost` with default settings.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..Default::default()
        }
    }

    pub fn from_json_str(input: &str) -> DriverResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_json_value(value: Value) -> DriverResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn with_host(mut self, host: HostSpec) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// The explicit port, or [`DEFAULT_PORT`].
    pub fn resolved_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// The effective host specification, honoring the `hosts` alias.
    pub fn resolved_host(&self) -> Option<HostSpec> {
        match &self.hosts {
            Some(hosts) => Some(HostSpec::List(hosts.clone())),
            None => self.host.clone(),
        }
    }

    /// User and password, only when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }
}
