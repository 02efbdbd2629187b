//! Connection string construction.
//!
//! [`ConnectionUri::build`] normalizes the accepted host, port and credential
//! shapes of a [`Configuration`] into a single URI of the form
//! `mongodb://[user:password@]host:port[,host:port...]/database[?param=value&...]`.
//! Building is pure: no I/O happens here, and the only failure is a missing database.

use std::fmt;

use crate::{
    config::{Configuration, HostEntry, HostSpec},
    error::{DriverError, DriverResult},
};

pub const SCHEME: &str = "mongodb";

/// A fully resolved connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUri {
    credentials: Option<(String, String)>,
    hosts: Vec<String>,
    database: String,
    params: Vec<(&'static str, String)>,
    rendered: String,
}

impl ConnectionUri {
    /// Builds the connection URI for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Configuration`] if `database` is not set.
    pub fn build(config: &Configuration) -> DriverResult<Self> {
        let database = config
            .database
            .clone()
            .ok_or_else(|| DriverError::Configuration("database must be defined".into()))?;
        let port = config.resolved_port();

        let hosts = match &config.repl_set {
            Some(seeds) => seed_list(seeds, port),
            None => host_list(config.resolved_host().as_ref(), port),
        };

        let credentials = config
            .credentials()
            .map(|(user, password)| (user.to_string(), password.to_string()));

        let mut params = Vec::new();
        if config.ssl {
            params.push(("ssl", "true".to_string()));
        }
        if let (Some(auth_source), Some(_)) = (&config.auth_source, &credentials) {
            params.push(("authSource", auth_source.clone()));
        }
        if let Some(replica_set) = &config.replica_set {
            params.push(("replicaSet", replica_set.clone()));
        }
        if let Some(read_preference) = &config.read_preference {
            params.push(("readPreference", read_preference.clone()));
        }

        let rendered = render(credentials.as_ref(), &hosts, &database, &params);

        Ok(Self {
            credentials,
            hosts,
            database,
            params,
            rendered,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// The `host:port` entries, in configuration order.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn params(&self) -> &[(&'static str, String)] {
        &self.params
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }
}

impl fmt::Display for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl AsRef<str> for ConnectionUri {
    fn as_ref(&self) -> &str {
        &self.rendered
    }
}

fn with_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{port}")
    }
}

fn host_list(spec: Option<&HostSpec>, port: u16) -> Vec<String> {
    match spec {
        None => vec![format!("localhost:{port}")],
        Some(HostSpec::Single(host)) => vec![format!("{host}:{port}")],
        Some(HostSpec::List(entries)) => entries
            .iter()
            .map(|entry| match entry {
                HostEntry::Address(address) => with_port(address, port),
                HostEntry::Server { host, port: own } => format!("{host}:{}", own.unwrap_or(port)),
            })
            .collect(),
    }
}

// Legacy `replSet`: every seed shares the resolved port.
fn seed_list(seeds: &str, port: u16) -> Vec<String> {
    seeds
        .split(',')
        .map(str::trim)
        .filter(|seed| !seed.is_empty())
        .map(|seed| with_port(seed, port))
        .collect()
}

fn render(
    credentials: Option<&(String, String)>,
    hosts: &[String],
    database: &str,
    params: &[(&'static str, String)],
) -> String {
    let mut uri = format!("{SCHEME}://");

    if let Some((user, password)) = credentials {
        uri.push_str(&format!("{user}:{password}@"));
    }

    uri.push_str(&hosts.join(","));
    uri.push('/');
    uri.push_str(database);

    if !params.is_empty() {
        uri.push('?');
        uri.push_str(
            &params
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join("&"),
        );
    }

    uri
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(config: &Configuration) -> String {
        ConnectionUri::build(config).unwrap().to_string()
    }

    #[test]
    fn missing_database_is_a_configuration_error() {
        let config = Configuration {
            host: Some(HostSpec::Single("db".into())),
            ..Default::default()
        };

        assert!(matches!(
            ConnectionUri::build(&config),
            Err(DriverError::Configuration(_))
        ));
    }

    #[test]
    fn single_host_with_explicit_port() {
        let config = Configuration::new("testdb")
            .with_host(HostSpec::Single("localhost".into()))
            .with_port(27017);

        assert_eq!(uri(&config), "mongodb://localhost:27017/testdb");
    }

    #[test]
    fn defaults_to_localhost() {
        assert_eq!(uri(&Configuration::new("app")), "mongodb://localhost:27017/app");
        assert_eq!(
            uri(&Configuration::new("app").with_port(4000)),
            "mongodb://localhost:4000/app"
        );
    }

    #[test]
    fn string_list_appends_port_only_when_missing() {
        let config = Configuration::new("app").with_host(HostSpec::List(vec![
            HostEntry::Address("a".into()),
            HostEntry::Address("b:27018".into()),
            HostEntry::Address("c".into()),
        ]));

        assert_eq!(uri(&config), "mongodb://a:27017,b:27018,c:27017/app");
    }

    #[test]
    fn object_list_uses_own_port_or_default() {
        let config = Configuration::new("app").with_port(9000).with_host(HostSpec::List(vec![
            HostEntry::Server { host: "a".into(), port: Some(1000) },
            HostEntry::Server { host: "b".into(), port: None },
        ]));

        let built = ConnectionUri::build(&config).unwrap();
        assert_eq!(built.hosts(), ["a:1000", "b:9000"]);
        assert_eq!(built.as_str(), "mongodb://a:1000,b:9000/app");
    }

    #[test]
    fn credentials_only_when_both_present() {
        let both = Configuration::new("app").with_credentials("me", "pw");
        assert_eq!(uri(&both), "mongodb://me:pw@localhost:27017/app");

        let mut user_only = Configuration::new("app");
        user_only.user = Some("me".into());
        assert_eq!(uri(&user_only), "mongodb://localhost:27017/app");

        let mut password_only = Configuration::new("app");
        password_only.password = Some("pw".into());
        assert_eq!(uri(&password_only), "mongodb://localhost:27017/app");
    }

    #[test]
    fn params_in_fixed_order() {
        let mut config = Configuration::new("app").with_credentials("me", "pw");
        config.read_preference = Some("secondary".into());
        config.replica_set = Some("rs0".into());
        config.auth_source = Some("admin".into());
        config.ssl = true;

        assert_eq!(
            uri(&config),
            "mongodb://me:pw@localhost:27017/app?ssl=true&authSource=admin&replicaSet=rs0&readPreference=secondary"
        );
    }

    #[test]
    fn auth_source_requires_credentials() {
        let mut config = Configuration::new("app");
        config.auth_source = Some("admin".into());
        assert_eq!(uri(&config), "mongodb://localhost:27017/app");

        config.replica_set = Some("rs0".into());
        assert_eq!(uri(&config), "mongodb://localhost:27017/app?replicaSet=rs0");
    }

    #[test]
    fn legacy_repl_set_shares_port_and_options() {
        let mut config = Configuration::new("app").with_port(27019);
        config.repl_set = Some("a, b,c:1".into());
        config.ssl = true;

        assert_eq!(uri(&config), "mongodb://a:27019,b:27019,c:1/app?ssl=true");
    }
}
