//! Core of a document-database driver for schema-migration tools.
//!
//! This crate translates the vendor-neutral verbs of a migration framework
//! ("create table", "add index", "insert record", migration bookkeeping) into
//! document-store engine calls, opening and closing a connection per call:
//!
//! - **Configuration** ([`config`]) - host, port and credential settings in every accepted shape
//! - **Connection strings** ([`uri`]) - normalization of a configuration into one connection URI
//! - **Commands** ([`command`]) - the closed set of dispatchable operations and their results
//! - **Engine abstraction** ([`backend`]) - traits implemented by each engine backend
//! - **Dispatch** ([`dispatcher`]) - open, execute, close for each command
//! - **Driver** ([`driver`]) - the semantic operations handed to the host framework
//! - **Shared settings** ([`settings`]) - bookkeeping collection names, dry run and command logging
//! - **Error handling** ([`error`]) - error and result types
//!
//! # Example
//!
//! ```ignore
//! use docmigrate_core::{config::Configuration, driver::connect, settings::SharedSettings};
//!
//! let config = Configuration::from_json_str(r#"{ "host": "localhost", "database": "app" }"#)?;
//! let driver = connect(connector, &config, SharedSettings::default())?;
//!
//! driver.create_table("users").await?;
//! driver.insert("users", bson::doc! { "name": "Alice" }).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmigrate_core;

pub mod backend;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod settings;
pub mod uri;
