//! MongoDB backend for docmigrate.
//!
//! This crate implements the [`Connector`](docmigrate_core::backend::Connector) and
//! [`Connection`](docmigrate_core::backend::Connection) traits on top of the official
//! asynchronous `mongodb` driver.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmigrate = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! Every connection is a fresh client built from the connection URI and checked with a
//! `ping`, so an unreachable server or rejected credentials surface as
//! [`DriverError::Connection`](docmigrate_core::error::DriverError::Connection).
//! Closing a connection shuts its client down.
//!
//! # Example
//!
//! ```ignore
//! use docmigrate::{config::Configuration, driver::connect, settings::SharedSettings, mongodb::MongoDbConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Configuration::from_json_str(r#"{ "host": "localhost", "database": "app" }"#)?;
//!     let driver = connect(MongoDbConnector::new(), &config, SharedSettings::default())?;
//!
//!     driver.create_migrations_table().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmigrate_mongodb;

pub mod store;

pub use store::{MongoDbConnection, MongoDbConnector, MongoDbConnectorBuilder};
