//! In-memory engine backend for docmigrate.
//!
//! This crate provides a thread-safe, in-process implementation of the
//! [`Connector`](docmigrate_core::backend::Connector) and
//! [`Connection`](docmigrate_core::backend::Connection) traits. It behaves like a
//! small document server: collections, ordered documents, unique indexes, filters,
//! sorting and operator updates. It is meant for tests and local dry runs of a
//! migration set.
//!
//! # Features
//!
//! - **Shared engine** - every connection of a connector sees the same databases
//! - **Connection accounting** - open and total connection counters for leak checks
//! - **Failure injection** - an offline switch that makes connection attempts fail
//!
//! # Quick Start
//!
//! ```ignore
//! use docmigrate_core::{config::Configuration, driver::connect, settings::SharedSettings};
//! use docmigrate_memory::MemoryConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = MemoryConnector::new();
//!     let driver = connect(connector.clone(), &Configuration::new("app"), SharedSettings::default())?;
//!
//!     driver.create_collection("event").await?;
//!     driver.insert("event", bson::doc! { "title": "launch" }).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmigrate_memory;

pub mod store;
pub(crate) mod evaluator;

pub use store::{MemoryConnection, MemoryConnector, MemoryConnectorBuilder};
