//! Document-database driver for schema-migration tools.
//!
//! This crate is the entry point of the docmigrate workspace. It re-exports the core
//! types and gives access to the engine backends.
//!
//! # Features
//!
//! - **Connection strings** - every accepted host, port and credential shape becomes one URI
//! - **Typed commands** - a closed command set with an explicit raw pass-through
//! - **Per-call connections** - open, execute, close, except for retained handles
//! - **Bookkeeping** - migration and seed logs kept in two collections
//! - **Dry run** - commands are logged but never reach the engine
//!
//! # Quick Start
//!
//! ```ignore
//! use docmigrate::{prelude::*, memory::MemoryConnector};
//!
//! #[tokio::main]
//! async fn main() -> DriverResult<()> {
//!     let config = Configuration::from_json_str(r#"{ "host": "localhost", "port": 27017, "database": "app" }"#)?;
//!     let driver = connect(MemoryConnector::new(), &config, SharedSettings::default())?;
//!
//!     driver.create_table("items").await?;
//!     driver.add_index("items", "items_name_idx", "name", true).await?;
//!     driver.add_migration_record("20240101-create-items").await?;
//!
//!     for record in driver.all_loaded_migrations().await? {
//!         println!("{} ran on {}", record.name, record.run_on);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Synchronous hosts
//!
//! [`blocking::BlockingDriver`] wraps a driver in its own runtime.
//!
//! # Backends
//!
//! - [`memory`] - in-process engine for tests and local dry runs
//! - [`mongodb`] - MongoDB (requires the `mongodb` feature)

pub mod blocking;
pub mod prelude;

pub use docmigrate_core::{backend, command, config, dispatcher, driver, error, settings, uri};

// Re-export BSON types for convenience
pub use bson;

/// In-memory engine backend.
pub mod memory {
    pub use docmigrate_memory::{MemoryConnection, MemoryConnector, MemoryConnectorBuilder};
}

/// MongoDB engine backend.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmigrate_mongodb::{MongoDbConnection, MongoDbConnector, MongoDbConnectorBuilder};
}
