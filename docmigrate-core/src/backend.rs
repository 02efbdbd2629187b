//! Engine abstraction used by the dispatcher.
//!
//! A [`Connector`] is the driver handle factory: it opens one [`Connection`] per
//! dispatched command. A connection exposes exactly one method per engine call the
//! dispatcher can make, plus [`Connection::run_raw`] for commands without a dedicated
//! variant and [`Connection::close`] to release it.
//!
//! # Implementations
//!
//! - `docmigrate-memory` - in-process engine for tests and local dry runs
//! - `docmigrate-mongodb` - MongoDB through the official async driver
//!
//! # Error Handling
//!
//! [`Connector::connect`] reports failures as
//! [`DriverError::Connection`](crate::error::DriverError::Connection). Engine calls
//! report native failures as
//! [`DriverError::EngineOperation`](crate::error::DriverError::EngineOperation), and
//! [`Connection::run_raw`] reports unknown commands as
//! [`DriverError::UnsupportedCommand`](crate::error::DriverError::UnsupportedCommand).

use async_trait::async_trait;
use bson::Document;
use std::fmt::Debug;

use crate::{
    command::{IndexInfo, IndexSpec, UpdateFlags, UpdateSummary},
    error::DriverResult,
    uri::ConnectionUri,
};

/// Opens connections to the engine.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    type Connection: Connection;

    /// Opens a connection to `uri` with `database` as the active database.
    async fn connect(&self, uri: &ConnectionUri, database: &str) -> DriverResult<Self::Connection>;
}

/// A live connection bound to one active database.
#[async_trait]
pub trait Connection: Send + Sync + Debug {
    /// Name of the active database.
    fn database(&self) -> &str;

    async fn create_collection(&self, name: &str) -> DriverResult<()>;

    async fn drop_collection(&self, name: &str) -> DriverResult<()>;

    async fn rename_collection(&self, name: &str, new_name: &str) -> DriverResult<()>;

    /// Creates `index` on `collection` and returns the index name.
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> DriverResult<String>;

    async fn drop_index(&self, collection: &str, name: &str) -> DriverResult<()>;

    /// Inserts one document and returns the number inserted.
    async fn insert_one(&self, collection: &str, document: Document) -> DriverResult<u64>;

    /// Inserts every document and returns the number inserted.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DriverResult<u64>;

    /// Deletes at most one document matching `filter`.
    async fn delete_one(&self, collection: &str, filter: Document) -> DriverResult<u64>;

    /// Deletes every document matching `filter`.
    async fn delete_many(&self, collection: &str, filter: Document) -> DriverResult<u64>;

    /// Materializes the documents matching `filter`, ordered by `sort` when given.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> DriverResult<Vec<Document>>;

    async fn list_collections(&self) -> DriverResult<Vec<String>>;

    async fn index_information(&self, collection: &str) -> DriverResult<Vec<IndexInfo>>;

    /// Drops the active database.
    async fn drop_database(&self) -> DriverResult<()>;

    async fn update_one(
        &self,
        collection: &str,
        query: Document,
        update: Document,
        flags: UpdateFlags,
    ) -> DriverResult<UpdateSummary>;

    async fn update_many(
        &self,
        collection: &str,
        query: Document,
        update: Document,
        flags: UpdateFlags,
    ) -> DriverResult<UpdateSummary>;

    /// Runs an engine command by name.
    ///
    /// Fails with [`DriverError::UnsupportedCommand`](crate::error::DriverError::UnsupportedCommand)
    /// when the engine has no such command.
    async fn run_raw(
        &self,
        name: &str,
        collection: Option<&str>,
        args: Document,
    ) -> DriverResult<Document>;

    /// Releases the connection.
    async fn close(self) -> DriverResult<()>
    where
        Self: Sized;
}
