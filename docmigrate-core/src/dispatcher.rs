//! Command dispatch.
//!
//! The [`Dispatcher`] owns the connection URI and a [`Connector`]. Each call to
//! [`Dispatcher::dispatch`] runs through
//! `Idle -> ConnectionOpening -> ConnectionOpen -> Executing -> {Succeeded, Failed} -> Closed`:
//! it logs the call, opens a fresh connection, executes exactly one engine operation,
//! closes the connection and hands back the normalized [`Outcome`].
//!
//! Two commands bend that sequence:
//!
//! - With `dry_run` set, every command except [`Command::GetDbInstance`] resolves to
//!   [`Outcome::Done`] without contacting the engine.
//! - [`Command::GetDbInstance`] returns the open connection as [`Outcome::Handle`] and
//!   skips the close; the caller owns it from then on.
//!
//! Nothing is retried, pooled or timed out here. Concurrent dispatches each own their
//! connection and are not ordered relative to one another.

use bson::{Document, doc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    backend::{Connection, Connector},
    command::{Command, Outcome, Records},
    error::DriverResult,
    settings::{CommandLogger, SharedSettings},
    uri::ConnectionUri,
};

#[derive(Debug)]
pub struct Dispatcher<C: Connector> {
    connector: C,
    uri: ConnectionUri,
    database: String,
    settings: SharedSettings,
    logger: Arc<dyn CommandLogger>,
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(
        connector: C,
        uri: ConnectionUri,
        settings: SharedSettings,
        logger: Arc<dyn CommandLogger>,
    ) -> Self {
        Self {
            database: uri.database().to_string(),
            connector,
            uri,
            settings,
            logger,
        }
    }

    pub fn uri(&self) -> &ConnectionUri {
        &self.uri
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// The database new connections are bound to.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Rebinds subsequent dispatches to `database`.
    ///
    /// Takes `&mut self`, so it cannot overlap a dispatch in flight on the same instance.
    pub fn switch_database(&mut self, database: impl Into<String>) {
        self.database = database.into();
    }

    /// Executes `command` on a fresh connection.
    ///
    /// # Errors
    ///
    /// - [`DriverError::Connection`](crate::error::DriverError::Connection) if the engine is unreachable
    /// - [`DriverError::EngineOperation`](crate::error::DriverError::EngineOperation) if the engine call fails
    /// - [`DriverError::UnsupportedCommand`](crate::error::DriverError::UnsupportedCommand) for unknown raw commands
    pub async fn dispatch(&self, command: Command) -> DriverResult<Outcome<C::Connection>> {
        self.logger.log_command(&command.descriptor());

        if self.settings.dry_run && !command.retains_handle() {
            debug!(command = command.name(), "dry run, skipping engine call");
            return Ok(Outcome::Done);
        }

        let connection = self.connector.connect(&self.uri, &self.database).await?;
        debug!(command = command.name(), database = %self.database, "connection open");

        if command.retains_handle() {
            return Ok(Outcome::Handle(connection));
        }

        let name = command.name().to_string();
        let result = execute(&connection, command).await;

        // The outcome is already decided; a failing close must not replace it.
        match connection.close().await {
            Ok(()) => debug!(command = %name, "connection closed"),
            Err(err) => warn!(command = %name, error = %err, "failed to close connection"),
        }

        result
    }
}

async fn execute<K: Connection, H>(connection: &K, command: Command) -> DriverResult<Outcome<H>> {
    Ok(match command {
        Command::CreateCollection { collection } => {
            connection.create_collection(&collection).await?;
            Outcome::Done
        }
        Command::DropCollection { collection } => {
            connection.drop_collection(&collection).await?;
            Outcome::Done
        }
        Command::RenameCollection {
            collection,
            new_collection,
        } => {
            connection
                .rename_collection(&collection, &new_collection)
                .await?;
            Outcome::Done
        }
        Command::CreateIndex { collection, index } => {
            Outcome::IndexCreated(connection.create_index(&collection, &index).await?)
        }
        Command::DropIndex { collection, name } => {
            connection.drop_index(&collection, &name).await?;
            Outcome::Done
        }
        Command::Insert { collection, records } => Outcome::Inserted(match records {
            Records::One(document) => connection.insert_one(&collection, document).await?,
            Records::Many(documents) if documents.is_empty() => 0,
            Records::Many(documents) => connection.insert_many(&collection, documents).await?,
        }),
        Command::Remove { collection, filter } => Outcome::Deleted(match filter {
            Records::One(filter) => connection.delete_one(&collection, filter).await?,
            Records::Many(filters) if filters.is_empty() => 0,
            Records::Many(filters) => {
                connection
                    .delete_many(&collection, any_of(filters))
                    .await?
            }
        }),
        Command::Find { collection, query } => Outcome::Documents(
            connection
                .find(&collection, query.filter, query.sort)
                .await?,
        ),
        Command::Collections => Outcome::Collections(connection.list_collections().await?),
        Command::IndexInformation { collection } => {
            Outcome::Indexes(connection.index_information(&collection).await?)
        }
        Command::DropDatabase => {
            connection.drop_database().await?;
            Outcome::Done
        }
        Command::Update { collection, spec } => Outcome::Updated(
            connection
                .update_one(&collection, spec.query, spec.update, spec.flags)
                .await?,
        ),
        Command::UpdateMany { collection, spec } => Outcome::Updated(
            connection
                .update_many(&collection, spec.query, spec.update, spec.flags)
                .await?,
        ),
        Command::Raw {
            name,
            collection,
            args,
        } => Outcome::Raw(
            connection
                .run_raw(&name, collection.as_deref(), args)
                .await?,
        ),
        // Handled by the caller before a connection is borrowed.
        Command::GetDbInstance => Outcome::Done,
    })
}

// A list of filters removes every document matching any of them.
fn any_of(mut filters: Vec<Document>) -> Document {
    if filters.len() == 1 {
        return filters.remove(0);
    }

    doc! { "$or": filters }
}
