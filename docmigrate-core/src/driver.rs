//! Semantic operations offered to the host migration framework.
//!
//! [`MigrationDriver`] is what [`connect`] hands back. Every operation packages its
//! arguments into a [`Command`] and routes it through the [`Dispatcher`]; the
//! migration and seed bookkeeping helpers do the same against the two collections
//! named in [`SharedSettings`].
//!
//! # Example
//!
//! ```ignore
//! use docmigrate_core::{config::Configuration, driver::connect, settings::SharedSettings};
//!
//! let driver = connect(connector, &Configuration::new("app"), SharedSettings::default())?;
//!
//! driver.create_collection("users").await?;
//! driver.add_index("users", "users_email_idx", "email", true).await?;
//! driver.add_migration_record("20240101-create-users").await?;
//! ```

use bson::{Bson, DateTime, Document, doc};
use chrono::{DateTime as ChronoDateTime, Utc};
use std::sync::Arc;

use crate::{
    backend::Connector,
    command::{Command, FindQuery, IndexColumns, IndexInfo, IndexSpec, Outcome, Records, UpdateSpec},
    config::Configuration,
    dispatcher::Dispatcher,
    error::{DriverError, DriverResult},
    settings::{CommandLogger, SharedSettings, TracingLogger},
    uri::ConnectionUri,
};

/// A row of the migration or seed log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub name: String,
    pub run_on: ChronoDateTime<Utc>,
}

impl RunRecord {
    pub fn new(name: impl Into<String>, run_on: ChronoDateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            run_on,
        }
    }

    pub fn to_document(&self) -> Document {
        doc! {
            "name": self.name.clone(),
            "run_on": DateTime::from_chrono(self.run_on),
        }
    }

    pub fn from_document(document: &Document) -> DriverResult<Self> {
        Ok(Self {
            name: document.get_str("name")?.to_string(),
            run_on: document.get_datetime("run_on")?.to_chrono(),
        })
    }
}

/// Builds the connection URI and wraps it in a driver that logs through `tracing`.
///
/// # Errors
///
/// Returns [`DriverError::Configuration`] if the configuration has no database.
pub fn connect<C: Connector>(
    connector: C,
    config: &Configuration,
    settings: SharedSettings,
) -> DriverResult<MigrationDriver<C>> {
    connect_with_logger(connector, config, settings, Arc::new(TracingLogger))
}

pub fn connect_with_logger<C: Connector>(
    connector: C,
    config: &Configuration,
    settings: SharedSettings,
    logger: Arc<dyn CommandLogger>,
) -> DriverResult<MigrationDriver<C>> {
    Ok(MigrationDriver::new(Dispatcher::new(
        connector,
        ConnectionUri::build(config)?,
        settings,
        logger,
    )))
}

#[derive(Debug)]
pub struct MigrationDriver<C: Connector> {
    dispatcher: Dispatcher<C>,
}

impl<C: Connector> MigrationDriver<C> {
    pub fn new(dispatcher: Dispatcher<C>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    /// Dispatches an arbitrary command.
    pub async fn run(&self, command: Command) -> DriverResult<Outcome<C::Connection>> {
        self.dispatcher.dispatch(command).await
    }

    async fn run_done(&self, command: Command) -> DriverResult<()> {
        self.run(command).await.map(|_| ())
    }

    pub async fn create_collection(&self, name: &str) -> DriverResult<()> {
        self.run_done(Command::CreateCollection {
            collection: name.to_string(),
        })
        .await
    }

    pub async fn create_table(&self, name: &str) -> DriverResult<()> {
        self.create_collection(name).await
    }

    pub async fn drop_collection(&self, name: &str) -> DriverResult<()> {
        self.run_done(Command::DropCollection {
            collection: name.to_string(),
        })
        .await
    }

    pub async fn drop_table(&self, name: &str) -> DriverResult<()> {
        self.drop_collection(name).await
    }

    pub async fn rename_collection(&self, name: &str, new_name: &str) -> DriverResult<()> {
        self.run_done(Command::RenameCollection {
            collection: name.to_string(),
            new_collection: new_name.to_string(),
        })
        .await
    }

    pub async fn rename_table(&self, name: &str, new_name: &str) -> DriverResult<()> {
        self.rename_collection(name, new_name).await
    }

    /// Adds an index from positional arguments.
    pub async fn add_index(
        &self,
        collection: &str,
        name: &str,
        columns: impl Into<IndexColumns>,
        unique: bool,
    ) -> DriverResult<()> {
        self.add_index_spec(collection, IndexSpec::new(name, columns, unique))
            .await
    }

    /// Adds an index from a prepared definition, see [`IndexSpec::from_options`].
    pub async fn add_index_spec(&self, collection: &str, index: IndexSpec) -> DriverResult<()> {
        self.run_done(Command::CreateIndex {
            collection: collection.to_string(),
            index,
        })
        .await
    }

    pub async fn remove_index(&self, collection: &str, name: &str) -> DriverResult<()> {
        self.run_done(Command::DropIndex {
            collection: collection.to_string(),
            name: name.to_string(),
        })
        .await
    }

    /// Inserts one record or a list of records and returns how many were inserted.
    pub async fn insert(&self, collection: &str, records: impl Into<Records>) -> DriverResult<u64> {
        Ok(self
            .run(Command::Insert {
                collection: collection.to_string(),
                records: records.into(),
            })
            .await?
            .affected())
    }

    /// Deletes at most one document for a single filter, every match for a list.
    pub async fn remove(&self, collection: &str, filter: impl Into<Records>) -> DriverResult<u64> {
        Ok(self
            .run(Command::Remove {
                collection: collection.to_string(),
                filter: filter.into(),
            })
            .await?
            .affected())
    }

    pub async fn find(&self, collection: &str, query: FindQuery) -> DriverResult<Vec<Document>> {
        self.run(Command::Find {
            collection: collection.to_string(),
            query,
        })
        .await?
        .into_documents()
    }

    /// Updates the engine's default number of matches (one document).
    pub async fn update_one(&self, collection: &str, spec: UpdateSpec) -> DriverResult<u64> {
        Ok(self
            .run(Command::Update {
                collection: collection.to_string(),
                spec,
            })
            .await?
            .affected())
    }

    pub async fn update_many(&self, collection: &str, spec: UpdateSpec) -> DriverResult<u64> {
        Ok(self
            .run(Command::UpdateMany {
                collection: collection.to_string(),
                spec,
            })
            .await?
            .affected())
    }

    pub async fn get_collection_names(&self) -> DriverResult<Vec<String>> {
        self.run(Command::Collections).await?.into_collections()
    }

    pub async fn get_indexes(&self, collection: &str) -> DriverResult<Vec<IndexInfo>> {
        self.run(Command::IndexInformation {
            collection: collection.to_string(),
        })
        .await?
        .into_indexes()
    }

    /// Rebinds later operations to another database.
    pub fn switch_database(&mut self, database: impl Into<String>) {
        self.dispatcher.switch_database(database);
    }

    /// Databases are created on first write, so there is nothing to do.
    pub async fn create_database(&self, _name: &str) -> DriverResult<()> {
        Ok(())
    }

    /// Drops the active database.
    pub async fn drop_database(&self) -> DriverResult<()> {
        self.run_done(Command::DropDatabase).await
    }

    /// Returns an open connection. The caller must close it.
    pub async fn get_db_instance(&self) -> DriverResult<C::Connection> {
        self.run(Command::GetDbInstance).await?.into_handle()
    }

    /// Connections are closed after every command, so there is nothing to release.
    pub async fn close(&self) -> DriverResult<()> {
        Ok(())
    }

    pub async fn build_where_clause(&self) -> DriverResult<()> {
        Err(DriverError::Unimplemented(
            "where clauses have no document-store implementation".into(),
        ))
    }

    /// Generic updates without a command need a query language the driver does not have.
    /// Use [`MigrationDriver::update_one`] or [`MigrationDriver::update_many`].
    pub async fn update(&self) -> DriverResult<()> {
        Err(DriverError::Unimplemented(
            "generic updates have no document-store implementation".into(),
        ))
    }

    pub async fn create_migrations_table(&self) -> DriverResult<()> {
        self.create_collection(&self.dispatcher.settings().migration_table)
            .await
    }

    pub async fn create_seeds_table(&self) -> DriverResult<()> {
        self.create_collection(&self.dispatcher.settings().seed_table)
            .await
    }

    pub async fn add_migration_record(&self, name: &str) -> DriverResult<()> {
        self.add_record(&self.dispatcher.settings().migration_table, name)
            .await
    }

    pub async fn add_seed_record(&self, name: &str) -> DriverResult<()> {
        self.add_record(&self.dispatcher.settings().seed_table, name)
            .await
    }

    /// Applied migrations, most recent first.
    pub async fn all_loaded_migrations(&self) -> DriverResult<Vec<RunRecord>> {
        self.loaded_records(&self.dispatcher.settings().migration_table)
            .await
    }

    /// Applied seeds, most recent first.
    pub async fn all_loaded_seeds(&self) -> DriverResult<Vec<RunRecord>> {
        self.loaded_records(&self.dispatcher.settings().seed_table)
            .await
    }

    pub async fn delete_migration(&self, name: &str) -> DriverResult<()> {
        self.delete_record(&self.dispatcher.settings().migration_table, name)
            .await
    }

    pub async fn delete_seed(&self, name: &str) -> DriverResult<()> {
        self.delete_record(&self.dispatcher.settings().seed_table, name)
            .await
    }

    async fn add_record(&self, collection: &str, name: &str) -> DriverResult<()> {
        self.insert(collection, RunRecord::new(name, Utc::now()).to_document())
            .await
            .map(|_| ())
    }

    async fn loaded_records(&self, collection: &str) -> DriverResult<Vec<RunRecord>> {
        self.find(
            collection,
            FindQuery::sorted(Document::new(), doc! { "run_on": -1 }),
        )
        .await?
        .iter()
        .map(RunRecord::from_document)
        .collect()
    }

    async fn delete_record(&self, collection: &str, name: &str) -> DriverResult<()> {
        self.remove(collection, doc! { "name": Bson::String(name.to_string()) })
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn run_record_round_trips_through_bson() {
        let record = RunRecord::new("001-init", Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
        assert_eq!(RunRecord::from_document(&record.to_document()).unwrap(), record);
    }

    #[test]
    fn run_record_requires_fields() {
        assert!(matches!(
            RunRecord::from_document(&doc! { "name": "x" }),
            Err(DriverError::Serialization(_))
        ));
    }
}
