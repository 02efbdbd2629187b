//! Synchronous wrapper for hosts that cannot drive futures themselves.
//!
//! [`BlockingDriver`] owns a single-threaded tokio runtime and blocks on each
//! operation of the wrapped [`MigrationDriver`]. Do not use it from inside an async
//! context; the runtime refuses to block there.

use bson::Document;
use tokio::runtime::{Builder, Runtime};

use docmigrate_core::{
    backend::Connector,
    command::{Command, FindQuery, IndexColumns, IndexInfo, IndexSpec, Outcome, Records, UpdateSpec},
    driver::{MigrationDriver, RunRecord},
    error::{DriverError, DriverResult},
};

fn runtime_error(err: std::io::Error) -> DriverError {
    DriverError::Configuration(format!("failed to start async runtime: {err}"))
}

#[derive(Debug)]
pub struct BlockingDriver<C: Connector> {
    runtime: Runtime,
    driver: MigrationDriver<C>,
}

impl<C: Connector> BlockingDriver<C> {
    pub fn new(driver: MigrationDriver<C>) -> DriverResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(runtime_error)?;

        Ok(Self { runtime, driver })
    }

    pub fn driver(&self) -> &MigrationDriver<C> {
        &self.driver
    }

    pub fn into_inner(self) -> MigrationDriver<C> {
        self.driver
    }

    pub fn run(&self, command: Command) -> DriverResult<Outcome<C::Connection>> {
        self.runtime.block_on(self.driver.run(command))
    }

    pub fn create_collection(&self, name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.create_collection(name))
    }

    pub fn drop_collection(&self, name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.drop_collection(name))
    }

    pub fn rename_collection(&self, name: &str, new_name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.rename_collection(name, new_name))
    }

    pub fn create_table(&self, name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.create_table(name))
    }

    pub fn drop_table(&self, name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.drop_table(name))
    }

    pub fn rename_table(&self, name: &str, new_name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.rename_table(name, new_name))
    }

    pub fn add_index(
        &self,
        collection: &str,
        name: &str,
        columns: impl Into<IndexColumns>,
        unique: bool,
    ) -> DriverResult<()> {
        self.runtime
            .block_on(self.driver.add_index(collection, name, columns, unique))
    }

    pub fn add_index_spec(&self, collection: &str, index: IndexSpec) -> DriverResult<()> {
        self.runtime.block_on(self.driver.add_index_spec(collection, index))
    }

    pub fn remove_index(&self, collection: &str, name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.remove_index(collection, name))
    }

    pub fn insert(&self, collection: &str, records: impl Into<Records>) -> DriverResult<u64> {
        self.runtime.block_on(self.driver.insert(collection, records))
    }

    pub fn remove(&self, collection: &str, filter: impl Into<Records>) -> DriverResult<u64> {
        self.runtime.block_on(self.driver.remove(collection, filter))
    }

    pub fn update_one(&self, collection: &str, spec: UpdateSpec) -> DriverResult<u64> {
        self.runtime.block_on(self.driver.update_one(collection, spec))
    }

    pub fn update_many(&self, collection: &str, spec: UpdateSpec) -> DriverResult<u64> {
        self.runtime.block_on(self.driver.update_many(collection, spec))
    }

    pub fn find(&self, collection: &str, query: FindQuery) -> DriverResult<Vec<Document>> {
        self.runtime.block_on(self.driver.find(collection, query))
    }

    pub fn get_collection_names(&self) -> DriverResult<Vec<String>> {
        self.runtime.block_on(self.driver.get_collection_names())
    }

    pub fn get_indexes(&self, collection: &str) -> DriverResult<Vec<IndexInfo>> {
        self.runtime.block_on(self.driver.get_indexes(collection))
    }

    pub fn create_migrations_table(&self) -> DriverResult<()> {
        self.runtime.block_on(self.driver.create_migrations_table())
    }

    pub fn add_migration_record(&self, name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.add_migration_record(name))
    }

    pub fn all_loaded_migrations(&self) -> DriverResult<Vec<RunRecord>> {
        self.runtime.block_on(self.driver.all_loaded_migrations())
    }

    pub fn delete_migration(&self, name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.delete_migration(name))
    }

    pub fn create_seeds_table(&self) -> DriverResult<()> {
        self.runtime.block_on(self.driver.create_seeds_table())
    }

    pub fn add_seed_record(&self, name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.add_seed_record(name))
    }

    pub fn all_loaded_seeds(&self) -> DriverResult<Vec<RunRecord>> {
        self.runtime.block_on(self.driver.all_loaded_seeds())
    }

    pub fn delete_seed(&self, name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.delete_seed(name))
    }

    pub fn switch_database(&mut self, database: impl Into<String>) {
        self.driver.switch_database(database);
    }

    pub fn create_database(&self, name: &str) -> DriverResult<()> {
        self.runtime.block_on(self.driver.create_database(name))
    }

    pub fn drop_database(&self) -> DriverResult<()> {
        self.runtime.block_on(self.driver.drop_database())
    }

    /// The returned connection is not closed by the driver.
    pub fn get_db_instance(&self) -> DriverResult<C::Connection> {
        self.runtime.block_on(self.driver.get_db_instance())
    }

    pub fn close(&self) -> DriverResult<()> {
        self.runtime.block_on(self.driver.close())
    }
}
