use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, doc};
use mongodb::{
    Client, Collection as MongoCollection, Database, IndexModel,
    error::{Error as MongoError, ErrorKind},
    options::{ClientOptions, FindOptions, IndexOptions, UpdateOptions},
    results::UpdateResult,
};
use docmigrate_core::{
    backend::{Connection, Connector},
    command::{IndexInfo, IndexSpec, UpdateFlags, UpdateSummary},
    error::{DriverError, DriverResult},
    uri::ConnectionUri,
};

/// Server error code for an unknown command name.
const COMMAND_NOT_FOUND: i32 = 59;


/// Opens a fresh [`Client`] per connection and verifies it with a `ping`.
#[derive(Debug, Default, Clone)]
pub struct MongoDbConnector {
    app_name: Option<String>,
}

impl MongoDbConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MongoDbConnectorBuilder {
        MongoDbConnectorBuilder::default()
    }
}

#[async_trait]
impl Connector for MongoDbConnector {
    type Connection = MongoDbConnection;

    async fn connect(&self, uri: &ConnectionUri, database: &str) -> DriverResult<Self::Connection> {
        let mut options = ClientOptions::parse(uri.as_str())
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        if let Some(app_name) = &self.app_name {
            options.app_name = Some(app_name.clone());
        }

        let client = Client::with_options(options)
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        // The driver connects lazily; ping so that unreachable servers and bad
        // credentials surface here rather than on the first engine call.
        if let Err(e) = client
            .database(database)
            .run_command(doc! { "ping": 1 })
            .await
        {
            client.shutdown().await;
            return Err(DriverError::Connection(e.to_string()));
        }

        Ok(MongoDbConnection::new(client, database.to_string()))
    }
}

/// A live client bound to one active database.
///
/// Returned to callers of `get_db_instance`, who can use the underlying
/// [`Client`] directly and must call [`Connection::close`] when done.
#[derive(Debug)]
pub struct MongoDbConnection {
    client: Client,
    database: String,
}

impl MongoDbConnection {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn db(&self) -> Database {
        self.client.database(&self.database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.db().collection(collection_name)
    }

    fn summarize(result: UpdateResult) -> UpdateSummary {
        UpdateSummary {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        }
    }

    fn update_options(flags: UpdateFlags) -> UpdateOptions {
        UpdateOptions::builder()
            .upsert(flags.upsert)
            .bypass_document_validation(flags.bypass_document_validation)
            .build()
    }
}

fn engine(command: &'static str) -> impl FnOnce(MongoError) -> DriverError {
    move |e| DriverError::engine(command, e)
}

#[async_trait]
impl Connection for MongoDbConnection {
    fn database(&self) -> &str {
        &self.database
    }

    async fn create_collection(&self, name: &str) -> DriverResult<()> {
        self.db()
            .create_collection(name)
            .await
            .map_err(engine("createCollection"))
    }

    async fn drop_collection(&self, name: &str) -> DriverResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(engine("dropCollection"))
    }

    async fn rename_collection(&self, name: &str, new_name: &str) -> DriverResult<()> {
        self.client
            .database("admin")
            .run_command(doc! {
                "renameCollection": format!("{}.{}", self.database, name),
                "to": format!("{}.{}", self.database, new_name),
            })
            .await
            .map_err(engine("renameCollection"))?;

        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> DriverResult<String> {
        Ok(
            self.get_collection(collection)
                .create_index(
                    IndexModel::builder()
                    .keys(index.columns.keys())
                    .options(
                        IndexOptions::builder()
                        .name(index.name.clone())
                        .unique(index.unique)
                        .build()
                    )
                    .build()
                )
                .await
                .map_err(engine("createIndex"))?
                .index_name
        )
    }

    async fn drop_index(&self, collection: &str, name: &str) -> DriverResult<()> {
        self.get_collection(collection)
            .drop_index(name)
            .await
            .map_err(engine("dropIndex"))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DriverResult<u64> {
        self.get_collection(collection)
            .insert_one(document)
            .await
            .map_err(engine("insert"))?;

        Ok(1)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DriverResult<u64> {
        Ok(
            self.get_collection(collection)
                .insert_many(documents)
                .await
                .map_err(engine("insert"))?
                .inserted_ids
                .len() as u64
        )
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        Ok(
            self.get_collection(collection)
                .delete_one(filter)
                .await
                .map_err(engine("remove"))?
                .deleted_count
        )
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        Ok(
            self.get_collection(collection)
                .delete_many(filter)
                .await
                .map_err(engine("remove"))?
                .deleted_count
        )
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> DriverResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.sort = sort;

        self.get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(engine("find"))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(engine("find"))
    }

    async fn list_collections(&self) -> DriverResult<Vec<String>> {
        self.db()
            .list_collection_names()
            .await
            .map_err(engine("collections"))
    }

    async fn index_information(&self, collection: &str) -> DriverResult<Vec<IndexInfo>> {
        Ok(
            self.get_collection(collection)
                .list_indexes()
                .await
                .map_err(engine("indexInformation"))?
                .try_collect::<Vec<IndexModel>>()
                .await
                .map_err(engine("indexInformation"))?
                .into_iter()
                .map(|model| {
                    let options = model.options.unwrap_or_default();
                    IndexInfo {
                        name: options.name.unwrap_or_default(),
                        keys: model.keys,
                        unique: options.unique.unwrap_or(false),
                    }
                })
                .collect()
        )
    }

    async fn drop_database(&self) -> DriverResult<()> {
        self.db()
            .drop()
            .await
            .map_err(engine("dropDatabase"))
    }

    async fn update_one(
        &self,
        collection: &str,
        query: Document,
        update: Document,
        flags: UpdateFlags,
    ) -> DriverResult<UpdateSummary> {
        self.get_collection(collection)
            .update_one(query, update)
            .with_options(Self::update_options(flags))
            .await
            .map(Self::summarize)
            .map_err(engine("update"))
    }

    async fn update_many(
        &self,
        collection: &str,
        query: Document,
        update: Document,
        flags: UpdateFlags,
    ) -> DriverResult<UpdateSummary> {
        self.get_collection(collection)
            .update_many(query, update)
            .with_options(Self::update_options(flags))
            .await
            .map(Self::summarize)
            .map_err(engine("updateMany"))
    }

    async fn run_raw(
        &self,
        name: &str,
        collection: Option<&str>,
        args: Document,
    ) -> DriverResult<Document> {
        let mut command = match collection {
            Some(collection) => doc! { name: collection },
            None => doc! { name: 1 },
        };
        for (key, value) in args {
            command.insert(key, value);
        }

        self.db()
            .run_command(command)
            .await
            .map_err(|e| match e.kind.as_ref() {
                ErrorKind::Command(failure) if failure.code == COMMAND_NOT_FOUND => {
                    DriverError::UnsupportedCommand(name.to_string())
                }
                _ => DriverError::engine(name, e),
            })
    }

    async fn close(self) -> DriverResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

#[derive(Default)]
pub struct MongoDbConnectorBuilder {
    app_name: Option<String>,
}

impl MongoDbConnectorBuilder {
    /// Application name reported to the server in the connection handshake.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn build(self) -> MongoDbConnector {
        MongoDbConnector {
            app_name: self.app_name,
        }
    }
}
