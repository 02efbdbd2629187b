//! In-memory engine implementing the connector traits.
//!
//! All connections opened by one [`MemoryConnector`] (and its clones) share the same
//! databases, so data written through one dispatch is visible to the next, exactly as
//! with a real server.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document, doc, oid::ObjectId};

use docmigrate_core::{
    backend::{Connection, Connector},
    command::{IndexInfo, IndexSpec, UpdateFlags, UpdateSummary},
    error::{DriverError, DriverResult},
    uri::ConnectionUri,
};

use crate::evaluator::{FilterEvaluator, apply_update, lookup, sort_documents, upsert_seed};

const ID_INDEX: &str = "_id_";

#[derive(Debug, Clone)]
struct CollectionState {
    /// Documents in insertion order.
    documents: Vec<Document>,
    indexes: Vec<IndexInfo>,
}

impl Default for CollectionState {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![IndexInfo {
                name: ID_INDEX.to_string(),
                keys: doc! { "_id": 1 },
                unique: false,
            }],
        }
    }
}

impl CollectionState {
    fn index_key(document: &Document, keys: &Document) -> Vec<Option<Bson>> {
        keys.keys()
            .map(|field| lookup(document, field).cloned())
            .collect()
    }

    /// Fails if `candidate` collides with a stored document on `_id` or a unique index.
    /// `skip` excludes the document's own slot when checking an update.
    fn check_unique(&self, candidate: &Document, skip: Option<usize>) -> Result<(), String> {
        let others = self
            .documents
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != skip)
            .map(|(_, document)| document);

        for other in others {
            if candidate.get("_id").is_some() && candidate.get("_id") == other.get("_id") {
                return Err(format!("duplicate key on {ID_INDEX}"));
            }

            for index in self.indexes.iter().filter(|index| index.unique) {
                if Self::index_key(candidate, &index.keys) == Self::index_key(other, &index.keys) {
                    return Err(format!("duplicate key on {}", index.name));
                }
            }
        }

        Ok(())
    }

    fn matching(&self, filter: &Document) -> Result<Vec<usize>, String> {
        let mut positions = Vec::new();

        for (position, document) in self.documents.iter().enumerate() {
            if FilterEvaluator::new(document).matches(filter)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }

    fn insert(&mut self, document: Document) -> Result<(), String> {
        let document = with_id(document);
        self.check_unique(&document, None)?;
        self.documents.push(document);

        Ok(())
    }

    fn update(
        &mut self,
        query: &Document,
        update: &Document,
        flags: UpdateFlags,
        many: bool,
    ) -> Result<UpdateSummary, String> {
        let mut positions = self.matching(query)?;
        if !many {
            positions.truncate(1);
        }

        if positions.is_empty() {
            if flags.upsert != Some(true) {
                return Ok(UpdateSummary::default());
            }

            let mut document = with_id(upsert_seed(query));
            apply_update(&mut document, update)?;
            let upserted_id = document.get("_id").cloned();
            self.insert(document)?;

            return Ok(UpdateSummary {
                matched: 0,
                modified: 0,
                upserted_id,
            });
        }

        let mut summary = UpdateSummary {
            matched: positions.len() as u64,
            ..Default::default()
        };

        for position in positions {
            let mut document = self.documents[position].clone();
            apply_update(&mut document, update)?;

            if document != self.documents[position] {
                self.check_unique(&document, Some(position))?;
                self.documents[position] = document;
                summary.modified += 1;
            }
        }

        Ok(summary)
    }
}

fn with_id(document: Document) -> Document {
    if document.contains_key("_id") {
        return document;
    }

    let mut identified = doc! { "_id": ObjectId::new() };
    for (key, value) in document {
        identified.insert(key, value);
    }
    identified
}

type DatabaseMap = HashMap<String, CollectionState>;
type EngineMap = HashMap<String, DatabaseMap>;


/// Opens [`MemoryConnection`]s onto a shared in-process engine.
///
/// Cloning the connector shares the engine. The connector also counts connections,
/// so callers can verify that every dispatched command released its connection.
///
/// # Example
///
/// ```ignore
/// use docmigrate_memory::MemoryConnector;
///
/// let connector = MemoryConnector::new();
/// let driver = docmigrate_core::driver::connect(connector.clone(), &config, settings)?;
///
/// driver.create_collection("event").await?;
/// assert_eq!(connector.open_connections(), 0);
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryConnector {
    engine: Arc<RwLock<EngineMap>>,
    open: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
    failing_close: Arc<AtomicBool>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MemoryConnectorBuilder {
        MemoryConnectorBuilder::default()
    }

    /// Connections opened and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Connections opened since creation.
    pub fn connections_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// While offline, every connection attempt fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// While set, closing a connection reports an error. The connection is
    /// still released.
    pub fn set_failing_close(&self, failing: bool) {
        self.failing_close.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, uri: &ConnectionUri, database: &str) -> DriverResult<Self::Connection> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DriverError::Connection(format!("{} is unreachable", uri.hosts().join(","))));
        }

        self.open.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryConnection {
            engine: self.engine.clone(),
            open: self.open.clone(),
            failing_close: self.failing_close.clone(),
            database: database.to_string(),
        })
    }
}

/// A connection to the in-memory engine, bound to one database.
#[derive(Debug)]
pub struct MemoryConnection {
    engine: Arc<RwLock<EngineMap>>,
    open: Arc<AtomicUsize>,
    failing_close: Arc<AtomicBool>,
    database: String,
}

impl MemoryConnection {
    fn collection_error(command: &str, collection: &str) -> DriverError {
        DriverError::engine(command, format!("ns does not exist: {collection}"))
    }

    /// Only an upsert may create the collection; otherwise a missing
    /// collection matches nothing.
    async fn update(
        &self,
        collection: &str,
        query: &Document,
        update: &Document,
        flags: UpdateFlags,
        many: bool,
    ) -> Result<UpdateSummary, String> {
        let mut engine = self.engine.write().await;

        if flags.upsert != Some(true) {
            return match engine
                .get_mut(&self.database)
                .and_then(|collections| collections.get_mut(collection))
            {
                Some(state) => state.update(query, update, flags, many),
                None => Ok(UpdateSummary::default()),
            };
        }

        engine
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .update(query, update, flags, many)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn database(&self) -> &str {
        &self.database
    }

    async fn create_collection(&self, name: &str) -> DriverResult<()> {
        self.engine
            .write()
            .await
            .entry(self.database.clone())
            .or_default()
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DriverResult<()> {
        if let Some(database) = self.engine.write().await.get_mut(&self.database) {
            database.remove(name);
        }

        Ok(())
    }

    async fn rename_collection(&self, name: &str, new_name: &str) -> DriverResult<()> {
        let mut engine = self.engine.write().await;
        let database = engine
            .get_mut(&self.database)
            .ok_or_else(|| Self::collection_error("renameCollection", name))?;

        if database.contains_key(new_name) {
            return Err(DriverError::engine("renameCollection", format!("target namespace exists: {new_name}")));
        }

        let collection = database
            .remove(name)
            .ok_or_else(|| Self::collection_error("renameCollection", name))?;
        database.insert(new_name.to_string(), collection);

        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> DriverResult<String> {
        let mut engine = self.engine.write().await;
        let state = engine
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        let keys = index.columns.keys();

        if let Some(existing) = state.indexes.iter().find(|existing| existing.name == index.name) {
            if existing.keys == keys && existing.unique == index.unique {
                return Ok(index.name.clone());
            }
            return Err(DriverError::engine("createIndex", format!("index {} already exists with different options", index.name)));
        }

        let info = IndexInfo {
            name: index.name.clone(),
            keys,
            unique: index.unique,
        };

        if info.unique {
            for (position, document) in state.documents.iter().enumerate() {
                let key = CollectionState::index_key(document, &info.keys);
                if state.documents[position + 1..]
                    .iter()
                    .any(|other| CollectionState::index_key(other, &info.keys) == key)
                {
                    return Err(DriverError::engine("createIndex", format!("duplicate key on {}", info.name)));
                }
            }
        }

        state.indexes.push(info);

        Ok(index.name.clone())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> DriverResult<()> {
        if name == ID_INDEX {
            return Err(DriverError::engine("dropIndex", "cannot drop _id index"));
        }

        let mut engine = self.engine.write().await;
        let state = engine
            .get_mut(&self.database)
            .and_then(|database| database.get_mut(collection))
            .ok_or_else(|| Self::collection_error("dropIndex", collection))?;

        let before = state.indexes.len();
        state.indexes.retain(|index| index.name != name);

        if state.indexes.len() == before {
            return Err(DriverError::engine("dropIndex", format!("index not found with name [{name}]")));
        }

        Ok(())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DriverResult<u64> {
        self.engine
            .write()
            .await
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .insert(document)
            .map_err(|e| DriverError::engine("insert", e))?;

        Ok(1)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DriverResult<u64> {
        let mut engine = self.engine.write().await;
        let state = engine
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default();

        // Ordered insert: stops at the first failure, keeping earlier documents.
        let mut inserted = 0;
        for document in documents {
            state
                .insert(document)
                .map_err(|e| DriverError::engine("insert", e))?;
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        let mut engine = self.engine.write().await;
        let Some(state) = engine
            .get_mut(&self.database)
            .and_then(|database| database.get_mut(collection))
        else {
            return Ok(0);
        };

        match state
            .matching(&filter)
            .map_err(|e| DriverError::engine("remove", e))?
            .first()
        {
            Some(position) => {
                state.documents.remove(*position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DriverResult<u64> {
        let mut engine = self.engine.write().await;
        let Some(state) = engine
            .get_mut(&self.database)
            .and_then(|database| database.get_mut(collection))
        else {
            return Ok(0);
        };

        let positions = state
            .matching(&filter)
            .map_err(|e| DriverError::engine("remove", e))?;

        for position in positions.iter().rev() {
            state.documents.remove(*position);
        }

        Ok(positions.len() as u64)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> DriverResult<Vec<Document>> {
        let engine = self.engine.read().await;
        let Some(state) = engine
            .get(&self.database)
            .and_then(|database| database.get(collection))
        else {
            return Ok(vec![]);
        };

        let mut documents = state
            .matching(&filter)
            .map_err(|e| DriverError::engine("find", e))?
            .into_iter()
            .map(|position| state.documents[position].clone())
            .collect::<Vec<_>>();

        if let Some(sort) = &sort {
            sort_documents(&mut documents, sort);
        }

        Ok(documents)
    }

    async fn list_collections(&self) -> DriverResult<Vec<String>> {
        let mut names = self
            .engine
            .read()
            .await
            .get(&self.database)
            .map(|database| database.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        names.sort();

        Ok(names)
    }

    async fn index_information(&self, collection: &str) -> DriverResult<Vec<IndexInfo>> {
        self.engine
            .read()
            .await
            .get(&self.database)
            .and_then(|database| database.get(collection))
            .map(|state| state.indexes.clone())
            .ok_or_else(|| Self::collection_error("indexInformation", collection))
    }

    async fn drop_database(&self) -> DriverResult<()> {
        self.engine
            .write()
            .await
            .remove(&self.database);

        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        query: Document,
        update: Document,
        flags: UpdateFlags,
    ) -> DriverResult<UpdateSummary> {
        self.update(collection, &query, &update, flags, false)
            .await
            .map_err(|e| DriverError::engine("update", e))
    }

    async fn update_many(
        &self,
        collection: &str,
        query: Document,
        update: Document,
        flags: UpdateFlags,
    ) -> DriverResult<UpdateSummary> {
        self.update(collection, &query, &update, flags, true)
            .await
            .map_err(|e| DriverError::engine("updateMany", e))
    }

    async fn run_raw(
        &self,
        name: &str,
        collection: Option<&str>,
        args: Document,
    ) -> DriverResult<Document> {
        match name {
            "ping" => Ok(doc! { "ok": 1 }),
            "count" => {
                let collection = collection
                    .ok_or_else(|| DriverError::InvalidArgument("count requires a target collection".into()))?;
                let count = self
                    .find(collection, args.get_document("query").cloned().unwrap_or_default(), None)
                    .await?
                    .len();

                Ok(doc! { "n": count as i64, "ok": 1 })
            }
            other => Err(DriverError::UnsupportedCommand(other.to_string())),
        }
    }

    async fn close(self) -> DriverResult<()> {
        self.open.fetch_sub(1, Ordering::SeqCst);

        if self.failing_close.load(Ordering::SeqCst) {
            return Err(DriverError::Connection("connection reset while closing".into()));
        }

        Ok(())
    }
}


/// Builder for [`MemoryConnector`] instances.
///
/// # Example
///
/// ```ignore
/// let connector = MemoryConnector::builder().offline(true).build();
/// ```
#[derive(Default)]
pub struct MemoryConnectorBuilder {
    offline: bool,
    failing_close: bool,
}

impl MemoryConnectorBuilder {
    /// Starts the connector refusing connections.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Starts the connector with every close reporting an error.
    pub fn failing_close(mut self, failing: bool) -> Self {
        self.failing_close = failing;
        self
    }

    pub fn build(self) -> MemoryConnector {
        let connector = MemoryConnector::new();
        connector.set_offline(self.offline);
        connector.set_failing_close(self.failing_close);
        connector
    }
}
