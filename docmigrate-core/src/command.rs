//! The closed set of commands the dispatcher can execute.
//!
//! Callers build a [`Command`] directly, or hand over a generic
//! [`CallDescriptor`] (`command`, `target`, `options`) and convert it with
//! [`Command::try_from`]. Each variant carries exactly the fields its engine call needs;
//! names without a dedicated variant become [`Command::Raw`].
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use docmigrate_core::command::{CallDescriptor, Command};
//!
//! let command = Command::try_from(CallDescriptor::new(
//!     "find",
//!     Some("migrations"),
//!     Some(doc! { "query": {}, "sort": { "run_on": -1 } }.into()),
//! ))?;
//! ```

use bson::{Bson, Document, doc};

use crate::error::{DriverError, DriverResult};

/// One record or a list of records.
///
/// The shape decides the engine call: a single record maps to the `*_one` variant of
/// an insert or delete, a list to the `*_many` variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Records {
    One(Document),
    Many(Vec<Document>),
}

impl Records {
    /// Number of records carried.
    pub fn len(&self) -> usize {
        match self {
            Records::One(_) => 1,
            Records::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn from_bson(command: &str, value: Bson) -> DriverResult<Self> {
        match value {
            Bson::Document(record) => Ok(Records::One(record)),
            Bson::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Bson::Document(record) => Ok(record),
                    other => Err(DriverError::InvalidArgument(format!(
                        "{command} expects documents, got {other}"
                    ))),
                })
                .collect::<DriverResult<Vec<_>>>()
                .map(Records::Many),
            other => Err(DriverError::InvalidArgument(format!(
                "{command} expects a document or a list of documents, got {other}"
            ))),
        }
    }

    fn to_bson(&self) -> Bson {
        match self {
            Records::One(record) => Bson::Document(record.clone()),
            Records::Many(records) => Bson::Array(records.iter().cloned().map(Bson::Document).collect()),
        }
    }
}

impl From<Document> for Records {
    fn from(record: Document) -> Self {
        Records::One(record)
    }
}

impl From<Vec<Document>> for Records {
    fn from(records: Vec<Document>) -> Self {
        Records::Many(records)
    }
}

/// A filter with an optional ordering.
///
/// Without a sort the engine returns matches in no particular order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Document,
    pub sort: Option<Document>,
}

impl FindQuery {
    pub fn filter(filter: Document) -> Self {
        Self { filter, sort: None }
    }

    pub fn sorted(filter: Document, sort: Document) -> Self {
        Self {
            filter,
            sort: Some(sort),
        }
    }

    /// Shapes a `find` options object.
    ///
    /// When the object carries a `sort` key, the filter is taken from its `query` key
    /// (empty when absent). Otherwise the whole object is the filter; a `null` or
    /// `false` sort counts as absent and is dropped from it.
    pub fn from_options(mut options: Document) -> DriverResult<Self> {
        if matches!(options.get("sort"), Some(Bson::Null | Bson::Boolean(false))) {
            options.remove("sort");
        }

        match options.get("sort") {
            None => Ok(Self::filter(options)),
            Some(Bson::Document(sort)) => Ok(Self::sorted(
                match options.get("query") {
                    None | Some(Bson::Null) => Document::new(),
                    Some(Bson::Document(query)) => query.clone(),
                    Some(other) => {
                        return Err(DriverError::InvalidArgument(format!(
                            "find query must be a document, got {other}"
                        )));
                    }
                },
                sort.clone(),
            )),
            Some(other) => Err(DriverError::InvalidArgument(format!(
                "find sort must be a document, got {other}"
            ))),
        }
    }

    fn to_options(&self) -> Document {
        match &self.sort {
            Some(sort) => doc! { "query": self.filter.clone(), "sort": sort.clone() },
            None => self.filter.clone(),
        }
    }
}

/// The fields an index is built over.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexColumns {
    Single(String),
    Many(Vec<String>),
    /// An explicit key document such as `{ "a": 1, "b": -1 }`.
    Keys(Document),
}

impl IndexColumns {
    /// The key document handed to the engine; plain columns index ascending.
    pub fn keys(&self) -> Document {
        match self {
            IndexColumns::Single(column) => doc! { column.as_str(): 1 },
            IndexColumns::Many(columns) => columns
                .iter()
                .map(|column| (column.clone(), Bson::Int32(1)))
                .collect(),
            IndexColumns::Keys(keys) => keys.clone(),
        }
    }

    fn from_bson(value: &Bson) -> DriverResult<Self> {
        match value {
            Bson::String(column) => Ok(IndexColumns::Single(column.clone())),
            Bson::Array(items) => items
                .iter()
                .map(|item| match item {
                    Bson::String(column) => Ok(column.clone()),
                    other => Err(DriverError::InvalidArgument(format!(
                        "index columns must be strings, got {other}"
                    ))),
                })
                .collect::<DriverResult<Vec<_>>>()
                .map(IndexColumns::Many),
            Bson::Document(keys) => Ok(IndexColumns::Keys(keys.clone())),
            other => Err(DriverError::InvalidArgument(format!(
                "unsupported index columns {other}"
            ))),
        }
    }

    fn to_bson(&self) -> Bson {
        match self {
            IndexColumns::Single(column) => Bson::String(column.clone()),
            IndexColumns::Many(columns) => Bson::Array(columns.iter().cloned().map(Bson::String).collect()),
            IndexColumns::Keys(keys) => Bson::Document(keys.clone()),
        }
    }
}

impl From<&str> for IndexColumns {
    fn from(column: &str) -> Self {
        IndexColumns::Single(column.to_string())
    }
}

impl From<String> for IndexColumns {
    fn from(column: String) -> Self {
        IndexColumns::Single(column)
    }
}

impl From<Vec<String>> for IndexColumns {
    fn from(columns: Vec<String>) -> Self {
        IndexColumns::Many(columns)
    }
}

impl From<Vec<&str>> for IndexColumns {
    fn from(columns: Vec<&str>) -> Self {
        IndexColumns::Many(columns.into_iter().map(str::to_string).collect())
    }
}

impl From<Document> for IndexColumns {
    fn from(keys: Document) -> Self {
        IndexColumns::Keys(keys)
    }
}

/// A named index definition.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub columns: IndexColumns,
    pub unique: bool,
}

impl IndexSpec {
    /// Positional form: name, columns, uniqueness.
    pub fn new(name: impl Into<String>, columns: impl Into<IndexColumns>, unique: bool) -> Self {
        Self {
            name: name.into(),
            columns: columns.into(),
            unique,
        }
    }

    /// Options-object form: `{ indexName, columns, unique }`.
    pub fn from_options(options: &Document) -> DriverResult<Self> {
        let name = options
            .get_str("indexName")
            .map_err(|_| DriverError::InvalidArgument("index options require an indexName".into()))?;
        let columns = options
            .get("columns")
            .ok_or_else(|| DriverError::InvalidArgument("index options require columns".into()))
            .and_then(IndexColumns::from_bson)?;
        let unique = match options.get("unique") {
            None | Some(Bson::Null) => false,
            Some(Bson::Boolean(unique)) => *unique,
            Some(other) => {
                return Err(DriverError::InvalidArgument(format!(
                    "index uniqueness must be a boolean, got {other}"
                )));
            }
        };

        Ok(Self {
            name: name.to_string(),
            columns,
            unique,
        })
    }

    fn to_options(&self) -> Document {
        doc! {
            "indexName": self.name.clone(),
            "columns": self.columns.to_bson(),
            "unique": self.unique,
        }
    }
}

/// Engine update flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateFlags {
    pub upsert: Option<bool>,
    pub bypass_document_validation: Option<bool>,
}

impl UpdateFlags {
    pub fn upsert() -> Self {
        Self {
            upsert: Some(true),
            ..Default::default()
        }
    }

    fn from_document(flags: &Document) -> Self {
        Self {
            upsert: flags.get_bool("upsert").ok(),
            bypass_document_validation: flags.get_bool("bypassDocumentValidation").ok(),
        }
    }

    fn to_document(self) -> Document {
        let mut flags = Document::new();
        if let Some(upsert) = self.upsert {
            flags.insert("upsert", upsert);
        }
        if let Some(bypass) = self.bypass_document_validation {
            flags.insert("bypassDocumentValidation", bypass);
        }
        flags
    }
}

/// What an update matches, what it applies, and how.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    pub query: Document,
    pub update: Document,
    pub flags: UpdateFlags,
}

impl UpdateSpec {
    pub fn new(query: Document, update: Document) -> Self {
        Self {
            query,
            update,
            flags: UpdateFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: UpdateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Shapes `{ query, update, options }`.
    pub fn from_options(options: &Document) -> DriverResult<Self> {
        let update = options
            .get_document("update")
            .map_err(|_| DriverError::InvalidArgument("update options require an update document".into()))?
            .clone();
        let query = match options.get("query") {
            None | Some(Bson::Null) => Document::new(),
            Some(Bson::Document(query)) => query.clone(),
            Some(other) => {
                return Err(DriverError::InvalidArgument(format!(
                    "update query must be a document, got {other}"
                )));
            }
        };
        let flags = options
            .get_document("options")
            .map(UpdateFlags::from_document)
            .unwrap_or_default();

        Ok(Self { query, update, flags })
    }

    fn to_options(&self) -> Document {
        doc! {
            "query": self.query.clone(),
            "update": self.update.clone(),
            "options": self.flags.to_document(),
        }
    }
}

/// A single dispatchable engine operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateCollection { collection: String },
    DropCollection { collection: String },
    RenameCollection { collection: String, new_collection: String },
    CreateIndex { collection: String, index: IndexSpec },
    DropIndex { collection: String, name: String },
    Insert { collection: String, records: Records },
    Remove { collection: String, filter: Records },
    Find { collection: String, query: FindQuery },
    Collections,
    IndexInformation { collection: String },
    /// Drops the whole active database.
    DropDatabase,
    /// Updates at most what the engine updates by default (one document).
    Update { collection: String, spec: UpdateSpec },
    /// Updates every matching document.
    UpdateMany { collection: String, spec: UpdateSpec },
    /// Hands the open connection to the caller, who then owns closing it.
    GetDbInstance,
    /// Any other engine command, passed through by name.
    Raw {
        name: String,
        collection: Option<String>,
        args: Document,
    },
}

impl Command {
    /// The wire-level command name.
    pub fn name(&self) -> &str {
        match self {
            Command::CreateCollection { .. } => "createCollection",
            Command::DropCollection { .. } => "dropCollection",
            Command::RenameCollection { .. } => "renameCollection",
            Command::CreateIndex { .. } => "createIndex",
            Command::DropIndex { .. } => "dropIndex",
            Command::Insert { .. } => "insert",
            Command::Remove { .. } => "remove",
            Command::Find { .. } => "find",
            Command::Collections => "collections",
            Command::IndexInformation { .. } => "indexInformation",
            Command::DropDatabase => "dropDatabase",
            Command::Update { .. } => "update",
            Command::UpdateMany { .. } => "updateMany",
            Command::GetDbInstance => "getDbInstance",
            Command::Raw { name, .. } => name,
        }
    }

    /// The collection the command operates on, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Command::CreateCollection { collection }
            | Command::DropCollection { collection }
            | Command::RenameCollection { collection, .. }
            | Command::CreateIndex { collection, .. }
            | Command::DropIndex { collection, .. }
            | Command::Insert { collection, .. }
            | Command::Remove { collection, .. }
            | Command::Find { collection, .. }
            | Command::IndexInformation { collection }
            | Command::Update { collection, .. }
            | Command::UpdateMany { collection, .. } => Some(collection),
            Command::Raw { collection, .. } => collection.as_deref(),
            Command::Collections | Command::DropDatabase | Command::GetDbInstance => None,
        }
    }

    /// The command's arguments in their generic options shape.
    pub fn options(&self) -> Option<Bson> {
        match self {
            Command::RenameCollection { new_collection, .. } => {
                Some(doc! { "newCollection": new_collection.clone() }.into())
            }
            Command::CreateIndex { index, .. } => Some(index.to_options().into()),
            Command::DropIndex { name, .. } => Some(doc! { "indexName": name.clone() }.into()),
            Command::Insert { records, .. } | Command::Remove { filter: records, .. } => Some(records.to_bson()),
            Command::Find { query, .. } => Some(query.to_options().into()),
            Command::Update { spec, .. } | Command::UpdateMany { spec, .. } => Some(spec.to_options().into()),
            Command::Raw { args, .. } if !args.is_empty() => Some(args.clone().into()),
            _ => None,
        }
    }

    /// Whether the dispatcher leaves the connection open for the caller.
    pub fn retains_handle(&self) -> bool {
        matches!(self, Command::GetDbInstance)
    }

    pub fn descriptor(&self) -> CallDescriptor {
        CallDescriptor {
            command: self.name().to_string(),
            target: self.target().map(str::to_string),
            options: self.options(),
        }
    }
}

/// The generic `(command, target, options)` triple a caller hands to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    pub command: String,
    pub target: Option<String>,
    pub options: Option<Bson>,
}

impl CallDescriptor {
    pub fn new(command: impl Into<String>, target: Option<&str>, options: Option<Bson>) -> Self {
        Self {
            command: command.into(),
            target: target.map(str::to_string),
            options,
        }
    }

    fn require_target(&self) -> DriverResult<String> {
        self.target
            .clone()
            .ok_or_else(|| DriverError::InvalidArgument(format!("{} requires a target collection", self.command)))
    }

    fn document_options(&self) -> DriverResult<Document> {
        match &self.options {
            Some(Bson::Document(options)) => Ok(options.clone()),
            None | Some(Bson::Null) => Ok(Document::new()),
            Some(other) => Err(DriverError::InvalidArgument(format!(
                "{} expects an options document, got {other}",
                self.command
            ))),
        }
    }

    fn record_options(&self) -> DriverResult<Records> {
        match &self.options {
            Some(value) => Records::from_bson(&self.command, value.clone()),
            None => Err(DriverError::InvalidArgument(format!("{} requires records", self.command))),
        }
    }
}

impl TryFrom<CallDescriptor> for Command {
    type Error = DriverError;

    fn try_from(call: CallDescriptor) -> DriverResult<Self> {
        Ok(match call.command.as_str() {
            "createCollection" => Command::CreateCollection {
                collection: call.require_target()?,
            },
            "dropCollection" => Command::DropCollection {
                collection: call.require_target()?,
            },
            "renameCollection" => Command::RenameCollection {
                collection: call.require_target()?,
                new_collection: call
                    .document_options()?
                    .get_str("newCollection")
                    .map_err(|_| DriverError::InvalidArgument("renameCollection requires newCollection".into()))?
                    .to_string(),
            },
            "createIndex" => Command::CreateIndex {
                collection: call.require_target()?,
                index: IndexSpec::from_options(&call.document_options()?)?,
            },
            "dropIndex" => Command::DropIndex {
                collection: call.require_target()?,
                name: call
                    .document_options()?
                    .get_str("indexName")
                    .map_err(|_| DriverError::InvalidArgument("dropIndex requires indexName".into()))?
                    .to_string(),
            },
            "insert" => Command::Insert {
                collection: call.require_target()?,
                records: call.record_options()?,
            },
            "remove" => Command::Remove {
                collection: call.require_target()?,
                filter: call.record_options()?,
            },
            "find" => Command::Find {
                collection: call.require_target()?,
                query: FindQuery::from_options(call.document_options()?)?,
            },
            "collections" => Command::Collections,
            "indexInformation" => Command::IndexInformation {
                collection: call.require_target()?,
            },
            "dropDatabase" => Command::DropDatabase,
            "update" => Command::Update {
                collection: call.require_target()?,
                spec: UpdateSpec::from_options(&call.document_options()?)?,
            },
            "updateMany" => Command::UpdateMany {
                collection: call.require_target()?,
                spec: UpdateSpec::from_options(&call.document_options()?)?,
            },
            "getDbInstance" => Command::GetDbInstance,
            _ => Command::Raw {
                args: call.document_options()?,
                collection: call.target.clone(),
                name: call.command.clone(),
            },
        })
    }
}

/// Index metadata as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub keys: Document,
    pub unique: bool,
}

/// Counts reported by an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSummary {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

/// The normalized result of a dispatched command.
///
/// `H` is the backend's connection type, returned only by [`Command::GetDbInstance`].
#[derive(Debug)]
pub enum Outcome<H> {
    /// Success with no data; also the result of every dry-run dispatch.
    Done,
    IndexCreated(String),
    Inserted(u64),
    Deleted(u64),
    Updated(UpdateSummary),
    Documents(Vec<Document>),
    Collections(Vec<String>),
    Indexes(Vec<IndexInfo>),
    Raw(Document),
    Handle(H),
}

impl<H> Outcome<H> {
    fn describe(&self) -> &'static str {
        match self {
            Outcome::Done => "no data",
            Outcome::IndexCreated(_) => "an index name",
            Outcome::Inserted(_) => "an insert count",
            Outcome::Deleted(_) => "a delete count",
            Outcome::Updated(_) => "an update summary",
            Outcome::Documents(_) => "documents",
            Outcome::Collections(_) => "collection names",
            Outcome::Indexes(_) => "index metadata",
            Outcome::Raw(_) => "a raw reply",
            Outcome::Handle(_) => "a connection handle",
        }
    }

    fn mismatch<T>(self, expected: &str) -> DriverResult<T> {
        Err(DriverError::InvalidArgument(format!(
            "expected {expected}, got {}",
            self.describe()
        )))
    }

    /// Matched documents; empty for [`Outcome::Done`].
    pub fn into_documents(self) -> DriverResult<Vec<Document>> {
        match self {
            Outcome::Documents(documents) => Ok(documents),
            Outcome::Done => Ok(Vec::new()),
            other => other.mismatch("documents"),
        }
    }

    /// Collection names; empty for [`Outcome::Done`].
    pub fn into_collections(self) -> DriverResult<Vec<String>> {
        match self {
            Outcome::Collections(names) => Ok(names),
            Outcome::Done => Ok(Vec::new()),
            other => other.mismatch("collection names"),
        }
    }

    /// Index metadata; empty for [`Outcome::Done`].
    pub fn into_indexes(self) -> DriverResult<Vec<IndexInfo>> {
        match self {
            Outcome::Indexes(indexes) => Ok(indexes),
            Outcome::Done => Ok(Vec::new()),
            other => other.mismatch("index metadata"),
        }
    }

    /// Affected document count for inserts, deletes and updates; zero for [`Outcome::Done`].
    pub fn affected(&self) -> u64 {
        match self {
            Outcome::Inserted(count) | Outcome::Deleted(count) => *count,
            Outcome::Updated(summary) => summary.modified,
            _ => 0,
        }
    }

    pub fn into_handle(self) -> DriverResult<H> {
        match self {
            Outcome::Handle(handle) => Ok(handle),
            other => other.mismatch("a connection handle"),
        }
    }
}
