use std::sync::{Arc, Mutex};

use bson::{Bson, doc};
use chrono::{TimeZone, Utc};
use docmigrate_core::{
    backend::Connection,
    command::{CallDescriptor, Command, FindQuery, Outcome, UpdateFlags, UpdateSpec},
    config::Configuration,
    driver::{MigrationDriver, RunRecord, connect, connect_with_logger},
    error::DriverError,
    settings::{CommandLogger, NoopLogger, SharedSettings},
};
use docmigrate_memory::MemoryConnector;

#[derive(Debug, Default)]
struct RecordingLogger {
    calls: Mutex<Vec<CallDescriptor>>,
}

impl RecordingLogger {
    fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.command.clone())
            .collect()
    }
}

impl CommandLogger for RecordingLogger {
    fn log_command(&self, call: &CallDescriptor) {
        self.calls.lock().unwrap().push(call.clone());
    }
}

fn driver(connector: &MemoryConnector) -> MigrationDriver<MemoryConnector> {
    connect_with_logger(
        connector.clone(),
        &Configuration::new("testdb"),
        SharedSettings::default(),
        Arc::new(NoopLogger),
    )
    .unwrap()
}

fn dry_driver(connector: &MemoryConnector, logger: Arc<RecordingLogger>) -> MigrationDriver<MemoryConnector> {
    connect_with_logger(
        connector.clone(),
        &Configuration::new("testdb"),
        SharedSettings::default().dry_run(true),
        logger,
    )
    .unwrap()
}

#[tokio::test]
async fn missing_database_fails_before_any_connection() {
    let connector = MemoryConnector::new();
    let result = connect(connector.clone(), &Configuration::default(), SharedSettings::default());

    assert!(matches!(result, Err(DriverError::Configuration(_))));
    assert_eq!(connector.connections_opened(), 0);
}

#[tokio::test]
async fn create_collection_is_listed_and_connection_closed() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    db.create_collection("event").await.unwrap();
    let names = db.get_collection_names().await.unwrap();

    assert_eq!(names.iter().filter(|name| *name == "event").count(), 1);
    assert_eq!(connector.connections_opened(), 2);
    assert_eq!(connector.open_connections(), 0);
}

#[tokio::test]
async fn drop_collection_removes_it() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    db.create_table("event").await.unwrap();
    db.drop_table("event").await.unwrap();

    assert!(!db.get_collection_names().await.unwrap().contains(&"event".to_string()));
}

#[tokio::test]
async fn rename_collection_moves_documents() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    db.create_collection("event").await.unwrap();
    db.insert("event", doc! { "title": "a" }).await.unwrap();
    db.rename_table("event", "functions").await.unwrap();

    assert_eq!(db.get_collection_names().await.unwrap(), vec!["functions".to_string()]);
    assert_eq!(db.find("functions", FindQuery::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn engine_failure_still_closes_connection() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    let err = db.rename_collection("missing", "other").await.unwrap_err();

    assert!(matches!(err, DriverError::EngineOperation(ref command, _) if command == "renameCollection"));
    assert_eq!(connector.open_connections(), 0);
}

#[tokio::test]
async fn close_failure_does_not_replace_result() {
    let connector = MemoryConnector::builder().failing_close(true).build();
    let db = driver(&connector);

    assert_eq!(db.insert("items", doc! { "name": "a" }).await.unwrap(), 1);

    let err = db.rename_collection("missing", "other").await.unwrap_err();
    assert!(matches!(err, DriverError::EngineOperation(ref command, _) if command == "renameCollection"));

    assert_eq!(connector.open_connections(), 0);

    connector.set_failing_close(false);
    let found = db.find("items", FindQuery::filter(doc! {})).await.unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn update_without_upsert_does_not_create_collection() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    let modified = db
        .update_one("ghost", UpdateSpec::new(doc! { "a": 1 }, doc! { "$set": { "a": 2 } }))
        .await
        .unwrap();
    assert_eq!(modified, 0);
    db.update_many("ghost", UpdateSpec::new(doc! {}, doc! { "$set": { "a": 2 } }))
        .await
        .unwrap();
    assert!(db.get_collection_names().await.unwrap().is_empty());

    db.update_one(
        "ghost",
        UpdateSpec::new(doc! { "a": 1 }, doc! { "$set": { "b": 2 } }).with_flags(UpdateFlags::upsert()),
    )
    .await
    .unwrap();
    assert_eq!(db.get_collection_names().await.unwrap(), vec!["ghost".to_string()]);
}

#[tokio::test]
async fn inc_past_int32_range_widens_the_field() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    db.insert("counters", doc! { "name": "c", "n": i32::MAX }).await.unwrap();
    db.update_one("counters", UpdateSpec::new(doc! { "name": "c" }, doc! { "$inc": { "n": 1 } }))
        .await
        .unwrap();

    let found = db.find("counters", FindQuery::filter(doc! { "name": "c" })).await.unwrap();
    assert_eq!(found[0].get_i64("n").unwrap(), i32::MAX as i64 + 1);
}

#[tokio::test]
async fn add_index_is_reported_with_uniqueness() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    db.create_collection("items").await.unwrap();
    db.add_index("items", "items_name_idx", "name", true).await.unwrap();

    let indexes = db.get_indexes("items").await.unwrap();
    let index = indexes
        .iter()
        .find(|index| index.name == "items_name_idx")
        .expect("index present");

    assert!(index.unique);
    assert_eq!(index.keys, doc! { "name": 1 });
}

#[tokio::test]
async fn unique_index_rejects_duplicates() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    db.add_index("items", "items_name_idx", "name", true).await.unwrap();
    db.insert("items", doc! { "name": "a" }).await.unwrap();

    assert!(matches!(
        db.insert("items", doc! { "name": "a" }).await,
        Err(DriverError::EngineOperation(..))
    ));
    assert_eq!(connector.open_connections(), 0);
}

#[tokio::test]
async fn remove_index_drops_it() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    db.add_index("event", "event_title", vec!["title", "id"], false).await.unwrap();
    db.remove_index("event", "event_title").await.unwrap();

    let names = db
        .get_indexes("event")
        .await
        .unwrap()
        .into_iter()
        .map(|index| index.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["_id_".to_string()]);
}

#[tokio::test]
async fn insert_one_then_find_returns_one() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    let inserted = db.insert("event", doc! { "id": 2, "title": "title" }).await.unwrap();
    let found = db.find("event", FindQuery::filter(doc! { "title": "title" })).await.unwrap();

    assert_eq!(inserted, 1);
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn insert_many_then_find_returns_all_matches() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    let inserted = db
        .insert(
            "event",
            vec![
                doc! { "id": 2, "title": "title" },
                doc! { "id": 3, "title": "lol" },
                doc! { "id": 4, "title": "title" },
            ],
        )
        .await
        .unwrap();
    let found = db.find("event", FindQuery::filter(doc! { "title": "title" })).await.unwrap();

    assert_eq!(inserted, 3);
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn remove_single_filter_deletes_at_most_one() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    db.insert("event", vec![doc! { "tag": "x" }, doc! { "tag": "x" }, doc! { "tag": "x" }])
        .await
        .unwrap();

    assert_eq!(db.remove("event", doc! { "tag": "x" }).await.unwrap(), 1);
    assert_eq!(db.find("event", FindQuery::filter(doc! { "tag": "x" })).await.unwrap().len(), 2);
}

#[tokio::test]
async fn remove_list_deletes_every_match() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    db.insert(
        "event",
        vec![doc! { "tag": "x" }, doc! { "tag": "x" }, doc! { "tag": "y" }, doc! { "tag": "z" }],
    )
    .await
    .unwrap();

    let removed = db
        .remove("event", vec![doc! { "tag": "x" }, doc! { "tag": "y" }])
        .await
        .unwrap();

    assert_eq!(removed, 3);
    assert_eq!(db.find("event", FindQuery::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn find_applies_sort_to_query() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    db.insert(
        "event",
        vec![
            doc! { "n": 2, "kind": "a" },
            doc! { "n": 3, "kind": "b" },
            doc! { "n": 1, "kind": "a" },
        ],
    )
    .await
    .unwrap();

    let found = db
        .find("event", FindQuery::sorted(doc! { "kind": "a" }, doc! { "n": 1 }))
        .await
        .unwrap();

    assert_eq!(
        found.iter().map(|d| d.get_i32("n").unwrap()).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[tokio::test]
async fn dry_run_skips_engine_but_logs() {
    let connector = MemoryConnector::new();
    let logger = Arc::new(RecordingLogger::default());
    let dry = dry_driver(&connector, logger.clone());

    dry.create_collection("event").await.unwrap();
    assert_eq!(dry.insert("event", doc! { "title": "t" }).await.unwrap(), 0);
    dry.drop_database().await.unwrap();

    assert_eq!(connector.connections_opened(), 0);
    assert_eq!(logger.commands(), vec!["createCollection", "insert", "dropDatabase"]);

    let db = driver(&connector);
    assert!(db.find("event", FindQuery::default()).await.unwrap().is_empty());
    assert!(db.get_collection_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn get_db_instance_leaves_connection_open() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);
    db.insert("event", doc! { "title": "t" }).await.unwrap();

    let handle = db.get_db_instance().await.unwrap();
    assert_eq!(connector.open_connections(), 1);
    assert_eq!(handle.database(), "testdb");

    let documents = handle.find("event", doc! {}, None).await.unwrap();
    assert_eq!(documents.len(), 1);

    handle.close().await.unwrap();
    assert_eq!(connector.open_connections(), 0);
}

#[tokio::test]
async fn get_db_instance_connects_even_in_dry_run() {
    let connector = MemoryConnector::new();
    let dry = dry_driver(&connector, Arc::new(RecordingLogger::default()));

    let handle = dry.get_db_instance().await.unwrap();
    assert_eq!(connector.open_connections(), 1);

    handle.close().await.unwrap();
}

#[tokio::test]
async fn unreachable_engine_is_a_connection_error() {
    let connector = MemoryConnector::builder().offline(true).build();
    let db = driver(&connector);

    assert!(matches!(
        db.create_collection("event").await,
        Err(DriverError::Connection(_))
    ));

    connector.set_offline(false);
    assert!(db.get_collection_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn raw_commands_pass_through() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);
    db.insert("event", vec![doc! { "a": 1 }, doc! { "a": 2 }]).await.unwrap();

    let reply = db
        .run(Command::try_from(CallDescriptor::new("count", Some("event"), None)).unwrap())
        .await
        .unwrap();
    match reply {
        Outcome::Raw(reply) => assert_eq!(reply.get_i64("n").unwrap(), 2),
        other => panic!("unexpected outcome {other:?}"),
    }

    let err = db
        .run(Command::Raw {
            name: "frobnicate".into(),
            collection: None,
            args: doc! {},
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::UnsupportedCommand(ref name) if name == "frobnicate"));
    assert_eq!(connector.open_connections(), 0);
}

#[tokio::test]
async fn descriptors_dispatch_like_typed_commands() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    let calls = vec![
        CallDescriptor::new("createCollection", Some("event"), None),
        CallDescriptor::new(
            "insert",
            Some("event"),
            Some(Bson::Array(vec![doc! { "n": 1 }.into(), doc! { "n": 2 }.into()])),
        ),
        CallDescriptor::new("createIndex", Some("event"), Some(doc! { "indexName": "n_idx", "columns": ["n"], "unique": false }.into())),
    ];

    for call in calls {
        db.run(Command::try_from(call).unwrap()).await.unwrap();
    }

    let found = db
        .run(Command::try_from(CallDescriptor::new("find", Some("event"), Some(doc! { "query": {}, "sort": { "n": -1 } }.into()))).unwrap())
        .await
        .unwrap()
        .into_documents()
        .unwrap();
    assert_eq!(found[0].get_i32("n").unwrap(), 2);
    assert!(db.get_indexes("event").await.unwrap().iter().any(|index| index.name == "n_idx"));
}

#[tokio::test]
async fn update_one_and_many() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);
    db.insert("event", vec![doc! { "tag": "x", "n": 0 }, doc! { "tag": "x", "n": 0 }])
        .await
        .unwrap();

    let one = db
        .update_one("event", UpdateSpec::new(doc! { "tag": "x" }, doc! { "$inc": { "n": 1 } }))
        .await
        .unwrap();
    assert_eq!(one, 1);

    let many = db
        .update_many("event", UpdateSpec::new(doc! { "tag": "x" }, doc! { "$set": { "done": true } }))
        .await
        .unwrap();
    assert_eq!(many, 2);

    let upserted = db
        .run(Command::Update {
            collection: "event".into(),
            spec: UpdateSpec::new(doc! { "tag": "y" }, doc! { "$set": { "n": 5 } }).with_flags(UpdateFlags::upsert()),
        })
        .await
        .unwrap();
    match upserted {
        Outcome::Updated(summary) => assert!(summary.upserted_id.is_some()),
        other => panic!("unexpected outcome {other:?}"),
    }

    let created = db.find("event", FindQuery::filter(doc! { "tag": "y" })).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].get_i32("n").unwrap(), 5);
}

#[tokio::test]
async fn switch_database_rebinds_later_calls() {
    let connector = MemoryConnector::new();
    let mut db = driver(&connector);

    db.switch_database("other");
    db.insert("event", doc! { "a": 1 }).await.unwrap();
    assert_eq!(db.dispatcher().database(), "other");

    db.switch_database("testdb");
    assert!(db.find("event", FindQuery::default()).await.unwrap().is_empty());

    db.switch_database("other");
    db.drop_database().await.unwrap();
    assert!(db.get_collection_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn migration_bookkeeping() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);
    let table = db.dispatcher().settings().migration_table.clone();

    db.create_migrations_table().await.unwrap();
    for (name, millis) in [("001-init", 1_000), ("002-users", 2_000), ("003-index", 3_000)] {
        let record = RunRecord::new(name, Utc.timestamp_millis_opt(millis).unwrap());
        db.insert(&table, record.to_document()).await.unwrap();
    }

    let loaded = db.all_loaded_migrations().await.unwrap();
    assert_eq!(
        loaded.iter().map(|record| record.name.as_str()).collect::<Vec<_>>(),
        vec!["003-index", "002-users", "001-init"]
    );

    db.delete_migration("002-users").await.unwrap();
    assert_eq!(db.all_loaded_migrations().await.unwrap().len(), 2);
}

#[tokio::test]
async fn seed_bookkeeping() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    db.create_seeds_table().await.unwrap();
    db.add_seed_record("users").await.unwrap();

    let seeds = db.all_loaded_seeds().await.unwrap();
    assert_eq!(seeds.len(), 1);
    assert_eq!(seeds[0].name, "users");
    assert!(db.all_loaded_migrations().await.unwrap().is_empty());

    db.delete_seed("users").await.unwrap();
    assert!(db.all_loaded_seeds().await.unwrap().is_empty());
}

#[tokio::test]
async fn declared_but_unimplemented_operations_reject() {
    let connector = MemoryConnector::new();
    let db = driver(&connector);

    assert!(matches!(db.build_where_clause().await, Err(DriverError::Unimplemented(_))));
    assert!(matches!(db.update().await, Err(DriverError::Unimplemented(_))));
    assert_eq!(connector.connections_opened(), 0);

    db.create_database("anything").await.unwrap();
    db.close().await.unwrap();
}
