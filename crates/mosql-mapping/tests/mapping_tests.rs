//! Generator and mapping round-trip behavior against an in-memory source.

use bson::oid::ObjectId;
use bson::{doc, DateTime};
use mosql_core::{Connection, Export, User};
use mosql_mapping::{
    generate_schema_mapping, load_schema_mapping, read_mapping_dir, retained_collections,
    MappingError,
};
use mosql_source::MemoryDocumentSource;
use mosql_store::MappingStore;

fn seed_export(store: &MappingStore, namespace: &str, include: &str, exclude: &str) -> i64 {
    let export = Export {
        namespace: namespace.to_string(),
        export_type: "mongo_to_postgres".into(),
        source_connection: Connection {
            name: "appdb".into(),
            connection_uri: "mongodb://localhost:27017/appdb".into(),
        },
        destination_connection: Connection {
            name: "warehouse".into(),
            connection_uri: "postgres://localhost:5432/warehouse".into(),
        },
        include_collections: include.to_string(),
        exclude_collections: exclude.to_string(),
        creator: User {
            user_name: "ops".into(),
            email: "ops@mosql.io".into(),
            ..Default::default()
        },
        updater: User {
            user_name: "ops".into(),
            email: "ops@mosql.io".into(),
            ..Default::default()
        },
        ..Default::default()
    };
    store.create_export(&export).unwrap()
}

fn three_collection_source() -> MemoryDocumentSource {
    MemoryDocumentSource::new()
        .with_collection(
            "users",
            vec![doc! {
                "_id": ObjectId::new(),
                "userName": "ada",
                "attributes": { "phoneVerified": true },
                "signupDate": DateTime::parse_rfc3339_str("2024-03-19T06:01:17Z").unwrap(),
            }],
        )
        .with_collection(
            "orders",
            vec![doc! {
                "_id": ObjectId::new(),
                "total": 99.5_f64,
                "itemCount": 3_i32,
            }],
        )
        .with_collection(
            "events",
            vec![doc! {
                "_id": ObjectId::new(),
                "kind": "click",
                "sequence": 100_i64,
            }],
        )
}

#[tokio::test]
async fn generates_schemas_with_default_types_and_primary_key() {
    let store = MappingStore::in_memory().unwrap();
    seed_export(&store, "acme", "", "");
    let source = three_collection_source();
    let dir = tempfile::tempdir().unwrap();

    let generated = generate_schema_mapping(&store, &source, "acme", dir.path())
        .await
        .unwrap();

    assert_eq!(generated.export.schemas.len(), 3);
    // export file plus one file per schema
    assert_eq!(generated.files.len(), 4);

    let users = generated
        .export
        .schema_for_collection("users")
        .expect("users schema");
    assert_eq!(users.table, "users");
    assert_eq!(users.version, "1.0-default-generated");
    assert_eq!(users.primary_key.as_deref(), Some("id"));

    let by_source = |field: &str| {
        users
            .mappings
            .iter()
            .find(|m| m.source_field_name == field)
            .unwrap_or_else(|| panic!("no mapping for {field}"))
    };
    assert_eq!(by_source("id").destination_field_type, "TEXT");
    assert_eq!(by_source("userName").destination_field_name, "user_name");
    assert_eq!(by_source("userName").destination_field_type, "TEXT");
    assert_eq!(
        by_source("attributes.phoneVerified").destination_field_name,
        "attributes_phone_verified"
    );
    assert_eq!(
        by_source("attributes.phoneVerified").destination_field_type,
        "BOOLEAN"
    );
    assert_eq!(by_source("signupDate").destination_field_type, "TIMESTAMPTZ");
}

#[tokio::test]
async fn include_filter_wins_and_missing_include_is_fatal() {
    let store = MappingStore::in_memory().unwrap();
    seed_export(&store, "only-users", "users", "users");
    let source = three_collection_source();

    let export = store.find_export_by_namespace("only-users").unwrap();
    let retained = retained_collections(&export, &source).await.unwrap();
    assert_eq!(retained, vec!["users".to_string()]);

    let store2 = MappingStore::in_memory().unwrap();
    seed_export(&store2, "ghost", "missing_collection", "");
    let export = store2.find_export_by_namespace("ghost").unwrap();
    assert!(matches!(
        retained_collections(&export, &source).await,
        Err(MappingError::FilterInvalid { .. })
    ));
}

#[tokio::test]
async fn excluding_everything_is_fatal() {
    let store = MappingStore::in_memory().unwrap();
    seed_export(&store, "none", "", "users,orders,events");
    let export = store.find_export_by_namespace("none").unwrap();
    let source = three_collection_source();

    assert!(matches!(
        retained_collections(&export, &source).await,
        Err(MappingError::FilterInvalid { .. })
    ));
}

#[tokio::test]
async fn round_trip_of_untouched_files_yields_empty_changeset() {
    let store = MappingStore::in_memory().unwrap();
    seed_export(&store, "acme", "", "");
    let source = three_collection_source();
    let dir = tempfile::tempdir().unwrap();

    generate_schema_mapping(&store, &source, "acme", dir.path())
        .await
        .unwrap();

    let loaded = load_schema_mapping(&store, "acme", dir.path()).unwrap();
    assert!(
        loaded.changeset.is_empty(),
        "unexpected changes: {:?}",
        loaded.changeset
    );
}

#[tokio::test]
async fn edited_destination_uri_is_the_only_change() {
    let store = MappingStore::in_memory().unwrap();
    seed_export(&store, "acme", "", "");
    let source = three_collection_source();
    let dir = tempfile::tempdir().unwrap();

    generate_schema_mapping(&store, &source, "acme", dir.path())
        .await
        .unwrap();

    // edit the export file the way a user would
    let export_path = dir.path().join("export_acme.json");
    let edited = std::fs::read_to_string(&export_path)
        .unwrap()
        .replace(
            "postgres://localhost:5432/warehouse",
            "postgres://db.internal:5432/warehouse",
        );
    std::fs::write(&export_path, edited).unwrap();

    let loaded = load_schema_mapping(&store, "acme", dir.path()).unwrap();
    assert_eq!(
        loaded.changeset.fields(),
        vec!["Destination database connection uri"]
    );
    assert!(loaded.changeset.schema_changes.is_empty());

    // the store now carries the edited value
    let reloaded = store.find_export_by_namespace("acme").unwrap();
    assert_eq!(
        reloaded.destination_connection.connection_uri,
        "postgres://db.internal:5432/warehouse"
    );
}

#[tokio::test]
async fn edited_schema_type_is_a_schema_change() {
    use mosql_mapping::SchemaChange;

    let store = MappingStore::in_memory().unwrap();
    seed_export(&store, "acme", "orders", "");
    let source = three_collection_source();
    let dir = tempfile::tempdir().unwrap();

    generate_schema_mapping(&store, &source, "acme", dir.path())
        .await
        .unwrap();

    let schema_path = dir.path().join("orders.json");
    let edited = std::fs::read_to_string(&schema_path)
        .unwrap()
        .replace("\"INTEGER\"", "\"BIGINT\"");
    std::fs::write(&schema_path, edited).unwrap();

    let loaded = load_schema_mapping(&store, "acme", dir.path()).unwrap();
    assert!(loaded.changeset.entries.is_empty());
    assert_eq!(loaded.changeset.schema_changes.len(), 1);
    assert!(matches!(
        &loaded.changeset.schema_changes[0],
        SchemaChange::FieldTypeChanged { field, new, .. }
            if field == "itemCount" && new == "BIGINT"
    ));
}

#[tokio::test]
async fn tampered_export_id_is_a_fatal_load_error() {
    let store = MappingStore::in_memory().unwrap();
    let id = seed_export(&store, "acme", "users", "");
    let source = three_collection_source();
    let dir = tempfile::tempdir().unwrap();

    generate_schema_mapping(&store, &source, "acme", dir.path())
        .await
        .unwrap();

    let export_path = dir.path().join("export_acme.json");
    let edited = std::fs::read_to_string(&export_path)
        .unwrap()
        .replace(
            &format!("\"id\": {id},"),
            &format!("\"id\": {},", id + 41),
        );
    std::fs::write(&export_path, edited).unwrap();

    assert!(matches!(
        load_schema_mapping(&store, "acme", dir.path()),
        Err(MappingError::MappingFileInvalid { .. })
    ));
}

#[tokio::test]
async fn unreadable_mapping_dir_is_invalid() {
    let store = MappingStore::in_memory().unwrap();
    seed_export(&store, "acme", "", "");
    let dir = tempfile::tempdir().unwrap();

    assert!(matches!(
        load_schema_mapping(&store, "acme", dir.path()),
        Err(MappingError::MappingFileInvalid { .. })
    ));
}

#[tokio::test]
async fn reading_files_back_matches_what_was_written() {
    let store = MappingStore::in_memory().unwrap();
    seed_export(&store, "acme", "users,orders", "");
    let source = three_collection_source();
    let dir = tempfile::tempdir().unwrap();

    let generated = generate_schema_mapping(&store, &source, "acme", dir.path())
        .await
        .unwrap();

    let read_back = read_mapping_dir(dir.path(), "acme").unwrap();
    assert_eq!(read_back.namespace, "acme");
    assert_eq!(read_back.schemas.len(), generated.export.schemas.len());
    assert_eq!(
        read_back.schema_for_collection("users").unwrap().mappings,
        generated.export.schema_for_collection("users").unwrap().mappings
    );
}
