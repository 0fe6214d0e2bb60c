//! SQLite-backed mapping store.
//!
//! One local database file per installation (`mosql.db`) holds Exports,
//! Connections, Users, UserLogins, Schemas and FieldMappings with standard
//! relational foreign keys. The store is synchronous; export execution never
//! touches it from stage workers, so a single mutex-guarded connection is
//! enough.

mod errors;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Transaction};
use tracing::{debug, info};

use mosql_core::{Connection, Export, FieldMapping, Schema, User};

pub use errors::{StoreError, StoreResult};

pub struct MappingStore {
    conn: Mutex<SqliteConnection>,
}

impl MappingStore {
    /// Open (and migrate) the store at a file path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = SqliteConnection::open(path.as_ref())?;
        Self::init(&conn)?;
        info!(path = %path.as_ref().display(), "mapping store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = SqliteConnection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &SqliteConnection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                connection_uri TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_name TEXT NOT NULL DEFAULT '',
                full_name TEXT NOT NULL DEFAULT '',
                email TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS user_logins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                password_hash TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT '',
                login_type TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS exports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL UNIQUE,
                export_type TEXT NOT NULL,
                source_connection_id INTEGER NOT NULL REFERENCES connections(id),
                destination_connection_id INTEGER NOT NULL REFERENCES connections(id),
                include_collections TEXT NOT NULL DEFAULT '',
                exclude_collections TEXT NOT NULL DEFAULT '',
                creator_id INTEGER NOT NULL REFERENCES users(id),
                updater_id INTEGER NOT NULL REFERENCES users(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_exports_namespace ON exports(namespace);

            CREATE TABLE IF NOT EXISTS schemas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                export_id INTEGER NOT NULL REFERENCES exports(id) ON DELETE CASCADE,
                namespace TEXT NOT NULL,
                collection TEXT NOT NULL,
                sql_table TEXT NOT NULL,
                primary_key TEXT,
                version TEXT NOT NULL DEFAULT '',
                indexes TEXT NOT NULL DEFAULT '',
                UNIQUE(namespace, collection)
            );

            CREATE TABLE IF NOT EXISTS mappings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                schema_id INTEGER NOT NULL REFERENCES schemas(id) ON DELETE CASCADE,
                source_field_name TEXT NOT NULL,
                destination_field_name TEXT NOT NULL,
                source_field_type TEXT NOT NULL,
                destination_field_type TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Persist a new export aggregate. The export's namespace must be
    /// unused.
    pub fn create_export(&self, export: &Export) -> StoreResult<i64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM exports WHERE namespace = ?1",
                params![export.namespace],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::DuplicateNamespace {
                namespace: export.namespace.clone(),
            });
        }

        let source_id = insert_connection(&tx, &export.source_connection)?;
        let destination_id = insert_connection(&tx, &export.destination_connection)?;
        let creator_id = insert_user(&tx, &export.creator)?;
        let updater_id = if export.updater == export.creator {
            creator_id
        } else {
            insert_user(&tx, &export.updater)?
        };

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO exports (namespace, export_type, source_connection_id,
                destination_connection_id, include_collections, exclude_collections,
                creator_id, updater_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                export.namespace,
                export.export_type,
                source_id,
                destination_id,
                export.include_collections,
                export.exclude_collections,
                creator_id,
                updater_id,
                now,
            ],
        )
        .map_err(|e| map_namespace_conflict(e, &export.namespace))?;
        let export_id = tx.last_insert_rowid();

        for schema in &export.schemas {
            insert_schema(&tx, export_id, schema)?;
        }

        tx.commit()?;
        info!(export_id, namespace = %export.namespace, "export created");
        Ok(export_id)
    }

    /// Persist a schema for an already-stored export.
    pub fn create_schema(&self, schema: &Schema) -> StoreResult<i64> {
        if schema.export_id < 1 {
            return Err(StoreError::OrphanSchema);
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let id = insert_schema(&tx, schema.export_id, schema)?;
        tx.commit()?;
        debug!(schema_id = id, collection = %schema.collection, "schema created");
        Ok(id)
    }

    /// Load the full export aggregate for a namespace.
    pub fn find_export_by_namespace(&self, namespace: &str) -> StoreResult<Export> {
        let conn = self.conn.lock().unwrap();
        let id: i64 = conn
            .query_row(
                "SELECT id FROM exports WHERE namespace = ?1",
                params![namespace],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;
        load_export(&conn, id)
    }

    pub fn list_exports(&self) -> StoreResult<Vec<Export>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM exports ORDER BY id")?;
        let ids: Vec<i64> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);

        ids.into_iter().map(|id| load_export(&conn, id)).collect()
    }

    /// Delete an export and everything it owns.
    pub fn delete_export(&self, id: i64) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let row: Option<(i64, i64, i64, i64)> = tx
            .query_row(
                "SELECT source_connection_id, destination_connection_id, creator_id, updater_id
                 FROM exports WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let (source_id, destination_id, creator_id, updater_id) =
            row.ok_or(StoreError::NotFound)?;

        // schemas and mappings cascade from the export row
        tx.execute("DELETE FROM exports WHERE id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM connections WHERE id IN (?1, ?2)",
            params![source_id, destination_id],
        )?;
        tx.execute(
            "DELETE FROM users WHERE id IN (?1, ?2)",
            params![creator_id, updater_id],
        )?;

        tx.commit()?;
        info!(export_id = id, "export deleted");
        Ok(())
    }

    /// Rewrite a stored export aggregate. Used by the mapping loader after a
    /// diff produced changes; schemas and mappings are replaced wholesale.
    pub fn update_export(&self, export: &Export) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let row: Option<(i64, i64, i64, i64)> = tx
            .query_row(
                "SELECT source_connection_id, destination_connection_id, creator_id, updater_id
                 FROM exports WHERE id = ?1",
                params![export.id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let (source_id, destination_id, creator_id, updater_id) =
            row.ok_or(StoreError::NotFound)?;

        update_connection(&tx, source_id, &export.source_connection)?;
        update_connection(&tx, destination_id, &export.destination_connection)?;
        update_user(&tx, creator_id, &export.creator)?;
        update_user(&tx, updater_id, &export.updater)?;

        tx.execute(
            "UPDATE exports SET namespace = ?1, export_type = ?2,
                include_collections = ?3, exclude_collections = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                export.namespace,
                export.export_type,
                export.include_collections,
                export.exclude_collections,
                Utc::now().to_rfc3339(),
                export.id,
            ],
        )?;

        tx.execute(
            "DELETE FROM schemas WHERE export_id = ?1",
            params![export.id],
        )?;
        for schema in &export.schemas {
            insert_schema(&tx, export.id, schema)?;
        }

        tx.commit()?;
        info!(export_id = export.id, namespace = %export.namespace, "export updated");
        Ok(())
    }
}

fn map_namespace_conflict(err: rusqlite::Error, namespace: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.contains("exports.namespace") =>
        {
            StoreError::DuplicateNamespace {
                namespace: namespace.to_string(),
            }
        }
        _ => StoreError::Storage(err),
    }
}

fn insert_connection(tx: &Transaction<'_>, conn: &Connection) -> StoreResult<i64> {
    tx.execute(
        "INSERT INTO connections (name, connection_uri) VALUES (?1, ?2)",
        params![conn.name, conn.connection_uri],
    )?;
    Ok(tx.last_insert_rowid())
}

fn update_connection(tx: &Transaction<'_>, id: i64, conn: &Connection) -> StoreResult<()> {
    tx.execute(
        "UPDATE connections SET name = ?1, connection_uri = ?2 WHERE id = ?3",
        params![conn.name, conn.connection_uri, id],
    )?;
    Ok(())
}

fn insert_user(tx: &Transaction<'_>, user: &User) -> StoreResult<i64> {
    tx.execute(
        "INSERT INTO users (user_name, full_name, email) VALUES (?1, ?2, ?3)",
        params![user.user_name, user.full_name, user.email],
    )?;
    Ok(tx.last_insert_rowid())
}

fn update_user(tx: &Transaction<'_>, id: i64, user: &User) -> StoreResult<()> {
    tx.execute(
        "UPDATE users SET user_name = ?1, full_name = ?2, email = ?3 WHERE id = ?4",
        params![user.user_name, user.full_name, user.email, id],
    )?;
    Ok(())
}

fn insert_schema(tx: &Transaction<'_>, export_id: i64, schema: &Schema) -> StoreResult<i64> {
    tx.execute(
        "INSERT INTO schemas (export_id, namespace, collection, sql_table,
            primary_key, version, indexes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            export_id,
            schema.namespace,
            schema.collection,
            schema.table,
            schema.primary_key,
            schema.version,
            schema.indexes,
        ],
    )?;
    let schema_id = tx.last_insert_rowid();

    for mapping in &schema.mappings {
        tx.execute(
            "INSERT INTO mappings (schema_id, source_field_name, destination_field_name,
                source_field_type, destination_field_type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                schema_id,
                mapping.source_field_name,
                mapping.destination_field_name,
                mapping.source_field_type,
                mapping.destination_field_type,
            ],
        )?;
    }
    Ok(schema_id)
}

fn load_export(conn: &SqliteConnection, id: i64) -> StoreResult<Export> {
    let (
        namespace,
        export_type,
        source_id,
        destination_id,
        include_collections,
        exclude_collections,
        creator_id,
        updater_id,
        created_at,
        updated_at,
    ): (
        String,
        String,
        i64,
        i64,
        String,
        String,
        i64,
        i64,
        String,
        String,
    ) = conn
        .query_row(
            "SELECT namespace, export_type, source_connection_id, destination_connection_id,
                include_collections, exclude_collections, creator_id, updater_id,
                created_at, updated_at
             FROM exports WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            },
        )
        .optional()?
        .ok_or(StoreError::NotFound)?;

    Ok(Export {
        id,
        namespace,
        export_type,
        source_connection: load_connection(conn, source_id)?,
        destination_connection: load_connection(conn, destination_id)?,
        schemas: load_schemas(conn, id)?,
        include_collections,
        exclude_collections,
        creator: load_user(conn, creator_id)?,
        updater: load_user(conn, updater_id)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn load_connection(conn: &SqliteConnection, id: i64) -> StoreResult<Connection> {
    Ok(conn.query_row(
        "SELECT name, connection_uri FROM connections WHERE id = ?1",
        params![id],
        |row| {
            Ok(Connection {
                name: row.get(0)?,
                connection_uri: row.get(1)?,
            })
        },
    )?)
}

fn load_user(conn: &SqliteConnection, id: i64) -> StoreResult<User> {
    Ok(conn.query_row(
        "SELECT user_name, full_name, email FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok(User {
                user_name: row.get(0)?,
                full_name: row.get(1)?,
                email: row.get(2)?,
            })
        },
    )?)
}

fn load_schemas(conn: &SqliteConnection, export_id: i64) -> StoreResult<Vec<Schema>> {
    let mut stmt = conn.prepare(
        "SELECT id, namespace, collection, sql_table, primary_key, version, indexes
         FROM schemas WHERE export_id = ?1 ORDER BY id",
    )?;
    let schemas: Vec<Schema> = stmt
        .query_map(params![export_id], |row| {
            Ok(Schema {
                id: row.get(0)?,
                export_id,
                namespace: row.get(1)?,
                collection: row.get(2)?,
                table: row.get(3)?,
                primary_key: row.get(4)?,
                version: row.get(5)?,
                indexes: row.get(6)?,
                mappings: Vec::new(),
            })
        })?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    schemas
        .into_iter()
        .map(|mut schema| {
            schema.mappings = load_mappings(conn, schema.id)?;
            Ok(schema)
        })
        .collect()
}

fn load_mappings(conn: &SqliteConnection, schema_id: i64) -> StoreResult<Vec<FieldMapping>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_field_name, destination_field_name,
                source_field_type, destination_field_type
         FROM mappings WHERE schema_id = ?1 ORDER BY id",
    )?;
    let mappings = stmt
        .query_map(params![schema_id], |row| {
            Ok(FieldMapping {
                id: row.get(0)?,
                schema_id,
                source_field_name: row.get(1)?,
                destination_field_name: row.get(2)?,
                source_field_type: row.get(3)?,
                destination_field_type: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(mappings)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosql_core::GENERATED_VERSION;

    fn sample_export(namespace: &str) -> Export {
        Export {
            namespace: namespace.to_string(),
            export_type: "mongo_to_postgres".to_string(),
            source_connection: Connection {
                name: "mongo".into(),
                connection_uri: "mongodb://localhost:27017/testdb".into(),
            },
            destination_connection: Connection {
                name: "postgres".into(),
                connection_uri: "postgres://localhost:5432/destdb".into(),
            },
            include_collections: "coll1,coll2".into(),
            exclude_collections: String::new(),
            creator: User {
                user_name: "testUser".into(),
                email: "user@mosql.io".into(),
                ..Default::default()
            },
            updater: User {
                user_name: "testUser".into(),
                email: "user@mosql.io".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn sample_schema(export_id: i64, namespace: &str, collection: &str) -> Schema {
        Schema {
            export_id,
            namespace: namespace.to_string(),
            collection: collection.to_string(),
            table: collection.to_string(),
            primary_key: Some("id".into()),
            version: GENERATED_VERSION.into(),
            indexes: String::new(),
            mappings: vec![FieldMapping {
                id: 0,
                schema_id: 0,
                source_field_name: "id".into(),
                destination_field_name: "id".into(),
                source_field_type: "object_id".into(),
                destination_field_type: "TEXT".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn create_and_reload_full_aggregate() {
        let store = MappingStore::in_memory().unwrap();
        let id = store.create_export(&sample_export("acme")).unwrap();
        assert!(id > 0);

        store
            .create_schema(&sample_schema(id, "acme", "users"))
            .unwrap();

        let loaded = store.find_export_by_namespace("acme").unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.export_type, "mongo_to_postgres");
        assert_eq!(loaded.source_connection.name, "mongo");
        assert_eq!(
            loaded.destination_connection.connection_uri,
            "postgres://localhost:5432/destdb"
        );
        assert_eq!(loaded.creator.user_name, "testUser");
        assert_eq!(loaded.schemas.len(), 1);
        assert_eq!(loaded.schemas[0].collection, "users");
        assert_eq!(loaded.schemas[0].mappings.len(), 1);
        assert_eq!(loaded.schemas[0].mappings[0].destination_field_name, "id");
    }

    #[test]
    fn duplicate_namespace_is_rejected() {
        let store = MappingStore::in_memory().unwrap();
        store.create_export(&sample_export("acme")).unwrap();

        let err = store.create_export(&sample_export("acme")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateNamespace { ref namespace } if namespace == "acme"
        ));
    }

    #[test]
    fn distinct_namespaces_create_distinct_exports() {
        let store = MappingStore::in_memory().unwrap();
        let a = store.create_export(&sample_export("acme")).unwrap();
        let b = store.create_export(&sample_export("globex")).unwrap();
        assert_ne!(a, b);

        let all = store.list_exports().unwrap();
        let namespaces: Vec<&str> = all.iter().map(|e| e.namespace.as_str()).collect();
        assert_eq!(namespaces, vec!["acme", "globex"]);
    }

    #[test]
    fn missing_namespace_is_not_found() {
        let store = MappingStore::in_memory().unwrap();
        assert!(matches!(
            store.find_export_by_namespace("nothing"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn schema_without_export_is_rejected() {
        let store = MappingStore::in_memory().unwrap();
        let schema = sample_schema(0, "acme", "users");
        assert!(matches!(
            store.create_schema(&schema),
            Err(StoreError::OrphanSchema)
        ));
    }

    #[test]
    fn delete_cascades_schemas_and_mappings() {
        let store = MappingStore::in_memory().unwrap();
        let id = store.create_export(&sample_export("acme")).unwrap();
        store
            .create_schema(&sample_schema(id, "acme", "users"))
            .unwrap();

        store.delete_export(id).unwrap();
        assert!(matches!(
            store.find_export_by_namespace("acme"),
            Err(StoreError::NotFound)
        ));

        // namespace is free again
        store.create_export(&sample_export("acme")).unwrap();
    }

    #[test]
    fn delete_missing_export_is_not_found() {
        let store = MappingStore::in_memory().unwrap();
        assert!(matches!(store.delete_export(42), Err(StoreError::NotFound)));
    }

    #[test]
    fn update_rewrites_scalars_and_schemas() {
        let store = MappingStore::in_memory().unwrap();
        let id = store.create_export(&sample_export("acme")).unwrap();
        store
            .create_schema(&sample_schema(id, "acme", "users"))
            .unwrap();

        let mut export = store.find_export_by_namespace("acme").unwrap();
        export.destination_connection.connection_uri =
            "postgres://db.internal:5432/destdb".into();
        export.schemas[0].table = "app_users".into();
        store.update_export(&export).unwrap();

        let reloaded = store.find_export_by_namespace("acme").unwrap();
        assert_eq!(
            reloaded.destination_connection.connection_uri,
            "postgres://db.internal:5432/destdb"
        );
        assert_eq!(reloaded.schemas[0].table, "app_users");
        assert_eq!(reloaded.schemas[0].mappings.len(), 1);
    }
}
