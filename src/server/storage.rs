//! SQLite persistence for the store server.
//!
//! Each record is one row keyed by `(user_id, collection, key)` holding the
//! record's JSON text. A collection's snapshot is assembled from its rows in
//! key order; a collection with no rows does not exist.

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;

/// Errors from the server's storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored value is not valid JSON.
    #[error("Corrupt record {0}: {1}")]
    Corrupt(String, String),
    /// A collection can only be replaced by an object of records.
    #[error("Collection value must be an object, got {0}")]
    NotACollection(String),
}

/// Opens (creating if needed) the database at `path` and runs migrations.
pub async fn init_db(path: &Path) -> Result<SqlitePool, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    key: String,
    value: String,
}

/// Reads and writes per-user records.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All records of a collection as one object, or `None` if it is empty.
    pub async fn load_collection(
        &self,
        user_id: &str,
        collection: &str,
    ) -> Result<Option<Value>, StorageError> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            "SELECT key, value FROM records WHERE user_id = ? AND collection = ? ORDER BY key",
        )
        .bind(user_id)
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut records = Map::new();
        for row in rows {
            let value = serde_json::from_str(&row.value)
                .map_err(|e| StorageError::Corrupt(row.key.clone(), e.to_string()))?;
            records.insert(row.key, value);
        }
        Ok(Some(Value::Object(records)))
    }

    /// Replaces one record. `null` or an empty object deletes it.
    pub async fn put(
        &self,
        user_id: &str,
        collection: &str,
        key: &str,
        value: &Value,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        put_in(&mut tx, user_id, collection, key, value).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replaces a whole collection with an object of records, or clears it
    /// with `null`.
    pub async fn replace_collection(
        &self,
        user_id: &str,
        collection: &str,
        value: &Value,
    ) -> Result<(), StorageError> {
        let empty = Map::new();
        let records = match value {
            Value::Null => &empty,
            Value::Object(records) => records,
            other => return Err(StorageError::NotACollection(kind_of(other).to_string())),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records WHERE user_id = ? AND collection = ?")
            .bind(user_id)
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        for (key, record) in records {
            put_in(&mut tx, user_id, collection, key, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Merges `fields` into one record. `null` fields are removed; a record
    /// left with no fields is deleted.
    pub async fn patch(
        &self,
        user_id: &str,
        collection: &str,
        key: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM records WHERE user_id = ? AND collection = ? AND key = ?",
        )
        .bind(user_id)
        .bind(collection)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        let mut record = match existing {
            Some((text,)) => match serde_json::from_str(&text) {
                Ok(Value::Object(record)) => record,
                Ok(_) => Map::new(),
                Err(e) => return Err(StorageError::Corrupt(key.to_string(), e.to_string())),
            },
            None => Map::new(),
        };

        for (field, value) in fields {
            if value.is_null() {
                record.remove(field);
            } else {
                record.insert(field.clone(), value.clone());
            }
        }

        put_in(&mut tx, user_id, collection, key, &Value::Object(record)).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Patches a collection: each field names a record to replace or, when
    /// `null`, delete.
    pub async fn patch_collection(
        &self,
        user_id: &str,
        collection: &str,
        records: &Map<String, Value>,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for (key, record) in records {
            put_in(&mut tx, user_id, collection, key, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(
        &self,
        user_id: &str,
        collection: &str,
        key: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM records WHERE user_id = ? AND collection = ? AND key = ?")
            .bind(user_id)
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_collection(
        &self,
        user_id: &str,
        collection: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM records WHERE user_id = ? AND collection = ?")
            .bind(user_id)
            .bind(collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn put_in(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    collection: &str,
    key: &str,
    value: &Value,
) -> Result<(), StorageError> {
    let removes = match value {
        Value::Null => true,
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    };

    if removes {
        sqlx::query("DELETE FROM records WHERE user_id = ? AND collection = ? AND key = ?")
            .bind(user_id)
            .bind(collection)
            .bind(key)
            .execute(&mut **tx)
            .await?;
        return Ok(());
    }

    let text = value.to_string();
    let updated_at = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO records (user_id, collection, key, value, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (user_id, collection, key)
        DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(collection)
    .bind(key)
    .bind(&text)
    .bind(&updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
