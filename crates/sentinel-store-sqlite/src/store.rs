// crates/sentinel-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Storage Backend
// Description: DocumentStore/ObjectStore/SecretStore backed by SQLite WAL.
// Purpose: Default single-node persistence for development and small
// deployments.
// Dependencies: rusqlite, sentinel-core, tokio
// ============================================================================

//! ## Overview
//! A single `SQLite` connection, guarded by a [`std::sync::Mutex`] and driven
//! from a blocking thread pool via [`tokio::task::spawn_blocking`], backs all
//! three storage ports. Documents and blobs are addressed by opaque string
//! keys; list pagination uses a JSON-encoded cursor (collection, last key)
//! rather than relying on `SQLite` row ids, so callers never observe
//! storage-internal ordering.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use sentinel_core::DocumentStore;
use sentinel_core::ListPage;
use sentinel_core::ObjectStore;
use sentinel_core::SecretStore;
use sentinel_core::StoreError;
use sentinel_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Default busy timeout, in milliseconds, before a write gives up waiting on
/// a lock held by another connection.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Errors specific to constructing or migrating the `SQLite` backend.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Failed to open or configure the database connection.
    #[error("sqlite connection error: {0}")]
    Connection(String),
    /// Failed to apply the embedded schema migration.
    #[error("sqlite migration error: {0}")]
    Migration(String),
}

/// A `SQLite`-backed implementation of every Sentinel storage port.
#[derive(Clone)]
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if absent) a `SQLite` database at `path` and applies
    /// the embedded schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the connection cannot be opened or
    /// the schema migration fails.
    pub fn open(path: &Path) -> Result<Self, SqliteStoreError> {
        let connection = Connection::open(path).map_err(|err| SqliteStoreError::Connection(err.to_string()))?;
        configure_connection(&connection)?;
        run_migrations(&connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Opens an in-memory `SQLite` database, primarily for tests.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the connection or schema fails.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let connection = Connection::open_in_memory().map_err(|err| SqliteStoreError::Connection(err.to_string()))?;
        configure_connection(&connection)?;
        run_migrations(&connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Default on-disk database path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from("sentinel.sqlite3")
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard = connection.lock().map_err(|_| StoreError::Io("sqlite mutex poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|err| StoreError::Backend(format!("blocking task join error: {err}")))?
    }
}

fn configure_connection(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .map_err(|err| SqliteStoreError::Connection(err.to_string()))?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .map_err(|err| SqliteStoreError::Connection(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .map_err(|err| SqliteStoreError::Connection(err.to_string()))?;
    Ok(())
}

fn run_migrations(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (collection, key)
            );
            CREATE TABLE IF NOT EXISTS objects (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                content_type TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS secrets (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at_millis INTEGER
            );",
        )
        .map_err(|err| SqliteStoreError::Migration(err.to_string()))?;
    Ok(())
}

/// Opaque pagination cursor for [`DocumentStore::list`].
#[derive(Debug, Serialize, Deserialize)]
struct ListCursor {
    last_key: String,
}

fn encode_cursor(last_key: &str) -> String {
    serde_json::to_string(&ListCursor { last_key: last_key.to_string() }).unwrap_or_default()
}

fn decode_cursor(cursor: &str) -> Result<ListCursor, StoreError> {
    serde_json::from_str(cursor).map_err(|_| StoreError::Backend("invalid list cursor".to_string()))
}

const LIST_PAGE_SIZE: i64 = 500;

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT value FROM documents WHERE collection = ?1 AND key = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Backend(err.to_string()))
        })
        .await
    }

    async fn put(&self, collection: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        let value = value.to_vec();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO documents (collection, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(collection, key) DO UPDATE SET value = excluded.value",
                params![collection, key, value],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM documents WHERE collection = ?1 AND key = ?2", params![collection, key])
                .map_err(|err| StoreError::Backend(err.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn list(&self, collection: &str, prefix: &str, cursor: Option<&str>) -> Result<ListPage, StoreError> {
        let collection = collection.to_string();
        let prefix = prefix.to_string();
        let last_key = match cursor {
            Some(token) => Some(decode_cursor(token)?.last_key),
            None => None,
        };
        self.with_connection(move |conn| {
            let like_pattern = format!("{prefix}%");
            let mut stmt = conn
                .prepare(
                    "SELECT key FROM documents WHERE collection = ?1 AND key LIKE ?2 AND key > ?3
                     ORDER BY key LIMIT ?4",
                )
                .map_err(|err| StoreError::Backend(err.to_string()))?;
            let floor = last_key.unwrap_or_default();
            let keys: Vec<String> = stmt
                .query_map(params![collection, like_pattern, floor, LIST_PAGE_SIZE], |row| row.get(0))
                .map_err(|err| StoreError::Backend(err.to_string()))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| StoreError::Backend(err.to_string()))?;
            let next_cursor = if keys.len() == usize::try_from(LIST_PAGE_SIZE).unwrap_or(usize::MAX) {
                keys.last().map(|key| encode_cursor(key))
            } else {
                None
            };
            Ok(ListPage { keys, next_cursor })
        })
        .await
    }
}

#[async_trait]
impl ObjectStore for SqliteStore {
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.query_row("SELECT value FROM objects WHERE key = ?1", params![key], |row| row.get(0))
                .optional()
                .map_err(|err| StoreError::Backend(err.to_string()))
        })
        .await
    }

    async fn put_object(&self, key: &str, value: &[u8], content_type: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_vec();
        let content_type = content_type.to_string();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO objects (key, value, content_type) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, content_type = excluded.content_type",
                params![key, value, content_type],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM objects WHERE key = ?1", params![key])
                .map_err(|err| StoreError::Backend(err.to_string()))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SecretStore for SqliteStore {
    async fn get_secret(&self, name: &str) -> Result<Option<String>, StoreError> {
        let name = name.to_string();
        let now = Timestamp::now().epoch_millis();
        self.with_connection(move |conn| {
            let row: Option<(String, Option<i64>)> = conn
                .query_row(
                    "SELECT value, expires_at_millis FROM secrets WHERE name = ?1",
                    params![name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|err| StoreError::Backend(err.to_string()))?;
            match row {
                Some((_value, Some(expires_at))) if expires_at <= now => Ok(None),
                Some((value, _)) => Ok(Some(value)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put_secret(&self, name: &str, value: &str, ttl_seconds: Option<u64>) -> Result<(), StoreError> {
        let name = name.to_string();
        let value = value.to_string();
        let expires_at = ttl_seconds.map(|ttl| {
            Timestamp::now().plus_seconds(i64::try_from(ttl).unwrap_or(i64::MAX)).epoch_millis()
        });
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO secrets (name, value, expires_at_millis) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value, expires_at_millis = excluded.expires_at_millis",
                params![name, value, expires_at],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn document_round_trips() {
        let store = SqliteStore::open_in_memory().expect("open store");
        store.put("jobs", "job-1", b"payload").await.expect("put");
        let value = store.get("jobs", "job-1").await.expect("get");
        assert_eq!(value, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn deleted_document_reads_as_none() {
        let store = SqliteStore::open_in_memory().expect("open store");
        store.put("jobs", "job-1", b"payload").await.expect("put");
        store.delete("jobs", "job-1").await.expect("delete");
        assert_eq!(store.get("jobs", "job-1").await.expect("get"), None);
    }

    #[tokio::test]
    async fn secret_ttl_expires() {
        let store = SqliteStore::open_in_memory().expect("open store");
        store.put_secret("api-key", "s3cr3t", Some(0)).await.expect("put secret");
        let value = store.get_secret("api-key").await.expect("get secret");
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn list_respects_prefix_filter() {
        let store = SqliteStore::open_in_memory().expect("open store");
        store.put("jobs", "a-1", b"x").await.expect("put");
        store.put("jobs", "b-1", b"x").await.expect("put");
        let page = store.list("jobs", "a-", None).await.expect("list");
        assert_eq!(page.keys, vec!["a-1".to_string()]);
        assert_eq!(page.next_cursor, None);
    }
}
