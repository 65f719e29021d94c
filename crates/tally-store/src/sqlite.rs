//! # SQLite Document Store
//!
//! A `DocumentStore` over a single `documents` table, one row per
//! `(collection, key)` with a JSON body.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SqliteStore                                                            │
//! │  ┌───────────────┐   ┌──────────────────────────────────────────────┐  │
//! │  │  SqlitePool   │──►│ documents(collection, key, body, updated_at) │  │
//! │  │  WAL, NORMAL  │   └──────────────────────────────────────────────┘  │
//! │  └───────┬───────┘                                                     │
//! │          │ every write = one transaction                               │
//! │          ▼                                                             │
//! │  ┌───────────────┐   snapshot of each touched collection               │
//! │  │   FeedHub     │──► subscribers (only if anyone is listening)        │
//! │  └───────────────┘                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! WAL journaling lets the dashboard read while a bulk job writes.
//!
//! The change feed covers writes made through this handle (and its clones);
//! writes from another process are seen on the next subscription.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batch::{WriteBatch, WriteOp};
use crate::document::{merge_into, Collection, CollectionSnapshot, Document, StoredDocument};
use crate::error::{StoreError, StoreResult};
use crate::feed::{FeedHub, Subscription};
use crate::migrations;
use crate::store::DocumentStore;

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// SQLite store configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = StoreConfig::new("/path/to/tally.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl StoreConfig {
    /// Creates a configuration for the given database file (created if missing).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// An isolated in-memory database (for testing).
    ///
    /// A single connection that never idles out, since each new in-memory
    /// connection would open an empty database.
    pub fn in_memory() -> Self {
        StoreConfig {
            database_path: PathBuf::from(IN_MEMORY),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY
    }
}

// =============================================================================
// SqliteStore
// =============================================================================

/// SQLite-backed document store. Clones share the pool and change feed.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    feeds: Arc<FeedHub>,
}

impl SqliteStore {
    /// Opens the pool and applies migrations.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Enables WAL mode and NORMAL synchronous
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Opening document store"
        );

        let connect_options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(if config.is_in_memory() { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(connect_options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        info!(max_connections = config.max_connections, "Document store pool created");

        let store = SqliteStore {
            pool,
            feeds: Arc::new(FeedHub::default()),
        };

        if config.run_migrations {
            migrations::run_migrations(&store.pool).await?;
        }

        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        info!("Closing document store pool");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn snapshot(&self, collection: Collection) -> StoreResult<CollectionSnapshot> {
        Ok(CollectionSnapshot {
            collection,
            documents: self.list_documents(collection).await?,
        })
    }

    async fn notify(&self, collections: &[Collection]) {
        for &collection in collections {
            if !self.feeds.has_subscribers(collection) {
                continue;
            }
            let event = match self.snapshot(collection).await {
                Ok(snapshot) => Ok(Arc::new(snapshot)),
                Err(e) => {
                    warn!(collection = %collection, error = %e, "Failed to build change feed snapshot");
                    Err(e)
                }
            };
            self.feeds.publish(collection, event);
        }
    }

    /// Runs the ops in one transaction, then notifies subscribers.
    async fn write(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        let touched = WriteBatch::from(ops.clone()).collections();

        let mut tx = self.pool.begin().await?;
        for op in &ops {
            apply(&mut *tx, op).await?;
        }
        tx.commit().await?;

        debug!(ops = ops.len(), "Committed document writes");
        self.notify(&touched).await;
        Ok(())
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

fn decode_body(body: &str) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Serialization("stored body is not a JSON object".to_string())),
    }
}

/// JSON path for a top-level field. Field names are restricted so the path
/// can be inlined into SQL.
fn field_path(field: &str) -> StoreResult<String> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::QueryFailed(format!("invalid field name: {}", field)));
    }
    Ok(format!("$.{}", field))
}

async fn fetch_body(conn: &mut SqliteConnection, collection: Collection, key: &str) -> StoreResult<Option<Document>> {
    let body: Option<String> = sqlx::query_scalar(
        r#"
        SELECT body FROM documents
        WHERE collection = ?1 AND key = ?2
        "#,
    )
    .bind(collection.as_str())
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;

    body.as_deref().map(decode_body).transpose()
}

async fn upsert(conn: &mut SqliteConnection, collection: Collection, key: &str, fields: &Document) -> StoreResult<()> {
    let body = serde_json::to_string(fields)?;
    sqlx::query(
        r#"
        INSERT INTO documents (collection, key, body, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (collection, key)
        DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
        "#,
    )
    .bind(collection.as_str())
    .bind(key)
    .bind(body)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn apply(conn: &mut SqliteConnection, op: &WriteOp) -> StoreResult<()> {
    match op {
        WriteOp::Set {
            collection,
            key,
            fields,
            merge,
        } => {
            let body = if *merge {
                match fetch_body(conn, *collection, key).await? {
                    Some(mut existing) => {
                        merge_into(&mut existing, fields.clone());
                        existing
                    }
                    None => fields.clone(),
                }
            } else {
                fields.clone()
            };
            upsert(conn, *collection, key, &body).await
        }
        WriteOp::Update {
            collection,
            key,
            fields,
        } => {
            let mut existing = fetch_body(conn, *collection, key)
                .await?
                .ok_or_else(|| StoreError::not_found(*collection, key.clone()))?;
            merge_into(&mut existing, fields.clone());
            upsert(conn, *collection, key, &existing).await
        }
        WriteOp::Delete { collection, key } => {
            sqlx::query("DELETE FROM documents WHERE collection = ?1 AND key = ?2")
                .bind(collection.as_str())
                .bind(key)
                .execute(&mut *conn)
                .await?;
            Ok(())
        }
    }
}

fn rows_to_documents(rows: Vec<(String, String)>) -> StoreResult<Vec<StoredDocument>> {
    rows.into_iter()
        .map(|(key, body)| Ok(StoredDocument::new(key, decode_body(&body)?)))
        .collect()
}

// =============================================================================
// DocumentStore
// =============================================================================

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get_document(&self, collection: Collection, key: &str) -> StoreResult<Option<Document>> {
        let mut conn = self.pool.acquire().await?;
        fetch_body(&mut *conn, collection, key).await
    }

    async fn list_documents(&self, collection: Collection) -> StoreResult<Vec<StoredDocument>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT key, body FROM documents
            WHERE collection = ?1
            ORDER BY key
            "#,
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows_to_documents(rows)
    }

    async fn set_document(&self, collection: Collection, key: &str, fields: Document, merge: bool) -> StoreResult<()> {
        self.write(vec![WriteOp::Set {
            collection,
            key: key.to_string(),
            fields,
            merge,
        }])
        .await
    }

    async fn update_document(&self, collection: Collection, key: &str, partial: Document) -> StoreResult<()> {
        self.write(vec![WriteOp::Update {
            collection,
            key: key.to_string(),
            fields: partial,
        }])
        .await
    }

    async fn delete_document(&self, collection: Collection, key: &str) -> StoreResult<()> {
        self.write(vec![WriteOp::Delete {
            collection,
            key: key.to_string(),
        }])
        .await
    }

    async fn add_document(&self, collection: Collection, fields: Document) -> StoreResult<String> {
        let key = Uuid::new_v4().to_string();
        self.write(vec![WriteOp::Set {
            collection,
            key: key.clone(),
            fields,
            merge: false,
        }])
        .await?;
        Ok(key)
    }

    async fn query_eq(&self, collection: Collection, field: &str, value: &Value) -> StoreResult<Vec<StoredDocument>> {
        let sql = format!(
            "SELECT key, body FROM documents \
             WHERE collection = ?1 AND json_extract(body, '{}') = json_extract(?2, '$') \
             ORDER BY key",
            field_path(field)?
        );
        let rows: Vec<(String, String)> = sqlx::query_as(&sql)
            .bind(collection.as_str())
            .bind(serde_json::to_string(value)?)
            .fetch_all(&self.pool)
            .await?;

        rows_to_documents(rows)
    }

    async fn query_contains(&self, collection: Collection, field: &str, value: &Value) -> StoreResult<Vec<StoredDocument>> {
        let sql = format!(
            "SELECT key, body FROM documents \
             WHERE collection = ?1 AND EXISTS ( \
                 SELECT 1 FROM json_each(body, '{}') AS item \
                 WHERE item.value = json_extract(?2, '$') \
             ) \
             ORDER BY key",
            field_path(field)?
        );
        let rows: Vec<(String, String)> = sqlx::query_as(&sql)
            .bind(collection.as_str())
            .bind(serde_json::to_string(value)?)
            .fetch_all(&self.pool)
            .await?;

        rows_to_documents(rows)
    }

    async fn subscribe(&self, collection: Collection) -> StoreResult<Subscription> {
        let receiver = self.feeds.receiver(collection);
        let initial = self.snapshot(collection).await?;
        Ok(Subscription::new(collection, Ok(Arc::new(initial)), receiver))
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.write(batch.into_iter().collect()).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fields;
    use serde_json::json;

    async fn store() -> SqliteStore {
        SqliteStore::connect(StoreConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_store_migrates() {
        let store = store().await;
        assert!(store.health_check().await);
        let (total, applied) = migrations::migration_status(store.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = StoreConfig::new("/tmp/tally-test.db")
            .max_connections(10)
            .min_connections(2)
            .run_migrations(false);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(!config.run_migrations);
        assert!(!config.is_in_memory());
        assert!(StoreConfig::in_memory().is_in_memory());
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let store = store().await;
        store
            .set_document(Collection::Customers, "010", fields([("name", json!("Mona")), ("loyaltyPoints", json!(250))]), false)
            .await
            .unwrap();
        store
            .set_document(Collection::Customers, "010", fields([("tier", json!("Silver"))]), true)
            .await
            .unwrap();
        store
            .update_document(Collection::Customers, "010", fields([("loyaltyPoints", json!(400))]))
            .await
            .unwrap();

        let doc = store.get_document(Collection::Customers, "010").await.unwrap().unwrap();
        assert_eq!(doc["name"], json!("Mona"));
        assert_eq!(doc["tier"], json!("Silver"));
        assert_eq!(doc["loyaltyPoints"], json!(400));

        let err = store
            .update_document(Collection::Customers, "nobody", fields([("tier", json!("Gold"))]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        store.delete_document(Collection::Customers, "010").await.unwrap();
        assert!(store.get_document(Collection::Customers, "010").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queries_use_json_fields() {
        let store = store().await;
        for (contact, price) in [("010", 100), ("011", 50), ("010", 30)] {
            store
                .add_document(Collection::Sales, fields([("whatsappNumber", json!(contact)), ("price", json!(price))]))
                .await
                .unwrap();
        }
        store
            .set_document(Collection::Customers, "010", fields([("tags", json!(["vip", "مستورد"]))]), false)
            .await
            .unwrap();
        store
            .set_document(Collection::Customers, "011", fields([("tags", json!(["vip"]))]), false)
            .await
            .unwrap();

        let sales = store.query_eq(Collection::Sales, "whatsappNumber", &json!("010")).await.unwrap();
        assert_eq!(sales.len(), 2);
        let by_price = store.query_eq(Collection::Sales, "price", &json!(50)).await.unwrap();
        assert_eq!(by_price.len(), 1);

        let imported = store.query_contains(Collection::Customers, "tags", &json!("مستورد")).await.unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].key, "010");

        assert!(store.query_eq(Collection::Sales, "bad'field", &json!(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_batch_rolls_back_on_failure() {
        let store = store().await;
        store
            .set_document(Collection::Sales, "s1", fields([("price", json!(1))]), false)
            .await
            .unwrap();

        let mut batch = store.batch();
        batch
            .delete(Collection::Sales, "s1")
            .update(Collection::Customers, "missing", fields([("tier", json!("Gold"))]));
        assert!(store.commit(batch).await.is_err());
        assert!(store.get_document(Collection::Sales, "s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_subscription_sees_local_writes() {
        let store = store().await;
        let mut sub = store.subscribe(Collection::Sales).await.unwrap();
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        store
            .add_document(Collection::Sales, fields([("price", json!(10))]))
            .await
            .unwrap();
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.collection, Collection::Sales);
    }
}
