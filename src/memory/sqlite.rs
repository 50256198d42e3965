use async_trait::async_trait;
use chrono::Utc;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{MemoryStore, MemoryUpdate, RunRecord, RunRecorder, UserMemory};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed memory store keyed by user id
#[derive(Clone)]
pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

impl SqliteMemoryStore {
    /// Open (creating if needed) the database and run migrations
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// In-memory database on a single connection, for tests
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    async fn fetch(conn: &mut SqliteConnection, user_id: &str) -> StorageResult<UserMemory> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM user_memory WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some((data,)) => Ok(serde_json::from_str(&data)?),
            None => Ok(UserMemory::default()),
        }
    }

    async fn upsert(
        conn: &mut SqliteConnection,
        user_id: &str,
        memory: &UserMemory,
    ) -> StorageResult<()> {
        let data = serde_json::to_string(memory)?;
        sqlx::query(
            r#"
            INSERT INTO user_memory (user_id, data, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(data)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Most recent runs for a user, newest first
    pub async fn recent_runs(&self, user_id: &str, limit: i64) -> StorageResult<Vec<RunRecord>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, query, intent, playlist, explanation, degraded_stages,
                   error, latency_ms, created_at
            FROM pipeline_runs
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn load(&self, user_id: &str) -> StorageResult<UserMemory> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, user_id).await
    }

    async fn save(&self, user_id: &str, memory: &UserMemory) -> StorageResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert(&mut conn, user_id, memory).await
    }

    async fn update(&self, user_id: &str, apply: MemoryUpdate) -> StorageResult<UserMemory> {
        let mut conn = self.pool.acquire().await?;

        // IMMEDIATE takes the write lock up front so concurrent updates queue
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        // COMMIT sits inside the fallible block so a failed commit also rolls back
        let result = async {
            let mut memory = Self::fetch(&mut conn, user_id).await?;
            apply(&mut memory);
            Self::upsert(&mut conn, user_id, &memory).await?;
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok::<_, StorageError>(memory)
        }
        .await;

        match result {
            Ok(memory) => {
                debug!(user_id = %user_id, "User memory updated");
                Ok(memory)
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl RunRecorder for SqliteMemoryStore {
    async fn record_run(&self, run: &RunRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (id, user_id, query, intent, playlist, explanation,
                                       degraded_stages, error, latency_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.user_id)
        .bind(&run.query)
        .bind(&run.intent)
        .bind(serde_json::to_string(&run.playlist)?)
        .bind(&run.explanation)
        .bind(serde_json::to_string(&run.degraded_stages)?)
        .bind(&run.error)
        .bind(run.latency_ms)
        .bind(run.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// Internal row type for SQLx mapping
#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    user_id: String,
    query: String,
    intent: String,
    playlist: String,
    explanation: Option<String>,
    degraded_stages: String,
    error: Option<String>,
    latency_ms: i64,
    created_at: String,
}

impl From<RunRow> for RunRecord {
    fn from(row: RunRow) -> Self {
        use chrono::DateTime;

        Self {
            id: row.id,
            user_id: row.user_id,
            query: row.query,
            intent: row.intent,
            playlist: serde_json::from_str(&row.playlist).unwrap_or_default(),
            explanation: row.explanation,
            degraded_stages: serde_json::from_str(&row.degraded_stages).unwrap_or_default(),
            error: row.error,
            latency_ms: row.latency_ms,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}
