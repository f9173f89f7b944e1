//! libSQL backend implementing the async `Database` trait.
//!
//! Supports local file and in-memory databases. Snowflake ids are stored as
//! `INTEGER` columns; SQLite integers are i64, so ids round-trip through a
//! bit cast.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::DatabaseError;
use crate::ids::{RoleId, ThreadId, UserId};
use crate::onboarding::model::{Language, ThreadRecord};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Record store opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Store a u64 snowflake in an i64 column without loss.
fn id_to_sql(id: u64) -> i64 {
    id as i64
}

fn id_from_sql(n: i64) -> u64 {
    n as u64
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn row_to_language(row: &libsql::Row) -> Result<Language, libsql::Error> {
    Ok(Language {
        role_id: RoleId(id_from_sql(row.get::<i64>(0)?)),
        role_name: row.get(1)?,
        emoji_repr: row.get(2)?,
    })
}

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn get_languages(&self) -> Result<Vec<Language>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT role_id, role_name, emoji_repr FROM language_board",
                (),
            )
            .await
            .map_err(query_err)?;

        let mut languages = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            languages.push(row_to_language(&row).map_err(query_err)?);
        }
        Ok(languages)
    }

    async fn add_language(&self, language: &Language) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO language_board (role_id, role_name, emoji_repr) \
                 VALUES (?1, ?2, ?3)",
                params![
                    id_to_sql(language.role_id.0),
                    language.role_name.clone(),
                    language.emoji_repr.clone()
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn remove_language(&self, role_id: RoleId) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM language_board WHERE role_id = ?1",
                params![id_to_sql(role_id.0)],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn language_exists(&self, role_id: RoleId) -> Result<Option<Language>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT role_id, role_name, emoji_repr FROM language_board WHERE role_id = ?1",
                params![id_to_sql(role_id.0)],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_language(&row).map_err(query_err)?)),
            None => Ok(None),
        }
    }

    async fn record_thread(
        &self,
        thread_id: ThreadId,
        applicant_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO thread_manager (thread_id, user_id, created_at) \
                 VALUES (?1, ?2, ?3)",
                params![
                    id_to_sql(thread_id.0),
                    id_to_sql(applicant_id.0),
                    created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_thread(&self, thread_id: ThreadId) -> Result<Option<ThreadRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT thread_id, user_id, created_at FROM thread_manager WHERE thread_id = ?1",
                params![id_to_sql(thread_id.0)],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => {
                let created: String = row.get(2).map_err(query_err)?;
                Ok(Some(ThreadRecord {
                    thread_id: ThreadId(id_from_sql(row.get::<i64>(0).map_err(query_err)?)),
                    applicant_id: UserId(id_from_sql(row.get::<i64>(1).map_err(query_err)?)),
                    created_at: parse_datetime(&created),
                }))
            }
            None => Ok(None),
        }
    }

    async fn forget_thread(&self, thread_id: ThreadId) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM thread_manager WHERE thread_id = ?1",
                params![id_to_sql(thread_id.0)],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}
