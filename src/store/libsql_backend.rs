//! libSQL backend: async `InterviewStore` and `ResearchCache` implementation.
//!
//! Records are stored as JSON payload columns next to a few flat columns
//! used for indexing. Timestamps are written as RFC 3339.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::interview::InterviewSession;
use crate::memory::MemoryProfile;
use crate::research::{ResearchCache, ResearchContext};
use crate::store::migrations;
use crate::store::traits::InterviewStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// First column of the first row as a JSON payload, decoded.
    async fn query_payload<T: serde::de::DeserializeOwned>(
        &self,
        op: &str,
        sql: &str,
        key: String,
    ) -> Result<Option<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let payload: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
                let value = serde_json::from_str(&payload)
                    .map_err(|e| DatabaseError::Serialization(format!("{op}: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
}

fn to_payload<T: serde::Serialize>(op: &str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(format!("{op}: {e}")))
}

#[async_trait]
impl InterviewStore for LibSqlStore {
    async fn load_session(&self, id: Uuid) -> Result<Option<InterviewSession>, DatabaseError> {
        self.query_payload(
            "load_session",
            "SELECT payload FROM interview_sessions WHERE id = ?1",
            id.to_string(),
        )
        .await
    }

    async fn save_session(&self, session: &InterviewSession) -> Result<(), DatabaseError> {
        let payload = to_payload("save_session", session)?;
        self.conn()
            .execute(
                "INSERT INTO interview_sessions
                    (id, user_id, company, role, status, payload, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (id) DO UPDATE SET
                    status = ?5, payload = ?6, updated_at = ?8",
                params![
                    session.id.to_string(),
                    session.user_id.as_str(),
                    session.subject.company.as_str(),
                    session.subject.role.as_str(),
                    session.status.to_string(),
                    payload,
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_session: {e}")))?;
        debug!(session_id = %session.id, status = %session.status, "Session saved");
        Ok(())
    }

    async fn load_profile(&self, user_id: &str) -> Result<Option<MemoryProfile>, DatabaseError> {
        self.query_payload(
            "load_profile",
            "SELECT payload FROM memory_profiles WHERE user_id = ?1",
            user_id.to_string(),
        )
        .await
    }

    async fn save_profile(&self, profile: &MemoryProfile) -> Result<(), DatabaseError> {
        let payload = to_payload("save_profile", profile)?;
        self.conn()
            .execute(
                "INSERT INTO memory_profiles (user_id, payload, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id) DO UPDATE SET payload = ?2, updated_at = ?3",
                params![
                    profile.user_id.as_str(),
                    payload,
                    profile.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_profile: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ResearchCache for LibSqlStore {
    async fn get_research(&self, key: &str) -> Result<Option<ResearchContext>, DatabaseError> {
        self.query_payload(
            "get_research",
            "SELECT payload FROM research_cache WHERE subject_key = ?1",
            key.to_string(),
        )
        .await
    }

    async fn put_research(
        &self,
        key: &str,
        context: &ResearchContext,
    ) -> Result<(), DatabaseError> {
        let payload = to_payload("put_research", context)?;
        self.conn()
            .execute(
                "INSERT INTO research_cache (subject_key, payload, fetched_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (subject_key) DO UPDATE SET payload = ?2, fetched_at = ?3",
                params![key, payload, context.fetched_at.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_research: {e}")))?;
        Ok(())
    }
}
