//! Version-tracked database migrations for the libSQL backend.
//!
//! Steps are numbered; the highest applied number lives in `schema_versions`
//! and only later steps run on startup.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS interview_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                company TEXT NOT NULL,
                role TEXT NOT NULL,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_interview_sessions_user ON interview_sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_interview_sessions_status ON interview_sessions(status);

            CREATE TABLE IF NOT EXISTS memory_profiles (
                user_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "research_cache",
        sql: r#"
            CREATE TABLE IF NOT EXISTS research_cache (
                subject_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            );
        "#,
    },
];

const VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_versions (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

fn migration_error(what: &str) -> impl FnOnce(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Migration(format!("{what}: {e}"))
}

/// Bring the schema up to the latest version.
///
/// A step's DDL and its `schema_versions` row commit together, so an
/// interrupted upgrade resumes at the failed step.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(VERSION_TABLE, ())
        .await
        .map_err(migration_error("creating schema_versions"))?;

    let applied = applied_version(conn).await?;
    for step in MIGRATIONS.iter().filter(|m| m.version > applied) {
        tracing::info!(version = step.version, name = step.name, "Migrating interview database");
        let label = format!("migration {} ({})", step.version, step.name);

        let tx = conn.transaction().await.map_err(migration_error(&label))?;
        tx.execute_batch(step.sql)
            .await
            .map_err(migration_error(&label))?;
        tx.execute(
            "INSERT INTO schema_versions (version, name) VALUES (?1, ?2)",
            libsql::params![step.version, step.name],
        )
        .await
        .map_err(migration_error(&label))?;
        tx.commit().await.map_err(migration_error(&label))?;
    }
    Ok(())
}

/// Latest recorded version; 0 on a fresh database.
async fn applied_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_versions", ())
        .await
        .map_err(migration_error("reading schema version"))?;
    match rows.next().await.map_err(migration_error("reading schema version"))? {
        Some(row) => row.get(0).map_err(migration_error("decoding schema version")),
        None => Ok(0),
    }
}
