//! SQLite-backed record store
//!
//! Features:
//! - WAL mode for better concurrency
//! - Artifact records keyed by (repository_id, path)
//! - Repository definitions persisted as JSON documents
//! - Auto-recovery on corruption

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;

use quarry_core::{Artifact, Repository};

use crate::error::{PipelineError, Result};
use crate::store::ArtifactStore;

/// SQLite store for artifact records and repository definitions
pub struct SqliteArtifactStore {
    conn: Mutex<Connection>,
}

impl SqliteArtifactStore {
    /// Open or create the store at a specific path
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::RecordStore {
                message: e.to_string(),
            })?;
        }

        let result = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        );

        let conn = match result {
            Ok(conn) => conn,
            Err(e) => {
                // If corrupted, delete and recreate
                tracing::warn!("Record store corrupted, recreating: {}", e);
                if path.exists() {
                    std::fs::remove_file(path).map_err(|e| PipelineError::RecordStore {
                        message: e.to_string(),
                    })?;
                }
                Connection::open(path)?
            }
        };

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            -- Artifact records, one per stored object
            CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                repository_id TEXT NOT NULL,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                format TEXT NOT NULL,
                size INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                content_type TEXT,
                metadata TEXT,
                properties TEXT,
                download_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(repository_id, path)
            );

            -- Repository definitions as JSON documents
            CREATE TABLE IF NOT EXISTS repositories (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                definition TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_artifacts_repo ON artifacts(repository_id);
            CREATE INDEX IF NOT EXISTS idx_artifacts_repo_path ON artifacts(repository_id, path);
            "#,
        )?;
        Ok(())
    }

    /// Persist a repository definition
    pub fn save_repository(&self, repo: &Repository) -> Result<()> {
        let definition = serde_json::to_string(repo)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO repositories (id, name, definition, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                definition = excluded.definition,
                updated_at = excluded.updated_at
            "#,
            params![repo.id, repo.name, definition, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Remove a persisted repository definition
    pub fn delete_repository(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM repositories WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Load every persisted repository definition
    pub fn load_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT definition FROM repositories ORDER BY name")?;
        let repos = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|definition| serde_json::from_str(&definition).map_err(Into::into))
            .collect::<Result<Vec<Repository>>>()?;
        Ok(repos)
    }
}

fn row_to_artifact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Artifact> {
    let metadata: Option<String> = row.get(9)?;
    let properties: Option<String> = row.get(10)?;
    let created_at: i64 = row.get(12)?;
    let updated_at: i64 = row.get(13)?;

    Ok(Artifact {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        path: row.get(2)?,
        name: row.get(3)?,
        version: row.get(4)?,
        format: row.get(5)?,
        size: row.get::<_, i64>(6)? as u64,
        checksum: row.get(7)?,
        content_type: row.get(8)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        properties: properties
            .and_then(|p| serde_json::from_str(&p).ok())
            .unwrap_or_default(),
        download_count: row.get::<_, i64>(11)? as u64,
        created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
        updated_at: DateTime::from_timestamp(updated_at, 0).unwrap_or_default(),
    })
}

const ARTIFACT_COLUMNS: &str = "id, repository_id, path, name, version, format, size, checksum, \
                                content_type, metadata, properties, download_count, created_at, updated_at";

#[async_trait]
impl ArtifactStore for SqliteArtifactStore {
    async fn save(&self, artifact: &Artifact) -> Result<()> {
        let metadata = artifact
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let properties = serde_json::to_string(&artifact.properties)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO artifacts (id, repository_id, path, name, version, format, size,
                                   checksum, content_type, metadata, properties,
                                   download_count, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(repository_id, path) DO UPDATE SET
                id = excluded.id,
                name = excluded.name,
                version = excluded.version,
                format = excluded.format,
                size = excluded.size,
                checksum = excluded.checksum,
                content_type = excluded.content_type,
                metadata = excluded.metadata,
                properties = excluded.properties,
                download_count = excluded.download_count,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
            params![
                artifact.id,
                artifact.repository_id,
                artifact.path,
                artifact.name,
                artifact.version,
                artifact.format,
                artifact.size as i64,
                artifact.checksum,
                artifact.content_type,
                metadata,
                properties,
                artifact.download_count as i64,
                artifact.created_at.timestamp(),
                artifact.updated_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    async fn find(&self, repository_id: &str, path: &str) -> Result<Option<Artifact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE repository_id = ?1 AND path = ?2"
        ))?;
        let artifact = stmt
            .query_row(params![repository_id, path], row_to_artifact)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(artifact)
    }

    async fn delete(&self, repository_id: &str, path: &str) -> Result<Option<Artifact>> {
        let existing = self.find(repository_id, path).await?;
        if existing.is_some() {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "DELETE FROM artifacts WHERE repository_id = ?1 AND path = ?2",
                params![repository_id, path],
            )?;
        }
        Ok(existing)
    }

    async fn list(&self, repository_id: &str) -> Result<Vec<Artifact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE repository_id = ?1 ORDER BY path"
        ))?;
        let artifacts = stmt
            .query_map([repository_id], row_to_artifact)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(artifacts)
    }

    async fn delete_all(&self, repository_id: &str) -> Result<Vec<Artifact>> {
        let artifacts = self.list(repository_id).await?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM artifacts WHERE repository_id = ?1",
            [repository_id],
        )?;
        Ok(artifacts)
    }

    async fn increment_download_count(&self, repository_id: &str, path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE artifacts SET download_count = download_count + 1
            WHERE repository_id = ?1 AND path = ?2
            "#,
            params![repository_id, path],
        )?;
        Ok(())
    }
}
