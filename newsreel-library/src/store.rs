//! Story records and media blobs
//!
//! Alignment is persisted in row form and normalized again on every read, so
//! records written by older clients in either shape come back columnar or
//! not at all.

use newsreel_analysis::{denormalize, normalize, NormalizedAlignment};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
}

/// Progress of a story's media generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Unknown values read as `Pending`
    pub fn parse(value: &str) -> Self {
        match value {
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A story's persisted media state
#[derive(Debug, Clone, PartialEq)]
pub struct StoryRecord {
    pub id: String,
    pub audio_url: Option<String>,
    pub alignment: Option<NormalizedAlignment>,
    pub status: GenerationStatus,
    pub error: Option<String>,
    pub updated_at: u64,
}

/// Partial update; `None` fields are left untouched.
///
/// `alignment` and `error` can also be cleared: `Some(None)` writes NULL.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub audio_url: Option<String>,
    pub alignment: Option<Option<NormalizedAlignment>>,
    pub status: Option<GenerationStatus>,
    pub error: Option<Option<String>>,
}

impl RecordUpdate {
    pub fn status(status: GenerationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

pub trait MediaStore: Send + Sync {
    /// Store a blob and return its public URL
    fn upload(&self, bytes: &[u8], path: &str, content_type: &str) -> Result<String, StoreError>;

    /// Create or patch a record
    fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), StoreError>;

    fn get_record(&self, id: &str) -> Result<Option<StoryRecord>, StoreError>;
}

/// SQLite records plus a blob directory on disk
pub struct LocalMediaStore {
    conn: Mutex<Connection>,
    blob_dir: PathBuf,
    public_base_url: Option<String>,
}

impl LocalMediaStore {
    const SCHEMA: &'static str = r#"
        CREATE TABLE IF NOT EXISTS stories (
            id TEXT PRIMARY KEY,
            audio_url TEXT,
            alignment TEXT,
            status TEXT NOT NULL,
            error TEXT,
            updated_at INTEGER NOT NULL
        );
    "#;

    /// Open or create the store; blobs are served from `public_base_url`
    /// when given, otherwise as `file://` URLs
    pub fn open(
        db_path: &Path,
        blob_dir: &Path,
        public_base_url: Option<String>,
    ) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn, blob_dir, public_base_url)
    }

    #[cfg(test)]
    pub fn in_memory(blob_dir: &Path) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, blob_dir, None)
    }

    fn with_connection(
        conn: Connection,
        blob_dir: &Path,
        public_base_url: Option<String>,
    ) -> Result<Self, StoreError> {
        conn.execute_batch(Self::SCHEMA)?;
        std::fs::create_dir_all(blob_dir)?;
        Ok(Self {
            conn: Mutex::new(conn),
            blob_dir: blob_dir.to_path_buf(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    /// Resolve a relative storage path inside the blob directory
    fn blob_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.blob_dir.join(relative))
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl MediaStore for LocalMediaStore {
    fn upload(&self, bytes: &[u8], path: &str, content_type: &str) -> Result<String, StoreError> {
        let target = self.blob_path(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, bytes)?;
        tracing::debug!(path, content_type, bytes = bytes.len(), "Stored blob");

        Ok(match &self.public_base_url {
            Some(base) => format!("{base}/{path}"),
            None => format!("file://{}", target.display()),
        })
    }

    fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), StoreError> {
        let alignment = match update.alignment.as_ref().map(|a| denormalize(a.as_ref())) {
            Some(Some(rows)) => Some(serde_json::to_string(&rows)?),
            _ => None,
        };
        let error = update.error.clone().flatten();
        let now = now_secs();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO stories (id, status, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO NOTHING",
            params![id, GenerationStatus::Pending.as_str(), now],
        )?;
        conn.execute(
            "UPDATE stories SET
                 audio_url = COALESCE(?2, audio_url),
                 alignment = CASE WHEN ?3 THEN ?4 ELSE alignment END,
                 status = COALESCE(?5, status),
                 error = CASE WHEN ?6 THEN ?7 ELSE error END,
                 updated_at = ?8
             WHERE id = ?1",
            params![
                id,
                update.audio_url,
                update.alignment.is_some(),
                alignment,
                update.status.map(|s| s.as_str()),
                update.error.is_some(),
                error,
                now,
            ],
        )?;
        Ok(())
    }

    fn get_record(&self, id: &str) -> Result<Option<StoryRecord>, StoreError> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT id, audio_url, alignment, status, error, updated_at
                 FROM stories WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, u64>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, audio_url, alignment, status, error, updated_at)) = row else {
            return Ok(None);
        };

        let alignment = alignment.and_then(|text| match serde_json::from_str(&text) {
            Ok(value) => normalize(Some(&value)),
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Stored alignment is not valid JSON");
                None
            }
        });

        Ok(Some(StoryRecord {
            id,
            audio_url,
            alignment,
            status: GenerationStatus::parse(&status),
            error,
            updated_at,
        }))
    }
}
