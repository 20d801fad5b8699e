//! State sink trait for bookmark persistence.
//!
//! The [`StateSink`] trait defines where [`BookmarkState`] is made durable.
//! The [`BookmarkStore`](super::BookmarkStore) calls it after every mutation.
//!
//! - **File**: [`FileStateSink`], atomic JSON writes
//! - **Memory**: [`MemoryStateSink`](super::MemoryStateSink), for tests and
//!   runs that rely on emitted STATE messages only

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::BookmarkState;
use crate::error::{ExtractError, Result};

/// Durable key-value persistence for bookmark state.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow sharing across async tasks.
#[async_trait]
pub trait StateSink: Send + Sync {
    /// Persist the complete bookmark state.
    async fn save(&self, state: &BookmarkState) -> Result<()>;

    /// Get the backend type name for logging/debugging.
    fn backend_type(&self) -> &'static str;
}

/// JSON file sink.
pub struct FileStateSink {
    path: PathBuf,
}

impl FileStateSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateSink for FileStateSink {
    /// Atomic write: write to temp file, then rename.
    async fn save(&self, state: &BookmarkState) -> Result<()> {
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| ExtractError::State(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_sink_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let sink = FileStateSink::new(&path);

        let mut state = BookmarkState::default();
        state.bookmarks.insert(
            "accounts".into(),
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(),
        );
        state.currently_syncing = Some("contacts".into());
        sink.save(&state).await.unwrap();

        let loaded = BookmarkState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_file_sink_writes_pretty_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let sink = FileStateSink::new(&path);

        let mut state = BookmarkState::default();
        state.bookmarks.insert(
            "accounts".into(),
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(),
        );
        sink.save(&state).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains('\n'));
        assert!(content.contains("\"bookmarks\""));
        assert!(content.contains("\"2023-06-01T00:00:00Z\""));
    }

    #[test]
    fn test_backend_type() {
        assert_eq!(FileStateSink::new("state.json").backend_type(), "file");
    }
}
