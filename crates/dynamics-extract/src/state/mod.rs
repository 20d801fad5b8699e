//! Bookmark state for resumable incremental extraction.
//!
//! [`BookmarkState`] is the persisted document; [`BookmarkStore`] owns it for
//! the duration of a run and saves it through a [`StateSink`] on every
//! mutation.

mod backend;
mod memory;

pub use backend::{FileStateSink, StateSink};
pub use memory::MemoryStateSink;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Per-stream high-water marks plus the stream that was in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkState {
    /// Last confirmed modification timestamp per stream.
    #[serde(default)]
    pub bookmarks: BTreeMap<String, DateTime<Utc>>,

    /// Stream being synced when this state was written.
    #[serde(default)]
    pub currently_syncing: Option<String>,
}

impl BookmarkState {
    /// Load state from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load state from a JSON file, or start empty if it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// In-memory bookkeeping of bookmarks, persisted on every mutation.
pub struct BookmarkStore {
    state: BookmarkState,
    sink: Arc<dyn StateSink>,
}

impl BookmarkStore {
    /// Wrap previously loaded state.
    pub fn new(state: BookmarkState, sink: Arc<dyn StateSink>) -> Self {
        if let Some(stream) = &state.currently_syncing {
            warn!("Previous run was interrupted while syncing {}", stream);
        }
        Self { state, sink }
    }

    /// Bookmark of `stream`, or `default` if it has none.
    pub fn get(&self, stream: &str, default: DateTime<Utc>) -> DateTime<Utc> {
        self.state.bookmarks.get(stream).copied().unwrap_or(default)
    }

    /// Whether `stream` has a bookmark.
    pub fn contains(&self, stream: &str) -> bool {
        self.state.bookmarks.contains_key(stream)
    }

    /// Advance the bookmark of `stream` and persist.
    ///
    /// Bookmarks never move backwards: a value older than the stored one
    /// leaves the stored value in place.
    pub async fn set(&mut self, stream: &str, value: DateTime<Utc>) -> Result<()> {
        match self.state.bookmarks.get(stream) {
            Some(current) if *current > value => {
                warn!(
                    "{}: ignoring bookmark {} older than stored {}",
                    stream, value, current
                );
            }
            _ => {
                debug!("{}: bookmark -> {}", stream, value);
                self.state.bookmarks.insert(stream.to_string(), value);
            }
        }
        self.sink.save(&self.state).await
    }

    /// Record the stream currently being synced (or none) and persist.
    pub async fn mark_currently_syncing(&mut self, stream: Option<&str>) -> Result<()> {
        self.state.currently_syncing = stream.map(str::to_string);
        self.sink.save(&self.state).await
    }

    /// Stream marked as in flight.
    pub fn currently_syncing(&self) -> Option<&str> {
        self.state.currently_syncing.as_deref()
    }

    /// Current state document.
    pub fn state(&self) -> &BookmarkState {
        &self.state
    }

    /// Where saves go, for logging.
    pub fn backend_type(&self) -> &'static str {
        self.sink.backend_type()
    }
}
