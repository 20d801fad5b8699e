//! In-memory state sink.
//!
//! Keeps every saved snapshot. Runs without a state file use it so that the
//! emitted STATE messages are the only durable record.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{BookmarkState, StateSink};
use crate::error::{ExtractError, Result};

/// State sink that keeps saved snapshots in memory.
#[derive(Default)]
pub struct MemoryStateSink {
    saved: Mutex<Vec<BookmarkState>>,
}

impl MemoryStateSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot saved so far, oldest first.
    pub fn snapshots(&self) -> Vec<BookmarkState> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recently saved snapshot.
    pub fn last(&self) -> Option<BookmarkState> {
        self.saved.lock().ok().and_then(|s| s.last().cloned())
    }

    /// Number of saves.
    pub fn save_count(&self) -> usize {
        self.saved.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl StateSink for MemoryStateSink {
    async fn save(&self, state: &BookmarkState) -> Result<()> {
        self.saved
            .lock()
            .map_err(|_| ExtractError::State("state sink lock poisoned".into()))?
            .push(state.clone());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
