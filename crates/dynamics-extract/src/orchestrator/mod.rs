//! Extraction orchestrator - wires configuration, services and state into a run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{Authenticator, OAuthAuthenticator};
use crate::client::ODataClient;
use crate::config::Config;
use crate::discover::{Catalog, OptionSetCache, SchemaDiscoverer, StreamDescriptor};
use crate::error::Result;
use crate::output::RecordSink;
use crate::source::{EntityMetadataService, QueryService};
use crate::state::{BookmarkState, BookmarkStore, FileStateSink, MemoryStateSink, StateSink};
use crate::sync::{StreamStatus, SyncEngine, SyncOptions, SyncSummary};

/// Extraction orchestrator.
pub struct Extractor {
    config: Config,
    metadata: Arc<dyn EntityMetadataService>,
    query: Arc<dyn QueryService>,
    state_file: Option<PathBuf>,
    state: BookmarkState,
}

/// Result of a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Streams selected for the run.
    pub streams_total: usize,

    /// Streams that ran to completion.
    pub streams_done: usize,

    /// Records written to the output.
    pub records_emitted: u64,

    /// Boundary-overlap rows dropped.
    pub records_skipped: u64,

    /// Average throughput (records/second).
    pub records_per_second: i64,
}

impl ExtractionResult {
    fn from_summary(
        summary: &SyncSummary,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let records_emitted = summary.total_records();
        let records_per_second = if duration > 0.0 {
            (records_emitted as f64 / duration) as i64
        } else {
            0
        };

        Self {
            status: if summary.is_complete() {
                "completed".to_string()
            } else {
                "failed".to_string()
            },
            duration_seconds: duration,
            started_at,
            completed_at,
            streams_total: summary.streams.len(),
            streams_done: summary
                .streams
                .iter()
                .filter(|s| s.status == StreamStatus::Done)
                .count(),
            records_emitted,
            records_skipped: summary.streams.iter().map(|s| s.records_skipped).sum(),
            records_per_second,
        }
    }

    /// Serialize for logging or a result file.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Extractor {
    /// Create an extractor talking to the configured organization.
    ///
    /// The access token is acquired here so that invalid credentials fail
    /// the run before any stream starts.
    pub async fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.sync.request_timeout_secs))
            .build()?;

        let auth = Arc::new(OAuthAuthenticator::new(http.clone(), &config));
        auth.bearer_token().await?;

        let client = Arc::new(ODataClient::from_config(http, auth, &config));
        info!("Connected to {}", client.service_url());

        Ok(Self::with_services(config, client.clone(), client))
    }

    /// Create an extractor over already constructed services.
    pub fn with_services(
        config: Config,
        metadata: Arc<dyn EntityMetadataService>,
        query: Arc<dyn QueryService>,
    ) -> Self {
        Self {
            config,
            metadata,
            query,
            state_file: None,
            state: BookmarkState::default(),
        }
    }

    /// Persist bookmarks to this file after every mutation.
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    /// Load existing bookmarks from the state file, if it exists.
    pub fn resume(mut self) -> Result<Self> {
        if let Some(ref path) = self.state_file {
            self.state = BookmarkState::load_or_default(path)?;
            info!(
                "Resuming from state file {:?} ({} bookmarks)",
                path,
                self.state.bookmarks.len()
            );
        }
        Ok(self)
    }

    /// Bookmark state as of the last completed or failed run.
    pub fn state(&self) -> &BookmarkState {
        &self.state
    }

    /// Discover all selected streams.
    ///
    /// Every call uses a fresh pick list cache.
    pub async fn discover(&self) -> Result<Catalog> {
        let filter = self.config.sync.stream_filter()?;
        let mut option_sets = OptionSetCache::new();
        let mut discoverer = SchemaDiscoverer::new(self.metadata.as_ref(), &mut option_sets);
        discoverer.discover(|name| filter.is_selected(name)).await
    }

    /// Discover, then sync every selected stream into `sink`.
    pub async fn sync(&mut self, sink: &mut dyn RecordSink) -> Result<ExtractionResult> {
        let started_at = Utc::now();

        info!("Phase 1: Discovering streams");
        let catalog = self.discover().await?;
        let streams = resume_order(catalog.streams, self.state.currently_syncing.as_deref());

        let state_sink: Arc<dyn StateSink> = match &self.state_file {
            Some(path) => Arc::new(FileStateSink::new(path.clone())),
            None => Arc::new(MemoryStateSink::new()),
        };
        let mut store = BookmarkStore::new(self.state.clone(), state_sink);
        info!(
            "Phase 2: Syncing {} streams ({} state)",
            streams.len(),
            store.backend_type()
        );

        let options = SyncOptions::from_config(&self.config);
        let mut engine = SyncEngine::new(self.query.as_ref(), &mut store, sink, options);
        let outcome = engine.run(&streams).await;
        let summary = engine.summary().clone();
        drop(engine);
        self.state = store.state().clone();

        for stream in &summary.streams {
            info!(
                "{}: {} ({} records)",
                stream.stream,
                stream.status.as_str(),
                stream.records_emitted
            );
        }

        let result = ExtractionResult::from_summary(&summary, started_at, Utc::now());
        info!(
            "Sync {}: {}/{} streams, {} records in {:.1}s ({} records/s)",
            result.status,
            result.streams_done,
            result.streams_total,
            result.records_emitted,
            result.duration_seconds,
            result.records_per_second
        );

        outcome?;
        Ok(result)
    }
}

/// Put an interrupted stream first, keeping the cyclic order of the rest.
fn resume_order(
    mut streams: Vec<StreamDescriptor>,
    interrupted: Option<&str>,
) -> Vec<StreamDescriptor> {
    let Some(name) = interrupted else {
        return streams;
    };
    match streams.iter().position(|s| s.id == name) {
        Some(index) => {
            info!("Resuming at interrupted stream {}", name);
            streams.rotate_left(index);
        }
        None => warn!("Interrupted stream {} is no longer selected", name),
    }
    streams
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::build_descriptor;
    use crate::discover::OptionSetMap;
    use crate::source::RemoteProperty;

    fn stream(id: &str) -> StreamDescriptor {
        build_descriptor(
            id,
            &[RemoteProperty::new("id", "Edm.Guid", true)],
            Arc::new(OptionSetMap::new()),
        )
        .unwrap()
    }

    fn ids(streams: &[StreamDescriptor]) -> Vec<&str> {
        streams.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_resume_order_rotates_to_interrupted() {
        let streams = vec![stream("accounts"), stream("contacts"), stream("leads")];
        let ordered = resume_order(streams, Some("contacts"));
        assert_eq!(ids(&ordered), vec!["contacts", "leads", "accounts"]);
    }

    #[test]
    fn test_resume_order_without_marker() {
        let streams = vec![stream("accounts"), stream("contacts")];
        assert_eq!(ids(&resume_order(streams.clone(), None)), vec!["accounts", "contacts"]);
        assert_eq!(
            ids(&resume_order(streams, Some("opportunities"))),
            vec!["accounts", "contacts"]
        );
    }
}
