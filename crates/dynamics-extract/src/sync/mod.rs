//! Per-stream extraction: full-table or windowed incremental.
//!
//! Streams run strictly one after another. For incremental streams the
//! engine keeps a running maximum of the modification timestamp and drops
//! every row that does not advance it. Adjacent windows share a boundary
//! instant, so this is what removes the rows both windows return.
//!
//! The same filter also drops distinct rows that share a timestamp with an
//! already emitted row. That is accepted: the service sorts by the
//! timestamp, so such rows only collide at window boundaries.

pub mod transform;

pub use transform::RecordShaper;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::discover::{
    pick_list_descriptor, pick_list_rows, ReplicationStrategy, StreamDescriptor,
    PICK_LISTS_STREAM,
};
use crate::error::{ExtractError, Result};
use crate::fetch::{TableScan, WindowedFetcher};
use crate::output::RecordSink;
use crate::source::{QueryService, Record};
use crate::state::BookmarkStore;

/// Default number of emitted records between bookmark checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 5000;

/// Lifecycle of one stream within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Pending => "pending",
            StreamStatus::Running => "running",
            StreamStatus::Done => "done",
            StreamStatus::Error => "error",
        }
    }
}

/// Outcome of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub stream: String,
    pub strategy: ReplicationStrategy,
    pub status: StreamStatus,
    pub records_emitted: u64,
    /// Rows dropped because they did not advance the running maximum.
    pub records_skipped: u64,
    /// Bookmark after the stream finished (incremental streams only).
    pub bookmark: Option<DateTime<Utc>>,
}

impl StreamSummary {
    fn pending(descriptor: &StreamDescriptor) -> Self {
        Self {
            stream: descriptor.id.clone(),
            strategy: descriptor.replication_strategy,
            status: StreamStatus::Pending,
            records_emitted: 0,
            records_skipped: 0,
            bookmark: None,
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub streams: Vec<StreamSummary>,
}

impl SyncSummary {
    pub fn get(&self, stream: &str) -> Option<&StreamSummary> {
        self.streams.iter().find(|s| s.stream == stream)
    }

    pub fn total_records(&self) -> u64 {
        self.streams.iter().map(|s| s.records_emitted).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.streams.iter().all(|s| s.status == StreamStatus::Done)
    }
}

/// Run-wide sync settings.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Lower bound for streams without a bookmark.
    pub start_date: DateTime<Utc>,
    pub window_span: Duration,
    pub checkpoint_interval: usize,
    /// Fixed upper bound for incremental reads; the wall clock when unset.
    pub now: Option<DateTime<Utc>>,
    /// Emit the pick list stream after the entity streams.
    pub pick_lists: bool,
}

impl SyncOptions {
    pub fn new(start_date: DateTime<Utc>) -> Self {
        Self {
            start_date,
            window_span: Duration::days(30),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            now: None,
            pick_lists: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            start_date: config.start_date,
            window_span: config.sync.window_span(),
            checkpoint_interval: config.sync.checkpoint_interval,
            now: None,
            pick_lists: config.sync.pick_lists,
        }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_window_span(mut self, span: Duration) -> Self {
        self.window_span = span;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_pick_lists(mut self, enabled: bool) -> Self {
        self.pick_lists = enabled;
        self
    }
}

/// Drives discovered streams through extraction and emission.
pub struct SyncEngine<'a> {
    query: &'a dyn QueryService,
    store: &'a mut BookmarkStore,
    sink: &'a mut dyn RecordSink,
    options: SyncOptions,
    summary: SyncSummary,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        query: &'a dyn QueryService,
        store: &'a mut BookmarkStore,
        sink: &'a mut dyn RecordSink,
        options: SyncOptions,
    ) -> Self {
        Self {
            query,
            store,
            sink,
            options,
            summary: SyncSummary::default(),
        }
    }

    /// Sync every stream in order, then the pick list stream.
    ///
    /// The first failing stream aborts the run; streams after it stay
    /// [`StreamStatus::Pending`] in [`SyncEngine::summary`].
    pub async fn run(&mut self, streams: &[StreamDescriptor]) -> Result<SyncSummary> {
        self.summary = SyncSummary {
            streams: streams.iter().map(StreamSummary::pending).collect(),
        };

        for (index, descriptor) in streams.iter().enumerate() {
            self.summary.streams[index].status = StreamStatus::Running;
            match self.sync_stream(index, descriptor).await {
                Ok(()) => self.summary.streams[index].status = StreamStatus::Done,
                Err(e) => {
                    self.summary.streams[index].status = StreamStatus::Error;
                    error!("{}: sync failed: {}", descriptor.id, e);
                    return Err(e);
                }
            }
        }

        if self.options.pick_lists {
            self.sync_pick_lists(streams)?;
        }

        self.store.mark_currently_syncing(None).await?;
        self.sink.write_state(self.store.state())?;
        self.sink.flush()?;

        info!(
            "Sync complete: {} streams, {} records",
            self.summary.streams.len(),
            self.summary.total_records()
        );
        Ok(self.summary.clone())
    }

    /// Progress so far, including after a failed run.
    pub fn summary(&self) -> &SyncSummary {
        &self.summary
    }

    async fn sync_stream(&mut self, index: usize, descriptor: &StreamDescriptor) -> Result<()> {
        self.store.mark_currently_syncing(Some(descriptor.id.as_str())).await?;
        self.sink.write_state(self.store.state())?;
        self.sink.write_schema(descriptor)?;

        let shaper = RecordShaper::new(descriptor);
        match descriptor.replication_key() {
            Some(field) => self.sync_incremental(index, descriptor, field, &shaper).await?,
            None => self.sync_full_table(index, descriptor, &shaper).await?,
        }

        let summary = &self.summary.streams[index];
        info!(
            "{}: {} records emitted, {} skipped",
            descriptor.id, summary.records_emitted, summary.records_skipped
        );
        Ok(())
    }

    async fn sync_full_table(
        &mut self,
        index: usize,
        descriptor: &StreamDescriptor,
        shaper: &RecordShaper,
    ) -> Result<()> {
        info!("{}: syncing using full replication", descriptor.id);

        let mut scan = TableScan::new(self.query, &descriptor.id);
        while let Some(raw) = scan.next().await? {
            self.sink.write_record(&descriptor.id, shaper.shape(&raw)?)?;
            self.summary.streams[index].records_emitted += 1;
        }
        Ok(())
    }

    async fn sync_incremental(
        &mut self,
        index: usize,
        descriptor: &StreamDescriptor,
        field: &str,
        shaper: &RecordShaper,
    ) -> Result<()> {
        let stream = descriptor.id.as_str();
        let start = self.store.get(stream, self.options.start_date);
        let now = self.options.now.unwrap_or_else(Utc::now);
        info!("{}: syncing data since {}", stream, start);

        // The configured start date is inclusive; a stored bookmark is not.
        let mut max_seen = if self.store.contains(stream) {
            Some(start)
        } else {
            None
        };
        let mut since_checkpoint = 0usize;

        let mut fetcher = WindowedFetcher::new(
            self.query,
            stream,
            field,
            start,
            now,
            self.options.window_span,
        );

        while let Some(raw) = fetcher.next().await? {
            let modified = transform::record_timestamp(&raw, field).ok_or_else(|| {
                ExtractError::invalid_record(stream, format!("missing or malformed {}", field))
            })?;

            if max_seen.is_some_and(|max| modified <= max) {
                self.summary.streams[index].records_skipped += 1;
                continue;
            }
            max_seen = Some(modified);

            self.sink.write_record(stream, shaper.shape(&raw)?)?;
            self.summary.streams[index].records_emitted += 1;
            since_checkpoint += 1;

            if since_checkpoint >= self.options.checkpoint_interval {
                self.checkpoint(stream, modified).await?;
                since_checkpoint = 0;
            }
        }

        let bookmark = max_seen.unwrap_or(start);
        self.checkpoint(stream, bookmark).await?;
        self.summary.streams[index].bookmark = Some(self.store.get(stream, bookmark));

        let stats = fetcher.stats();
        info!(
            "{}: read {} windows ({} pages, {} splits)",
            stream, stats.windows, stats.pages, stats.splits
        );
        Ok(())
    }

    /// Emit the options of every synced stream. Never touches bookmarks.
    fn sync_pick_lists(&mut self, streams: &[StreamDescriptor]) -> Result<()> {
        if streams.iter().any(|s| s.id == PICK_LISTS_STREAM) {
            warn!(
                "A collection is named {}, not emitting pick list items",
                PICK_LISTS_STREAM
            );
            return Ok(());
        }

        let rows = pick_list_rows(streams);
        if rows.is_empty() {
            debug!("No pick list items to emit");
            return Ok(());
        }

        let descriptor = pick_list_descriptor()?;
        let index = self.summary.streams.len();
        self.summary.streams.push(StreamSummary::pending(&descriptor));
        self.summary.streams[index].status = StreamStatus::Running;

        match self.emit_rows(index, &descriptor, rows) {
            Ok(()) => {
                self.summary.streams[index].status = StreamStatus::Done;
                info!(
                    "{}: {} items emitted",
                    PICK_LISTS_STREAM, self.summary.streams[index].records_emitted
                );
                Ok(())
            }
            Err(e) => {
                self.summary.streams[index].status = StreamStatus::Error;
                error!("{}: sync failed: {}", PICK_LISTS_STREAM, e);
                Err(e)
            }
        }
    }

    fn emit_rows(
        &mut self,
        index: usize,
        descriptor: &StreamDescriptor,
        rows: Vec<Record>,
    ) -> Result<()> {
        self.sink.write_schema(descriptor)?;
        for row in rows {
            self.sink.write_record(&descriptor.id, row)?;
            self.summary.streams[index].records_emitted += 1;
        }
        Ok(())
    }

    async fn checkpoint(&mut self, stream: &str, bookmark: DateTime<Utc>) -> Result<()> {
        self.store.set(stream, bookmark).await?;
        self.sink.write_state(self.store.state())
    }
}
