//! Pull-based record retrieval.
//!
//! - [`PageCursor`]: follows the continuation links of one query
//! - [`TableScan`]: unfiltered full-table read
//! - [`WindowedFetcher`]: time-windowed incremental read that bisects any
//!   window whose response exceeds the service's size ceiling
//!
//! All three are lazy: nothing is requested until the caller pulls, and at
//! most one page is buffered at a time.

mod window;

pub use window::Window;

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::error::{ExtractError, Result};
use crate::source::{EntityQuery, QueryService, Record};

/// Narrowest window the fetcher will still try to split.
pub fn min_window_width() -> Duration {
    Duration::milliseconds(1)
}

/// Walks the pages of a single query.
#[derive(Debug, Clone)]
pub struct PageCursor {
    query: EntityQuery,
    next_link: Option<String>,
    exhausted: bool,
}

impl PageCursor {
    pub fn new(query: EntityQuery) -> Self {
        Self {
            query,
            next_link: None,
            exhausted: false,
        }
    }

    pub fn query(&self) -> &EntityQuery {
        &self.query
    }

    /// Whether at least one page has been read.
    pub fn started(&self) -> bool {
        self.exhausted || self.next_link.is_some()
    }

    /// Fetch the next page, or `None` once the last page has been read.
    pub async fn next_page(&mut self, service: &dyn QueryService) -> Result<Option<Vec<Record>>> {
        if self.exhausted {
            return Ok(None);
        }
        let page = service
            .fetch_page(&self.query, self.next_link.as_deref())
            .await?;
        self.exhausted = page.next_link.is_none();
        self.next_link = page.next_link;
        Ok(Some(page.records))
    }
}

/// Full-table read of one collection.
pub struct TableScan<'a> {
    service: &'a dyn QueryService,
    cursor: PageCursor,
    buffer: VecDeque<Record>,
    pages: usize,
}

impl<'a> TableScan<'a> {
    pub fn new(service: &'a dyn QueryService, collection: &str) -> Self {
        Self {
            service,
            cursor: PageCursor::new(EntityQuery::new(collection)),
            buffer: VecDeque::new(),
            pages: 0,
        }
    }

    /// Next row, or `None` when the table is exhausted.
    pub async fn next(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            match self.cursor.next_page(self.service).await? {
                Some(records) => {
                    self.pages += 1;
                    self.buffer.extend(records);
                }
                None => return Ok(None),
            }
        }
    }

    pub fn pages(&self) -> usize {
        self.pages
    }
}

/// Counters for one windowed read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Windows whose first page was requested.
    pub windows: usize,
    /// Pages successfully read.
    pub pages: usize,
    /// Windows bisected after an oversized response.
    pub splits: usize,
}

/// Incremental read of `[start, now)` ordered by a modification timestamp.
///
/// Pending windows form a stack with the earliest window on top, so the
/// split tree is traversed depth first and leaves come out left to right.
/// Rows whose timestamp equals a shared window boundary can be yielded by
/// both neighbouring windows; the consumer is expected to drop them.
pub struct WindowedFetcher<'a> {
    service: &'a dyn QueryService,
    collection: String,
    field: String,
    pending: Vec<Window>,
    active: Option<(Window, PageCursor)>,
    buffer: VecDeque<Record>,
    min_width: Duration,
    stats: FetchStats,
}

impl<'a> WindowedFetcher<'a> {
    /// Plan a read of `collection` from `start` up to `now` in windows of `span`.
    pub fn new(
        service: &'a dyn QueryService,
        collection: &str,
        field: &str,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
        span: Duration,
    ) -> Self {
        let mut pending = Window::partition(start, now, span);
        pending.reverse();
        debug!(
            "{}: {} windows from {} to {}",
            collection,
            pending.len(),
            start,
            now
        );
        Self {
            service,
            collection: collection.to_string(),
            field: field.to_string(),
            pending,
            active: None,
            buffer: VecDeque::new(),
            min_width: min_window_width(),
            stats: FetchStats::default(),
        }
    }

    /// Next row in ascending timestamp order, or `None` when done.
    ///
    /// Any error other than an oversized response ends the read: later
    /// calls return `None` without issuing queries.
    pub async fn next(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }

            let (window, mut cursor) = match self.active.take() {
                Some(active) => active,
                None => match self.pending.pop() {
                    Some(window) => (window, PageCursor::new(self.window_query(&window))),
                    None => return Ok(None),
                },
            };

            if !cursor.started() {
                self.stats.windows += 1;
                debug!("{}: querying {}", self.collection, window);
            }

            match cursor.next_page(self.service).await {
                Ok(Some(records)) => {
                    self.stats.pages += 1;
                    self.buffer.extend(records);
                    self.active = Some((window, cursor));
                }
                Ok(None) => {}
                Err(e) if e.is_oversized() => self.split(window)?,
                Err(e) => {
                    self.abort();
                    return Err(e);
                }
            }
        }
    }

    fn split(&mut self, window: Window) -> Result<()> {
        if window.width() < self.min_width {
            self.abort();
            return Err(ExtractError::WindowTooSmall {
                start: window.start,
                end: window.end,
            });
        }

        let (left, right) = window.bisect();
        warn!(
            "{}: response for {} too large, splitting at {}",
            self.collection, window, left.end
        );
        self.stats.splits += 1;
        self.pending.push(right);
        self.pending.push(left);
        Ok(())
    }

    fn abort(&mut self) {
        self.pending.clear();
        self.active = None;
        self.buffer.clear();
    }

    fn window_query(&self, window: &Window) -> EntityQuery {
        EntityQuery::new(self.collection.as_str())
            .filter_ge(&self.field, window.start)
            .filter_le(&self.field, window.end)
            .order_by_asc(&self.field)
    }

    /// Windows not yet started, earliest first.
    pub fn pending_windows(&self) -> Vec<Window> {
        self.pending.iter().rev().copied().collect()
    }

    pub fn stats(&self) -> FetchStats {
        self.stats
    }
}
