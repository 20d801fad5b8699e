//! Time windows over the modification-timestamp ordering.

use std::fmt;

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Inclusive time range `[start, end]` queried as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn width(&self) -> Duration {
        self.end - self.start
    }

    /// `start + (end - start) / 2`.
    pub fn midpoint(&self) -> DateTime<Utc> {
        self.start + self.width() / 2
    }

    /// Split at the midpoint into `[start, mid]` and `[mid, end]`.
    pub fn bisect(&self) -> (Window, Window) {
        let mid = self.midpoint();
        (Window::new(self.start, mid), Window::new(mid, self.end))
    }

    /// Cut `[start, now)` into consecutive windows of at most `span`.
    ///
    /// Adjacent windows share their boundary instant. The last window ends
    /// at `now`. Returns no windows when `start` is not before `now`.
    pub fn partition(start: DateTime<Utc>, now: DateTime<Utc>, span: Duration) -> Vec<Window> {
        let mut windows = Vec::new();
        if span <= Duration::zero() {
            if start < now {
                windows.push(Window::new(start, now));
            }
            return windows;
        }

        let mut from = start;
        while from < now {
            // Past chrono's representable range the window simply ends at now.
            let to = from
                .checked_add_signed(span)
                .map_or(now, |end| end.min(now));
            windows.push(Window::new(from, to));
            from = to;
        }
        windows
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            self.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.end.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}
