//! # Report Rendering
//!
//! Pure presentation of a [`Summary`](crate::projector::Summary) and its
//! source document:
//!
//! - `blocks` - chat message blocks (scan report, test message, JSON export,
//!   AI analysis)
//! - `html` - standalone scan report page
//! - `analysis` - standalone AI analysis page
//!
//! Rendering never fails on missing data. The only non-deterministic input
//! is the wall clock, which is injected through [`Clock`].

pub mod analysis;
pub mod blocks;
pub mod html;

use chrono::{DateTime, Utc};

/// Timestamp format shown in reports and message footers
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Timestamp format safe for file names
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Source of the current time
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// `now()` rendered with [`TIMESTAMP_FORMAT`]
    fn timestamp(&self) -> String {
        self.now().format(TIMESTAMP_FORMAT).to_string()
    }

    /// `now()` rendered with [`FILE_TIMESTAMP_FORMAT`]
    fn file_timestamp(&self) -> String {
        self.now().format(FILE_TIMESTAMP_FORMAT).to_string()
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Escape text for inclusion in HTML element content or attributes
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Indicator for a control pass rate: all passed, mostly passed, or not
pub fn pass_rate_emoji(rate: f64) -> &'static str {
    if rate >= 100.0 {
        "✅"
    } else if rate >= 80.0 {
        "⚠️"
    } else {
        "❌"
    }
}
