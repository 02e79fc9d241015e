use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{error::RangeError, Time};

const AGO: &str = "ago";
/// How far [`Chunks::widen`] may stretch a window, in multiples of the base span.
pub const MAX_GROWTH: u64 = 1024;

/// A begin/end expression as typed by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeExpr {
    Now,
    /// `4h ago`, `2days ago`
    Ago(Duration),
    At(SystemTime),
}
impl TimeExpr {
    pub fn parse(expr: &str) -> Result<Self, RangeError> {
        let invalid = || RangeError::InvalidExpression(expr.to_owned());
        let trimmed = expr.trim();
        if trimmed.eq_ignore_ascii_case("now") {
            return Ok(Self::Now);
        }
        if let Some(span) = trimmed.strip_suffix(AGO) {
            let span = humantime::parse_duration(span.trim()).map_err(|_| invalid())?;
            return Ok(Self::Ago(span));
        }
        if let Ok(secs) = trimmed.parse::<u64>() {
            return Ok(Self::At(UNIX_EPOCH + Duration::from_secs(secs)));
        }
        humantime::parse_rfc3339_weak(trimmed)
            .map(Self::At)
            .map_err(|_| invalid())
    }

    pub fn resolve(&self, now: SystemTime) -> SystemTime {
        match *self {
            Self::Now => now,
            Self::Ago(span) => now
                .checked_sub(span)
                .filter(|time| *time >= UNIX_EPOCH)
                .unwrap_or(UNIX_EPOCH),
            Self::At(time) => time,
        }
    }
}
impl core::str::FromStr for TimeExpr {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Inclusive window of unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    begin: Time,
    end: Time,
}
impl TimeRange {
    pub fn new(begin: Time, end: Time) -> Result<Self, RangeError> {
        if begin > end {
            return Err(RangeError::Inverted { begin, end });
        }
        Ok(Self { begin, end })
    }
    /// Smallest window holding both instants.
    pub fn spanning(a: Time, b: Time) -> Self {
        Self {
            begin: a.min(b),
            end: a.max(b),
        }
    }
    /// Both ends are resolved against the same reference instant.
    pub fn resolve(begin: &TimeExpr, end: &TimeExpr, now: SystemTime) -> Result<Self, RangeError> {
        Self::new(epoch_secs(begin.resolve(now)), epoch_secs(end.resolve(now)))
    }

    pub fn begin(&self) -> Time {
        self.begin
    }
    pub fn end(&self) -> Time {
        self.end
    }
    pub fn contains(&self, time: Time) -> bool {
        self.begin <= time && time <= self.end
    }
    pub fn chunks(&self, span: Duration) -> Chunks {
        let base = span.as_secs().max(1);
        Chunks {
            next: Some(self.begin),
            end: self.end,
            base,
            span: base,
        }
    }
}
impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            format_epoch(&self.begin),
            format_epoch(&self.end)
        )
    }
}

/// Consecutive, non-overlapping sub-windows of a [`TimeRange`].
///
/// Windows are `base` seconds wide unless the caller stretches them over a
/// gap with [`Chunks::widen`].
#[derive(Debug, Clone)]
pub struct Chunks {
    next: Option<Time>,
    end: Time,
    base: u64,
    span: u64,
}
impl Chunks {
    /// Doubles the width of the following windows, up to [`MAX_GROWTH`] times the base span.
    pub fn widen(&mut self) {
        let max = self.base.saturating_mul(MAX_GROWTH);
        self.span = self.span.saturating_mul(2).min(max);
    }

    /// Data showed up in `window` starting at `first`: only the first base
    /// span of it is kept and iteration resumes right after it at the base
    /// width. Returns the last kept instant.
    pub fn narrow(&mut self, window: &TimeRange, first: Time) -> Time {
        let keep = first
            .max(window.begin)
            .saturating_add(self.base - 1)
            .min(window.end);
        self.span = self.base;
        self.next = (keep < self.end).then(|| keep + 1);
        keep
    }
}
impl Iterator for Chunks {
    type Item = TimeRange;

    fn next(&mut self) -> Option<Self::Item> {
        let begin = self.next?;
        let end = begin.saturating_add(self.span - 1).min(self.end);
        self.next = if end < self.end { Some(end + 1) } else { None };
        Some(TimeRange { begin, end })
    }
}

pub fn epoch_secs(time: SystemTime) -> Time {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn format_epoch(secs: &Time) -> humantime::Rfc3339Timestamp {
    humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(*secs))
}
