//! OpenMetrics Converter: turns one [`Sample`] into prefixed metric records.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use tracing::{debug, warn};

use crate::{
    error::ConfigError,
    sample::{MetricKind, MetricPath, Sample},
    Time,
};

const COUNTER_SUFFIX: &str = "_total";

/// Namespace put in front of every imported metric name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prefix(String);
impl Prefix {
    pub fn new(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidPrefix(raw.to_owned());
        let name = sanitize(raw).ok_or_else(invalid)?;
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(invalid());
        }
        Ok(Self(name))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replaces path separators with `_`. `None` if anything else is not allowed
/// in an OpenMetrics name.
pub fn sanitize(raw: &str) -> Option<String> {
    let name: String = raw
        .chars()
        .map(|c| match c {
            '.' | '/' | '-' | ' ' => '_',
            c => c,
        })
        .collect();
    if name.is_empty() || !name.chars().all(is_name_char) {
        return None;
    }
    Some(name)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

pub fn is_valid_name(name: &str) -> bool {
    name.chars().all(is_name_char) && name.starts_with(|c: char| !c.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    /// Family name; counters carry `_total` only on the series, see [`Self::series_name`].
    pub name: String,
    pub kind: MetricKind,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: Time,
    pub help: String,
}
impl MetricRecord {
    pub fn series_name(&self) -> String {
        match self.kind {
            MetricKind::Counter => format!("{}{COUNTER_SUFFIX}", self.name),
            MetricKind::Gauge => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningReason {
    Unmappable,
    /// Sanitizes to the same series as an earlier path in the sample.
    DuplicateSeries(String),
}

/// A path that was skipped. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionWarning {
    pub path: String,
    pub timestamp: Time,
    pub reason: WarningReason,
}
impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            WarningReason::Unmappable => {
                write!(f, "`{}` cannot be mapped to a metric name", self.path)
            }
            WarningReason::DuplicateSeries(series) => {
                write!(f, "`{}` duplicates series `{series}`", self.path)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversion {
    pub records: Vec<MetricRecord>,
    pub warnings: Vec<ConversionWarning>,
}

#[derive(Debug, Clone)]
pub struct Converter {
    prefix: Prefix,
}
impl Converter {
    pub fn new(prefix: Prefix) -> Self {
        Self { prefix }
    }
    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn convert(&self, sample: &Sample) -> Conversion {
        let mut conversion = Conversion::default();
        let mut series = HashSet::new();
        for (path, reading) in &sample.readings {
            let Some(value) = reading.value.filter(|v| !v.is_nan()) else {
                debug!(%path, timestamp = sample.timestamp, "omitting missing value");
                continue;
            };
            let Some(name) = self.metric_name(path, reading.kind) else {
                self.skip(&mut conversion, path, sample.timestamp, WarningReason::Unmappable);
                continue;
            };
            let record = MetricRecord {
                name,
                kind: reading.kind,
                labels: path.scope.labels(),
                value,
                timestamp: sample.timestamp,
                help: path.to_string(),
            };
            let series_name = record.series_name();
            if !series.insert((series_name.clone(), record.labels.clone())) {
                let reason = WarningReason::DuplicateSeries(series_name);
                self.skip(&mut conversion, path, sample.timestamp, reason);
                continue;
            }
            conversion.records.push(record);
        }
        conversion
    }

    fn metric_name(&self, path: &MetricPath, kind: MetricKind) -> Option<String> {
        let field = sanitize(&path.field)?;
        let base = match kind {
            MetricKind::Counter => field
                .strip_suffix(COUNTER_SUFFIX)
                .filter(|base| !base.is_empty())
                .unwrap_or(field.as_str()),
            MetricKind::Gauge => field.as_str(),
        };
        Some(format!("{}_{base}", self.prefix))
    }

    fn skip(
        &self,
        conversion: &mut Conversion,
        path: &MetricPath,
        timestamp: Time,
        reason: WarningReason,
    ) {
        let warning = ConversionWarning {
            path: path.to_string(),
            timestamp,
            reason,
        };
        warn!(timestamp, "{warning}, skipping");
        conversion.warnings.push(warning);
    }
}
