use std::{collections::BTreeMap, fmt};

use crate::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonically non-decreasing.
    Counter,
    Gauge,
}
impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}
impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a metric path is measuring: the whole host, one cgroup or one process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Host,
    Cgroup { path: String },
    Process { pid: u32, comm: String },
}
impl Scope {
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        match self {
            Self::Host => {}
            Self::Cgroup { path } => {
                labels.insert("cgroup".to_owned(), path.clone());
            }
            Self::Process { pid, comm } => {
                labels.insert("pid".to_owned(), pid.to_string());
                labels.insert("comm".to_owned(), comm.clone());
            }
        }
        labels
    }
}
impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Cgroup { path } => write!(f, "cgroup.{path}"),
            Self::Process { pid, .. } => write!(f, "process.{pid}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricPath {
    pub scope: Scope,
    /// Dotted field name, e.g. `cpu.usage_usec`.
    pub field: String,
}
impl MetricPath {
    pub fn new(scope: Scope, field: impl Into<String>) -> Self {
        let field = field.into();
        Self { scope, field }
    }
    pub fn host(field: impl Into<String>) -> Self {
        Self::new(Scope::Host, field)
    }
}
impl fmt::Display for MetricPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.scope, self.field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub kind: MetricKind,
    /// `None` when the store had no value for this field.
    pub value: Option<f64>,
}
impl Reading {
    pub fn counter(value: f64) -> Self {
        Self {
            kind: MetricKind::Counter,
            value: Some(value),
        }
    }
    pub fn gauge(value: f64) -> Self {
        Self {
            kind: MetricKind::Gauge,
            value: Some(value),
        }
    }
    pub fn missing(kind: MetricKind) -> Self {
        Self { kind, value: None }
    }
}

/// One snapshot of the store at `timestamp`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: Time,
    pub readings: BTreeMap<MetricPath, Reading>,
}
impl Sample {
    pub fn new(timestamp: Time) -> Self {
        let readings = BTreeMap::new();
        Self {
            timestamp,
            readings,
        }
    }

    /// Keeps the first reading for a path; returns whether `reading` was stored.
    pub fn insert(&mut self, path: MetricPath, reading: Reading) -> bool {
        match self.readings.entry(path) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(reading);
                true
            }
        }
    }
    pub fn len(&self) -> usize {
        self.readings.len()
    }
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
