//! Range Reader: pulls samples for a time window out of below's store.

use std::{
    collections::{BTreeMap, HashSet},
    env,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use tracing::{debug, warn};

use crate::{
    error::SourceError,
    range::{Chunks, TimeRange},
    sample::{MetricPath, Reading, Sample},
    schema::{parse_value, row_timestamp, Category, Row},
};

/// Read side of below's store.
pub trait Dump {
    fn dump(&self, category: Category, window: &TimeRange) -> Result<Vec<Row>, SourceError>;
}
impl<D: Dump + ?Sized> Dump for &D {
    fn dump(&self, category: Category, window: &TimeRange) -> Result<Vec<Row>, SourceError> {
        (**self).dump(category, window)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The local host's store.
    Host,
    Snapshot(PathBuf),
}
impl core::str::FromStr for Source {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            _ if s.eq_ignore_ascii_case("host") || s.eq_ignore_ascii_case("local") => Self::Host,
            _ => Self::Snapshot(PathBuf::from(s)),
        })
    }
}
impl core::fmt::Display for Source {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Snapshot(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Runs `below dump` once per category and window.
#[derive(Debug, Clone)]
pub struct BelowDump {
    bin: PathBuf,
    source: Source,
}
impl BelowDump {
    /// Fails early when the binary or the snapshot is missing.
    pub fn open(bin: impl Into<PathBuf>, source: Source) -> Result<Self, SourceError> {
        let bin = bin.into();
        if !binary_exists(&bin) {
            return Err(SourceError::MissingBinary(bin));
        }
        if let Source::Snapshot(path) = &source {
            if !path.exists() {
                return Err(SourceError::MissingSnapshot(path.clone()));
            }
        }
        Ok(Self { bin, source })
    }

    fn command(&self, category: Category, window: &TimeRange) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("dump");
        if let Source::Snapshot(path) = &self.source {
            cmd.arg("--snapshot").arg(path);
        }
        cmd.arg(category.as_str())
            .arg("--begin")
            .arg(window.begin().to_string())
            .arg("--end")
            .arg(window.end().to_string())
            .arg("--raw")
            .args(["--output-format", "json"]);
        cmd
    }
}
impl Dump for BelowDump {
    fn dump(&self, category: Category, window: &TimeRange) -> Result<Vec<Row>, SourceError> {
        let mut cmd = self.command(category, window);
        let command = format!("{cmd:?}");
        debug!(%command, "dumping {category} data");
        let output = cmd.output().map_err(|source| SourceError::Spawn {
            command: command.clone(),
            source,
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            return Err(SourceError::Command {
                command,
                status: output.status,
                stderr,
            });
        }
        decode_rows(category, &output.stdout)
    }
}

fn binary_exists(bin: &Path) -> bool {
    if bin.components().count() > 1 {
        return bin.is_file();
    }
    let Some(paths) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&paths).any(|dir| dir.join(bin).is_file())
}

/// below prints nothing at all for an empty window.
pub fn decode_rows(category: Category, stdout: &[u8]) -> Result<Vec<Row>, SourceError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(vec![]);
    }
    serde_json::from_slice(stdout).map_err(|source| SourceError::Decode {
        category: category.to_string(),
        source,
    })
}

#[derive(Debug)]
pub struct RangeReader<D> {
    dump: D,
    range: TimeRange,
    categories: Vec<Category>,
    chunk: Duration,
}
impl<D: Dump> RangeReader<D> {
    pub fn new(dump: D, range: TimeRange, categories: Vec<Category>, chunk: Duration) -> Self {
        Self {
            dump,
            range,
            categories,
            chunk,
        }
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// Lazy and finite. Each call starts over from the beginning of the range.
    pub fn samples(&self) -> Samples<'_, D> {
        Samples {
            reader: self,
            chunks: self.range.chunks(self.chunk),
            pending: vec![].into_iter(),
            last: None,
            unknown: HashSet::new(),
            unscoped: HashSet::new(),
            failed: false,
        }
    }
}

/// Samples in strictly increasing timestamp order; memory is bounded by one chunk.
///
/// Empty windows widen the next one so decades without data cost a few
/// hundred dumps instead of one per chunk.
#[derive(Debug)]
pub struct Samples<'a, D> {
    reader: &'a RangeReader<D>,
    chunks: Chunks,
    pending: std::vec::IntoIter<Sample>,
    last: Option<u64>,
    unknown: HashSet<(Category, String)>,
    unscoped: HashSet<Category>,
    failed: bool,
}
impl<D: Dump> Samples<'_, D> {
    fn load(&mut self, window: &TimeRange) -> Result<Vec<Sample>, SourceError> {
        let reader = self.reader;
        let mut merged: BTreeMap<u64, Sample> = BTreeMap::new();
        for &category in &reader.categories {
            for row in reader.dump.dump(category, window)? {
                let timestamp = row_timestamp(&row).ok_or_else(|| SourceError::MissingTimestamp {
                    category: category.to_string(),
                })?;
                if !window.contains(timestamp) {
                    continue;
                }
                let sample = merged
                    .entry(timestamp)
                    .or_insert_with(|| Sample::new(timestamp));
                self.decode_row(category, &row, sample);
            }
        }
        Ok(merged.into_values().collect())
    }

    fn decode_row(&mut self, category: Category, row: &Row, sample: &mut Sample) {
        let Some(scope) = category.scope(row) else {
            if self.unscoped.insert(category) {
                warn!(%category, timestamp = sample.timestamp, "rows without identity columns, skipping");
            }
            return;
        };
        for (title, cell) in row {
            if category.is_identity(title) {
                continue;
            }
            let Some(def) = category.lookup(title) else {
                if self.unknown.insert((category, title.clone())) {
                    warn!(%category, column = %title, "unknown column found during conversion");
                }
                continue;
            };
            let reading = Reading {
                kind: def.kind,
                value: parse_value(cell),
            };
            let path = MetricPath::new(scope.clone(), def.field);
            if !sample.insert(path, reading) {
                debug!(%category, column = %title, timestamp = sample.timestamp, "duplicate reading, keeping the first");
            }
        }
    }
}
impl<D: Dump> Iterator for Samples<'_, D> {
    type Item = Result<Sample, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed {
                return None;
            }
            if let Some(sample) = self.pending.next() {
                if self.last.is_some_and(|last| sample.timestamp <= last) {
                    continue;
                }
                self.last = Some(sample.timestamp);
                return Some(Ok(sample));
            }
            let window = self.chunks.next()?;
            match self.load(&window) {
                Ok(mut samples) => {
                    match samples.first().map(|s| s.timestamp) {
                        None => self.chunks.widen(),
                        Some(first) => {
                            let keep = self.chunks.narrow(&window, first);
                            samples.retain(|s| s.timestamp <= keep);
                        }
                    }
                    self.pending = samples.into_iter();
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
