use std::collections::HashSet;

use serde::Deserialize;
use tracing::warn;

use crate::{
    convert::MetricRecord,
    error::ConfigError,
    exposition::{encode, family_header, sample_line, EOF},
    range::TimeRange,
};

pub const DEFAULT_MAX_RECORDS: usize = 5000;
pub const DEFAULT_MAX_BYTES: usize = 4 * 1024 * 1024;

/// Upper bounds on one write to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    pub max_records: usize,
    /// Encoded payload size, `# EOF` included.
    pub max_bytes: usize,
}
impl BatchLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_records == 0 {
            return Err(ConfigError::ZeroLimit("max_records"));
        }
        if self.max_bytes == 0 {
            return Err(ConfigError::ZeroLimit("max_bytes"));
        }
        Ok(())
    }
}
impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    records: Vec<MetricRecord>,
    bytes: usize,
}
impl Batch {
    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    /// Exact size of [`Self::encode`].
    pub fn encoded_len(&self) -> usize {
        self.bytes
    }
    pub fn window(&self) -> Option<TimeRange> {
        let first = self.records.first()?.timestamp;
        let (min, max) = self
            .records
            .iter()
            .fold((first, first), |(min, max), r| {
                (min.min(r.timestamp), max.max(r.timestamp))
            });
        Some(TimeRange::spanning(min, max))
    }
    pub fn encode(&self) -> String {
        encode(&self.records)
    }
}

/// Packs records, in order, into batches within [`BatchLimits`].
#[derive(Debug)]
pub struct Batcher {
    limits: BatchLimits,
    records: Vec<MetricRecord>,
    families: HashSet<String>,
    bytes: usize,
}
impl Batcher {
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            limits,
            records: vec![],
            families: HashSet::new(),
            bytes: EOF.len(),
        }
    }

    /// Returns the previous batch when `record` does not fit in it.
    pub fn push(&mut self, record: MetricRecord) -> Option<Batch> {
        let line = sample_line(&record).len();
        let full = !self.records.is_empty()
            && (self.records.len() >= self.limits.max_records
                || self.bytes + self.cost(&record, line) > self.limits.max_bytes);
        let flushed = if full { self.take() } else { None };

        let cost = self.cost(&record, line);
        if self.records.is_empty() && self.bytes + cost > self.limits.max_bytes {
            warn!(
                series = %record.series_name(),
                bytes = self.bytes + cost,
                max_bytes = self.limits.max_bytes,
                "record exceeds the batch byte limit on its own, sending it alone"
            );
        }
        self.bytes += cost;
        self.families.insert(record.name.clone());
        self.records.push(record);
        flushed
    }

    pub fn finish(&mut self) -> Option<Batch> {
        self.take()
    }

    fn cost(&self, record: &MetricRecord, line: usize) -> usize {
        if self.families.contains(&record.name) {
            line
        } else {
            line + family_header(record).len()
        }
    }

    fn take(&mut self) -> Option<Batch> {
        if self.records.is_empty() {
            return None;
        }
        let records = std::mem::take(&mut self.records);
        let bytes = std::mem::replace(&mut self.bytes, EOF.len());
        self.families.clear();
        Some(Batch { records, bytes })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::sample::MetricKind;

    fn record(name: &str, timestamp: u64) -> MetricRecord {
        MetricRecord {
            name: name.to_owned(),
            kind: MetricKind::Gauge,
            labels: BTreeMap::new(),
            value: timestamp as f64,
            timestamp,
            help: name.to_owned(),
        }
    }

    fn drain(limits: BatchLimits, records: Vec<MetricRecord>) -> Vec<Batch> {
        let mut batcher = Batcher::new(limits);
        let mut batches: Vec<Batch> = records.into_iter().filter_map(|r| batcher.push(r)).collect();
        batches.extend(batcher.finish());
        batches
    }

    #[test]
    fn test_record_limit() {
        let limits = BatchLimits {
            max_records: 3,
            max_bytes: usize::MAX,
        };
        let batches = drain(limits, (0..7).map(|t| record("p_a", t)).collect());
        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_byte_limit_and_exact_size() {
        let limits = BatchLimits {
            max_records: usize::MAX,
            max_bytes: 120,
        };
        let records: Vec<_> = (0..20)
            .map(|t| record(if t % 2 == 0 { "p_a" } else { "p_b" }, t))
            .collect();
        let batches = drain(limits, records.clone());
        assert!(batches.len() > 1);
        for batch in &batches {
            assert_eq!(batch.encode().len(), batch.encoded_len());
            assert!(batch.encoded_len() <= 120);
        }
        let delivered: Vec<_> = batches.iter().flat_map(|b| b.records().to_vec()).collect();
        assert_eq!(delivered, records);
    }

    #[test]
    fn test_oversize_record_alone() {
        let limits = BatchLimits {
            max_records: 10,
            max_bytes: 8,
        };
        let batches = drain(limits, vec![record("p_a", 1), record("p_a", 2)]);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn test_window() {
        let batches = drain(
            BatchLimits::default(),
            vec![record("p_a", 5), record("p_b", 5), record("p_a", 9)],
        );
        let window = batches[0].window().unwrap();
        assert_eq!((window.begin(), window.end()), (5, 9));
    }

    #[test]
    fn test_empty_finish() {
        assert!(Batcher::new(BatchLimits::default()).finish().is_none());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let limits = BatchLimits {
            max_records: 0,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
        assert!(BatchLimits::default().validate().is_ok());
    }
}
