//! The import pipeline: reader -> converter -> sink, pulled one sample at a time.

use tracing::{info, warn};

use crate::{
    batch::{Batch, BatchLimits, Batcher},
    convert::{Converter, Prefix},
    error::{Error, RangeError},
    exporter::Exporter,
    range::TimeRange,
    reader::{Dump, RangeReader},
    sink::Sink,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub prefix: Prefix,
    pub window: TimeRange,
    pub samples: usize,
    pub records: usize,
    pub warnings: usize,
    pub batches: usize,
    /// Sink writes, retries included.
    pub attempts: u32,
}
impl ImportReport {
    fn new(prefix: Prefix, window: TimeRange) -> Self {
        Self {
            prefix,
            window,
            samples: 0,
            records: 0,
            warnings: 0,
            batches: 0,
            attempts: 0,
        }
    }
}

/// One import run. Holds no state between runs.
#[derive(Debug, Clone)]
pub struct Importer {
    converter: Converter,
    limits: BatchLimits,
}
impl Importer {
    pub fn new(prefix: Prefix, limits: BatchLimits) -> Self {
        let converter = Converter::new(prefix);
        Self { converter, limits }
    }
    pub fn prefix(&self) -> &Prefix {
        self.converter.prefix()
    }

    pub fn run<D, E>(&self, reader: &RangeReader<D>, sink: &mut Sink<E>) -> Result<ImportReport, Error>
    where
        D: Dump,
        E: Exporter,
    {
        let window = reader.range();
        info!(prefix = %self.prefix(), %window, "importing");
        let mut report = ImportReport::new(self.prefix().clone(), window);
        let mut batcher = Batcher::new(self.limits);
        for sample in reader.samples() {
            let sample = sample?;
            report.samples += 1;
            let conversion = self.converter.convert(&sample);
            report.warnings += conversion.warnings.len();
            for record in conversion.records {
                report.records += 1;
                if let Some(batch) = batcher.push(record) {
                    self.ship(sink, &batch, &mut report)?;
                }
            }
        }
        if let Some(batch) = batcher.finish() {
            self.ship(sink, &batch, &mut report)?;
        }
        if report.samples == 0 {
            return Err(RangeError::NoData(window).into());
        }
        sink.finish()?;
        if report.warnings > 0 {
            warn!(warnings = report.warnings, "some metric paths were skipped");
        }
        info!(
            prefix = %self.prefix(),
            samples = report.samples,
            records = report.records,
            batches = report.batches,
            "import complete"
        );
        Ok(report)
    }

    fn ship<E: Exporter>(
        &self,
        sink: &mut Sink<E>,
        batch: &Batch,
        report: &mut ImportReport,
    ) -> Result<(), Error> {
        let attempts = sink.send(batch)?;
        report.batches += 1;
        report.attempts += attempts;
        info!(
            batch = report.batches,
            records = batch.len(),
            bytes = batch.encoded_len(),
            attempts,
            "batch accepted"
        );
        Ok(())
    }
}
