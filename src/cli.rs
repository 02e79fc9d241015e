use std::{
    path::PathBuf,
    time::{Duration, SystemTime},
};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::{
    config::{
        parse_duration, ImportConfig, SinkTarget, ENV_BELOW, ENV_CONFIG, ENV_OUTPUT, ENV_SINK_URL,
    },
    convert::Prefix,
    error::ConfigError,
    exporter::{Exporter, FileExporter, HttpExporter},
    import::{ImportReport, Importer},
    range::{TimeExpr, TimeRange},
    reader::{BelowDump, RangeReader, Source},
    schema::Category,
    sink::Sink,
};

#[derive(Parser, Debug)]
#[command(name = "below-import")]
#[command(version, about = "Imports below data into Prometheus", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a time range of below data
    Import(ImportArgs),
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// `host` for the local store, or the path to a below snapshot
    pub source: Source,

    /// Start of the import interval, e.g. "4h ago" or "2024-05-01 10:00:00"
    #[arg(long, short, default_value = "99 years ago")]
    pub begin: String,

    /// End of the import interval
    #[arg(long, short, default_value = "now")]
    pub end: String,

    /// Prefix for all imported metrics
    #[arg(long, short)]
    pub prefix: String,

    /// Path to a JSON config file
    #[arg(long, short, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Import endpoint accepting OpenMetrics text
    #[arg(long, env = ENV_SINK_URL, conflicts_with = "output")]
    pub sink_url: Option<String>,

    /// Write an OpenMetrics file for promtool instead of posting it
    #[arg(long, short, env = ENV_OUTPUT)]
    pub output: Option<PathBuf>,

    /// below dump category to import, repeatable
    #[arg(long = "category")]
    pub categories: Vec<Category>,

    /// Window dumped per below invocation
    #[arg(long, value_parser = parse_duration)]
    pub chunk: Option<Duration>,

    /// below binary
    #[arg(long, env = ENV_BELOW)]
    pub below: Option<PathBuf>,
}
impl ImportArgs {
    /// Config file overlaid with flags and environment.
    pub fn config(&self) -> Result<ImportConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ImportConfig::load(path)?,
            None => ImportConfig::default(),
        };
        if let Some(url) = &self.sink_url {
            config.sink.url = Some(url.clone());
            config.sink.output = None;
        }
        if let Some(output) = &self.output {
            config.sink.output = Some(output.clone());
            config.sink.url = None;
        }
        if !self.categories.is_empty() {
            config.source.categories = self.categories.clone();
        }
        if let Some(chunk) = self.chunk {
            config.source.chunk = chunk;
        }
        if let Some(below) = &self.below {
            config.source.below_bin = below.clone();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn run(&self, now: SystemTime) -> anyhow::Result<ImportReport> {
        let config = self.config()?;
        let prefix = Prefix::new(&self.prefix)?;
        let begin = TimeExpr::parse(&self.begin)?;
        let end = TimeExpr::parse(&self.end)?;
        let range = TimeRange::resolve(&begin, &end, now)?;

        let dump = BelowDump::open(&config.source.below_bin, self.source.clone())?;
        let reader = RangeReader::new(
            dump,
            range,
            config.source.categories.clone(),
            config.source.chunk,
        );
        let exporter: Box<dyn Exporter> = match config.sink.target()? {
            SinkTarget::Http(url) => Box::new(HttpExporter::new(url, config.sink.timeout)),
            SinkTarget::File(path) => {
                let exporter = FileExporter::create(&path)
                    .map_err(|source| ConfigError::Output { path, source })?;
                Box::new(exporter)
            }
        };
        let mut sink = Sink::new(exporter, config.sink.retry);
        let importer = Importer::new(prefix, config.sink.batch);
        importer.run(&reader, &mut sink).with_context(|| {
            format!(
                "import of {} with prefix `{}` over {range} failed; re-run the same range to recover",
                self.source,
                importer.prefix()
            )
        })
    }
}
