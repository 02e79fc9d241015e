//! OpenMetrics text exposition.

use std::{collections::HashMap, fmt::Write};

use crate::convert::MetricRecord;

pub const CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";
pub const EOF: &str = "# EOF\n";

pub fn family_header(record: &MetricRecord) -> String {
    let name = &record.name;
    format!(
        "# TYPE {name} {}\n# HELP {name} {}\n",
        record.kind,
        escape(&record.help)
    )
}

pub fn sample_line(record: &MetricRecord) -> String {
    let mut line = record.series_name();
    if !record.labels.is_empty() {
        line.push('{');
        for (i, (key, value)) in record.labels.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            let _ = write!(line, "{key}=\"{}\"", escape(value));
        }
        line.push('}');
    }
    let _ = writeln!(line, " {} {}", format_value(record.value), record.timestamp);
    line
}

/// Families are emitted in first-seen order; records keep their relative order
/// inside a family.
pub fn encode(records: &[MetricRecord]) -> String {
    let mut families: Vec<(&MetricRecord, Vec<&MetricRecord>)> = vec![];
    let mut index: HashMap<&str, usize> = HashMap::new();
    for record in records {
        match index.get(record.name.as_str()) {
            Some(&i) => families[i].1.push(record),
            None => {
                index.insert(record.name.as_str(), families.len());
                families.push((record, vec![record]));
            }
        }
    }
    let mut out = String::new();
    for (first, members) in families {
        out.push_str(&family_header(first));
        for record in members {
            out.push_str(&sample_line(record));
        }
    }
    out.push_str(EOF);
    out
}

fn format_value(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_owned();
    }
    value.to_string()
}

/// Escaping shared by HELP text and label values.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}
