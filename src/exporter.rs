use std::{
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use tempfile::NamedTempFile;

use crate::exposition::{CONTENT_TYPE, EOF};

/// Outcome of handing one payload to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Accepted,
    /// Worth retrying: network trouble, 5xx, throttling.
    Transient(String),
    /// The sink refused the payload itself.
    Rejected(String),
}

pub trait Exporter {
    fn export(&mut self, payload: &str) -> Delivery;
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}
impl<E: Exporter + ?Sized> Exporter for Box<E> {
    fn export(&mut self, payload: &str) -> Delivery {
        (**self).export(payload)
    }
    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

/// POSTs OpenMetrics payloads to an import endpoint.
#[derive(Debug)]
pub struct HttpExporter {
    client: ureq::Agent,
    url: String,
}
impl HttpExporter {
    pub fn new(url: String, timeout: Duration) -> Self {
        let client = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { client, url }
    }
    pub fn url(&self) -> &str {
        &self.url
    }
}
impl Exporter for HttpExporter {
    /// Blocking I/O
    fn export(&mut self, payload: &str) -> Delivery {
        let resp = self
            .client
            .post(&self.url)
            .set("Content-Type", CONTENT_TYPE)
            .send_string(payload);
        match resp {
            Ok(resp) => classify(resp.status(), String::new()),
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                classify(status, body)
            }
            Err(ureq::Error::Transport(e)) => Delivery::Transient(e.to_string()),
        }
    }
}

pub fn classify(status: u16, body: String) -> Delivery {
    let reason = || match body.trim() {
        "" => format!("HTTP {status}"),
        body => format!("HTTP {status}: {body}"),
    };
    match status {
        200..=299 => Delivery::Accepted,
        408 | 429 | 500..=599 => Delivery::Transient(reason()),
        _ => Delivery::Rejected(reason()),
    }
}

/// Writes one OpenMetrics file for `promtool tsdb create-blocks-from openmetrics`.
///
/// Payloads go to a temporary file beside `path`, which only replaces `path`
/// once [`Exporter::finish`] has written the final `# EOF`. Dropping the
/// exporter earlier leaves `path` untouched.
#[derive(Debug)]
pub struct FileExporter {
    path: PathBuf,
    wtr: Option<BufWriter<NamedTempFile>>,
}
impl FileExporter {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let file = tempfile::Builder::new()
            .prefix(".below-import")
            .tempfile_in(dir)?;
        Ok(Self {
            path,
            wtr: Some(BufWriter::new(file)),
        })
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
}
impl Exporter for FileExporter {
    fn export(&mut self, payload: &str) -> Delivery {
        let Some(wtr) = &mut self.wtr else {
            return Delivery::Rejected(format!("{} is already finished", self.path.display()));
        };
        let body = payload.strip_suffix(EOF).unwrap_or(payload);
        match wtr.write_all(body.as_bytes()) {
            Ok(()) => Delivery::Accepted,
            Err(e) => Delivery::Rejected(format!("writing {}: {e}", self.path.display())),
        }
    }
    fn finish(&mut self) -> io::Result<()> {
        let Some(mut wtr) = self.wtr.take() else {
            return Ok(());
        };
        wtr.write_all(EOF.as_bytes())?;
        let file = wtr.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(204, String::new()), Delivery::Accepted);
        assert_eq!(
            classify(503, "busy\n".into()),
            Delivery::Transient("HTTP 503: busy".into())
        );
        assert!(matches!(classify(429, String::new()), Delivery::Transient(_)));
        assert!(matches!(classify(408, String::new()), Delivery::Transient(_)));
        assert_eq!(
            classify(400, String::new()),
            Delivery::Rejected("HTTP 400".into())
        );
        assert!(matches!(classify(404, String::new()), Delivery::Rejected(_)));
    }

    #[test]
    fn test_file_exporter_single_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.om");
        let mut exporter = FileExporter::create(&path).unwrap();
        assert_eq!(exporter.export("a 1 1\n# EOF\n"), Delivery::Accepted);
        assert_eq!(exporter.export("b 2 2\n# EOF\n"), Delivery::Accepted);
        exporter.finish().unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "a 1 1\nb 2 2\n# EOF\n");
        assert!(matches!(exporter.export("c 3 3\n"), Delivery::Rejected(_)));
    }

    #[test]
    fn test_file_exporter_unfinished_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.om");
        let mut exporter = FileExporter::create(&path).unwrap();
        assert_eq!(exporter.export("a 1 1\n# EOF\n"), Delivery::Accepted);
        drop(exporter);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        std::fs::write(&path, "old\n# EOF\n").unwrap();
        let exporter = FileExporter::create(&path).unwrap();
        drop(exporter);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old\n# EOF\n");
    }

    #[test]
    fn test_unreachable_is_transient() {
        let mut exporter = HttpExporter::new(
            "http://127.0.0.1:9/api/v1/import/prometheus".into(),
            Duration::from_secs(1),
        );
        assert!(matches!(exporter.export("# EOF\n"), Delivery::Transient(_)));
    }
}
