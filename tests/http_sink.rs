use std::{
    collections::BTreeMap,
    net::{TcpListener as StdListener, TcpStream},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use below_import::{
    batch::{Batch, BatchLimits, Batcher},
    convert::MetricRecord,
    error::IngestionError,
    exporter::HttpExporter,
    exposition::CONTENT_TYPE,
    retry::RetryPolicy,
    sample::MetricKind,
    sink::Sink,
};
use poem::{
    handler, http::StatusCode, listener::TcpListener, middleware::AddData, post, web::Data,
    EndpointExt, Request, Route, Server,
};

#[derive(Debug, Default)]
struct Script {
    statuses: Vec<u16>,
    hits: AtomicUsize,
    bodies: Mutex<Vec<(String, String)>>,
}

#[handler]
async fn import(req: &Request, body: String, script: Data<&Arc<Script>>) -> StatusCode {
    let hit = script.hits.fetch_add(1, Ordering::SeqCst);
    let content_type = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let status = script.statuses.get(hit).copied().unwrap_or(204);
    if status < 300 {
        script.bodies.lock().unwrap().push((content_type, body));
    }
    StatusCode::from_u16(status).unwrap()
}

/// Serves the scripted import endpoint on a runtime of its own.
fn spawn_sink(statuses: Vec<u16>) -> (String, Arc<Script>) {
    let addr = StdListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let script = Arc::new(Script {
        statuses,
        ..Default::default()
    });
    let state = script.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let app = Route::new()
                .at("/api/v1/import/prometheus", post(import))
                .with(AddData::new(state));
            Server::new(TcpListener::bind(addr.to_string()))
                .run(app)
                .await
                .unwrap();
        });
    });
    for _ in 0..200 {
        if TcpStream::connect(addr).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    (format!("http://{addr}/api/v1/import/prometheus"), script)
}

fn sink(url: String) -> Sink<HttpExporter> {
    let policy = RetryPolicy {
        max_attempts: 4,
        initial_backoff: Duration::from_millis(5),
        ..Default::default()
    };
    Sink::new(HttpExporter::new(url, Duration::from_secs(5)), policy)
}

fn batch() -> Batch {
    let mut batcher = Batcher::new(BatchLimits::default());
    for timestamp in [100, 110, 120] {
        let mut labels = BTreeMap::new();
        labels.insert("cgroup".to_owned(), "/system.slice".to_owned());
        let record = MetricRecord {
            name: "localhost_cpu_usage_usec".into(),
            kind: MetricKind::Counter,
            labels,
            value: timestamp as f64 * 10.0,
            timestamp,
            help: "cgroup./system.slice.cpu.usage_usec".into(),
        };
        assert!(batcher.push(record).is_none());
    }
    batcher.finish().unwrap()
}

#[test]
fn test_503_twice_then_ok() {
    let (url, script) = spawn_sink(vec![503, 503, 200]);
    let mut sink = sink(url);
    let batch = batch();
    assert_eq!(sink.send(&batch).unwrap(), 3);
    assert_eq!(script.hits.load(Ordering::SeqCst), 3);
    let bodies = script.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0].0, CONTENT_TYPE);
    assert_eq!(bodies[0].1, batch.encode());
}

#[test]
fn test_400_is_not_retried() {
    let (url, script) = spawn_sink(vec![400]);
    let mut sink = sink(url);
    let err = sink.send(&batch()).unwrap_err();
    assert!(err.is_permanent());
    match err {
        IngestionError::Rejected { window, reason } => {
            assert_eq!((window.begin(), window.end()), (100, 120));
            assert!(reason.starts_with("HTTP 400"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(script.hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_persistent_503_exhausts() {
    let (url, script) = spawn_sink(vec![503; 10]);
    let mut sink = sink(url);
    let err = sink.send(&batch()).unwrap_err();
    assert!(matches!(
        err,
        IngestionError::RetriesExhausted { attempts: 4, .. }
    ));
    assert_eq!(script.hits.load(Ordering::SeqCst), 4);
}
