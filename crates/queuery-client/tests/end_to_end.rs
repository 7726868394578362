//! End-to-end tests for submit → poll → stream against an in-memory service.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;

use queuery_client::{
    Client, ClientConfig, HttpRequest, HttpResponse, HttpTransport, ManualClock, Materialized,
    Method, QueryStatus, QueueryClient, QueueryError, QueueryResult, Value,
};

// ─────────────────────── helpers ───────────────────────

const ENDPOINT: &str = "https://queuery.example.com";
const SUBMIT_URL: &str = "https://queuery.example.com/v1/queries";
const STATUS_URL: &str = "https://queuery.example.com/v1/queries/1";
const SHARD_A: &str = "https://storage.example.com/1/part_00.csv.gz";
const SHARD_B: &str = "https://storage.example.com/1/part_01.csv.gz";
const MANIFEST_URL: &str = "https://storage.example.com/1/manifest";

/// Scripted queuery service plus object storage.
#[derive(Default)]
struct FakeService {
    submit: Mutex<Option<(u16, serde_json::Value)>>,
    statuses: Mutex<VecDeque<(u16, serde_json::Value)>>,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeService {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn on_submit(&self, status: u16, body: serde_json::Value) {
        *self.submit.lock().unwrap() = Some((status, body));
    }

    fn push_status(&self, status: u16, body: serde_json::Value) {
        self.statuses.lock().unwrap().push_back((status, body));
    }

    fn put_object(&self, url: &str, body: Vec<u8>) {
        self.objects.lock().unwrap().insert(url.to_string(), body);
    }

    fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }
}

impl HttpTransport for FakeService {
    fn send(&self, request: &HttpRequest) -> QueueryResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let (status, body) = match (request.method, request.url.as_str()) {
            (Method::Post, SUBMIT_URL) => {
                let (status, body) = self.submit.lock().unwrap().clone().expect("no submit script");
                (status, serde_json::to_vec(&body).unwrap())
            }
            (Method::Get, STATUS_URL) => {
                let (status, body) = self
                    .statuses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .expect("status polled more often than scripted");
                (status, serde_json::to_vec(&body).unwrap())
            }
            (Method::Get, url) => match self.objects.lock().unwrap().get(url) {
                Some(body) => (200, body.clone()),
                None => (404, Vec::new()),
            },
            (Method::Post, _) => (405, Vec::new()),
        };

        Ok(HttpResponse::new(request.url.clone(), status, body))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn query_body(status: &str, with_manifest: bool) -> serde_json::Value {
    let mut body = json!({
        "id": 1,
        "data_file_urls": [SHARD_A, SHARD_B],
        "error": null,
        "status": status,
        "created_at": "2021-01-01T00:00:00Z"
    });
    if with_manifest {
        body["manifest_file_url"] = json!(MANIFEST_URL);
    }
    body
}

fn manifest_json() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "schema": {
            "elements": [
                {"name": "id", "type": {"base": "integer"}},
                {"name": "title", "type": {"base": "character varying"}}
            ]
        },
        "meta": {"record_count": 2}
    }))
    .unwrap()
}

/// A service holding one finished two-shard query.
fn finished_query(with_manifest: bool) -> Arc<FakeService> {
    let service = FakeService::new();
    service.on_submit(201, query_body("pending", with_manifest));
    service.push_status(200, query_body("running", with_manifest));
    service.push_status(200, query_body("success", with_manifest));
    service.put_object(SHARD_A, gzip(b"\"1\",\"a\"\n"));
    service.put_object(SHARD_B, gzip(b"\"2\",\"b\"\n"));
    if with_manifest {
        service.put_object(MANIFEST_URL, manifest_json());
    }
    service
}

fn facade(config: ClientConfig, service: &Arc<FakeService>) -> (QueueryClient, Arc<ManualClock>) {
    init_tracing();
    let clock = Arc::new(ManualClock::new());
    let client = Client::with_transport(config, service.clone())
        .unwrap()
        .with_clock(clock.clone());
    (QueueryClient::with_client(client), clock)
}

// ═══════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════

#[test]
fn test_run_returns_raw_rows() {
    let service = finished_query(false);
    let (client, _) = facade(ClientConfig::new(ENDPOINT), &service);

    let stream = client.run("select id, title from recipes").unwrap();
    assert_eq!(stream.body().status(), &QueryStatus::Success);
    assert_eq!(stream.shard_count(), 2);

    let rows = stream.read().unwrap();
    assert_eq!(
        rows,
        vec![
            vec![Value::from("1"), Value::from("a")],
            vec![Value::from("2"), Value::from("b")],
        ]
    );
    assert!(service.requests_to(MANIFEST_URL).is_empty());
}

#[test]
fn test_run_returns_cast_rows() {
    let service = finished_query(true);
    let (client, _) = facade(ClientConfig::new(ENDPOINT).with_cast(true), &service);

    let stream = client.run("select id, title from recipes").unwrap();
    let rows = stream.read().unwrap();
    assert_eq!(
        rows,
        vec![
            vec![Value::Integer(1), Value::from("a")],
            vec![Value::Integer(2), Value::from("b")],
        ]
    );

    // Reading again re-fetches shards but reuses the cached manifest.
    assert_eq!(stream.read().unwrap().len(), 2);
    assert_eq!(service.requests_to(SHARD_A).len(), 2);
    assert_eq!(service.requests_to(MANIFEST_URL).len(), 1);
    assert_eq!(stream.shards_opened(), 4);

    let submit = &service.requests_to(SUBMIT_URL)[0];
    assert_eq!(submit.form_value("enable_metadata"), Some("true"));
    let poll = &service.requests_to(STATUS_URL)[0];
    assert_eq!(poll.form_value("fields"), Some("__default__,manifest_file_url"));
}

#[test]
fn test_raw_rows_ignore_cast_mode() {
    let service = finished_query(true);
    let (client, _) = facade(ClientConfig::new(ENDPOINT).with_cast(true), &service);

    let stream = client.run("select 1").unwrap();
    let raw: Vec<Vec<String>> = stream.raw_rows().collect::<QueueryResult<_>>().unwrap();
    assert_eq!(raw[1], vec!["2".to_string(), "b".to_string()]);
    assert!(service.requests_to(MANIFEST_URL).is_empty());
}

#[test]
fn test_materialize_rows() {
    let service = finished_query(false);
    let (client, _) = facade(ClientConfig::new(ENDPOINT), &service);

    let stream = client.run("select 1").unwrap();
    match stream.materialize(false).unwrap() {
        Materialized::Rows(rows) => assert_eq!(rows.len(), 2),
        #[allow(unreachable_patterns)]
        other => panic!("expected rows, got {other:?}"),
    }
}

#[cfg(feature = "arrow")]
#[test]
fn test_materialize_table() {
    let service = finished_query(true);
    let (client, _) = facade(ClientConfig::new(ENDPOINT).with_cast(true), &service);

    let stream = client.run("select 1").unwrap();
    match stream.materialize(true).unwrap() {
        Materialized::Table(batch) => {
            assert_eq!(batch.num_rows(), 2);
            assert_eq!(batch.schema().field(0).name(), "id");
        }
        other => panic!("expected table, got {other:?}"),
    }
}

#[cfg(not(feature = "arrow"))]
#[test]
fn test_materialize_table_needs_arrow() {
    let service = finished_query(false);
    let (client, _) = facade(ClientConfig::new(ENDPOINT), &service);

    let stream = client.run("select 1").unwrap();
    assert!(matches!(
        stream.materialize(true),
        Err(QueueryError::MissingDependency(_))
    ));
}

// ═══════════════════════════════════════════════════════
// POLLING
// ═══════════════════════════════════════════════════════

#[test]
fn test_polling_schedule() {
    let service = FakeService::new();
    service.on_submit(201, query_body("pending", false));
    service.push_status(200, query_body("pending", false));
    service.push_status(200, query_body("pending", false));
    service.push_status(200, query_body("success", false));
    let (client, clock) = facade(ClientConfig::new(ENDPOINT), &service);

    client.run("select 1").unwrap();
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(3), Duration::from_secs(6)]
    );
    assert_eq!(service.requests_to(STATUS_URL).len(), 3);
}

#[test]
fn test_polling_times_out() {
    let service = FakeService::new();
    service.on_submit(201, query_body("pending", false));
    for _ in 0..4 {
        service.push_status(200, query_body("running", false));
    }
    let (client, clock) = facade(ClientConfig::new(ENDPOINT).with_timeout(10), &service);

    let err = client.run("select 1").unwrap_err();
    assert!(matches!(err, QueueryError::Timeout { id: 1, timeout_secs: 10 }));
    // Checks at t=0, 3, 9 sleep; the check at t=18 is past the deadline.
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(3),
            Duration::from_secs(6),
            Duration::from_secs(9)
        ]
    );
}

#[test]
fn test_zero_timeout_checks_once() {
    let service = FakeService::new();
    service.on_submit(201, query_body("pending", false));
    service.push_status(200, query_body("running", false));
    let (client, clock) = facade(ClientConfig::new(ENDPOINT).with_timeout(0), &service);

    assert!(matches!(
        client.run("select 1"),
        Err(QueueryError::Timeout { .. })
    ));
    assert!(clock.sleeps().is_empty());
}

// ═══════════════════════════════════════════════════════
// FAILURES
// ═══════════════════════════════════════════════════════

#[test]
fn test_failed_query() {
    let service = FakeService::new();
    service.on_submit(201, query_body("pending", false));
    let mut failed = query_body("failed", false);
    failed["error"] = json!("relation \"recipes\" does not exist");
    service.push_status(200, failed);
    let (client, _) = facade(ClientConfig::new(ENDPOINT), &service);

    match client.run("select * from recipes") {
        Err(QueueryError::QueryFailed { status, message }) => {
            assert_eq!(status, QueryStatus::Failed);
            assert_eq!(
                message.as_deref(),
                Some("relation \"recipes\" does not exist")
            );
        }
        other => panic!("expected QueryFailed, got {other:?}"),
    }
}

#[test]
fn test_unexpected_submit_status() {
    let service = FakeService::new();
    service.on_submit(202, query_body("pending", false));
    let (client, _) = facade(ClientConfig::new(ENDPOINT), &service);

    let err = client.run("select 1").unwrap_err();
    assert!(matches!(err, QueueryError::Protocol(202)));
    assert!(err.to_string().contains("202"));
    assert!(service.requests_to(STATUS_URL).is_empty());
}

#[test]
fn test_submit_http_error() {
    let service = FakeService::new();
    service.on_submit(500, json!({"error": "boom"}));
    let (client, _) = facade(ClientConfig::new(ENDPOINT), &service);

    assert!(matches!(
        client.run("select 1"),
        Err(QueueryError::Transport { status: 500, .. })
    ));
}

#[test]
fn test_missing_shard_fails_read() {
    let service = finished_query(false);
    service.objects.lock().unwrap().remove(SHARD_B);
    let (client, _) = facade(ClientConfig::new(ENDPOINT), &service);

    let stream = client.run("select 1").unwrap();
    let mut rows = stream.iter();
    assert!(rows.next().unwrap().is_ok());
    assert!(matches!(
        rows.next(),
        Some(Err(QueueryError::Transport { status: 404, .. }))
    ));
    assert!(rows.next().is_none());
}

#[test]
fn test_cast_without_manifest_url() {
    let service = finished_query(false);
    let (client, _) = facade(ClientConfig::new(ENDPOINT).with_cast(true), &service);

    let stream = client.run("select 1").unwrap();
    assert!(matches!(
        stream.read(),
        Err(QueueryError::Configuration(_))
    ));
}

#[test]
fn test_credentials_sent_to_service_only() {
    let service = finished_query(false);
    let config = ClientConfig::new(ENDPOINT).with_token("token", "secret");
    let (client, _) = facade(config, &service);

    client.run("select 1").unwrap().read().unwrap();

    let submit = &service.requests_to(SUBMIT_URL)[0];
    assert_eq!(submit.credentials.as_ref().unwrap().token, "token");
    assert!(service.requests_to(STATUS_URL)[0].credentials.is_some());
    assert!(service.requests_to(SHARD_A)[0].credentials.is_none());
}

#[test]
fn test_empty_endpoint_rejected_at_construction() {
    std::env::remove_var("QUEUERY_ENDPOINT");

    assert!(matches!(
        QueueryClient::new(ClientConfig::new("")),
        Err(QueueryError::Configuration(_))
    ));
    assert!(matches!(
        Client::with_transport(ClientConfig::new(""), FakeService::new()),
        Err(QueueryError::Configuration(_))
    ));
}
