//! HTTP API integration tests
//!
//! Exercise the submission adapter and status surfaces over the real router
//! with mocked ports. Scheduling behavior is covered by the scheduler's own
//! integration tests; here the dispatcher is deliberately not running so
//! admitted jobs stay queued and observable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use labelpress_adapters::{AppConfig, ZebraControl, ZebraControlConfig};
use labelpress_core::{
    BreakerRegistry, PageGeometry, PrintError, PrinterDirectory, PrinterRecord, PrinterStatus,
    Renderer, RendererStatus, Result as CoreResult,
};
use labelpress_scheduler::{MetricsAggregator, PrintQueue, QueueConfig};
use labelpress_server::api_router::build_router;
use labelpress_server::middleware::RateLimiter;
use labelpress_server::state::AppState;

// ===== Mock Implementations =====

struct MockDirectory {
    printers: parking_lot::Mutex<Vec<PrinterRecord>>,
    discovery_ok: AtomicBool,
}

impl MockDirectory {
    fn online(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            printers: parking_lot::Mutex::new(
                names
                    .iter()
                    .map(|n| PrinterRecord::new(*n, PrinterStatus::Online))
                    .collect(),
            ),
            discovery_ok: AtomicBool::new(true),
        })
    }

    fn set_status(&self, name: &str, status: PrinterStatus) {
        let mut printers = self.printers.lock();
        if let Some(r) = printers.iter_mut().find(|r| r.name == name) {
            r.status = status;
        }
    }
}

impl PrinterDirectory for MockDirectory {
    fn list(&self) -> Vec<PrinterRecord> {
        self.printers.lock().clone()
    }

    fn get(&self, name: &str) -> Option<PrinterRecord> {
        self.printers.lock().iter().find(|r| r.name == name).cloned()
    }

    fn check_available(&self, name: &str) -> CoreResult<()> {
        match self.get(name) {
            None => Err(PrintError::UnavailablePrinter(format!(
                "printer '{}' not found",
                name
            ))),
            Some(r) if r.status != PrinterStatus::Online => Err(PrintError::UnavailablePrinter(
                format!("printer '{}' is {}", name, r.status),
            )),
            Some(_) => Ok(()),
        }
    }

    fn discovery_ok(&self) -> bool {
        self.discovery_ok.load(Ordering::SeqCst)
    }

    fn mark_job_start(&self, _name: &str) {}

    fn mark_job_end(&self, _name: &str, _success: bool) {}
}

struct MockRenderer;

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, _html: &str, _geometry: &PageGeometry) -> CoreResult<Vec<u8>> {
        Ok(b"%PDF-1.7 mock".to_vec())
    }

    async fn status(&self) -> RendererStatus {
        RendererStatus {
            available: true,
            ..RendererStatus::default()
        }
    }

    async fn recycle(&self) -> CoreResult<()> {
        Ok(())
    }
}

// ===== Harness =====

struct Harness {
    app: Router,
    queue: PrintQueue,
    directory: Arc<MockDirectory>,
    _work_dir: tempfile::TempDir,
}

fn harness_with(directory: Arc<MockDirectory>, rate_limit_max: u32) -> Harness {
    let work_dir = tempfile::tempdir().unwrap();
    let config = Arc::new(AppConfig::default());
    let queue = PrintQueue::new(QueueConfig::default());
    let state = AppState {
        queue: queue.clone(),
        printers: directory.clone(),
        breakers: Arc::new(BreakerRegistry::default()),
        renderer: Arc::new(MockRenderer),
        metrics: Arc::new(MetricsAggregator::new()),
        zebra: Arc::new(ZebraControl::new(ZebraControlConfig {
            work_dir: work_dir.path().to_path_buf(),
            ..ZebraControlConfig::default()
        })),
        config,
        rate_limiter: Arc::new(RateLimiter::new(
            rate_limit_max,
            Duration::from_secs(900),
        )),
        started_at: Instant::now(),
    };
    Harness {
        app: build_router(state),
        queue,
        directory,
        _work_dir: work_dir,
    }
}

fn harness() -> Harness {
    harness_with(MockDirectory::online(&["P_OK"]), 10_000)
}

fn label_json(printer: &str) -> Value {
    json!({
        "printerName": printer,
        "htmlContent": BASE64.encode("<html><body>badge</body></html>"),
        "printMedia": "Label",
        "margin": { "top": "0.05in", "right": "0.05in", "bottom": "0.05in", "left": "0.05in" },
        "width": "2in",
        "height": "1in",
        "copies": 1,
        "userId": 7,
        "name": "shelf label"
    })
}

fn submit_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/print/submit")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ===== Tests =====

#[tokio::test]
async fn submit_admits_all_labels() {
    let h = harness();
    let body = json!({
        "labels": [label_json("P_OK"), label_json("P_OK")],
        "metadata": { "priority": "high" }
    });

    let response = h.app.clone().oneshot(submit_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["successfulJobs"].as_array().unwrap().len(), 2);
    assert_eq!(json["failedLabels"].as_array().unwrap().len(), 0);
    assert!(json["processingTime"].is_number());
    assert_eq!(h.queue.status().queued, 2);
}

#[tokio::test]
async fn submit_reports_partial_success_per_label() {
    let h = harness();
    let body = json!({
        "labels": [label_json("P_OK"), label_json("P_MISSING"), label_json("P_OK")],
        "metadata": { "priority": "medium" }
    });

    let response = h.app.clone().oneshot(submit_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let json = body_json(response).await;
    assert_eq!(json["successfulJobs"].as_array().unwrap().len(), 2);
    let failed = json["failedLabels"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["printerName"], "P_MISSING");
    assert!(failed[0]["error"].as_str().unwrap().contains("not found"));
    assert_eq!(failed[0]["userId"], 7);
}

#[tokio::test]
async fn submit_with_no_reachable_printer_is_bad_request() {
    let h = harness();
    let body = json!({
        "labels": [label_json("P_MISSING")],
    });

    let response = h.app.clone().oneshot(submit_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["successfulJobs"].as_array().unwrap().len(), 0);
    assert_eq!(json["failedLabels"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_base64_rejects_whole_batch_before_queueing() {
    let h = harness();
    let mut bad = label_json("P_OK");
    bad["htmlContent"] = json!("definitely%%%not-base64!");
    let body = json!({ "labels": [label_json("P_OK"), bad] });

    let response = h.app.clone().oneshot(submit_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("base64"));
    // Atomic validation: the valid first label was not admitted either.
    assert_eq!(h.queue.status().queued, 0);
}

#[tokio::test]
async fn empty_batch_is_a_validation_error() {
    let h = harness();
    let body = json!({ "labels": [] });
    let response = h.app.clone().oneshot(submit_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn out_of_range_copies_is_a_validation_error() {
    let h = harness();
    let mut label = label_json("P_OK");
    label["copies"] = json!(11);
    let body = json!({ "labels": [label] });

    let response = h.app.clone().oneshot(submit_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("copies"));
}

#[tokio::test]
async fn job_status_roundtrip() {
    let h = harness();
    let body = json!({ "labels": [label_json("P_OK")] });
    let response = h.app.clone().oneshot(submit_request(&body)).await.unwrap();
    let json = body_json(response).await;
    let id = json["successfulJobs"][0].as_str().unwrap().to_string();

    let response = h
        .app
        .clone()
        .oneshot(get_request(&format!("/api/print/status/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["job"]["id"], id.as_str());
    assert_eq!(json["job"]["state"], "queued");
    assert_eq!(json["job"]["request"]["printerName"], "P_OK");
}

#[tokio::test]
async fn unknown_job_id_is_not_found() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(get_request(
            "/api/print/status/00000000-0000-4000-8000-000000000000",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Non-UUID ids are simply unknown jobs, not server errors.
    let response = h
        .app
        .clone()
        .oneshot(get_request("/api/print/status/nonsense"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_endpoint_exposes_snapshot() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(get_request("/api/print/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["metrics"]["totalJobs"].is_number());
    assert!(json["performance"]["averageProcessingTimeMs"].is_number());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn printers_endpoint_lists_known_printers() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(get_request("/api/print/printers"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["totalPrinters"], 1);
    assert_eq!(json["onlinePrinters"], 1);
    assert_eq!(json["printers"][0]["name"], "P_OK");
}

#[tokio::test]
async fn printers_endpoint_degrades_with_warning() {
    let directory = MockDirectory::online(&[]);
    directory.discovery_ok.store(false, Ordering::SeqCst);
    let h = harness_with(directory, 10_000);

    let response = h
        .app
        .clone()
        .oneshot(get_request("/api/print/printers"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["printers"].as_array().unwrap().len(), 0);
    assert_eq!(json["warning"], "discovery timed out");
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(get_request("/api/print/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["uptimeSecs"].is_number());
}

#[tokio::test]
async fn zebra_reset_validates_printer_first() {
    let h = harness();

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/print/zebra/reset-media/NOPE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    h.directory.set_status("P_OK", PrinterStatus::Offline);
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/print/zebra/reset-media/P_OK")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rate_limit_rejects_past_window_max() {
    let h = harness_with(MockDirectory::online(&["P_OK"]), 2);

    for _ in 0..2 {
        let response = h
            .app
            .clone()
            .oneshot(get_request("/api/print/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = h
        .app
        .clone()
        .oneshot(get_request("/api/print/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn duplicate_submissions_get_distinct_job_ids() {
    let h = harness();
    let body = json!({ "labels": [label_json("P_OK")] });

    let first = body_json(h.app.clone().oneshot(submit_request(&body)).await.unwrap()).await;
    let second = body_json(h.app.clone().oneshot(submit_request(&body)).await.unwrap()).await;
    assert_ne!(first["successfulJobs"][0], second["successfulJobs"][0]);
}

#[tokio::test]
async fn queue_full_lands_in_failed_labels() {
    let directory = MockDirectory::online(&["P_OK"]);
    let work_dir = tempfile::tempdir().unwrap();
    let queue = PrintQueue::new(QueueConfig {
        max_size: 1,
        ..QueueConfig::default()
    });
    let state = AppState {
        queue: queue.clone(),
        printers: directory.clone(),
        breakers: Arc::new(BreakerRegistry::default()),
        renderer: Arc::new(MockRenderer),
        metrics: Arc::new(MetricsAggregator::new()),
        zebra: Arc::new(ZebraControl::new(ZebraControlConfig {
            work_dir: work_dir.path().to_path_buf(),
            ..ZebraControlConfig::default()
        })),
        config: Arc::new(AppConfig::default()),
        rate_limiter: Arc::new(RateLimiter::new(10_000, Duration::from_secs(900))),
        started_at: Instant::now(),
    };
    let app = build_router(state);

    let body = json!({ "labels": [label_json("P_OK"), label_json("P_OK")] });
    let response = app.oneshot(submit_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let json = body_json(response).await;
    assert_eq!(json["successfulJobs"].as_array().unwrap().len(), 1);
    let failed = json["failedLabels"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0]["error"]
        .as_str()
        .unwrap()
        .contains("maximum capacity"));
}
