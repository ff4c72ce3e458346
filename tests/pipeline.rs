//! End-to-end pipeline runs against an in-process fake of the IBGE API and
//! an object store.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use ipca_pipeline::ingestion::config::PipelineConfig;
use ipca_pipeline::ingestion::pipeline::run_pipeline;
use ipca_pipeline::ingestion::utils::http_client;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const EXPECTED_CSV: &str = "date;Location;IPCA\n\
01/2024;Brasil;0,42\n\
02/2024;Brasil;0,83\n\
01/2024;Sao Paulo;0,34\n\
02/2024;Sao Paulo;0,91\n";

#[derive(Default)]
struct Fake {
    /// Requests to fail with 503 before answering normally
    ready_failures: AtomicU32,
    data_failures: AtomicU32,
    upload_failures: AtomicU32,
    ready_calls: AtomicU32,
    data_calls: AtomicU32,
    head_calls: AtomicU32,
    objects: Mutex<HashMap<String, (String, Option<String>)>>,
}

impl Fake {
    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn object(&self, key: &str) -> Option<(String, Option<String>)> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

fn ibge_response() -> Value {
    json!([{
        "id": "63",
        "variavel": "IPCA - Variação mensal",
        "unidade": "%",
        "resultados": [{
            "classificacoes": [{ "id": "315", "nome": "Geral, grupo, subgrupo, item e subitem" }],
            "series": [
                {
                    "localidade": { "id": "1", "nivel": { "id": "N1", "nome": "Brasil" }, "nome": "Brasil" },
                    "serie": { "202401": "0.42", "202402": "0.83" }
                },
                {
                    "localidade": { "id": "3550308", "nivel": { "id": "N7", "nome": "Região Metropolitana" }, "nome": "São Paulo" },
                    "serie": { "202401": "0.34", "202402": "0.91" }
                }
            ]
        }]
    }])
}

async fn ready(State(fake): State<Arc<Fake>>) -> StatusCode {
    fake.ready_calls.fetch_add(1, Ordering::SeqCst);
    if Fake::take_failure(&fake.ready_failures) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn data(State(fake): State<Arc<Fake>>) -> Result<Json<Value>, StatusCode> {
    fake.data_calls.fetch_add(1, Ordering::SeqCst);
    if Fake::take_failure(&fake.data_failures) {
        return Err(StatusCode::BAD_GATEWAY);
    }
    Ok(Json(ibge_response()))
}

async fn head_object(State(fake): State<Arc<Fake>>) -> StatusCode {
    fake.head_calls.fetch_add(1, Ordering::SeqCst);
    if fake.object("IPCA.csv").is_some() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn put_object(
    State(fake): State<Arc<Fake>>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> StatusCode {
    if Fake::take_failure(&fake.upload_failures) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    let auth = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = String::from_utf8(body.to_vec()).unwrap();
    fake.objects
        .lock()
        .unwrap()
        .insert("IPCA.csv".to_string(), (text, auth));
    StatusCode::OK
}

async fn spawn_fake(fake: Arc<Fake>) -> String {
    let app = Router::new()
        .route("/ready", get(ready))
        .route("/data", get(data))
        .route(
            "/ibgeapiairflow/IPCA.csv",
            axum::routing::put(put_object).head(head_object),
        )
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn test_config(base: &str, extra: &[(&str, &str)]) -> PipelineConfig {
    let mut vars: HashMap<String, String> = [
        ("IBGE_BASE_URL", base),
        ("IBGE_READY_ENDPOINT", "/ready"),
        ("IBGE_DATA_ENDPOINT", "/data"),
        ("STORAGE_ENDPOINT", base),
        ("PIPELINE_RETRY_DELAY_SECS", "0"),
        ("SENSOR_POKE_INTERVAL_SECS", "0"),
        ("SENSOR_TIMEOUT_SECS", "5"),
        ("HTTP_TIMEOUT_SECS", "5"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    PipelineConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

#[tokio::test]
async fn test_pipeline_uploads_tidy_csv() {
    let fake = Arc::new(Fake::default());
    let base = spawn_fake(fake.clone()).await;
    let config = test_config(&base, &[("STORAGE_TOKEN", "s3cr3t")]);
    let client = http_client(config.http_timeout).unwrap();

    let stats = run_pipeline(&client, &config).await.unwrap();

    assert_eq!(stats.regions, 2);
    assert_eq!(stats.periods, 2);
    assert_eq!(stats.rows, 4);
    assert_eq!(stats.bytes_uploaded, EXPECTED_CSV.len());
    assert_eq!(stats.object_key, "IPCA.csv");

    let (body, auth) = fake.object("IPCA.csv").unwrap();
    assert_eq!(body, EXPECTED_CSV);
    assert_eq!(auth.as_deref(), Some("Bearer s3cr3t"));
}

#[tokio::test]
async fn test_sensor_pokes_until_ready() {
    let fake = Arc::new(Fake::default());
    fake.ready_failures.store(3, Ordering::SeqCst);
    let base = spawn_fake(fake.clone()).await;
    let config = test_config(&base, &[]);
    let client = http_client(config.http_timeout).unwrap();

    let stats = run_pipeline(&client, &config).await.unwrap();

    // Sensor keeps poking within a single attempt
    assert_eq!(stats.sensor_attempts, 1);
    assert_eq!(fake.ready_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_network_steps_are_retried() {
    let fake = Arc::new(Fake::default());
    fake.data_failures.store(2, Ordering::SeqCst);
    fake.upload_failures.store(1, Ordering::SeqCst);
    let base = spawn_fake(fake.clone()).await;
    let config = test_config(&base, &[]);
    let client = http_client(config.http_timeout).unwrap();

    let stats = run_pipeline(&client, &config).await.unwrap();

    assert_eq!(stats.fetch_attempts, 3);
    assert_eq!(stats.upload_attempts, 2);
    assert_eq!(fake.object("IPCA.csv").unwrap().0, EXPECTED_CSV);
}

#[tokio::test]
async fn test_fetch_gives_up_after_retries() {
    let fake = Arc::new(Fake::default());
    fake.data_failures.store(10, Ordering::SeqCst);
    let base = spawn_fake(fake.clone()).await;
    let config = test_config(&base, &[("PIPELINE_RETRIES", "2")]);
    let client = http_client(config.http_timeout).unwrap();

    let err = run_pipeline(&client, &config).await.unwrap_err();

    assert!(err.to_string().contains("fetch failed after 3 attempts"));
    assert_eq!(fake.data_calls.load(Ordering::SeqCst), 3);
    assert!(fake.object("IPCA.csv").is_none());
}

#[tokio::test]
async fn test_existing_object_blocks_upload_without_replace() {
    let fake = Arc::new(Fake::default());
    fake.objects
        .lock()
        .unwrap()
        .insert("IPCA.csv".to_string(), ("old".to_string(), None));
    let base = spawn_fake(fake.clone()).await;
    let config = test_config(&base, &[("STORAGE_REPLACE", "false")]);
    let client = http_client(config.http_timeout).unwrap();

    let err = run_pipeline(&client, &config).await.unwrap_err();

    assert!(format!("{:#}", err).contains("already exists"));
    assert!(err.to_string().contains("upload failed after 1 attempts"));
    // A conflict is final, so the default retries are not spent on it
    assert_eq!(fake.head_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fake.object("IPCA.csv").unwrap().0, "old");
}

#[tokio::test]
async fn test_replace_overwrites_and_writes_local_copy() {
    let fake = Arc::new(Fake::default());
    fake.objects
        .lock()
        .unwrap()
        .insert("IPCA.csv".to_string(), ("old".to_string(), None));
    let base = spawn_fake(fake.clone()).await;
    let temp = tempfile::tempdir().unwrap();
    let local = temp.path().join("IPCA.csv");
    let config = test_config(&base, &[("OUTPUT_PATH", local.to_str().unwrap())]);
    let client = http_client(config.http_timeout).unwrap();

    run_pipeline(&client, &config).await.unwrap();

    assert_eq!(fake.object("IPCA.csv").unwrap().0, EXPECTED_CSV);
    assert_eq!(std::fs::read_to_string(local).unwrap(), EXPECTED_CSV);
}
