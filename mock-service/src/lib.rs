//! An in-process stand-in for the survey service.
//!
//! Answers every endpoint the survey journeys call from fixed fixtures, counts calls per
//! endpoint, keeps every submitted response, and can add latency or cap throughput.
use axum::{
    debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::debug;

pub mod prelude {
    pub use crate::{spawn, Fixtures, Latency, MockConfig, MockService, MockState, ENDPOINTS};
}

pub const ENDPOINTS: [&str; 7] = [
    "list",
    "info",
    "progress",
    "submit",
    "make-info",
    "result",
    "participants",
];

/// What the service answers with.
#[derive(Clone, Debug)]
pub struct Fixtures {
    pub surveys: Vec<String>,
    pub result_open: bool,
    pub progress: Value,
    pub result: Value,
    pub participants: Vec<String>,
}

impl Default for Fixtures {
    fn default() -> Self {
        Self {
            surveys: vec!["S1".to_string(), "S2".to_string()],
            result_open: true,
            progress: json!({"sections": [
                {"sectionId": 1, "questions": [
                    {"questionId": 10, "type": "SINGLE_CHOICE", "isRequired": true, "choices": ["A", "B"]},
                    {"questionId": 11, "type": "MULTIPLE_CHOICE", "isRequired": false, "choices": ["A", "B", "C"]}
                ]},
                {"sectionId": 2, "questions": [
                    {"questionId": 20, "type": "TEXT_RESPONSE", "isRequired": true}
                ]}
            ]}),
            result: json!({"sectionResults": [
                {"questionResults": [
                    {"questionId": 10, "responses": [{"content": "A"}, {"content": "B"}]},
                    {"questionId": 11, "responses": [{"content": "C"}]}
                ]}
            ]}),
            participants: vec!["P1".to_string(), "P2".to_string()],
        }
    }
}

/// Normally distributed response latency.
#[derive(Clone, Copy, Debug)]
pub struct Latency {
    pub mean: Duration,
    pub std_dev: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    pub fixtures: Fixtures,
    pub latency: Option<Latency>,
    /// Requests over this rate are answered with a 500.
    pub max_tps: Option<NonZeroU32>,
}

pub struct MockState {
    config: MockConfig,
    calls: HashMap<&'static str, AtomicU64>,
    submissions: Mutex<Vec<Value>>,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl MockState {
    pub fn new(config: MockConfig) -> Self {
        let limiter = config
            .max_tps
            .map(|tps| RateLimiter::direct(Quota::per_second(tps)));
        Self {
            config,
            calls: ENDPOINTS.iter().map(|e| (*e, AtomicU64::new(0))).collect(),
            submissions: Mutex::new(vec![]),
            limiter,
        }
    }

    pub fn calls(&self, endpoint: &str) -> u64 {
        self.calls
            .get(endpoint)
            .map(|count| count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fixtures(&self) -> &Fixtures {
        &self.config.fixtures
    }

    fn knows(&self, survey: &str) -> bool {
        self.fixtures().surveys.iter().any(|s| s == survey)
    }

    async fn hit(&self, endpoint: &'static str) -> Result<(), StatusCode> {
        if let Some(count) = self.calls.get(endpoint) {
            count.fetch_add(1, Ordering::Relaxed);
        }
        counter!("mock-service.requests", "endpoint" => endpoint).increment(1);

        if let Some(delay) = self.latency() {
            tokio::time::sleep(delay).await;
        }

        match &self.limiter {
            Some(limiter) if limiter.check().is_err() => {
                debug!(endpoint, "Over the rate limit");
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => Ok(()),
        }
    }

    fn latency(&self) -> Option<Duration> {
        let latency = self.config.latency?;
        let mean = latency.mean.as_secs_f64();
        let sampled = match Normal::new(mean, latency.std_dev.as_secs_f64()) {
            Ok(normal) => normal.sample(&mut rand::thread_rng()),
            Err(_) => mean,
        };
        Some(Duration::from_secs_f64(sampled.max(0.)))
    }
}

type AppState = State<Arc<MockState>>;

pub fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/api/v1/surveys/list", get(list))
        .route("/api/v1/surveys/info/:survey", get(info))
        .route("/api/v1/surveys/progress/:survey", get(progress))
        .route("/api/v1/surveys/response/fake/:survey", post(submit))
        .route("/api/v1/surveys/make-info/:survey", get(make_info))
        .route("/api/v1/surveys/management/result/:survey", post(result))
        .route(
            "/api/v1/surveys/management/participants/:survey",
            get(participants),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(Arc::new(MockState::new(config)))).await?;
    Ok(())
}

/// A running mock, stopped when dropped.
pub struct MockService {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockService {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve `config` on an ephemeral localhost port.
pub async fn spawn(config: MockConfig) -> anyhow::Result<MockService> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = Arc::new(MockState::new(config));
    let app = router(state.clone());

    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!("Mock service stopped: {err}");
        }
    });
    debug!(%addr, "Mock service listening");

    Ok(MockService {
        addr,
        state,
        handle,
    })
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitorQuery {
    visitor_id: String,
    participant_id: Option<String>,
}

#[debug_handler(state = Arc<MockState>)]
async fn list(
    State(state): AppState,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, StatusCode> {
    state.hit("list").await?;
    let surveys: Vec<Value> = state
        .fixtures()
        .surveys
        .iter()
        .take(query.size.unwrap_or(usize::MAX))
        .map(|id| json!({"surveyId": id}))
        .collect();
    Ok(Json(json!({ "surveys": surveys })))
}

#[debug_handler(state = Arc<MockState>)]
async fn info(
    State(state): AppState,
    Path(survey): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state.hit("info").await?;
    if !state.knows(&survey) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "surveyId": survey,
        "isResultOpen": state.fixtures().result_open,
    })))
}

#[debug_handler(state = Arc<MockState>)]
async fn progress(
    State(state): AppState,
    Path(survey): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state.hit("progress").await?;
    if !state.knows(&survey) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(state.fixtures().progress.clone()))
}

#[debug_handler(state = Arc<MockState>)]
async fn submit(
    State(state): AppState,
    Path(survey): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.hit("submit").await?;
    if !state.knows(&survey) {
        return Err(StatusCode::NOT_FOUND);
    }
    if !body["sectionResponses"].is_array() || !body["visitorId"].is_string() {
        return Err(StatusCode::BAD_REQUEST);
    }
    state
        .submissions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(body);
    Ok(Json(json!({})))
}

#[debug_handler(state = Arc<MockState>)]
async fn make_info(
    State(state): AppState,
    Path(survey): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state.hit("make-info").await?;
    if !state.knows(&survey) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({ "surveyId": survey })))
}

#[debug_handler(state = Arc<MockState>)]
async fn result(
    State(state): AppState,
    Path(survey): Path<String>,
    Query(query): Query<VisitorQuery>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.hit("result").await?;
    if !state.knows(&survey) {
        return Err(StatusCode::NOT_FOUND);
    }
    if !body["questionFilters"].is_array() || query.visitor_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if let Some(participant) = &query.participant_id {
        if !state.fixtures().participants.contains(participant) {
            return Err(StatusCode::NOT_FOUND);
        }
    }
    Ok(Json(state.fixtures().result.clone()))
}

#[debug_handler(state = Arc<MockState>)]
async fn participants(
    State(state): AppState,
    Path(survey): Path<String>,
    Query(query): Query<VisitorQuery>,
) -> Result<Json<Value>, StatusCode> {
    state.hit("participants").await?;
    if !state.knows(&survey) {
        return Err(StatusCode::NOT_FOUND);
    }
    debug!(visitor = %query.visitor_id, "Listing participants");
    let participants: Vec<Value> = state
        .fixtures()
        .participants
        .iter()
        .map(|id| json!({"participantId": id}))
        .collect();
    Ok(Json(json!({ "participants": participants })))
}
