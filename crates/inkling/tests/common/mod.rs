//! Common test utilities.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use tower::ServiceExt;

use inkling::agents::{AgentPipeline, PaperAssistant, RankingAgent};
use inkling::facts::MemoryFactStore;
use inkling::llm::{LanguageModel, ModelError};
use inkling::papers::{MemoryPaperSource, Paper};
use inkling::ranking::{ItemScore, MemoryRankingStore, RankingCache, ScoreError, Scorer};
use inkling::server::{self, AppState};
use inkling::store::{MemorySessionStore, SessionStore};
use inkling::turn::SessionCoordinator;

/// Language model double that replays queued responses.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedModel {
    pub fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ModelError::EmptyResponse)
    }
}

/// Scorer double: 5 when the context mentions "agent", otherwise 2.
pub struct FixedScorer;

#[async_trait]
impl Scorer for FixedScorer {
    async fn score(&self, context: &str) -> Result<ItemScore, ScoreError> {
        let score = if context.contains("agent") { 5 } else { 2 };
        Ok(ItemScore {
            score,
            reason: "test rationale".to_string(),
        })
    }
}

/// Papers for the fixed test date `2026-08-06`.
pub fn test_papers() -> Vec<Paper> {
    vec![
        Paper {
            id: "2601.20614".to_string(),
            title: "Difficulty-Aware Policy Optimization".to_string(),
            summary: "Reinforcement learning for mathematical reasoning.".to_string(),
            authors: vec!["A. Author".to_string()],
            upvotes: 93,
        },
        Paper {
            id: "2601.20209".to_string(),
            title: "Strategic Exploration for Long-Horizon agent Learning".to_string(),
            summary: "Language models as long-horizon agents.".to_string(),
            authors: vec!["B. Author".to_string()],
            upvotes: 12,
        },
    ]
}

/// Build an `AppState` around scripted model responses and in-memory stores.
///
/// Returns the state together with the session store for test introspection.
pub fn scripted_state(responses: &[&str]) -> (AppState, Arc<MemorySessionStore>) {
    let session_store = Arc::new(MemorySessionStore::new());
    let store: Arc<dyn SessionStore> = session_store.clone();

    let mut papers = MemoryPaperSource::default();
    papers.insert("2026-08-06", test_papers());

    let model = ScriptedModel::new(responses);
    let ranking = RankingAgent::new(
        Arc::new(papers),
        Arc::new(FixedScorer),
        RankingCache::new(Arc::new(MemoryRankingStore::new())),
        store.clone(),
        4,
    );
    let pipeline = Arc::new(PaperAssistant::new(
        model,
        ranking,
        store.clone(),
        Arc::new(MemoryFactStore::new()),
    ));

    let state = AppState {
        coordinator: Arc::new(SessionCoordinator::new(store)),
        pipeline,
        keep_alive_interval_seconds: 10,
    };
    (state, session_store)
}

/// Build an app around an arbitrary pipeline.
pub fn app_with_pipeline(pipeline: Arc<dyn AgentPipeline>) -> (Router, Arc<MemorySessionStore>) {
    let session_store = Arc::new(MemorySessionStore::new());
    let store: Arc<dyn SessionStore> = session_store.clone();
    let state = AppState {
        coordinator: Arc::new(SessionCoordinator::new(store)),
        pipeline,
        keep_alive_interval_seconds: 10,
    };
    (server::build_app(state, 30, 16), session_store)
}

/// Build a test app with scripted model responses.
pub fn scripted_app(responses: &[&str]) -> (Router, Arc<MemorySessionStore>) {
    let (state, store) = scripted_state(responses);
    (server::build_app(state, 30, 16), store)
}

/// POST a chat request and return the raw SSE body.
pub async fn post_chat(app: Router, user_id: &str, session_id: &str, query: &str) -> (u16, String) {
    let body = serde_json::json!({
        "user_id": user_id,
        "session_id": session_id,
        "query": query,
    });
    let response: Response<_> = app
        .oneshot(
            Request::post("/chat/stream")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// One parsed SSE event.
#[derive(Debug)]
pub struct SseEvent {
    pub name: String,
    pub data: serde_json::Value,
}

/// Parse an SSE body into events.
pub fn parse_sse(body: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    for block in body.split("\n\n") {
        let mut name = None;
        let mut data = None;
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("event: ") {
                name = Some(value.to_string());
            } else if let Some(value) = line.strip_prefix("data: ") {
                data = serde_json::from_str(value).ok();
            }
        }
        if let (Some(name), Some(data)) = (name, data) {
            events.push(SseEvent { name, data });
        }
    }
    events
}
