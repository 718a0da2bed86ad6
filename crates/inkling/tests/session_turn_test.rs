//! End-to-end session consistency tests.

mod common;

use std::sync::Arc;

use async_trait::async_trait;

use inkling::agents::{AgentPipeline, PipelineError, TurnContext, TurnOutput};
use inkling::message::ChatMessage;
use inkling::session::SessionKey;
use inkling::store::SessionStore;

use common::{app_with_pipeline, parse_sse, post_chat};

/// Appends the query after a read-modify-write delay, mimicking a pipeline
/// that holds state across a model call.
struct SlowEchoPipeline;

#[async_trait]
impl AgentPipeline for SlowEchoPipeline {
    async fn run(&self, ctx: TurnContext<'_>) -> Result<TurnOutput, PipelineError> {
        // The prior history length is captured before the await, so a lost
        // update would manifest as a duplicate turn number.
        let turn_number = ctx.history.len() / 2 + 1;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let reply = format!("turn {turn_number}");
        Ok(TurnOutput {
            reply: reply.clone(),
            messages: vec![ChatMessage::user(ctx.query), ChatMessage::assistant(&reply)],
        })
    }
}

#[tokio::test]
async fn concurrent_requests_same_session_keep_both_messages() {
    let (app, store) = app_with_pipeline(Arc::new(SlowEchoPipeline));

    let first = tokio::spawn(post_chat(app.clone(), "alice", "chat1", "first"));
    let second = tokio::spawn(post_chat(app.clone(), "alice", "chat1", "second"));

    let (status_a, body_a) = first.await.unwrap();
    let (status_b, body_b) = second.await.unwrap();
    assert_eq!(status_a, 200);
    assert_eq!(status_b, 200);

    // Both turns completed with a done event.
    assert_eq!(parse_sse(&body_a).last().unwrap().name, "done");
    assert_eq!(parse_sse(&body_b).last().unwrap().name, "done");

    // No lost update: all four messages landed, in lock-acquisition order.
    let key = SessionKey::new("alice", "chat1").unwrap();
    let history = SessionStore::history(store.as_ref(), &key).await.unwrap();
    assert_eq!(history.len(), 4);

    let user_messages: Vec<_> = history
        .iter()
        .filter(|m| m.role == inkling::message::Role::User)
        .map(|m| m.content_str().to_string())
        .collect();
    let mut sorted = user_messages.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["first", "second"]);

    // Each turn saw the other's committed history: turn numbers are unique.
    let replies: Vec<_> = history
        .iter()
        .filter(|m| m.role == inkling::message::Role::Assistant)
        .map(|m| m.content_str().to_string())
        .collect();
    assert!(replies.contains(&"turn 1".to_string()));
    assert!(replies.contains(&"turn 2".to_string()));
}

#[tokio::test]
async fn concurrent_requests_different_sessions_do_not_interfere() {
    let (app, store) = app_with_pipeline(Arc::new(SlowEchoPipeline));

    let first = tokio::spawn(post_chat(app.clone(), "alice", "chat1", "for alice"));
    let second = tokio::spawn(post_chat(app.clone(), "bob", "chat1", "for bob"));
    first.await.unwrap();
    second.await.unwrap();

    let alice = SessionKey::new("alice", "chat1").unwrap();
    let bob = SessionKey::new("bob", "chat1").unwrap();

    let alice_history = SessionStore::history(store.as_ref(), &alice).await.unwrap();
    let bob_history = SessionStore::history(store.as_ref(), &bob).await.unwrap();
    assert_eq!(alice_history.len(), 2);
    assert_eq!(bob_history.len(), 2);
    assert_eq!(alice_history[0].content_str(), "for alice");
    assert_eq!(bob_history[0].content_str(), "for bob");
}
