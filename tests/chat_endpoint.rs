use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{stream, StreamExt};
use http_body_util::BodyExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use echo_lib::client::EchoClient;
use echo_lib::completion::{CompletionModel, CompletionRequest, TokenStream};
use echo_lib::conversation::{ChatEvent, ConversationBackend, ConversationEngine};
use echo_lib::models::{Emotion, Message};
use echo_lib::server::{create_router, ServerState};
use echo_lib::suggestions;
use echo_lib::{EchoError, Result};

/// Replies with fixed chunks, or fails before the first one
struct FakeModel {
    chunks: Vec<&'static str>,
    fail: bool,
}

#[async_trait]
impl CompletionModel for FakeModel {
    async fn stream_completion(&self, _request: CompletionRequest) -> Result<TokenStream> {
        if self.fail {
            return Err(EchoError::MissingCredentials("GROQ_API_KEY"));
        }
        let items: Vec<Result<String>> = self.chunks.iter().map(|c| Ok(c.to_string())).collect();
        Ok(Box::pin(stream::iter(items)))
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}

fn router_with(chunks: Vec<&'static str>, fail: bool) -> axum::Router {
    let engine = ConversationEngine::with_rng(Arc::new(FakeModel { chunks, fail }), StdRng::seed_from_u64(3));
    create_router(ServerState::new(engine, !fail, Duration::from_secs(5)))
}

fn chat_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn transcript(n: usize) -> Vec<Message> {
    let mut messages = vec![Message::user("我最近压力好大，怕做不完")];
    for i in 1..n {
        if i % 2 == 1 {
            messages.push(Message::assistant("我听到了"));
        } else {
            messages.push(Message::user("嗯"));
        }
    }
    messages
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_six_messages_end_with_terminal_event() {
    let app = router_with(vec!["谢谢你", "的分享"], false);
    let body = json!({ "messages": transcript(6) }).to_string();

    let response = app.oneshot(chat_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-vercel-ai-data-stream"], "v1");
    assert_eq!(response.headers()["content-type"], "text/plain; charset=utf-8");

    let text = body_text(response).await;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "0:\"谢谢你\"");
    assert_eq!(lines[1], "0:\"的分享\"");
    assert!(lines[2].starts_with("2:"));
    assert_eq!(lines[3], "d:{\"finishReason\":\"stop\"}");

    let data: Vec<Value> = serde_json::from_str(&lines[2][2..]).unwrap();
    assert_eq!(data[0]["shouldEnd"], true);
    assert_eq!(data[0]["result"]["emotion"], "anxiety");
    let title = data[0]["result"]["suggestion"]["title"].as_str().unwrap();
    assert!(["极简原型实验", "最坏清单", "2分钟原则"].contains(&title));
}

#[tokio::test]
async fn test_short_transcript_has_no_data_part() {
    let app = router_with(vec!["好累啊"], false);
    let messages = vec![
        Message::user("今天"),
        Message::assistant("嗯"),
        Message::user("有点"),
        Message::assistant("好累"),
    ];
    let body = json!({ "messages": messages }).to_string();

    let response = app.oneshot(chat_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(!text.lines().any(|l| l.starts_with("2:")));
    assert!(text.ends_with("d:{\"finishReason\":\"stop\"}\n"));
}

#[tokio::test]
async fn test_missing_messages_field_is_empty_transcript() {
    let app = router_with(vec!["嗨"], false);
    let response = app.oneshot(chat_request("{}".to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "0:\"嗨\"\nd:{\"finishReason\":\"stop\"}\n");
}

#[tokio::test]
async fn test_invalid_body_is_500() {
    let app = router_with(vec![], false);
    let response = app.oneshot(chat_request("{not json".to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body, json!({ "error": "Failed to process chat" }));
}

#[tokio::test]
async fn test_model_failure_is_500() {
    let app = router_with(vec![], true);
    let body = json!({ "messages": transcript(6) }).to_string();
    let response = app.oneshot(chat_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"], "Failed to process chat");
}

#[tokio::test]
async fn test_health() {
    let app = router_with(vec![], false);
    let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "fake-model");
    assert_eq!(body["credentials"], true);
}

#[tokio::test]
async fn test_client_against_live_server() {
    let app = router_with(vec!["我", "听到了"], false);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = EchoClient::new(&format!("http://{}", addr)).unwrap();
    let mut events = client
        .open(transcript(6), CancellationToken::new())
        .await
        .unwrap();

    let mut reply = String::new();
    let mut terminal = None;
    while let Some(event) = events.next().await {
        match event.unwrap() {
            ChatEvent::TextChunk(text) => reply.push_str(&text),
            ChatEvent::Terminal(t) => terminal = Some(t),
        }
    }

    assert_eq!(reply, "我听到了");
    let terminal = terminal.expect("terminal event");
    assert_eq!(terminal.result.emotion, Emotion::Anxiety);
    assert!(suggestions::belongs_to(Emotion::Anxiety, &terminal.result.suggestion));
}

#[tokio::test]
async fn test_client_surfaces_server_failure() {
    let app = router_with(vec![], true);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = EchoClient::new(&format!("http://{}", addr)).unwrap();
    let result = client.send(&transcript(2)).await;
    assert!(matches!(result, Err(EchoError::Provider { status: 500, .. })));
}
