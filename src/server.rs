//! HTTP surface: `POST /api/chat` streaming endpoint and a health probe.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::EchoConfig;
use crate::conversation::{ConversationEngine, EventStream};
use crate::error::{EchoError, Result};
use crate::groq::GroqClient;
use crate::logging;
use crate::models::Message;
use crate::wire::{self, FinishReason, StreamPart};

const FAILURE_BODY: &str = "Failed to process chat";
const STREAM_FAILURE: &str = "An error occurred.";

#[derive(Clone)]
pub struct ServerState {
    engine: ConversationEngine,
    has_credentials: bool,
    max_duration: Duration,
}

impl ServerState {
    pub fn new(engine: ConversationEngine, has_credentials: bool, max_duration: Duration) -> Self {
        Self {
            engine,
            has_credentials,
            max_duration,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<Message>,
}

impl IntoResponse for EchoError {
    fn into_response(self) -> Response {
        logging::log_error(None, &format!("Chat request failed: {}", self));
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": FAILURE_BODY })),
        )
            .into_response()
    }
}

pub fn create_router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Run the endpoint until ctrl-c
pub async fn serve(config: &EchoConfig) -> Result<()> {
    let model = GroqClient::from_config(config)?;
    if !model.has_credentials() {
        logging::log_provider(None, "GROQ_API_KEY is not set; chat requests will fail");
    }
    let has_credentials = model.has_credentials();
    let engine = ConversationEngine::new(Arc::new(model));
    let app = create_router(ServerState::new(engine, has_credentials, config.max_duration));

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    logging::log_conversation(None, &format!("Echo endpoint listening on http://{}", bind_address));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    logging::log_conversation(None, "Echo endpoint stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        logging::log_error(None, &format!("Failed to listen for shutdown signal: {}", e));
        std::future::pending::<()>().await;
    }
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.engine.model_name(),
        "credentials": state.has_credentials,
    }))
}

// The body is parsed by hand so a malformed request gets the same 500 as a model failure
async fn chat_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return EchoError::from(e).into_response(),
    };

    let deadline = Instant::now() + state.max_duration;
    let cancel = CancellationToken::new();

    let started = tokio::time::timeout_at(deadline, state.engine.respond(request.messages, cancel.clone())).await;
    let events = match started {
        Ok(Ok(events)) => events,
        Ok(Err(e)) => return e.into_response(),
        Err(_) => {
            return EchoError::Stream("model did not respond in time".to_string()).into_response()
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, wire::CONTENT_TYPE),
            (HeaderName::from_static(wire::STREAM_HEADER), wire::STREAM_VERSION),
        ],
        Body::from_stream(encode_body(events, cancel, deadline)),
    )
        .into_response()
}

fn encoded(part: StreamPart) -> String {
    part.encode()
        .unwrap_or_else(|_| "d:{\"finishReason\":\"error\"}\n".to_string())
}

/// Encode chat events as data-stream lines, ending with a finish part.
/// Dropping the body (client gone) cancels the reply.
fn encode_body(
    mut events: EventStream,
    cancel: CancellationToken,
    deadline: Instant,
) -> impl Stream<Item = std::result::Result<String, Infallible>> + Send {
    async_stream::stream! {
        let _cancel_on_drop = cancel.drop_guard();
        let timer = tokio::time::sleep_until(deadline);
        tokio::pin!(timer);

        let mut failure: Option<String> = None;
        loop {
            let next = tokio::select! {
                _ = &mut timer => None,
                item = events.next() => Some(item),
            };
            let Some(item) = next else {
                failure = Some("response time limit reached".to_string());
                break;
            };

            match item {
                Some(Ok(event)) => match StreamPart::from_event(&event).and_then(|p| p.encode()) {
                    Ok(line) => yield Ok(line),
                    Err(e) => {
                        failure = Some(e.to_string());
                        break;
                    }
                },
                Some(Err(e)) => {
                    failure = Some(e.to_string());
                    break;
                }
                None => break,
            }
        }

        let reason = match failure {
            Some(message) => {
                logging::log_error(None, &format!("Reply stream failed: {}", message));
                yield Ok(encoded(StreamPart::Error(STREAM_FAILURE.to_string())));
                FinishReason::Error
            }
            None => FinishReason::Stop,
        };
        yield Ok(encoded(StreamPart::Finish(reason)));
    }
}
