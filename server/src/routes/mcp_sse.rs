use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use beacon_mcp_runtime::handle_http_jsonrpc;

use crate::state::AppState;

/// Outbound buffer per session; a batch request fans out to at most a
/// handful of responses, so a small bound is plenty.
const SESSION_CHANNEL_CAPACITY: usize = 32;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sse", get(sse_connect))
        .route("/messages", post(post_message))
}

/// Open an SSE session. The first event names the message-post endpoint for
/// this session; every JSON-RPC response posted there streams back as a
/// `message` event.
async fn sse_connect(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::now_v7().to_string();
    let (tx, rx) = mpsc::channel::<Value>(SESSION_CHANNEL_CAPACITY);
    state.register_session(session_id.clone(), tx.clone());
    tracing::info!(session_id = %session_id, "SSE session opened");

    // Drop the registry entry as soon as the client disconnects and the
    // receiver side goes away.
    {
        let state = state.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            tx.closed().await;
            state.remove_session(&session_id);
            tracing::info!(session_id = %session_id, "SSE session closed");
        });
    }

    let endpoint_event = Event::default()
        .event("endpoint")
        .data(format!("/messages?sessionId={session_id}"));
    let stream = tokio_stream::once(Ok(endpoint_event)).chain(
        ReceiverStream::new(rx)
            .map(|message| Ok(Event::default().event("message").data(message.to_string()))),
    );

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageQuery {
    session_id: String,
}

/// Accept one JSON-RPC payload (single message or batch) for a session and
/// stream the responses back over its SSE channel.
async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Json(payload): Json<Value>,
) -> Response {
    let Some(sender) = state.sender_for(&query.session_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "unknown_session",
                "message": "No open SSE session with that sessionId; reconnect to /sse first.",
            })),
        )
            .into_response();
    };

    let responses = handle_http_jsonrpc(state.config.clone(), payload).await;
    for response in responses {
        if sender.send(response).await.is_err() {
            state.remove_session(&query.session_id);
            return (
                StatusCode::GONE,
                Json(json!({
                    "error": "session_closed",
                    "message": "The SSE stream for this session has disconnected.",
                })),
            )
                .into_response();
        }
    }

    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response()
}

#[cfg(test)]
mod tests {
    use beacon_core::config::ApiConfig;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::state::AppState;

    #[tokio::test]
    async fn responses_route_to_the_session_channel() {
        let state = AppState::new(ApiConfig::new(None, "http://127.0.0.1:9"));
        let (tx, mut rx) = mpsc::channel(4);
        state.register_session("s1".to_string(), tx);

        let sender = state.sender_for("s1").expect("session must resolve");
        let responses = beacon_mcp_runtime::handle_http_jsonrpc(
            state.config.clone(),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }),
        )
        .await;
        for response in responses {
            sender.send(response).await.expect("channel must accept");
        }

        let delivered = rx.recv().await.expect("one response expected");
        assert_eq!(delivered["id"], 1);
        assert_eq!(delivered["result"], json!({}));
    }
}
