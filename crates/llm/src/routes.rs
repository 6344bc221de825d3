//! HTTP route glue: translates between the two client wire dialects and
//! [`Gateway`], the shared Kiro pipeline. One handler per public endpoint.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Router,
    extract::{Json, State},
    response::{IntoResponse, Sse, sse::Event},
    routing::{get, post},
};
use axum_serde::Sonic;
use futures::StreamExt;

use crate::error::{AnthropicError, OpenAiError};
use crate::kiro::Gateway;
use crate::messages::{
    AnthropicStreamState, anthropic, anthropic_request_to_unified, openai, openai_request_to_unified,
    unified_chunk_to_anthropic_events, unified_chunk_to_openai_chunk, unified_response_to_anthropic,
    unified_response_to_openai,
};

/// The OpenAI-dialect route group: chat completions, model listing, and
/// account status (all render a 401 in the OpenAI error shape).
pub fn openai_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/v1/accounts/status", get(account_status))
        .with_state(gateway)
}

/// The Anthropic-dialect route group: messages (renders a 401 in the
/// Anthropic error shape).
pub fn anthropic_router(gateway: Arc<Gateway>) -> Router {
    Router::new().route("/v1/messages", post(messages)).with_state(gateway)
}

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

async fn chat_completions(
    State(gateway): State<Arc<Gateway>>,
    Sonic(request): Sonic<openai::ChatCompletionRequest>,
) -> Result<impl IntoResponse, OpenAiError> {
    let streaming = request.stream;
    let unified_request = openai_request_to_unified(request)?;

    if !streaming {
        let response = gateway.complete(unified_request).await?;
        let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
        let rendered = unified_response_to_openai(response, &id, unix_now(), None);
        return Ok(Json(rendered).into_response());
    }

    let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
    let created = unix_now();
    let model = unified_request.model.clone();
    let chunks = gateway.stream(unified_request);

    let rendered = chunks.filter_map(move |result| {
        let id = id.clone();
        let model = model.clone();
        async move {
            match result {
                Ok(chunk) => unified_chunk_to_openai_chunk(&chunk, &id, created, &model).map(render_openai_event),
                Err(e) => {
                    log::error!("openai stream terminated early: {e}");
                    Some(render_openai_event(openai::ErrorResponse { error: openai::ErrorDetails {
                        message: "upstream request failed".to_string(),
                        kind: "upstream_error",
                        code: None,
                    } }))
                }
            }
        }
    });

    let done = futures::stream::once(async { Event::default().data("[DONE]") });
    let body = rendered.chain(done).map(Ok::<_, Infallible>);

    Ok(Sse::new(body).into_response())
}

fn render_openai_event(payload: impl serde::Serialize) -> Event {
    match serde_json::to_string(&payload) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            log::error!("failed to serialize an openai stream frame: {e}");
            Event::default().data(r#"{"error":{"message":"serialization failed","type":"internal_error"}}"#)
        }
    }
}

async fn messages(
    State(gateway): State<Arc<Gateway>>,
    Sonic(request): Sonic<anthropic::MessagesRequest>,
) -> Result<impl IntoResponse, AnthropicError> {
    let streaming = request.stream;
    let unified_request = anthropic_request_to_unified(request)?;

    if !streaming {
        let response = gateway.complete(unified_request).await?;
        let id = format!("msg_{}", uuid::Uuid::new_v4());
        let rendered = unified_response_to_anthropic(response, &id);
        return Ok(Json(rendered).into_response());
    }

    let id = format!("msg_{}", uuid::Uuid::new_v4());
    let model = unified_request.model.clone();
    let chunks = gateway.stream(unified_request);

    // `AnthropicStreamState` never itself emits the bracketing
    // `message_start`/`message_stop` events (it only reacts to content
    // chunks), so those two are synthesized here around the translated body.
    let start = anthropic::StreamEvent::MessageStart {
        message: anthropic::MessagesResponse {
            id: id.clone(),
            kind: "message",
            role: "assistant",
            model,
            content: vec![],
            stop_reason: anthropic::StopReason::EndTurn,
            stop_sequence: None,
            usage: anthropic::Usage { input_tokens: 0, output_tokens: 0 },
        },
    };

    let mut state = AnthropicStreamState::new();
    let translated = chunks.flat_map(move |result| {
        let events = match result {
            Ok(chunk) => unified_chunk_to_anthropic_events(&mut state, &chunk),
            Err(e) => {
                log::error!("anthropic stream terminated early: {e}");
                vec![anthropic::StreamEvent::Error {
                    error: anthropic::ErrorDetails { kind: "api_error", message: "upstream request failed".to_string() },
                }]
            }
        };
        futures::stream::iter(events)
    });

    let body = futures::stream::once(async move { start })
        .chain(translated)
        .chain(futures::stream::once(async { anthropic::StreamEvent::MessageStop }))
        .map(render_anthropic_event)
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(body).into_response())
}

fn render_anthropic_event(event: anthropic::StreamEvent) -> Event {
    let name = event.event_name();
    match serde_json::to_string(&event) {
        Ok(json) => Event::default().event(name).data(json),
        Err(e) => {
            log::error!("failed to serialize an anthropic stream frame: {e}");
            Event::default().event("error").data(r#"{"type":"error","error":{"type":"api_error","message":"serialization failed"}}"#)
        }
    }
}

/// Shared by both dialects: the OpenAI-shaped model list. Anthropic clients
/// that happen to call this path accept the same shape.
async fn list_models(State(gateway): State<Arc<Gateway>>) -> Json<openai::ModelsResponse> {
    let created = unix_now();
    let data = gateway
        .list_known_models()
        .await
        .into_iter()
        .map(|model| openai::Model { id: model.upstream_id, object: "model", created, owned_by: "kiro" })
        .collect();

    Json(openai::ModelsResponse { object: "list", data })
}

#[derive(serde::Serialize)]
struct AccountStatusResponse {
    accounts: Vec<crate::kiro::credentials::AccountStatus>,
}

async fn account_status(State(gateway): State<Arc<Gateway>>) -> Json<AccountStatusResponse> {
    Json(AccountStatusResponse { accounts: gateway.account_status().await })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_now_is_a_plausible_unix_timestamp() {
        // Anything after 2020-01-01 and comfortably before the year 2100.
        assert!(unix_now() > 1_577_836_800);
        assert!(unix_now() < 4_102_444_800);
    }

    #[test]
    fn openai_error_response_serializes_the_message() {
        let error = openai::ErrorResponse {
            error: openai::ErrorDetails { message: "boom".to_string(), kind: "upstream_error", code: None },
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("boom"));
        // render_openai_event must not panic on a value it can always serialize.
        let _ = render_openai_event(error);
    }

    #[test]
    fn anthropic_stream_event_name_matches_message_stop() {
        let event = anthropic::StreamEvent::MessageStop;
        assert_eq!(event.event_name(), "message_stop");
        let _ = render_anthropic_event(event);
    }
}
