//! Everything specific to the Kiro/CodeWhisperer upstream: wire framing,
//! credential management, format conversion, and the streaming translator,
//! tied together by [`Gateway`], the one shared-state owner every route
//! handler dispatches through.

pub mod auth_client;
pub mod chunk;
pub mod credentials;
pub mod eventstream;
pub mod format;
pub mod http;
pub mod models;
pub mod streaming;
pub mod thinking;
pub mod truncation;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use config::{Config, ReasoningConfig};
use futures::{Stream, StreamExt};

use crate::error::GatewayError;
use crate::messages::unified::{
    UnifiedChunk, UnifiedContent, UnifiedFinishReason, UnifiedRequest, UnifiedResponse, UnifiedToolCall, UnifiedUsage,
};
use credentials::{AccountStatus, CredentialPool};
use models::{ModelCache, ModelEntry};

const SEND_MESSAGE_URL_TEMPLATE: &str = "https://q.{region}.amazonaws.com/SendMessageStreaming";

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<UnifiedChunk, GatewayError>> + Send>>;

/// Owns every piece of shared mutable state (credential pool, model cache,
/// HTTP client) and the config needed to drive a request through the
/// pipeline. Constructed once at startup, shared by `Arc` across handlers.
pub struct Gateway {
    pub credentials: Arc<CredentialPool>,
    pub models: ModelCache,
    http: reqwest::Client,
    region: String,
    profile_arn: Option<String>,
    first_byte_timeout: Duration,
    reasoning: ReasoningConfig,
    truncation_recovery: bool,
}

impl Gateway {
    pub fn new(config: &Config) -> Arc<Self> {
        let http = match &config.vpn_proxy_url {
            Some(proxy_url) => crate::http_client::proxied_http_client(proxy_url).unwrap_or_else(|e| {
                log::warn!("failed to build a proxied http client ({e}), falling back to the default client");
                crate::http_client::http_client().clone()
            }),
            None => crate::http_client::http_client().clone(),
        };

        let credentials = CredentialPool::new(config.accounts.clone(), config.region.clone(), http.clone());

        Arc::new(Self {
            credentials,
            models: ModelCache::new(),
            http,
            region: config.region.clone(),
            profile_arn: config.profile_arn.clone(),
            first_byte_timeout: config.first_byte_timeout,
            reasoning: config.reasoning.clone(),
            truncation_recovery: config.truncation_recovery,
        })
    }

    pub fn spawn_background_refreshers(self: &Arc<Self>, shutdown: tokio_util::sync::CancellationToken) {
        self.credentials.spawn_background_refreshers(shutdown);
    }

    pub async fn account_status(&self) -> Vec<AccountStatus> {
        self.credentials.snapshot().await
    }

    pub async fn resolve_model(&self, alias: &str) -> ModelEntry {
        self.models.resolve(alias, &self.credentials, &self.http, &self.region, self.first_byte_timeout).await
    }

    pub async fn list_known_models(&self) -> Vec<ModelEntry> {
        self.models.list_known().await
    }

    /// Non-streaming completion: drives the pipeline (with truncation
    /// recovery applied) and returns one fully-aggregated response.
    pub async fn complete(self: &Arc<Self>, request: UnifiedRequest) -> Result<UnifiedResponse, GatewayError> {
        let recovery_enabled = self.truncation_recovery;
        truncation::drive_with_recovery(self.as_ref(), request, recovery_enabled).await
    }

    /// Streaming completion: yields unified chunks as they arrive,
    /// transparently splicing in continuation turns when the upstream
    /// truncates at `maxTokens` and recovery is enabled.
    pub fn stream(self: &Arc<Self>, request: UnifiedRequest) -> ChunkStream {
        let state = StreamRecoveryState {
            gateway: Arc::clone(self),
            request,
            inner: None,
            buffer: String::new(),
            continuations: 0,
            output_tokens_so_far: 0,
            done: false,
        };

        Box::pin(futures::stream::unfold(state, advance_stream_recovery))
    }

    async fn dispatch_and_translate(&self, request: &UnifiedRequest) -> Result<ChunkStream, GatewayError> {
        let model = self.resolve_model(&request.model).await;
        let body = format::build_kiro_request(request, &model.upstream_id, self.profile_arn.as_deref());
        let url = SEND_MESSAGE_URL_TEMPLATE.replace("{region}", &self.region);

        let dispatched = http::dispatch(&self.credentials, &self.http, &url, &body, self.first_byte_timeout).await?;

        Ok(Box::pin(streaming::translate_response_stream(dispatched.response, self.reasoning.clone())))
    }
}

#[async_trait::async_trait]
impl truncation::Dispatch for Gateway {
    async fn dispatch_once(&self, request: &UnifiedRequest) -> Result<UnifiedResponse, GatewayError> {
        let model = request.model.clone();
        let stream = self.dispatch_and_translate(request).await?;
        aggregate(stream, model).await
    }
}

/// Collapses a unified chunk stream into one response, for the
/// non-streaming routes (which still talk to a streaming-only upstream).
async fn aggregate(mut stream: ChunkStream, model: String) -> Result<UnifiedResponse, GatewayError> {
    struct ToolAccum {
        id: String,
        name: String,
        json: String,
    }

    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tools: std::collections::BTreeMap<usize, ToolAccum> = std::collections::BTreeMap::new();
    let mut finish_reason = UnifiedFinishReason::Stop;
    let mut usage = UnifiedUsage::default();

    while let Some(item) = stream.next().await {
        match item? {
            UnifiedChunk::TextDelta(delta) => text.push_str(&delta),
            UnifiedChunk::ReasoningDelta(delta) => reasoning.push_str(&delta),
            UnifiedChunk::ToolUseStart { index, id, name } => {
                tools.insert(index, ToolAccum { id, name, json: String::new() });
            }
            UnifiedChunk::ToolUseDelta { index, partial_json } => {
                if let Some(accum) = tools.get_mut(&index) {
                    accum.json.push_str(&partial_json);
                }
            }
            UnifiedChunk::ToolUseStop { .. } => {}
            UnifiedChunk::MessageDelta { finish_reason: fr, usage: u } => {
                finish_reason = fr;
                usage = u;
            }
            UnifiedChunk::Error(message) => return Err(GatewayError::upstream(message, None)),
        }
    }

    let mut content = Vec::new();
    if !text.is_empty() {
        content.push(UnifiedContent::Text(text));
    }
    for accum in tools.into_values() {
        content.push(UnifiedContent::ToolUse(UnifiedToolCall { id: accum.id, name: accum.name, arguments: accum.json }));
    }

    Ok(UnifiedResponse { model, content, reasoning: (!reasoning.is_empty()).then_some(reasoning), finish_reason, usage })
}

struct StreamRecoveryState {
    gateway: Arc<Gateway>,
    request: UnifiedRequest,
    inner: Option<ChunkStream>,
    buffer: String,
    continuations: u32,
    output_tokens_so_far: u32,
    done: bool,
}

async fn advance_stream_recovery(mut state: StreamRecoveryState) -> Option<(Result<UnifiedChunk, GatewayError>, StreamRecoveryState)> {
    loop {
        if state.done {
            return None;
        }

        if state.inner.is_none() {
            match state.gateway.dispatch_and_translate(&state.request).await {
                Ok(stream) => state.inner = Some(stream),
                Err(e) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
            }
        }

        let next_item = state.inner.as_mut().expect("just set above").next().await;

        match next_item {
            None => {
                state.done = true;
                return None;
            }
            Some(Err(e)) => {
                state.done = true;
                return Some((Err(e), state));
            }
            Some(Ok(UnifiedChunk::TextDelta(text))) => {
                state.buffer.push_str(&text);
                return Some((Ok(UnifiedChunk::TextDelta(text)), state));
            }
            Some(Ok(UnifiedChunk::MessageDelta { finish_reason: UnifiedFinishReason::MaxTokens, usage })) => {
                let can_continue = state.gateway.truncation_recovery
                    && state.continuations < truncation::MAX_CONTINUATIONS
                    && state
                        .request
                        .max_tokens
                        .map(|cap| state.output_tokens_so_far + usage.output_tokens < cap)
                        .unwrap_or(true);

                if !can_continue {
                    return Some((
                        Ok(UnifiedChunk::MessageDelta { finish_reason: UnifiedFinishReason::MaxTokens, usage }),
                        state,
                    ));
                }

                state.continuations += 1;
                state.output_tokens_so_far += usage.output_tokens;
                log::info!("streaming upstream truncated at maxTokens, issuing continuation {}/{}", state.continuations, truncation::MAX_CONTINUATIONS);

                let partial = std::mem::take(&mut state.buffer);
                let partial_response = UnifiedResponse {
                    model: state.request.model.clone(),
                    content: vec![UnifiedContent::Text(partial)],
                    reasoning: None,
                    finish_reason: UnifiedFinishReason::MaxTokens,
                    usage,
                };
                let request = state.request.clone();
                state.request = truncation::build_continuation_request(request, &partial_response);
                state.inner = None;
                continue;
            }
            Some(Ok(chunk)) => return Some((Ok(chunk), state)),
        }
    }
}
