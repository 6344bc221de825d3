//! Streaming translator: wires the event-stream decoder, the chunk mapper,
//! and the thinking extractor together into a sequence of
//! [`UnifiedChunk`]s, applying finish-reason mapping, tool-use index
//! assignment, and the `FAKE_REASONING_HANDLING` modes.

use std::collections::{HashMap, VecDeque};

use config::{FakeReasoningHandling, ReasoningConfig};
use futures::{Stream, StreamExt};

use crate::error::GatewayError;
use crate::kiro::chunk::{UpstreamChunk, frame_to_chunk};
use crate::kiro::eventstream::FrameDecoder;
use crate::kiro::thinking::ThinkingExtractor;
use crate::messages::unified::{UnifiedChunk, UnifiedFinishReason, UnifiedUsage};

/// Kiro `endTurn` → `stop`; `toolUse` → `tool_use`; `maxTokens` → `max_tokens`;
/// anything else is an abnormal termination, mapped to `stop` with a WARNING.
fn finish_reason_for(literal: &str) -> UnifiedFinishReason {
    match literal {
        "endTurn" => UnifiedFinishReason::Stop,
        "toolUse" => UnifiedFinishReason::ToolUse,
        "maxTokens" => UnifiedFinishReason::MaxTokens,
        other => {
            log::warn!("upstream stream ended with unrecognized stop reason {other:?}, mapping to stop");
            UnifiedFinishReason::Stop
        }
    }
}

/// Drives one upstream chunk sequence into a unified chunk sequence. Pure
/// and synchronous: the async byte-level plumbing lives in
/// [`translate_response_stream`], which is a thin wrapper around this.
pub struct StreamTranslator {
    extractor: ThinkingExtractor,
    reasoning: ReasoningConfig,
    tool_index: HashMap<String, usize>,
    next_index: usize,
    saw_reasoning: bool,
}

impl StreamTranslator {
    pub fn new(reasoning: ReasoningConfig) -> Self {
        Self {
            extractor: ThinkingExtractor::new(reasoning.max_tokens),
            reasoning,
            tool_index: HashMap::new(),
            next_index: 0,
            saw_reasoning: false,
        }
    }

    /// Feed one upstream chunk, returning zero or more unified chunks.
    pub fn feed(&mut self, chunk: UpstreamChunk) -> Vec<UnifiedChunk> {
        match chunk {
            UpstreamChunk::AssistantTextDelta(text) => {
                let emission = self.extractor.push(&text);
                self.emit(emission)
            }
            UpstreamChunk::ToolUseStart { id, name } => {
                let index = self.index_for(id.clone());
                vec![UnifiedChunk::ToolUseStart { index, id, name }]
            }
            UpstreamChunk::ToolUseDelta { id, partial_json } => {
                let index = self.index_for(id);
                vec![UnifiedChunk::ToolUseDelta { index, partial_json }]
            }
            UpstreamChunk::ToolUseStop { id } => {
                let index = self.index_for(id);
                vec![UnifiedChunk::ToolUseStop { index }]
            }
            UpstreamChunk::Metadata { stop_reason, input_tokens, output_tokens } => {
                let Some(reason) = stop_reason else {
                    // A metadata frame without a stop reason is a mid-stream
                    // usage update; the dialect renderers only expect one
                    // `MessageDelta`, emitted once the stop reason is known.
                    return Vec::new();
                };
                vec![UnifiedChunk::MessageDelta {
                    finish_reason: finish_reason_for(&reason),
                    usage: UnifiedUsage { input_tokens, output_tokens },
                }]
            }
            UpstreamChunk::Error(message) => vec![UnifiedChunk::Error(message)],
        }
    }

    /// Call once the frame stream has ended. Flushes any lookahead left
    /// buffered in the thinking extractor and, under
    /// `synthetic-on-missing`, appends a placeholder reasoning chunk if no
    /// thinking block was ever produced. The placeholder necessarily lands
    /// at the end of the stream rather than before the visible text it
    /// "explains": by the time absence is known, any visible text is
    /// already emitted, and a streaming pipeline cannot reorder the past.
    pub fn finish(self) -> Vec<UnifiedChunk> {
        let StreamTranslator { extractor, reasoning, saw_reasoning, .. } = self;
        let emission = extractor.finish();
        let saw_reasoning = saw_reasoning || !emission.reasoning.is_empty();

        let mut out = Vec::new();
        if !emission.reasoning.is_empty() && !matches!(reasoning.handling, FakeReasoningHandling::Strip) {
            out.push(UnifiedChunk::ReasoningDelta(emission.reasoning));
        }
        if !emission.visible.is_empty() {
            out.push(UnifiedChunk::TextDelta(emission.visible));
        }

        if reasoning.enabled && matches!(reasoning.handling, FakeReasoningHandling::SyntheticOnMissing) && !saw_reasoning
        {
            out.push(UnifiedChunk::ReasoningDelta("Thinking it through.".to_string()));
        }

        out
    }

    fn index_for(&mut self, id: String) -> usize {
        *self.tool_index.entry(id).or_insert_with(|| {
            let index = self.next_index;
            self.next_index += 1;
            index
        })
    }

    fn emit(&mut self, emission: crate::kiro::thinking::Emission) -> Vec<UnifiedChunk> {
        let mut out = Vec::new();

        if !emission.reasoning.is_empty() {
            self.saw_reasoning = true;
            if !matches!(self.reasoning.handling, FakeReasoningHandling::Strip) {
                out.push(UnifiedChunk::ReasoningDelta(emission.reasoning));
            }
        }

        if !emission.visible.is_empty() {
            out.push(UnifiedChunk::TextDelta(emission.visible));
        }

        out
    }
}

struct ResponseState {
    byte_stream: std::pin::Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>,
    decoder: FrameDecoder,
    translator: Option<StreamTranslator>,
    pending: VecDeque<UnifiedChunk>,
    done: bool,
    saw_terminal: bool,
}

fn is_terminal(chunk: &UnifiedChunk) -> bool {
    matches!(chunk, UnifiedChunk::MessageDelta { .. } | UnifiedChunk::Error(_))
}

/// Translate a raw Kiro HTTP response body into a stream of unified chunks.
pub fn translate_response_stream(
    response: reqwest::Response,
    reasoning: ReasoningConfig,
) -> impl Stream<Item = Result<UnifiedChunk, GatewayError>> {
    let state = ResponseState {
        byte_stream: Box::pin(response.bytes_stream()),
        decoder: FrameDecoder::new(),
        translator: Some(StreamTranslator::new(reasoning)),
        pending: VecDeque::new(),
        done: false,
        saw_terminal: false,
    };

    futures::stream::unfold(state, step)
}

/// Advance the state machine by one emitted item: drain anything already
/// buffered, otherwise pull and decode the next chunk of bytes from the
/// upstream body. Factored out of [`translate_response_stream`] so it can be
/// driven directly in tests against a synthetic byte stream.
async fn step(mut state: ResponseState) -> Option<(Result<UnifiedChunk, GatewayError>, ResponseState)> {
    loop {
        if let Some(chunk) = state.pending.pop_front() {
            return Some((Ok(chunk), state));
        }

        if state.done {
            return None;
        }

        match state.byte_stream.next().await {
            Some(Ok(bytes)) => {
                state.decoder.feed(&bytes);
                match state.decoder.drain_frames() {
                    Ok(frames) => {
                        for frame in &frames {
                            match frame_to_chunk(frame) {
                                Ok(Some(upstream_chunk)) => {
                                    if let Some(translator) = state.translator.as_mut() {
                                        let chunks = translator.feed(upstream_chunk);
                                        if chunks.iter().any(is_terminal) {
                                            state.saw_terminal = true;
                                        }
                                        state.pending.extend(chunks);
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    state.done = true;
                                    return Some((Err(e), state));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                }
            }
            Some(Err(e)) => {
                state.done = true;
                let status = e.status().map(|s| s.as_u16());
                return Some((Err(GatewayError::upstream(e.to_string(), status)), state));
            }
            None => {
                state.done = true;
                if let Some(translator) = state.translator.take() {
                    state.pending.extend(translator.finish());
                }
                if !state.saw_terminal {
                    log::warn!("unexpected stream termination: upstream closed without a stop-reason frame");
                    state.pending.push_back(UnifiedChunk::MessageDelta {
                        finish_reason: UnifiedFinishReason::Stop,
                        usage: UnifiedUsage::default(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_reasoning() -> ReasoningConfig {
        ReasoningConfig { enabled: true, max_tokens: 4000, handling: FakeReasoningHandling::Passthrough }
    }

    #[test]
    fn end_turn_maps_to_stop() {
        assert_eq!(finish_reason_for("endTurn"), UnifiedFinishReason::Stop);
        assert_eq!(finish_reason_for("toolUse"), UnifiedFinishReason::ToolUse);
        assert_eq!(finish_reason_for("maxTokens"), UnifiedFinishReason::MaxTokens);
        assert_eq!(finish_reason_for("somethingWeird"), UnifiedFinishReason::Stop);
    }

    #[test]
    fn plain_text_passes_through_as_a_single_delta() {
        let mut translator = StreamTranslator::new(default_reasoning());
        let out = translator.feed(UpstreamChunk::AssistantTextDelta("hello".to_string()));
        assert_eq!(out, vec![UnifiedChunk::TextDelta("hello".to_string())]);
    }

    #[test]
    fn thinking_tags_split_into_reasoning_and_text_deltas() {
        let mut translator = StreamTranslator::new(default_reasoning());
        let mut out = translator.feed(UpstreamChunk::AssistantTextDelta("<thinking>secret</thinking>answer".to_string()));
        out.extend(translator.finish());
        assert_eq!(
            out,
            vec![UnifiedChunk::ReasoningDelta("secret".to_string()), UnifiedChunk::TextDelta("answer".to_string())]
        );
    }

    #[test]
    fn strip_mode_drops_reasoning_entirely() {
        let reasoning = ReasoningConfig { enabled: true, max_tokens: 4000, handling: FakeReasoningHandling::Strip };
        let mut translator = StreamTranslator::new(reasoning);
        let out = translator.feed(UpstreamChunk::AssistantTextDelta("<thinking>secret</thinking>answer".to_string()));
        assert_eq!(out, vec![UnifiedChunk::TextDelta("answer".to_string())]);
    }

    #[test]
    fn synthetic_on_missing_injects_a_placeholder_when_no_thinking_block_occurred() {
        let reasoning =
            ReasoningConfig { enabled: true, max_tokens: 4000, handling: FakeReasoningHandling::SyntheticOnMissing };
        let mut translator = StreamTranslator::new(reasoning);
        translator.feed(UpstreamChunk::AssistantTextDelta("answer, no thinking here".to_string()));
        let out = translator.finish();
        assert!(matches!(out.last(), Some(UnifiedChunk::ReasoningDelta(_))));
    }

    #[test]
    fn synthetic_on_missing_stays_quiet_when_a_thinking_block_was_seen() {
        let reasoning =
            ReasoningConfig { enabled: true, max_tokens: 4000, handling: FakeReasoningHandling::SyntheticOnMissing };
        let mut translator = StreamTranslator::new(reasoning);
        translator.feed(UpstreamChunk::AssistantTextDelta("<thinking>secret</thinking>answer".to_string()));
        let out = translator.finish();
        assert!(!out.iter().any(|c| matches!(c, UnifiedChunk::ReasoningDelta(t) if t == "Thinking it through.")));
    }

    #[test]
    fn repeated_tool_use_ids_share_the_same_index() {
        let mut translator = StreamTranslator::new(default_reasoning());
        let start = translator.feed(UpstreamChunk::ToolUseStart { id: "t1".to_string(), name: "get_weather".to_string() });
        let delta =
            translator.feed(UpstreamChunk::ToolUseDelta { id: "t1".to_string(), partial_json: "{}".to_string() });
        let stop = translator.feed(UpstreamChunk::ToolUseStop { id: "t1".to_string() });

        assert_eq!(start, vec![UnifiedChunk::ToolUseStart { index: 0, id: "t1".to_string(), name: "get_weather".to_string() }]);
        assert_eq!(delta, vec![UnifiedChunk::ToolUseDelta { index: 0, partial_json: "{}".to_string() }]);
        assert_eq!(stop, vec![UnifiedChunk::ToolUseStop { index: 0 }]);
    }

    #[test]
    fn distinct_tool_use_ids_get_distinct_indices() {
        let mut translator = StreamTranslator::new(default_reasoning());
        translator.feed(UpstreamChunk::ToolUseStart { id: "a".to_string(), name: "x".to_string() });
        let second = translator.feed(UpstreamChunk::ToolUseStart { id: "b".to_string(), name: "y".to_string() });
        assert_eq!(second, vec![UnifiedChunk::ToolUseStart { index: 1, id: "b".to_string(), name: "y".to_string() }]);
    }

    #[test]
    fn metadata_without_stop_reason_is_a_silent_usage_update() {
        let mut translator = StreamTranslator::new(default_reasoning());
        let out = translator.feed(UpstreamChunk::Metadata { stop_reason: None, input_tokens: 3, output_tokens: 0 });
        assert!(out.is_empty());
    }

    fn state_with(bytes: Vec<reqwest::Result<bytes::Bytes>>) -> ResponseState {
        ResponseState {
            byte_stream: Box::pin(futures::stream::iter(bytes)),
            decoder: FrameDecoder::new(),
            translator: Some(StreamTranslator::new(default_reasoning())),
            pending: VecDeque::new(),
            done: false,
            saw_terminal: false,
        }
    }

    async fn drain(mut state: ResponseState) -> Vec<UnifiedChunk> {
        let mut out = Vec::new();
        while let Some((item, next)) = step(state).await {
            out.push(item.expect("no decode errors in these fixtures"));
            state = next;
        }
        out
    }

    #[tokio::test]
    async fn connection_closed_without_a_stop_reason_synthesizes_a_stop_delta() {
        let chunks = drain(state_with(Vec::new())).await;
        assert_eq!(
            chunks,
            vec![UnifiedChunk::MessageDelta { finish_reason: UnifiedFinishReason::Stop, usage: UnifiedUsage::default() }]
        );
    }

    #[tokio::test]
    async fn connection_closed_after_a_stop_reason_does_not_synthesize_one() {
        let mut state = state_with(Vec::new());
        let chunks = state.translator.as_mut().unwrap().feed(UpstreamChunk::Metadata {
            stop_reason: Some("endTurn".to_string()),
            input_tokens: 1,
            output_tokens: 1,
        });
        assert!(chunks.iter().any(is_terminal));
        state.saw_terminal = true;
        state.pending.extend(chunks);

        let out = drain(state).await;
        assert_eq!(out.iter().filter(|c| matches!(c, UnifiedChunk::MessageDelta { .. })).count(), 1);
    }

    #[test]
    fn metadata_with_stop_reason_emits_message_delta() {
        let mut translator = StreamTranslator::new(default_reasoning());
        let out = translator.feed(UpstreamChunk::Metadata {
            stop_reason: Some("endTurn".to_string()),
            input_tokens: 5,
            output_tokens: 9,
        });
        assert_eq!(
            out,
            vec![UnifiedChunk::MessageDelta {
                finish_reason: UnifiedFinishReason::Stop,
                usage: UnifiedUsage { input_tokens: 5, output_tokens: 9 },
            }]
        );
    }
}
