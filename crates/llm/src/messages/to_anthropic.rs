use super::anthropic;
use super::unified::*;

pub fn unified_response_to_anthropic(response: UnifiedResponse, id: &str) -> anthropic::MessagesResponse {
    let mut content = Vec::new();

    if let Some(reasoning) = &response.reasoning {
        content.push(anthropic::Content::Thinking { thinking: reasoning.clone() });
    }

    for item in response.content {
        match item {
            UnifiedContent::Text(text) => content.push(anthropic::Content::Text { text }),
            UnifiedContent::ToolUse(call) => content.push(anthropic::Content::ToolUse {
                id: call.id,
                name: call.name,
                input: serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Null),
            }),
            _ => {}
        }
    }

    anthropic::MessagesResponse {
        id: id.to_string(),
        kind: "message",
        role: "assistant",
        model: response.model,
        content,
        stop_reason: stop_reason(response.finish_reason),
        stop_sequence: None,
        usage: anthropic::Usage { input_tokens: response.usage.input_tokens, output_tokens: response.usage.output_tokens },
    }
}

fn stop_reason(reason: UnifiedFinishReason) -> anthropic::StopReason {
    match reason {
        UnifiedFinishReason::Stop => anthropic::StopReason::EndTurn,
        UnifiedFinishReason::MaxTokens => anthropic::StopReason::MaxTokens,
        UnifiedFinishReason::ToolUse => anthropic::StopReason::ToolUse,
    }
}

/// Per-stream bookkeeping needed to turn a flat `UnifiedChunk` sequence into
/// the Anthropic block-structured event sequence (open/close bracketing that
/// OpenAI's flat delta stream doesn't require).
#[derive(Default)]
pub struct AnthropicStreamState {
    open_block: Option<usize>,
    open_block_kind: Option<BlockKind>,
    next_index: usize,
}

impl AnthropicStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one chunk into zero or more events, opening/closing content
    /// blocks as needed so the client never sees a delta for an unopened block.
    pub fn push(&mut self, chunk: &UnifiedChunk) -> Vec<anthropic::StreamEvent> {
        let mut events = Vec::new();

        match chunk {
            UnifiedChunk::ReasoningDelta(text) => {
                self.ensure_block_open(&mut events, BlockKind::Thinking, String::new());
                events.push(anthropic::StreamEvent::ContentBlockDelta {
                    index: self.open_block.expect("ensured open"),
                    delta: anthropic::ContentDelta::ThinkingDelta { thinking: text.clone() },
                });
            }
            UnifiedChunk::TextDelta(text) => {
                self.ensure_block_open(&mut events, BlockKind::Text, String::new());
                events.push(anthropic::StreamEvent::ContentBlockDelta {
                    index: self.open_block.expect("ensured open"),
                    delta: anthropic::ContentDelta::TextDelta { text: text.clone() },
                });
            }
            UnifiedChunk::ToolUseStart { id, name, .. } => {
                self.close_open_block(&mut events);
                let index = self.next_index;
                self.next_index += 1;
                self.open_block = Some(index);
                events.push(anthropic::StreamEvent::ContentBlockStart {
                    index,
                    content_block: anthropic::ContentBlockStart::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: serde_json::json!({}),
                    },
                });
            }
            UnifiedChunk::ToolUseDelta { partial_json, .. } => {
                if let Some(index) = self.open_block {
                    events.push(anthropic::StreamEvent::ContentBlockDelta {
                        index,
                        delta: anthropic::ContentDelta::InputJsonDelta { partial_json: partial_json.clone() },
                    });
                }
            }
            UnifiedChunk::ToolUseStop { .. } => self.close_open_block(&mut events),
            UnifiedChunk::MessageDelta { finish_reason, usage } => {
                self.close_open_block(&mut events);
                events.push(anthropic::StreamEvent::MessageDelta {
                    delta: anthropic::MessageDeltaPayload { stop_reason: stop_reason(*finish_reason), stop_sequence: None },
                    usage: anthropic::Usage { input_tokens: usage.input_tokens, output_tokens: usage.output_tokens },
                });
            }
            UnifiedChunk::Error(message) => {
                events.push(anthropic::StreamEvent::Error {
                    error: anthropic::ErrorDetails { kind: "api_error", message: message.clone() },
                });
            }
        }

        events
    }

    fn ensure_block_open(&mut self, events: &mut Vec<anthropic::StreamEvent>, kind: BlockKind, seed: String) {
        if self.open_block.is_some() {
            if self.open_block_kind == Some(kind) {
                return;
            }
            self.close_open_block(events);
        }
        let index = self.next_index;
        self.next_index += 1;
        self.open_block = Some(index);
        self.open_block_kind = Some(kind);
        let content_block = match kind {
            BlockKind::Text => anthropic::ContentBlockStart::Text { text: seed },
            BlockKind::Thinking => anthropic::ContentBlockStart::Thinking { thinking: seed },
        };
        events.push(anthropic::StreamEvent::ContentBlockStart { index, content_block });
    }

    fn close_open_block(&mut self, events: &mut Vec<anthropic::StreamEvent>) {
        if let Some(index) = self.open_block.take() {
            self.open_block_kind = None;
            events.push(anthropic::StreamEvent::ContentBlockStop { index });
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
}

/// Convenience used by tests and simple call-sites wanting a one-shot
/// conversion without holding a `AnthropicStreamState` across calls.
pub fn unified_chunk_to_anthropic_events(state: &mut AnthropicStreamState, chunk: &UnifiedChunk) -> Vec<anthropic::StreamEvent> {
    state.push(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_block_opens_before_text_block() {
        let mut state = AnthropicStreamState::new();
        let mut events = Vec::new();
        events.extend(state.push(&UnifiedChunk::ReasoningDelta("hmm".to_string())));
        events.extend(state.push(&UnifiedChunk::TextDelta("answer".to_string())));

        assert!(matches!(
            events[0],
            anthropic::StreamEvent::ContentBlockStart { index: 0, content_block: anthropic::ContentBlockStart::Thinking { .. } }
        ));
        // switching from reasoning to text closes the thinking block first
        assert!(events.iter().any(|e| matches!(e, anthropic::StreamEvent::ContentBlockStop { index: 0 })));
        assert!(events.iter().any(|e| matches!(
            e,
            anthropic::StreamEvent::ContentBlockStart { index: 1, content_block: anthropic::ContentBlockStart::Text { .. } }
        )));
    }

    #[test]
    fn tool_use_closes_previous_block_first() {
        let mut state = AnthropicStreamState::new();
        state.push(&UnifiedChunk::TextDelta("partial".to_string()));
        let events = state.push(&UnifiedChunk::ToolUseStart { index: 0, id: "call_1".to_string(), name: "get_weather".to_string() });

        assert!(matches!(events[0], anthropic::StreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(events[1], anthropic::StreamEvent::ContentBlockStart { index: 1, .. }));
    }
}
