use super::openai;
use super::unified::*;

pub fn unified_response_to_openai(
    response: UnifiedResponse,
    id: &str,
    created: i64,
    reasoning: Option<String>,
) -> openai::ChatCompletionResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for content in response.content {
        match content {
            UnifiedContent::Text(t) => text.push_str(&t),
            UnifiedContent::ToolUse(call) => tool_calls.push(openai::ToolCall {
                id: call.id,
                kind: "function".to_string(),
                function: openai::FunctionCall { name: call.name, arguments: call.arguments },
            }),
            _ => {}
        }
    }

    openai::ChatCompletionResponse {
        id: id.to_string(),
        object: "chat.completion",
        created,
        model: response.model,
        choices: vec![openai::Choice {
            index: 0,
            message: openai::ResponseMessage {
                role: "assistant",
                content: if text.is_empty() { None } else { Some(text) },
                reasoning_content: reasoning.or(response.reasoning),
                tool_calls,
            },
            finish_reason: finish_reason_literal(response.finish_reason),
        }],
        usage: openai::Usage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        },
    }
}

fn finish_reason_literal(reason: UnifiedFinishReason) -> &'static str {
    match reason {
        UnifiedFinishReason::Stop => "stop",
        UnifiedFinishReason::MaxTokens => "length",
        UnifiedFinishReason::ToolUse => "tool_calls",
    }
}

/// Convert one streamed chunk into an OpenAI `data:` frame payload, or `None`
/// for chunks that do not directly correspond to an OpenAI delta shape
/// (e.g. `ToolUseStop`, which OpenAI doesn't separately signal).
pub fn unified_chunk_to_openai_chunk(
    chunk: &UnifiedChunk,
    id: &str,
    created: i64,
    model: &str,
) -> Option<openai::ChatCompletionChunk> {
    let base = |delta: openai::ChunkDelta, finish_reason: Option<&'static str>| openai::ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk",
        created,
        model: model.to_string(),
        choices: vec![openai::ChunkChoice { index: 0, delta, finish_reason }],
    };

    match chunk {
        UnifiedChunk::TextDelta(text) => {
            Some(base(openai::ChunkDelta { content: Some(text.clone()), ..Default::default() }, None))
        }
        UnifiedChunk::ReasoningDelta(text) => {
            Some(base(openai::ChunkDelta { reasoning_content: Some(text.clone()), ..Default::default() }, None))
        }
        UnifiedChunk::ToolUseStart { index, id: call_id, name } => Some(base(
            openai::ChunkDelta {
                tool_calls: vec![openai::ChunkToolCall {
                    index: *index,
                    id: Some(call_id.clone()),
                    kind: Some("function"),
                    function: openai::ChunkFunctionCall { name: Some(name.clone()), arguments: None },
                }],
                ..Default::default()
            },
            None,
        )),
        UnifiedChunk::ToolUseDelta { index, partial_json } => Some(base(
            openai::ChunkDelta {
                tool_calls: vec![openai::ChunkToolCall {
                    index: *index,
                    id: None,
                    kind: None,
                    function: openai::ChunkFunctionCall { name: None, arguments: Some(partial_json.clone()) },
                }],
                ..Default::default()
            },
            None,
        )),
        UnifiedChunk::ToolUseStop { .. } => None,
        UnifiedChunk::MessageDelta { finish_reason, .. } => {
            Some(base(openai::ChunkDelta::default(), Some(finish_reason_literal(*finish_reason))))
        }
        UnifiedChunk::Error(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_becomes_content_delta() {
        let chunk = UnifiedChunk::TextDelta("hi".to_string());
        let rendered = unified_chunk_to_openai_chunk(&chunk, "id", 0, "model").unwrap();
        assert_eq!(rendered.choices[0].delta.content.as_deref(), Some("hi"));
    }

    #[test]
    fn tool_use_stop_has_no_openai_equivalent_frame() {
        let chunk = UnifiedChunk::ToolUseStop { index: 0 };
        assert!(unified_chunk_to_openai_chunk(&chunk, "id", 0, "model").is_none());
    }
}
