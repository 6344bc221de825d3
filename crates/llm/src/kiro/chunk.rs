//! Typed chunk records: maps a decoded event-stream frame's `:event-type`
//! and JSON payload onto the upstream chunk record shape.

use crate::error::GatewayError;
use crate::kiro::eventstream::Frame;

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamChunk {
    AssistantTextDelta(String),
    ToolUseStart { id: String, name: String },
    ToolUseDelta { id: String, partial_json: String },
    ToolUseStop { id: String },
    /// `messageMetadataEvent` carries usage and (once, at the end) the stop
    /// reason in the same frame.
    Metadata { stop_reason: Option<String>, input_tokens: u32, output_tokens: u32 },
    Error(String),
}

/// Maps one decoded frame to zero (unknown event-types are skipped with a
/// WARNING) or one chunk record.
pub fn frame_to_chunk(frame: &Frame) -> Result<Option<UpstreamChunk>, GatewayError> {
    if let Some(message_type) = frame.message_type() {
        if message_type == "error" || message_type == "exception" {
            let payload = frame.payload_json()?;
            let message = payload
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("upstream reported an error")
                .to_string();
            return Ok(Some(UpstreamChunk::Error(message)));
        }
    }

    let Some(event_type) = frame.event_type() else {
        log::warn!("event-stream frame carried no :event-type header, skipping");
        return Ok(None);
    };

    let payload = frame.payload_json()?;

    let chunk = match event_type {
        "assistantResponseEvent" => {
            let content = payload.get("content").and_then(|v| v.as_str()).unwrap_or_default();
            UpstreamChunk::AssistantTextDelta(content.to_string())
        }
        "toolUseEvent" => {
            let id = payload.get("toolUseId").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let stop = payload.get("stop").and_then(|v| v.as_bool()).unwrap_or(false);

            if stop {
                UpstreamChunk::ToolUseStop { id }
            } else if let Some(name) = payload.get("name").and_then(|v| v.as_str()) {
                UpstreamChunk::ToolUseStart { id, name: name.to_string() }
            } else {
                let partial_json = payload.get("input").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                UpstreamChunk::ToolUseDelta { id, partial_json }
            }
        }
        "messageMetadataEvent" => {
            let input_tokens = payload.get("inputTokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let output_tokens = payload.get("outputTokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let stop_reason = payload.get("stopReason").and_then(|v| v.as_str()).map(str::to_string);

            UpstreamChunk::Metadata { stop_reason, input_tokens, output_tokens }
        }
        other => {
            log::warn!("unknown event-stream event-type {other:?}, skipping");
            return Ok(None);
        }
    };

    Ok(Some(chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiro::eventstream::encode_frame;
    use crate::kiro::eventstream::FrameDecoder;

    fn decode_one(headers: &[(&str, &str)], payload: &[u8]) -> Frame {
        let bytes = encode_frame(headers, payload);
        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes);
        decoder.drain_frames().unwrap().remove(0)
    }

    #[test]
    fn text_delta_is_extracted_from_content_field() {
        let frame = decode_one(&[(":event-type", "assistantResponseEvent")], br#"{"content":"hi"}"#);
        let chunk = frame_to_chunk(&frame).unwrap().unwrap();
        assert_eq!(chunk, UpstreamChunk::AssistantTextDelta("hi".to_string()));
    }

    #[test]
    fn tool_use_start_is_recognized_by_presence_of_name() {
        let frame = decode_one(
            &[(":event-type", "toolUseEvent")],
            br#"{"toolUseId":"t1","name":"get_weather"}"#,
        );
        let chunk = frame_to_chunk(&frame).unwrap().unwrap();
        assert_eq!(chunk, UpstreamChunk::ToolUseStart { id: "t1".to_string(), name: "get_weather".to_string() });
    }

    #[test]
    fn stop_frame_carries_the_finish_reason() {
        let frame = decode_one(
            &[(":event-type", "messageMetadataEvent")],
            br#"{"stopReason":"end_turn","inputTokens":5,"outputTokens":7}"#,
        );
        let chunk = frame_to_chunk(&frame).unwrap().unwrap();
        assert_eq!(
            chunk,
            UpstreamChunk::Metadata { stop_reason: Some("end_turn".to_string()), input_tokens: 5, output_tokens: 7 }
        );
    }

    #[test]
    fn unknown_event_type_is_skipped_not_erred() {
        let frame = decode_one(&[(":event-type", "somethingNew")], b"{}");
        assert_eq!(frame_to_chunk(&frame).unwrap(), None);
    }
}
