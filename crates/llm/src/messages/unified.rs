//! Shared intermediate conversation representation.
//!
//! Both client dialects (OpenAI, Anthropic) and the Kiro wire format convert
//! to and from this representation rather than pairwise with each other, so
//! dialect divergence lives only in the renderers, not in the parser,
//! credential, or streaming code.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedRequest {
    pub model: String,
    pub messages: Vec<UnifiedMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop_sequences: Vec<String>,
    pub tools: Vec<UnifiedTool>,
    pub tool_choice: Option<UnifiedToolChoice>,
    pub stream: bool,
    pub reasoning: Option<ReasoningRequest>,
}

/// The client's requested reasoning/thinking budget, present whether it
/// arrived as Anthropic's `thinking` block or OpenAI's `reasoning_effort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReasoningRequest {
    pub enabled: bool,
    pub budget_tokens: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnifiedRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedMessage {
    pub role: UnifiedRole,
    pub content: Vec<UnifiedContent>,
}

impl UnifiedMessage {
    /// Tool calls present in this message, in content order.
    pub fn tool_calls(&self) -> Vec<&UnifiedToolCall> {
        self.content
            .iter()
            .filter_map(|c| match c {
                UnifiedContent::ToolUse(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnifiedContent {
    Text(String),
    Image(UnifiedImageSource),
    ToolUse(UnifiedToolCall),
    ToolResult(UnifiedToolResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedImageSource {
    pub media_type: ImageMediaType,
    pub base64_data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMediaType {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageMediaType {
    pub fn mime(self) -> &'static str {
        match self {
            ImageMediaType::Jpeg => "image/jpeg",
            ImageMediaType::Png => "image/png",
            ImageMediaType::Gif => "image/gif",
            ImageMediaType::Webp => "image/webp",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnifiedToolChoice {
    Auto,
    None,
    Required,
    Specific(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedResponse {
    pub model: String,
    pub content: Vec<UnifiedContent>,
    pub reasoning: Option<String>,
    pub finish_reason: UnifiedFinishReason,
    pub usage: UnifiedUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnifiedUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnifiedFinishReason {
    Stop,
    MaxTokens,
    ToolUse,
}

/// One piece of a streaming response, the output of the Kiro-side renderer
/// and the input to each dialect's SSE renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum UnifiedChunk {
    TextDelta(String),
    ReasoningDelta(String),
    ToolUseStart { index: usize, id: String, name: String },
    ToolUseDelta { index: usize, partial_json: String },
    ToolUseStop { index: usize },
    MessageDelta { finish_reason: UnifiedFinishReason, usage: UnifiedUsage },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedModel {
    pub id: String,
    pub supports_vision: bool,
    pub supports_tools: bool,
    pub supports_thinking: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_calls_are_extracted_in_order() {
        let message = UnifiedMessage {
            role: UnifiedRole::Assistant,
            content: vec![
                UnifiedContent::Text("calling a tool".to_string()),
                UnifiedContent::ToolUse(UnifiedToolCall {
                    id: "call_1".to_string(),
                    name: "get_weather".to_string(),
                    arguments: "{}".to_string(),
                }),
            ],
        };

        let calls = message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_weather");
    }

    #[test]
    fn image_media_type_roundtrips_through_mime() {
        for mt in [ImageMediaType::Jpeg, ImageMediaType::Png, ImageMediaType::Gif, ImageMediaType::Webp] {
            assert_eq!(ImageMediaType::from_mime(mt.mime()), Some(mt));
        }
    }
}
