//! Format converter: non-streaming request/response shape translation
//! between the unified representation and the Kiro wire format.

use serde_json::{Value, json};
use uuid::Uuid;

use crate::messages::unified::*;

const ORIGIN: &str = "AI_EDITOR";

/// Build the Kiro `SendMessageStreaming` request body from a unified
/// request. The conversation id is fresh per gateway-level request (Kiro
/// does not need it to be stable across calls here, since this gateway
/// keeps no server-side conversation state).
pub fn build_kiro_request(unified: &UnifiedRequest, model_id: &str, profile_arn: Option<&str>) -> Value {
    let (history, current) = split_history(&unified.messages);

    let current_message = current
        .map(|m| user_input_message(m, model_id, &unified.tools))
        .unwrap_or_else(|| user_input_message_text(String::new(), model_id, &unified.tools));

    let mut body = json!({
        "conversationState": {
            "chatTriggerType": "MANUAL",
            "conversationId": Uuid::new_v4().to_string(),
            "currentMessage": { "userInputMessage": current_message },
            "history": history,
        }
    });

    if let Some(arn) = profile_arn {
        body["profileArn"] = json!(arn);
    }

    body
}

/// Split the unified message list into Kiro's `history` (everything but the
/// final turn) and the `currentMessage` (the final turn, which must be a
/// user turn since the gateway is always driving a single-shot completion).
fn split_history(messages: &[UnifiedMessage]) -> (Vec<Value>, Option<&UnifiedMessage>) {
    if messages.is_empty() {
        return (Vec::new(), None);
    }

    let (last, rest) = messages.split_last().expect("checked non-empty");
    let history = rest.iter().map(history_entry).collect();
    (history, Some(last))
}

fn history_entry(message: &UnifiedMessage) -> Value {
    let parts = split_content(&message.content);
    match message.role {
        UnifiedRole::Assistant => {
            json!({ "assistantResponseMessage": { "content": parts.text, "toolUses": parts.tool_uses } })
        }
        UnifiedRole::System | UnifiedRole::User => {
            json!({
                "userInputMessage": {
                    "content": parts.text,
                    "origin": ORIGIN,
                    "userInputMessageContext": {
                        "images": parts.images,
                        "toolResults": parts.tool_results,
                    },
                }
            })
        }
    }
}

fn user_input_message(message: &UnifiedMessage, model_id: &str, tools: &[UnifiedTool]) -> Value {
    build_user_input_message(split_content(&message.content), model_id, tools)
}

fn user_input_message_text(content: String, model_id: &str, tools: &[UnifiedTool]) -> Value {
    build_user_input_message(ContentParts { text: content, ..ContentParts::default() }, model_id, tools)
}

fn build_user_input_message(parts: ContentParts, model_id: &str, tools: &[UnifiedTool]) -> Value {
    json!({
        "content": parts.text,
        "modelId": model_id,
        "origin": ORIGIN,
        "userInputMessageContext": {
            "tools": tools.iter().map(tool_spec).collect::<Vec<_>>(),
            "images": parts.images,
            "toolResults": parts.tool_results,
        }
    })
}

fn tool_spec(tool: &UnifiedTool) -> Value {
    json!({
        "toolSpecification": {
            "name": tool.name,
            "description": tool.description.clone().unwrap_or_default(),
            "inputSchema": { "json": tool.input_schema },
        }
    })
}

/// A content block list split into the shapes each part of the Kiro wire
/// format wants: plain joined text, images, outstanding assistant tool
/// calls (history only), and tool results (current or past user turns).
#[derive(Default)]
struct ContentParts {
    text: String,
    images: Vec<Value>,
    tool_uses: Vec<Value>,
    tool_results: Vec<Value>,
}

fn split_content(content: &[UnifiedContent]) -> ContentParts {
    let mut text_parts = Vec::new();
    let mut images = Vec::new();
    let mut tool_uses = Vec::new();
    let mut tool_results = Vec::new();

    for part in content {
        match part {
            UnifiedContent::Text(t) => text_parts.push(t.clone()),
            UnifiedContent::Image(image) => images.push(image_to_value(image)),
            UnifiedContent::ToolUse(call) => tool_uses.push(tool_use_to_value(call)),
            UnifiedContent::ToolResult(result) => {
                text_parts.push(result.content.clone());
                tool_results.push(tool_result_to_value(result));
            }
        }
    }

    ContentParts { text: text_parts.join("\n"), images, tool_uses, tool_results }
}

fn image_to_value(image: &UnifiedImageSource) -> Value {
    json!({
        "format": image_format(image.media_type),
        "source": { "bytes": image.base64_data },
    })
}

fn image_format(media_type: ImageMediaType) -> &'static str {
    match media_type {
        ImageMediaType::Jpeg => "jpeg",
        ImageMediaType::Png => "png",
        ImageMediaType::Gif => "gif",
        ImageMediaType::Webp => "webp",
    }
}

fn tool_use_to_value(call: &UnifiedToolCall) -> Value {
    let input = serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!(call.arguments));
    json!({ "toolUseId": call.id, "name": call.name, "input": input })
}

fn tool_result_to_value(result: &UnifiedToolResult) -> Value {
    json!({
        "toolUseId": result.tool_use_id,
        "content": [{ "text": result.content }],
        "status": if result.is_error { "error" } else { "success" },
    })
}
