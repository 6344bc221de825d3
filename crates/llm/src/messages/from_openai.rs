use super::openai;
use super::unified::*;
use crate::error::GatewayError;

pub fn openai_request_to_unified(request: openai::ChatCompletionRequest) -> Result<UnifiedRequest, GatewayError> {
    let mut messages = Vec::with_capacity(request.messages.len());

    for message in request.messages {
        messages.push(convert_message(message)?);
    }

    let tools = request
        .tools
        .into_iter()
        .map(|tool| UnifiedTool {
            name: tool.function.name,
            description: tool.function.description,
            input_schema: tool.function.parameters,
        })
        .collect();

    let tool_choice = request.tool_choice.map(|choice| match choice {
        openai::ToolChoice::Mode(mode) => match mode.as_str() {
            "none" => UnifiedToolChoice::None,
            "required" => UnifiedToolChoice::Required,
            _ => UnifiedToolChoice::Auto,
        },
        openai::ToolChoice::Specific { function } => UnifiedToolChoice::Specific(function.name),
    });

    let reasoning = request.reasoning_effort.map(|effort| ReasoningRequest {
        enabled: effort != "none",
        budget_tokens: None,
    });

    Ok(UnifiedRequest {
        model: request.model,
        messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stop_sequences: request.stop.map(openai::StopSequences::into_vec).unwrap_or_default(),
        tools,
        tool_choice,
        stream: request.stream,
        reasoning,
    })
}

fn convert_message(message: openai::Message) -> Result<UnifiedMessage, GatewayError> {
    let role = match message.role {
        openai::Role::System => UnifiedRole::System,
        openai::Role::User => UnifiedRole::User,
        openai::Role::Assistant => UnifiedRole::Assistant,
        openai::Role::Tool => UnifiedRole::User,
    };

    let mut content = Vec::new();

    if let Some(tool_call_id) = &message.tool_call_id {
        let text = match &message.content {
            Some(openai::MessageContent::Text(text)) => text.clone(),
            _ => String::new(),
        };
        content.push(UnifiedContent::ToolResult(UnifiedToolResult {
            tool_use_id: tool_call_id.clone(),
            content: text,
            is_error: false,
        }));
        return Ok(UnifiedMessage { role, content });
    }

    match message.content {
        Some(openai::MessageContent::Text(text)) => content.push(UnifiedContent::Text(text)),
        Some(openai::MessageContent::Parts(parts)) => {
            for part in parts {
                match part {
                    openai::ContentPart::Text { text } => content.push(UnifiedContent::Text(text)),
                    openai::ContentPart::ImageUrl { image_url } => {
                        content.push(UnifiedContent::Image(parse_data_url(&image_url.url)?));
                    }
                }
            }
        }
        None => {}
    }

    for call in message.tool_calls.into_iter().flatten() {
        content.push(UnifiedContent::ToolUse(UnifiedToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        }));
    }

    Ok(UnifiedMessage { role, content })
}

/// OpenAI image parts carry a `data:<mime>;base64,<data>` URL rather than
/// split media-type/data fields.
fn parse_data_url(url: &str) -> Result<UnifiedImageSource, GatewayError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| GatewayError::bad_request("image_url must be a data: URL"))?;

    let (mime, data) = rest
        .split_once(";base64,")
        .ok_or_else(|| GatewayError::bad_request("image_url must be base64-encoded"))?;

    let media_type = ImageMediaType::from_mime(mime)
        .ok_or_else(|| GatewayError::bad_request(format!("unsupported image media type {mime:?}")))?;

    Ok(UnifiedImageSource { media_type, base64_data: data.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_plain_text_message() {
        let request = openai::ChatCompletionRequest {
            model: "claude-sonnet-4".to_string(),
            messages: vec![openai::Message {
                role: openai::Role::User,
                content: Some(openai::MessageContent::Text("hi".to_string())),
                tool_calls: None,
                tool_call_id: None,
            }],
            max_tokens: Some(10),
            temperature: None,
            top_p: None,
            stop: None,
            stream: false,
            tools: vec![],
            tool_choice: None,
            reasoning_effort: None,
        };

        let unified = openai_request_to_unified(request).unwrap();
        assert_eq!(unified.messages.len(), 1);
        assert_eq!(unified.messages[0].content, vec![UnifiedContent::Text("hi".to_string())]);
    }

    #[test]
    fn rejects_non_data_image_url() {
        let err = parse_data_url("https://example.com/cat.png").unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest { .. }));
    }
}
