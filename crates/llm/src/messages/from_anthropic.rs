use super::anthropic;
use super::unified::*;
use crate::error::GatewayError;

pub fn anthropic_request_to_unified(request: anthropic::MessagesRequest) -> Result<UnifiedRequest, GatewayError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = request.system {
        let text = match system {
            anthropic::SystemPrompt::Text(text) => text,
            anthropic::SystemPrompt::Blocks(blocks) => {
                blocks.into_iter().map(|b| b.text).collect::<Vec<_>>().join("\n")
            }
        };
        messages.push(UnifiedMessage { role: UnifiedRole::System, content: vec![UnifiedContent::Text(text)] });
    }

    for message in request.messages {
        messages.push(convert_message(message)?);
    }

    let tools = request
        .tools
        .into_iter()
        .map(|tool| UnifiedTool { name: tool.name, description: tool.description, input_schema: tool.input_schema })
        .collect();

    let tool_choice = request.tool_choice.map(|choice| match choice {
        anthropic::ToolChoice::Auto => UnifiedToolChoice::Auto,
        anthropic::ToolChoice::Any => UnifiedToolChoice::Required,
        anthropic::ToolChoice::None => UnifiedToolChoice::None,
        anthropic::ToolChoice::Tool { name } => UnifiedToolChoice::Specific(name),
    });

    let reasoning = request
        .thinking
        .map(|thinking| ReasoningRequest { enabled: thinking.enabled, budget_tokens: thinking.budget_tokens });

    Ok(UnifiedRequest {
        model: request.model,
        messages,
        max_tokens: Some(request.max_tokens),
        temperature: request.temperature,
        top_p: request.top_p,
        stop_sequences: request.stop_sequences,
        tools,
        tool_choice,
        stream: request.stream,
        reasoning,
    })
}

fn convert_message(message: anthropic::Message) -> Result<UnifiedMessage, GatewayError> {
    let role = match message.role {
        anthropic::Role::User => UnifiedRole::User,
        anthropic::Role::Assistant => UnifiedRole::Assistant,
    };

    let content = match message.content {
        anthropic::MessageContent::Text(text) => vec![UnifiedContent::Text(text)],
        anthropic::MessageContent::Blocks(blocks) => {
            blocks.into_iter().map(convert_block).collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(UnifiedMessage { role, content })
}

fn convert_block(block: anthropic::Content) -> Result<UnifiedContent, GatewayError> {
    Ok(match block {
        anthropic::Content::Text { text } => UnifiedContent::Text(text),
        anthropic::Content::Thinking { thinking } => UnifiedContent::Text(thinking),
        anthropic::Content::Image { source } => {
            let media_type = ImageMediaType::from_mime(&source.media_type)
                .ok_or_else(|| GatewayError::bad_request(format!("unsupported image media type {:?}", source.media_type)))?;
            UnifiedContent::Image(UnifiedImageSource { media_type, base64_data: source.data })
        }
        anthropic::Content::ToolUse { id, name, input } => {
            UnifiedContent::ToolUse(UnifiedToolCall { id, name, arguments: input.to_string() })
        }
        anthropic::Content::ToolResult { tool_use_id, content, is_error } => {
            let text = match content {
                anthropic::ToolResultContent::Text(text) => text,
                anthropic::ToolResultContent::Blocks(blocks) => {
                    blocks.into_iter().map(|b| b.text).collect::<Vec<_>>().join("\n")
                }
            };
            UnifiedContent::ToolResult(UnifiedToolResult { tool_use_id, content: text, is_error })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_becomes_a_leading_system_message() {
        let request = anthropic::MessagesRequest {
            model: "claude-sonnet-4".to_string(),
            messages: vec![anthropic::Message {
                role: anthropic::Role::User,
                content: anthropic::MessageContent::Text("hi".to_string()),
            }],
            system: Some(anthropic::SystemPrompt::Text("be nice".to_string())),
            max_tokens: 100,
            temperature: None,
            top_p: None,
            stop_sequences: vec![],
            stream: false,
            tools: vec![],
            tool_choice: None,
            thinking: None,
        };

        let unified = anthropic_request_to_unified(request).unwrap();
        assert_eq!(unified.messages.len(), 2);
        assert_eq!(unified.messages[0].role, UnifiedRole::System);
    }
}
