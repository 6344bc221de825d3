//! Truncation recovery: when the upstream stops at `maxTokens` and the
//! client's budget allows it, transparently re-dispatch a
//! continuation turn and splice the output back together.

use crate::error::GatewayError;
use crate::messages::unified::{UnifiedContent, UnifiedFinishReason, UnifiedMessage, UnifiedRequest, UnifiedResponse, UnifiedRole, UnifiedUsage};

pub(crate) const MAX_CONTINUATIONS: u32 = 2;
const CONTINUE_LITERAL: &str = "continue";

/// One full round-trip through the upstream pipeline for a given unified
/// request. Implemented by whatever owns the format/dispatch/streaming
/// chain; kept abstract here so recovery can be unit-tested without a
/// network.
#[async_trait::async_trait]
pub trait Dispatch {
    async fn dispatch_once(&self, request: &UnifiedRequest) -> Result<UnifiedResponse, GatewayError>;
}

/// Drives `request` through `dispatcher`, transparently chaining up to
/// [`MAX_CONTINUATIONS`] continuation turns while the upstream keeps
/// stopping at `maxTokens` and the client's `max_tokens` budget (if any)
/// isn't yet exhausted. If recovery is disabled, or the budget/continuation
/// limit is hit, the `maxTokens` finish reason is returned to the caller
/// unchanged.
pub async fn drive_with_recovery<D: Dispatch>(
    dispatcher: &D,
    request: UnifiedRequest,
    recovery_enabled: bool,
) -> Result<UnifiedResponse, GatewayError> {
    let cap = request.max_tokens;
    let mut current_request = request;
    let mut response = dispatcher.dispatch_once(&current_request).await?;

    if !recovery_enabled {
        return Ok(response);
    }

    let mut continuations = 0;
    let mut output_tokens_so_far = response.usage.output_tokens;

    while response.finish_reason == UnifiedFinishReason::MaxTokens
        && continuations < MAX_CONTINUATIONS
        && cap.map(|max| output_tokens_so_far < max).unwrap_or(true)
    {
        continuations += 1;
        log::info!("upstream truncated at maxTokens, issuing continuation {continuations}/{MAX_CONTINUATIONS}");

        current_request = build_continuation_request(current_request, &response);
        let next = dispatcher.dispatch_once(&current_request).await?;
        output_tokens_so_far += next.usage.output_tokens;
        response = concatenate(response, next);
    }

    Ok(response)
}

pub(crate) fn build_continuation_request(mut request: UnifiedRequest, response: &UnifiedResponse) -> UnifiedRequest {
    let partial_text = flatten_text(&response.content);
    request.messages.push(UnifiedMessage { role: UnifiedRole::Assistant, content: vec![UnifiedContent::Text(partial_text)] });
    request.messages.push(UnifiedMessage {
        role: UnifiedRole::User,
        content: vec![UnifiedContent::Text(CONTINUE_LITERAL.to_string())],
    });
    request
}

/// Splices a continuation's output onto the prior response with no
/// boundary frame: the visible text is a straight concatenation, any
/// tool-use blocks from the continuation turn are appended, and token
/// usage is summed.
fn concatenate(prior: UnifiedResponse, next: UnifiedResponse) -> UnifiedResponse {
    let merged_text = format!("{}{}", flatten_text(&prior.content), flatten_text(&next.content));

    let mut content = vec![UnifiedContent::Text(merged_text)];
    content.extend(next.content.into_iter().filter(|c| !matches!(c, UnifiedContent::Text(_))));

    UnifiedResponse {
        model: next.model,
        content,
        reasoning: prior.reasoning.or(next.reasoning),
        finish_reason: next.finish_reason,
        usage: UnifiedUsage {
            input_tokens: prior.usage.input_tokens + next.usage.input_tokens,
            output_tokens: prior.usage.output_tokens + next.usage.output_tokens,
        },
    }
}

fn flatten_text(content: &[UnifiedContent]) -> String {
    content
        .iter()
        .filter_map(|c| match c {
            UnifiedContent::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn request(max_tokens: Option<u32>) -> UnifiedRequest {
        UnifiedRequest {
            model: "m".to_string(),
            messages: vec![UnifiedMessage { role: UnifiedRole::User, content: vec![UnifiedContent::Text("go".to_string())] }],
            max_tokens,
            temperature: None,
            top_p: None,
            stop_sequences: vec![],
            tools: vec![],
            tool_choice: None,
            stream: false,
            reasoning: None,
        }
    }

    fn response(text: &str, finish_reason: UnifiedFinishReason, output_tokens: u32) -> UnifiedResponse {
        UnifiedResponse {
            model: "m".to_string(),
            content: vec![UnifiedContent::Text(text.to_string())],
            reasoning: None,
            finish_reason,
            usage: UnifiedUsage { input_tokens: 1, output_tokens },
        }
    }

    struct ScriptedDispatch {
        responses: Mutex<Vec<UnifiedResponse>>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Dispatch for ScriptedDispatch {
        async fn dispatch_once(&self, _request: &UnifiedRequest) -> Result<UnifiedResponse, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn stop_finish_reason_never_triggers_a_continuation() {
        let dispatcher =
            ScriptedDispatch { responses: Mutex::new(vec![response("done", UnifiedFinishReason::Stop, 5)]), calls: AtomicUsize::new(0) };
        let result = drive_with_recovery(&dispatcher, request(Some(100)), true).await.unwrap();
        assert_eq!(result.content, vec![UnifiedContent::Text("done".to_string())]);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn max_tokens_with_remaining_budget_chains_one_continuation_and_concatenates() {
        let dispatcher = ScriptedDispatch {
            responses: Mutex::new(vec![
                response("hello ", UnifiedFinishReason::MaxTokens, 10),
                response("world", UnifiedFinishReason::Stop, 3),
            ]),
            calls: AtomicUsize::new(0),
        };
        let result = drive_with_recovery(&dispatcher, request(Some(100)), true).await.unwrap();
        assert_eq!(result.content, vec![UnifiedContent::Text("hello world".to_string())]);
        assert_eq!(result.finish_reason, UnifiedFinishReason::Stop);
        assert_eq!(result.usage.output_tokens, 13);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_recovery_returns_the_truncated_response_unchanged() {
        let dispatcher =
            ScriptedDispatch { responses: Mutex::new(vec![response("cut off", UnifiedFinishReason::MaxTokens, 10)]), calls: AtomicUsize::new(0) };
        let result = drive_with_recovery(&dispatcher, request(Some(100)), false).await.unwrap();
        assert_eq!(result.finish_reason, UnifiedFinishReason::MaxTokens);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn chained_continuations_stop_after_the_maximum() {
        let dispatcher = ScriptedDispatch {
            responses: Mutex::new(vec![
                response("a", UnifiedFinishReason::MaxTokens, 10),
                response("b", UnifiedFinishReason::MaxTokens, 10),
                response("c", UnifiedFinishReason::MaxTokens, 10),
            ]),
            calls: AtomicUsize::new(0),
        };
        let result = drive_with_recovery(&dispatcher, request(Some(1000)), true).await.unwrap();
        assert_eq!(result.content, vec![UnifiedContent::Text("abc".to_string())]);
        assert_eq!(result.finish_reason, UnifiedFinishReason::MaxTokens);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_max_tokens_budget_skips_further_continuations() {
        let dispatcher =
            ScriptedDispatch { responses: Mutex::new(vec![response("cut off", UnifiedFinishReason::MaxTokens, 50)]), calls: AtomicUsize::new(0) };
        let result = drive_with_recovery(&dispatcher, request(Some(50)), true).await.unwrap();
        assert_eq!(result.finish_reason, UnifiedFinishReason::MaxTokens);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
    }
}
