pub mod anthropic;
pub mod openai;
pub mod unified;

mod from_anthropic;
mod from_openai;
mod to_anthropic;
mod to_openai;

pub use from_anthropic::anthropic_request_to_unified;
pub use from_openai::openai_request_to_unified;
pub use to_anthropic::{AnthropicStreamState, unified_chunk_to_anthropic_events, unified_response_to_anthropic};
pub use to_openai::{unified_chunk_to_openai_chunk, unified_response_to_openai};
