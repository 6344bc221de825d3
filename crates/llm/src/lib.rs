//! Bidirectional translation gateway between the OpenAI and Anthropic HTTP
//! surfaces and the Kiro/CodeWhisperer streaming upstream.
//!
//! [`kiro::Gateway`] owns the credential pool, model cache, and streaming
//! pipeline; [`routes::openai_router`] and [`routes::anthropic_router`]
//! expose it over each client dialect.

pub mod error;
pub mod kiro;
pub mod messages;
pub mod routes;

mod http_client;

pub use kiro::Gateway;
pub use routes::{anthropic_router, openai_router};
