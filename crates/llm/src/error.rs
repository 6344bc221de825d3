//! The error taxonomy surfaced to clients: a handful of kinds, each mapped to
//! an HTTP status and rendered in whichever dialect the failing route speaks.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::messages::{anthropic, openai};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid proxy credentials")]
    Auth,

    #[error("no healthy account available")]
    NoCapacity,

    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("upstream error: {message}")]
    Upstream { message: String, status: Option<u16> },

    #[error("upstream timed out")]
    Timeout,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        GatewayError::BadRequest { message: message.into() }
    }

    pub fn upstream(message: impl Into<String>, status: Option<u16>) -> Self {
        GatewayError::Upstream { message: message.into(), status }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Auth => StatusCode::UNAUTHORIZED,
            GatewayError::NoCapacity => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `error.type` as surfaced in the OpenAI-shaped body.
    fn openai_type(&self) -> &'static str {
        match self {
            GatewayError::Auth => "authentication_error",
            GatewayError::NoCapacity => "capacity_error",
            GatewayError::BadRequest { .. } => "invalid_request_error",
            GatewayError::Upstream { .. } => "upstream_error",
            GatewayError::Timeout => "timeout_error",
            GatewayError::Internal { .. } => "internal_error",
        }
    }

    /// `error.type` as surfaced in the Anthropic-shaped body.
    fn anthropic_type(&self) -> &'static str {
        match self {
            GatewayError::Auth => "authentication_error",
            GatewayError::NoCapacity => "overloaded_error",
            GatewayError::BadRequest { .. } => "invalid_request_error",
            GatewayError::Upstream { .. } => "api_error",
            GatewayError::Timeout => "timeout_error",
            GatewayError::Internal { .. } => "api_error",
        }
    }

    /// Message text safe to hand to a client: never includes a refresh
    /// token, access token, or raw upstream body.
    fn client_message(&self) -> String {
        match self {
            GatewayError::Auth => "invalid proxy credentials".to_string(),
            GatewayError::NoCapacity => "no healthy upstream account available, try again shortly".to_string(),
            GatewayError::BadRequest { message } => message.clone(),
            GatewayError::Upstream { .. } => "upstream request failed".to_string(),
            GatewayError::Timeout => "upstream request timed out".to_string(),
            GatewayError::Internal { .. } => "internal error".to_string(),
        }
    }

    pub fn into_openai_response(self) -> Response {
        let status = self.status_code();
        log::error!("openai route error: {self}");
        let body = openai::ErrorResponse {
            error: openai::ErrorDetails { message: self.client_message(), kind: self.openai_type(), code: None },
        };
        (status, axum::Json(body)).into_response()
    }

    pub fn into_anthropic_response(self) -> Response {
        let status = self.status_code();
        log::error!("anthropic route error: {self}");
        let body = anthropic::ErrorResponse {
            kind: "error",
            error: anthropic::ErrorDetails { kind: self.anthropic_type(), message: self.client_message() },
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Wrapper that makes a [`GatewayError`] render in the OpenAI body shape
/// when returned directly from an axum handler via `?`.
pub struct OpenAiError(pub GatewayError);

impl<E: Into<GatewayError>> From<E> for OpenAiError {
    fn from(err: E) -> Self {
        OpenAiError(err.into())
    }
}

impl IntoResponse for OpenAiError {
    fn into_response(self) -> Response {
        self.0.into_openai_response()
    }
}

/// Wrapper that makes a [`GatewayError`] render in the Anthropic body shape.
pub struct AnthropicError(pub GatewayError);

impl<E: Into<GatewayError>> From<E> for AnthropicError {
    fn from(err: E) -> Self {
        AnthropicError(err.into())
    }
}

impl IntoResponse for AnthropicError {
    fn into_response(self) -> Response {
        self.0.into_anthropic_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_the_documented_status() {
        assert_eq!(GatewayError::Auth.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(GatewayError::NoCapacity.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(GatewayError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(GatewayError::upstream("x", Some(500)).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(GatewayError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(GatewayError::internal("x").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upstream_error_message_never_leaks_internal_detail() {
        let err = GatewayError::upstream("connection reset while reading refreshToken body", Some(502));
        assert_eq!(err.client_message(), "upstream request failed");
    }
}
