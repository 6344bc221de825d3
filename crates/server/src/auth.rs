//! Bearer/`x-api-key` auth layer: every `/v1/*` route checks the caller's
//! credential against `PROXY_API_KEY` before passing through.
//! The 401 body shape is chosen per-layer so it matches the dialect of the
//! sub-router it guards.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, header};
use llm::error::GatewayError;
use secrecy::{ExposeSecret, SecretString};
use tower::Layer;

/// Which dialect's error shape a guarded sub-router should render a 401 in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    OpenAi,
    Anthropic,
}

#[derive(Clone)]
pub struct AuthLayer {
    expected: Arc<SecretString>,
    dialect: Dialect,
}

impl AuthLayer {
    pub fn new(proxy_api_key: SecretString, dialect: Dialect) -> Self {
        Self { expected: Arc::new(proxy_api_key), dialect }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, next: S) -> Self::Service {
        AuthService { next, expected: self.expected.clone(), dialect: self.dialect }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    next: S,
    expected: Arc<SecretString>,
    dialect: Dialect,
}

impl<S, ReqBody> tower::Service<Request<ReqBody>> for AuthService<S>
where
    S: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    S::Future: Send,
    S::Error: Display + 'static,
    ReqBody: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let expected = self.expected.clone();
        let dialect = self.dialect;

        Box::pin(async move {
            let authorized = presented_key(req.headers())
                .is_some_and(|presented| constant_time_eq(presented.as_bytes(), expected.expose_secret().as_bytes()));

            if authorized {
                next.call(req).await
            } else {
                log::warn!("rejected request with a missing or invalid proxy key");
                Ok(unauthorized(dialect))
            }
        })
    }
}

fn presented_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        return Some(token.to_string());
    }
    headers.get("x-api-key").and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Avoids leaking key length/content through response-time side channels.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unauthorized(dialect: Dialect) -> Response<Body> {
    match dialect {
        Dialect::OpenAi => GatewayError::Auth.into_openai_response(),
        Dialect::Anthropic => GatewayError::Auth.into_anthropic_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_identical_bytes() {
        assert!(constant_time_eq(b"secret", b"secret"));
    }

    #[test]
    fn constant_time_eq_rejects_different_bytes() {
        assert!(!constant_time_eq(b"secret", b"different"));
    }

    #[test]
    fn constant_time_eq_rejects_different_lengths() {
        assert!(!constant_time_eq(b"short", b"much-longer-value"));
    }

    #[test]
    fn presented_key_prefers_bearer_over_x_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer from-bearer".parse().unwrap());
        headers.insert("x-api-key", "from-header".parse().unwrap());
        assert_eq!(presented_key(&headers).as_deref(), Some("from-bearer"));
    }

    #[test]
    fn presented_key_falls_back_to_x_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "from-header".parse().unwrap());
        assert_eq!(presented_key(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn presented_key_is_none_without_either_header() {
        assert_eq!(presented_key(&HeaderMap::new()), None);
    }
}
