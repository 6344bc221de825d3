//! HTTP client & retry driver: dispatches one upstream call with timeouts,
//! classifying outcomes and driving a limited retry policy.

use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GatewayError;
use crate::kiro::credentials::CredentialPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Ok,
    AuthExpired,
    RateLimited,
    ServerErrorRetryable,
    ServerErrorFatal,
    NetworkRetryable,
}

fn classify_status(status: u16) -> Outcome {
    match status {
        200..=299 => Outcome::Ok,
        401 | 403 => Outcome::AuthExpired,
        429 => Outcome::RateLimited,
        500 | 502 | 503 | 504 => Outcome::ServerErrorRetryable,
        _ => Outcome::ServerErrorFatal,
    }
}

/// The successful result of a dispatched call, alongside the account index
/// used (so the caller can `report_failure` against the right account if a
/// later stage, e.g. mid-stream, discovers a problem).
pub struct Dispatched {
    pub response: reqwest::Response,
    pub account_index: usize,
}

/// POST a JSON body to `url`, applying the account failover / retry policy.
/// Used for both the inference call and `ListAvailableModels`.
pub async fn dispatch(
    pool: &Arc<CredentialPool>,
    http: &reqwest::Client,
    url: &str,
    body: &Value,
    first_byte_timeout: Duration,
) -> Result<Dispatched, GatewayError> {
    let max_attempts = pool.len().max(1);
    let mut network_retry_used = false;
    let mut last_err = None;

    for _attempt in 0..max_attempts {
        let (token, account_index) = pool.acquire().await?;

        let send = http
            .post(url)
            .bearer_auth(token.expose_secret())
            .header("content-type", "application/json")
            .json(body)
            .send();

        let result = tokio::time::timeout(first_byte_timeout, send).await;

        let response = match result {
            Err(_elapsed) => {
                log::warn!("first-byte timeout dispatching to {url}");
                if !network_retry_used {
                    network_retry_used = true;
                    continue;
                }
                return Err(GatewayError::Timeout);
            }
            Ok(Err(e)) => {
                last_err = Some(e.to_string());
                if !network_retry_used && (e.is_connect() || e.is_timeout()) {
                    network_retry_used = true;
                    continue;
                }
                pool.report_failure(account_index, "network error").await;
                continue;
            }
            Ok(Ok(response)) => response,
        };

        match classify_status(response.status().as_u16()) {
            Outcome::Ok => return Ok(Dispatched { response, account_index }),
            Outcome::AuthExpired | Outcome::RateLimited => {
                pool.report_failure(account_index, "upstream rejected credentials or rate-limited").await;
                continue;
            }
            Outcome::ServerErrorRetryable => continue,
            Outcome::ServerErrorFatal | Outcome::NetworkRetryable => {
                let status = response.status().as_u16();
                return Err(GatewayError::upstream("upstream returned a non-retryable error", Some(status)));
            }
        }
    }

    Err(GatewayError::upstream(
        last_err.unwrap_or_else(|| "exhausted all accounts".to_string()),
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes_per_the_taxonomy() {
        assert_eq!(classify_status(200), Outcome::Ok);
        assert_eq!(classify_status(401), Outcome::AuthExpired);
        assert_eq!(classify_status(403), Outcome::AuthExpired);
        assert_eq!(classify_status(429), Outcome::RateLimited);
        assert_eq!(classify_status(500), Outcome::ServerErrorRetryable);
        assert_eq!(classify_status(503), Outcome::ServerErrorRetryable);
        assert_eq!(classify_status(400), Outcome::ServerErrorFatal);
        assert_eq!(classify_status(404), Outcome::ServerErrorFatal);
    }
}
