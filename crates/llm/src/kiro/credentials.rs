//! Credential pool: a multi-account refresh-token rotator with round-robin
//! selection, exponential backoff on failure, and a background
//! proactive-refresh task per account.

use config::AccountConfig;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::GatewayError;
use crate::kiro::auth_client;

const REFRESH_THRESHOLD: Duration = Duration::from_secs(600);
const MIN_BACKOFF: Duration = Duration::from_secs(5 * 60);
const MAX_BACKOFF: Duration = Duration::from_secs(2 * 60 * 60);
const BASE_BACKOFF: Duration = Duration::from_secs(30 * 60);

/// `backoff(n) = min(30m * 2^(n-1), 2h)`, floored at 5m.
fn backoff_for(consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return MIN_BACKOFF;
    }
    let shift = consecutive_failures.saturating_sub(1).min(16);
    let scaled = BASE_BACKOFF.saturating_mul(1u32.checked_shl(shift).unwrap_or(u32::MAX));
    scaled.clamp(MIN_BACKOFF, MAX_BACKOFF)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Health {
    Healthy,
    Cooling,
}

struct RecordState {
    access_token: Option<SecretString>,
    expiry: Instant,
    health: Health,
    cooldown_until: Instant,
    failure_count: u32,
}

struct Record {
    index: usize,
    account: AccountConfig,
    state: Mutex<RecordState>,
}

enum Decision {
    UseExisting(SecretString),
    Skip,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AccountStatus {
    pub index: usize,
    pub healthy: bool,
    pub expiry_in_secs: i64,
    pub failure_count: u32,
    pub cooldown_in_secs: i64,
}

pub struct CredentialPool {
    records: Vec<Arc<Record>>,
    cursor: AtomicUsize,
    http: reqwest::Client,
    region: String,
}

impl CredentialPool {
    pub fn new(accounts: Vec<AccountConfig>, region: String, http: reqwest::Client) -> Arc<Self> {
        let now = Instant::now();
        let records = accounts
            .into_iter()
            .enumerate()
            .map(|(index, account)| {
                Arc::new(Record {
                    index,
                    account,
                    state: Mutex::new(RecordState {
                        access_token: None,
                        expiry: now, // already-expired: forces a refresh on first use
                        health: Health::Healthy,
                        cooldown_until: now,
                        failure_count: 0,
                    }),
                })
            })
            .collect();

        Arc::new(Self { records, cursor: AtomicUsize::new(0), http, region })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Issue an access token, round-robining across healthy accounts and
    /// refreshing lazily when a record's token is near expiry.
    pub async fn acquire(&self) -> Result<(SecretString, usize), GatewayError> {
        let n = self.records.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % n.max(1);

        for offset in 0..n {
            let record = &self.records[(start + offset) % n];
            let now = Instant::now();

            let decision = {
                let state = record.state.lock().await;
                if state.health == Health::Cooling && state.cooldown_until > now {
                    Decision::Skip
                } else if let Some(token) = &state.access_token {
                    if state.expiry.saturating_duration_since(now) > REFRESH_THRESHOLD {
                        Decision::UseExisting(token.clone())
                    } else {
                        Decision::Refresh
                    }
                } else {
                    Decision::Refresh
                }
            };

            match decision {
                Decision::Skip => continue,
                Decision::UseExisting(token) => return Ok((token, record.index)),
                Decision::Refresh => match auth_client::refresh(&self.http, &record.account, &self.region).await {
                    Ok(refreshed) => {
                        let mut state = record.state.lock().await;
                        state.access_token = Some(refreshed.access_token.clone());
                        state.expiry = now + refreshed.expires_in;
                        state.health = Health::Healthy;
                        state.failure_count = 0;
                        log::info!("refreshed access token for account {}", record.index);
                        return Ok((refreshed.access_token, record.index));
                    }
                    Err(e) => {
                        let mut state = record.state.lock().await;
                        state.failure_count += 1;
                        state.health = Health::Cooling;
                        state.cooldown_until = now + backoff_for(state.failure_count);
                        log::warn!("refresh failed for account {}: {e}", record.index);
                    }
                },
            }
        }

        Err(GatewayError::NoCapacity)
    }

    /// Must be called by (F) whenever an upstream call using `index` fails
    /// with 401/403 or a network error, so the account is backed off and a
    /// subsequent `acquire()` skips it.
    pub async fn report_failure(&self, index: usize, reason: &str) {
        let Some(record) = self.records.get(index) else { return };
        let now = Instant::now();
        let mut state = record.state.lock().await;
        state.failure_count += 1;
        state.health = Health::Cooling;
        state.cooldown_until = now + backoff_for(state.failure_count);
        log::warn!("account {index} marked cooling after failure: {reason}");
    }

    pub async fn snapshot(&self) -> Vec<AccountStatus> {
        let mut out = Vec::with_capacity(self.records.len());
        let now = Instant::now();

        for record in &self.records {
            let state = record.state.lock().await;
            out.push(AccountStatus {
                index: record.index,
                healthy: state.health == Health::Healthy || state.cooldown_until <= now,
                expiry_in_secs: state.expiry.saturating_duration_since(now).as_secs() as i64,
                failure_count: state.failure_count,
                cooldown_in_secs: state.cooldown_until.saturating_duration_since(now).as_secs() as i64,
            });
        }

        out
    }

    /// Launch one background refresher task per account. Each sleeps until
    /// `expiry - REFRESH_THRESHOLD`, refreshes, and reschedules. Honors the
    /// same backoff as `acquire()` on failure. Cancellation-aware: exits
    /// promptly when `shutdown` resolves.
    pub fn spawn_background_refreshers(self: &Arc<Self>, shutdown: tokio_util::sync::CancellationToken) {
        for record in self.records.clone() {
            let pool = Arc::clone(self);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                pool.run_background_refresher(record, shutdown).await;
            });
        }
    }

    async fn run_background_refresher(&self, record: Arc<Record>, shutdown: tokio_util::sync::CancellationToken) {
        loop {
            let sleep_until = {
                let state = record.state.lock().await;
                state.expiry.saturating_sub(REFRESH_THRESHOLD).max(Instant::now())
            };

            tokio::select! {
                _ = tokio::time::sleep_until(sleep_until) => {}
                _ = shutdown.cancelled() => {
                    log::info!("background refresher for account {} shutting down", record.index);
                    return;
                }
            }

            let now = Instant::now();
            let skip = {
                let state = record.state.lock().await;
                state.health == Health::Cooling && state.cooldown_until > now
            };
            if skip {
                continue;
            }

            match auth_client::refresh(&self.http, &record.account, &self.region).await {
                Ok(refreshed) => {
                    let mut state = record.state.lock().await;
                    state.access_token = Some(refreshed.access_token);
                    state.expiry = now + refreshed.expires_in;
                    state.health = Health::Healthy;
                    state.failure_count = 0;
                    log::info!("background-refreshed access token for account {}", record.index);
                }
                Err(e) => {
                    let mut state = record.state.lock().await;
                    state.failure_count += 1;
                    state.health = Health::Cooling;
                    state.cooldown_until = now + backoff_for(state.failure_count);
                    log::warn!("background refresh failed for account {}: {e}", record.index);
                }
            }
        }
    }
}

// Expose the raw token for call sites that need the `Authorization` header value.
pub fn bearer_header_value(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_caps_at_two_hours() {
        assert_eq!(backoff_for(0), MIN_BACKOFF);
        assert_eq!(backoff_for(1), Duration::from_secs(30 * 60));
        assert_eq!(backoff_for(2), Duration::from_secs(60 * 60));
        assert_eq!(backoff_for(3), Duration::from_secs(120 * 60));
        assert_eq!(backoff_for(10), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn acquire_fails_with_no_capacity_when_every_refresh_fails() {
        let accounts = vec![AccountConfig::DesktopRefreshToken(SecretString::from("bad-token".to_string()))];
        let http = reqwest::Client::builder().build().unwrap();
        let pool = CredentialPool::new(accounts, "us-east-1".to_string(), http);

        // No network available in this unit test environment; refresh will
        // fail with a network error, which should surface as cooling, not a panic.
        let result = pool.acquire().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn report_failure_marks_the_account_cooling_in_snapshot() {
        let accounts = vec![
            AccountConfig::DesktopRefreshToken(SecretString::from("a".to_string())),
            AccountConfig::DesktopRefreshToken(SecretString::from("b".to_string())),
        ];
        let http = reqwest::Client::builder().build().unwrap();
        let pool = CredentialPool::new(accounts, "us-east-1".to_string(), http);

        pool.report_failure(0, "synthetic 401 for test").await;

        let snapshot = pool.snapshot().await;
        assert!(!snapshot[0].healthy);
        assert!(snapshot[0].cooldown_in_secs > 0);
        assert_eq!(snapshot[0].failure_count, 1);
    }
}
