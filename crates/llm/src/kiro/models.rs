//! Model resolver + cache: resolves a client-visible alias to an upstream
//! model id, backed by a TTL-cached `ListAvailableModels` call with a
//! hardcoded fallback table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::GatewayError;
use crate::kiro::credentials::CredentialPool;
use crate::kiro::http;

const CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const LIST_MODELS_URL_TEMPLATE: &str = "https://q.{region}.amazonaws.com/ListAvailableModels";

/// One resolved model: its upstream id and capability flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub upstream_id: String,
    pub supports_vision: bool,
    pub supports_tools: bool,
    pub supports_thinking: bool,
}

impl ModelEntry {
    fn unknown(alias: &str) -> Self {
        log::warn!("model alias {alias:?} did not resolve against the cache, the built-in table, or as a raw upstream id");
        Self { upstream_id: "unknown-model".to_string(), supports_vision: false, supports_tools: false, supports_thinking: false }
    }
}

/// Short names map to a known upstream id here; everything else either
/// passes through as a literal upstream id or resolves via discovery.
fn builtin_alias(alias: &str) -> Option<ModelEntry> {
    match alias {
        "claude-sonnet-4.5" => Some(ModelEntry {
            upstream_id: "CLAUDE_SONNET_4_5_20250929_V1_0".to_string(),
            supports_vision: true,
            supports_tools: true,
            supports_thinking: true,
        }),
        "claude-haiku-4.5" => Some(ModelEntry {
            upstream_id: "CLAUDE_HAIKU_4_5_20251001_V1_0".to_string(),
            supports_vision: true,
            supports_tools: true,
            supports_thinking: false,
        }),
        // "picks the most capable id", currently the same as the flagship alias.
        "auto-kiro" => Some(ModelEntry {
            upstream_id: "CLAUDE_SONNET_4_5_20250929_V1_0".to_string(),
            supports_vision: true,
            supports_tools: true,
            supports_thinking: true,
        }),
        _ => None,
    }
}

/// Upstream model ids are uppercase, underscore-separated literals
/// (`CLAUDE_SONNET_4_5_20250929_V1_0`); anything matching that shape is
/// passed through rather than rejected as unknown.
fn looks_like_upstream_id(alias: &str) -> bool {
    !alias.is_empty() && alias.contains('_') && alias.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[derive(Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<WireModel>,
}

#[derive(Deserialize)]
struct WireModel {
    #[serde(rename = "modelId")]
    model_id: String,
}

pub struct ModelCache {
    entries: RwLock<HashMap<String, ModelEntry>>,
    refreshed_at: RwLock<Option<Instant>>,
    /// Guards the `ListAvailableModels` call itself so concurrent cache
    /// misses single-flight into one upstream request. Deliberately held
    /// across the network call, unlike every other lock in this gateway.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()), refreshed_at: RwLock::new(None), refresh_gate: tokio::sync::Mutex::new(()) }
    }

    /// Resolve a client-supplied model alias to an upstream id + capability
    /// flags. Never fails: a fully unresolvable alias yields `unknown-model`
    /// rather than propagating an error, so the caller can still dispatch
    /// and let the upstream itself reject it.
    pub async fn resolve(
        &self,
        alias: &str,
        pool: &Arc<CredentialPool>,
        http_client: &reqwest::Client,
        region: &str,
        first_byte_timeout: Duration,
    ) -> ModelEntry {
        if let Some(entry) = self.lookup(alias).await {
            return entry;
        }

        self.ensure_fresh(pool, http_client, region, first_byte_timeout).await;

        if let Some(entry) = self.lookup(alias).await {
            return entry;
        }
        if let Some(entry) = builtin_alias(alias) {
            return entry;
        }
        if looks_like_upstream_id(alias) {
            return ModelEntry { upstream_id: alias.to_string(), supports_vision: true, supports_tools: true, supports_thinking: true };
        }

        ModelEntry::unknown(alias)
    }

    pub async fn list_known(&self) -> Vec<ModelEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    async fn lookup(&self, alias: &str) -> Option<ModelEntry> {
        let fresh = match *self.refreshed_at.read().await {
            Some(at) => at.elapsed() < CACHE_TTL,
            None => false,
        };
        if !fresh {
            return None;
        }
        self.entries.read().await.get(alias).cloned()
    }

    async fn ensure_fresh(&self, pool: &Arc<CredentialPool>, http_client: &reqwest::Client, region: &str, first_byte_timeout: Duration) {
        let _gate = self.refresh_gate.lock().await;

        let fresh = match *self.refreshed_at.read().await {
            Some(at) => at.elapsed() < CACHE_TTL,
            None => false,
        };
        if fresh {
            return;
        }

        match list_available_models(pool, http_client, region, first_byte_timeout).await {
            Ok(models) => {
                let mut entries = self.entries.write().await;
                entries.clear();
                for model in models {
                    entries.insert(model.upstream_id.clone(), model);
                }
                drop(entries);
                *self.refreshed_at.write().await = Some(Instant::now());
                log::info!("refreshed model discovery cache");
            }
            Err(e) => {
                log::warn!("model discovery failed, falling back to the built-in alias table: {e}");
            }
        }
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

async fn list_available_models(
    pool: &Arc<CredentialPool>,
    http_client: &reqwest::Client,
    region: &str,
    first_byte_timeout: Duration,
) -> Result<Vec<ModelEntry>, GatewayError> {
    let url = LIST_MODELS_URL_TEMPLATE.replace("{region}", region);
    let dispatched = http::dispatch(pool, http_client, &url, &serde_json::json!({}), first_byte_timeout).await?;

    let body: ListModelsResponse = dispatched
        .response
        .json()
        .await
        .map_err(|e| GatewayError::upstream(format!("malformed ListAvailableModels response: {e}"), None))?;

    // Discovery doesn't itself report capability flags: default every
    // discovered entry to the conservative `true` and let the upstream
    // reject an unsupported combination.
    Ok(body
        .models
        .into_iter()
        .map(|m| ModelEntry { upstream_id: m.model_id, supports_vision: true, supports_tools: true, supports_thinking: true })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_aliases_resolve_to_known_ids() {
        assert_eq!(builtin_alias("claude-sonnet-4.5").unwrap().upstream_id, "CLAUDE_SONNET_4_5_20250929_V1_0");
        assert_eq!(builtin_alias("claude-haiku-4.5").unwrap().upstream_id, "CLAUDE_HAIKU_4_5_20251001_V1_0");
        assert!(builtin_alias("not-a-real-alias").is_none());
    }

    #[test]
    fn raw_upstream_ids_are_recognized_by_shape() {
        assert!(looks_like_upstream_id("CLAUDE_SONNET_4_5_20250929_V1_0"));
        assert!(!looks_like_upstream_id("claude-sonnet-4.5"));
        assert!(!looks_like_upstream_id(""));
    }

    #[tokio::test]
    async fn resolve_falls_back_to_builtin_table_without_network() {
        let cache = ModelCache::new();
        let accounts = vec![config::AccountConfig::DesktopRefreshToken(secrecy::SecretString::from("x".to_string()))];
        let http_client = reqwest::Client::builder().build().unwrap();
        let pool = CredentialPool::new(accounts, "us-east-1".to_string(), http_client.clone());

        let entry = cache.resolve("claude-sonnet-4.5", &pool, &http_client, "us-east-1", Duration::from_millis(50)).await;
        assert_eq!(entry.upstream_id, "CLAUDE_SONNET_4_5_20250929_V1_0");
    }

    #[tokio::test]
    async fn resolve_yields_unknown_model_for_unresolvable_alias() {
        let cache = ModelCache::new();
        let accounts = vec![config::AccountConfig::DesktopRefreshToken(secrecy::SecretString::from("x".to_string()))];
        let http_client = reqwest::Client::builder().build().unwrap();
        let pool = CredentialPool::new(accounts, "us-east-1".to_string(), http_client.clone());

        let entry = cache.resolve("totally-made-up", &pool, &http_client, "us-east-1", Duration::from_millis(50)).await;
        assert_eq!(entry.upstream_id, "unknown-model");
    }
}
