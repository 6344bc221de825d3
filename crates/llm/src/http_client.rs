//! Process-wide HTTP client. Built once, shared by every call site; never
//! rebuilt per request.

use std::sync::OnceLock;
use std::time::Duration;

static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// The shared `reqwest::Client`. Per-request timeouts (first-byte,
/// streaming-read) are applied by the caller, not baked in here, since they
/// vary by call site; this only configures connection-level behavior.
pub fn http_client() -> &'static reqwest::Client {
    CLIENT.get_or_init(|| default_builder().build().expect("static http client config is valid"))
}

/// Build a client routed through an outbound proxy (`VPN_PROXY_URL`).
/// Not cached: used only for the rare deployment that sets the var, so a
/// fresh client per-process-lifetime is fine.
pub fn proxied_http_client(proxy_url: &url::Url) -> reqwest::Result<reqwest::Client> {
    default_builder().proxy(reqwest::Proxy::all(proxy_url.as_str())?).build()
}

fn default_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .tcp_keepalive(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
}
