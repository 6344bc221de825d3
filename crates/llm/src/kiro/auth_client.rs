//! Refresh-endpoint HTTP calls, split out from the pool logic in
//! [`super::credentials`] so the pool can be tested without a network.

use config::AccountConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::error::GatewayError;

const DESKTOP_REFRESH_URL_TEMPLATE: &str = "https://prod.{region}.auth.desktop.kiro.dev/refreshToken";
const SSO_OIDC_URL_TEMPLATE: &str = "https://oidc.{region}.amazonaws.com/token";

pub struct RefreshedToken {
    pub access_token: SecretString,
    pub expires_in: Duration,
}

#[derive(Deserialize)]
struct DesktopRefreshResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "expiresIn", default = "default_expires_in")]
    expires_in: u64,
}

#[derive(Deserialize)]
struct SsoOidcResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Perform one refresh-token exchange, routing to the desktop or SSO OIDC
/// endpoint depending on which shape the account was configured with.
pub async fn refresh(client: &reqwest::Client, account: &AccountConfig, region: &str) -> Result<RefreshedToken, GatewayError> {
    match account {
        AccountConfig::DesktopRefreshToken(token) => refresh_desktop(client, token, region).await,
        AccountConfig::Sso(sso) => refresh_sso(client, sso, region).await,
    }
}

async fn refresh_desktop(client: &reqwest::Client, refresh_token: &SecretString, region: &str) -> Result<RefreshedToken, GatewayError> {
    let url = DESKTOP_REFRESH_URL_TEMPLATE.replace("{region}", region);

    let response = client
        .post(&url)
        .json(&serde_json::json!({ "refreshToken": refresh_token.expose_secret() }))
        .send()
        .await
        .map_err(|e| GatewayError::upstream(format!("refresh request failed: {e}"), None))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        return Err(GatewayError::upstream("refresh token rejected", Some(status)));
    }

    let body: DesktopRefreshResponse = response
        .json()
        .await
        .map_err(|e| GatewayError::upstream(format!("malformed refresh response: {e}"), None))?;

    Ok(RefreshedToken { access_token: SecretString::from(body.access_token), expires_in: Duration::from_secs(body.expires_in) })
}

async fn refresh_sso(
    client: &reqwest::Client,
    sso: &config::SsoCredentials,
    region: &str,
) -> Result<RefreshedToken, GatewayError> {
    let url = SSO_OIDC_URL_TEMPLATE.replace("{region}", region);

    let response = client
        .post(&url)
        .json(&serde_json::json!({
            "clientId": sso.client_id.expose_secret(),
            "clientSecret": sso.client_secret.expose_secret(),
            "grantType": "refresh_token",
            "refreshToken": sso.refresh_token.expose_secret(),
        }))
        .send()
        .await
        .map_err(|e| GatewayError::upstream(format!("SSO refresh request failed: {e}"), None))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        return Err(GatewayError::upstream("SSO refresh token rejected", Some(status)));
    }

    let body: SsoOidcResponse = response
        .json()
        .await
        .map_err(|e| GatewayError::upstream(format!("malformed SSO refresh response: {e}"), None))?;

    Ok(RefreshedToken { access_token: SecretString::from(body.access_token), expires_in: Duration::from_secs(body.expires_in) })
}
