use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;

/// One configured Kiro account: either a bare desktop refresh token, or an
/// AWS SSO OIDC `{clientId, clientSecret, refreshToken}` triple.
#[derive(Debug, Clone)]
pub enum AccountConfig {
    DesktopRefreshToken(SecretString),
    Sso(SsoCredentials),
}

#[derive(Debug, Clone)]
pub struct SsoCredentials {
    pub client_id: SecretString,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
}

impl AccountConfig {
    pub fn refresh_token(&self) -> &SecretString {
        match self {
            AccountConfig::DesktopRefreshToken(token) => token,
            AccountConfig::Sso(sso) => &sso.refresh_token,
        }
    }
}

/// Shape of one entry in `KIRO_CREDS_FILE` / `KIRO_CLI_DB_FILE`'s exported
/// JSON array. `KIRO_CLI_DB_FILE` is accepted as an alternate path to the
/// same shape, not a reimplementation of the CLI's internal store.
#[derive(Debug, Deserialize)]
struct CredsFileEntry {
    refresh_token: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

/// Build the ordered account list, honoring precedence
/// `REFRESH_TOKEN`/`REFRESH_TOKEN<N>` > `KIRO_CREDS_FILE` > `KIRO_CLI_DB_FILE`.
pub(crate) fn load(env: &HashMap<String, String>) -> Result<Vec<AccountConfig>, String> {
    if let Some(accounts) = from_numbered_env(env) {
        return Ok(accounts);
    }

    if let Some(path) = env.get("KIRO_CREDS_FILE") {
        return from_creds_file(path);
    }

    if let Some(path) = env.get("KIRO_CLI_DB_FILE") {
        return from_creds_file(path);
    }

    Err("no account configured: set REFRESH_TOKEN, REFRESH_TOKEN<N>, KIRO_CREDS_FILE, or KIRO_CLI_DB_FILE".to_string())
}

fn from_numbered_env(env: &HashMap<String, String>) -> Option<Vec<AccountConfig>> {
    let mut accounts = Vec::new();

    if let Some(token) = env.get("REFRESH_TOKEN") {
        accounts.push(single_from_env(env, "", token));
    }

    let mut index = 1;
    loop {
        let key = format!("REFRESH_TOKEN{index}");
        match env.get(&key) {
            Some(token) => {
                accounts.push(single_from_env(env, &index.to_string(), token));
                index += 1;
            }
            None => break,
        }
    }

    if accounts.is_empty() { None } else { Some(accounts) }
}

fn single_from_env(env: &HashMap<String, String>, suffix: &str, refresh_token: &str) -> AccountConfig {
    let client_id = env.get(&format!("CLIENT_ID{suffix}"));
    let client_secret = env.get(&format!("CLIENT_SECRET{suffix}"));

    match (client_id, client_secret) {
        (Some(id), Some(secret)) => AccountConfig::Sso(SsoCredentials {
            client_id: SecretString::from(id.clone()),
            client_secret: SecretString::from(secret.clone()),
            refresh_token: SecretString::from(refresh_token.to_string()),
        }),
        _ => AccountConfig::DesktopRefreshToken(SecretString::from(refresh_token.to_string())),
    }
}

fn from_creds_file(path: &str) -> Result<Vec<AccountConfig>, String> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| format!("failed to read credentials file {path:?}: {e}"))?;

    let entries: Vec<CredsFileEntry> =
        serde_json::from_str(&contents).map_err(|e| format!("failed to parse credentials file {path:?}: {e}"))?;

    if entries.is_empty() {
        return Err(format!("credentials file {path:?} contains no accounts"));
    }

    Ok(entries
        .into_iter()
        .map(|entry| match (entry.client_id, entry.client_secret) {
            (Some(id), Some(secret)) => AccountConfig::Sso(SsoCredentials {
                client_id: SecretString::from(id),
                client_secret: SecretString::from(secret),
                refresh_token: SecretString::from(entry.refresh_token),
            }),
            _ => AccountConfig::DesktopRefreshToken(SecretString::from(entry.refresh_token)),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn single_refresh_token() {
        let accounts = load(&env(&[("REFRESH_TOKEN", "rt-a")])).unwrap();
        assert_eq!(accounts.len(), 1);
    }

    #[test]
    fn numbered_refresh_tokens_are_ordered() {
        let accounts = load(&env(&[
            ("REFRESH_TOKEN1", "rt-1"),
            ("REFRESH_TOKEN2", "rt-2"),
            ("REFRESH_TOKEN3", "rt-3"),
        ]))
        .unwrap();
        assert_eq!(accounts.len(), 3);
    }

    #[test]
    fn sso_shaped_when_client_id_and_secret_present() {
        let accounts = load(&env(&[
            ("REFRESH_TOKEN", "rt-a"),
            ("CLIENT_ID", "id-a"),
            ("CLIENT_SECRET", "secret-a"),
        ]))
        .unwrap();
        assert!(matches!(accounts[0], AccountConfig::Sso(_)));
    }

    #[test]
    fn no_accounts_configured_is_an_error() {
        assert!(load(&env(&[])).is_err());
    }
}
