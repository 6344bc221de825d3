//! Process-wide configuration, loaded once from the environment at startup.

mod accounts;
mod error;
mod reasoning;

pub use accounts::{AccountConfig, SsoCredentials};
pub use error::ConfigError;
pub use reasoning::{FakeReasoningHandling, ReasoningConfig};

use secrecy::SecretString;
use std::time::Duration;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_FIRST_TOKEN_TIMEOUT_SECS: u64 = 15;
const DEFAULT_STREAMING_READ_TIMEOUT_SECS: u64 = 300;
const DEFAULT_BACKGROUND_REFRESH_INTERVAL_SECS: u64 = 1800;

/// Debug logging posture controlled by `DEBUG_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    #[default]
    Off,
    Errors,
    All,
}

impl DebugMode {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "off" => Ok(Self::Off),
            "errors" => Ok(Self::Errors),
            "all" => Ok(Self::All),
            other => Err(ConfigError::InvalidValue {
                var: "DEBUG_MODE",
                value: other.to_string(),
                reason: "expected one of off, errors, all",
            }),
        }
    }
}

/// Immutable, process-wide configuration built once at startup.
///
/// Construction collects every validation failure before returning rather than
/// failing on the first one, so a misconfigured deployment sees the whole list at once.
#[derive(Debug, Clone)]
pub struct Config {
    pub proxy_api_key: SecretString,
    pub accounts: Vec<AccountConfig>,
    pub region: String,
    pub profile_arn: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub vpn_proxy_url: Option<url::Url>,
    pub first_byte_timeout: Duration,
    pub streaming_read_timeout: Duration,
    pub background_refresh_interval: Duration,
    pub reasoning: ReasoningConfig,
    pub truncation_recovery: bool,
    pub log_level: String,
    pub debug_mode: DebugMode,
}

impl Config {
    /// Load and validate configuration from the process environment.
    ///
    /// All failures are collected; callers should print every message in
    /// [`ConfigError::Invalid`] and exit with code 1, per the exit code contract.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_iter(std::env::vars())
    }

    /// Testable variant of [`Config::from_env`] that reads from an arbitrary
    /// iterator instead of the real process environment.
    pub fn from_env_iter(vars: impl Iterator<Item = (String, String)>) -> Result<Self, ConfigError> {
        let env: std::collections::HashMap<String, String> = vars.collect();
        let get = |key: &str| env.get(key).cloned();

        let mut problems = Vec::new();

        let proxy_api_key = match get("PROXY_API_KEY") {
            Some(v) if !v.is_empty() => Some(SecretString::from(v)),
            _ => {
                problems.push("PROXY_API_KEY is required and must be non-empty".to_string());
                None
            }
        };

        let accounts = match accounts::load(&env) {
            Ok(accounts) => Some(accounts),
            Err(e) => {
                problems.push(e.to_string());
                None
            }
        };

        let region = get("KIRO_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let profile_arn = get("PROFILE_ARN");
        let server_host = get("SERVER_HOST").unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string());

        let server_port = match get("SERVER_PORT") {
            None => DEFAULT_SERVER_PORT,
            Some(raw) => match raw.parse() {
                Ok(port) => port,
                Err(_) => {
                    problems.push(format!("SERVER_PORT {raw:?} is not a valid port number"));
                    DEFAULT_SERVER_PORT
                }
            },
        };

        let vpn_proxy_url = match get("VPN_PROXY_URL") {
            None => None,
            Some(raw) => match url::Url::parse(&raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    problems.push(format!("VPN_PROXY_URL {raw:?} is not a valid URL: {e}"));
                    None
                }
            },
        };

        let first_byte_timeout = parse_secs(&get, "FIRST_TOKEN_TIMEOUT", DEFAULT_FIRST_TOKEN_TIMEOUT_SECS, &mut problems);
        let streaming_read_timeout =
            parse_secs(&get, "STREAMING_READ_TIMEOUT", DEFAULT_STREAMING_READ_TIMEOUT_SECS, &mut problems);
        let background_refresh_interval = parse_secs(
            &get,
            "BACKGROUND_REFRESH_INTERVAL",
            DEFAULT_BACKGROUND_REFRESH_INTERVAL_SECS,
            &mut problems,
        );

        let reasoning = reasoning::load(&get, &mut problems);

        let truncation_recovery = parse_bool(&get, "TRUNCATION_RECOVERY", true, &mut problems);
        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string());

        let debug_mode = match get("DEBUG_MODE") {
            None => DebugMode::Off,
            Some(raw) => match DebugMode::parse(&raw) {
                Ok(mode) => mode,
                Err(e) => {
                    problems.push(e.to_string());
                    DebugMode::Off
                }
            },
        };

        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        Ok(Config {
            proxy_api_key: proxy_api_key.expect("collected above"),
            accounts: accounts.expect("collected above"),
            region,
            profile_arn,
            server_host,
            server_port,
            vpn_proxy_url,
            first_byte_timeout,
            streaming_read_timeout,
            background_refresh_interval,
            reasoning,
            truncation_recovery,
            log_level,
            debug_mode,
        })
    }
}

fn parse_secs(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default_secs: u64,
    problems: &mut Vec<String>,
) -> Duration {
    match get(var) {
        None => Duration::from_secs(default_secs),
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                problems.push(format!("{var} {raw:?} is not a valid number of seconds"));
                Duration::from_secs(default_secs)
            }
        },
    }
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: bool, problems: &mut Vec<String>) -> bool {
    match get(var) {
        None => default,
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => {
                problems.push(format!("{var} {raw:?} is not a valid boolean"));
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> Vec<(String, String)> {
        vec![
            ("PROXY_API_KEY".to_string(), "sk-test".to_string()),
            ("REFRESH_TOKEN".to_string(), "rt-test".to_string()),
        ]
    }

    #[test]
    fn loads_minimal_valid_config() {
        let config = Config::from_env_iter(base_vars().into_iter()).unwrap();
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.server_port, DEFAULT_SERVER_PORT);
        assert!(config.truncation_recovery);
    }

    #[test]
    fn missing_api_key_and_accounts_are_both_reported() {
        let err = Config::from_env_iter(std::iter::empty()).unwrap_err();
        let ConfigError::Invalid(problems) = err else {
            panic!("expected Invalid variant");
        };
        assert!(problems.iter().any(|p| p.contains("PROXY_API_KEY")));
        assert!(problems.iter().any(|p| p.contains("account")));
    }

    #[test]
    fn bad_port_is_collected_alongside_other_errors() {
        let mut vars = base_vars();
        vars.push(("SERVER_PORT".to_string(), "not-a-port".to_string()));
        vars.push(("DEBUG_MODE".to_string(), "loud".to_string()));

        let err = Config::from_env_iter(vars.into_iter()).unwrap_err();
        let ConfigError::Invalid(problems) = err else {
            panic!("expected Invalid variant");
        };
        assert_eq!(problems.len(), 2);
    }
}
