/// How extracted `<thinking>` content is surfaced to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FakeReasoningHandling {
    Strip,
    #[default]
    Passthrough,
    SyntheticOnMissing,
}

impl FakeReasoningHandling {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "strip" => Some(Self::Strip),
            "passthrough" => Some(Self::Passthrough),
            "synthetic-on-missing" => Some(Self::SyntheticOnMissing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub enabled: bool,
    pub max_tokens: u32,
    pub handling: FakeReasoningHandling,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tokens: 4000,
            handling: FakeReasoningHandling::default(),
        }
    }
}

pub(crate) fn load(get: &impl Fn(&str) -> Option<String>, problems: &mut Vec<String>) -> ReasoningConfig {
    let mut config = ReasoningConfig::default();

    if let Some(raw) = get("FAKE_REASONING_ENABLED") {
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => config.enabled = true,
            "false" | "0" | "no" => config.enabled = false,
            _ => problems.push(format!("FAKE_REASONING_ENABLED {raw:?} is not a valid boolean")),
        }
    }

    if let Some(raw) = get("FAKE_REASONING_MAX_TOKENS") {
        match raw.parse() {
            Ok(max_tokens) => config.max_tokens = max_tokens,
            Err(_) => problems.push(format!("FAKE_REASONING_MAX_TOKENS {raw:?} is not a valid number")),
        }
    }

    if let Some(raw) = get("FAKE_REASONING_HANDLING") {
        match FakeReasoningHandling::parse(&raw) {
            Some(handling) => config.handling = handling,
            None => problems.push(format!(
                "FAKE_REASONING_HANDLING {raw:?} is not one of strip, passthrough, synthetic-on-missing"
            )),
        }
    }

    config
}
