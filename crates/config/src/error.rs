use std::fmt;

/// Errors raised while loading [`crate::Config`] from the environment.
#[derive(Debug)]
pub enum ConfigError {
    /// One or more environment variables failed validation. Carries every
    /// problem found, not just the first, so a misconfigured deployment sees
    /// the whole list in one run.
    Invalid(Vec<String>),

    /// A single env var had a value that could not be parsed.
    InvalidValue {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid(problems) => {
                writeln!(f, "invalid configuration:")?;
                for problem in problems {
                    writeln!(f, "  - {problem}")?;
                }
                Ok(())
            }
            ConfigError::InvalidValue { var, value, reason } => {
                write!(f, "{var} {value:?} is invalid: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
