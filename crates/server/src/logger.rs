//! Logger initialization for the server: a single stderr appender behind an
//! env-style filter, built on `logforth`.

use std::str::FromStr;
use std::sync::Once;

use config::DebugMode;
use logforth::append::Stderr;
use logforth::filter::EnvFilter;

static INIT: Once = Once::new();

/// Initializes the global logger once. `log_filter` sets the baseline level
/// (`LOG_LEVEL`); `DEBUG_MODE=all` widens it to `debug` regardless of
/// `log_filter` so per-request shape decisions are visible.
pub fn init(log_filter: &str, debug_mode: DebugMode) {
    let filter = match debug_mode {
        DebugMode::All => "debug",
        _ => log_filter,
    }
    .to_owned();

    INIT.call_once(move || {
        logforth::builder()
            .dispatch(move |d| {
                let env_filter = EnvFilter::from_str(&filter)
                    .unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter is valid"));
                d.filter(env_filter).append(Stderr::default())
            })
            .apply();
    });
}
