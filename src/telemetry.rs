//! Tracing subscriber setup shared by the binaries.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

const LIBRARY_TARGET: &str = "attrition_pipeline";

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &LoggingConfig, target: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(target, &config.level))
            .with_context(|| format!("invalid log level '{}'", config.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

/// `<target>=<level>` plus the library crate, listed once.
fn default_directives(target: &str, level: &str) -> String {
    let mut directives = vec![format!("{}={}", target, level)];
    if target != LIBRARY_TARGET {
        directives.push(format!("{}={}", LIBRARY_TARGET, level));
    }
    directives.join(",")
}
