use anyhow::{anyhow, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` level.
///
/// Formats: "json" for structured output, "node" for compact lines without
/// targets, anything else for the full default format.
pub fn setup_tracing(log_format: &str, node_name: String) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt().with_env_filter(filter);
    let installed = match log_format {
        "json" => builder.json().try_init(),
        "node" => builder.compact().with_target(false).try_init(),
        _ => builder.try_init(),
    };
    installed.map_err(|e| anyhow!("installing tracing subscriber: {e}"))?;

    info!(node = %node_name, "Logging initialized");
    Ok(())
}
