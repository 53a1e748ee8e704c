//! Tracing subscriber setup.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable single-line output.
    Plain,
    /// One JSON object per line.
    Json,
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Per-request trace
/// output is emitted under the `rofilter::trace::request` and
/// `rofilter::trace::ping` targets.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or the
/// filter directive is invalid.
pub fn init_tracing(format: LogFormat, default_filter: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);

    let installed = match format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_default_filter_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(init_tracing(LogFormat::Plain, "rofilter=notalevel").is_err());
    }
}
