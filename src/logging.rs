//! Log setup. Everything goes to stderr so stdout stays free for `index` output.

use anyhow::Context as _;

/// Install the stderr subscriber. `RUST_LOG` wins; otherwise `default_level` applies
/// to this crate and everything else stays at `warn`.
pub fn init(default_level: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            tracing_subscriber::EnvFilter::try_new(format!("warn,chapterpdf={}", default_level))
        })
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

/// Level used when `RUST_LOG` is unset.
pub fn default_level(quiet: bool, verbose: bool) -> &'static str {
    match (quiet, verbose) {
        (_, true) => "debug",
        (true, false) => "warn",
        (false, false) => "info",
    }
}
