// Logging for the terminal client, powered by tracing-subscriber.
//
// chat-link logs through the `log` facade; `tracing_log::LogTracer` routes
// those records into the same subscriber. Output goes to stderr so it never
// interleaves with the chat transcript on stdout.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{CLIError, Result};

/// Build the filter from the base level plus noisy-crate overrides.
///
/// `RUST_LOG`, when set, wins over both.
pub fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![level.to_string()];
    let noisy: &[(&str, &str)] = &[
        ("tungstenite", "warn"),
        ("tokio_tungstenite", "warn"),
        ("rustls", "warn"),
        ("hyper", "warn"),
        ("hyper_util", "warn"),
        ("reqwest", "warn"),
    ];
    for (target, lvl) in noisy {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str).map_err(|e| {
        CLIError::LoggingError(format!("Invalid log filter '{}': {}", filter_str, e))
    })
}

/// Install the global subscriber. `verbose` forces `debug`.
pub fn init_logging(level: &str, verbose: bool, color: bool) -> Result<()> {
    let level = if verbose { "debug" } else { level };

    // Already initialized is fine (tests, embedding).
    tracing_log::LogTracer::init().ok();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(color)
        .with_target(verbose)
        .compact()
        .with_filter(build_env_filter(level)?);

    tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .map_err(|e| CLIError::LoggingError(e.to_string()))
}
