//! Tracing initialisation for the evaluation binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use std::fs::File;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// * `json`: newline-delimited JSON on stderr instead of plain text.
/// * `level`: default verbosity when `RUST_LOG` is not set.
/// * `log_file`: also write plain-text events to this file.
pub fn init_tracing(json: bool, level: Level, log_file: Option<File>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let stderr_json =
        json.then(|| fmt::layer().with_target(false).with_writer(std::io::stderr).json());
    let stderr_plain =
        (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let file = log_file.map(|f| {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(f))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_json)
        .with(stderr_plain)
        .with(file)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::create(dir.path().join("run.log")).unwrap();
        init_tracing(true, Level::DEBUG, Some(file));
        init_tracing(false, Level::INFO, None);
        tracing::info!(event = "telemetry.ready");
    }
}
