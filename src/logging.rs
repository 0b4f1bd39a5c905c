//! Logging setup: verbosity maps to an `EnvFilter`
//! directive, `--logtype` selects the `tracing-subscriber` fmt layer.
//!
//! User-facing progress lines go out on the `atomicapp::ui` target, kept
//! separate from the rest of the diagnostic log stream so `--quiet` can
//! silence one without the other.

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::LogType;

/// Initializes the global tracing subscriber. Idempotent within a process;
/// call once from `main`.
pub(crate) fn init(verbose: bool, quiet: bool, logtype: LogType) {
    let filter = build_filter(verbose, quiet);
    let fmt_layer = build_fmt_layer(logtype);

    Registry::default().with(filter).with(fmt_layer).init();
}

fn build_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return from_env;
    }

    let base = match (verbose, quiet) {
        (_, true) => "warn",
        (true, false) => "debug",
        (false, false) => "info",
    };

    // `atomicapp::ui` carries user-facing progress lines and stays at `info`
    // unless `--quiet` silences everything.
    let ui_level = if quiet { "warn" } else { "info" };
    EnvFilter::new(format!("{base},atomicapp::ui={ui_level}"))
}

fn build_fmt_layer(logtype: LogType) -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
    match logtype {
        LogType::None => tracing_subscriber::fmt::layer()
            .with_writer(std::io::sink)
            .boxed(),
        LogType::Cockpit => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed(),
        LogType::Color => tracing_subscriber::fmt::layer().with_ansi(true).boxed(),
        LogType::Nocolor => tracing_subscriber::fmt::layer().with_ansi(false).boxed(),
    }
}
