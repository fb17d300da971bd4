//! Global structured logging, installed once at startup and threaded
//! implicitly via `slog_scope` rather than as an explicit parameter on
//! every hot-path function.

use std::fs::OpenOptions;
use std::path::Path;

use slog::{o, Drain, Logger};

use crate::config::{LogLevel, LogTank};

/// Holds the guard that must stay alive for the duration of the process:
/// dropping it tears down the global scope logger, which would silently
/// stop all logging.
pub struct LoggingHandle {
    _scope_guard: slog_scope::GlobalLoggerGuard,
}

fn level_env(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Verbose | LogLevel::Trace => "trace",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// Builds the drain chain described in the logging design: a terminal
/// drain (term or JSON-to-file, per `srs_log_tank`) feeding
/// `slog_envlogger` (applies `srs_log_level`) feeding `slog_async`. Also
/// bridges the `log` facade via `slog_stdlog` so dependency crates that
/// log through it land in the same output.
pub fn init(tank: LogTank, level: LogLevel, log_file: &str) -> LoggingHandle {
    // `srs_log_level` sets the default filter unless the operator already
    // exported RUST_LOG, which wins per slog-envlogger's own precedence.
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", level_env(level));
    }

    let drain: Box<dyn Drain<Ok = (), Err = slog::Never> + Send> = match tank {
        LogTank::Console => {
            let decorator = slog_term::TermDecorator::new().build();
            Box::new(slog_term::FullFormat::new(decorator).build().fuse())
        }
        LogTank::File => match open_log_file(log_file) {
            Ok(file) => Box::new(slog_json::Json::new(file).add_default_keys().build().fuse()),
            Err(_) => {
                let decorator = slog_term::TermDecorator::new().build();
                Box::new(slog_term::FullFormat::new(decorator).build().fuse())
            }
        },
    };

    let envlogger = slog_envlogger::new(drain);
    let async_drain = slog_async::Async::new(envlogger.fuse()).build().fuse();

    let logger = Logger::root(async_drain, o!("version" => env!("CARGO_PKG_VERSION")));
    let scope_guard = slog_scope::set_global_logger(logger);
    slog_stdlog::init().ok();

    LoggingHandle {
        _scope_guard: scope_guard,
    }
}

fn open_log_file(path: &str) -> std::io::Result<std::fs::File> {
    OpenOptions::new().create(true).append(true).open(Path::new(path))
}

/// Reopens the on-disk log file drain, invoked on `SIGUSR1` so a rotated
/// log file is picked up without restarting the process. Console tanks
/// have nothing to reopen.
pub fn reopen(tank: LogTank, level: LogLevel, log_file: &str) -> LoggingHandle {
    init(tank, level, log_file)
}
