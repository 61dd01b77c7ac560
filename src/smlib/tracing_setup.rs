use crate::cfg::get_log_folder;
use backtrace::Backtrace;
use std::{io, panic::PanicHookInfo, path::Path, sync::Once};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{Layer, writer::MakeWriterExt},
    prelude::*,
};

const LOG_FILE_PREFIX: &str = "slicemark.log";

fn log_panic(info: &PanicHookInfo) {
    tracing::error!("{info}\n{:?}", Backtrace::new());
}

/// Like [`tracing_setup`] but with the rolling log files in `log_folder`.
/// # Panics
/// If a global subscriber has been set already.
pub fn tracing_setup_in(log_folder: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_folder, LOG_FILE_PREFIX);
    let (file_appender, guard_flush_file) = tracing_appender::non_blocking(file_appender);
    let file_layer = Layer::new()
        .with_writer(file_appender.with_max_level(Level::INFO))
        .with_line_number(true)
        .compact()
        .with_ansi(false)
        .with_file(true);
    #[cfg(not(feature = "print_debug"))]
    let stdout_level = Level::INFO;
    #[cfg(feature = "print_debug")]
    let stdout_level = Level::DEBUG;
    // warnings and errors go to stderr, the rest to stdout
    let console = io::stderr
        .with_max_level(Level::WARN)
        .or_else(io::stdout.with_max_level(stdout_level));
    let console_layer = Layer::new()
        .with_writer(console)
        .with_file(true)
        .with_line_number(true);
    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();
    std::panic::set_hook(Box::new(log_panic));
    guard_flush_file
}

/// Logs to the console and to a daily rolling file in the log folder next to the config.
/// The returned guard flushes the file log when dropped, keep it alive in `main`.
pub fn tracing_setup() -> WorkerGuard {
    tracing_setup_in(&get_log_folder())
}

static INIT: Once = Once::new();

pub fn init_tracing_for_tests() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .init();
    });
}
