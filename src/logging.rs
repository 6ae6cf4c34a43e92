//! Structured logging setup shared by every binary built on this crate.

use colored::*;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

/// Colorizes the whole event line by severity, with no timestamp or level
/// prefix — a terminal-friendly format for watching bus traffic scroll by
/// (spec's "Logging" ambient concern), as opposed to the uncolored,
/// fully-tagged layer written to the rolling file.
pub struct ColorizedFormatter;

impl ColorizedFormatter {
    /// Each severity gets its own color so a skim of the terminal can
    /// separate a flood of routed `METHOD_CALL`/`SIGNAL` traffic at DEBUG
    /// from the ERROR lines that actually need attention.
    fn paint(level: Level, line: String) -> ColoredString {
        match level {
            Level::ERROR => line.red(),
            Level::WARN => line.yellow(),
            Level::INFO => line.white(),
            Level::DEBUG => line.blue(),
            Level::TRACE => line.purple(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // `ctx.format_fields` writes straight to whatever `Writer` it's
        // given, so the line is rendered into a scratch buffer first and
        // colored as a whole rather than field-by-field.
        let mut line = String::new();
        ctx.format_fields(Writer::new(&mut line).by_ref(), event)?;

        writeln!(writer, "{}", Self::paint(*event.metadata().level(), line))
    }
}

/// Installs a global tracing subscriber: clean, colorized output on
/// stdout (unless `quiet`) plus, if `log_file` is given, a detailed
/// uncolored layer written to a daily-rolling file. Returns the file
/// appender's guard, which must be kept alive for the duration of the
/// program or file logging stops on drop.
pub fn init_tracing(verbosity: u8, quiet: bool, log_file: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let (detailed_layer, guard) = match log_file {
        Some(path_str) => {
            let log_path = std::path::Path::new(path_str);
            let log_dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let log_filename = log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("alljoyn-bus-core.log"));
            let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false).with_filter(level).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stdout_layer = if !quiet {
        Some(tracing_subscriber::fmt::layer().with_writer(std::io::stdout).event_format(ColorizedFormatter).with_filter(level))
    } else {
        None
    };

    tracing_subscriber::registry().with(detailed_layer).with(stdout_layer).init();
    guard
}