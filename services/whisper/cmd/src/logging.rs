//! Console log formatting for the whisper binary.

use std::fmt;
use std::io::IsTerminal;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

const SOURCE_WIDTH: usize = 16;
const LEVEL_WIDTH: usize = 9;

/// Formats events as `[timestamp] [source] [level] message`.
///
/// The source column is the endpoint name, or `name/module` for events
/// emitted inside the whisper library crates.
pub struct WhisperLogFormatter {
    service_name: String,
    color_enabled: bool,
}

impl WhisperLogFormatter {
    pub fn new(service_name: String) -> Self {
        Self {
            service_name,
            color_enabled: color_supported(),
        }
    }

    #[cfg(test)]
    fn plain(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            color_enabled: false,
        }
    }

    fn format_source(&self, target: &str) -> String {
        let name = match target.strip_prefix("whisper_") {
            Some(rest) => {
                let module = rest.rsplit("::").next().unwrap_or(rest);
                format!("{}/{}", self.service_name, module)
            }
            None => self.service_name.clone(),
        };

        if name.chars().count() > SOURCE_WIDTH {
            let cut: String = name.chars().take(SOURCE_WIDTH - 1).collect();
            format!("{}…", cut)
        } else {
            format!("{:<width$}", name, width = SOURCE_WIDTH)
        }
    }

    fn format_level(&self, level: &tracing::Level) -> String {
        let label = match *level {
            tracing::Level::ERROR => "✗ ERROR",
            tracing::Level::WARN => "⚠ WARN",
            tracing::Level::INFO => "ℹ INFO",
            tracing::Level::DEBUG => "◦ DEBUG",
            tracing::Level::TRACE => "◦ TRACE",
        };
        format!("{:<width$}", label, width = LEVEL_WIDTH)
    }

    fn color_for_level(&self, level: &tracing::Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }

        match *level {
            tracing::Level::ERROR => COLOR_BRIGHT_RED,
            tracing::Level::WARN => COLOR_BRIGHT_YELLOW,
            tracing::Level::INFO => COLOR_GREEN,
            tracing::Level::DEBUG | tracing::Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }
}

impl<S, N> FormatEvent<S, N> for WhisperLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let metadata = event.metadata();
        let level = metadata.level();

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let color = self.color_for_level(level);
        let (cyan, reset) = if self.color_enabled {
            (COLOR_CYAN, COLOR_RESET)
        } else {
            ("", "")
        };

        write!(
            writer,
            "{}[{}] [{}] [{}{}{}] ",
            cyan,
            timestamp,
            self.format_source(metadata.target()),
            color,
            self.format_level(level),
            reset
        )?;
        writeln!(writer, "{}{}", visitor.message, reset)
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

fn color_supported() -> bool {
    if std::env::var("TERM").unwrap_or_default() == "dumb" || std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stdout().is_terminal()
}
