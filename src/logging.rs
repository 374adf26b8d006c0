use std::env;
use std::fmt;
use std::io::IsTerminal as _;

use colored::Colorize;
use tracing::Event;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::config::RuntimeConfig;

pub const COLOR_ENV: &str = "CONDUCT_COLOR";

fn should_enable_ansi() -> bool {
    ansi_from(|key| env::var(key).ok(), || std::io::stdout().is_terminal())
}

fn ansi_from(var: impl Fn(&str) -> Option<String>, is_tty: impl Fn() -> bool) -> bool {
    // App-specific override first
    match var(COLOR_ENV).as_deref() {
        Some("always") => return true,
        Some("never") => return false,
        _ => {}
    }
    if var("NO_COLOR").is_some() {
        return false;
    }
    if matches!(var("CLICOLOR_FORCE").as_deref(), Some("1")) {
        return true;
    }
    if matches!(var("CLICOLOR").as_deref(), Some("0")) {
        return false;
    }
    is_tty()
}

/// Install the global subscriber. `RUST_LOG` wins over `config.log_filter`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_log_global(config: &RuntimeConfig) -> bool {
    let ansi = should_enable_ansi();
    colored::control::set_override(ansi);

    use tracing_subscriber::{EnvFilter, fmt::time::UtcTime};
    let formatter = ConductFormatter {
        ansi,
        timer: UtcTime::rfc_3339(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .event_format(formatter)
        .try_init()
        .is_ok()
}

#[derive(Clone)]
struct ConductFormatter<T> {
    ansi: bool,
    timer: T,
}

impl<T> ConductFormatter<T> {
    fn dim(&self, text: &str) -> String {
        if self.ansi {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }
}

impl<S, N, T> FormatEvent<S, N> for ConductFormatter<T>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
    T: FormatTime + Send + Sync,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        self.timer.format_time(&mut writer)?;
        write!(writer, " ")?;

        let meta = event.metadata();
        let level = meta.level();
        let file = meta.file().unwrap_or("?");
        let line = meta
            .line()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "?".into());

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let message = visitor.take_message();
        let kv = visitor.format_kv();

        let (lvl_colored, width) = match *level {
            tracing::Level::ERROR => ("ERROR".red().bold().to_string(), 5),
            tracing::Level::WARN => ("WARN".yellow().bold().to_string(), 4),
            tracing::Level::INFO => ("INFO".green().bold().to_string(), 4),
            tracing::Level::DEBUG => ("DEBUG".blue().bold().to_string(), 5),
            tracing::Level::TRACE => ("TRACE".magenta().bold().to_string(), 5),
        };
        let lvl_padded = if self.ansi {
            format!("{lvl_colored: <width$}")
        } else {
            format!("{:<width$}", level, width = width)
        };

        write!(
            writer,
            "{} {}: {} ",
            lvl_padded,
            self.dim(meta.target()),
            self.dim(&format!("{file}:{line}"))
        )?;

        match (message, kv.is_empty()) {
            (Some(msg), true) => write!(writer, "{msg}")?,
            (Some(msg), false) => write!(writer, "{msg} {kv}")?,
            (None, false) => write!(writer, "{kv}")?,
            (None, true) => {}
        }

        // Span scope, root first. Activation runs show up as [activate, activate, ...].
        if let Some(curr) = ctx.lookup_current() {
            let names: Vec<String> = curr
                .scope()
                .from_root()
                .map(|span| {
                    if self.ansi {
                        span.name().cyan().to_string()
                    } else {
                        span.name().to_string()
                    }
                })
                .collect();
            if !names.is_empty() {
                write!(
                    writer,
                    " {}{}{}",
                    self.dim("["),
                    names.join(self.dim(", ").as_str()),
                    self.dim("]")
                )?;
            }
        }

        writeln!(writer)
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl FieldVisitor {
    fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }
    fn format_kv(&self) -> String {
        self.fields.join(" ")
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}=\"{}\"", field.name(), value));
        }
    }
}
