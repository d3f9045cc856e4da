use core::fmt;
use std::fs::OpenOptions;
use std::sync::Once;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt as tracingfmt};

#[macro_export]
macro_rules! unimplemented_log {
    ( $($arg:tt)* ) => {{
        tracing::warn!(
            "unimplemented: {}",
            format_args!($($arg)*),
        );
    }};
}

/// if `cond` is false, logs a warning with your message.
#[macro_export]
macro_rules! assert_warn {
    ($cond:expr, $($arg:tt)+) => {{
        if !$cond {
            tracing::warn!(
                target: module_path!(),
                "assertion warning: `{}` failed: {} at {}:{}",
                stringify!($cond),
                format_args!($($arg)+),
                file!(),
                line!(),
            );
        }
    }};
}

struct AlignedFormatter;

/// Pulls the optional `slot` field out of an event so it can be printed
/// in front of the location instead of inside the message
struct SlotVisitor {
    slot: Option<String>,
}

impl tracing::field::Visit for SlotVisitor {
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        if field.name() == "slot" {
            self.slot = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "slot" {
            self.slot = Some(format!("{:?}", value));
        }
    }
}

/// "crates/gsmsim-modem/src/interpreter/server.rs" becomes "[modem/interpreter] server.rs"
fn short_location(file_path: &str) -> String {
    let Some(src_idx) = file_path.find("/src/") else {
        return file_path.to_string();
    };
    let before_src = &file_path[..src_idx];
    let after_src = &file_path[src_idx + 5..];

    let crate_name = match before_src.rfind("gsmsim-") {
        Some(idx) => &before_src[idx + 7..],
        None => before_src.rsplit('/').next().unwrap_or("unknown"),
    };

    match after_src.rfind('/') {
        Some(last_slash) => {
            let first_module = after_src[..last_slash].split('/').next().unwrap_or("");
            format!("[{}/{}] {}", crate_name, first_module, &after_src[last_slash + 1..])
        }
        None => format!("[{}] {}", crate_name, after_src),
    }
}

impl<S, N> FormatEvent<S, N> for AlignedFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let mut visitor = SlotVisitor { slot: None };
        event.record(&mut visitor);
        let slot_str = match &visitor.slot {
            Some(slot) => format!("slot {}", slot),
            None => "      ".to_string(),
        };

        let (color_level, color_reset) = if writer.has_ansi_escapes() {
            match *metadata.level() {
                tracing::Level::ERROR => ("\x1b[31m", "\x1b[0m"),
                tracing::Level::WARN => ("\x1b[33m", "\x1b[0m"),
                tracing::Level::INFO => ("\x1b[32m", "\x1b[0m"),
                tracing::Level::DEBUG => ("\x1b[34m", "\x1b[0m"),
                tracing::Level::TRACE => ("\x1b[35m", "\x1b[0m"),
            }
        } else {
            ("", "")
        };

        // Format: "LEVEL slot n [crate/module] file:line: message"
        let location = format!(
            "{}{:<5}{} {} {}:{}:",
            color_level,
            metadata.level(),
            color_reset,
            slot_str,
            short_location(metadata.file().unwrap_or("unknown")),
            metadata.line().unwrap_or(0)
        );

        let mut message_buf = String::new();
        let message_writer = format::Writer::new(&mut message_buf);
        ctx.field_format().format_fields(message_writer, event)?;

        // The slot was already printed up front
        if visitor.slot.is_some() {
            if let Some(slot_idx) = message_buf.find("slot=") {
                match message_buf[slot_idx..].find(' ') {
                    Some(space_idx) => message_buf.replace_range(slot_idx..slot_idx + space_idx + 1, ""),
                    None => message_buf.truncate(slot_idx),
                }
            }
        }

        // Wire traffic is logged as "<- AT..." / "-> OK", keep those aligned with the rest
        let mut padding = 64;
        if message_buf.starts_with("->") || message_buf.starts_with("<-") {
            padding -= 3;
        }

        write!(writer, "{:<width$} {}", location, message_buf, width = padding)?;
        writeln!(writer)
    }
}

static INIT_LOG: Once = Once::new();

/// Sets up logging with maximum verbosity (trace level)
/// Mainly for unit tests
pub fn setup_logging_verbose() {
    let _ = setup_logging(EnvFilter::new("trace"), None);
}

/// Sets up default logging to stdout and optionally, a verbose log file
/// Returns a guard that needs to be kept alive for logging to file to work
pub fn setup_logging_default(verbose_logfile: Option<String>) -> std::io::Result<Option<WorkerGuard>> {
    let logfile_and_filter = verbose_logfile.map(|file| (file, get_default_logfile_filter()));
    setup_logging(get_default_stdout_filter(), logfile_and_filter)
}

pub fn get_default_stdout_filter() -> EnvFilter {
    EnvFilter::new(concat!(
        "info,",
        // Per-line session traffic is only interesting when debugging a client
        "gsmsim_modem::interpreter=info,",
        "gsmsim_modem::interpreter::server=info,",
        // Call control decisions
        "gsmsim_modem::call_state=debug,",
        "gsmsim_modem::worker=info,",
        "gsmsim_modem::commands=debug",
    ))
}

fn get_default_logfile_filter() -> EnvFilter {
    EnvFilter::new("trace")
}

/// Sets up logging to stdout and optionally, a verbose log file.
/// If an output file is requested, returns Some<WorkerGuard>. Keep this value alive
/// or logging to file may cease working. Repeated calls are no-ops apart from
/// opening the requested file.
fn setup_logging(stdout_filter: EnvFilter, outfile: Option<(String, EnvFilter)>) -> std::io::Result<Option<WorkerGuard>> {
    if let Some((outfile, outfile_filter)) = outfile {
        let file = OpenOptions::new().create(true).append(true).open(outfile)?;
        let (file_writer, guard) = tracing_appender::non_blocking(file);

        INIT_LOG.call_once(|| {
            let file_layer = tracingfmt::layer()
                .event_format(AlignedFormatter)
                .with_writer(file_writer)
                .with_ansi(false);
            let stdout_layer = tracingfmt::layer().event_format(AlignedFormatter);

            let _ = tracing_subscriber::registry()
                .with(file_layer.with_filter(outfile_filter))
                .with(stdout_layer.with_filter(stdout_filter))
                .try_init();
        });

        Ok(Some(guard))
    } else {
        INIT_LOG.call_once(|| {
            let stdout_layer = tracingfmt::layer().event_format(AlignedFormatter);

            let _ = tracing_subscriber::registry()
                .with(stdout_layer.with_filter(stdout_filter))
                .try_init();
        });
        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use super::short_location;

    #[test]
    fn test_short_location() {
        assert_eq!(
            short_location("crates/gsmsim-modem/src/interpreter/server.rs"),
            "[modem/interpreter] server.rs"
        );
        assert_eq!(short_location("crates/gsmsim-core/src/call.rs"), "[core] call.rs");
        assert_eq!(short_location("main.rs"), "main.rs");
    }
}
