use chrono::{SecondsFormat, Utc};
use std::fmt::Write as _;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Extra fields that are lifted to the top level of each JSON record.
/// Anything else an event carries is dropped from JSON output.
const RESERVED_FIELDS: &[&str] = &[
    "request_id",
    "user_id",
    "method",
    "path",
    "status_code",
    "duration_ms",
    "ip",
    "machine_id",
    "doc_id",
    "error_type",
    "exception",
    "event",
];

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(&'static str, serde_json::Value)>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: serde_json::Value) {
        if field.name() == "message" {
            self.message = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
        } else if let Some(name) = RESERVED_FIELDS.iter().find(|n| **n == field.name()) {
            self.fields.push((name, value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, serde_json::Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, serde_json::Value::String(format!("{value:?}")));
    }
}

/// Emits each event as one JSON line:
/// `{"timestamp", "severity", "logger", "message", ...reserved extras}`.
///
/// `severity` (not `level`) and `logger` (not `target`) so the output is
/// picked up as-is by Cloud Logging style aggregators.
struct JsonFormatter;

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = serde_json::Map::new();
        record.insert(
            "timestamp".into(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true).into(),
        );
        record.insert(
            "severity".into(),
            event.metadata().level().to_string().into(),
        );
        record.insert("logger".into(), event.metadata().target().into());
        record.insert("message".into(), visitor.message.clone().into());
        for (name, value) in visitor.fields {
            record.insert(name.to_string(), value);
        }

        writeln!(writer, "{}", serde_json::Value::Object(record))
    }
}

/// Initialize the tracing subsystem.
///
/// `log_format` selects JSON lines or human-readable text; `log_level` is
/// the default level when `RUST_LOG` is unset. Noisy library targets are
/// capped at WARN either way. Returns the guard keeping the non-blocking
/// file writer alive; hold it for the lifetime of the process.
pub fn init(log_format: &str, log_level: &str, log_dir: &std::path::Path) -> WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{log_level},hyper=warn,rustls=warn,r2d2=warn"
        ))
    });

    let file_appender = tracing_appender::rolling::daily(log_dir, "docshield.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(JsonFormatter)
                    .with_writer(std::io::stdout),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(JsonFormatter)
                    .with_writer(file_writer),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_writer),
            )
            .init();
    }

    guard
}
