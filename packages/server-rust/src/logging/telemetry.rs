//! Process-wide `tracing` subscriber setup.
//!
//! In the hosted environment events are written to stdout as one JSON object
//! per line in the structured-logging shape the Cloud Logging agent parses:
//! `severity`, `message`, `timestamp`, source location, and the
//! `logging.googleapis.com/trace` resource name built from the request span's
//! `trace_id`. Lines carrying the same trace are bundled under one request in
//! the log viewer. Locally a human-readable format is used.

use std::fmt::{self, Write as _};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{JsonFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable whose presence marks the hosted environment.
pub const HOSTED_ENV_MARKER: &str = "APP_ENGINE_ENVIRONMENT";

const DEFAULT_FILTER: &str = "info";

const TRACE_FIELD: &str = "logging.googleapis.com/trace";
const SOURCE_LOCATION_FIELD: &str = "logging.googleapis.com/sourceLocation";

/// Output format selected for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for local development.
    Pretty,
    /// Cloud Logging structured JSON lines.
    Json,
}

impl LogFormat {
    /// JSON when hosted, pretty otherwise.
    #[must_use]
    pub fn for_environment(hosted: bool) -> Self {
        if hosted {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` filter.
///
/// `project_id` qualifies trace ids in JSON output; without it the raw
/// `trace_id` field is kept and Cloud Logging will not group by request.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init_tracing(format: LogFormat, project_id: Option<String>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(cloud_logging_layer(project_id, std::io::stdout))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()?,
    }
    Ok(())
}

/// A `fmt` layer writing Cloud Logging JSON lines to `writer`.
pub fn cloud_logging_layer<S, W>(
    project_id: Option<String>,
    writer: W,
) -> tracing_subscriber::fmt::Layer<S, JsonFields, CloudLoggingFormat, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'a> MakeWriter<'a> + 'static,
{
    tracing_subscriber::fmt::layer()
        .fmt_fields(JsonFields::new())
        .event_format(CloudLoggingFormat::new(project_id))
        .with_writer(writer)
}

/// Event formatter producing one Cloud Logging structured entry per line.
///
/// Span fields (as recorded by [`JsonFields`]) are merged into the entry,
/// outermost span first, then the event's own fields.
#[derive(Debug, Clone, Default)]
pub struct CloudLoggingFormat {
    project_id: Option<String>,
}

impl CloudLoggingFormat {
    #[must_use]
    pub fn new(project_id: Option<String>) -> Self {
        Self {
            project_id: project_id.filter(|p| !p.is_empty()),
        }
    }

    fn trace_resource(&self, trace_id: &str) -> Option<String> {
        self.project_id
            .as_deref()
            .map(|project| format!("projects/{project}/traces/{trace_id}"))
    }
}

/// Maps `tracing` levels onto Cloud Logging `LogSeverity` names.
fn severity(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        _ => "DEBUG",
    }
}

impl<S, N> FormatEvent<S, N> for CloudLoggingFormat
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
        let mut entry = Map::new();

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                let Some(fields) = extensions.get::<FormattedFields<N>>() else {
                    continue;
                };
                if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&fields.fields) {
                    entry.extend(map);
                }
            }
        }
        event.record(&mut JsonVisitor(&mut entry));

        if let Some(Value::String(trace_id)) = entry.remove("trace_id") {
            if !trace_id.is_empty() {
                match self.trace_resource(&trace_id) {
                    Some(resource) => entry.insert(TRACE_FIELD.to_string(), resource.into()),
                    None => entry.insert("trace_id".to_string(), trace_id.into()),
                };
            }
        }

        let meta = event.metadata();
        entry.insert("severity".to_string(), severity(*meta.level()).into());
        entry
            .entry("message")
            .or_insert_with(|| Value::String(String::new()));
        entry.insert("target".to_string(), meta.target().into());
        entry.insert(
            SOURCE_LOCATION_FIELD.to_string(),
            json!({
                "file": meta.file().unwrap_or_default(),
                "line": meta.line().map(|l| l.to_string()).unwrap_or_default(),
                "function": meta.module_path().unwrap_or_default(),
            }),
        );
        if let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) {
            entry.insert(
                "timestamp".to_string(),
                json!({ "seconds": now.as_secs(), "nanos": now.subsec_nanos() }),
            );
        }

        let line = serde_json::to_string(&entry).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

/// Collects event fields into a JSON object.
struct JsonVisitor<'a>(&'a mut Map<String, Value>);

impl Visit for JsonVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), format!("{value:?}").into());
    }
}
