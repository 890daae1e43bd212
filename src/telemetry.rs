use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self as stdfmt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::Event;
use tracing::Subscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::{
    self as fmt_subscriber, format::Writer, FmtContext, FormatEvent, FormatFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "reqrep";
const TRANSFORM_DURATION_BUCKETS: [f64; 8] = [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0];

/// Telemetry source name shared by spans and counters.
pub const SOURCE_NAME: &str = "ReqRepTransformation";

pub const SPAN_PIPELINE_REQUEST: &str = "reqrep.pipeline.request";
pub const SPAN_PIPELINE_RESPONSE: &str = "reqrep.pipeline.response";
pub const SPAN_TRANSFORM_PREFIX: &str = "reqrep.transform";

pub const COUNTER_EXECUTED: &str = "reqrep.transform.executed";
pub const COUNTER_SKIPPED: &str = "reqrep.transform.skipped";
pub const COUNTER_FAILED: &str = "reqrep.transform.failed";

/// Stable log event identifiers, partitioned by phase.
pub mod event_id {
    pub const PIPELINE_STARTED: u16 = 1000;
    pub const PIPELINE_COMPLETED: u16 = 1001;
    pub const TRANSFORM_EXECUTING: u16 = 1100;
    pub const TRANSFORM_COMPLETED: u16 = 1101;
    pub const TRANSFORM_SKIPPED: u16 = 1102;
    pub const TRANSFORM_FAILED: u16 = 1200;
    pub const TRANSFORM_TIMED_OUT: u16 = 1201;
    pub const PIPELINE_ABORTED: u16 = 1300;
    pub const PLAN_ROW_DROPPED: u16 = 1500;
    pub const PLAN_RESOLVE_FAILED: u16 = 1501;
}

pub fn init_tracing() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reqrep=info,info"));

    let stdout = std::io::stdout;
    let stderr = std::io::stderr;

    let writer = stdout
        .with_max_level(tracing::Level::INFO)
        .or_else(stderr.with_min_level(tracing::Level::WARN));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(false)
        .with_ansi(false)
        .event_format(PipelineLogFormatter)
        .fmt_fields(fmt_subscriber::format::DefaultFields::new())
        .with_writer(writer)
        .try_init()
        .map_err(|err| crate::err!("failed to initialise tracing subscriber: {err}"))
}

/// One-event-per-line `key=value` formatter. Every value is escaped before
/// it reaches the line, so client-supplied text (header values, query
/// strings) can never split or forge a log record.
struct PipelineLogFormatter;

impl<S, N> FormatEvent<S, N> for PipelineLogFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let metadata = event.metadata();

        let mut captured = EventFields::default();
        event.record(&mut captured);

        let mut record = LogRecord::default();
        record.put(
            "ts",
            &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        record.put("level", metadata.level().as_str());
        record.put("service", SERVICE_NAME);
        record.put("component", metadata.target());
        record.put("pid", &std::process::id().to_string());

        if let Some(span) = ctx.lookup_current() {
            let path = span
                .scope()
                .from_root()
                .map(|scope| scope.name())
                .collect::<Vec<_>>()
                .join(".");
            record.put("span", &path);
        }

        let message = captured
            .message
            .unwrap_or_else(|| metadata.name().to_string());
        record.put("msg", &message);

        for (key, value) in &captured.fields {
            record.put(key, value);
        }

        if let Some(file) = metadata.file() {
            record.put("file", file);
        }
        if let Some(line) = metadata.line() {
            record.put("line", &line.to_string());
        }

        writer.write_str(record.as_line())?;
        writer.write_char('\n')
    }
}

/// Event payload split into the message and the remaining fields, keyed and
/// sorted; a repeated field name keeps the last value.
#[derive(Default)]
struct EventFields {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl EventFields {
    fn capture(&mut self, field: &Field, value: String) {
        match field.name() {
            "" => {}
            "message" => self.message = Some(value),
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.capture(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        self.capture(field, format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.capture(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.capture(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.capture(field, value.to_string());
    }
}

/// Accumulates escaped `key=value` pairs for a single log line.
#[derive(Default)]
struct LogRecord {
    line: String,
}

impl LogRecord {
    fn put(&mut self, key: &str, value: &str) {
        if !self.line.is_empty() {
            self.line.push(' ');
        }
        self.line.push_str(key);
        self.line.push('=');
        escape_into(&mut self.line, value);
    }

    fn as_line(&self) -> &str {
        &self.line
    }
}

/// Writes a value into the line, quoting when it contains whitespace,
/// structural characters or anything control. Newlines and other control
/// characters are always escaped, keeping the one-event-per-line invariant
/// regardless of what a client put in a header.
fn escape_into(line: &mut String, value: &str) {
    let needs_quoting = value.is_empty()
        || value.chars().any(|ch| {
            ch.is_whitespace()
                || ch.is_control()
                || matches!(ch, '"' | '\\' | '=' | '[' | ']' | '{' | '}' | ',')
        });

    if !needs_quoting {
        line.push_str(value);
        return;
    }

    line.push('"');
    for ch in value.chars() {
        match ch {
            '"' => line.push_str("\\\""),
            '\\' => line.push_str("\\\\"),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            '\t' => line.push_str("\\t"),
            ch if ch.is_control() => {
                for escaped in ch.escape_unicode() {
                    line.push(escaped);
                }
            }
            ch => line.push(ch),
        }
    }
    line.push('"');
}

#[derive(Default)]
pub struct RuntimeCounters {
    pipelines_started: AtomicU64,
    pipelines_completed: AtomicU64,
    pipelines_aborted: AtomicU64,
    transforms_executed: AtomicU64,
    transforms_skipped: AtomicU64,
    transforms_failed: AtomicU64,
    transform_outcomes: TransformOutcomeRegistry,
    transform_durations: TransformDurationMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeCountersSnapshot {
    pub pipelines_started: u64,
    pub pipelines_completed: u64,
    pub pipelines_aborted: u64,
    pub transforms_executed: u64,
    pub transforms_skipped: u64,
    pub transforms_failed: u64,
    pub transform_outcomes: Vec<TransformOutcomeSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformOutcomeSnapshot {
    pub transform: String,
    pub side: &'static str,
    pub executed: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransformDurationSnapshot {
    pub transform: String,
    pub buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

#[derive(Default)]
struct TransformOutcomeRegistry {
    entries: Mutex<HashMap<(String, &'static str), OutcomeCounts>>,
}

#[derive(Default, Clone, Copy)]
struct OutcomeCounts {
    executed: u64,
    skipped: u64,
    failed: u64,
}

impl TransformOutcomeRegistry {
    fn record(&self, transform: &str, side: &'static str, apply: impl FnOnce(&mut OutcomeCounts)) {
        let mut entries = self
            .entries
            .lock()
            .expect("transform outcome lock poisoned");
        let counts = entries
            .entry((transform.to_string(), side))
            .or_default();
        apply(counts);
    }

    fn snapshot(&self) -> Vec<TransformOutcomeSnapshot> {
        let entries = self
            .entries
            .lock()
            .expect("transform outcome lock poisoned");
        let mut snapshot: Vec<_> = entries
            .iter()
            .map(|((transform, side), counts)| TransformOutcomeSnapshot {
                transform: transform.clone(),
                side,
                executed: counts.executed,
                skipped: counts.skipped,
                failed: counts.failed,
            })
            .collect();
        snapshot.sort_by(|lhs, rhs| {
            (lhs.transform.as_str(), lhs.side).cmp(&(rhs.transform.as_str(), rhs.side))
        });
        snapshot
    }
}

#[derive(Default)]
struct TransformDurationMetrics {
    durations: Mutex<HashMap<String, DurationBuckets>>,
}

impl TransformDurationMetrics {
    fn record(&self, transform: &str, duration: Duration) {
        let mut durations = self
            .durations
            .lock()
            .expect("transform duration lock poisoned");
        let entry = durations.entry(transform.to_string()).or_default();
        entry.observe(duration.as_secs_f64());
    }

    fn snapshot(&self) -> Vec<TransformDurationSnapshot> {
        let durations = self
            .durations
            .lock()
            .expect("transform duration lock poisoned");
        let mut snapshot: Vec<_> = durations
            .iter()
            .map(|(transform, buckets)| TransformDurationSnapshot {
                transform: transform.clone(),
                buckets: buckets.histogram(),
                sum: buckets.sum,
                count: buckets.total,
            })
            .collect();
        snapshot.sort_by(|lhs, rhs| lhs.transform.cmp(&rhs.transform));
        snapshot
    }
}

#[derive(Default)]
struct DurationBuckets {
    counts: [u64; TRANSFORM_DURATION_BUCKETS.len()],
    sum: f64,
    total: u64,
}

impl DurationBuckets {
    fn observe(&mut self, duration_secs: f64) {
        for (idx, boundary) in TRANSFORM_DURATION_BUCKETS.iter().enumerate() {
            if duration_secs <= *boundary {
                self.counts[idx] += 1;
            }
        }
        self.sum += duration_secs;
        self.total += 1;
    }

    fn histogram(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0;
        TRANSFORM_DURATION_BUCKETS
            .iter()
            .enumerate()
            .map(|(idx, boundary)| {
                cumulative += self.counts[idx];
                (*boundary, cumulative)
            })
            .collect()
    }
}

static RUNTIME_COUNTERS: OnceLock<RuntimeCounters> = OnceLock::new();

pub fn runtime_counters() -> &'static RuntimeCounters {
    RUNTIME_COUNTERS.get_or_init(RuntimeCounters::default)
}

impl RuntimeCounters {
    pub fn inc_pipelines_started(&self) {
        self.pipelines_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pipelines_completed(&self) {
        self.pipelines_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pipelines_aborted(&self) {
        self.pipelines_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transform_executed(
        &self,
        transform: &str,
        side: &'static str,
        elapsed: Duration,
    ) {
        self.transforms_executed.fetch_add(1, Ordering::Relaxed);
        self.transform_outcomes
            .record(transform, side, |counts| counts.executed += 1);
        self.transform_durations.record(transform, elapsed);
    }

    pub fn record_transform_skipped(&self, transform: &str, side: &'static str) {
        self.transforms_skipped.fetch_add(1, Ordering::Relaxed);
        self.transform_outcomes
            .record(transform, side, |counts| counts.skipped += 1);
    }

    pub fn record_transform_failed(&self, transform: &str, side: &'static str) {
        self.transforms_failed.fetch_add(1, Ordering::Relaxed);
        self.transform_outcomes
            .record(transform, side, |counts| counts.failed += 1);
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        RuntimeCountersSnapshot {
            pipelines_started: self.pipelines_started.load(Ordering::Relaxed),
            pipelines_completed: self.pipelines_completed.load(Ordering::Relaxed),
            pipelines_aborted: self.pipelines_aborted.load(Ordering::Relaxed),
            transforms_executed: self.transforms_executed.load(Ordering::Relaxed),
            transforms_skipped: self.transforms_skipped.load(Ordering::Relaxed),
            transforms_failed: self.transforms_failed.load(Ordering::Relaxed),
            transform_outcomes: self.transform_outcomes.snapshot(),
        }
    }

    pub fn transform_durations_snapshot(&self) -> Vec<TransformDurationSnapshot> {
        self.transform_durations.snapshot()
    }
}
