//! Structured logging for report runs.
//!
//! Every record is one JSON line on stderr with a run id, a sequence
//! number, a level and a domain. When `LOG_DIR` is set the run also gets a
//! directory `<LOG_DIR>/<run_id>/` holding `events.jsonl`, `trace.jsonl`
//! and a small `manifest.json`.
//!
//! Environment:
//! - `LOG_LEVEL`: trace | debug | info | warn | error | fatal (default info)
//! - `LOG_DOMAINS`: comma-separated domain filter, or `all`
//! - `RUN_ID`: override the generated run id
//! - `LOG_DIR`: enable file sinks under this directory

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_LEVEL").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("trace") => Level::Trace,
            Some("debug") => Level::Debug,
            Some("info") => Level::Info,
            Some("warn") => Level::Warn,
            Some("error") => Level::Error,
            Some("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    System,    // Startup, configuration, shutdown
    Source,    // Connections and queries
    Normalize, // Category canonicalization
    Aggregate, // Counting, pivots, windows
    Export,    // Artifact writes
    Profile,   // Timing
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::System => "system",
            Domain::Source => "source",
            Domain::Normalize => "normalize",
            Domain::Aggregate => "aggregate",
            Domain::Export => "export",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        domain_enabled(std::env::var("LOG_DOMAINS").ok().as_deref(), *self)
    }
}

fn domain_enabled(filter: Option<&str>, domain: Domain) -> bool {
    match filter {
        Some("all") | None => true,
        Some(domains) => domains.split(',').any(|d| d.trim() == domain.as_str()),
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let Ok(base) = std::env::var("LOG_DIR") else {
            return RunContext { run_id, events: None, trace: None };
        };
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
            return RunContext { run_id, events: None, trace: None };
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        let open = |name: &str| match File::create(run_dir.join(name)) {
            Ok(f) => Some(Mutex::new(BufWriter::new(f))),
            Err(err) => {
                eprintln!("[log] failed to create {}: {}", name, err);
                None
            }
        };

        RunContext {
            events: open("events.jsonl"),
            trace: open("trace.jsonl"),
            run_id,
        }
    })
}

pub fn run_id() -> String {
    ensure_run_context().run_id.clone()
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["password", "AACT_PASS", "database_url", "DATABASE_URL"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["report", "artifact", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

fn build_record(
    run_id: &str,
    seq: u64,
    level: Level,
    component: &str,
    event: &str,
    fields: Map<String, Value>,
) -> Value {
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id));
    entry.insert("seq".to_string(), json!(seq));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry)
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let line = build_record(&ctx.run_id, next_seq(), level, component, event, fields).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    eprintln!("{}", line);
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_startup(report_names: &[&str], source: &str, out_dir: &str) {
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("version", v_str(env!("CARGO_PKG_VERSION"))),
            ("reports", Value::Array(report_names.iter().map(|r| v_str(r)).collect())),
            ("source", v_str(source)),
            ("out_dir", v_str(out_dir)),
        ]),
    );
}

pub fn log_query(label: &str, rows: usize) {
    log(
        Level::Debug,
        Domain::Source,
        "query",
        obj(&[("query", v_str(label)), ("rows", json!(rows))]),
    );
}

/// Count of records whose raw value fell through to Unknown, per dimension.
pub fn log_unmapped(report: &str, dimension: &str, unknown: u64, total: u64) {
    if unknown == 0 {
        return;
    }
    log(
        Level::Debug,
        Domain::Normalize,
        "unmapped",
        obj(&[
            ("report", v_str(report)),
            ("dimension", v_str(dimension)),
            ("unknown", json!(unknown)),
            ("total", json!(total)),
        ]),
    );
}

pub fn log_artifact(report: &str, artifact: &str, bytes: usize, rows: usize) {
    log(
        Level::Info,
        Domain::Export,
        "artifact_written",
        obj(&[
            ("report", v_str(report)),
            ("artifact", v_str(artifact)),
            ("bytes", json!(bytes)),
            ("rows", json!(rows)),
        ]),
    );
}

pub fn log_skipped(report: &str, artifact: &str, reason: &str) {
    log(
        Level::Warn,
        Domain::Export,
        "artifact_skipped",
        obj(&[
            ("report", v_str(report)),
            ("artifact", v_str(artifact)),
            ("msg", v_str(reason)),
        ]),
    );
}

/// Run summary on shutdown
pub fn log_run_summary(duration_ms: f64, reports: usize, artifacts: usize, skipped: usize) {
    log(
        Level::Info,
        Domain::System,
        "run_summary",
        obj(&[
            ("duration_ms", v_num(duration_ms)),
            ("reports", json!(reports)),
            ("artifacts", json!(artifacts)),
            ("skipped", json!(skipped)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Map<String, Value>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: obj(fields),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let mut fields = std::mem::take(&mut self.context);
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(self.elapsed_ms()));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parse_defaults_to_info() {
        assert_eq!(Level::parse(Some("debug")), Level::Debug);
        assert_eq!(Level::parse(Some("loud")), Level::Info);
        assert_eq!(Level::parse(None), Level::Info);
        assert!(Level::Trace < Level::Fatal);
    }

    #[test]
    fn domain_filter() {
        assert!(domain_enabled(None, Domain::Export));
        assert!(domain_enabled(Some("all"), Domain::Export));
        assert!(domain_enabled(Some("source, export"), Domain::Export));
        assert!(!domain_enabled(Some("source"), Domain::Export));
    }

    #[test]
    fn record_redacts_secrets_and_lifts_top_fields() {
        let record = build_record(
            "r-1",
            7,
            Level::Warn,
            "source",
            "connect",
            obj(&[
                ("password", v_str("hunter2")),
                ("report", v_str("dashboard")),
                ("msg", v_str("hello")),
                ("host", v_str("db")),
            ]),
        );
        assert_eq!(record["lvl"], "WARN");
        assert_eq!(record["seq"], 7);
        assert_eq!(record["msg"], "hello");
        assert_eq!(record["report"], "dashboard");
        assert_eq!(record["data"]["password"], "[REDACTED]");
        assert_eq!(record["data"]["host"], "db");
        assert!(record["data"].get("report").is_none());
    }
}
