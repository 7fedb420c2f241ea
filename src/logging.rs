//! Structured logging for hazard calculations.
//!
//! Every record is a single JSON line carrying a run id, a sequence number,
//! a level and a domain, so that logs of many independent workers can be
//! merged and replayed in order.
//!
//! Environment:
//! - `HAZARD_LOG_LEVEL`: minimum level (default `info`)
//! - `HAZARD_LOG_DOMAINS`: comma-separated domains or `all`
//! - `HAZARD_LOG_DIR`: when set, records are also written under `<dir>/<run_id>/`
//! - `HAZARD_RUN_ID`: overrides the generated run id

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

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
        match std::env::var("HAZARD_LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
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
    Sources,  // Source-level filtering
    Ruptures, // Rupture enumeration and filtering
    Gmf,      // Ground-motion field simulation
    Curves,   // GMF to hazard curve conversion
    Maps,     // Hazard maps and uniform hazard spectra
    Config,   // Job configuration
    System,   // Startup, shutdown
    Profile,  // Monitor totals
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Sources => "sources",
            Domain::Ruptures => "ruptures",
            Domain::Gmf => "gmf",
            Domain::Curves => "curves",
            Domain::Maps => "maps",
            Domain::Config => "config",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("HAZARD_LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
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
    sinks: Option<Sinks>,
}

#[derive(Debug)]
struct Sinks {
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("HAZARD_RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let sinks = std::env::var("HAZARD_LOG_DIR")
            .ok()
            .and_then(|base| open_sinks(PathBuf::from(base).join(&run_id)));
        RunContext { run_id, sinks }
    })
}

fn open_sinks(run_dir: PathBuf) -> Option<Sinks> {
    if let Err(err) = create_dir_all(&run_dir) {
        eprintln!("[log] failed to create run dir: {}", err);
        return None;
    }
    let open = |name: &str| match File::create(run_dir.join(name)) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", name, err);
            None
        }
    };
    Some(Sinks {
        events: open("events.jsonl")?,
        trace: open("trace.jsonl")?,
    })
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
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

/// Id shared by every record of this process.
pub fn run_id() -> &'static str {
    &ensure_run_context().run_id
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain, event, fields);
}

fn emit_record(level: Level, domain: Domain, event: &str, mut fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let msg = fields.remove("msg").unwrap_or(Value::String(String::new()));

    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("domain".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    entry.insert("data".to_string(), Value::Object(fields));

    let line = Value::Object(entry).to_string();
    if let Some(sinks) = &ctx.sinks {
        match level {
            Level::Trace | Level::Debug => write_line(&sinks.trace, &line),
            _ => write_line(&sinks.events, &line),
        }
    }
    eprintln!("{}", line);
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_source_skipped(source_id: &str, reason: &str) {
    log(
        Level::Debug,
        Domain::Sources,
        "source_skipped",
        obj(&[("source_id", v_str(source_id)), ("reason", v_str(reason))]),
    );
}

pub fn log_job_loaded(path: &str, checksum: &str) {
    log(
        Level::Info,
        Domain::Config,
        "job_loaded",
        obj(&[("path", v_str(path)), ("checksum", v_str(checksum))]),
    );
}

pub fn log_monitor(operation: &str, duration_secs: f64, counts: u64) {
    log(
        Level::Info,
        Domain::Profile,
        "monitor",
        obj(&[
            ("operation", v_str(operation)),
            ("duration_s", v_num(duration_secs)),
            ("counts", json!(counts)),
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
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_num(42.0))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42.0);
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }

    #[test]
    fn test_run_id_is_stable() {
        assert_eq!(run_id(), run_id());
        assert!(!run_id().is_empty());
    }
}
