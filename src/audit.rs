// Supabase MCP Gateway - Audit Log
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Persistent call log. One line per call, one more per failure.
// Best effort: an unwritable log never fails an invocation.

use crate::envelope::ResponseEnvelope;
use chrono::Local;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const SQL_PREVIEW_CHARS: usize = 200;
const RAW_PREVIEW_CHARS: usize = 300;

/// First `max` chars of `s`, with an ellipsis if anything was cut
fn truncate(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

/// Summarize tool params for logging (truncate large values)
pub fn param_summary(name: &str, args: &Value) -> String {
    let str_arg = |key: &str| args.get(key).and_then(Value::as_str);
    match name {
        "execute_sql" => format!("query={}", truncate(str_arg("query").unwrap_or("?"), SQL_PREVIEW_CHARS)),
        "apply_migration" => format!(
            "name={} sql={}",
            str_arg("name").unwrap_or("-"),
            truncate(str_arg("sql").unwrap_or("?"), SQL_PREVIEW_CHARS)
        ),
        "get_logs" => format!(
            "service={} minutes={}",
            args.get("service").map(Value::to_string).unwrap_or_else(|| "-".into()),
            args.get("minutes").map(Value::to_string).unwrap_or_else(|| "-".into())
        ),
        _ => truncate(&args.to_string(), RAW_PREVIEW_CHARS),
    }
}

/// Append-only call log
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn append(&self, msg: &str) {
        let path = match &self.path {
            Some(p) => p,
            None => return,
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(mut f) => {
                let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
                if let Err(e) = writeln!(f, "[{}] {}", ts, msg) {
                    log::debug!("Audit write to {:?} failed: {}", path, e);
                }
            }
            Err(e) => log::debug!("Audit log {:?} unavailable: {}", path, e),
        }
    }

    pub fn record_call(&self, name: &str, args: &Value) {
        self.append(&format!("CALL {} | {}", name, param_summary(name, args)));
    }

    /// Failures only; successes are implied by a CALL with no FAIL
    pub fn record_outcome(&self, name: &str, envelope: &ResponseEnvelope) {
        if let Some(message) = envelope.message() {
            self.append(&format!(
                "FAIL {} | {}: {}",
                name,
                envelope.outcome(),
                truncate(message, SQL_PREVIEW_CHARS)
            ));
        }
    }
}
