// Supabase MCP Gateway - Supabase Management API Client
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Blocking HTTP backend. Translates each Operation into one or two
// Management API calls and sorts failures into Rejected vs Transport.
// All access arrives through gateway::Gateway. Nothing bypasses it.

use crate::backend::{Arguments, Backend, BackendError, Operation};
use crate::config::GatewayConfig;
use crate::tools::DEFAULT_LOG_MINUTES;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

/// Upper bound on a log query window (the platform keeps one day hot)
const MAX_LOG_MINUTES: i64 = 24 * 60;
const LOG_ROW_LIMIT: u32 = 100;

/// Quote a string as a SQL literal
fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// `array['a','b']` for use with `= any(...)`
fn text_array(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| quote_literal(s)).collect();
    format!("array[{}]::text[]", quoted.join(","))
}

fn string_list(args: &Arguments, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn list_tables_sql(schemas: &[String]) -> String {
    format!(
        "select table_schema as schema, table_name as name \
         from information_schema.tables \
         where table_type = 'BASE TABLE' and table_schema = any({}) \
         order by table_schema, table_name",
        text_array(schemas)
    )
}

const LIST_EXTENSIONS_SQL: &str = "select e.extname as name, e.extversion as version, n.nspname as schema \
     from pg_extension e join pg_namespace n on n.oid = e.extnamespace \
     order by e.extname";

fn describe_columns_sql(schemas: &[String], tables: &[String]) -> String {
    let mut sql = format!(
        "select c.table_schema, c.table_name, c.column_name, c.data_type, c.udt_name, c.is_nullable \
         from information_schema.columns c \
         join information_schema.tables t \
           on t.table_schema = c.table_schema and t.table_name = c.table_name \
         where t.table_type in ('BASE TABLE', 'VIEW') and c.table_schema = any({})",
        text_array(schemas)
    );
    if !tables.is_empty() {
        sql.push_str(&format!(" and c.table_name = any({})", text_array(tables)));
    }
    sql.push_str(" order by c.table_schema, c.table_name, c.ordinal_position");
    sql
}

/// Log source table per service
fn log_source(service: &str) -> &'static str {
    match service {
        "api" => "edge_logs",
        "auth" => "auth_logs",
        "storage" => "storage_logs",
        "realtime" => "realtime_logs",
        "edge-function" => "function_edge_logs",
        _ => "postgres_logs",
    }
}

fn logs_sql(service: &str) -> String {
    format!(
        "select id, timestamp, event_message from {} order by timestamp desc limit {}",
        log_source(service),
        LOG_ROW_LIMIT
    )
}

/// Pull a human-readable message out of an error body
fn error_text(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .or_else(|| v.get("msg"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().chars().take(500).collect());
    if detail.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), detail)
    }
}

/// Gateway-class and rate-limit statuses: the platform did not act on the
/// request, and the same call may succeed later
fn is_transport_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn send_error(e: reqwest::Error) -> BackendError {
    let kind = if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    BackendError::Transport(format!("Supabase API {}: {}", kind, e))
}

/// Backend for a single Supabase project
pub struct SupabaseClient {
    client: Client,
    api_url: String,
    project_ref: String,
    access_token: String,
    read_only: bool,
    fallback_tables: Vec<String>,
    service_role_key: Option<String>,
    rest_url: String,
}

impl SupabaseClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(concat!("supabase-mcp-gateway/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            project_ref: config.project_ref.clone(),
            access_token: config.access_token.clone(),
            read_only: config.read_only,
            fallback_tables: config.fallback_tables.clone(),
            service_role_key: config.service_role_key.clone(),
            rest_url: config.rest_url(),
        })
    }

    fn project_url(&self, path: &str) -> String {
        format!("{}/v1/projects/{}/{}", self.api_url, self.project_ref, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.access_token).header("Accept", "application/json")
    }

    /// Send, then classify the response. Non-JSON success bodies are
    /// transport failures: the call did not complete in a usable form.
    fn call(&self, req: RequestBuilder) -> Result<Value, BackendError> {
        let resp: Response = self.authed(req).send().map_err(send_error)?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| BackendError::Transport(format!("Read body failed: {}", e)))?;

        if !status.is_success() {
            let text = error_text(status, &body);
            return Err(if is_transport_status(status) {
                BackendError::Transport(text)
            } else {
                BackendError::Rejected(text)
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| BackendError::Transport(format!("Malformed response from Supabase API: {}", e)))
    }

    /// Run SQL through the Management API query endpoint
    pub fn run_sql(&self, sql: &str, read_only: bool) -> Result<Value, BackendError> {
        let mut body = json!({ "query": sql });
        if read_only {
            body["read_only"] = json!(true);
        }
        let url = self.project_url("database/query");
        log::debug!("POST {} ({} bytes of SQL)", url, sql.len());
        self.call(self.client.post(url).json(&body))
    }

    fn list_tables(&self, args: &Arguments) -> Result<Value, BackendError> {
        let mut schemas = string_list(args, "schemas");
        if schemas.is_empty() {
            schemas.push("public".to_string());
        }
        match self.run_sql(&list_tables_sql(&schemas), true) {
            Err(BackendError::Rejected(reason))
                if !self.fallback_tables.is_empty() && schemas.iter().any(|s| s == "public") =>
            {
                log::warn!("Table listing rejected ({}); probing {} fallback names", reason, self.fallback_tables.len());
                self.probe_tables()
            }
            other => other,
        }
    }

    /// Degraded mode: check each configured name against PostgREST.
    /// Only the public schema is visible this way.
    fn probe_tables(&self) -> Result<Value, BackendError> {
        let key = self.service_role_key.as_deref().ok_or_else(|| {
            BackendError::Rejected(
                "table listing failed and fallback probing needs service_role_key".to_string(),
            )
        })?;

        let mut found = Vec::new();
        for table in &self.fallback_tables {
            let url = format!("{}/rest/v1/{}", self.rest_url, table);
            let resp = self
                .client
                .get(&url)
                .query(&[("select", "*"), ("limit", "0")])
                .header("apikey", key)
                .bearer_auth(key)
                .send()
                .map_err(send_error)?;
            if resp.status().is_success() {
                found.push(json!({ "schema": "public", "name": table, "degraded": true }));
            } else {
                log::debug!("Probe {} -> HTTP {}", table, resp.status().as_u16());
            }
        }
        Ok(Value::Array(found))
    }

    fn apply_migration(&self, args: &Arguments) -> Result<Value, BackendError> {
        if self.read_only {
            return Err(BackendError::Rejected("apply_migration is disabled in read-only mode".to_string()));
        }
        let mut body = json!({ "query": args.get("sql").and_then(Value::as_str).unwrap_or_default() });
        if let Some(name) = args.get("name").and_then(Value::as_str) {
            body["name"] = json!(name);
        }
        self.call(self.client.post(self.project_url("database/migrations")).json(&body))
    }

    fn get_logs(&self, args: &Arguments) -> Result<Value, BackendError> {
        let service = args.get("service").and_then(Value::as_str).unwrap_or("postgres");
        let minutes = args
            .get("minutes")
            .and_then(Value::as_f64)
            .map(|m| m.round() as i64)
            .unwrap_or(DEFAULT_LOG_MINUTES)
            .clamp(1, MAX_LOG_MINUTES);

        let end = Utc::now();
        let start = end - ChronoDuration::minutes(minutes);
        let sql = logs_sql(service);
        let start_ts = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end_ts = end.to_rfc3339_opts(SecondsFormat::Secs, true);

        let body = self.call(
            self.client
                .get(self.project_url("analytics/endpoints/logs.all"))
                .query(&[
                    ("sql", sql.as_str()),
                    ("iso_timestamp_start", start_ts.as_str()),
                    ("iso_timestamp_end", end_ts.as_str()),
                ]),
        )?;

        if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
            let text = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(BackendError::Rejected(text));
        }
        Ok(body.get("result").cloned().unwrap_or_else(|| json!([])))
    }

    fn get_advisors(&self, args: &Arguments) -> Result<Value, BackendError> {
        let kinds: &[&str] = match args.get("type").and_then(Value::as_str).unwrap_or("all") {
            "security" => &["security"],
            "performance" => &["performance"],
            _ => &["security", "performance"],
        };

        let mut lints = Vec::new();
        for kind in kinds {
            let body = self.call(self.client.get(self.project_url(&format!("advisors/{}", kind))))?;
            let items = body.get("lints").and_then(Value::as_array).cloned().unwrap_or_default();
            for mut lint in items {
                if let Some(obj) = lint.as_object_mut() {
                    obj.entry("category").or_insert_with(|| json!(kind));
                }
                lints.push(lint);
            }
        }
        Ok(Value::Array(lints))
    }
}

impl Backend for SupabaseClient {
    fn execute(&self, operation: Operation, args: &Arguments) -> Result<Value, BackendError> {
        log::debug!("Supabase {} on project {}", operation, self.project_ref);
        match operation {
            Operation::ListTables => self.list_tables(args),
            Operation::ListExtensions => self.run_sql(LIST_EXTENSIONS_SQL, true),
            Operation::ListMigrations => self.call(self.client.get(self.project_url("database/migrations"))),
            Operation::ApplyMigration => self.apply_migration(args),
            Operation::ExecuteSql => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
                self.run_sql(query, self.read_only)
            }
            Operation::GetLogs => self.get_logs(args),
            Operation::GetAdvisors => self.get_advisors(args),
            Operation::DescribeColumns => {
                let mut schemas = string_list(args, "schemas");
                if schemas.is_empty() {
                    schemas.push("public".to_string());
                }
                let tables = string_list(args, "tables");
                self.run_sql(&describe_columns_sql(&schemas, &tables), true)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
