// Supabase MCP Gateway - Capability Surface
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// The eight exposed tools, their input shapes, and how each one's
// backend result is presented. Presentation only: no row is dropped
// or rewritten, only laid out.

use crate::backend::{Arguments, Backend, BackendError, Operation};
use crate::registry::{Capability, Handler, ParamKind, ParamSpec, Registry, RegistryError};
use serde_json::{json, Value};
use std::sync::Arc;

pub const LOG_SERVICES: [&str; 6] = ["api", "postgres", "auth", "storage", "realtime", "edge-function"];
pub const ADVISOR_TYPES: [&str; 3] = ["all", "security", "performance"];
pub const DEFAULT_LOG_MINUTES: i64 = 60;

/// Forwards to one backend operation, renders with a fixed rule
struct Forward {
    operation: Operation,
    render: fn(&Value) -> String,
}

impl Handler for Forward {
    fn dispatch(&self, backend: &dyn Backend, args: &Arguments) -> Result<Value, BackendError> {
        backend.execute(self.operation, args)
    }

    fn render(&self, result: &Value) -> String {
        (self.render)(result)
    }
}

fn forward(operation: Operation, render: fn(&Value) -> String) -> Arc<dyn Handler> {
    Arc::new(Forward { operation, render })
}

/// Build and seal the capability registry.
/// Read-only mode leaves `apply_migration` off the surface entirely.
pub fn build_registry(read_only: bool) -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();

    registry.register(
        Capability::new(
            "list_tables",
            "List all tables in the given schemas.",
            forward(Operation::ListTables, render_tables),
        )
        .param(ParamSpec::with_default(
            "schemas",
            ParamKind::StringArray,
            json!(["public"]),
            "Schemas to include (default: public)",
        )),
    )?;

    registry.register(Capability::new(
        "list_extensions",
        "List installed Postgres extensions with version and schema.",
        forward(Operation::ListExtensions, render_extensions),
    ))?;

    registry.register(Capability::new(
        "list_migrations",
        "List migrations applied to the database.",
        forward(Operation::ListMigrations, render_migrations),
    ))?;

    if !read_only {
        registry.register(
            Capability::new(
                "apply_migration",
                "Apply a SQL migration and record it in the migrations history. Use for DDL.",
                forward(Operation::ApplyMigration, render_json),
            )
            .param(ParamSpec::required("sql", ParamKind::String, "Migration SQL"))
            .param(ParamSpec::optional("name", ParamKind::String, "Migration name in snake_case")),
        )?;
    }

    registry.register(
        Capability::new(
            "execute_sql",
            "Execute raw SQL against the database and return the rows as JSON.",
            forward(Operation::ExecuteSql, render_json),
        )
        .param(ParamSpec::required("query", ParamKind::String, "SQL to execute")),
    )?;

    registry.register(
        Capability::new(
            "get_logs",
            "Fetch recent logs for one platform service.",
            forward(Operation::GetLogs, render_logs),
        )
        .param(ParamSpec::with_default(
            "service",
            ParamKind::Enum(LOG_SERVICES.to_vec()),
            json!("postgres"),
            "Service to fetch logs for",
        ))
        .param(ParamSpec::with_default(
            "minutes",
            ParamKind::Number,
            json!(DEFAULT_LOG_MINUTES),
            "How far back to look, in minutes (max 1440)",
        )),
    )?;

    registry.register(
        Capability::new(
            "get_advisors",
            "Report security and performance advisor findings for the project.",
            forward(Operation::GetAdvisors, render_advisors),
        )
        .param(ParamSpec::with_default(
            "type",
            ParamKind::Enum(ADVISOR_TYPES.to_vec()),
            json!("all"),
            "Which advisors to run",
        )),
    )?;

    registry.register(
        Capability::new(
            "generate_typescript_types",
            "Generate TypeScript interfaces for tables in the given schemas.",
            forward(Operation::DescribeColumns, render_typescript),
        )
        .param(ParamSpec::with_default(
            "schemas",
            ParamKind::StringArray,
            json!(["public"]),
            "Schemas to include (default: public)",
        ))
        .param(ParamSpec::optional(
            "tables",
            ParamKind::StringArray,
            "Only these tables (default: all)",
        )),
    )?;

    registry.seal();
    Ok(registry)
}

// ========================================================================
// RENDERING
// ========================================================================

/// Scalar cell text: strings bare, null empty, everything else as JSON
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn format_row(values: &[&str], widths: &[usize]) -> String {
    let mut line = String::new();
    for (i, v) in values.iter().enumerate() {
        line.push_str(v);
        if i + 1 < values.len() {
            let pad = widths[i].saturating_sub(v.chars().count());
            line.push_str(&" ".repeat(pad + 2));
        }
    }
    line.trim_end().to_string()
}

/// Column-aligned text table. Missing keys render as empty cells.
fn render_table(rows: &[Value], columns: &[(&str, &str)]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|(_, key)| cell(row.get(*key))).collect())
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, (header, _))| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let headers: Vec<&str> = columns.iter().map(|(h, _)| *h).collect();
    let rules: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(format_row(&headers, &widths));
    out.push(format_row(&rules.iter().map(String::as_str).collect::<Vec<_>>(), &widths));
    for row in &cells {
        out.push(format_row(&row.iter().map(String::as_str).collect::<Vec<_>>(), &widths));
    }
    out.join("\n")
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn render_json(result: &Value) -> String {
    pretty(result)
}

/// One `schema.table` per line
pub fn render_tables(result: &Value) -> String {
    let rows = match result.as_array() {
        Some(rows) => rows,
        None => return pretty(result),
    };
    if rows.is_empty() {
        return "No tables found.".to_string();
    }

    let mut lines: Vec<String> = rows
        .iter()
        .map(|row| format!("{}.{}", cell(row.get("schema")), cell(row.get("name"))))
        .collect();

    let degraded = rows.iter().any(|row| row.get("degraded").and_then(Value::as_bool).unwrap_or(false));
    if degraded {
        lines.insert(
            0,
            "DEGRADED: primary table listing failed; tables below were found by probing configured names.".to_string(),
        );
    }
    lines.join("\n")
}

pub fn render_extensions(result: &Value) -> String {
    match result.as_array() {
        Some(rows) if rows.is_empty() => "No extensions installed.".to_string(),
        Some(rows) => render_table(rows, &[("NAME", "name"), ("VERSION", "version"), ("SCHEMA", "schema")]),
        None => pretty(result),
    }
}

pub fn render_migrations(result: &Value) -> String {
    match result.as_array() {
        Some(rows) if rows.is_empty() => "No migrations applied.".to_string(),
        Some(rows) => render_table(rows, &[("VERSION", "version"), ("NAME", "name")]),
        None => pretty(result),
    }
}

pub fn render_logs(result: &Value) -> String {
    match result.as_array() {
        Some(rows) if rows.is_empty() => "No log entries in window.".to_string(),
        Some(rows) => render_table(rows, &[("TIMESTAMP", "timestamp"), ("MESSAGE", "event_message")]),
        None => pretty(result),
    }
}

pub fn render_advisors(result: &Value) -> String {
    let lints = match result.as_array() {
        Some(lints) => lints,
        None => return pretty(result),
    };
    if lints.is_empty() {
        return "No advisor findings.".to_string();
    }

    let mut out = Vec::new();
    for lint in lints {
        let level = cell(lint.get("level")).to_uppercase();
        let title = cell(lint.get("title"));
        let category = cell(lint.get("category"));
        if category.is_empty() {
            out.push(format!("[{}] {}", level, title));
        } else {
            out.push(format!("[{}] {} ({})", level, title, category));
        }
        for key in ["detail", "remediation"] {
            let text = cell(lint.get(key));
            if !text.is_empty() {
                out.push(format!("  {}", text));
            }
        }
    }
    out.join("\n")
}

fn pascal_case(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Postgres type → TypeScript type
fn ts_type(data_type: &str, udt_name: &str) -> String {
    match data_type {
        "ARRAY" => format!("{}[]", ts_type(udt_name.trim_start_matches('_'), "")),
        "smallint" | "integer" | "bigint" | "numeric" | "real" | "double precision"
        | "int2" | "int4" | "int8" | "float4" | "float8" => "number".to_string(),
        "boolean" | "bool" => "boolean".to_string(),
        "json" | "jsonb" => "Json".to_string(),
        "USER-DEFINED" => "string".to_string(),
        t if t.starts_with("character")
            || t.starts_with("timestamp")
            || t.starts_with("time")
            || matches!(t, "text" | "varchar" | "uuid" | "date" | "interval" | "inet" | "bytea" | "citext") =>
        {
            "string".to_string()
        }
        _ => "unknown".to_string(),
    }
}

/// Column rows (`table_schema`, `table_name`, `column_name`, `data_type`,
/// `udt_name`, `is_nullable`) → one exported interface per table
pub fn render_typescript(result: &Value) -> String {
    let rows = match result.as_array() {
        Some(rows) => rows,
        None => return pretty(result),
    };
    if rows.is_empty() {
        return "// No tables matched.".to_string();
    }

    // Group in row order; rows arrive sorted by schema, table, ordinal
    let mut tables: Vec<((String, String), Vec<String>)> = Vec::new();
    for row in rows {
        let key = (cell(row.get("table_schema")), cell(row.get("table_name")));
        let nullable = cell(row.get("is_nullable")) == "YES";
        let mut ty = ts_type(&cell(row.get("data_type")), &cell(row.get("udt_name")));
        if nullable {
            ty.push_str(" | null");
        }
        let field = format!("  {}: {};", cell(row.get("column_name")), ty);

        match tables.last_mut() {
            Some((last, fields)) if *last == key => fields.push(field),
            _ => tables.push((key, vec![field])),
        }
    }

    let mut out = vec![
        "export type Json = string | number | boolean | null | { [key: string]: Json | undefined } | Json[];".to_string(),
    ];
    for ((schema, table), fields) in tables {
        let name = if schema == "public" {
            pascal_case(&table)
        } else {
            format!("{}{}", pascal_case(&schema), pascal_case(&table))
        };
        out.push(String::new());
        out.push(format!("export interface {} {{", name));
        out.extend(fields);
        out.push("}".to_string());
    }
    out.join("\n")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_eight_tools_in_order() {
        let reg = build_registry(false).unwrap();
        let names: Vec<&str> = reg.list().iter().map(Capability::name).collect();
        assert_eq!(
            names,
            vec![
                "list_tables", "list_extensions", "list_migrations", "apply_migration",
                "execute_sql", "get_logs", "get_advisors", "generate_typescript_types",
            ]
        );
        assert!(reg.is_sealed());
    }

    #[test]
    fn read_only_drops_apply_migration() {
        let reg = build_registry(true).unwrap();
        assert!(reg.lookup("apply_migration").is_none());
        assert_eq!(reg.len(), 7);
    }

    #[test]
    fn tables_render_one_per_line() {
        let rows = json!([
            {"schema": "public", "name": "users"},
            {"schema": "auth", "name": "sessions"},
        ]);
        assert_eq!(render_tables(&rows), "public.users\nauth.sessions");
        assert_eq!(render_tables(&json!([])), "No tables found.");
    }

    #[test]
    fn degraded_listing_is_labeled() {
        let rows = json!([{"schema": "public", "name": "profiles", "degraded": true}]);
        let text = render_tables(&rows);
        assert!(text.starts_with("DEGRADED"));
        assert!(text.ends_with("public.profiles"));
    }

    #[test]
    fn table_columns_align() {
        let rows = json!([
            {"version": "20240101000000", "name": "init"},
            {"version": "20240202", "name": "add_users"},
        ]);
        let text = render_migrations(&rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "VERSION         NAME");
        assert_eq!(lines[2], "20240101000000  init");
        assert_eq!(lines[3], "20240202        add_users");
    }

    #[test]
    fn advisors_render_level_and_detail() {
        let lints = json!([{
            "level": "warn",
            "title": "RLS disabled",
            "category": "security",
            "detail": "Table public.users has RLS disabled",
            "remediation": null,
        }]);
        assert_eq!(
            render_advisors(&lints),
            "[WARN] RLS disabled (security)\n  Table public.users has RLS disabled"
        );
    }

    #[test]
    fn typescript_groups_columns_per_table() {
        let rows = json!([
            {"table_schema": "public", "table_name": "user_profiles", "column_name": "id",
             "data_type": "bigint", "udt_name": "int8", "is_nullable": "NO"},
            {"table_schema": "public", "table_name": "user_profiles", "column_name": "tags",
             "data_type": "ARRAY", "udt_name": "_text", "is_nullable": "YES"},
            {"table_schema": "auth", "table_name": "users", "column_name": "meta",
             "data_type": "jsonb", "udt_name": "jsonb", "is_nullable": "NO"},
        ]);
        let ts = render_typescript(&rows);
        assert!(ts.contains("export interface UserProfiles {\n  id: number;\n  tags: string[] | null;\n}"));
        assert!(ts.contains("export interface AuthUsers {\n  meta: Json;\n}"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let rows = json!([{"name": "pgcrypto", "version": "1.3", "schema": "extensions"}]);
        assert_eq!(render_extensions(&rows), render_extensions(&rows));
    }

    #[test]
    fn non_array_results_fall_back_to_json() {
        let value = json!({"message": "ok"});
        assert_eq!(render_logs(&value), pretty(&value));
    }
}
