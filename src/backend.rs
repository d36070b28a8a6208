// Supabase MCP Gateway - Backend Boundary
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// The one outbound seam: execute a remote operation with an argument bag.
// Backend failures come back split in two: rejected by the remote system,
// or never completed at all. The gateway maps them to different outcomes.

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Normalized invocation arguments (parameter name → value)
pub type Arguments = Map<String, Value>;

/// Remote operations the backend knows how to perform.
/// Only reachable through a registered capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListTables,
    ListExtensions,
    ListMigrations,
    ApplyMigration,
    ExecuteSql,
    GetLogs,
    GetAdvisors,
    DescribeColumns,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ListTables => "list_tables",
            Operation::ListExtensions => "list_extensions",
            Operation::ListMigrations => "list_migrations",
            Operation::ApplyMigration => "apply_migration",
            Operation::ExecuteSql => "execute_sql",
            Operation::GetLogs => "get_logs",
            Operation::GetAdvisors => "get_advisors",
            Operation::DescribeColumns => "describe_columns",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure modes of a backend call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The remote system executed and refused the operation
    #[error("{0}")]
    Rejected(String),
    /// The call did not complete: connect/timeout/gateway/malformed body
    #[error("{0}")]
    Transport(String),
}

/// Outbound client contract. Shared by every in-flight invocation.
pub trait Backend: Send + Sync {
    fn execute(&self, operation: Operation, args: &Arguments) -> Result<Value, BackendError>;
}
