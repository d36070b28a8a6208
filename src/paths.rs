// Supabase MCP Gateway - Path Resolution
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Single source of truth for where the gateway keeps its config and audit log.
// Cached via OnceLock for zero-overhead repeated access.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static GATEWAY_HOME_CACHE: OnceLock<PathBuf> = OnceLock::new();

const HOME_DIR_NAME: &str = ".supabase-gate";

/// Resolve the gateway home from an env lookup.
///
/// Resolution order:
///   1. SUPABASE_GATE_HOME
///   2. HOME + /.supabase-gate
///   3. ./.supabase-gate
fn resolve_home(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(home) = lookup("SUPABASE_GATE_HOME").filter(|s| !s.is_empty()) {
        return PathBuf::from(home);
    }
    if let Some(home) = lookup("HOME").filter(|s| !s.is_empty()) {
        return PathBuf::from(home).join(HOME_DIR_NAME);
    }
    PathBuf::from(HOME_DIR_NAME)
}

pub fn gateway_home() -> &'static Path {
    GATEWAY_HOME_CACHE.get_or_init(|| resolve_home(|key| std::env::var(key).ok()))
}

pub fn default_config_path() -> PathBuf {
    gateway_home().join("config.json")
}

pub fn default_audit_log() -> PathBuf {
    gateway_home().join("audit.log")
}
