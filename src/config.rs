// Supabase MCP Gateway - Configuration
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Project, credentials, timeouts, degraded-mode policy.
// Defaults -> JSON file -> environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.supabase.com";

/// Master gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Management API base URL
    pub api_url: String,
    /// Project reference (the subdomain of <ref>.supabase.co)
    pub project_ref: String,
    /// Personal access token for the Management API
    pub access_token: String,
    /// Per-request HTTP timeout
    pub timeout_secs: u64,
    /// Drop apply_migration and run execute_sql read-only
    pub read_only: bool,
    /// Table names probed when the primary table listing is rejected.
    /// Empty disables degraded-mode discovery.
    pub fallback_tables: Vec<String>,
    /// Needed only for fallback probing through PostgREST
    pub service_role_key: Option<String>,
    /// Project REST base, defaults to https://<ref>.supabase.co
    pub project_url: Option<String>,
    /// Append-only call log. None disables it.
    pub audit_log: Option<PathBuf>,
}

/// Config that cannot be used to reach the backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("project_ref is not set (config file or SUPABASE_PROJECT_REF)")]
    MissingProjectRef,
    #[error("access_token is not set (config file or SUPABASE_ACCESS_TOKEN)")]
    MissingAccessToken,
    #[error("project_ref '{0}' must be lowercase alphanumeric")]
    InvalidProjectRef(String),
    #[error("timeout_secs must be greater than zero")]
    ZeroTimeout,
    #[error("fallback_tables is set but service_role_key is missing")]
    FallbackWithoutKey,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            project_ref: String::new(),
            access_token: String::new(),
            timeout_secs: 30,
            read_only: false,
            fallback_tables: Vec::new(),
            service_role_key: None,
            project_url: None,
            audit_log: Some(crate::paths::default_audit_log()),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl GatewayConfig {
    /// Load config from JSON file (falling back to defaults), then apply env overrides
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)?;
            config
        } else {
            log::warn!("Config not found at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Save config to JSON file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay SUPABASE_* variables. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SUPABASE_PROJECT_REF") {
            self.project_ref = v.trim().to_string();
        }
        if let Some(v) = get("SUPABASE_ACCESS_TOKEN") {
            self.access_token = v.trim().to_string();
        }
        if let Some(v) = get("SUPABASE_API_URL") {
            self.api_url = v.trim().to_string();
        }
        if let Some(v) = get("SUPABASE_SERVICE_ROLE_KEY") {
            self.service_role_key = Some(v.trim().to_string());
        }
        if let Some(v) = get("SUPABASE_READ_ONLY") {
            match parse_flag(&v) {
                Some(flag) => self.read_only = flag,
                None => log::warn!("Ignoring SUPABASE_READ_ONLY={:?}: not a boolean", v),
            }
        }
    }

    /// Check the config can reach a project
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_ref.is_empty() {
            return Err(ConfigError::MissingProjectRef);
        }
        if !self.project_ref.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(ConfigError::InvalidProjectRef(self.project_ref.clone()));
        }
        if self.access_token.is_empty() {
            return Err(ConfigError::MissingAccessToken);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if !self.fallback_tables.is_empty() && self.service_role_key.is_none() {
            return Err(ConfigError::FallbackWithoutKey);
        }
        Ok(())
    }

    /// PostgREST base URL for this project
    pub fn rest_url(&self) -> String {
        match &self.project_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.supabase.co", self.project_ref),
        }
    }

    /// Access token with all but the last four characters hidden
    pub fn masked_token(&self) -> String {
        let n = self.access_token.chars().count();
        if n == 0 {
            return "(not set)".to_string();
        }
        let tail: String = self.access_token.chars().skip(n.saturating_sub(4)).collect();
        format!("{}{}", "*".repeat(n.saturating_sub(4).min(8)), tail)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> GatewayConfig {
        GatewayConfig {
            project_ref: "abcdefghijklmnop".to_string(),
            access_token: "sbp_0123456789".to_string(),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn defaults_point_at_management_api() {
        let config = GatewayConfig::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout_secs, 30);
        assert!(!config.read_only);
        assert!(config.fallback_tables.is_empty());
    }

    #[test]
    fn validate_requires_project_and_token() {
        assert_eq!(GatewayConfig::default().validate(), Err(ConfigError::MissingProjectRef));

        let mut config = valid();
        config.access_token.clear();
        assert_eq!(config.validate(), Err(ConfigError::MissingAccessToken));

        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = valid();
        config.project_ref = "Not/A/Ref".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidProjectRef(_))));

        let mut config = valid();
        config.timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));

        let mut config = valid();
        config.fallback_tables = vec!["profiles".to_string()];
        assert_eq!(config.validate(), Err(ConfigError::FallbackWithoutKey));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = valid();
        config.apply_overrides(|key| match key {
            "SUPABASE_PROJECT_REF" => Some(" zyxwvutsrqponmlk ".to_string()),
            "SUPABASE_READ_ONLY" => Some("yes".to_string()),
            "SUPABASE_ACCESS_TOKEN" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.project_ref, "zyxwvutsrqponmlk");
        assert!(config.read_only);
        assert_eq!(config.access_token, "sbp_0123456789");
    }

    #[test]
    fn load_and_save_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");

        let mut config = valid();
        config.fallback_tables = vec!["profiles".to_string()];
        config.audit_log = None;
        config.save(&path).unwrap();

        let mut loaded: GatewayConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        loaded.apply_overrides(|_| None);
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let loaded: GatewayConfig = serde_json::from_str(r#"{"project_ref": "abc"}"#).unwrap();
        assert_eq!(loaded.project_ref, "abc");
        assert_eq!(loaded.timeout_secs, 30);
        assert_eq!(loaded.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn files_with_unknown_keys_still_load() {
        let loaded: GatewayConfig =
            serde_json::from_str(r#"{"version": "1.0.0", "project_ref": "abc"}"#).unwrap();
        assert_eq!(loaded.project_ref, "abc");

        let written = serde_json::to_value(GatewayConfig::default()).unwrap();
        assert!(written.get("version").is_none());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn rest_url_derives_from_ref() {
        let mut config = valid();
        assert_eq!(config.rest_url(), "https://abcdefghijklmnop.supabase.co");
        config.project_url = Some("http://localhost:54321/".to_string());
        assert_eq!(config.rest_url(), "http://localhost:54321");
    }

    #[test]
    fn token_is_masked() {
        assert_eq!(valid().masked_token(), "********6789");
        assert_eq!(GatewayConfig::default().masked_token(), "(not set)");
    }
}
