//! Layered configuration: defaults → user file → project file → explicit file →
//! environment → constructor overrides.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::client_error::ClientError;

fn user_config_path() -> Option<PathBuf> {
    dirs_home().map(|home| home.join(".wayfare").join("client.yaml"))
}

fn dirs_home() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

fn project_config_path() -> PathBuf {
    PathBuf::from(".wayfare.yaml")
}

/// Immutable configuration consumed by every component of the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service_url: String,
    pub app_id: Option<String>,
    pub team: Option<String>,
    pub timeout_secs: f64,
    pub report_telemetry: bool,
    pub cache_ttl_secs: f64,
    pub auth_method: Option<String>,
    pub kerberos_service_principal: Option<String>,
    pub jwt_token: Option<String>,
    pub jwt_token_env: String,
    pub jwt_token_file: Option<String>,
    pub snowflake_user: Option<String>,
    pub snowflake_password: Option<String>,
    pub snowflake_private_key_path: Option<String>,
    pub oracle_user: Option<String>,
    pub oracle_password: Option<String>,
    pub mssql_user: Option<String>,
    pub mssql_password: Option<String>,
    pub credentials: HashMap<String, String>,
    pub deprecation_enabled: bool,
    pub warn_on_deprecated: bool,
    pub retry_max_attempts: usize,
    pub retry_backoff_factor: f64,
    pub retry_status_codes: Vec<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8050".to_string(),
            app_id: None,
            team: None,
            timeout_secs: 30.0,
            report_telemetry: true,
            cache_ttl_secs: 60.0,
            auth_method: None,
            kerberos_service_principal: None,
            jwt_token: None,
            jwt_token_env: "WAYFARE_JWT".to_string(),
            jwt_token_file: None,
            snowflake_user: None,
            snowflake_password: None,
            snowflake_private_key_path: None,
            oracle_user: None,
            oracle_password: None,
            mssql_user: None,
            mssql_password: None,
            credentials: HashMap::new(),
            deprecation_enabled: false,
            warn_on_deprecated: true,
            retry_max_attempts: 3,
            retry_backoff_factor: 0.5,
            retry_status_codes: vec![502, 503, 504],
        }
    }
}

fn read_yaml_layer(path: &Path) -> Result<HashMap<String, Value>, ClientError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ClientError::configuration(format!("reading {}: {e}", path.display())))?;
    let parsed: Option<HashMap<String, Value>> = serde_yaml::from_str(&contents)
        .map_err(|e| ClientError::configuration(format!("parsing {}: {e}", path.display())))?;
    Ok(parsed.unwrap_or_default())
}

fn env_overlay(merged: &mut HashMap<String, Value>) {
    let string_keys = [
        ("WAYFARE_SERVICE_URL", "service_url"),
        ("WAYFARE_APP_ID", "app_id"),
        ("WAYFARE_TEAM", "team"),
        ("WAYFARE_AUTH_METHOD", "auth_method"),
        ("WAYFARE_SERVICE_PRINCIPAL", "kerberos_service_principal"),
        ("WAYFARE_JWT_ENV", "jwt_token_env"),
        ("WAYFARE_JWT_FILE", "jwt_token_file"),
        ("SNOWFLAKE_USER", "snowflake_user"),
        ("SNOWFLAKE_PASSWORD", "snowflake_password"),
        ("SNOWFLAKE_PRIVATE_KEY_PATH", "snowflake_private_key_path"),
        ("ORACLE_USER", "oracle_user"),
        ("ORACLE_PASSWORD", "oracle_password"),
        ("MSSQL_USER", "mssql_user"),
        ("MSSQL_PASSWORD", "mssql_password"),
    ];
    for (env_key, field) in string_keys {
        if let Ok(v) = env::var(env_key) {
            merged.insert(field.to_string(), Value::String(v));
        }
    }
    let numeric_keys = [
        ("WAYFARE_TIMEOUT", "timeout_secs"),
        ("WAYFARE_CACHE_TTL", "cache_ttl_secs"),
        ("WAYFARE_RETRY_BACKOFF_FACTOR", "retry_backoff_factor"),
    ];
    for (env_key, field) in numeric_keys {
        if let Ok(v) = env::var(env_key) {
            if let Ok(parsed) = v.parse::<f64>() {
                merged.insert(field.to_string(), Value::from(parsed));
            }
        }
    }
    if let Ok(v) = env::var("WAYFARE_RETRY_MAX_ATTEMPTS") {
        if let Ok(parsed) = v.parse::<u64>() {
            merged.insert("retry_max_attempts".to_string(), Value::from(parsed));
        }
    }
    let bool_keys = [
        ("WAYFARE_REPORT_TELEMETRY", "report_telemetry"),
        ("WAYFARE_DEPRECATION_ENABLED", "deprecation_enabled"),
        ("WAYFARE_WARN_DEPRECATED", "warn_on_deprecated"),
    ];
    for (env_key, field) in bool_keys {
        if let Ok(v) = env::var(env_key) {
            merged.insert(field.to_string(), Value::Bool(v.eq_ignore_ascii_case("true")));
        }
    }
}

impl Config {
    /// Load with full discovery: defaults → `~/.wayfare/client.yaml` → `.wayfare.yaml` →
    /// an optional explicit file → environment variables.
    ///
    /// Later layers overwrite only the keys they set; a missing file is not an error.
    pub fn load(explicit_file: Option<&Path>) -> Result<Self, ClientError> {
        let mut merged = HashMap::new();

        if let Some(user_path) = user_config_path() {
            merged.extend(read_yaml_layer(&user_path)?);
        }
        merged.extend(read_yaml_layer(&project_config_path())?);
        if let Some(path) = explicit_file {
            merged.extend(read_yaml_layer(path)?);
        }
        env_overlay(&mut merged);

        Self::from_map(merged)
    }

    /// Build directly from a pre-merged key/value map (constructor overrides apply on top of
    /// this by mutating the returned value before use).
    pub fn from_map(merged: HashMap<String, Value>) -> Result<Self, ClientError> {
        let defaults = serde_json::to_value(Config::default())
            .map_err(|e| ClientError::configuration(e.to_string()))?;
        let mut base = defaults;
        if let Value::Object(ref mut map) = base {
            for (k, v) in merged {
                map.insert(k, v);
            }
        }
        let config: Config =
            serde_json::from_value(base).map_err(|e| ClientError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ClientError> {
        Url::parse(&self.service_url)
            .map_err(|e| ClientError::configuration(format!("invalid service_url: {e}")))?;
        if self.timeout_secs < 0.0 {
            return Err(ClientError::configuration("timeout must be non-negative"));
        }
        if self.cache_ttl_secs < 0.0 {
            return Err(ClientError::configuration("cache_ttl must be non-negative"));
        }
        if self.retry_backoff_factor < 0.0 {
            return Err(ClientError::configuration("retry_backoff_factor must be non-negative"));
        }
        if let Some(method) = &self.auth_method {
            if method != "jwt" && method != "kerberos" {
                return Err(ClientError::configuration(format!(
                    "unrecognized auth_method: {method}"
                )));
            }
        }
        Ok(())
    }

    /// Resolve a credential for `source_type`/`key`: typed fields first, then the free-form
    /// `credentials` map under `"{source_type}_{key}"`.
    pub fn credential(&self, source_type: &str, key: &str) -> Option<String> {
        let typed = match (source_type, key) {
            ("snowflake", "user") => self.snowflake_user.clone(),
            ("snowflake", "password") => self.snowflake_password.clone(),
            ("snowflake", "private_key_path") => self.snowflake_private_key_path.clone(),
            ("oracle", "user") => self.oracle_user.clone(),
            ("oracle", "password") => self.oracle_password.clone(),
            ("mssql", "user") => self.mssql_user.clone(),
            ("mssql", "password") => self.mssql_password.clone(),
            _ => None,
        };
        typed.or_else(|| self.credentials.get(&format!("{source_type}_{key}")).cloned())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.service_url, "http://localhost:8050");
    }

    #[test]
    fn rejects_bad_service_url() {
        let mut map = HashMap::new();
        map.insert("service_url".to_string(), Value::String("not a url".to_string()));
        assert!(Config::from_map(map).is_err());
    }

    #[test]
    fn rejects_unknown_auth_method() {
        let mut map = HashMap::new();
        map.insert("auth_method".to_string(), Value::String("oauth2".to_string()));
        assert!(Config::from_map(map).is_err());
    }

    #[test]
    fn credential_falls_back_to_free_form_map() {
        let mut config = Config::default();
        config.credentials.insert("mssql_password".to_string(), "secret".to_string());
        assert_eq!(config.credential("mssql", "password"), Some("secret".to_string()));
    }

    #[test]
    fn typed_credential_field_wins_over_free_form_map() {
        let mut config = Config::default();
        config.oracle_user = Some("typed_user".to_string());
        config.credentials.insert("oracle_user".to_string(), "map_user".to_string());
        assert_eq!(config.credential("oracle", "user"), Some("typed_user".to_string()));
    }
}
