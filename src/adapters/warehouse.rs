//! Warehouse adapter (Snowflake-class): connects using account/warehouse/database/schema,
//! opening and closing a connection per call.
//!
//! No first-party, actively-maintained Snowflake driver crate exists for Rust the way `oracle`
//! and `tiberius` exist for their sources, so the actual wire protocol is bring-your-own via
//! [`WarehouseDriver`] — the same pattern [`crate::auth::KerberosProvider`] uses for SPNEGO.
//! Requesting a warehouse fetch without a configured driver is a loud [`ClientError::ConfigurationError`],
//! not a silent no-op.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::client_error::ClientError;
use crate::config::Config;
use crate::models::{AdapterResult, HealthStatus, ResolvedSource, SourceType};

use super::{Adapter, FetchOptions, FetchOutput};

const DEFAULT_SCHEMA: &str = "PUBLIC";

/// Connection parameters for a single warehouse call, derived from a binding's `connection`.
#[derive(Debug, Clone)]
pub struct WarehouseConnectionParams {
    pub account: String,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: String,
    pub role: Option<String>,
}

/// Resolved credentials for a single warehouse call: either user+password or
/// user+private-key-file. When only a key file is configured the password is omitted
/// entirely rather than sent empty.
#[derive(Debug, Clone)]
pub struct WarehouseCredentials {
    pub user: String,
    pub password: Option<String>,
    pub private_key_path: Option<String>,
}

/// Bring-your-own wire protocol for a warehouse-class source. A call opens a connection,
/// performs one operation, and the adapter is responsible for ensuring it's dropped/closed
/// on every exit path (including failure).
#[async_trait]
pub trait WarehouseDriver: Send + Sync {
    async fn execute_query(
        &self,
        conn: &WarehouseConnectionParams,
        credentials: &WarehouseCredentials,
        query: &str,
    ) -> Result<Vec<Map<String, Value>>, String>;

    /// Runs `SHOW TABLES` and returns the second column of each row.
    async fn show_tables(
        &self,
        conn: &WarehouseConnectionParams,
        credentials: &WarehouseCredentials,
    ) -> Result<Vec<String>, String>;

    async fn ping(
        &self,
        conn: &WarehouseConnectionParams,
        credentials: &WarehouseCredentials,
    ) -> Result<(), String>;
}

pub struct WarehouseAdapter {
    config: Arc<Config>,
    driver: Option<Arc<dyn WarehouseDriver>>,
}

impl WarehouseAdapter {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config, driver: None }
    }

    pub fn with_driver(mut self, driver: Arc<dyn WarehouseDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    fn connection_params(connection: &HashMap<String, Value>) -> Result<WarehouseConnectionParams, ClientError> {
        let account = connection
            .get("account")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::configuration("warehouse adapter requires connection.account"))?
            .to_string();
        Ok(WarehouseConnectionParams {
            account,
            warehouse: connection.get("warehouse").and_then(Value::as_str).map(str::to_string),
            database: connection.get("database").and_then(Value::as_str).map(str::to_string),
            schema: connection
                .get("schema")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_SCHEMA)
                .to_string(),
            role: connection.get("role").and_then(Value::as_str).map(str::to_string),
        })
    }

    fn credentials(
        &self,
        params: &HashMap<String, Value>,
    ) -> Result<WarehouseCredentials, ClientError> {
        let user = params
            .get("snowflake_user")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.config.credential("snowflake", "user"))
            .ok_or_else(|| ClientError::auth_failure("no snowflake user credential configured"))?;

        let password = params
            .get("snowflake_password")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.config.credential("snowflake", "password"));

        let private_key_path = params
            .get("snowflake_private_key_path")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.config.credential("snowflake", "private_key_path"));

        // If only a key file is configured, the password field is omitted entirely rather than
        // sent as an empty string.
        let password = if password.is_none() && private_key_path.is_some() { None } else { password };

        if password.is_none() && private_key_path.is_none() {
            return Err(ClientError::auth_failure(
                "warehouse credentials require either a password or a private_key_path",
            ));
        }

        Ok(WarehouseCredentials { user, password, private_key_path })
    }

    fn driver_or_err(&self) -> Result<&Arc<dyn WarehouseDriver>, ClientError> {
        self.driver
            .as_ref()
            .ok_or_else(|| ClientError::configuration("no WarehouseDriver configured for this adapter"))
    }
}

#[async_trait]
impl Adapter for WarehouseAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Warehouse
    }

    async fn fetch(
        &self,
        binding: &ResolvedSource,
        _extra: &HashMap<String, Value>,
        options: &FetchOptions,
    ) -> Result<FetchOutput, ClientError> {
        let driver = self.driver_or_err()?;
        let conn = Self::connection_params(&binding.connection)?;
        let credentials = self.credentials(&binding.params)?;
        let query = binding
            .query
            .as_deref()
            .ok_or_else(|| ClientError::configuration("warehouse binding has no query"))?;

        let started = Instant::now();
        let rows = driver
            .execute_query(&conn, &credentials, query)
            .await
            .map_err(ClientError::connection_refused)?;
        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let columns = rows.first().map(|r| r.keys().cloned().collect()).unwrap_or_default();
        let row_count = rows.len() as u64;
        let data = Value::Array(rows.into_iter().map(Value::Object).collect());

        if options.return_result {
            Ok(FetchOutput::Result(AdapterResult {
                data,
                row_count,
                columns,
                execution_time_ms,
                source_type: SourceType::Warehouse,
                query_executed: Some(query.to_string()),
                truncated: false,
                metadata: HashMap::new(),
            }))
        } else {
            Ok(FetchOutput::Data(data))
        }
    }

    async fn list_children(&self, binding: &ResolvedSource) -> Vec<String> {
        let Ok(driver) = self.driver_or_err() else { return Vec::new() };
        let Ok(conn) = Self::connection_params(&binding.connection) else { return Vec::new() };
        let Ok(credentials) = self.credentials(&binding.params) else { return Vec::new() };
        driver.show_tables(&conn, &credentials).await.unwrap_or_default()
    }

    async fn health_check(&self, binding: &ResolvedSource) -> HealthStatus {
        let driver = match self.driver_or_err() {
            Ok(d) => d,
            Err(e) => return HealthStatus::unhealthy(e.to_string()),
        };
        let conn = match Self::connection_params(&binding.connection) {
            Ok(c) => c,
            Err(e) => return HealthStatus::unhealthy(e.to_string()),
        };
        let credentials = match self.credentials(&binding.params) {
            Ok(c) => c,
            Err(e) => return HealthStatus::unhealthy(e.to_string()),
        };
        let started = Instant::now();
        match driver.ping(&conn, &credentials).await {
            Ok(()) => HealthStatus::healthy(started.elapsed().as_secs_f64() * 1000.0, HashMap::new()),
            Err(e) => HealthStatus::unhealthy(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_account_is_configuration_error() {
        let connection = HashMap::new();
        assert!(WarehouseAdapter::connection_params(&connection).is_err());
    }

    #[test]
    fn schema_defaults_to_public() {
        let mut connection = HashMap::new();
        connection.insert("account".to_string(), Value::String("acme".into()));
        let params = WarehouseAdapter::connection_params(&connection).unwrap();
        assert_eq!(params.schema, "PUBLIC");
    }

    #[test]
    fn key_file_only_omits_password_entirely() {
        let config = Arc::new(Config::default());
        let adapter = WarehouseAdapter::new(config);
        let mut params = HashMap::new();
        params.insert("snowflake_user".to_string(), Value::String("svc".into()));
        params.insert(
            "snowflake_private_key_path".to_string(),
            Value::String("/keys/svc.p8".into()),
        );
        let creds = adapter.credentials(&params).unwrap();
        assert!(creds.password.is_none());
        assert_eq!(creds.private_key_path.as_deref(), Some("/keys/svc.p8"));
    }

    #[test]
    fn missing_all_credentials_is_auth_failure() {
        let config = Arc::new(Config::default());
        let adapter = WarehouseAdapter::new(config);
        let mut params = HashMap::new();
        params.insert("snowflake_user".to_string(), Value::String("svc".into()));
        let err = adapter.credentials(&params).unwrap_err();
        assert!(matches!(err, ClientError::AuthenticationFailure { .. }));
    }

    #[tokio::test]
    async fn fetch_without_driver_is_configuration_error() {
        let config = Arc::new(Config::default());
        let adapter = WarehouseAdapter::new(config);
        let mut connection = HashMap::new();
        connection.insert("account".to_string(), Value::String("acme".into()));
        let binding = ResolvedSource {
            moniker: "moniker://x".into(),
            path: "x".into(),
            source_type: SourceType::Warehouse,
            connection,
            query: Some("SELECT 1".into()),
            params: HashMap::new(),
            schema: None,
            read_only: true,
            ownership: Default::default(),
            binding_path: "x".into(),
            sub_path: String::new(),
            status: None,
            deprecation_message: None,
            successor: None,
            sunset_date: None,
            migration_guide: None,
            redirected_from: None,
        };
        let err = adapter.fetch(&binding, &HashMap::new(), &FetchOptions::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::ConfigurationError { .. }));
    }
}
