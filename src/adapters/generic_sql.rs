//! Generic-SQL adapter (MSSQL-class): executes the resolver-supplied query verbatim, with no
//! textual rewriting and no connection caching. A connection is opened fresh for every call and
//! dropped on every exit path, success or failure.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::client_error::ClientError;
use crate::config::Config;
use crate::models::{HealthStatus, ResolvedSource, SourceType};

use super::{Adapter, FetchOptions, FetchOutput};

const DEFAULT_PORT: u64 = 1433;

pub struct GenericSqlAdapter {
    config: Arc<Config>,
}

impl GenericSqlAdapter {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn credentials(&self) -> Result<(String, String), ClientError> {
        let user = self
            .config
            .credential("mssql", "user")
            .ok_or_else(|| ClientError::auth_failure("no mssql user credential configured"))?;
        let password = self
            .config
            .credential("mssql", "password")
            .ok_or_else(|| ClientError::auth_failure("no mssql password credential configured"))?;
        Ok((user, password))
    }
}

#[cfg(feature = "mssql-driver")]
mod driver {
    use super::*;
    use tiberius::{AuthMethod, Client, Config as TiberiusConfig, QueryItem};
    use tokio::net::TcpStream;
    use tokio_util::compat::TokioAsyncWriteCompatExt;

    pub type Connection = Client<tokio_util::compat::Compat<TcpStream>>;

    pub fn connection_config(
        connection: &HashMap<String, Value>,
        user: &str,
        password: &str,
    ) -> Result<TiberiusConfig, ClientError> {
        let host = connection
            .get("host")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::configuration("generic-sql adapter requires connection.host"))?;
        let port = connection.get("port").and_then(Value::as_u64).unwrap_or(super::DEFAULT_PORT) as u16;
        let database = connection.get("database").and_then(Value::as_str);

        let mut config = TiberiusConfig::new();
        config.host(host);
        config.port(port);
        config.authentication(AuthMethod::sql_server(user, password));
        config.trust_cert();
        if let Some(database) = database {
            config.database(database);
        }
        Ok(config)
    }

    pub async fn connect(config: TiberiusConfig) -> Result<Connection, ClientError> {
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| ClientError::connection_refused(e.to_string()))?;
        tcp.set_nodelay(true).map_err(|e| ClientError::connection_refused(e.to_string()))?;
        Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| ClientError::connection_refused(e.to_string()))
    }

    pub async fn run_query(
        conn: &mut Connection,
        query: &str,
    ) -> Result<(Vec<String>, Vec<Map<String, Value>>), ClientError> {
        let mut stream = conn
            .simple_query(query)
            .await
            .map_err(|e| ClientError::connection_refused(e.to_string()))?;

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();
        use futures::TryStreamExt;
        while let Some(item) = stream
            .try_next()
            .await
            .map_err(|e| ClientError::connection_refused(e.to_string()))?
        {
            if let QueryItem::Row(row) = item {
                if columns.is_empty() {
                    columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                let mut map = Map::new();
                for (idx, name) in columns.iter().enumerate() {
                    let value: Option<&str> = row.get(idx);
                    map.insert(name.clone(), value.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null));
                }
                rows.push(map);
            }
        }
        Ok((columns, rows))
    }
}

#[async_trait]
impl Adapter for GenericSqlAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::GenericSql
    }

    #[cfg(not(feature = "mssql-driver"))]
    async fn fetch(
        &self,
        _binding: &ResolvedSource,
        _extra: &HashMap<String, Value>,
        _options: &FetchOptions,
    ) -> Result<FetchOutput, ClientError> {
        Err(ClientError::configuration(
            "generic-sql adapter requires the `mssql-driver` feature",
        ))
    }

    #[cfg(feature = "mssql-driver")]
    async fn fetch(
        &self,
        binding: &ResolvedSource,
        _extra: &HashMap<String, Value>,
        options: &FetchOptions,
    ) -> Result<FetchOutput, ClientError> {
        use std::time::Instant;

        let query = binding
            .query
            .as_deref()
            .ok_or_else(|| ClientError::configuration("generic-sql binding has no query"))?;
        let (user, password) = self.credentials()?;
        let config = driver::connection_config(&binding.connection, &user, &password)?;

        let started = Instant::now();
        let mut conn = driver::connect(config).await?;
        let (columns, rows) = driver::run_query(&mut conn, query).await?;
        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let row_count = rows.len() as u64;
        let data = Value::Array(rows.into_iter().map(Value::Object).collect());

        if options.return_result {
            Ok(FetchOutput::Result(crate::models::AdapterResult {
                data,
                row_count,
                columns,
                execution_time_ms,
                source_type: SourceType::GenericSql,
                query_executed: Some(query.to_string()),
                truncated: false,
                metadata: HashMap::new(),
            }))
        } else {
            Ok(FetchOutput::Data(data))
        }
    }

    #[cfg(not(feature = "mssql-driver"))]
    async fn list_children(&self, _binding: &ResolvedSource) -> Vec<String> {
        Vec::new()
    }

    #[cfg(feature = "mssql-driver")]
    async fn list_children(&self, binding: &ResolvedSource) -> Vec<String> {
        let Ok((user, password)) = self.credentials() else { return Vec::new() };
        let Ok(config) = driver::connection_config(&binding.connection, &user, &password) else {
            return Vec::new();
        };
        let Ok(mut conn) = driver::connect(config).await else { return Vec::new() };
        driver::run_query(&mut conn, "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES")
            .await
            .ok()
            .map(|(_, rows)| {
                rows.into_iter()
                    .filter_map(|row| row.get("TABLE_NAME").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(not(feature = "mssql-driver"))]
    async fn health_check(&self, _binding: &ResolvedSource) -> HealthStatus {
        HealthStatus::unhealthy("generic-sql adapter requires the `mssql-driver` feature")
    }

    #[cfg(feature = "mssql-driver")]
    async fn health_check(&self, binding: &ResolvedSource) -> HealthStatus {
        use std::time::Instant;

        let (user, password) = match self.credentials() {
            Ok(c) => c,
            Err(e) => return HealthStatus::unhealthy(e.to_string()),
        };
        let config = match driver::connection_config(&binding.connection, &user, &password) {
            Ok(c) => c,
            Err(e) => return HealthStatus::unhealthy(e.to_string()),
        };
        let started = Instant::now();
        let mut conn = match driver::connect(config).await {
            Ok(c) => c,
            Err(e) => return HealthStatus::unhealthy(e.to_string()),
        };
        match driver::run_query(&mut conn, "SELECT 1").await {
            Ok(_) => HealthStatus::healthy(started.elapsed().as_secs_f64() * 1000.0, HashMap::new()),
            Err(e) => HealthStatus::unhealthy(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_is_auth_failure() {
        let config = Arc::new(Config::default());
        let adapter = GenericSqlAdapter::new(config);
        assert!(adapter.credentials().is_err());
    }

    #[test]
    fn configured_credentials_round_trip() {
        let mut config = Config::default();
        config
            .credentials
            .insert("mssql_user".to_string(), "svc".to_string());
        config
            .credentials
            .insert("mssql_password".to_string(), "secret".to_string());
        let adapter = GenericSqlAdapter::new(Arc::new(config));
        let (user, password) = adapter.credentials().unwrap();
        assert_eq!(user, "svc");
        assert_eq!(password, "secret");
    }

    #[tokio::test]
    async fn fetch_without_driver_is_configuration_error() {
        let config = Arc::new(Config::default());
        let adapter = GenericSqlAdapter::new(config);
        let mut connection = HashMap::new();
        connection.insert("host".to_string(), Value::String("db.internal".into()));
        let binding = ResolvedSource {
            moniker: "moniker://x".into(),
            path: "x".into(),
            source_type: SourceType::GenericSql,
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
