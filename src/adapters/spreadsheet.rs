//! Spreadsheet / static adapter: a single unauthenticated GET against `connection.base_url`
//! joined with the binding's `query` as a relative resource path. Deliberately the HTTP
//! adapter's primitive, without its auth/retry/response-shaping machinery — static/spreadsheet
//! bindings never need those, and giving this tag its own trivial, auditable implementation
//! avoids silently inheriting REST-adapter behavior it would never exercise.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use url::Url;

use crate::client_error::ClientError;
use crate::config::Config;
use crate::models::{AdapterResult, HealthStatus, ResolvedSource, SourceType};

use super::{Adapter, FetchOptions, FetchOutput};

pub struct SpreadsheetAdapter {
    http: reqwest::Client,
}

impl SpreadsheetAdapter {
    pub fn new(config: Arc<Config>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }

    fn target_url(binding: &ResolvedSource) -> Result<Url, ClientError> {
        let base = binding
            .connection
            .get("base_url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ClientError::configuration("spreadsheet adapter requires connection.base_url")
            })?;
        let base = base.trim_end_matches('/');
        match binding.query.as_deref().filter(|q| !q.is_empty()) {
            Some(query) => {
                Url::parse(&format!("{base}/{}", query.trim_start_matches('/'))).map_err(ClientError::from)
            }
            None => Url::parse(base).map_err(ClientError::from),
        }
    }
}

#[async_trait]
impl Adapter for SpreadsheetAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Static
    }

    async fn fetch(
        &self,
        binding: &ResolvedSource,
        _extra: &HashMap<String, Value>,
        options: &FetchOptions,
    ) -> Result<FetchOutput, ClientError> {
        let url = Self::target_url(binding)?;
        let started = Instant::now();
        let response = self.http.get(url.clone()).send().await.map_err(ClientError::from)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound { path: url.path().to_string() });
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(ClientError::ResolutionError { path: url.path().to_string(), status, detail });
        }
        let body = response.json::<Value>().await.map_err(ClientError::from)?;
        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        if options.return_result {
            let row_count = body.as_array().map(|a| a.len() as u64).unwrap_or(0);
            Ok(FetchOutput::Result(AdapterResult {
                data: body,
                row_count,
                columns: Vec::new(),
                execution_time_ms,
                source_type: SourceType::Static,
                query_executed: binding.query.clone(),
                truncated: false,
                metadata: HashMap::new(),
            }))
        } else {
            Ok(FetchOutput::Data(body))
        }
    }

    async fn list_children(&self, binding: &ResolvedSource) -> Vec<String> {
        let Ok(url) = Self::target_url(binding) else {
            return Vec::new();
        };
        let Ok(response) = self.http.get(url).send().await else {
            return Vec::new();
        };
        let Ok(body) = response.json::<Value>().await else {
            return Vec::new();
        };
        match body {
            Value::Array(items) => {
                items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
            }
            _ => Vec::new(),
        }
    }

    async fn health_check(&self, binding: &ResolvedSource) -> HealthStatus {
        let url = match Self::target_url(binding) {
            Ok(url) => url,
            Err(e) => return HealthStatus::unhealthy(e.to_string()),
        };
        let started = Instant::now();
        match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                HealthStatus::healthy(started.elapsed().as_secs_f64() * 1000.0, HashMap::new())
            }
            Ok(response) => HealthStatus::unhealthy(format!("status {}", response.status())),
            Err(e) => HealthStatus::unhealthy(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(base_url: &str, query: Option<&str>) -> ResolvedSource {
        let mut connection = HashMap::new();
        connection.insert("base_url".to_string(), Value::String(base_url.to_string()));
        ResolvedSource {
            moniker: "moniker://x".into(),
            path: "x".into(),
            source_type: SourceType::Static,
            connection,
            query: query.map(str::to_string),
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
        }
    }

    #[test]
    fn target_url_joins_query_as_relative_path() {
        let b = binding("https://static.example.com/snapshots", Some("q1/data.json"));
        let url = SpreadsheetAdapter::target_url(&b).unwrap();
        assert_eq!(url.as_str(), "https://static.example.com/snapshots/q1/data.json");
    }

    #[test]
    fn missing_base_url_is_configuration_error() {
        let b = binding("", None);
        let mut b = b;
        b.connection.clear();
        assert!(SpreadsheetAdapter::target_url(&b).is_err());
    }
}
