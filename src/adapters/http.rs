//! REST adapter: assembles a request against `connection.base_url`, handles the four auth
//! modes, retries locally per §4.5.3, and optionally shapes/validates the JSON response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use jsonschema::JSONSchema;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::time::Instant;
use url::Url;

use crate::client_error::ClientError;
use crate::config::Config;
use crate::models::{AdapterResult, HealthStatus, ResolvedSource, SourceType};

use super::{Adapter, FetchOptions, FetchOutput};

const DEFAULT_RETRY_STATUS_CODES: &[u16] = &[502, 503, 504];
const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Adapter for REST/HTTP-bound bindings.
pub struct HttpAdapter {
    config: Arc<Config>,
    http: reqwest::Client,
}

impl HttpAdapter {
    pub fn new(config: Arc<Config>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, http }
    }

    fn base_url(connection: &HashMap<String, Value>) -> Result<Url, ClientError> {
        let raw = connection
            .get("base_url")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::configuration("http adapter requires connection.base_url"))?;
        Url::parse(raw).map_err(ClientError::from)
    }

    /// Resolve `query` against `base_url`, joining with exactly one separator regardless of
    /// whether either side carries a leading/trailing `/`.
    fn target_url(base_url: &Url, query: &str) -> Result<Url, ClientError> {
        if query.is_empty() {
            return Ok(base_url.clone());
        }
        let base = base_url.as_str().trim_end_matches('/');
        let rel = query.trim_start_matches('/');
        Url::parse(&format!("{base}/{rel}")).map_err(ClientError::from)
    }

    /// Merge `moniker_params` (legacy) and `query_params` (preferred) into query pairs;
    /// `query_params` wins on key collision.
    fn merge_query_params(binding: &ResolvedSource) -> Vec<(String, String)> {
        let mut merged: HashMap<String, String> = HashMap::new();
        if let Some(legacy) = binding.params.get("moniker_params").and_then(Value::as_object) {
            for (k, v) in legacy {
                merged.insert(k.clone(), value_to_query_string(v));
            }
        }
        if let Some(preferred) = binding.params.get("query_params").and_then(Value::as_object) {
            for (k, v) in preferred {
                merged.insert(k.clone(), value_to_query_string(v));
            }
        }
        merged.into_iter().collect()
    }

    fn auth_header(
        &self,
        binding: &ResolvedSource,
    ) -> Result<Option<(String, String)>, ClientError> {
        let auth_type = binding
            .connection
            .get("auth_type")
            .and_then(Value::as_str)
            .unwrap_or("none");

        match auth_type {
            "none" => Ok(None),
            "bearer" => {
                let token = binding
                    .params
                    .get("bearer_token")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| self.config.credential("http", "bearer_token"));
                Ok(token.map(|t| ("Authorization".to_string(), format!("Bearer {t}"))))
            }
            "api_key" => {
                let key = binding
                    .params
                    .get("api_key")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| self.config.credential("http", "api_key"));
                let header_name = binding
                    .connection
                    .get("api_key_header")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_API_KEY_HEADER);
                Ok(key.map(|k| (header_name.to_string(), k)))
            }
            "basic" => {
                let user = binding
                    .params
                    .get("basic_user")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| self.config.credential("http", "user"));
                let password = binding
                    .params
                    .get("basic_password")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| self.config.credential("http", "password"));
                match (user, password) {
                    (Some(u), Some(p)) => {
                        let token = BASE64.encode(format!("{u}:{p}"));
                        Ok(Some(("Authorization".to_string(), format!("Basic {token}"))))
                    }
                    _ => Ok(None),
                }
            }
            other => Err(ClientError::configuration(format!("unrecognized auth_type: {other}"))),
        }
    }

    fn retry_status_codes(&self) -> Vec<u16> {
        if self.config.retry_status_codes.is_empty() {
            DEFAULT_RETRY_STATUS_CODES.to_vec()
        } else {
            self.config.retry_status_codes.clone()
        }
    }

    /// Local retry loop per §4.5.3: independent of the resolver client's §4.1 retry engine.
    async fn send_with_retry(
        &self,
        url: Url,
        headers: Vec<(String, String)>,
    ) -> Result<Value, ClientError> {
        let retryable_statuses = self.retry_status_codes();
        let max_attempts = self.config.retry_max_attempts.max(1);
        let backoff_factor = self.config.retry_backoff_factor;

        let mut last_err: Option<ClientError> = None;
        for attempt in 0..max_attempts {
            let mut request = self.http.get(url.clone());
            for (name, value) in &headers {
                request = request.header(name, value);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        return Err(ClientError::NotFound { path: url.path().to_string() });
                    }
                    if status.is_success() {
                        return response.json::<Value>().await.map_err(ClientError::from);
                    }
                    if !retryable_statuses.contains(&status.as_u16())
                        || attempt + 1 == max_attempts
                    {
                        let detail = response.text().await.unwrap_or_default();
                        return Err(ClientError::ResolutionError {
                            path: url.path().to_string(),
                            status: status.as_u16(),
                            detail,
                        });
                    }
                    last_err = Some(ClientError::ResolutionError {
                        path: url.path().to_string(),
                        status: status.as_u16(),
                        detail: String::new(),
                    });
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(ClientError::Timeout {
                        elapsed: self.config.timeout(),
                        limit: self.config.timeout(),
                    });
                    if attempt + 1 == max_attempts {
                        return Err(last_err.unwrap());
                    }
                }
                Err(e) if e.is_connect() => {
                    last_err = Some(ClientError::connection_refused(e.to_string()));
                    if attempt + 1 == max_attempts {
                        return Err(last_err.unwrap());
                    }
                }
                Err(e) => return Err(ClientError::from(e)),
            }

            let delay = Duration::from_secs_f64(backoff_factor * 2f64.powi(attempt as i32));
            tokio::time::sleep(delay).await;
        }

        Err(last_err.unwrap_or_else(|| ClientError::connection_refused("http retries exhausted")))
    }

    /// Descend `body` along a dot-notation path; numeric segments index sequences. A missing
    /// segment yields `Value::Null`.
    fn apply_response_path(body: Value, response_path: &str) -> Value {
        let mut current = body;
        for segment in response_path.split('.') {
            current = if let Ok(index) = segment.parse::<usize>() {
                current.get(index).cloned().unwrap_or(Value::Null)
            } else {
                current.get(segment).cloned().unwrap_or(Value::Null)
            };
        }
        current
    }

    fn validate_response_schema(body: &Value, schema: &Value) -> Result<(), ClientError> {
        let compiled = JSONSchema::compile(schema)
            .map_err(|e| ClientError::validation(format!("invalid response_schema: {e}")))?;
        compiled.validate(body).map_err(|errors| {
            let joined = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
            ClientError::validation(format!("response failed schema validation: {joined}"))
        })
    }
}

fn value_to_query_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Http
    }

    async fn fetch(
        &self,
        binding: &ResolvedSource,
        _extra: &HashMap<String, Value>,
        options: &FetchOptions,
    ) -> Result<FetchOutput, ClientError> {
        let base_url = Self::base_url(&binding.connection)?;
        let query_path = binding.query.as_deref().unwrap_or("");
        let mut url = Self::target_url(&base_url, query_path)?;

        let query_params = Self::merge_query_params(binding);
        if !query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &query_params {
                pairs.append_pair(k, v);
            }
        }

        let mut headers = Vec::new();
        if let Some(header) = self.auth_header(binding)? {
            headers.push(header);
        }

        let started = Instant::now();
        let mut body = self.send_with_retry(url, headers).await?;
        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        if let Some(path) = binding.params.get("response_path").and_then(Value::as_str) {
            body = Self::apply_response_path(body, path);
        }
        if let Some(schema) = binding.params.get("response_schema") {
            Self::validate_response_schema(&body, schema)?;
        }

        if options.return_result {
            let row_count = body.as_array().map(|a| a.len() as u64).unwrap_or(0);
            Ok(FetchOutput::Result(AdapterResult {
                data: body,
                row_count,
                columns: Vec::new(),
                execution_time_ms,
                source_type: SourceType::Http,
                query_executed: binding.query.clone(),
                truncated: false,
                metadata: HashMap::new(),
            }))
        } else {
            Ok(FetchOutput::Data(body))
        }
    }

    async fn list_children(&self, binding: &ResolvedSource) -> Vec<String> {
        let Some(endpoint) = binding.connection.get("children_endpoint").and_then(Value::as_str) else {
            return Vec::new();
        };
        let Ok(url) = Url::parse(endpoint) else {
            return Vec::new();
        };
        let headers = self.auth_header(binding).ok().flatten().into_iter().collect();
        let Ok(body) = self.send_with_retry(url, headers).await else {
            return Vec::new();
        };
        normalize_children(&body)
    }

    async fn health_check(&self, binding: &ResolvedSource) -> HealthStatus {
        let endpoint = binding
            .connection
            .get("health_endpoint")
            .and_then(Value::as_str)
            .map(str::to_string);
        let url = match endpoint {
            Some(ref e) => Url::parse(e),
            None => Self::base_url(&binding.connection).map_err(|_| url::ParseError::EmptyHost),
        };
        let Ok(url) = url else {
            return HealthStatus::unhealthy("no base_url or health_endpoint configured");
        };
        let started = Instant::now();
        match self.http.get(url).send().await {
            Ok(response) if response.status().as_u16() < 400 => {
                HealthStatus::healthy(started.elapsed().as_secs_f64() * 1000.0, HashMap::new())
            }
            Ok(response) => HealthStatus::unhealthy(format!("status {}", response.status())),
            Err(e) => HealthStatus::unhealthy(e.to_string()),
        }
    }
}

/// Normalize a `list_children` response body per §4.5.3: array-of-strings used directly,
/// array-of-objects extracts `name`/`id`/`path`, object searches `children`/`items`/`results`/
/// `data` for the first list and repeats.
fn normalize_children(body: &Value) -> Vec<String> {
    match body {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => ["name", "id", "path"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        Value::Object(map) => ["children", "items", "results", "data"]
            .iter()
            .find_map(|key| map.get(*key))
            .map(normalize_children)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn binding(connection: Value, query: Option<&str>, params: Value) -> ResolvedSource {
        ResolvedSource {
            moniker: "moniker://x/y".into(),
            path: "x/y".into(),
            source_type: SourceType::Http,
            connection: connection.as_object().unwrap().clone().into_iter().collect(),
            query: query.map(str::to_string),
            params: params.as_object().unwrap().clone().into_iter().collect(),
            schema: None,
            read_only: true,
            ownership: Default::default(),
            binding_path: "x/y".into(),
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
    fn base_url_joining_is_single_separator_both_ways() {
        let base = Url::parse("https://api.example.com").unwrap();
        let a = HttpAdapter::target_url(&base, "/v1/data").unwrap();
        let b = HttpAdapter::target_url(&base, "v1/data").unwrap();
        assert_eq!(a.as_str(), "https://api.example.com/v1/data");
        assert_eq!(a, b);
    }

    #[test]
    fn query_params_wins_over_moniker_params_on_collision() {
        let b = binding(
            json!({"base_url": "https://api.example.com"}),
            Some("/v1/data"),
            json!({
                "moniker_params": {"a": "legacy", "b": "keep"},
                "query_params": {"a": "preferred"}
            }),
        );
        let merged: HashMap<String, String> = HttpAdapter::merge_query_params(&b).into_iter().collect();
        assert_eq!(merged.get("a"), Some(&"preferred".to_string()));
        assert_eq!(merged.get("b"), Some(&"keep".to_string()));
    }

    #[test]
    fn response_path_descends_through_numeric_segment() {
        let body = json!({"data": [{"id": 1}, {"id": 2}]});
        let extracted = HttpAdapter::apply_response_path(body, "data.1.id");
        assert_eq!(extracted, json!(2));
    }

    #[test]
    fn response_path_missing_segment_yields_null() {
        let body = json!({"data": []});
        let extracted = HttpAdapter::apply_response_path(body, "data.0.id");
        assert_eq!(extracted, Value::Null);
    }

    #[test]
    fn normalize_children_handles_all_three_shapes() {
        assert_eq!(
            normalize_children(&json!(["a", "b"])),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            normalize_children(&json!([{"name": "a"}, {"id": "b"}])),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            normalize_children(&json!({"results": ["a", "b"]})),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
