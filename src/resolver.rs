//! Low-level HTTP client for the resolution service, wrapped in the retry engine and circuit
//! breaker from §4.1/§4.2.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use url::Url;

use crate::auth::{self, KerberosProvider};
use crate::circuit_breaker::CircuitBreakerPolicy;
use crate::client_error::ClientError;
use crate::config::Config;
use crate::models::{
    CatalogStats, FetchResult, MetadataResult, ResolvedSource, SampleResult, SearchResult,
    TreeNode,
};
use crate::moniker::Moniker;
use crate::retry::RetryPolicy;
use crate::{Backoff, Jitter, ResilienceError};

const DEFAULT_RETRYABLE_STATUS_CODES: &[u16] = &[429, 502, 503, 504];
const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(5);

/// Record POSTed to `/telemetry/access` describing the outcome of a single `read`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccessTelemetry {
    pub moniker: String,
    pub outcome: String,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successor: Option<String>,
}

/// The resolver's low-level HTTP surface, guarded by a retry engine and a circuit breaker.
///
/// Does not itself consult or write the resolution cache — that composition happens one layer
/// up, in [`crate::client::WayfareClient`], so the cache can short-circuit before any of the
/// resilience machinery here runs.
pub struct ResolverClient {
    http: reqwest::Client,
    config: Arc<Config>,
    retry: RetryPolicy<ClientError>,
    breaker: CircuitBreakerPolicy,
    kerberos_provider: Option<Arc<dyn KerberosProvider>>,
}

impl ResolverClient {
    pub fn new(config: Arc<Config>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ClientError::Transport)?;

        let retry = RetryPolicy::builder()
            .max_attempts(3)
            .expect("max_attempts > 0")
            .backoff(Backoff::exponential(Duration::from_millis(200)).with_max(Duration::from_secs(5)))
            .with_jitter(Jitter::ratio(0.75, 1.25))
            .should_retry(|e: &ClientError| e.is_retryable(DEFAULT_RETRYABLE_STATUS_CODES))
            .build();

        let breaker = CircuitBreakerPolicy::new(5, Duration::from_secs(30)).with_success_threshold(2);

        Ok(Self { http, config, retry, breaker, kerberos_provider: None })
    }

    pub fn with_kerberos_provider(mut self, provider: Arc<dyn KerberosProvider>) -> Self {
        self.kerberos_provider = Some(provider);
        self
    }

    fn build_url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ClientError> {
        let base = self.config.service_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{path}"))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn headers(&self) -> Result<reqwest::header::HeaderMap, ClientError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(app_id) = &self.config.app_id {
            headers.insert(
                "X-App-ID",
                app_id.parse().map_err(|_| ClientError::configuration("invalid app_id header value"))?,
            );
        }
        if let Some(team) = &self.config.team {
            headers.insert(
                "X-Team",
                team.parse().map_err(|_| ClientError::configuration("invalid team header value"))?,
            );
        }
        let auth_headers = auth::auth_headers(&self.config, self.kerberos_provider.as_deref())?;
        for (k, v) in auth_headers {
            let name = reqwest::header::HeaderName::from_bytes(k.as_bytes())
                .map_err(|_| ClientError::configuration("invalid auth header name"))?;
            headers.insert(name, v.parse().map_err(|_| ClientError::configuration("invalid auth header value"))?);
        }
        Ok(headers)
    }

    async fn send_json(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let url = self.build_url(path, query)?;
        let mut request = self.http.request(method, url).headers(self.headers()?);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound { path: path.to_string() });
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            let detail = response.text().await.unwrap_or_default();
            return Err(ClientError::AccessDenied { path: path.to_string(), detail });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ClientError::ResolutionError {
                path: path.to_string(),
                status: status.as_u16(),
                detail,
            });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let value = response.json::<Value>().await?;
        Ok(value)
    }

    /// Take the breaker token, run the retry-wrapped request, and report the outcome to the
    /// breaker — 404 is never reported as a breaker failure.
    async fn resilient_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        if let Err(remaining) = self.breaker.before_request() {
            return Err(ClientError::connection_refused(format!(
                "circuit breaker open, retry after {remaining:?}"
            )));
        }

        let result = self
            .retry
            .execute(|| async {
                self.send_json(method.clone(), path, query, body)
                    .await
                    .map_err(ResilienceError::Inner)
            })
            .await;

        match &result {
            Ok(_) => self.breaker.on_success(),
            Err(ResilienceError::Inner(e)) if e.is_not_found() => {}
            Err(ResilienceError::RetryExhausted { failures, .. })
                if failures.last().map(ClientError::is_not_found).unwrap_or(false) => {}
            Err(_) => self.breaker.on_failure(),
        }

        unwrap_resilience(result)
    }

    fn normalize(path: &str) -> String {
        Moniker::new(path).path().to_string()
    }

    pub async fn resolve(&self, moniker: &str) -> Result<ResolvedSource, ClientError> {
        let path = Self::normalize(moniker);
        let value = self.resilient_request(Method::GET, &format!("/resolve/{path}"), &[], None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Resolve many monikers in one round trip. Returns a map keyed by normalized path.
    pub async fn batch_resolve(
        &self,
        monikers: &[String],
    ) -> Result<HashMap<String, ResolvedSource>, ClientError> {
        let uris: Vec<String> = monikers.iter().map(|m| Moniker::new(m).uri()).collect();
        let body = json!({ "monikers": uris });
        let value = self.resilient_request(Method::POST, "/resolve/batch", &[], Some(&body)).await?;
        let results: Vec<ResolvedSource> = serde_json::from_value(
            value.get("results").cloned().unwrap_or(Value::Array(vec![])),
        )?;
        Ok(results.into_iter().map(|r| (r.path.clone(), r)).collect())
    }

    pub async fn describe(&self, moniker: &str) -> Result<Value, ClientError> {
        let path = Self::normalize(moniker);
        self.resilient_request(Method::GET, &format!("/describe/{path}"), &[], None).await
    }

    /// List immediate children. `moniker` of `None` lists the catalog root.
    pub async fn list_children(&self, moniker: Option<&str>) -> Result<Vec<String>, ClientError> {
        let url_path = match moniker {
            Some(m) => format!("/list/{}", Self::normalize(m)),
            None => "/list".to_string(),
        };
        let value = self.resilient_request(Method::GET, &url_path, &[], None).await?;
        let children = value
            .get("children")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        Ok(children)
    }

    pub async fn lineage(&self, moniker: &str) -> Result<Value, ClientError> {
        let path = Self::normalize(moniker);
        self.resilient_request(Method::GET, &format!("/lineage/{path}"), &[], None).await
    }

    pub async fn fetch_server_side(
        &self,
        moniker: &str,
        limit: Option<u64>,
        extra: &HashMap<String, String>,
    ) -> Result<FetchResult, ClientError> {
        let path = Self::normalize(moniker);
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        for (k, v) in extra {
            query.push((k.as_str(), v.clone()));
        }
        let value = self.resilient_request(Method::GET, &format!("/fetch/{path}"), &query, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn metadata(&self, moniker: &str) -> Result<MetadataResult, ClientError> {
        let path = Self::normalize(moniker);
        let value = self.resilient_request(Method::GET, &format!("/metadata/{path}"), &[], None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn sample(&self, moniker: &str, limit: u64) -> Result<SampleResult, ClientError> {
        let path = Self::normalize(moniker);
        let query = [("limit", limit.to_string())];
        let value = self.resilient_request(Method::GET, &format!("/sample/{path}"), &query, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn tree(&self, moniker: Option<&str>, depth: Option<u32>) -> Result<TreeNode, ClientError> {
        let url_path = match moniker {
            Some(m) => format!("/tree/{}", Self::normalize(m)),
            None => "/tree".to_string(),
        };
        let mut query = Vec::new();
        if let Some(depth) = depth {
            query.push(("depth", depth.to_string()));
        }
        let value = self.resilient_request(Method::GET, &url_path, &query, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn search(
        &self,
        q: &str,
        status: Option<&str>,
        limit: Option<u64>,
    ) -> Result<SearchResult, ClientError> {
        let mut query = vec![("q", q.to_string())];
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        let value = self.resilient_request(Method::GET, "/catalog/search", &query, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn catalog_stats(&self) -> Result<CatalogStats, ClientError> {
        let value = self.resilient_request(Method::GET, "/catalog/stats", &[], None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Best-effort health probe of the resolver itself.
    pub async fn health(&self) -> bool {
        self.resilient_request(Method::GET, "/health", &[], None).await.is_ok()
    }

    /// POST an access-telemetry record. Best-effort: bounded by a fixed 5s timeout, any
    /// failure is swallowed and logged at `debug`.
    pub async fn report_telemetry(&self, record: &AccessTelemetry) {
        if !self.config.report_telemetry {
            return;
        }
        let url = match self.build_url("/telemetry/access", &[]) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(error = %e, "skipping telemetry report: bad url");
                return;
            }
        };
        let headers = match self.headers() {
            Ok(h) => h,
            Err(e) => {
                tracing::debug!(error = %e, "skipping telemetry report: bad headers");
                return;
            }
        };
        let send = self.http.post(url).headers(headers).json(record).timeout(TELEMETRY_TIMEOUT).send();
        if let Err(e) = send.await {
            tracing::debug!(error = %e, "telemetry report failed");
        }
    }
}

fn unwrap_resilience<T>(result: Result<T, ResilienceError<ClientError>>) -> Result<T, ClientError> {
    match result {
        Ok(v) => Ok(v),
        Err(ResilienceError::Inner(e)) => Err(e),
        Err(ResilienceError::RetryExhausted { attempts, mut failures }) => {
            let last = failures
                .pop()
                .unwrap_or_else(|| ClientError::connection_refused("retries exhausted"));
            Err(ClientError::RetriesExhausted { attempts, source: Box::new(last) })
        }
        Err(ResilienceError::Timeout { elapsed, timeout }) => {
            Err(ClientError::Timeout { elapsed, limit: timeout })
        }
        Err(ResilienceError::CircuitOpen { open_duration, .. }) => {
            Err(ClientError::connection_refused(format!("circuit open, retry after {open_duration:?}")))
        }
        Err(ResilienceError::Bulkhead { .. }) => {
            unreachable!("resolver client does not guard requests with a bulkhead")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_against(server: &MockServer) -> ResolverClient {
        let mut config = Config::default();
        config.service_url = server.uri();
        config.report_telemetry = false;
        ResolverClient::new(Arc::new(config)).unwrap()
    }

    #[tokio::test]
    async fn resolve_happy_path_decodes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve/sales/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "moniker": "moniker://sales/orders",
                "path": "sales/orders",
                "source_type": "http",
                "connection": {"base_url": "https://api.example.com"},
                "binding_path": "sales/orders",
            })))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        let resolved = client.resolve("sales/orders").await.unwrap();
        assert_eq!(resolved.path, "sales/orders");
    }

    #[tokio::test]
    async fn resolve_404_is_not_found_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        let err = client.resolve("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn resolve_503_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/resolve/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "moniker": "moniker://flaky",
                "path": "flaky",
                "source_type": "http",
                "connection": {},
                "binding_path": "flaky",
            })))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        let resolved = client.resolve("flaky").await.unwrap();
        assert_eq!(resolved.path, "flaky");
    }
}
