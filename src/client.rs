//! [`WayfareClient`]: the orchestrating top-level surface composing the cache, resolver, and
//! adapter registry from §4.6.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::adapters::{AdapterRegistry, FetchOptions, FetchOutput};
use crate::auth::KerberosProvider;
use crate::cache::ResolutionCache;
use crate::client_error::ClientError;
use crate::config::Config;
use crate::models::{
    CatalogStats, FetchResult, MetadataResult, ResolvedSource, SampleResult, SchemaInfo,
    SearchResult, TreeNode,
};
use crate::moniker::Moniker;
use crate::resolver::{AccessTelemetry, ResolverClient};

/// Callback invoked once per deprecated binding encountered in a `resolve`/`batch_resolve` call,
/// with `(path, deprecation_message, successor)`.
pub type DeprecationCallback = dyn Fn(&str, &str, Option<&str>) + Send + Sync;

/// Per-call extras to `read`/`batch_read`. Forwarded verbatim to the dispatched adapter's
/// `fetch` as free-form parameters.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub extra: HashMap<String, Value>,
}

/// Orchestrates moniker resolution (cache-then-resolver), adapter dispatch, access-telemetry
/// reporting, and deprecation warnings.
pub struct WayfareClient {
    config: Arc<Config>,
    resolver: ResolverClient,
    cache: ResolutionCache,
    adapters: AdapterRegistry,
    deprecation_callback: Option<Arc<DeprecationCallback>>,
}

impl WayfareClient {
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let config = Arc::new(config);
        let resolver = ResolverClient::new(config.clone())?;
        let cache = ResolutionCache::new(config.cache_ttl());
        let adapters = AdapterRegistry::with_defaults(config.clone());
        Ok(Self { config, resolver, cache, adapters, deprecation_callback: None })
    }

    pub fn with_kerberos_provider(mut self, provider: Arc<dyn KerberosProvider>) -> Self {
        self.resolver = self.resolver.with_kerberos_provider(provider);
        self
    }

    /// Override the default adapter registry, e.g. to install a [`crate::adapters::WarehouseAdapter`]
    /// with a configured driver, or to register a test double.
    pub fn with_adapter_registry(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_deprecation_callback(
        mut self,
        callback: impl Fn(&str, &str, Option<&str>) + Send + Sync + 'static,
    ) -> Self {
        self.deprecation_callback = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drop every cached resolution. Mostly useful in tests.
    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    // -- Resolution ---------------------------------------------------------------------------

    /// Resolve a moniker to its binding, consulting the cache first. Emits a deprecation
    /// warning, exactly once for this call, if the binding is deprecated and warnings are
    /// enabled.
    pub async fn resolve(&self, moniker: &str) -> Result<ResolvedSource, ClientError> {
        let uri = Moniker::new(moniker).uri();
        let resolved = match self.cache.get(&uri) {
            Some(cached) => cached,
            None => {
                let fresh = self.resolver.resolve(moniker).await?;
                self.cache.insert(uri, fresh.clone());
                fresh
            }
        };
        self.warn_if_deprecated(std::iter::once(&resolved));
        Ok(resolved)
    }

    /// Resolve many monikers in one round trip for whatever isn't already cached. Cache hits
    /// and freshly resolved bindings are both subject to deprecation warnings.
    pub async fn batch_resolve(
        &self,
        monikers: &[String],
    ) -> Result<HashMap<String, ResolvedSource>, ClientError> {
        let mut out = HashMap::new();
        let mut to_fetch: Vec<String> = Vec::new();

        for m in monikers {
            let uri = Moniker::new(m).uri();
            match self.cache.get(&uri) {
                Some(cached) => {
                    out.insert(cached.path.clone(), cached);
                }
                None => to_fetch.push(m.clone()),
            }
        }

        if !to_fetch.is_empty() {
            let fetched = self.resolver.batch_resolve(&to_fetch).await?;
            for (path, resolved) in fetched {
                let uri = Moniker::new(&path).uri();
                self.cache.insert(uri, resolved.clone());
                out.insert(path, resolved);
            }
        }

        self.warn_if_deprecated(out.values());
        Ok(out)
    }

    fn warn_if_deprecated<'a>(&self, sources: impl IntoIterator<Item = &'a ResolvedSource>) {
        if !self.config.deprecation_enabled || !self.config.warn_on_deprecated {
            return;
        }
        for source in sources {
            if !source.is_deprecated() {
                continue;
            }
            let message = source.deprecation_message.as_deref().unwrap_or("");
            let successor = source.successor.as_deref();
            tracing::warn!(
                path = %source.path,
                message,
                successor,
                "resolved binding is deprecated"
            );
            if let Some(callback) = &self.deprecation_callback {
                callback(&source.path, message, successor);
            }
        }
    }

    // -- Data operations ------------------------------------------------------------------------

    /// Resolve, dispatch to the adapter's `fetch`, and report access telemetry on every exit
    /// path.
    pub async fn read(&self, moniker: &str, options: ReadOptions) -> Result<Value, ClientError> {
        let started = Instant::now();
        let resolved = match self.resolve(moniker).await {
            Ok(r) => r,
            Err(e) => {
                self.emit_telemetry(moniker, None, started.elapsed(), Err(&e)).await;
                return Err(e);
            }
        };
        self.dispatch_fetch(moniker, &resolved, &options.extra, started).await
    }

    /// Resolve each moniker via `batch_resolve`, then dispatch `fetch` per binding. Never
    /// throws at the aggregate level: each key carries either its data or its own failure.
    pub async fn batch_read(
        &self,
        monikers: &[String],
        extra: HashMap<String, Value>,
    ) -> HashMap<String, Result<Value, ClientError>> {
        let resolved_map = match self.batch_resolve(monikers).await {
            Ok(m) => m,
            Err(e) => {
                let message = e.to_string();
                return monikers
                    .iter()
                    .map(|m| {
                        (
                            Moniker::new(m).path().to_string(),
                            Err(ClientError::connection_refused(message.clone())),
                        )
                    })
                    .collect();
            }
        };

        let mut out = HashMap::new();
        for moniker in monikers {
            let started = Instant::now();
            let path = Moniker::new(moniker).path().to_string();
            let result = match resolved_map.get(&path) {
                Some(resolved) => self.dispatch_fetch(moniker, resolved, &extra, started).await,
                None => Err(ClientError::NotFound { path: path.clone() }),
            };
            out.insert(path, result);
        }
        out
    }

    async fn dispatch_fetch(
        &self,
        moniker: &str,
        resolved: &ResolvedSource,
        extra: &HashMap<String, Value>,
        started: Instant,
    ) -> Result<Value, ClientError> {
        let Some(adapter) = self.adapters.get(resolved.source_type) else {
            let err = ClientError::configuration(format!(
                "no adapter registered for source type {:?}",
                resolved.source_type
            ));
            self.emit_telemetry(moniker, Some(resolved), started.elapsed(), Err(&err)).await;
            return Err(err);
        };

        let result = adapter
            .fetch(resolved, extra, &FetchOptions::default())
            .await
            .map(FetchOutput::into_data)
            .map_err(|e| wrap_fetch_error(&resolved.path, e));
        self.emit_telemetry(moniker, Some(resolved), started.elapsed(), result.as_ref().map_err(|e| e))
            .await;
        result
    }

    async fn emit_telemetry(
        &self,
        moniker: &str,
        resolved: Option<&ResolvedSource>,
        elapsed: Duration,
        outcome: Result<&Value, &ClientError>,
    ) {
        if !self.config.report_telemetry {
            return;
        }
        let (tag, row_count, error_message) = match outcome {
            Ok(data) => ("success", data.as_array().map(|a| a.len() as u64), None),
            Err(e) if e.is_not_found() => ("not_found", None, Some(e.to_string())),
            Err(e) => ("error", None, Some(e.to_string())),
        };
        let source_type = resolved.and_then(|r| {
            serde_json::to_value(r.source_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
        });
        let record = AccessTelemetry {
            moniker: Moniker::new(moniker).uri(),
            outcome: tag.to_string(),
            latency_ms: elapsed.as_secs_f64() * 1000.0,
            source_type,
            row_count,
            error_message,
            deprecated: resolved.map(ResolvedSource::is_deprecated).unwrap_or(false),
            successor: resolved.and_then(|r| r.successor.clone()),
        };
        self.resolver.report_telemetry(&record).await;
    }

    // -- Thin resolver passthroughs ---------------------------------------------------------

    pub async fn fetch(
        &self,
        moniker: &str,
        limit: Option<u64>,
        extra: &HashMap<String, String>,
    ) -> Result<FetchResult, ClientError> {
        self.resolver.fetch_server_side(moniker, limit, extra).await
    }

    pub async fn describe(&self, moniker: &str) -> Result<Value, ClientError> {
        self.resolver.describe(moniker).await
    }

    pub async fn metadata(&self, moniker: &str) -> Result<MetadataResult, ClientError> {
        self.resolver.metadata(moniker).await
    }

    pub async fn sample(&self, moniker: &str, limit: u64) -> Result<SampleResult, ClientError> {
        self.resolver.sample(moniker, limit).await
    }

    pub async fn lineage(&self, moniker: &str) -> Result<Value, ClientError> {
        self.resolver.lineage(moniker).await
    }

    pub async fn list_children(&self, moniker: Option<&str>) -> Result<Vec<String>, ClientError> {
        self.resolver.list_children(moniker).await
    }

    pub async fn tree(&self, moniker: Option<&str>, depth: Option<u32>) -> Result<TreeNode, ClientError> {
        self.resolver.tree(moniker, depth).await
    }

    pub async fn search(
        &self,
        q: &str,
        status: Option<&str>,
        limit: Option<u64>,
    ) -> Result<SearchResult, ClientError> {
        self.resolver.search(q, status, limit).await
    }

    pub async fn catalog_stats(&self) -> Result<CatalogStats, ClientError> {
        self.resolver.catalog_stats().await
    }

    /// Client-derived view over [`MetadataResult::schema`]; not a distinct resolver endpoint.
    pub async fn schema(&self, moniker: &str) -> Result<SchemaInfo, ClientError> {
        let metadata = self.metadata(moniker).await?;
        Ok(SchemaInfo::from_metadata(&metadata))
    }
}

/// Wraps any adapter-`fetch` failure other than `NotFound` as a [`ClientError::FetchError`]
/// carrying the resolved path, per §7: "any failure during adapter fetch after a successful
/// resolution; wraps the underlying error as cause." `NotFound` passes through unwrapped so it
/// keeps bypassing circuit-breaker accounting and 404 semantics upstream.
fn wrap_fetch_error(path: &str, e: ClientError) -> ClientError {
    if e.is_not_found() {
        e
    } else {
        ClientError::FetchError { path: path.to_string(), source: Box::new(e) }
    }
}
