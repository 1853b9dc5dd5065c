//! Per-source-type `fetch`/`list_children`/`health_check` implementations.

mod generic_sql;
mod http;
mod relational;
mod spreadsheet;
mod warehouse;

pub use generic_sql::GenericSqlAdapter;
pub use http::HttpAdapter;
pub use relational::RelationalAdapter;
pub use spreadsheet::SpreadsheetAdapter;
pub use warehouse::{WarehouseAdapter, WarehouseDriver};

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::client_error::ClientError;
use crate::config::Config;
use crate::models::{HealthStatus, ResolvedSource, SourceType};

pub use crate::models::AdapterResult;

/// Parameter keys the resolver reserves for its own use; adapters MUST NOT treat these as
/// candidate data filters.
pub const RESERVED_PARAM_KEYS: &[&str] = &[
    "moniker_version",
    "moniker_revision",
    "as_of",
    "limit",
    "offset",
    "order_by",
    "method",
    "response_path",
    "query_params",
    "moniker_params",
];

/// True if `key` is one of the reserved parameter keys and must not be used as a data filter.
pub fn is_reserved_param(key: &str) -> bool {
    RESERVED_PARAM_KEYS.contains(&key)
}

/// Extra per-call options recognized by every adapter's `fetch`.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// When true, `fetch` returns the full [`AdapterResult`] including execution metadata;
    /// otherwise only the raw data payload.
    pub return_result: bool,
}

/// Either shape `fetch` can return, depending on [`FetchOptions::return_result`].
#[derive(Debug, Clone)]
pub enum FetchOutput {
    Data(Value),
    Result(AdapterResult),
}

impl FetchOutput {
    pub fn into_data(self) -> Value {
        match self {
            FetchOutput::Data(v) => v,
            FetchOutput::Result(r) => r.data,
        }
    }
}

/// A capability-bearing component that executes a [`ResolvedSource`] binding against a
/// specific source type.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The source-type tag this adapter serves.
    fn source_type(&self) -> SourceType;

    /// Fetch rows for `binding`. `extra` carries free-form per-request parameters plus the
    /// `return_result` option.
    async fn fetch(
        &self,
        binding: &ResolvedSource,
        extra: &HashMap<String, Value>,
        options: &FetchOptions,
    ) -> Result<FetchOutput, ClientError>;

    /// List immediate children of `binding`. MUST NOT raise — swallow failures to an empty
    /// list.
    async fn list_children(&self, binding: &ResolvedSource) -> Vec<String>;

    /// Probe reachability of `binding`'s source. MUST NOT raise — swallow failures to
    /// `healthy: false`.
    async fn health_check(&self, binding: &ResolvedSource) -> HealthStatus;
}

/// Flat registry of adapters keyed by source-type tag.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<SourceType, std::sync::Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default registry: one adapter instance per source-type tag, sharing `config`.
    pub fn with_defaults(config: std::sync::Arc<Config>) -> Self {
        let mut registry = Self::new();
        registry.register(SourceType::Http, std::sync::Arc::new(HttpAdapter::new(config.clone())));
        registry.register(
            SourceType::Spreadsheet,
            std::sync::Arc::new(SpreadsheetAdapter::new(config.clone())),
        );
        registry.register(SourceType::Static, std::sync::Arc::new(SpreadsheetAdapter::new(config.clone())));
        registry.register(
            SourceType::GenericSql,
            std::sync::Arc::new(GenericSqlAdapter::new(config.clone())),
        );
        registry.register(SourceType::Warehouse, std::sync::Arc::new(WarehouseAdapter::new(config.clone())));
        registry.register(
            SourceType::RelationalWithTemporal,
            std::sync::Arc::new(RelationalAdapter::new(config)),
        );
        registry
    }

    pub fn register(&mut self, source_type: SourceType, adapter: std::sync::Arc<dyn Adapter>) {
        self.adapters.insert(source_type, adapter);
    }

    pub fn get(&self, source_type: SourceType) -> Option<std::sync::Arc<dyn Adapter>> {
        self.adapters.get(&source_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_keys_are_recognized() {
        assert!(is_reserved_param("as_of"));
        assert!(is_reserved_param("limit"));
        assert!(!is_reserved_param("dept_id"));
    }
}
