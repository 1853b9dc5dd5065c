//! Convenient re-exports for common wayfare types.
pub use crate::{
    adapters::{Adapter, AdapterRegistry, AdapterResult},
    auth::auth_headers,
    cache::ResolutionCache,
    client::{ReadOptions, WayfareClient},
    client_error::ClientError,
    config::Config,
    models::{
        CatalogStats, FetchResult, MetadataResult, ResolvedSource, SampleResult, SchemaInfo,
        SearchResult, TreeNode,
    },
    moniker::Moniker,
    telemetry::{
        BulkheadEvent, CircuitBreakerEvent, FallbackSink, LogSink, MemorySink, MulticastSink,
        NullSink, PolicyEvent, RequestOutcome, RetryEvent, StreamingSink, TelemetrySink,
        TimeoutEvent,
    },
    Backoff, BulkheadPolicy, CircuitBreakerConfig, CircuitBreakerPolicy, Jitter, ResilienceError,
    RetryPolicy,
};
