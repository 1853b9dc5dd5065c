#![forbid(unsafe_code)]

//! Client runtime for a moniker-based data federation service.
//!
//! A *moniker* is a logical, location-independent path naming a dataset. This crate resolves
//! monikers against a central resolution service into concrete source bindings
//! ([`models::ResolvedSource`]), then executes the binding either server-side (via the resolver's
//! own `/fetch` endpoint) or client-side through a pluggable [`adapters::Adapter`] that talks
//! directly to the underlying source (a relational database, a cloud warehouse, a REST API, ...).
//!
//! ## Quick start
//!
//! ```no_run
//! use wayfare::{Config, WayfareClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wayfare::ClientError> {
//!     let config = Config::load(None)?;
//!     let client = WayfareClient::new(config)?;
//!
//!     let data = client.read("sales/orders", Default::default()).await?;
//!     println!("{} rows", data.as_array().map(|rows| rows.len()).unwrap_or(0));
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! - [`moniker`] — the `Moniker` value type and its fluent navigation.
//! - [`resolver`] — the low-level HTTP client for the resolution service, wrapped in retry and
//!   circuit-breaker policies.
//! - [`cache`] — the process-local, TTL-based resolution cache.
//! - [`adapters`] — per-source-type fetch/list/health-check implementations.
//! - [`client`] — [`WayfareClient`], the orchestrating top-level surface.
//! - [`config`] — layered configuration loading.
//! - [`auth`] — outbound authentication header assembly.
//! - [`telemetry`] — the pluggable sink architecture for internal resilience events (retry
//!   attempts, breaker transitions), distinct from the access-telemetry POSTed to the resolver.
//!
//! The retry, backoff, jitter, circuit-breaker, bulkhead, and timeout primitives below this
//! surface are generic resilience building blocks; [`resolver::ResolverClient`] and the adapters
//! in [`adapters`] compose them for this domain.

mod backoff;
mod bulkhead;
mod circuit_breaker;
mod clock;
mod error;
mod jitter;
mod retry;
mod sleeper;
mod timeout;

pub mod telemetry;

pub mod adapters;
pub mod auth;
pub mod cache;
pub mod client;
pub mod client_error;
pub mod config;
pub mod models;
pub mod moniker;
pub mod resolver;

// Re-exports of the generic resilience primitives, carried over for direct use by adapters and
// by anyone composing their own resilience stack against this crate's telemetry sinks.
pub use backoff::Backoff;
pub use bulkhead::BulkheadPolicy;
pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState};
pub use clock::{Clock, MonotonicClock};
pub use error::ResilienceError;
pub use jitter::Jitter;
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT};

pub use client::WayfareClient;
pub use client_error::ClientError;
pub use config::Config;
pub use moniker::Moniker;

pub mod prelude;
