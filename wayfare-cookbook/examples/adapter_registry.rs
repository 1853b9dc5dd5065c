//! Registering a custom `Adapter` for an in-process, no-network source, and installing it in
//! place of a default one via `AdapterRegistry`/`WayfareClient::with_adapter_registry`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wayfare::adapters::{Adapter, AdapterRegistry, FetchOptions, FetchOutput};
use wayfare::client_error::ClientError;
use wayfare::models::{HealthStatus, ResolvedSource, SourceType};
use wayfare::{Config, WayfareClient};

/// An adapter that serves a fixed in-memory catalog instead of talking to a real static/
/// spreadsheet source. Registered against `SourceType::Static` below.
struct FixtureAdapter {
    rows: Value,
}

#[async_trait]
impl Adapter for FixtureAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Static
    }

    async fn fetch(
        &self,
        _binding: &ResolvedSource,
        _extra: &HashMap<String, Value>,
        _options: &FetchOptions,
    ) -> Result<FetchOutput, ClientError> {
        Ok(FetchOutput::Data(self.rows.clone()))
    }

    async fn list_children(&self, _binding: &ResolvedSource) -> Vec<String> {
        Vec::new()
    }

    async fn health_check(&self, _binding: &ResolvedSource) -> HealthStatus {
        HealthStatus::healthy(0.0, HashMap::new())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Custom Adapter Registration ===\n");

    // The resolver is still a real (mocked) HTTP surface — only the source-side execution is
    // swapped out.
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resolve/fixtures/countries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "moniker": "moniker://fixtures/countries",
            "path": "fixtures/countries",
            "source_type": "static",
            "connection": {},
            "binding_path": "fixtures/countries",
        })))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.service_url = server.uri();
    config.report_telemetry = false;
    let config = Arc::new(config);

    let mut adapters = AdapterRegistry::with_defaults(config.clone());
    adapters.register(
        SourceType::Static,
        Arc::new(FixtureAdapter {
            rows: json!([{"code": "US", "name": "United States"}, {"code": "CA", "name": "Canada"}]),
        }),
    );

    let client = WayfareClient::new((*config).clone())?.with_adapter_registry(adapters);

    let data = client.read("fixtures/countries", Default::default()).await?;
    println!("served from FixtureAdapter: {data}");

    Ok(())
}
