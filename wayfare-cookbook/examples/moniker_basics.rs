//! Moniker navigation and resolution against a `WayfareClient`.
//!
//! A moniker is a logical, location-independent path naming a dataset — `child`/`parent`
//! navigate it purely as a string, with no network call. Reading through it dispatches to
//! whichever adapter the resolver's binding names; here that's the HTTP adapter, with the
//! resolver and the underlying source both played by the same local mock server.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wayfare::{Config, Moniker, WayfareClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Moniker Basics ===\n");

    // Pure navigation: no client bound, no I/O.
    let sales = Moniker::new("moniker://sales/orders/");
    println!("path:   {}", sales.path());
    println!("uri:    {}", sales.uri());

    let child = sales.child("2024/q1");
    println!("child:  {}", child.path());
    println!("parent: {}", child.parent().unwrap().path());
    assert_eq!(child.parent().unwrap(), sales);

    // Resolution and reads go through a bound client. A mock server plays both the resolver
    // (answers `/resolve/{path}`) and the source itself (answers the adapter's query).
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resolve/sales/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "moniker": "moniker://sales/orders",
            "path": "sales/orders",
            "source_type": "http",
            "connection": {"base_url": server.uri()},
            "query": "/v1/orders",
            "binding_path": "sales/orders",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "total": 42.50},
            {"id": 2, "total": 17.00},
        ])))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.service_url = server.uri();
    config.report_telemetry = false;
    let client = Arc::new(WayfareClient::new(config)?);

    let bound = Moniker::with_client("sales/orders", client);
    let resolved = bound.resolve().await?;
    println!("\nresolved source_type: {:?}", resolved.source_type);

    let rows = bound.read(Default::default()).await?;
    println!("rows: {rows}");

    Ok(())
}
