//! Bootstrap - discover and call protocols on a running control endpoint.
//!
//! This example demonstrates:
//! - Listing supported protocols through the control protocol
//! - Fetching their bundles with `get_protocols` (loaded into the registry)
//! - Printing a request template and invoking a command on the first node
//!
//! # Running
//!
//! ```text
//! DYNWIRE_ENDPOINT=http://127.0.0.1:33777 cargo run --example bootstrap
//! ```

use dynwire_client::codec::decode_base64;
use dynwire_client::Dispatcher;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let endpoint = std::env::var("DYNWIRE_ENDPOINT")
        .unwrap_or_else(|_| dynwire_client::transport::DEFAULT_ENDPOINT.to_string());
    let dispatcher = Dispatcher::builder().endpoint(endpoint).build()?;

    let supported = dispatcher
        .invoke("rpc", "list_supported_protocols", None)
        .await?;
    dispatcher
        .invoke(
            "rpc",
            "get_protocols",
            Some(json!({ "protocol_ids": supported["protocol_ids"] })),
        )
        .await?;

    let registry = dispatcher.registry();
    for id in registry.protocol_ids() {
        let protocol = registry.get(&id)?;
        println!("{id}: {} commands", protocol.commands().len());
    }

    dispatcher.invoke("rpc", "list_nodes", None).await?;
    let Some(node) = registry.known_nodes().into_iter().next() else {
        println!("no running nodes");
        return Ok(());
    };
    println!("first node: {}", String::from_utf8_lossy(&node));

    // Ask the node which peers it knows about.
    let template = registry.request_template("rpc", "list_known_peers")?;
    println!("list_known_peers request: {}", template.unwrap_or_default());

    let peers = dispatcher
        .invoke(
            "rpc",
            "list_known_peers",
            Some(json!({ "node_id": dynwire_client::codec::encode_base64(&node) })),
        )
        .await?;
    let count = peers["peer_ids"].as_array().map_or(0, Vec::len);
    println!("known peers: {count}");

    if let Some(id) = supported["protocol_ids"][0].as_str().and_then(decode_base64) {
        println!("first protocol id: {}", String::from_utf8_lossy(&id));
    }
    Ok(())
}
