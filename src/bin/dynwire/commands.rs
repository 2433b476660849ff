//! CLI commands

use anyhow::{anyhow, bail, Context, Result};
use clap::Subcommand;
use dynwire_client::codec::{decode_base64, encode_base64};
use dynwire_client::control::{CONTROL_PROTOCOL_ID, GET_PROTOCOLS, LIST_NODES};
use dynwire_client::Dispatcher;
use serde_json::{json, Value};
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// List protocols known to the control endpoint
    Protocols {
        /// Only list protocols with running nodes
        #[arg(long)]
        running: bool,
    },

    /// List running nodes
    Nodes,

    /// Fetch protocol bundles and list their commands
    Fetch {
        /// Protocol ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Print a file of a protocol bundle
    Schema {
        protocol: String,

        /// Bundle file name (defaults to the schema source)
        #[arg(long)]
        file: Option<String>,
    },

    /// Print the request template of a command
    Template { protocol: String, command: String },

    /// Invoke a command and print the decoded response
    Call {
        protocol: String,
        command: String,

        /// Target node id
        #[arg(long)]
        node: Option<String>,

        /// JSON request body (a template with its type wrapper is accepted too)
        #[arg(long)]
        payload: Option<String>,
    },
}

impl Commands {
    pub async fn execute(self, dispatcher: &Dispatcher) -> Result<()> {
        match self {
            Commands::Protocols { running } => list_protocols(dispatcher, running).await,
            Commands::Nodes => list_nodes(dispatcher).await,
            Commands::Fetch { ids } => fetch(dispatcher, &ids).await,
            Commands::Schema { protocol, file } => {
                show_file(dispatcher, &protocol, file.as_deref()).await
            }
            Commands::Template { protocol, command } => {
                show_template(dispatcher, &protocol, &command).await
            }
            Commands::Call {
                protocol,
                command,
                node,
                payload,
            } => call(dispatcher, &protocol, &command, node, payload).await,
        }
    }
}

/// Render a base64 identifier as text.
fn id_text(value: &Value) -> String {
    value
        .as_str()
        .and_then(decode_base64)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_else(|| value.to_string())
}

async fn list_protocols(dispatcher: &Dispatcher, running: bool) -> Result<()> {
    let command = if running {
        "list_running_protocols"
    } else {
        "list_supported_protocols"
    };
    let reply = dispatcher.invoke(CONTROL_PROTOCOL_ID, command, None).await?;
    for id in reply["protocol_ids"].as_array().into_iter().flatten() {
        println!("{}", id_text(id));
    }
    Ok(())
}

async fn list_nodes(dispatcher: &Dispatcher) -> Result<()> {
    dispatcher.invoke(CONTROL_PROTOCOL_ID, LIST_NODES, None).await?;
    for node in dispatcher.registry().known_nodes() {
        println!("{}", String::from_utf8_lossy(&node));
    }
    Ok(())
}

/// Fetch bundles for `ids` through `get_protocols`.
async fn load(dispatcher: &Dispatcher, ids: &[String]) -> Result<()> {
    dispatcher.registry().ensure_control_loaded()?;
    let encoded: Vec<_> = ids
        .iter()
        .filter(|id| id.as_str() != CONTROL_PROTOCOL_ID)
        .map(|id| encode_base64(id.as_bytes()))
        .collect();
    if encoded.is_empty() {
        return Ok(());
    }
    dispatcher
        .invoke(
            CONTROL_PROTOCOL_ID,
            GET_PROTOCOLS,
            Some(json!({ "protocol_ids": encoded })),
        )
        .await
        .context("get_protocols failed")?;

    let registry = dispatcher.registry();
    for id in ids {
        if !registry.contains(id) {
            bail!("protocol '{id}' was not loaded (see warnings above)");
        }
    }
    Ok(())
}

/// Fetch `protocol` unless it is already loaded.
async fn ensure_loaded(dispatcher: &Dispatcher, protocol: &str) -> Result<()> {
    if dispatcher.registry().contains(protocol) {
        return Ok(());
    }
    load(dispatcher, &[protocol.to_string()]).await
}

async fn fetch(dispatcher: &Dispatcher, ids: &[String]) -> Result<()> {
    load(dispatcher, ids).await?;
    for id in ids {
        let protocol = dispatcher.registry().get(id)?;
        println!("{id}");
        for spec in protocol.commands().iter() {
            println!(
                "  {:<24} {} -> {}",
                spec.name,
                spec.request_type().unwrap_or("-"),
                spec.response_type().unwrap_or("-"),
            );
        }
    }
    info!(count = ids.len(), "protocols fetched");
    Ok(())
}

async fn show_file(dispatcher: &Dispatcher, protocol: &str, file: Option<&str>) -> Result<()> {
    ensure_loaded(dispatcher, protocol).await?;
    let protocol = dispatcher.registry().get(protocol)?;
    let text = match file {
        None => protocol.source(),
        Some(name) => protocol.file(name).ok_or_else(|| {
            let names: Vec<_> = protocol.files().map(|(n, _)| n).collect();
            anyhow!("no file '{name}' in {} (files: {})", protocol.id(), names.join(", "))
        })?,
    };
    println!("{text}");
    Ok(())
}

async fn show_template(dispatcher: &Dispatcher, protocol: &str, command: &str) -> Result<()> {
    ensure_loaded(dispatcher, protocol).await?;
    match dispatcher.registry().request_template(protocol, command)? {
        Some(template) => println!("{template}"),
        None => println!("{command} takes no payload"),
    }
    Ok(())
}

async fn call(
    dispatcher: &Dispatcher,
    protocol: &str,
    command: &str,
    node: Option<String>,
    payload: Option<String>,
) -> Result<()> {
    ensure_loaded(dispatcher, protocol).await?;
    let request_type = dispatcher
        .registry()
        .get(protocol)?
        .commands()
        .lookup(command)?
        .request
        .clone();

    let payload = match payload {
        Some(text) => {
            let value: Value = serde_json::from_str(&text).context("--payload is not valid JSON")?;
            Some(unwrap_template(value, request_type.as_deref()))
        }
        None => None,
    };
    let node = node.unwrap_or_default();

    let reply = dispatcher
        .invoke_on(node.as_bytes(), protocol, command, payload)
        .await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

/// Accept `{"<RequestType>": {...}}` as printed by `template`.
fn unwrap_template(value: Value, request_type: Option<&str>) -> Value {
    match (value, request_type) {
        (Value::Object(mut map), Some(ty)) if map.len() == 1 && map.contains_key(ty) => {
            map.remove(ty).unwrap_or(Value::Null)
        }
        (value, _) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use dynwire_client::transport::{BoxFuture, Transport, WireRequest};
    use dynwire_client::DynwireError;

    /// Fails every exchange.
    struct Offline;

    impl Transport for Offline {
        fn exchange(&self, _request: WireRequest) -> BoxFuture<'static, dynwire_client::Result<Bytes>> {
            Box::pin(async { Err(DynwireError::Transport("offline".into())) })
        }
    }

    #[tokio::test]
    async fn test_control_protocol_needs_no_fetch() {
        let dispatcher = Dispatcher::new(Offline);
        fetch(&dispatcher, &[CONTROL_PROTOCOL_ID.to_string()])
            .await
            .unwrap();
        assert!(dispatcher.registry().contains(CONTROL_PROTOCOL_ID));

        show_template(&dispatcher, CONTROL_PROTOCOL_ID, "get_protocols")
            .await
            .unwrap();
    }

    #[test]
    fn test_unwrap_template() {
        let wrapped = json!({ "GetMsgRequest": { "id": 1 } });
        assert_eq!(unwrap_template(wrapped, Some("GetMsgRequest")), json!({ "id": 1 }));

        let plain = json!({ "id": 1 });
        assert_eq!(unwrap_template(plain.clone(), Some("GetMsgRequest")), plain);
        assert_eq!(unwrap_template(plain.clone(), None), plain);
    }

    #[test]
    fn test_id_text() {
        assert_eq!(id_text(&json!("Y2hhdA==")), "chat");
        assert_eq!(id_text(&json!(5)), "5");
    }
}
