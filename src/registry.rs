//! Process-lifetime cache of loaded protocols.
//!
//! A protocol id is either absent or holds a complete [`Protocol`]. Loads
//! parse and build everything before taking the write lock, so readers only
//! ever see the old record or the new one. A failed load leaves the id
//! absent and can simply be retried.
//!
//! The control protocol is installed on first use and before any bundle.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::catalog::CommandCatalog;
use crate::control::{control_catalog, CONTROL_PROTOCOL_ID, CONTROL_SCHEMA, CONTROL_SCHEMA_FILE};
use crate::error::{DynwireError, Result};
use crate::schema::{parse_schema, SchemaGraph, TemplateCache};

/// One loaded protocol.
#[derive(Debug)]
pub struct Protocol {
    id: String,
    schema: SchemaGraph,
    source: String,
    commands: CommandCatalog,
    templates: TemplateCache,
    files: Vec<(String, String)>,
}

impl Protocol {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema(&self) -> &SchemaGraph {
        &self.schema
    }

    /// Schema source text, kept for display.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn commands(&self) -> &CommandCatalog {
        &self.commands
    }

    /// Bundle files in the order they were received.
    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(n, c)| (n.as_str(), c.as_str()))
    }

    /// Content of the bundle file called `name`.
    pub fn file(&self, name: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.as_str())
    }

    /// Pretty-printed default template for `type_name`.
    pub fn template_for(&self, type_name: &str) -> Result<String> {
        self.templates.template_for(&self.schema, type_name)
    }

    /// Editable request body for `command`: `{"<RequestType>": <template>}`.
    ///
    /// `None` when the command takes no payload.
    pub fn request_template(&self, command: &str) -> Result<Option<String>> {
        let spec = self.commands.lookup(command)?;
        let Some(request_type) = spec.request_type() else {
            return Ok(None);
        };
        let template = self.templates.template_value(&self.schema, request_type)?;
        let mut wrapped = Map::with_capacity(1);
        wrapped.insert(request_type.to_string(), template);
        Ok(Some(serde_json::to_string_pretty(&Value::Object(wrapped))?))
    }
}

/// A protocol as delivered by `get_protocols`: an id and its named files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolBundle {
    pub id: String,
    pub files: Vec<(String, String)>,
}

impl ProtocolBundle {
    pub fn new(id: impl Into<String>, files: Vec<(String, String)>) -> Self {
        Self {
            id: id.into(),
            files,
        }
    }
}

fn is_manifest(name: &str) -> bool {
    name == "config" || name.ends_with(".json")
}

/// Registry of loaded protocols plus the last known node list.
#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    protocols: RwLock<HashMap<String, Arc<Protocol>>>,
    known_nodes: RwLock<Vec<Bytes>>,
}

impl ProtocolRegistry {
    /// Create an empty registry. The control protocol loads on first use.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Protocol>>> {
        self.protocols.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Protocol>>> {
        self.protocols.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the control protocol if it is not there yet.
    pub fn ensure_control_loaded(&self) -> Result<Arc<Protocol>> {
        if let Some(control) = self.read().get(CONTROL_PROTOCOL_ID) {
            return Ok(Arc::clone(control));
        }

        let mut protocols = self.write();
        if let Some(control) = protocols.get(CONTROL_PROTOCOL_ID) {
            return Ok(Arc::clone(control));
        }
        let control = Arc::new(Protocol {
            id: CONTROL_PROTOCOL_ID.to_string(),
            schema: parse_schema(CONTROL_SCHEMA)?,
            source: CONTROL_SCHEMA.to_string(),
            commands: control_catalog(),
            templates: TemplateCache::new(),
            files: vec![(CONTROL_SCHEMA_FILE.to_string(), CONTROL_SCHEMA.to_string())],
        });
        protocols.insert(CONTROL_PROTOCOL_ID.to_string(), Arc::clone(&control));
        debug!(protocol = CONTROL_PROTOCOL_ID, "control protocol loaded");
        Ok(control)
    }

    /// Load a protocol from its two bundle files (schema + manifest).
    ///
    /// Re-importing an id replaces the previous record.
    ///
    /// # Errors
    ///
    /// [`DynwireError::UnsupportedBundleShape`] unless there is exactly one
    /// manifest (`config` or `*.json`) and one schema file, or when the id is
    /// the built-in control protocol's. Parse errors of either file are
    /// returned as-is. The registry is unchanged on error.
    pub fn load_from_bundle(
        &self,
        protocol_id: &str,
        files: Vec<(String, String)>,
    ) -> Result<Arc<Protocol>> {
        self.ensure_control_loaded()?;

        let unsupported = |reason: String| DynwireError::UnsupportedBundleShape {
            protocol: protocol_id.to_string(),
            reason,
        };
        if protocol_id == CONTROL_PROTOCOL_ID {
            return Err(unsupported("the control protocol is built in".into()));
        }
        if files.len() != 2 {
            return Err(unsupported(format!("expected 2 files, got {}", files.len())));
        }
        let (manifest, schema) = match (is_manifest(&files[0].0), is_manifest(&files[1].0)) {
            (true, false) => (&files[0].1, &files[1].1),
            (false, true) => (&files[1].1, &files[0].1),
            (true, true) => return Err(unsupported("both files look like manifests".into())),
            (false, false) => return Err(unsupported("no manifest file".into())),
        };

        let graph = parse_schema(schema)?;
        let commands = CommandCatalog::from_manifest(protocol_id, manifest)?;
        let protocol = Arc::new(Protocol {
            id: protocol_id.to_string(),
            schema: graph,
            source: schema.clone(),
            commands,
            templates: TemplateCache::new(),
            files,
        });

        let replaced = self
            .write()
            .insert(protocol_id.to_string(), Arc::clone(&protocol))
            .is_some();
        debug!(
            protocol = protocol_id,
            types = protocol.schema.len(),
            commands = protocol.commands.len(),
            replaced,
            "protocol loaded"
        );
        Ok(protocol)
    }

    /// Load several bundles, skipping the ones that fail.
    ///
    /// Returns the ids that were installed, in input order.
    pub fn load_bundles(&self, bundles: impl IntoIterator<Item = ProtocolBundle>) -> Vec<String> {
        let mut loaded = Vec::new();
        for bundle in bundles {
            match self.load_from_bundle(&bundle.id, bundle.files) {
                Ok(_) => loaded.push(bundle.id),
                Err(e) => warn!(protocol = %bundle.id, error = %e, "skipping protocol bundle"),
            }
        }
        loaded
    }

    /// Loaded protocol by id.
    pub fn get(&self, protocol_id: &str) -> Result<Arc<Protocol>> {
        self.read()
            .get(protocol_id)
            .cloned()
            .ok_or_else(|| DynwireError::ProtocolNotLoaded(protocol_id.to_string()))
    }

    pub fn contains(&self, protocol_id: &str) -> bool {
        self.read().contains_key(protocol_id)
    }

    /// Loaded protocol ids, sorted.
    pub fn protocol_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Node ids from the latest `list_nodes` response.
    pub fn known_nodes(&self) -> Vec<Bytes> {
        self.known_nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_known_nodes(&self, nodes: Vec<Bytes>) {
        debug!(count = nodes.len(), "known nodes updated");
        *self.known_nodes.write().unwrap_or_else(PoisonError::into_inner) = nodes;
    }

    /// Template for `type_name` in `protocol_id`.
    pub fn template_for(&self, protocol_id: &str, type_name: &str) -> Result<String> {
        self.get(protocol_id)?.template_for(type_name)
    }

    /// Request body template for `command` in `protocol_id`.
    pub fn request_template(&self, protocol_id: &str, command: &str) -> Result<Option<String>> {
        self.get(protocol_id)?.request_template(command)
    }
}
