//! Default-value message templates.
//!
//! A template is an example JSON body for a message type: every field is
//! present, strings and bytes are `""`, numbers and enums are `0`, bools
//! are `false`, nested messages recurse, and repeated fields hold exactly
//! one such element. Templates are memoized per type in a [`TemplateCache`]
//! owned by the protocol they belong to.
//!
//! Recursive schemas are cut at the first repeat of a type on the current
//! path: the repeated occurrence becomes `{}` (or `[]` for a repeated
//! field). Templates produced under such a cut are not stored for the inner
//! types, so asking for an inner type directly still gives its own full
//! template.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};

use super::graph::{ResolvedType, ScalarKind, SchemaGraph};
use super::parser::MAX_NESTING_DEPTH;
use crate::error::{DynwireError, Result};

/// Per-protocol memo of rendered templates.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl TemplateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Template for `type_name`, pretty-printed.
    pub fn template_for(&self, graph: &SchemaGraph, type_name: &str) -> Result<String> {
        let value = self.template_value(graph, type_name)?;
        serde_json::to_string_pretty(&value).map_err(DynwireError::from)
    }

    /// Template for `type_name` as a JSON value.
    pub fn template_value(&self, graph: &SchemaGraph, type_name: &str) -> Result<Value> {
        let mut path = Vec::new();
        self.build(graph, type_name, &mut path).map(|(value, _)| value)
    }

    /// Whether a complete template for `type_name` is cached.
    pub fn contains(&self, type_name: &str) -> bool {
        self.lock().contains_key(type_name)
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the template and whether it was built without a cycle cut.
    fn build(
        &self,
        graph: &SchemaGraph,
        type_name: &str,
        path: &mut Vec<String>,
    ) -> Result<(Value, bool)> {
        let msg = graph
            .message(type_name)
            .ok_or_else(|| DynwireError::UnknownType(type_name.to_string()))?;
        if let Some(cached) = self.lock().get(&msg.name) {
            return Ok((cached.clone(), true));
        }
        if path.len() >= MAX_NESTING_DEPTH {
            return Err(DynwireError::NestingTooDeep {
                type_name: msg.name.clone(),
                limit: MAX_NESTING_DEPTH,
            });
        }

        path.push(msg.name.clone());
        let mut object = Map::with_capacity(msg.fields.len());
        let mut complete = true;

        for field in &msg.fields {
            let element = match graph.resolve(field)? {
                ResolvedType::Scalar(kind) => Some(scalar_default(kind)),
                ResolvedType::Enum(_) => Some(Value::from(0)),
                ResolvedType::Message(inner) if path.contains(&inner.name) => None,
                ResolvedType::Message(inner) => {
                    let (value, inner_complete) = self.build(graph, &inner.name, path)?;
                    complete &= inner_complete;
                    Some(value)
                }
            };
            if element.is_none() {
                complete = false;
            }

            let value = match (field.repeated, element) {
                (true, Some(v)) => Value::Array(vec![v]),
                (true, None) => Value::Array(Vec::new()),
                (false, Some(v)) => v,
                (false, None) => Value::Object(Map::new()),
            };
            object.insert(field.name.clone(), value);
        }
        path.pop();

        let value = Value::Object(object);
        if complete {
            self.lock().insert(msg.name.clone(), value.clone());
        }
        Ok((value, complete))
    }
}

fn scalar_default(kind: ScalarKind) -> Value {
    match kind {
        ScalarKind::String | ScalarKind::Bytes => Value::String(String::new()),
        ScalarKind::Bool => Value::Bool(false),
        _ => Value::from(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_schema;
    use serde_json::json;

    const SCHEMA: &str = r#"
        message NodeID { bytes node_id = 1; }
        message Peer { uint32 id = 1; bytes address = 2; }
        message PeersList {
          bytes node_id = 1;
          repeated Peer peers = 2;
        }
        message Mixed {
          repeated string names = 1;
          repeated uint64 counts = 2;
          bool flag = 3;
          Peer first = 4;
          Peer second = 5;
          double ratio = 6;
        }
        message Empty {}
    "#;

    #[test]
    fn test_node_id_template() {
        let graph = parse_schema(SCHEMA).unwrap();
        let cache = TemplateCache::new();
        let value = cache.template_value(&graph, "NodeID").unwrap();
        assert_eq!(value, json!({ "node_id": "" }));
    }

    #[test]
    fn test_repeated_message_field() {
        let graph = parse_schema(SCHEMA).unwrap();
        let cache = TemplateCache::new();
        let value = cache.template_value(&graph, "PeersList").unwrap();
        assert_eq!(
            value,
            json!({ "node_id": "", "peers": [{ "id": 0, "address": "" }] })
        );
    }

    #[test]
    fn test_mixed_fields_in_declaration_order() {
        let graph = parse_schema(SCHEMA).unwrap();
        let cache = TemplateCache::new();
        let rendered = cache.template_for(&graph, "Mixed").unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();

        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["names", "counts", "flag", "first", "second", "ratio"]);
        assert_eq!(value["names"], json!([""]));
        assert_eq!(value["counts"], json!([0]));
        assert_eq!(value["flag"], json!(false));
        assert_eq!(value["first"], value["second"]);
    }

    #[test]
    fn test_memoized_with_nested_types() {
        let graph = parse_schema(SCHEMA).unwrap();
        let cache = TemplateCache::new();
        assert!(cache.is_empty());

        let first = cache.template_for(&graph, "PeersList").unwrap();
        assert!(cache.contains("PeersList"));
        assert!(cache.contains("Peer"));
        assert_eq!(cache.len(), 2);

        let second = cache.template_for(&graph, "PeersList").unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_consulted_before_graph() {
        let graph = parse_schema(SCHEMA).unwrap();
        let cache = TemplateCache::new();
        cache.template_value(&graph, "NodeID").unwrap();

        // Overwrite the memo: a second call must return the cached value.
        cache
            .lock()
            .insert("NodeID".to_string(), json!({ "marker": true }));
        assert_eq!(
            cache.template_value(&graph, "NodeID").unwrap(),
            json!({ "marker": true })
        );
    }

    #[test]
    fn test_empty_message() {
        let graph = parse_schema(SCHEMA).unwrap();
        let cache = TemplateCache::new();
        assert_eq!(cache.template_value(&graph, "Empty").unwrap(), json!({}));
    }

    #[test]
    fn test_enum_field_is_numeric() {
        let graph = parse_schema("enum Mode { A = 0; } message M { Mode mode = 1; repeated Mode all = 2; }").unwrap();
        let cache = TemplateCache::new();
        assert_eq!(
            cache.template_value(&graph, "M").unwrap(),
            json!({ "mode": 0, "all": [0] })
        );
    }

    #[test]
    fn test_cycle_truncated() {
        let graph = parse_schema(
            r#"
            message A { uint32 depth = 1; B b = 2; }
            message B { A a = 1; repeated A many = 2; }
            "#,
        )
        .unwrap();
        let cache = TemplateCache::new();

        let a = cache.template_value(&graph, "A").unwrap();
        assert_eq!(a, json!({ "depth": 0, "b": { "a": {}, "many": [] } }));
        assert!(!cache.contains("A"));
        assert!(!cache.contains("B"));

        let b = cache.template_value(&graph, "B").unwrap();
        assert_eq!(
            b,
            json!({
                "a": { "depth": 0, "b": {} },
                "many": [{ "depth": 0, "b": {} }]
            })
        );
    }

    #[test]
    fn test_self_reference() {
        let graph = parse_schema("message Tree { string label = 1; repeated Tree children = 2; }").unwrap();
        let cache = TemplateCache::new();
        assert_eq!(
            cache.template_value(&graph, "Tree").unwrap(),
            json!({ "label": "", "children": [] })
        );
    }

    #[test]
    fn test_deep_type_chain_limited() {
        let chain = |len: usize| {
            let mut source = String::new();
            for i in 0..len {
                source.push_str(&format!("message T{i} {{ T{} next = 1; }} ", i + 1));
            }
            source.push_str(&format!("message T{len} {{ uint32 leaf = 1; }}"));
            parse_schema(&source).unwrap()
        };

        let cache = TemplateCache::new();
        let graph = chain(MAX_NESTING_DEPTH - 1);
        assert!(cache.template_value(&graph, "T0").is_ok());

        let cache = TemplateCache::new();
        let graph = chain(5_000);
        match cache.template_value(&graph, "T0") {
            Err(DynwireError::NestingTooDeep { type_name, limit }) => {
                assert_eq!(limit, MAX_NESTING_DEPTH);
                assert_eq!(type_name, format!("T{MAX_NESTING_DEPTH}"));
            }
            other => panic!("expected NestingTooDeep, got {other:?}"),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unknown_and_unresolved_types() {
        let graph = parse_schema("message A { Missing m = 1; }").unwrap();
        let cache = TemplateCache::new();
        assert!(matches!(
            cache.template_value(&graph, "Nope"),
            Err(DynwireError::UnknownType(_))
        ));
        assert!(matches!(
            cache.template_value(&graph, "A"),
            Err(DynwireError::UnresolvedType { .. })
        ));
        assert!(cache.is_empty());
    }
}
