//! Schema module - runtime `.proto` parsing and message templates.
//!
//! - [`parse_schema`] turns schema source text into a [`SchemaGraph`]
//! - [`TemplateCache`] synthesizes default-populated example bodies
//!
//! # Example
//!
//! ```
//! use dynwire_client::schema::{parse_schema, TemplateCache};
//!
//! let graph = parse_schema("message NodeID { bytes node_id = 1; }").unwrap();
//! let templates = TemplateCache::new();
//! let body = templates.template_value(&graph, "NodeID").unwrap();
//! assert_eq!(body, serde_json::json!({ "node_id": "" }));
//! ```

mod graph;
mod parser;
mod template;

pub use graph::{EnumDef, FieldDef, FieldType, MessageDef, ResolvedType, ScalarKind, SchemaGraph};
pub use parser::{parse_schema, MAX_FIELD_NUMBER, MAX_NESTING_DEPTH};
pub use template::TemplateCache;
