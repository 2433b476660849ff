//! Typed message graph produced by the schema parser.
//!
//! A [`SchemaGraph`] maps type names to [`MessageDef`]s (and [`EnumDef`]s).
//! Field types are kept as written until they are looked up: a field whose
//! named type resolves to a message of the same graph is a message field,
//! one that resolves to an enum is a numeric field, and one that does not
//! resolve at all fails at the point of use.

use std::collections::BTreeMap;

use crate::error::{DynwireError, Result};

/// Protobuf scalar value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarKind {
    /// Map a `.proto` type keyword to its scalar kind.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "double" => Self::Double,
            "float" => Self::Float,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "sint32" => Self::Sint32,
            "sint64" => Self::Sint64,
            "fixed32" => Self::Fixed32,
            "fixed64" => Self::Fixed64,
            "sfixed32" => Self::Sfixed32,
            "sfixed64" => Self::Sfixed64,
            "bool" => Self::Bool,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            _ => return None,
        };
        Some(kind)
    }

    /// `.proto` keyword for this kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Sint32 => "sint32",
            Self::Sint64 => "sint64",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::Sfixed32 => "sfixed32",
            Self::Sfixed64 => "sfixed64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }

    /// Whether values of this kind render as text (`string` and `bytes`).
    #[inline]
    pub fn is_string_like(self) -> bool {
        matches!(self, Self::String | Self::Bytes)
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Built-in scalar.
    Scalar(ScalarKind),
    /// Reference to a message or enum by name, resolved against the graph.
    Named(String),
}

/// A single field of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name as declared.
    pub name: String,
    /// Wire position (field number).
    pub number: u32,
    /// Declared type.
    pub ty: FieldType,
    /// Whether the field is `repeated`.
    pub repeated: bool,
}

/// A message: its fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDef {
    /// Graph key of this message (dotted path for nested messages).
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldDef>,
}

impl MessageDef {
    /// Find a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Find a field by wire position.
    pub fn field_by_number(&self, number: u32) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.number == number)
    }
}

/// An enum: value names and numbers in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<(String, i32)>,
}

impl EnumDef {
    /// Name of the first value declared with `number`.
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(name, _)| name.as_str())
    }

    /// Number of the value called `name`.
    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.values.iter().find(|(v, _)| v == name).map(|(_, n)| *n)
    }
}

/// What a field's type turned out to be after lookup.
#[derive(Debug, Clone, Copy)]
pub enum ResolvedType<'a> {
    Scalar(ScalarKind),
    Message(&'a MessageDef),
    Enum(&'a EnumDef),
}

/// Parsed schema: type name → definition. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaGraph {
    package: Option<String>,
    messages: BTreeMap<String, MessageDef>,
    enums: BTreeMap<String, EnumDef>,
}

impl SchemaGraph {
    pub(crate) fn new(package: Option<String>) -> Self {
        Self {
            package,
            ..Self::default()
        }
    }

    /// Declared package, if any.
    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    /// Look up a message by graph key.
    ///
    /// Also accepts fully qualified (`.pkg.Name`) and package-prefixed names.
    pub fn message(&self, name: &str) -> Option<&MessageDef> {
        self.messages.get(self.local_name(name))
    }

    /// Look up an enum by graph key.
    pub fn enumeration(&self, name: &str) -> Option<&EnumDef> {
        self.enums.get(self.local_name(name))
    }

    /// Message names in lexical order.
    pub fn message_names(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    /// Enum names in lexical order.
    pub fn enum_names(&self) -> impl Iterator<Item = &str> {
        self.enums.keys().map(String::as_str)
    }

    /// Number of message definitions.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when no messages are defined.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Resolve a field's declared type against this graph.
    pub fn resolve<'a>(&'a self, field: &FieldDef) -> Result<ResolvedType<'a>> {
        match &field.ty {
            FieldType::Scalar(kind) => Ok(ResolvedType::Scalar(*kind)),
            FieldType::Named(type_name) => {
                if let Some(msg) = self.message(type_name) {
                    Ok(ResolvedType::Message(msg))
                } else if let Some(en) = self.enumeration(type_name) {
                    Ok(ResolvedType::Enum(en))
                } else {
                    Err(DynwireError::UnresolvedType {
                        field: field.name.clone(),
                        type_name: type_name.clone(),
                    })
                }
            }
        }
    }

    /// Whether the field refers to a message defined in this graph.
    pub fn is_message_field(&self, field: &FieldDef) -> bool {
        matches!(&field.ty, FieldType::Named(t) if self.message(t).is_some())
    }

    pub(crate) fn contains_type(&self, name: &str) -> bool {
        self.messages.contains_key(name) || self.enums.contains_key(name)
    }

    pub(crate) fn insert_message(&mut self, msg: MessageDef) -> std::result::Result<(), String> {
        if self.contains_type(&msg.name) {
            return Err(format!("duplicate type '{}'", msg.name));
        }
        self.messages.insert(msg.name.clone(), msg);
        Ok(())
    }

    pub(crate) fn insert_enum(&mut self, en: EnumDef) -> std::result::Result<(), String> {
        if self.contains_type(&en.name) {
            return Err(format!("duplicate type '{}'", en.name));
        }
        self.enums.insert(en.name.clone(), en);
        Ok(())
    }

    pub(crate) fn messages_mut(&mut self) -> impl Iterator<Item = &mut MessageDef> {
        self.messages.values_mut()
    }

    fn local_name<'n>(&self, name: &'n str) -> &'n str {
        let name = name.strip_prefix('.').unwrap_or(name);
        match &self.package {
            Some(pkg) => name
                .strip_prefix(pkg.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(name),
            None => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> SchemaGraph {
        let mut g = SchemaGraph::new(Some("demo".to_string()));
        g.insert_message(MessageDef {
            name: "Inner".to_string(),
            fields: vec![FieldDef {
                name: "v".to_string(),
                number: 1,
                ty: FieldType::Scalar(ScalarKind::Uint32),
                repeated: false,
            }],
        })
        .unwrap();
        g.insert_enum(EnumDef {
            name: "Color".to_string(),
            values: vec![("RED".to_string(), 0), ("BLUE".to_string(), 1)],
        })
        .unwrap();
        g
    }

    fn named(name: &str, ty: &str) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            number: 1,
            ty: FieldType::Named(ty.to_string()),
            repeated: false,
        }
    }

    #[test]
    fn test_scalar_names_round_trip() {
        for name in ["double", "int64", "sfixed32", "bool", "bytes"] {
            assert_eq!(ScalarKind::from_name(name).unwrap().name(), name);
        }
        assert!(ScalarKind::from_name("Inner").is_none());
    }

    #[test]
    fn test_qualified_lookup() {
        let g = graph();
        assert!(g.message("Inner").is_some());
        assert!(g.message("demo.Inner").is_some());
        assert!(g.message(".demo.Inner").is_some());
        assert!(g.message("other.Inner").is_none());
    }

    #[test]
    fn test_resolve_kinds() {
        let g = graph();
        assert!(matches!(
            g.resolve(&named("a", "Inner")).unwrap(),
            ResolvedType::Message(_)
        ));
        assert!(matches!(
            g.resolve(&named("b", "Color")).unwrap(),
            ResolvedType::Enum(_)
        ));
        assert!(matches!(
            g.resolve(&named("c", "Missing")),
            Err(DynwireError::UnresolvedType { .. })
        ));
    }

    #[test]
    fn test_is_message_field() {
        let g = graph();
        assert!(g.is_message_field(&named("a", "Inner")));
        assert!(!g.is_message_field(&named("b", "Color")));
        assert!(!g.is_message_field(&named("c", "Missing")));
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut g = graph();
        let dup = MessageDef {
            name: "Color".to_string(),
            fields: Vec::new(),
        };
        assert!(g.insert_message(dup).is_err());
    }

    #[test]
    fn test_enum_lookup() {
        let g = graph();
        let color = g.enumeration("Color").unwrap();
        assert_eq!(color.name_of(1), Some("BLUE"));
        assert_eq!(color.number_of("RED"), Some(0));
        assert_eq!(color.name_of(7), None);
    }
}
