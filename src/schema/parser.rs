//! `.proto` source parser.
//!
//! Accepts the subset of proto2/proto3 needed to describe request and
//! response messages: `syntax`, `package`, `import`, `option`, messages
//! (with nested messages, enums and `oneof` groups), top-level enums, and
//! `service`/`extend` blocks, which are skipped. `map<K, V>` and `group`
//! fields are rejected.
//!
//! # Example
//!
//! ```
//! use dynwire_client::schema::parse_schema;
//!
//! let graph = parse_schema(r#"
//!     syntax = "proto3";
//!     message NodeID { bytes node_id = 1; }
//! "#).unwrap();
//! assert_eq!(graph.message("NodeID").unwrap().fields[0].name, "node_id");
//! ```

use std::collections::HashSet;

use super::graph::{EnumDef, FieldDef, FieldType, MessageDef, ScalarKind, SchemaGraph};
use crate::error::{DynwireError, Result};

/// Largest field number protobuf allows.
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Deepest nesting of message and enum declarations the parser accepts.
pub const MAX_NESTING_DEPTH: usize = 100;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(String),
    Str(String),
    Sym(char),
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

/// Parse `.proto` source text into a [`SchemaGraph`].
///
/// Parsing is pure: the same source always yields an equal graph.
pub fn parse_schema(source: &str) -> Result<SchemaGraph> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        package: None,
        messages: Vec::new(),
        enums: Vec::new(),
    };
    parser.parse_file()?;

    let mut graph = SchemaGraph::new(parser.package);
    for (line, en) in parser.enums {
        graph
            .insert_enum(en)
            .map_err(|msg| DynwireError::schema(line, msg))?;
    }
    for (line, msg) in parser.messages {
        graph
            .insert_message(msg)
            .map_err(|msg| DynwireError::schema(line, msg))?;
    }
    qualify_references(&mut graph);

    tracing::debug!(messages = graph.len(), "parsed schema");
    Ok(graph)
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '\n' {
            line += 1;
            i += 1;
        } else if c.is_whitespace() {
            i += 1;
        } else if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && next == Some('*') {
            let start = line;
            i += 2;
            loop {
                match chars.get(i) {
                    None => return Err(DynwireError::schema(start, "unterminated block comment")),
                    Some('*') if chars.get(i + 1) == Some(&'/') => {
                        i += 2;
                        break;
                    }
                    Some('\n') => {
                        line += 1;
                        i += 1;
                    }
                    Some(_) => i += 1,
                }
            }
        } else if c == '"' || c == '\'' {
            i += 1;
            let mut text = String::new();
            loop {
                match chars.get(i) {
                    None | Some('\n') => {
                        return Err(DynwireError::schema(line, "unterminated string literal"))
                    }
                    Some('\\') => {
                        let escaped = chars.get(i + 1).copied().ok_or_else(|| {
                            DynwireError::schema(line, "unterminated string literal")
                        })?;
                        text.push(escaped);
                        i += 2;
                    }
                    Some(&ch) if ch == c => {
                        i += 1;
                        break;
                    }
                    Some(&ch) => {
                        text.push(ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token {
                tok: Tok::Str(text),
                line,
            });
        } else if is_ident_start(c) || (c == '.' && next.is_some_and(is_ident_start)) {
            let start = i;
            i += 1;
            while i < chars.len() && (is_ident_start(chars[i]) || chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token {
                tok: Tok::Ident(chars[start..i].iter().collect()),
                line,
            });
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token {
                tok: Tok::Int(chars[start..i].iter().collect()),
                line,
            });
        } else {
            tokens.push(Token {
                tok: Tok::Sym(c),
                line,
            });
            i += 1;
        }
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn parse_int(text: &str, line: usize) -> Result<i64> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        i64::from_str_radix(&text[1..], 8)
    } else {
        text.parse::<i64>()
    };
    parsed.map_err(|_| DynwireError::schema(line, format!("invalid integer '{text}'")))
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    package: Option<String>,
    messages: Vec<(usize, MessageDef)>,
    enums: Vec<(usize, EnumDef)>,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn err(&self, message: impl Into<String>) -> DynwireError {
        DynwireError::schema(self.line(), message)
    }

    fn next(&mut self) -> Result<Tok> {
        let tok = self
            .tokens
            .get(self.pos)
            .map(|t| t.tok.clone())
            .ok_or_else(|| self.err("unexpected end of input"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn peek_sym(&self, sym: char) -> bool {
        self.peek() == Some(&Tok::Sym(sym))
    }

    fn eat_sym(&mut self, sym: char) -> bool {
        if self.peek_sym(sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: char) -> Result<()> {
        match self.next()? {
            Tok::Sym(c) if c == sym => Ok(()),
            other => Err(DynwireError::schema(
                self.tokens[self.pos - 1].line,
                format!("expected '{sym}', found {other:?}"),
            )),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.next()? {
            Tok::Ident(name) => Ok(name),
            other => Err(DynwireError::schema(
                self.tokens[self.pos - 1].line,
                format!("expected identifier, found {other:?}"),
            )),
        }
    }

    fn expect_str(&mut self) -> Result<String> {
        match self.next()? {
            Tok::Str(text) => Ok(text),
            other => Err(DynwireError::schema(
                self.tokens[self.pos - 1].line,
                format!("expected string literal, found {other:?}"),
            )),
        }
    }

    fn expect_int(&mut self) -> Result<i64> {
        let line = self.line();
        let negative = self.eat_sym('-');
        match self.next()? {
            Tok::Int(text) => parse_int(&text, line).map(|n| if negative { -n } else { n }),
            other => Err(DynwireError::schema(
                line,
                format!("expected integer, found {other:?}"),
            )),
        }
    }

    /// Skip tokens up to and including the `;` that ends the statement.
    fn skip_statement(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.next()? {
                Tok::Sym('{') | Tok::Sym('[') | Tok::Sym('(') => depth += 1,
                Tok::Sym('}') | Tok::Sym(']') | Tok::Sym(')') => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| self.err("unbalanced brackets"))?;
                }
                Tok::Sym(';') if depth == 0 => return Ok(()),
                _ => {}
            }
        }
    }

    /// Skip a `{ ... }` block including everything before its opening brace.
    fn skip_block(&mut self) -> Result<()> {
        while !self.eat_sym('{') {
            self.next()?;
        }
        self.skip_until_close('{', '}')
    }

    fn skip_until_close(&mut self, open: char, close: char) -> Result<()> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.next()? {
                Tok::Sym(c) if c == open => depth += 1,
                Tok::Sym(c) if c == close => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_file(&mut self) -> Result<()> {
        while let Some(tok) = self.peek().cloned() {
            match tok {
                Tok::Sym(';') => self.pos += 1,
                Tok::Ident(word) => {
                    self.pos += 1;
                    match word.as_str() {
                        "syntax" | "edition" => {
                            self.expect_sym('=')?;
                            self.expect_str()?;
                            self.expect_sym(';')?;
                        }
                        "package" => {
                            let name = self.expect_ident()?;
                            self.expect_sym(';')?;
                            self.package = Some(name);
                        }
                        "import" => {
                            if matches!(self.peek(), Some(Tok::Ident(w)) if w == "public" || w == "weak")
                            {
                                self.pos += 1;
                            }
                            let path = self.expect_str()?;
                            self.expect_sym(';')?;
                            tracing::debug!(%path, "ignoring schema import");
                        }
                        "option" => self.skip_statement()?,
                        "message" => self.parse_message("", 1)?,
                        "enum" => self.parse_enum("", 1)?,
                        "service" | "extend" => self.skip_block()?,
                        other => {
                            self.pos -= 1;
                            return Err(self.err(format!("unexpected '{other}' at top level")));
                        }
                    }
                }
                other => return Err(self.err(format!("unexpected {other:?} at top level"))),
            }
        }
        Ok(())
    }

    fn parse_message(&mut self, scope: &str, depth: usize) -> Result<()> {
        let line = self.line();
        let name = self.expect_ident()?;
        let full = qualify(scope, &name);
        self.check_depth(depth, &full)?;
        self.expect_sym('{')?;

        let mut fields: Vec<(usize, FieldDef)> = Vec::new();
        loop {
            match self.peek().cloned() {
                Some(Tok::Sym('}')) => {
                    self.pos += 1;
                    break;
                }
                Some(Tok::Sym(';')) => self.pos += 1,
                Some(Tok::Ident(word)) => match word.as_str() {
                    "message" => {
                        self.pos += 1;
                        self.parse_message(&full, depth + 1)?;
                    }
                    "enum" => {
                        self.pos += 1;
                        self.parse_enum(&full, depth + 1)?;
                    }
                    "oneof" => {
                        self.pos += 1;
                        self.parse_oneof(&mut fields)?;
                    }
                    "option" | "reserved" | "extensions" => self.skip_statement()?,
                    "extend" => self.skip_block()?,
                    _ => fields.push(self.parse_field()?),
                },
                Some(other) => return Err(self.err(format!("unexpected {other:?} in message '{full}'"))),
                None => return Err(self.err(format!("message '{full}' is not closed"))),
            }
        }

        let mut names = HashSet::new();
        let mut numbers = HashSet::new();
        for (field_line, field) in &fields {
            if !names.insert(field.name.as_str()) {
                return Err(DynwireError::schema(
                    *field_line,
                    format!("duplicate field name '{}' in '{full}'", field.name),
                ));
            }
            if !numbers.insert(field.number) {
                return Err(DynwireError::schema(
                    *field_line,
                    format!("duplicate field number {} in '{full}'", field.number),
                ));
            }
        }

        self.messages.push((
            line,
            MessageDef {
                name: full,
                fields: fields.into_iter().map(|(_, f)| f).collect(),
            },
        ));
        Ok(())
    }

    fn check_depth(&self, depth: usize, name: &str) -> Result<()> {
        if depth > MAX_NESTING_DEPTH {
            return Err(self.err(format!(
                "'{name}' is nested deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        Ok(())
    }

    fn parse_oneof(&mut self, fields: &mut Vec<(usize, FieldDef)>) -> Result<()> {
        self.expect_ident()?;
        self.expect_sym('{')?;
        loop {
            match self.peek().cloned() {
                Some(Tok::Sym('}')) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(Tok::Sym(';')) => self.pos += 1,
                Some(Tok::Ident(w)) if w == "option" => self.skip_statement()?,
                Some(_) => fields.push(self.parse_field()?),
                None => return Err(self.err("oneof is not closed")),
            }
        }
    }

    fn parse_field(&mut self) -> Result<(usize, FieldDef)> {
        let line = self.line();
        let mut type_name = self.expect_ident()?;
        let mut repeated = false;
        match type_name.as_str() {
            "repeated" => {
                repeated = true;
                type_name = self.expect_ident()?;
            }
            "optional" | "required" => type_name = self.expect_ident()?,
            _ => {}
        }
        if type_name == "map" && self.peek_sym('<') {
            return Err(DynwireError::schema(line, "map fields are not supported"));
        }
        if type_name == "group" {
            return Err(DynwireError::schema(line, "group fields are not supported"));
        }

        let name = self.expect_ident()?;
        self.expect_sym('=')?;
        let number = self.expect_int()?;
        let number = u32::try_from(number)
            .ok()
            .filter(|n| (1..=MAX_FIELD_NUMBER).contains(n))
            .ok_or_else(|| {
                DynwireError::schema(line, format!("field number {number} out of range for '{name}'"))
            })?;
        if self.eat_sym('[') {
            self.skip_until_close('[', ']')?;
        }
        self.expect_sym(';')?;

        let ty = match ScalarKind::from_name(&type_name) {
            Some(kind) => FieldType::Scalar(kind),
            None => FieldType::Named(type_name),
        };
        Ok((
            line,
            FieldDef {
                name,
                number,
                ty,
                repeated,
            },
        ))
    }

    fn parse_enum(&mut self, scope: &str, depth: usize) -> Result<()> {
        let line = self.line();
        let name = self.expect_ident()?;
        let full = qualify(scope, &name);
        self.check_depth(depth, &full)?;
        self.expect_sym('{')?;

        let mut values = Vec::new();
        loop {
            match self.peek().cloned() {
                Some(Tok::Sym('}')) => {
                    self.pos += 1;
                    break;
                }
                Some(Tok::Sym(';')) => self.pos += 1,
                Some(Tok::Ident(word)) if word == "option" || word == "reserved" => {
                    self.skip_statement()?
                }
                Some(Tok::Ident(word)) => {
                    self.pos += 1;
                    self.expect_sym('=')?;
                    let value_line = self.line();
                    let number = i32::try_from(self.expect_int()?).map_err(|_| {
                        DynwireError::schema(value_line, format!("enum value '{word}' out of range"))
                    })?;
                    if self.eat_sym('[') {
                        self.skip_until_close('[', ']')?;
                    }
                    self.expect_sym(';')?;
                    values.push((word, number));
                }
                Some(other) => return Err(self.err(format!("unexpected {other:?} in enum '{full}'"))),
                None => return Err(self.err(format!("enum '{full}' is not closed"))),
            }
        }

        self.enums.push((line, EnumDef { name: full, values }));
        Ok(())
    }
}

/// Rewrite named field types to graph keys using protobuf scoping rules
/// (innermost scope first). Names that do not resolve are left as written.
fn qualify_references(graph: &mut SchemaGraph) {
    let package = graph.package().map(str::to_string);
    let known: HashSet<String> = graph
        .message_names()
        .map(str::to_string)
        .chain(graph.enum_names().map(str::to_string))
        .collect();

    for msg in graph.messages_mut() {
        let scope = msg.name.clone();
        for field in &mut msg.fields {
            if let FieldType::Named(type_name) = &mut field.ty {
                if let Some(found) = lookup_scoped(&known, package.as_deref(), &scope, type_name) {
                    *type_name = found;
                }
            }
        }
    }
}

fn lookup_scoped(
    known: &HashSet<String>,
    package: Option<&str>,
    scope: &str,
    type_name: &str,
) -> Option<String> {
    let strip_package = |name: &str| -> String {
        package
            .and_then(|pkg| name.strip_prefix(pkg))
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(name)
            .to_string()
    };

    if let Some(absolute) = type_name.strip_prefix('.') {
        let local = strip_package(absolute);
        return known.contains(&local).then_some(local);
    }

    let mut current = Some(scope);
    while let Some(s) = current {
        let candidate = format!("{s}.{type_name}");
        if known.contains(&candidate) {
            return Some(candidate);
        }
        current = s.rfind('.').map(|i| &s[..i]);
    }

    if known.contains(type_name) {
        return Some(type_name.to_string());
    }
    let local = strip_package(type_name);
    known.contains(&local).then_some(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::graph::ResolvedType;

    #[test]
    fn test_parse_simple_message() {
        let graph = parse_schema(
            r#"
            syntax = "proto3";
            message Peer {
              uint32 id = 1;
              bytes address = 2;
            }
            "#,
        )
        .unwrap();

        let peer = graph.message("Peer").unwrap();
        assert_eq!(peer.fields.len(), 2);
        assert_eq!(peer.fields[0].name, "id");
        assert_eq!(peer.fields[0].number, 1);
        assert_eq!(peer.fields[0].ty, FieldType::Scalar(ScalarKind::Uint32));
        assert_eq!(peer.fields[1].ty, FieldType::Scalar(ScalarKind::Bytes));
        assert!(!peer.fields[0].repeated);
    }

    #[test]
    fn test_declaration_order_kept() {
        let graph = parse_schema("message M { uint32 z = 3; uint32 a = 1; uint32 m = 2; }").unwrap();
        let names: Vec<_> = graph.message("M").unwrap().fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["z", "a", "m"]);
    }

    #[test]
    fn test_repeated_and_message_reference() {
        let graph = parse_schema(
            r#"
            message PeersList {
              bytes node_id = 1;
              repeated Peer peers = 2;
            }
            message Peer { uint32 id = 1; }
            "#,
        )
        .unwrap();

        let list = graph.message("PeersList").unwrap();
        let peers = list.field("peers").unwrap();
        assert!(peers.repeated);
        assert!(graph.is_message_field(peers));
    }

    #[test]
    fn test_comments_options_and_services_skipped() {
        let graph = parse_schema(
            r#"
            // leading comment
            syntax = "proto3";
            package chat;
            import "google/protobuf/empty.proto";
            option java_package = "x.y";
            /* block
               comment */
            message Msg {
              option deprecated = true;
              reserved 4, 5;
              string text = 1 [deprecated = true];
            }
            service Chat {
              rpc Send (Msg) returns (Msg) { option (x) = { a: 1 }; }
            }
            "#,
        )
        .unwrap();

        assert_eq!(graph.package(), Some("chat"));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.message("chat.Msg").unwrap().fields[0].name, "text");
    }

    #[test]
    fn test_nested_types_resolve_innermost_first() {
        let graph = parse_schema(
            r#"
            message Inner { uint32 top = 1; }
            message Outer {
              message Inner { string nested = 1; }
              enum Mode { OFF = 0; ON = 1; }
              Inner inner = 1;
              Mode mode = 2;
            }
            "#,
        )
        .unwrap();

        let outer = graph.message("Outer").unwrap();
        assert_eq!(
            outer.field("inner").unwrap().ty,
            FieldType::Named("Outer.Inner".to_string())
        );
        assert!(matches!(
            graph.resolve(outer.field("mode").unwrap()).unwrap(),
            ResolvedType::Enum(_)
        ));
    }

    #[test]
    fn test_oneof_fields_flattened() {
        let graph = parse_schema(
            "message Choice { oneof pick { string a = 1; uint32 b = 2; } bool c = 3; }",
        )
        .unwrap();
        let names: Vec<_> = graph.message("Choice").unwrap().fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_enum_values() {
        let graph = parse_schema("enum Level { LOW = 0; HIGH = 0x10; NEG = -1; }").unwrap();
        let level = graph.enumeration("Level").unwrap();
        assert_eq!(level.number_of("HIGH"), Some(16));
        assert_eq!(level.number_of("NEG"), Some(-1));
    }

    #[test]
    fn test_unknown_type_left_unresolved() {
        let graph = parse_schema("message A { Missing m = 1; }").unwrap();
        let field = &graph.message("A").unwrap().fields[0];
        assert_eq!(field.ty, FieldType::Named("Missing".to_string()));
        assert!(graph.resolve(field).is_err());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let source = "message A { B b = 1; } message B { repeated string s = 1; }";
        assert_eq!(parse_schema(source).unwrap(), parse_schema(source).unwrap());
    }

    #[test]
    fn test_error_line_reported() {
        let err = parse_schema("message A {\n  uint32 a = 1;\n  uint32 b 2;\n}").unwrap_err();
        match err {
            DynwireError::SchemaParse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_nesting_depth_limited() {
        let nested = |depth: usize| {
            let mut source = String::new();
            for i in 0..depth {
                source.push_str(&format!("message M{i} {{ "));
            }
            source.push_str(&"} ".repeat(depth));
            source
        };

        let graph = parse_schema(&nested(MAX_NESTING_DEPTH)).unwrap();
        assert_eq!(graph.len(), MAX_NESTING_DEPTH);

        match parse_schema(&nested(MAX_NESTING_DEPTH + 1)) {
            Err(DynwireError::SchemaParse { message, .. }) => {
                assert!(message.contains("nested deeper"), "{message}")
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_very_deep_nesting_fails_without_overflow() {
        let depth = 50_000;
        let source = format!("{}{}", "message M { ".repeat(depth), "} ".repeat(depth));
        let result = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || parse_schema(&source).is_err())
            .unwrap()
            .join()
            .unwrap();
        assert!(result);
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        let cases = [
            "message A { uint32 a = 1; ",
            "message A { uint32 a = 0; }",
            "message A { uint32 a = 1; uint32 b = 1; }",
            "message A { uint32 a = 1; string a = 2; }",
            "message A { map<string, uint32> m = 1; }",
            "message A {} message A {}",
            "garbage",
            "message A { string s = 1; } /* open",
        ];
        for source in cases {
            assert!(
                matches!(parse_schema(source), Err(DynwireError::SchemaParse { .. })),
                "expected parse error for {source:?}"
            );
        }
    }
}
