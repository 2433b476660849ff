//! Command catalog mapping command names to request/response types.
//!
//! Commands keep the order they were inserted in (manifest order), and a
//! name index is kept alongside for lookups.

use std::collections::HashMap;

use super::Manifest;
use crate::error::{DynwireError, Result};

/// Request and response types of one command.
///
/// `None` on either side means the command takes no payload or produces
/// no response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Command name as sent on the wire.
    pub name: String,
    /// Request message type.
    pub request: Option<String>,
    /// Response message type.
    pub response: Option<String>,
}

impl CommandSpec {
    /// Build an entry; empty type names become `None`.
    pub fn new(name: impl Into<String>, request: &str, response: &str) -> Self {
        Self {
            name: name.into(),
            request: non_empty(request),
            response: non_empty(response),
        }
    }

    /// Request type, if the command expects a payload.
    pub fn request_type(&self) -> Option<&str> {
        self.request.as_deref()
    }

    /// Response type, if the command produces a body.
    pub fn response_type(&self) -> Option<&str> {
        self.response.as_deref()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Per-protocol command table.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    protocol: String,
    commands: Vec<CommandSpec>,
    index: HashMap<String, usize>,
}

impl CommandCatalog {
    /// Create an empty catalog for `protocol`.
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            ..Self::default()
        }
    }

    /// Build a catalog from manifest text.
    pub fn from_manifest(protocol: impl Into<String>, text: &str) -> Result<Self> {
        let manifest = Manifest::parse(text)?;
        Ok(Self::from_entries(
            protocol,
            manifest
                .commands
                .iter()
                .map(|(name, req, resp)| (name.as_str(), req.as_str(), resp.as_str())),
        ))
    }

    /// Build a catalog from `(command, request, response)` triples.
    pub fn from_entries<'a>(
        protocol: impl Into<String>,
        entries: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    ) -> Self {
        let mut catalog = Self::new(protocol);
        for (name, request, response) in entries {
            catalog.insert(CommandSpec::new(name, request, response));
        }
        catalog
    }

    /// Add or replace a command. A replaced command keeps its position.
    pub fn insert(&mut self, spec: CommandSpec) {
        match self.index.get(&spec.name) {
            Some(&i) => self.commands[i] = spec,
            None => {
                self.index.insert(spec.name.clone(), self.commands.len());
                self.commands.push(spec);
            }
        }
    }

    /// Look up a command.
    ///
    /// # Errors
    ///
    /// [`DynwireError::UnknownCommand`] if the catalog has no such command.
    pub fn lookup(&self, command: &str) -> Result<&CommandSpec> {
        self.index
            .get(command)
            .map(|&i| &self.commands[i])
            .ok_or_else(|| DynwireError::UnknownCommand {
                protocol: self.protocol.clone(),
                command: command.to_string(),
            })
    }

    /// Whether `command` is known.
    pub fn contains(&self, command: &str) -> bool {
        self.index.contains_key(command)
    }

    /// Command names in manifest order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.name.as_str())
    }

    /// Commands in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.iter()
    }

    /// Protocol this catalog belongs to.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
