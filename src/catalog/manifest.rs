//! Bundle manifest: the JSON file that lists a protocol's commands.
//!
//! ```json
//! { "commands": [["get_msg", "GetMsgRequest", "GetMsgResponse"], ["ping", "", ""]] }
//! ```

use serde::Deserialize;

use crate::error::Result;

/// Parsed manifest. Only the `commands` list is read; other keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    /// `(command, request type, response type)` in file order.
    #[serde(default)]
    pub commands: Vec<(String, String, String)>,
}

impl Manifest {
    /// Parse manifest text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
