//! The tagged tree representation the codec manipulates.
//!
//! An [`ArchiveNode`] is one node of the persisted tree: a type-tagged value
//! plus an optional `key` label carried when the node is a named member of a
//! parent mapping (a library entry or an object field).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use kiln_types::{KilnError, Result};

/// One node of the archive tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveNode {
    /// Key label, present when this node is a named member of a parent mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(flatten)]
    pub value: ArchiveValue,
}

/// The tagged union of node kinds.
///
/// `List` and `Tuple` are both ordered sequences but round-trip distinctly:
/// `Tuple` is the immutable kind, `List` the mutable one. `Object` embeds a
/// full export of an archivable object; `Link` carries only the target's
/// session id and is resolved by the fix-up pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArchiveValue {
    Int { value: i64 },
    Str { value: String },
    Bool { value: bool },
    List { items: Vec<ArchiveNode> },
    Tuple { items: Vec<ArchiveNode> },
    Object {
        tag: String,
        id: u64,
        fields: Vec<ArchiveNode>,
    },
    Link { id: u64 },
}

impl ArchiveNode {
    pub fn int(value: i64) -> Self {
        ArchiveValue::Int { value }.into()
    }

    pub fn string(value: impl Into<String>) -> Self {
        ArchiveValue::Str {
            value: value.into(),
        }
        .into()
    }

    pub fn boolean(value: bool) -> Self {
        ArchiveValue::Bool { value }.into()
    }

    pub fn list(items: Vec<ArchiveNode>) -> Self {
        ArchiveValue::List { items }.into()
    }

    pub fn tuple(items: Vec<ArchiveNode>) -> Self {
        ArchiveValue::Tuple { items }.into()
    }

    pub fn object(tag: impl Into<String>, id: u64, fields: Vec<ArchiveNode>) -> Self {
        ArchiveValue::Object {
            tag: tag.into(),
            id,
            fields,
        }
        .into()
    }

    pub fn link(id: u64) -> Self {
        ArchiveValue::Link { id }.into()
    }

    /// Attach a key label, turning this node into a named member.
    #[must_use]
    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.value {
            ArchiveValue::Int { .. } => "int",
            ArchiveValue::Str { .. } => "str",
            ArchiveValue::Bool { .. } => "bool",
            ArchiveValue::List { .. } => "list",
            ArchiveValue::Tuple { .. } => "tuple",
            ArchiveValue::Object { .. } => "object",
            ArchiveValue::Link { .. } => "link",
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match &self.value {
            ArchiveValue::Int { value } => Ok(*value),
            _ => Err(self.wrong_kind("int")),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match &self.value {
            ArchiveValue::Str { value } => Ok(value),
            _ => Err(self.wrong_kind("str")),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match &self.value {
            ArchiveValue::Bool { value } => Ok(*value),
            _ => Err(self.wrong_kind("bool")),
        }
    }

    /// Child nodes of either sequence kind.
    pub fn items(&self) -> Result<&[ArchiveNode]> {
        match &self.value {
            ArchiveValue::List { items } | ArchiveValue::Tuple { items } => Ok(items),
            _ => Err(self.wrong_kind("sequence")),
        }
    }

    /// The target id of a link node.
    pub fn link_target(&self) -> Result<u64> {
        match &self.value {
            ArchiveValue::Link { id } => Ok(*id),
            _ => Err(self.wrong_kind("link")),
        }
    }

    fn wrong_kind(&self, wanted: &str) -> KilnError {
        KilnError::MalformedArchive(format!(
            "expected a {wanted} node, found {}{}",
            self.kind(),
            self.key
                .as_deref()
                .map(|k| format!(" (key '{k}')"))
                .unwrap_or_default()
        ))
    }
}

impl From<ArchiveValue> for ArchiveNode {
    fn from(value: ArchiveValue) -> Self {
        ArchiveNode { key: None, value }
    }
}

/// Index an object's field nodes by their key labels. Unkeyed nodes are
/// skipped; load factories reach them positionally if they need to.
pub fn fields_by_key(fields: &[ArchiveNode]) -> HashMap<&str, &ArchiveNode> {
    fields
        .iter()
        .filter_map(|n| n.key.as_deref().map(|k| (k, n)))
        .collect()
}

/// Look up a required field, reporting the owning type tag on absence.
pub fn required_field<'a>(
    fields: &HashMap<&str, &'a ArchiveNode>,
    name: &str,
    owner: &str,
) -> Result<&'a ArchiveNode> {
    fields.get(name).copied().ok_or_else(|| {
        KilnError::MalformedArchive(format!("object '{owner}' is missing field '{name}'"))
    })
}
