//! Save and load of runtime values through the tagged tree.

use kiln_types::{KilnError, Result};

use crate::node::{ArchiveNode, ArchiveValue};
use crate::registry::TypeRegistry;
use crate::session::ArchiveSession;
use crate::value::Value;

/// Export a value as an archive node, optionally labelled with `key`.
///
/// Primitives inline their value; sequences recurse in order, keeping the
/// list/tuple distinction; objects are assigned a session id (stable per
/// object identity) and contribute their fields through their own export.
pub fn save_value(
    session: &mut ArchiveSession,
    value: &Value,
    key: Option<&str>,
) -> Result<ArchiveNode> {
    let node_value = match value {
        Value::Int(v) => ArchiveValue::Int { value: *v },
        Value::Str(v) => ArchiveValue::Str { value: v.clone() },
        Value::Bool(v) => ArchiveValue::Bool { value: *v },
        Value::List(items) => ArchiveValue::List {
            items: save_items(session, items)?,
        },
        Value::Tuple(items) => ArchiveValue::Tuple {
            items: save_items(session, items)?,
        },
        Value::Object(shared) => {
            let id = session.id_for(shared)?;
            // try_lock doubles as ownership-cycle detection: if this object is
            // already being exported further up the stack, the graph owns
            // itself and must use a link field instead.
            let guard = shared.try_lock().map_err(|_| {
                KilnError::MalformedArchive(
                    "object owns itself through nested fields; cyclic references must use link fields"
                        .into(),
                )
            })?;
            let fields = guard.export(session)?;
            ArchiveValue::Object {
                tag: guard.type_tag().to_string(),
                id,
                fields,
            }
        }
    };
    let mut node = ArchiveNode::from(node_value);
    if let Some(key) = key {
        node = node.keyed(key);
    }
    Ok(node)
}

fn save_items(session: &mut ArchiveSession, items: &[Value]) -> Result<Vec<ArchiveNode>> {
    items
        .iter()
        .map(|item| save_value(session, item, None))
        .collect()
}

/// Rebuild a value from an archive node.
///
/// Built-in kinds decode directly, recursing into children in order. Object
/// tags resolve through the closed registry; the factory's result is recorded
/// in the session keyed by the archived id, so a re-exported object decodes to
/// the one instance. Link nodes resolve against already-loaded objects;
/// deferred link fields inside objects never reach this function, they go
/// through the session's pending table instead.
pub fn load_value(
    session: &mut ArchiveSession,
    node: &ArchiveNode,
    types: &TypeRegistry,
) -> Result<Value> {
    session.begin_loading()?;
    let value = match &node.value {
        ArchiveValue::Int { value } => Value::Int(*value),
        ArchiveValue::Str { value } => Value::Str(value.clone()),
        ArchiveValue::Bool { value } => Value::Bool(*value),
        ArchiveValue::List { items } => Value::List(load_items(session, items, types)?),
        ArchiveValue::Tuple { items } => Value::Tuple(load_items(session, items, types)?),
        ArchiveValue::Object { tag, id, fields } => {
            if let Some(existing) = session.lookup_loaded(*id) {
                Value::Object(existing)
            } else {
                let factory = types
                    .get(tag)
                    .ok_or_else(|| KilnError::UnknownTypeTag { tag: tag.clone() })?;
                let shared = factory(fields, session, types)?;
                session.register_loaded(*id, shared.clone())?;
                Value::Object(shared)
            }
        }
        ArchiveValue::Link { id } => match session.lookup_loaded(*id) {
            Some(existing) => Value::Object(existing),
            None => {
                return Err(KilnError::MalformedArchive(format!(
                    "link to id {id} outside an object field cannot be deferred"
                )))
            }
        },
    };
    Ok(value)
}

fn load_items(
    session: &mut ArchiveSession,
    items: &[ArchiveNode],
    types: &TypeRegistry,
) -> Result<Vec<Value>> {
    items
        .iter()
        .map(|item| load_value(session, item, types))
        .collect()
}

/// Rebuild a named entry, returning its key label alongside the value.
pub fn load_keyed_value(
    session: &mut ArchiveSession,
    node: &ArchiveNode,
    types: &TypeRegistry,
) -> Result<(String, Value)> {
    let key = node.key.clone().ok_or_else(|| {
        KilnError::MalformedArchive(format!("{} entry is missing its key label", node.kind()))
    })?;
    let value = load_value(session, node, types)?;
    Ok((key, value))
}
