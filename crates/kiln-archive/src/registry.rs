//! Closed registry of archivable type tags.
//!
//! Every object tag that can appear in an archive must be registered here
//! before loading; the set of loadable types is fixed at process start, and
//! an unregistered tag is a load error rather than a dynamic lookup.

use std::collections::HashMap;

use crate::archivable::SharedArchivable;
use crate::node::ArchiveNode;
use crate::session::ArchiveSession;
use kiln_types::Result;

/// Reconstructs one object from its exported field nodes.
///
/// The factory builds the instance with reference-typed fields unset and
/// defers them through [`ArchiveSession::defer_link`]; owned fields it decodes
/// in place (recursing through the codec for nested values).
pub type LoadFactory =
    fn(&[ArchiveNode], &mut ArchiveSession, &TypeRegistry) -> Result<SharedArchivable>;

/// Mapping of fully-qualified type tags to load factories.
pub struct TypeRegistry {
    factories: HashMap<String, LoadFactory>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for a type tag. Last registration wins.
    pub fn register(&mut self, tag: impl Into<String>, factory: LoadFactory) {
        self.factories.insert(tag.into(), factory);
    }

    pub fn get(&self, tag: &str) -> Option<LoadFactory> {
        self.factories.get(tag).copied()
    }

    pub fn has(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags, in no particular order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
