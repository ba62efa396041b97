//! The contract an object type implements to take part in archival.

use std::any::Any;
use std::sync::{Arc, Mutex};

use kiln_types::{KilnError, Result};

use crate::node::ArchiveNode;
use crate::session::ArchiveSession;

/// Shared handle to an archivable object.
///
/// Object identity, and therefore id assignment and link resolution, is the
/// identity of this handle's allocation, not the value behind it.
pub type SharedArchivable = Arc<Mutex<dyn Archivable>>;

/// An object that can be exported to and rebuilt from archive nodes.
///
/// Implementors contribute their own fields via [`export`](Archivable::export).
/// Owned fields are written in full; reference-typed fields are written as
/// link nodes carrying the target's session id (obtained through
/// [`ArchiveSession::id_for`]), which is what lets cyclic graphs serialize
/// without infinite recursion. The matching load factory reconstructs the
/// object with its link fields unset and defers them to the session; the
/// fix-up pass delivers the live targets through
/// [`bind_link`](Archivable::bind_link).
pub trait Archivable: Any + Send {
    /// Fully-qualified type tag, resolvable through the type registry.
    fn type_tag(&self) -> &'static str;

    /// Export this object's fields as keyed nodes.
    fn export(&self, session: &mut ArchiveSession) -> Result<Vec<ArchiveNode>>;

    /// Bind a link field to its loaded target. Called once per deferred link
    /// during the fix-up pass.
    fn bind_link(&mut self, field: &str, target: SharedArchivable) -> Result<()> {
        let _ = target;
        Err(KilnError::MalformedArchive(format!(
            "type '{}' has no link field '{field}'",
            self.type_tag()
        )))
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Wrap a value into a shared archivable handle.
pub fn share<T: Archivable>(value: T) -> SharedArchivable {
    Arc::new(Mutex::new(value))
}
