//! Per-archive bookkeeping: id assignment, loaded objects, pending links.

use std::collections::HashMap;

use tracing::debug;

use kiln_types::{KilnError, Result};

use crate::archivable::SharedArchivable;

/// Where a session is in its lifecycle.
///
/// A session moves `Idle → Loading → FixedUp`; save-only sessions stay in
/// `Idle`. Once `FixedUp`, the session is spent: every operation fails with
/// [`KilnError::SessionExhausted`], and a new load must start a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Loading,
    FixedUp,
}

/// A deferred reference-typed field, resolved during the fix-up pass.
struct PendingLink {
    holder: SharedArchivable,
    field: String,
    target: u64,
}

/// Bookkeeping for exactly one save or load call.
///
/// Owns the monotonically increasing id counter, the identity map of exported
/// objects, the registry of objects produced by the current load, and the
/// pending-link table. Sessions are single-owner and never shared across
/// concurrent archive operations.
pub struct ArchiveSession {
    phase: Phase,
    next_id: u64,
    ids: HashMap<usize, u64>,
    // Keeps identity-mapped handles alive so their addresses stay stable
    // for the duration of the session.
    retained: Vec<SharedArchivable>,
    loaded: HashMap<u64, SharedArchivable>,
    pending: Vec<PendingLink>,
}

impl ArchiveSession {
    /// Start a fresh session with an empty id counter and registries.
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            next_id: 0,
            ids: HashMap::new(),
            retained: Vec::new(),
            loaded: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// The id assigned to `obj` in this session, assigning the next free one
    /// on first sight. Identity is the handle allocation, so re-exporting or
    /// re-linking the same object always yields the same id, and two distinct
    /// objects never share one.
    pub fn id_for(&mut self, obj: &SharedArchivable) -> Result<u64> {
        self.check_live()?;
        let key = identity(obj);
        if let Some(id) = self.ids.get(&key) {
            return Ok(*id);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(key, id);
        self.retained.push(obj.clone());
        debug!(id, "assigned archive id");
        Ok(id)
    }

    /// Mark the session as loading. Idempotent while the load is in flight.
    pub fn begin_loading(&mut self) -> Result<()> {
        self.check_live()?;
        self.phase = Phase::Loading;
        Ok(())
    }

    /// Record an object produced by the current load, keyed by its archived id.
    pub fn register_loaded(&mut self, id: u64, obj: SharedArchivable) -> Result<()> {
        self.check_live()?;
        if self.loaded.insert(id, obj).is_some() {
            return Err(KilnError::MalformedArchive(format!(
                "object id {id} appears more than once with distinct bodies"
            )));
        }
        Ok(())
    }

    /// The already-loaded object with this id, if any.
    pub fn lookup_loaded(&self, id: u64) -> Option<SharedArchivable> {
        self.loaded.get(&id).cloned()
    }

    /// Defer a reference-typed field for the fix-up pass.
    pub fn defer_link(
        &mut self,
        holder: SharedArchivable,
        field: impl Into<String>,
        target: u64,
    ) -> Result<()> {
        self.check_live()?;
        self.pending.push(PendingLink {
            holder,
            field: field.into(),
            target,
        });
        Ok(())
    }

    /// Resolve every pending link against the loaded objects and bind the
    /// fields to the live instances. Runs at most once per session; afterwards
    /// the session is spent. An id that was never loaded is a hard error,
    /// never a silently dangling reference.
    pub fn fix_links(&mut self) -> Result<()> {
        self.check_live()?;
        let pending = std::mem::take(&mut self.pending);
        debug!(links = pending.len(), "fixing archive links");
        for link in pending {
            let target = self
                .loaded
                .get(&link.target)
                .cloned()
                .ok_or(KilnError::UnresolvedLink { id: link.target })?;
            let mut holder = link
                .holder
                .lock()
                .map_err(|_| KilnError::Other("archivable lock poisoned during fix-up".into()))?;
            holder.bind_link(&link.field, target)?;
        }
        self.phase = Phase::FixedUp;
        Ok(())
    }

    /// Number of objects registered by the current load.
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Number of links awaiting the fix-up pass.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn check_live(&self) -> Result<()> {
        if self.phase == Phase::FixedUp {
            return Err(KilnError::SessionExhausted);
        }
        Ok(())
    }
}

impl Default for ArchiveSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity key of a shared handle: its allocation address.
fn identity(obj: &SharedArchivable) -> usize {
    std::sync::Arc::as_ptr(obj) as *const () as usize
}
