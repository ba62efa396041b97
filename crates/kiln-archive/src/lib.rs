//! Archival codec for the kiln build pipeline.
//!
//! This crate converts typed runtime values (primitives, ordered sequences,
//! and arbitrary object graphs) into a tagged tree of [`ArchiveNode`]s and
//! back. Object graphs may contain cross-references, including cycles:
//! reference-typed fields serialize as the target's session id rather than by
//! embedding, and a terminal fix-up pass rebinds them to the live instances
//! once the whole tree has loaded.
//!
//! The moving parts:
//! - [`Value`] — the runtime domain of archivable values
//! - [`Archivable`] — the contract an object type implements to take part
//! - [`ArchiveSession`] — per-save/per-load bookkeeping: id assignment,
//!   loaded-object registry, pending links
//! - [`TypeRegistry`] — closed mapping of type tags to load factories
//! - [`ArchiveDocument`] — the on-disk JSON envelope

pub mod archivable;
pub mod codec;
pub mod document;
pub mod node;
pub mod registry;
pub mod session;
pub mod value;

pub use archivable::{share, Archivable, SharedArchivable};
pub use codec::{load_keyed_value, load_value, save_value};
pub use document::{ArchiveDocument, FORMAT, FORMAT_VERSION};
pub use node::{fields_by_key, required_field, ArchiveNode, ArchiveValue};
pub use registry::{LoadFactory, TypeRegistry};
pub use session::ArchiveSession;
pub use value::Value;
