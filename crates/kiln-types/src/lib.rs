//! Shared types and errors for the kiln installer build pipeline.
//!
//! This crate provides the foundational types used across all other kiln crates:
//! - `KilnError` — unified error taxonomy
//! - `BuildOptions` — fixed per-build configuration supplied by the embedding application
//! - `Configs` — named sections of project-level key/value settings

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Unified error type for all kiln subsystems.
#[derive(Debug, thiserror::Error)]
pub enum KilnError {
    // === Configuration & sequencing ===
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("goal list is not finalized; call finalize() before advancing")]
    NotSealed,

    #[error("goal '{goal}' has no registered action")]
    GoalNotFound { goal: String },

    // === Library lookups ===
    #[error("library variable '{name}' does not exist")]
    VarNotFound { name: String },

    #[error("library variable '{name}' is not a {expected}")]
    VarType {
        name: String,
        expected: &'static str,
    },

    #[error("env variable '{name}' does not exist")]
    EnvNotFound { name: String },

    // === Action execution ===
    #[error("action '{goal}' failed: {message}")]
    ActionFailed { goal: String, message: String },

    // === Archive load ===
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("no deserializer registered for type tag '{tag}'")]
    UnknownTypeTag { tag: String },

    #[error("link target id {id} was never loaded")]
    UnresolvedLink { id: u64 },

    #[error("archive session already completed its fix-up pass")]
    SessionExhausted,

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl KilnError {
    /// Returns `true` if the error aborts a library load (the whole archive
    /// is rejected, the target state is left untouched).
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            KilnError::MalformedArchive(_)
                | KilnError::UnknownTypeTag { .. }
                | KilnError::UnresolvedLink { .. }
                | KilnError::SessionExhausted
                | KilnError::Json(_)
        )
    }

    /// Returns `true` if the error was raised before any goal ran
    /// (plan construction or sealing problems).
    pub fn is_sequencing_error(&self) -> bool {
        matches!(
            self,
            KilnError::Configuration(_) | KilnError::NotSealed | KilnError::GoalNotFound { .. }
        )
    }
}

/// A convenience alias for `Result<T, KilnError>`.
pub type Result<T> = std::result::Result<T, KilnError>;

// ---------------------------------------------------------------------------
// BuildOptions — fixed per-build configuration
// ---------------------------------------------------------------------------

/// Options supplied once by the embedding application when a build starts.
///
/// The library holds these read-only; actions consult them but never mutate
/// them. Loading them from a CLI or config file is the caller's concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub project_name: String,
    pub root_path: PathBuf,
    pub output_dir: PathBuf,
    pub cpu: String,
    pub bin_dir_name: String,
    pub project_bin: PathBuf,
    pub debug_build: bool,
    pub local_build: bool,
    /// Goals to execute as no-ops without removing them from the plan.
    pub skip_goals: BTreeSet<String>,
}

impl BuildOptions {
    /// Create options for a project rooted at `root`, deriving the
    /// conventional directory layout (`bin/` under the root, `out/` beside it).
    pub fn for_project(name: impl Into<String>, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            project_name: name.into(),
            project_bin: root.join("bin"),
            output_dir: root.join("out"),
            bin_dir_name: "bin".to_string(),
            cpu: "x86".to_string(),
            root_path: root,
            debug_build: false,
            local_build: false,
            skip_goals: BTreeSet::new(),
        }
    }

    /// Add a goal to the skip set.
    #[must_use]
    pub fn skip(mut self, goal: impl Into<String>) -> Self {
        self.skip_goals.insert(goal.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Configs — named sections of project settings
// ---------------------------------------------------------------------------

/// Project-level settings grouped into named sections, as parsed out of a
/// per-project config file by the embedding application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configs {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl Configs {
    /// Create an empty settings table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a section exists. Existing sections are left as-is.
    pub fn add_section(&mut self, name: impl Into<String>) {
        self.sections.entry(name.into()).or_default();
    }

    /// Set a key in a section, creating the section if needed.
    pub fn set(
        &mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.sections
            .entry(section.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    /// All keys of a section, or `None` when the section does not exist.
    pub fn section(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.sections.get(name)
    }

    /// A single value, or `None` when the section or key is absent.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    /// Section names in sorted order.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}
