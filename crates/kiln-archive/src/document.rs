//! The on-disk envelope for an archived library.
//!
//! A document is pretty-printed JSON so saved builds stay reviewable and
//! diffable. The `format`/`version` header guards against feeding the loader
//! a file that merely happens to be JSON.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use kiln_types::{KilnError, Result};

use crate::node::ArchiveNode;

pub const FORMAT: &str = "kiln-archive";
pub const FORMAT_VERSION: u32 = 1;

/// A persisted tree of archive entries plus its identifying header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveDocument {
    pub format: String,
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<ArchiveNode>,
}

impl ArchiveDocument {
    /// Wrap entries in a current-format header stamped with the present time.
    pub fn new(entries: Vec<ArchiveNode>) -> Self {
        Self {
            format: FORMAT.to_string(),
            version: FORMAT_VERSION,
            saved_at: Utc::now(),
            entries,
        }
    }

    /// Write the document as pretty-printed JSON, creating parent directories
    /// as needed.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), entries = self.entries.len(), "archive written");
        Ok(())
    }

    /// Read a document back, validating the format header.
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let doc: ArchiveDocument = serde_json::from_str(&data)?;
        if doc.format != FORMAT {
            return Err(KilnError::MalformedArchive(format!(
                "unrecognized format '{}' (expected '{FORMAT}')",
                doc.format
            )));
        }
        if doc.version != FORMAT_VERSION {
            return Err(KilnError::MalformedArchive(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                doc.version
            )));
        }
        debug!(path = %path.display(), entries = doc.entries.len(), "archive read");
        Ok(doc)
    }
}
