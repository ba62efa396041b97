//! The build library: the shared namespace of build-produced values.
//!
//! The library collectively holds the data elements used during an installer
//! build. The fixed fields (`options`, `args`, `configs`) are supplied at
//! construction and read-only; `env` is an independent, case-insensitive map
//! of environment-style settings; `vars` is the mutable namespace actions
//! read and write, and the only part that persists through save/load.

use std::collections::BTreeMap;

use kiln_archive::{load_keyed_value, save_value, ArchiveNode, ArchiveSession, TypeRegistry, Value};
use kiln_types::{BuildOptions, Configs, KilnError, Result};

// ---------------------------------------------------------------------------
// EnvStore — case-insensitive environment-style settings
// ---------------------------------------------------------------------------

/// Environment-style settings with case-insensitive names.
///
/// Keys are normalized to upper case on insert and lookup, tolerating
/// configuration sources that disagree about casing. The store is seeded from
/// a caller-supplied map and stays independent of the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvStore {
    entries: BTreeMap<String, String>,
}

impl EnvStore {
    /// Build a store from key/value pairs, normalizing the keys.
    pub fn from_map<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            entries: vars
                .into_iter()
                .map(|(k, v)| (canonical(&k), v))
                .collect(),
        }
    }

    /// The value of `name`, failing when it is absent.
    pub fn get(&self, name: &str) -> Result<&str> {
        self.lookup(name).ok_or_else(|| KilnError::EnvNotFound {
            name: name.to_string(),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.entries.get(&canonical(name)).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(canonical(name), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(&canonical(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&canonical(name))
    }

    /// Normalized entries in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// One `KEY = value` line per entry, for debug output.
    pub fn dump_to_string(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k} = {v}\n"))
            .collect()
    }
}

fn canonical(name: &str) -> String {
    name.to_ascii_uppercase()
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// The central repository of everything a build run produces and consults.
pub struct Library {
    options: BuildOptions,
    args: Vec<String>,
    configs: Configs,
    env: EnvStore,
    vars: BTreeMap<String, Value>,
}

impl Library {
    pub fn new(options: BuildOptions, args: Vec<String>, configs: Configs, env: EnvStore) -> Self {
        Self {
            options,
            args,
            configs,
            env,
            vars: BTreeMap::new(),
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn configs(&self) -> &Configs {
        &self.configs
    }

    pub fn env(&self) -> &EnvStore {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut EnvStore {
        &mut self.env
    }

    /// Set a named value, replacing any previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// The value bound to `name`. Absence is an explicit error, never a
    /// silent default.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.vars.get(name).ok_or_else(|| KilnError::VarNotFound {
            name: name.to_string(),
        })
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Bound names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn get_str(&self, name: &str) -> Result<&str> {
        self.get(name)?.as_str().ok_or_else(|| KilnError::VarType {
            name: name.to_string(),
            expected: "str",
        })
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        self.get(name)?.as_int().ok_or_else(|| KilnError::VarType {
            name: name.to_string(),
            expected: "int",
        })
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.get(name)?.as_bool().ok_or_else(|| KilnError::VarType {
            name: name.to_string(),
            expected: "bool",
        })
    }

    /// Validate that each name is bound and, for strings, non-empty.
    /// Actions call this after seeding the library to fail early on an
    /// incomplete setup.
    pub fn require(&self, names: &[&str]) -> Result<()> {
        for name in names {
            match self.vars.get(*name) {
                None => {
                    return Err(KilnError::Configuration(format!(
                        "library variable '{name}' is null or empty"
                    )))
                }
                Some(Value::Str(s)) if s.is_empty() => {
                    return Err(KilnError::Configuration(format!(
                        "library variable '{name}' is null or empty"
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Export every variable as a keyed node, in sorted-name order so the
    /// persisted output is deterministic and diffable.
    pub fn export_entries(&self, session: &mut ArchiveSession) -> Result<Vec<ArchiveNode>> {
        self.vars
            .iter()
            .map(|(name, value)| save_value(session, value, Some(name)))
            .collect()
    }

    /// Rebuild the variable namespace from archived entries, in whatever
    /// order the document presents them.
    pub fn import_entries(
        &mut self,
        entries: &[ArchiveNode],
        session: &mut ArchiveSession,
        types: &TypeRegistry,
    ) -> Result<()> {
        for entry in entries {
            let (name, value) = load_keyed_value(session, entry, types)?;
            self.vars.insert(name, value);
        }
        Ok(())
    }
}
