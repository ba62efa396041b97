//! The heart of the installer build process.
//!
//! [`BuildState`] owns the build [`Library`] and the ordered goal list, and
//! drives a strictly sequential state machine over goal execution. The goal
//! list is assembled dynamically, then sealed with
//! [`finalize`](BuildState::finalize); the execution phase only ever sees an
//! immutable plan. Each [`advance`](BuildState::advance) runs one goal's action
//! against the library, or substitutes a logged no-op when the goal is in the
//! operator's skip set.

use std::path::Path;
use std::time::Instant;

use tracing::{info, warn};

use kiln_archive::{ArchiveDocument, ArchiveSession, TypeRegistry};
use kiln_types::{BuildOptions, Configs, KilnError, Result};

use crate::action::{Action, ActionRegistry};
use crate::events::{BuildEvent, EventEmitter};
use crate::library::{EnvStore, Library};

/// The central collection of everything required to run an installer build.
pub struct BuildState {
    /// The shared namespace actions read and write.
    pub library: Library,
    goals: Vec<String>,
    registry: ActionRegistry,
    // None until the first advance; afterwards the index of the goal most
    // recently reached. Never moves backwards.
    goal_ptr: Option<usize>,
    sealed: bool,
    events: EventEmitter,
}

impl BuildState {
    /// Create a state with an empty plan around an initial library.
    pub fn new(library: Library) -> Self {
        Self::with_registry(library, ActionRegistry::new())
    }

    /// Create a state with a pre-populated action registry.
    pub fn with_registry(library: Library, registry: ActionRegistry) -> Self {
        Self {
            library,
            goals: Vec::new(),
            registry,
            goal_ptr: None,
            sealed: false,
            events: EventEmitter::default(),
        }
    }

    /// Append a goal to the plan. Fails once the plan is sealed.
    pub fn push_goal(&mut self, goal: impl Into<String>) -> Result<()> {
        self.ensure_unsealed()?;
        self.goals.push(goal.into());
        Ok(())
    }

    /// Replace the whole plan. Fails once the plan is sealed.
    pub fn set_goals(&mut self, goals: Vec<String>) -> Result<()> {
        self.ensure_unsealed()?;
        self.goals = goals;
        Ok(())
    }

    /// Register the action factory for a goal name. Fails once the plan is
    /// sealed.
    pub fn register_action<F>(&mut self, goal: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Action> + Send + Sync + 'static,
    {
        self.ensure_unsealed()?;
        self.registry.register(goal, factory);
        Ok(())
    }

    pub fn goals(&self) -> &[String] {
        &self.goals
    }

    /// The goal the pointer currently rests on, if any goal has run.
    pub fn current_goal(&self) -> Option<&str> {
        self.goal_ptr.map(|i| self.goals[i].as_str())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Subscribe point for build progress events.
    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Seal the plan: no further goal-list or registry mutation is permitted.
    ///
    /// Every goal name must already have a registered action; a hole in the
    /// goal map fails here, before anything runs, rather than mid-build.
    pub fn finalize(&mut self) -> Result<()> {
        if self.sealed {
            return Err(KilnError::Configuration("goals already finalized".into()));
        }
        for goal in &self.goals {
            if !self.registry.has(goal) {
                return Err(KilnError::GoalNotFound { goal: goal.clone() });
            }
        }
        self.sealed = true;
        info!(goals = self.goals.len(), "goal list finalized");
        Ok(())
    }

    /// Whether a sealed plan still has goals left to run.
    pub fn has_more_goals(&self) -> bool {
        if !self.sealed {
            return false;
        }
        match self.goal_ptr {
            None => !self.goals.is_empty(),
            Some(i) => i + 1 < self.goals.len(),
        }
    }

    /// Run the next goal in the plan.
    ///
    /// Fails with [`KilnError::NotSealed`] before
    /// [`finalize`](BuildState::finalize). With no goals left this logs and
    /// returns without touching the pointer. Otherwise the pointer moves to
    /// the next goal and a fresh action is constructed; the action runs unless
    /// the goal is in the skip set. Failures propagate unchanged, leaving the
    /// pointer on the failing goal; there is no retry and no automatic
    /// rollback.
    pub async fn advance(&mut self) -> Result<()> {
        if !self.sealed {
            return Err(KilnError::NotSealed);
        }
        if !self.has_more_goals() {
            info!("no actions left");
            return Ok(());
        }
        let index = self.goal_ptr.map_or(0, |i| i + 1);
        self.goal_ptr = Some(index);
        let goal = self.goals[index].clone();
        let action = self.registry.make(&goal)?;

        if self.library.options().skip_goals.contains(&goal) {
            warn!(goal = %goal, "skipping goal");
            self.events.emit(BuildEvent::GoalSkipped { goal });
            return Ok(());
        }

        self.events.emit(BuildEvent::GoalStarted { goal: goal.clone() });
        let started = Instant::now();
        match action.run(self).await {
            Ok(()) => {
                self.events.emit(BuildEvent::GoalCompleted {
                    goal,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                Ok(())
            }
            Err(err) => {
                self.events.emit(BuildEvent::GoalFailed {
                    goal,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Drive the plan until no goals remain, stopping at the first failure.
    pub async fn run_to_completion(&mut self) -> Result<()> {
        while self.has_more_goals() {
            self.advance().await?;
        }
        Ok(())
    }

    /// Persist the library to an archive file. The plan itself is build-time
    /// configuration and is not persisted.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut session = ArchiveSession::new();
        let entries = self.library.export_entries(&mut session)?;
        let count = entries.len();
        ArchiveDocument::new(entries).write(path)?;
        info!(path = %path.display(), entries = count, "library saved");
        self.events.emit(BuildEvent::StateSaved {
            path: path.display().to_string(),
            entries: count,
        });
        Ok(())
    }

    /// Restore the library from an archive file, replacing the current one
    /// wholesale.
    ///
    /// The fixed fields come from the caller, not the file. The whole
    /// document loads into a fresh library inside one session, the link
    /// fix-up pass runs exactly once, and only a fully resolved library
    /// replaces the current one; a failed load leaves this state untouched.
    pub fn load(
        &mut self,
        path: &Path,
        options: BuildOptions,
        args: Vec<String>,
        configs: Configs,
        env: EnvStore,
        types: &TypeRegistry,
    ) -> Result<()> {
        let doc = ArchiveDocument::read(path)?;
        let mut session = ArchiveSession::new();
        let mut library = Library::new(options, args, configs, env);
        library.import_entries(&doc.entries, &mut session, types)?;
        session.fix_links()?;
        self.library = library;
        info!(path = %path.display(), entries = doc.entries.len(), "library loaded");
        self.events.emit(BuildEvent::StateLoaded {
            path: path.display().to_string(),
            entries: doc.entries.len(),
        });
        Ok(())
    }

    fn ensure_unsealed(&self) -> Result<()> {
        if self.sealed {
            return Err(KilnError::Configuration(
                "goal list is finalized; the plan can no longer change".into(),
            ));
        }
        Ok(())
    }
}
