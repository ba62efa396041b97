//! The unit of work executed for one goal, and the goal→action registry.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::info;

use kiln_types::{KilnError, Result};

use crate::state::BuildState;

// ---------------------------------------------------------------------------
// Action trait
// ---------------------------------------------------------------------------

/// A single step of the installer build process.
///
/// An action should be, as much as possible, one operation. It receives the
/// build state for the duration of one call and must not retain it; the
/// scheduler guarantees no two actions ever run at once, so the action is the
/// sole writer of the library while it executes.
#[async_trait]
pub trait Action: Send + Sync {
    /// Stable goal identifier this action serves.
    fn name(&self) -> &str;

    /// The action's actual processing. Reads and writes the build library.
    async fn execute(&self, state: &mut BuildState) -> Result<()>;

    /// Best-effort compensation. The scheduler never calls this; a caller
    /// that catches a failed advance may invoke it explicitly.
    async fn rollback(&self, _state: &mut BuildState) -> Result<()> {
        Ok(())
    }

    /// Scheduler entry point: traces the start and completion of exactly one
    /// `execute` call and propagates its failure unchanged.
    async fn run(&self, state: &mut BuildState) -> Result<()> {
        info!(action = self.name(), "action started");
        self.execute(state).await?;
        info!(action = self.name(), "action done");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ActionRegistry — the goal map
// ---------------------------------------------------------------------------

/// Constructs a fresh action instance for each advance.
pub type ActionFactory = Box<dyn Fn() -> Box<dyn Action> + Send + Sync>;

/// Mapping of goal names to action factories, configured by the embedding
/// application before the goal list is finalized.
pub struct ActionRegistry {
    factories: HashMap<String, ActionFactory>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for a goal name. Last registration wins.
    pub fn register<F>(&mut self, goal: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Action> + Send + Sync + 'static,
    {
        self.factories.insert(goal.into(), Box::new(factory));
    }

    /// Construct a fresh action for a goal.
    pub fn make(&self, goal: &str) -> Result<Box<dyn Action>> {
        self.factories
            .get(goal)
            .map(|factory| factory())
            .ok_or_else(|| KilnError::GoalNotFound {
                goal: goal.to_string(),
            })
    }

    pub fn has(&self, goal: &str) -> bool {
        self.factories.contains_key(goal)
    }

    /// Registered goal names, in no particular order.
    pub fn goals(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
