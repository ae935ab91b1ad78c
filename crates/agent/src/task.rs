use std::any::Any;
use std::sync::Arc;
use uuid::Uuid;

use crate::registry::{ComponentOverrides, Components};
use crate::skill::TaskValue;

/// Invoked with the final value once a task instance's chain completes
/// successfully. Never invoked when a skill fails.
pub type Continuation = Box<dyn FnOnce(TaskValue, &Components<'_>) + Send>;

/// An ordered, named chain of skill references, registered once per agent
/// per task type.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub task_type: String,
    pub skills: Vec<String>,
}

/// One execution request: a task type bound to an input value, an optional
/// completion continuation, and optional per-instance component overrides.
/// Created per triggering event and consumed by a single execution.
pub struct TaskInstance {
    pub id: Uuid,
    pub task_type: String,
    pub(crate) value: TaskValue,
    pub(crate) continuation: Option<Continuation>,
    pub(crate) overrides: ComponentOverrides,
}

impl TaskInstance {
    pub fn new(task_type: &str, value: TaskValue) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.to_string(),
            value,
            continuation: None,
            overrides: ComponentOverrides::default(),
        }
    }

    /// Attach the completion continuation.
    pub fn then<F>(mut self, continuation: F) -> Self
    where
        F: FnOnce(TaskValue, &Components<'_>) + Send + 'static,
    {
        self.continuation = Some(Box::new(continuation));
        self
    }

    /// Shadow the agent registry with a component for this instance only.
    pub fn with_component<T: Any + Send + Sync>(mut self, component: Arc<T>) -> Self {
        self.overrides.insert(component);
        self
    }
}

impl std::fmt::Debug for TaskInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskInstance")
            .field("id", &self.id)
            .field("task_type", &self.task_type)
            .field("has_continuation", &self.continuation.is_some())
            .finish()
    }
}
