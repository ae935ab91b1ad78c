pub mod handlers;
pub mod registry;
pub mod runtime;
pub mod skill;
pub mod task;

pub use handlers::{ExceptionHandlers, TaskFailure};
pub use registry::{ComponentOverrides, ComponentRegistry, Components};
pub use runtime::{Agent, AgentHandle, AgentPlugin};
pub use skill::{FnSkill, Skill, TaskValue};
pub use task::{Continuation, TaskDefinition, TaskInstance};
