use agentry_core::{Error, ErrorKind, Result};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::handlers::{ExceptionHandlers, TaskFailure};
use crate::registry::{ComponentRegistry, Components};
use crate::skill::Skill;
use crate::task::{TaskDefinition, TaskInstance};

/// A plugin contributes component factories, skills, and task definitions to
/// an agent during the apply phase.
pub trait AgentPlugin {
    fn apply(&self, agent: &mut Agent) -> Result<()>;
}

/// The mutable apply-phase half of an agent. Plugins register factories,
/// skills, tasks, and exception handlers here; `build` then freezes
/// everything into an [`AgentHandle`].
pub struct Agent {
    name: String,
    components: ComponentRegistry,
    skills: HashMap<String, Arc<dyn Skill>>,
    tasks: HashMap<String, TaskDefinition>,
    handlers: ExceptionHandlers,
}

impl Agent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            components: ComponentRegistry::new(),
            skills: HashMap::new(),
            tasks: HashMap::new(),
            handlers: ExceptionHandlers::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a component factory. Replaces any previous factory for the
    /// same type.
    pub fn add_component_builder<T, F>(&mut self, factory: F)
    where
        T: std::any::Any + Send + Sync,
        F: Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.components.register::<T, F>(factory);
    }

    /// Register a skill under its name. Re-registration under the same name
    /// is idempotent: last write wins, so overlapping plugins can declare the
    /// same pipeline step.
    pub fn add_skill<S: Skill + 'static>(&mut self, skill: S) {
        let name = skill.name().to_string();
        if self.skills.insert(name.clone(), Arc::new(skill)).is_some() {
            debug!(agent = %self.name, skill = %name, "Skill re-registered, last write wins");
        }
    }

    /// Register an ordered skill chain under a task type. Every named skill
    /// must already be registered; a duplicate task type is rejected.
    pub fn register_task(&mut self, task_type: &str, skill_names: &[&str]) -> Result<()> {
        if self.tasks.contains_key(task_type) {
            return Err(Error::TaskAlreadyRegistered(task_type.to_string()));
        }
        for name in skill_names {
            if !self.skills.contains_key(*name) {
                return Err(Error::UnknownSkill(name.to_string()));
            }
        }
        self.tasks.insert(
            task_type.to_string(),
            TaskDefinition {
                task_type: task_type.to_string(),
                skills: skill_names.iter().map(|s| s.to_string()).collect(),
            },
        );
        Ok(())
    }

    /// Register a callback for every failed task instance.
    pub fn add_exception_handler<F>(&mut self, callback: F)
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.handlers.add(callback);
    }

    /// Register a callback for failures of the given kinds only.
    pub fn add_exception_handler_for<F>(&mut self, kinds: &[ErrorKind], callback: F)
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.handlers.add_for(kinds, callback);
    }

    /// Run a plugin's apply phase against this agent.
    pub fn apply(&mut self, plugin: &dyn AgentPlugin) -> Result<()> {
        plugin.apply(self)
    }

    /// End the apply phase: eagerly construct every component and freeze the
    /// registries into a cheaply-clonable execution handle.
    pub fn build(self) -> Result<AgentHandle> {
        self.components.build()?;
        info!(
            agent = %self.name,
            components = self.components.len(),
            skills = self.skills.len(),
            tasks = self.tasks.len(),
            "Agent built"
        );
        Ok(AgentHandle {
            shared: Arc::new(AgentShared {
                name: self.name,
                components: self.components,
                skills: self.skills,
                tasks: self.tasks,
                handlers: self.handlers,
            }),
        })
    }
}

struct AgentShared {
    name: String,
    components: ComponentRegistry,
    skills: HashMap<String, Arc<dyn Skill>>,
    tasks: HashMap<String, TaskDefinition>,
    handlers: ExceptionHandlers,
}

/// Frozen, read-mostly agent state shared by all in-flight task instances.
#[derive(Clone)]
pub struct AgentHandle {
    shared: Arc<AgentShared>,
}

impl AgentHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Resolve a component from the agent's registry.
    pub fn component<T: std::any::Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.shared.components.resolve::<T>()
    }

    /// Schedule a task instance and return immediately. Fails fast with
    /// `UnknownTask` when the type was never registered; every error after
    /// scheduling is reported only through the exception handlers.
    pub fn execute(&self, task: TaskInstance) -> Result<()> {
        let definition = self
            .shared
            .tasks
            .get(&task.task_type)
            .ok_or_else(|| Error::UnknownTask(task.task_type.clone()))?
            .clone();
        debug!(
            agent = %self.shared.name,
            task_type = %task.task_type,
            task_id = %task.id,
            "Task scheduled"
        );
        let shared = self.shared.clone();
        tokio::spawn(run_task(shared, definition, task));
        Ok(())
    }
}

/// Run one task instance's skill chain strictly in order, then hand the final
/// value to the continuation, or the failure to the exception handlers.
async fn run_task(shared: Arc<AgentShared>, definition: TaskDefinition, task: TaskInstance) {
    let TaskInstance {
        id,
        task_type,
        mut value,
        continuation,
        overrides,
    } = task;
    let components = Components::new(&shared.components, &overrides);

    for skill_name in &definition.skills {
        let skill = match shared.skills.get(skill_name) {
            Some(skill) => skill,
            None => {
                shared.handlers.dispatch(&TaskFailure {
                    task_id: id,
                    task_type,
                    skill: Some(skill_name.clone()),
                    error: Error::UnknownSkill(skill_name.clone()),
                });
                return;
            }
        };

        debug!(task_id = %id, skill = %skill_name, "Applying skill");
        let applied = AssertUnwindSafe(skill.apply(value, &components))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(Error::Skill(format!("skill '{skill_name}' panicked"))));

        match applied {
            Ok(next) => value = next,
            Err(error) => {
                warn!(
                    task_id = %id,
                    task_type = %task_type,
                    skill = %skill_name,
                    error = %error,
                    "Skill failed, stopping chain"
                );
                shared.handlers.dispatch(&TaskFailure {
                    task_id: id,
                    task_type,
                    skill: Some(skill_name.clone()),
                    error,
                });
                return;
            }
        }
    }

    if let Some(continuation) = continuation {
        continuation(value, &components);
    }
    debug!(task_id = %id, task_type = %task_type, "Task completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::{FnSkill, TaskValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    fn trace_skill(
        name: &str,
        log: Arc<Mutex<Vec<String>>>,
    ) -> FnSkill<impl Fn(TaskValue, &Components<'_>) -> Result<TaskValue> + Send + Sync> {
        let tag = name.to_string();
        FnSkill::new(name, move |value, _| {
            log.lock().unwrap().push(tag.clone());
            Ok(value)
        })
    }

    #[tokio::test]
    async fn test_chain_runs_in_order_then_continuation() {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let mut agent = Agent::new("test");
        agent.add_skill(trace_skill("a", log.clone()));
        agent.add_skill(trace_skill("b", log.clone()));
        agent.add_skill(trace_skill("c", log.clone()));
        agent.register_task("chain", &["a", "b", "c"]).unwrap();
        let handle = agent.build().unwrap();

        let (tx, rx) = oneshot::channel();
        let task = TaskInstance::new("chain", TaskValue::new(0u8)).then(move |_, _| {
            tx.send(()).unwrap();
        });
        handle.execute(task).unwrap();
        rx.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failing_skill_stops_chain_and_skips_continuation() {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let continued = Arc::new(AtomicUsize::new(0));
        let handler_hits = Arc::new(AtomicUsize::new(0));

        let mut agent = Agent::new("test");
        agent.add_skill(trace_skill("a", log.clone()));
        agent.add_skill(FnSkill::new("b", |_value, _| {
            Err(Error::Skill("b blew up".to_string()))
        }));
        agent.add_skill(trace_skill("c", log.clone()));
        agent.register_task("chain", &["a", "b", "c"]).unwrap();

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let hits = handler_hits.clone();
        agent.add_exception_handler(move |failure| {
            assert_eq!(failure.skill.as_deref(), Some("b"));
            hits.fetch_add(1, Ordering::SeqCst);
            if let Some(tx) = tx.lock().unwrap().take() {
                tx.send(()).unwrap();
            }
        });
        let handle = agent.build().unwrap();

        let cont = continued.clone();
        let task = TaskInstance::new("chain", TaskValue::new(0u8)).then(move |_, _| {
            cont.fetch_add(1, Ordering::SeqCst);
        });
        handle.execute(task).unwrap();
        rx.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        assert_eq!(continued.load(Ordering::SeqCst), 0);
        assert_eq!(handler_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_unknown_task_fails_fast() {
        let handle = Agent::new("test").build().unwrap();
        let err = handle
            .execute(TaskInstance::new("nope", TaskValue::new(0u8)))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTask(_)));
    }

    #[test]
    fn test_register_task_validates_skill_names() {
        let mut agent = Agent::new("test");
        let err = agent.register_task("chain", &["missing"]).unwrap_err();
        assert!(matches!(err, Error::UnknownSkill(_)));
    }

    #[test]
    fn test_duplicate_task_registration_rejected() {
        let mut agent = Agent::new("test");
        agent.add_skill(FnSkill::new("a", |value, _| Ok(value)));
        agent.register_task("chain", &["a"]).unwrap();
        let err = agent.register_task("chain", &["a"]).unwrap_err();
        assert!(matches!(err, Error::TaskAlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn test_skill_reregistration_last_write_wins() {
        let mut agent = Agent::new("test");
        agent.add_skill(FnSkill::new("greet", |_value, _| {
            Ok(TaskValue::new("first".to_string()))
        }));
        agent.add_skill(FnSkill::new("greet", |_value, _| {
            Ok(TaskValue::new("second".to_string()))
        }));
        agent.register_task("chain", &["greet"]).unwrap();
        let handle = agent.build().unwrap();

        let (tx, rx) = oneshot::channel();
        let task = TaskInstance::new("chain", TaskValue::new(())).then(move |value, _| {
            tx.send(value.take::<String>().unwrap()).unwrap();
        });
        handle.execute(task).unwrap();
        assert_eq!(rx.await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_continuation_resolves_components() {
        let mut agent = Agent::new("test");
        agent.add_component_builder::<String, _>(|| Ok(Arc::new("injected".to_string())));
        agent.add_skill(FnSkill::new("noop", |value, _| Ok(value)));
        agent.register_task("chain", &["noop"]).unwrap();
        let handle = agent.build().unwrap();

        let (tx, rx) = oneshot::channel();
        let task = TaskInstance::new("chain", TaskValue::new(())).then(move |_, components: &Components<'_>| {
            let svc = components.resolve::<String>().unwrap();
            tx.send(svc.as_ref().clone()).unwrap();
        });
        handle.execute(task).unwrap();
        assert_eq!(rx.await.unwrap(), "injected");
    }

    #[tokio::test]
    async fn test_panicking_skill_reported_as_failure() {
        let mut agent = Agent::new("test");
        agent.add_skill(FnSkill::new("kaboom", |_value, _| -> Result<TaskValue> {
            panic!("skill panicked")
        }));
        agent.register_task("chain", &["kaboom"]).unwrap();

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        agent.add_exception_handler(move |failure| {
            assert!(matches!(failure.error, Error::Skill(_)));
            if let Some(tx) = tx.lock().unwrap().take() {
                tx.send(()).unwrap();
            }
        });
        let handle = agent.build().unwrap();

        handle
            .execute(TaskInstance::new("chain", TaskValue::new(())))
            .unwrap();
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_per_instance_override_shadows_registry() {
        let mut agent = Agent::new("test");
        agent.add_component_builder::<String, _>(|| Ok(Arc::new("registry".to_string())));
        agent.add_skill(FnSkill::new("read", |_value, components: &Components<'_>| {
            let svc = components.resolve::<String>()?;
            Ok(TaskValue::new(svc.as_ref().clone()))
        }));
        agent.register_task("chain", &["read"]).unwrap();
        let handle = agent.build().unwrap();

        let (tx, rx) = oneshot::channel();
        let task = TaskInstance::new("chain", TaskValue::new(()))
            .with_component(Arc::new("override".to_string()))
            .then(move |value, _| {
                tx.send(value.take::<String>().unwrap()).unwrap();
            });
        handle.execute(task).unwrap();
        assert_eq!(rx.await.unwrap(), "override");
    }
}
