use agentry_core::{Error, Result};
use async_trait::async_trait;
use std::any::{type_name, Any};

use crate::registry::Components;

/// The opaque payload threaded through a skill chain. A skill consumes the
/// value and returns it (usually the same payload, mutated), so identity is
/// preserved across the chain unless a skill deliberately substitutes it.
pub struct TaskValue(Box<dyn Any + Send>);

impl TaskValue {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.downcast_mut::<T>()
    }

    /// Unwrap the payload, failing if it is not a `T`.
    pub fn take<T: Any>(self) -> Result<T> {
        self.0
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| Error::Validation(format!("task value is not a {}", type_name::<T>())))
    }
}

impl std::fmt::Debug for TaskValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TaskValue(..)")
    }
}

/// A named, stateless unit of work. Component needs are expressed by
/// resolving from the injected view rather than by declared parameters.
#[async_trait]
pub trait Skill: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, value: TaskValue, components: &Components<'_>) -> Result<TaskValue>;
}

/// Adapter turning a plain synchronous function into a [`Skill`]. Skills that
/// await I/O implement the trait directly.
pub struct FnSkill<F> {
    name: String,
    func: F,
}

impl<F> FnSkill<F>
where
    F: Fn(TaskValue, &Components<'_>) -> Result<TaskValue> + Send + Sync,
{
    pub fn new(name: &str, func: F) -> Self {
        Self {
            name: name.to_string(),
            func,
        }
    }
}

#[async_trait]
impl<F> Skill for FnSkill<F>
where
    F: Fn(TaskValue, &Components<'_>) -> Result<TaskValue> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, value: TaskValue, components: &Components<'_>) -> Result<TaskValue> {
        (self.func)(value, components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_value_round_trip() {
        let mut value = TaskValue::new(vec![1u32, 2]);
        assert!(value.is::<Vec<u32>>());
        value.downcast_mut::<Vec<u32>>().unwrap().push(3);
        assert_eq!(value.take::<Vec<u32>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_take_wrong_type_fails() {
        let value = TaskValue::new(7u64);
        let err = value.take::<String>().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
