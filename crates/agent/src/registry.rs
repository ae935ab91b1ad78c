use agentry_core::{Error, Result};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

type BoxedComponent = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn() -> Result<BoxedComponent> + Send + Sync>;

/// Type-keyed store of singleton service objects, one instance per agent per
/// type. Factories are recorded during the apply phase; instances are
/// constructed on first resolve (or eagerly by `build`) and cached for the
/// agent's lifetime.
pub struct ComponentRegistry {
    factories: HashMap<TypeId, (&'static str, Factory)>,
    instances: RwLock<HashMap<TypeId, BoxedComponent>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Record a factory for `T`, replacing any previous registration for that
    /// type. A cached instance from a replaced factory is discarded.
    pub fn register<T, F>(&mut self, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        let boxed: Factory = Box::new(move || factory().map(|c| c as BoxedComponent));
        if self.factories.insert(type_id, (type_name::<T>(), boxed)).is_some() {
            debug!(component = type_name::<T>(), "Replacing component factory");
            self.instances
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&type_id);
        }
    }

    /// Return the cached instance of `T`, constructing it via its factory on
    /// first access.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let type_id = TypeId::of::<T>();
        {
            let instances = self.instances.read().unwrap_or_else(|e| e.into_inner());
            if let Some(instance) = instances.get(&type_id) {
                return downcast::<T>(instance.clone());
            }
        }

        let (_, factory) = self
            .factories
            .get(&type_id)
            .ok_or_else(|| Error::ComponentNotRegistered(type_name::<T>().to_string()))?;
        let instance = factory()?;

        let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
        // Another resolver may have raced us here; the first insert wins so
        // the singleton property holds.
        let cached = instances.entry(type_id).or_insert(instance).clone();
        downcast::<T>(cached)
    }

    /// Eagerly construct every registered component, surfacing construction
    /// errors now instead of mid-execution.
    pub fn build(&self) -> Result<()> {
        for (type_id, (name, factory)) in &self.factories {
            let already_built = {
                let instances = self.instances.read().unwrap_or_else(|e| e.into_inner());
                instances.contains_key(type_id)
            };
            if already_built {
                continue;
            }
            let instance = factory()
                .map_err(|e| Error::Component(format!("building {name} failed: {e}")))?;
            let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
            instances.entry(*type_id).or_insert(instance);
            debug!(component = name, "Component built");
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn downcast<T: Any + Send + Sync>(instance: BoxedComponent) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| {
        Error::Component(format!("cached instance is not a {}", type_name::<T>()))
    })
}

/// Per-instance components attached to a single task, consulted before the
/// agent-wide registry.
#[derive(Default)]
pub struct ComponentOverrides {
    map: HashMap<TypeId, BoxedComponent>,
}

impl ComponentOverrides {
    pub fn insert<T: Any + Send + Sync>(&mut self, component: Arc<T>) {
        self.map.insert(TypeId::of::<T>(), component);
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|c| c.clone().downcast::<T>().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The view handed to skills and continuations. Resolution checks the task's
/// overrides first, then falls back to the registry.
pub struct Components<'a> {
    registry: &'a ComponentRegistry,
    overrides: &'a ComponentOverrides,
}

impl<'a> Components<'a> {
    pub fn new(registry: &'a ComponentRegistry, overrides: &'a ComponentOverrides) -> Self {
        Self { registry, overrides }
    }

    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        if let Some(component) = self.overrides.get::<T>() {
            return Ok(component);
        }
        self.registry.resolve::<T>()
    }
}
