use agentry_core::{Error, ErrorKind};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// What the exception handlers see when a task instance fails.
#[derive(Debug)]
pub struct TaskFailure {
    pub task_id: Uuid,
    pub task_type: String,
    /// The skill that raised, when the failure happened inside the chain.
    pub skill: Option<String>,
    pub error: Error,
}

type HandlerFn = Arc<dyn Fn(&TaskFailure) + Send + Sync>;

/// Per-agent list of failure callbacks, each optionally filtered by error
/// kind. This is the only recovery path the runtime exposes; there is no
/// retry or backoff.
#[derive(Default)]
pub struct ExceptionHandlers {
    handlers: Vec<(Option<Vec<ErrorKind>>, HandlerFn)>,
}

impl ExceptionHandlers {
    /// Register a callback invoked for every failure.
    pub fn add<F>(&mut self, callback: F)
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.handlers.push((None, Arc::new(callback)));
    }

    /// Register a callback invoked only for failures of the given kinds.
    pub fn add_for<F>(&mut self, kinds: &[ErrorKind], callback: F)
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.handlers.push((Some(kinds.to_vec()), Arc::new(callback)));
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every matching handler. A panicking handler is logged and dropped
    /// so one bad observer cannot take down the rest.
    pub fn dispatch(&self, failure: &TaskFailure) {
        if self.handlers.is_empty() {
            error!(
                task_type = %failure.task_type,
                task_id = %failure.task_id,
                error = %failure.error,
                "Task failed with no exception handlers registered"
            );
            return;
        }
        let kind = failure.error.kind();
        for (filter, handler) in &self.handlers {
            let matches = match filter {
                Some(kinds) => kinds.contains(&kind),
                None => true,
            };
            if !matches {
                continue;
            }
            if std::panic::catch_unwind(AssertUnwindSafe(|| handler(failure))).is_err() {
                error!(
                    task_type = %failure.task_type,
                    task_id = %failure.task_id,
                    "Exception handler panicked; dropping"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failure(error: Error) -> TaskFailure {
        TaskFailure {
            task_id: Uuid::new_v4(),
            task_type: "t".to_string(),
            skill: None,
            error,
        }
    }

    #[test]
    fn test_unfiltered_handler_sees_everything() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut handlers = ExceptionHandlers::default();
        let h = hits.clone();
        handlers.add(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        handlers.dispatch(&failure(Error::Skill("boom".to_string())));
        handlers.dispatch(&failure(Error::UnknownTask("t".to_string())));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_filtered_handler_only_matching_kinds() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut handlers = ExceptionHandlers::default();
        let h = hits.clone();
        handlers.add_for(&[ErrorKind::Skill], move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        handlers.dispatch(&failure(Error::Skill("boom".to_string())));
        handlers.dispatch(&failure(Error::UnknownTask("t".to_string())));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut handlers = ExceptionHandlers::default();
        handlers.add(|_| panic!("bad handler"));
        let h = hits.clone();
        handlers.add(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        handlers.dispatch(&failure(Error::Skill("boom".to_string())));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
