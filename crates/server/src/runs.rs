//! Registry of in-flight pipeline runs.
//!
//! A session has at most one run at a time within this process. The guard
//! returned by [`RunRegistry::try_begin`] releases the slot when dropped,
//! including when the run task panics.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the run slot for `session_id`, or `None` if a run holds it.
    pub fn try_begin(&self, session_id: &str) -> Option<RunGuard> {
        let mut active = self.active.lock().unwrap();
        if !active.insert(session_id.to_string()) {
            return None;
        }
        Some(RunGuard {
            registry: self.clone(),
            session_id: session_id.to_string(),
        })
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.active.lock().unwrap().contains(session_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

/// Holds a session's run slot until dropped.
#[derive(Debug)]
pub struct RunGuard {
    registry: RunRegistry,
    session_id: String,
}

impl RunGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap()
            .remove(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_run_per_session() {
        let registry = RunRegistry::new();
        let guard = registry.try_begin("s-1").unwrap();
        assert_eq!(guard.session_id(), "s-1");
        assert!(registry.is_running("s-1"));
        assert!(registry.try_begin("s-1").is_none());

        // Other sessions are independent.
        let other = registry.try_begin("s-2").unwrap();
        assert_eq!(registry.active_count(), 2);

        drop(guard);
        drop(other);
        assert!(!registry.is_running("s-1"));
        assert!(registry.try_begin("s-1").is_some());
    }

    #[tokio::test]
    async fn test_guard_released_when_task_ends() {
        let registry = RunRegistry::new();
        let guard = registry.try_begin("s-1").unwrap();

        tokio::spawn(async move {
            let _guard = guard;
        })
        .await
        .unwrap();

        assert_eq!(registry.active_count(), 0);
    }
}
