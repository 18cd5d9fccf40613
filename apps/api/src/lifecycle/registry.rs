use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::lifecycle::state::Subject;
use crate::lifecycle::{AnalysisLifecycle, LifecycleContext};

/// Hands out one lifecycle per subject record. Instances never share state.
pub struct LifecycleRegistry {
    context: LifecycleContext,
    instances: Mutex<HashMap<Subject, Arc<AnalysisLifecycle>>>,
}

impl LifecycleRegistry {
    pub fn new(context: LifecycleContext) -> Self {
        Self {
            context,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, subject: &Subject) -> Arc<AnalysisLifecycle> {
        let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        instances
            .entry(subject.clone())
            .or_insert_with(|| {
                debug!(subject = %subject.id, kind = %subject.kind, "creating lifecycle");
                Arc::new(AnalysisLifecycle::new(subject.clone(), self.context.clone()))
            })
            .clone()
    }

    pub fn get(&self, subject: &Subject) -> Option<Arc<AnalysisLifecycle>> {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subject)
            .cloned()
    }

    /// Drops the lifecycle for `subject`. Holders of an `Arc` keep a working
    /// instance; the next `get_or_create` starts a fresh one.
    pub fn remove(&self, subject: &Subject) -> Option<Arc<AnalysisLifecycle>> {
        let removed = self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(subject);
        if removed.is_some() {
            debug!(subject = %subject.id, kind = %subject.kind, "dropping lifecycle");
        }
        removed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
