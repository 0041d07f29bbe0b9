//! Step registry
//!
//! Maps each [`AnalysisType`] to the step implementing it. Owned by an
//! orchestrator instance; there is no global registry. Registration normally
//! happens once at construction, but the lock allows late registration while
//! executions resolve steps concurrently.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::fs::ProjectReader;

use super::error::RegistryError;
use super::step::AnalysisStep;
use super::types::AnalysisType;

pub struct StepRegistry {
    steps: RwLock<HashMap<AnalysisType, Arc<dyn AnalysisStep>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            steps: RwLock::new(HashMap::new()),
        }
    }

    /// Registry wired with the six reference steps, all reading the project
    /// through the given reader.
    pub fn with_default_steps(reader: Arc<dyn ProjectReader>) -> Self {
        let registry = Self::new();
        for step in crate::steps::default_steps(reader) {
            // Defaults are distinct by construction.
            let _ = registry.register(step);
        }
        registry
    }

    /// Binds a step under its own `analysis_type()`. Fails if the type is
    /// already bound.
    pub fn register(&self, step: Arc<dyn AnalysisStep>) -> Result<(), RegistryError> {
        let analysis_type = step.analysis_type();
        let mut steps = self.steps.write().unwrap_or_else(|e| e.into_inner());
        if steps.contains_key(&analysis_type) {
            return Err(RegistryError::DuplicateRegistration(analysis_type));
        }
        steps.insert(analysis_type, step);
        Ok(())
    }

    pub fn resolve(&self, analysis_type: AnalysisType) -> Result<Arc<dyn AnalysisStep>, RegistryError> {
        let steps = self.steps.read().unwrap_or_else(|e| e.into_inner());
        steps
            .get(&analysis_type)
            .cloned()
            .ok_or(RegistryError::StepNotFound(analysis_type))
    }

    /// Registered types, in the canonical `AnalysisType::all()` order.
    pub fn list(&self) -> Vec<AnalysisType> {
        let steps = self.steps.read().unwrap_or_else(|e| e.into_inner());
        AnalysisType::all()
            .into_iter()
            .filter(|t| steps.contains_key(t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.steps.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
