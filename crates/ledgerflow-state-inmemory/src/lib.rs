//! In-memory state store implementation for the Ledgerflow engine
//!
//! This crate provides in-memory implementations of the repository
//! interfaces defined in the ledgerflow-core crate. It is primarily
//! useful for development, testing, and simple deployments where
//! persistence is not required.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{InMemoryWorkflowDefinitionRepository, InMemoryWorkflowInstanceRepository};

use ledgerflow_core::domain::definition::WorkflowDefinition;
use ledgerflow_core::domain::instance::WorkflowInstance;
use ledgerflow_core::domain::repository::{
    WorkflowDefinitionRepository, WorkflowInstanceRepository,
};

/// Provider for in-memory state store repositories
pub struct InMemoryStateStoreProvider {
    definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,
    instances: Arc<RwLock<HashMap<String, WorkflowInstance>>>,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self {
            definitions: Arc::new(RwLock::new(HashMap::new())),
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create repositories sharing this provider's storage
    pub fn create_repositories(
        &self,
    ) -> (
        Arc<dyn WorkflowDefinitionRepository>,
        Arc<dyn WorkflowInstanceRepository>,
    ) {
        (
            Arc::new(InMemoryWorkflowDefinitionRepository::new(
                self.definitions.clone(),
            )),
            Arc::new(InMemoryWorkflowInstanceRepository::new(
                self.instances.clone(),
            )),
        )
    }
}

impl Default for InMemoryStateStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
