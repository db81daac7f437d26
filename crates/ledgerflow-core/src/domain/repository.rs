//! Repository traits for the execution engine
//!
//! This module defines the persistence traits the engine runs against.
//! External crates can implement these traits to provide different
//! persistence mechanisms; an in-memory implementation for tests lives
//! behind the `testing` feature.

use async_trait::async_trait;

use super::definition::{WorkflowDefinition, WorkflowId};
use super::instance::{WorkflowInstance, WorkflowInstanceId, WorkflowState};
use crate::EngineError;

/// Repository for workflow definitions
#[async_trait]
pub trait WorkflowDefinitionRepository: Send + Sync {
    /// Find a workflow definition by ID
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<WorkflowDefinition>, EngineError>;

    /// Save a workflow definition
    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), EngineError>;

    /// Delete a workflow definition
    async fn delete(&self, id: &WorkflowId) -> Result<(), EngineError>;

    /// Get all workflow definitions
    async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, EngineError>;
}

/// Repository for workflow instances
///
/// `save_all` is the engine's commit point: every instance touched by
/// one operation is persisted in a single atomic batch, or none are.
/// Implementations check the revision each instance was loaded at and
/// reject the whole batch with `ConcurrentModification` when any
/// stored revision moved on.
#[async_trait]
pub trait WorkflowInstanceRepository: Send + Sync {
    /// Find a workflow instance by ID
    async fn find_by_id(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, EngineError>;

    /// Save a single workflow instance, revision-checked
    async fn save(&self, instance: &WorkflowInstance) -> Result<(), EngineError>;

    /// Atomically save a batch of workflow instances, revision-checked
    async fn save_all(&self, instances: &[&WorkflowInstance]) -> Result<(), EngineError>;

    /// Delete a workflow instance
    async fn delete(&self, id: &WorkflowInstanceId) -> Result<(), EngineError>;

    /// List workflow instances with optional filters
    async fn list_instances(
        &self,
        definition_id: Option<&WorkflowId>,
        state: Option<&WorkflowState>,
    ) -> Result<Vec<WorkflowInstance>, EngineError>;
}

/// Memory implementations for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use dashmap::DashMap;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// In-memory implementation of the workflow definition repository
    pub struct MemoryWorkflowDefinitionRepository {
        definitions: DashMap<String, WorkflowDefinition>,
    }

    impl MemoryWorkflowDefinitionRepository {
        /// Create a new memory workflow definition repository
        pub fn new() -> Self {
            Self {
                definitions: DashMap::with_capacity(16),
            }
        }
    }

    impl Default for MemoryWorkflowDefinitionRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl WorkflowDefinitionRepository for MemoryWorkflowDefinitionRepository {
        async fn find_by_id(
            &self,
            id: &WorkflowId,
        ) -> Result<Option<WorkflowDefinition>, EngineError> {
            Ok(self.definitions.get(&id.0).map(|d| d.clone()))
        }

        async fn save(&self, definition: &WorkflowDefinition) -> Result<(), EngineError> {
            self.definitions
                .insert(definition.id.0.clone(), definition.clone());
            Ok(())
        }

        async fn delete(&self, id: &WorkflowId) -> Result<(), EngineError> {
            self.definitions.remove(&id.0);
            Ok(())
        }

        async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, EngineError> {
            Ok(self.definitions.iter().map(|d| d.clone()).collect())
        }
    }

    /// In-memory implementation of the workflow instance repository.
    ///
    /// A single map-wide lock makes `save_all` atomic: revisions are
    /// checked and instances committed under one write guard.
    pub struct MemoryWorkflowInstanceRepository {
        instances: RwLock<HashMap<String, WorkflowInstance>>,
    }

    impl MemoryWorkflowInstanceRepository {
        /// Create a new memory workflow instance repository
        pub fn new() -> Self {
            Self {
                instances: RwLock::new(HashMap::new()),
            }
        }
    }

    impl Default for MemoryWorkflowInstanceRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl WorkflowInstanceRepository for MemoryWorkflowInstanceRepository {
        async fn find_by_id(
            &self,
            id: &WorkflowInstanceId,
        ) -> Result<Option<WorkflowInstance>, EngineError> {
            let instances = self.instances.read().map_err(|e| {
                EngineError::StateStoreError(format!("Failed to acquire read lock: {}", e))
            })?;

            Ok(instances.get(&id.0).cloned())
        }

        async fn save(&self, instance: &WorkflowInstance) -> Result<(), EngineError> {
            self.save_all(&[instance]).await
        }

        async fn save_all(&self, batch: &[&WorkflowInstance]) -> Result<(), EngineError> {
            let mut instances = self.instances.write().map_err(|e| {
                EngineError::StateStoreError(format!("Failed to acquire write lock: {}", e))
            })?;

            // Check every revision before committing anything
            for instance in batch {
                if let Some(stored) = instances.get(&instance.id.0) {
                    if stored.revision != instance.revision {
                        return Err(EngineError::ConcurrentModification(instance.id.0.clone()));
                    }
                }
            }

            for instance in batch {
                let mut committed = (*instance).clone();
                committed.revision += 1;
                instances.insert(committed.id.0.clone(), committed);
            }

            Ok(())
        }

        async fn delete(&self, id: &WorkflowInstanceId) -> Result<(), EngineError> {
            let mut instances = self.instances.write().map_err(|e| {
                EngineError::StateStoreError(format!("Failed to acquire write lock: {}", e))
            })?;

            instances.remove(&id.0);

            Ok(())
        }

        async fn list_instances(
            &self,
            definition_id: Option<&WorkflowId>,
            state: Option<&WorkflowState>,
        ) -> Result<Vec<WorkflowInstance>, EngineError> {
            let instances = self.instances.read().map_err(|e| {
                EngineError::StateStoreError(format!("Failed to acquire read lock: {}", e))
            })?;

            let result = instances
                .values()
                .filter(|i| definition_id.map_or(true, |d| &i.definition_id == d))
                .filter(|i| state.map_or(true, |s| &i.state == s))
                .cloned()
                .collect();

            Ok(result)
        }
    }

}
