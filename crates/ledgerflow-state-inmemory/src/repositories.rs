use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use ledgerflow_core::{
    domain::definition::{WorkflowDefinition, WorkflowId},
    domain::instance::{WorkflowInstance, WorkflowInstanceId, WorkflowState},
    domain::repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository},
    EngineError,
};

/// In-memory implementation of the WorkflowDefinitionRepository
pub struct InMemoryWorkflowDefinitionRepository {
    definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,
}

impl InMemoryWorkflowDefinitionRepository {
    /// Create a new in-memory workflow definition repository over a
    /// shared map
    pub fn new(definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>) -> Self {
        Self { definitions }
    }
}

#[async_trait]
impl WorkflowDefinitionRepository for InMemoryWorkflowDefinitionRepository {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<WorkflowDefinition>, EngineError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(&id.0).cloned())
    }

    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), EngineError> {
        let mut definitions = self.definitions.write().await;
        definitions.insert(definition.id.0.clone(), definition.clone());
        debug!(workflow_id = %definition.id.0, "Saved workflow definition");
        Ok(())
    }

    async fn delete(&self, id: &WorkflowId) -> Result<(), EngineError> {
        let mut definitions = self.definitions.write().await;
        definitions.remove(&id.0);
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, EngineError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.values().cloned().collect())
    }
}

/// In-memory implementation of the WorkflowInstanceRepository.
///
/// The whole instance map sits behind one async RwLock, which makes
/// `save_all` genuinely atomic: revisions are verified and the batch
/// committed without releasing the write guard in between.
pub struct InMemoryWorkflowInstanceRepository {
    instances: Arc<RwLock<HashMap<String, WorkflowInstance>>>,
}

impl InMemoryWorkflowInstanceRepository {
    /// Create a new in-memory workflow instance repository over a
    /// shared map
    pub fn new(instances: Arc<RwLock<HashMap<String, WorkflowInstance>>>) -> Self {
        Self { instances }
    }
}

#[async_trait]
impl WorkflowInstanceRepository for InMemoryWorkflowInstanceRepository {
    async fn find_by_id(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, EngineError> {
        let instances = self.instances.read().await;
        Ok(instances.get(&id.0).cloned())
    }

    async fn save(&self, instance: &WorkflowInstance) -> Result<(), EngineError> {
        self.save_all(&[instance]).await
    }

    async fn save_all(&self, batch: &[&WorkflowInstance]) -> Result<(), EngineError> {
        let mut instances = self.instances.write().await;

        // Verify every revision before committing anything
        for instance in batch {
            if let Some(stored) = instances.get(&instance.id.0) {
                if stored.revision != instance.revision {
                    debug!(
                        workflow_instance_id = %instance.id.0,
                        stored_revision = stored.revision,
                        loaded_revision = instance.revision,
                        "Rejecting stale batch"
                    );
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
        let mut instances = self.instances.write().await;
        instances.remove(&id.0);
        Ok(())
    }

    async fn list_instances(
        &self,
        definition_id: Option<&WorkflowId>,
        state: Option<&WorkflowState>,
    ) -> Result<Vec<WorkflowInstance>, EngineError> {
        let instances = self.instances.read().await;

        let result = instances
            .values()
            .filter(|instance| match definition_id {
                Some(definition_id) => instance.definition_id == *definition_id,
                None => true,
            })
            .filter(|instance| match state {
                Some(state) => instance.state == *state,
                None => true,
            })
            .cloned()
            .collect();

        Ok(result)
    }
}
