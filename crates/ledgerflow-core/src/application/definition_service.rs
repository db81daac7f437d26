//! Service for managing workflow definitions

use crate::{
    domain::definition::{WorkflowDefinition, WorkflowId},
    domain::instance::{WorkflowInstanceId, WorkflowState},
    domain::repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository},
    EngineError,
};
use std::sync::Arc;

/// Summary of a workflow instance for listing purposes
#[derive(Debug, Clone)]
pub struct WorkflowInstanceSummary {
    /// The instance ID
    pub id: String,

    /// The workflow definition ID
    pub definition_id: String,

    /// Current state, rendered as a string
    pub state: String,

    /// Creation timestamp, RFC 3339
    pub created_at: String,

    /// Last updated timestamp, RFC 3339
    pub updated_at: String,
}

/// Service for registering and inspecting workflow definitions
pub struct DefinitionService {
    definition_repo: Arc<dyn WorkflowDefinitionRepository>,
    instance_repo: Arc<dyn WorkflowInstanceRepository>,
}

impl DefinitionService {
    /// Create a new definition service
    pub fn new(
        definition_repo: Arc<dyn WorkflowDefinitionRepository>,
        instance_repo: Arc<dyn WorkflowInstanceRepository>,
    ) -> Self {
        Self {
            definition_repo,
            instance_repo,
        }
    }

    /// Register a workflow definition
    pub async fn register(&self, definition: WorkflowDefinition) -> Result<(), EngineError> {
        definition.validate()?;
        self.definition_repo.save(&definition).await?;

        tracing::info!(
            workflow_id = %definition.id.0,
            steps = definition.steps.len(),
            "Registered workflow definition"
        );

        Ok(())
    }

    /// Get a workflow definition by ID
    pub async fn get(&self, id: &WorkflowId) -> Result<Option<WorkflowDefinition>, EngineError> {
        self.definition_repo.find_by_id(id).await
    }

    /// List all registered definitions, ordered by their sequence
    pub async fn list(&self) -> Result<Vec<WorkflowDefinition>, EngineError> {
        let mut definitions = self.definition_repo.find_all().await?;
        definitions.sort_by_key(|d| d.sequence);
        Ok(definitions)
    }

    /// Remove a workflow definition.
    ///
    /// Refused while any non-terminal instance of it still exists.
    pub async fn retire(&self, id: &WorkflowId) -> Result<(), EngineError> {
        let pending_active = self
            .instance_repo
            .list_instances(Some(id), Some(&WorkflowState::Active))
            .await?;
        let pending_draft = self
            .instance_repo
            .list_instances(Some(id), Some(&WorkflowState::Draft))
            .await?;
        let pending = pending_active.len() + pending_draft.len();
        if pending > 0 {
            return Err(EngineError::ValidationError(format!(
                "Cannot retire workflow definition {}: {} instances still pending",
                id.0, pending
            )));
        }

        self.definition_repo.delete(id).await?;

        tracing::info!(workflow_id = %id.0, "Retired workflow definition");

        Ok(())
    }

    /// Get the full state of a workflow instance as JSON
    pub async fn get_instance_state(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<serde_json::Value>, EngineError> {
        let instance = self.instance_repo.find_by_id(id).await?;

        match instance {
            Some(instance) => Ok(Some(serde_json::to_value(instance)?)),
            None => Ok(None),
        }
    }

    /// List workflow instances with optional filters
    pub async fn list_instances(
        &self,
        definition_id: Option<&WorkflowId>,
        state: Option<&WorkflowState>,
    ) -> Result<Vec<WorkflowInstanceSummary>, EngineError> {
        let instances = self
            .instance_repo
            .list_instances(definition_id, state)
            .await?;

        Ok(instances
            .into_iter()
            .map(|instance| WorkflowInstanceSummary {
                id: instance.id.0,
                definition_id: instance.definition_id.0,
                state: format!("{:?}", instance.state),
                created_at: instance.created_at.to_rfc3339(),
                updated_at: instance.updated_at.to_rfc3339(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::definition::{ActionKind, StepDefinition};
    use crate::domain::instance::WorkflowInstance;
    use crate::domain::repository::memory::{
        MemoryWorkflowDefinitionRepository, MemoryWorkflowInstanceRepository,
    };
    use crate::types::{ContextKey, Counterparty};

    fn create_test_definition(id: &str, sequence: i32) -> WorkflowDefinition {
        WorkflowDefinition {
            id: WorkflowId(id.to_string()),
            name: id.to_string(),
            sequence,
            steps: vec![StepDefinition {
                id: "only".to_string(),
                name: "Only".to_string(),
                automatic: true,
                requires_different_counterparty: false,
                kind: ActionKind::Info,
            }],
            allow_external_trigger: false,
            sub_workflow_only: false,
        }
    }

    fn service() -> (
        DefinitionService,
        Arc<MemoryWorkflowDefinitionRepository>,
        Arc<MemoryWorkflowInstanceRepository>,
    ) {
        let definition_repo = Arc::new(MemoryWorkflowDefinitionRepository::new());
        let instance_repo = Arc::new(MemoryWorkflowInstanceRepository::new());
        let service = DefinitionService::new(definition_repo.clone(), instance_repo.clone());
        (service, definition_repo, instance_repo)
    }

    #[tokio::test]
    async fn test_register_and_list_ordered_by_sequence() {
        let (service, _, _) = service();

        service
            .register(create_test_definition("late", 20))
            .await
            .unwrap();
        service
            .register(create_test_definition("early", 10))
            .await
            .unwrap();

        let definitions = service.list().await.unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].id.0, "early");
        assert_eq!(definitions[1].id.0, "late");
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_definition() {
        let (service, _, _) = service();
        let mut definition = create_test_definition("broken", 10);
        definition.steps.clear();

        let result = service.register(definition).await;
        assert!(matches!(result, Err(EngineError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_retire_refused_while_instances_pending() {
        let (service, _, instance_repo) = service();
        let definition = create_test_definition("refund", 10);
        service.register(definition.clone()).await.unwrap();

        let mut instance =
            WorkflowInstance::new(definition.id.clone(), ContextKey("co-a".to_string()));
        instance.counterparty = Some(Counterparty("partner-1".to_string()));
        instance.start(&definition).unwrap();
        instance_repo.save(&instance).await.unwrap();

        let result = service.retire(&definition.id).await;
        assert!(matches!(result, Err(EngineError::ValidationError(_))));
        assert!(service.get(&definition.id).await.unwrap().is_some());

        // Terminal instances do not block retirement
        let mut instance = instance_repo.find_by_id(&instance.id).await.unwrap().unwrap();
        instance.cancel();
        instance_repo.save(&instance).await.unwrap();

        service.retire(&definition.id).await.unwrap();
        assert!(service.get(&definition.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_instances_and_state_snapshot() {
        let (service, _, instance_repo) = service();
        let definition = create_test_definition("refund", 10);
        service.register(definition.clone()).await.unwrap();

        let mut instance =
            WorkflowInstance::new(definition.id.clone(), ContextKey("co-a".to_string()));
        instance.counterparty = Some(Counterparty("partner-1".to_string()));
        instance.start(&definition).unwrap();
        instance_repo.save(&instance).await.unwrap();

        let summaries = service
            .list_instances(Some(&definition.id), None)
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, instance.id.0);
        assert_eq!(summaries[0].state, "Active");

        let state = service
            .get_instance_state(&instance.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state["definition_id"], serde_json::json!("refund"));

        assert!(service
            .get_instance_state(&WorkflowInstanceId("missing".to_string()))
            .await
            .unwrap()
            .is_none());
    }
}
