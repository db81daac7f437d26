use crate::InMemoryStateStoreProvider;
use ledgerflow_core::domain::definition::{
    ActionKind, StepDefinition, WorkflowDefinition, WorkflowId,
};
use ledgerflow_core::domain::instance::{WorkflowInstance, WorkflowState};
use ledgerflow_core::types::{ContextKey, Counterparty};
use ledgerflow_core::EngineError;

fn test_definition(id: &str) -> WorkflowDefinition {
    WorkflowDefinition {
        id: WorkflowId(id.to_string()),
        name: id.to_string(),
        sequence: 10,
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

fn test_instance(definition_id: &str) -> WorkflowInstance {
    let def = test_definition(definition_id);
    let mut instance = WorkflowInstance::new(def.id.clone(), ContextKey("co-a".to_string()));
    instance.counterparty = Some(Counterparty("partner-1".to_string()));
    instance.start(&def).unwrap();
    instance
}

#[tokio::test]
async fn test_definition_repository_roundtrip() {
    let provider = InMemoryStateStoreProvider::new();
    let (definitions, _) = provider.create_repositories();

    let def = test_definition("refund");
    definitions.save(&def).await.unwrap();

    let found = definitions.find_by_id(&def.id).await.unwrap().unwrap();
    assert_eq!(found.id, def.id);
    assert_eq!(found.steps.len(), 1);

    definitions.delete(&def.id).await.unwrap();
    assert!(definitions.find_by_id(&def.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_repositories_share_provider_storage() {
    let provider = InMemoryStateStoreProvider::new();
    let (_, first) = provider.create_repositories();
    let (_, second) = provider.create_repositories();

    let instance = test_instance("refund");
    first.save(&instance).await.unwrap();

    let found = second.find_by_id(&instance.id).await.unwrap();
    assert!(found.is_some());
}

#[tokio::test]
async fn test_save_bumps_revision() {
    let provider = InMemoryStateStoreProvider::new();
    let (_, instances) = provider.create_repositories();

    let instance = test_instance("refund");
    instances.save(&instance).await.unwrap();

    let stored = instances.find_by_id(&instance.id).await.unwrap().unwrap();
    assert_eq!(stored.revision, 1);

    instances.save(&stored).await.unwrap();
    let stored = instances.find_by_id(&instance.id).await.unwrap().unwrap();
    assert_eq!(stored.revision, 2);
}

#[tokio::test]
async fn test_stale_writer_is_rejected() {
    let provider = InMemoryStateStoreProvider::new();
    let (_, instances) = provider.create_repositories();

    let instance = test_instance("refund");
    instances.save(&instance).await.unwrap();

    // The original snapshot is now one revision behind
    let result = instances.save(&instance).await;
    assert!(matches!(
        result,
        Err(EngineError::ConcurrentModification(_))
    ));
}

#[tokio::test]
async fn test_save_all_rolls_back_on_conflict() {
    let provider = InMemoryStateStoreProvider::new();
    let (_, instances) = provider.create_repositories();

    let fresh = test_instance("refund");
    let stale = test_instance("refund");
    instances.save(&stale).await.unwrap();

    let result = instances.save_all(&[&fresh, &stale]).await;
    assert!(matches!(
        result,
        Err(EngineError::ConcurrentModification(_))
    ));

    // Nothing from the failed batch was committed
    assert!(instances.find_by_id(&fresh.id).await.unwrap().is_none());
    let untouched = instances.find_by_id(&stale.id).await.unwrap().unwrap();
    assert_eq!(untouched.revision, 1);
}

#[tokio::test]
async fn test_list_instances_filters() {
    let provider = InMemoryStateStoreProvider::new();
    let (_, instances) = provider.create_repositories();

    let active = test_instance("refund");
    let mut cancelled = test_instance("dispute");
    cancelled.cancel();

    instances.save(&active).await.unwrap();
    instances.save(&cancelled).await.unwrap();

    let all = instances.list_instances(None, None).await.unwrap();
    assert_eq!(all.len(), 2);

    let refunds = instances
        .list_instances(Some(&WorkflowId("refund".to_string())), None)
        .await
        .unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].id, active.id);

    let cancelled_only = instances
        .list_instances(None, Some(&WorkflowState::Cancelled))
        .await
        .unwrap();
    assert_eq!(cancelled_only.len(), 1);
    assert_eq!(cancelled_only[0].id, cancelled.id);
}
