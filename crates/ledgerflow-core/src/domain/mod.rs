//! Domain layer: definitions, instances, events, repositories

pub mod definition;
pub mod events;
pub mod instance;
pub mod repository;

pub use definition::{ActionKind, StepDefinition, WorkflowDefinition, WorkflowId};
pub use events::DomainEvent;
pub use instance::{
    StepInstance, StepInstanceId, StepRef, StepState, WorkflowInstance, WorkflowInstanceId,
    WorkflowState,
};
pub use repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository};
