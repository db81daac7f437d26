//! Application layer: services driving the domain model

pub mod definition_service;
pub mod dispatch;
pub mod workflow_service;

pub use definition_service::{DefinitionService, WorkflowInstanceSummary};
pub use dispatch::{Directive, ExecutionContext, InteractionContext, InteractionKind};
pub use workflow_service::{
    DomainEventHandler, LogEventHandler, StartRequest, StepReport, WorkflowService,
};
