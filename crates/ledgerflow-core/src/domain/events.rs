use crate::domain::instance::{StepInstanceId, WorkflowInstanceId};
use crate::domain::WorkflowId;
use crate::types::{ContextKey, DocumentRef};
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Domain event trait for all events in the system
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the workflow instance ID this event is associated with
    fn workflow_instance_id(&self) -> &WorkflowInstanceId;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Event: Workflow instance started
#[derive(Debug)]
pub struct WorkflowStarted {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// The identifier of the workflow definition
    pub workflow_id: WorkflowId,

    /// The timestamp when the instance was started
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for WorkflowStarted {
    fn event_type(&self) -> &'static str {
        "workflow_instance.started"
    }

    fn workflow_instance_id(&self) -> &WorkflowInstanceId {
        &self.workflow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Workflow instance completed
#[derive(Debug)]
pub struct WorkflowCompleted {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for WorkflowCompleted {
    fn event_type(&self) -> &'static str {
        "workflow_instance.completed"
    }

    fn workflow_instance_id(&self) -> &WorkflowInstanceId {
        &self.workflow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Workflow instance cancelled
#[derive(Debug)]
pub struct WorkflowCancelled {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for WorkflowCancelled {
    fn event_type(&self) -> &'static str {
        "workflow_instance.cancelled"
    }

    fn workflow_instance_id(&self) -> &WorkflowInstanceId {
        &self.workflow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Workflow instance delegated part of its work to a nested instance
#[derive(Debug)]
pub struct WorkflowDelegated {
    /// The unique identifier of the delegating workflow instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// The identifier of the delegating step
    pub step_id: StepInstanceId,

    /// The identifier of the nested workflow instance
    pub delegated_instance_id: WorkflowInstanceId,

    /// The operating context the nested instance runs under
    pub target_context: ContextKey,

    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for WorkflowDelegated {
    fn event_type(&self) -> &'static str {
        "workflow_instance.delegated"
    }

    fn workflow_instance_id(&self) -> &WorkflowInstanceId {
        &self.workflow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Step completed
#[derive(Debug)]
pub struct StepCompleted {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// The identifier of the step that completed
    pub step_id: StepInstanceId,

    /// The document the step produced, if any
    pub document: Option<DocumentRef>,

    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for StepCompleted {
    fn event_type(&self) -> &'static str {
        "step.completed"
    }

    fn workflow_instance_id(&self) -> &WorkflowInstanceId {
        &self.workflow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Step cancelled
#[derive(Debug)]
pub struct StepCancelled {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// The identifier of the step that was cancelled
    pub step_id: StepInstanceId,

    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for StepCancelled {
    fn event_type(&self) -> &'static str {
        "step.cancelled"
    }

    fn workflow_instance_id(&self) -> &WorkflowInstanceId {
        &self.workflow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
