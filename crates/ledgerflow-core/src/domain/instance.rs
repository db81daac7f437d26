use crate::domain::definition::{StepDefinition, WorkflowDefinition, WorkflowId};
use crate::domain::events::{
    DomainEvent, StepCancelled, StepCompleted, WorkflowCancelled, WorkflowCompleted,
    WorkflowStarted,
};
use crate::types::{ContextKey, Counterparty, CurrencyCode, DocumentRef, OriginRef};
use crate::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value object: Workflow instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowInstanceId(pub String);

/// Value object: Step instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepInstanceId(pub String);

/// Fully-qualified reference to one step instance.
///
/// Chain links use this form because predecessor and successor may
/// live on a different workflow instance after delegation splicing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepRef {
    /// The workflow instance the step belongs to
    pub instance: WorkflowInstanceId,

    /// The step instance within that workflow instance
    pub step: StepInstanceId,
}

/// Workflow instance lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    /// Created, chain not materialized yet
    Draft,

    /// Running, at least one step not terminal
    Active,

    /// Every step reached a terminal state through completion
    Completed,

    /// Abandoned, remaining steps cancelled
    Cancelled,
}

/// Step instance lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    /// Not yet eligible, a predecessor is still pending
    Waiting,

    /// Eligible to execute
    Ready,

    /// Execution started, awaiting an external result or a nested workflow
    InProgress,

    /// Executed successfully
    Done,

    /// Abandoned
    Cancelled,
}

impl StepState {
    /// Whether the step can no longer change state
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Done | StepState::Cancelled)
    }
}

/// One materialized step on a workflow instance's chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInstance {
    /// Unique identifier
    pub id: StepInstanceId,

    /// Frozen copy of the step definition this step was built from
    pub definition: StepDefinition,

    /// Current state
    pub state: StepState,

    /// Backward chain link, possibly crossing into another instance
    pub predecessor: Option<StepRef>,

    /// Forward chain link, possibly crossing into another instance
    pub successor: Option<StepRef>,

    /// Document produced by this step, if any
    pub document: Option<DocumentRef>,

    /// Nested workflow instance this step delegated to, if any
    pub delegated_workflow: Option<WorkflowInstanceId>,
}

impl StepInstance {
    /// Promote the step from Waiting to Ready
    pub fn promote(&mut self) -> Result<(), EngineError> {
        if self.state != StepState::Waiting {
            return Err(EngineError::ValidationError(format!(
                "Cannot promote step {} in state {:?}",
                self.id.0, self.state
            )));
        }
        self.state = StepState::Ready;
        Ok(())
    }

    /// Move the step from Ready to InProgress
    pub fn begin(&mut self) -> Result<(), EngineError> {
        if self.state != StepState::Ready {
            return Err(EngineError::ValidationError(format!(
                "Cannot begin step {} in state {:?}",
                self.id.0, self.state
            )));
        }
        self.state = StepState::InProgress;
        Ok(())
    }
}

/// Aggregate: Workflow instance
///
/// Owns its step chain. Every state change goes through a guarded
/// method so invalid transitions surface as errors instead of
/// corrupting the chain.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique identifier
    pub id: WorkflowInstanceId,

    /// Workflow definition ID
    pub definition_id: WorkflowId,

    /// Current state
    pub state: WorkflowState,

    /// Operating context (company / ledger scope) this instance runs under
    pub context: ContextKey,

    /// Counterparty the operation concerns
    pub counterparty: Option<Counterparty>,

    /// Alternative counterparty for steps that act on behalf of a
    /// different party
    pub alt_counterparty: Option<Counterparty>,

    /// Currency of the operation
    pub currency: Option<CurrencyCode>,

    /// Monetary amount of the operation
    pub amount: Option<f64>,

    /// Reference to the originating bank movement, if any
    pub origin: Option<OriginRef>,

    /// Free-form reference carried onto created documents
    pub reference: Option<String>,

    /// The delegating step on the parent instance, when this instance
    /// was created through delegation
    pub parent_step: Option<StepRef>,

    /// Materialized step chain, in definition order
    pub steps: Vec<StepInstance>,

    /// Optimistic concurrency revision, bumped by the store on commit
    pub revision: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Domain events
    #[serde(skip)]
    pub events: Vec<Box<dyn DomainEvent>>,
}

// Manually implement Clone because domain events are not cloneable
impl Clone for WorkflowInstance {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            definition_id: self.definition_id.clone(),
            state: self.state,
            context: self.context.clone(),
            counterparty: self.counterparty.clone(),
            alt_counterparty: self.alt_counterparty.clone(),
            currency: self.currency.clone(),
            amount: self.amount,
            origin: self.origin.clone(),
            reference: self.reference.clone(),
            parent_step: self.parent_step.clone(),
            steps: self.steps.clone(),
            revision: self.revision,
            created_at: self.created_at,
            updated_at: self.updated_at,
            events: Vec::new(), // We don't clone domain events
        }
    }
}

impl WorkflowInstance {
    /// Create a new workflow instance in Draft state
    pub fn new(definition_id: WorkflowId, context: ContextKey) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowInstanceId(Uuid::new_v4().to_string()),
            definition_id,
            state: WorkflowState::Draft,
            context,
            counterparty: None,
            alt_counterparty: None,
            currency: None,
            amount: None,
            origin: None,
            reference: None,
            parent_step: None,
            steps: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
            events: Vec::with_capacity(8),
        }
    }

    /// Materialize the step chain from the definition and activate the
    /// instance.
    ///
    /// No-op when the instance is already past Draft, so the call is
    /// idempotent under retries.
    pub fn start(&mut self, definition: &WorkflowDefinition) -> Result<(), EngineError> {
        if self.state != WorkflowState::Draft {
            return Ok(());
        }

        if self.counterparty.is_none() {
            return Err(EngineError::MissingCounterparty(self.id.0.clone()));
        }

        self.build_chain(definition);
        self.state = WorkflowState::Active;
        self.update_timestamp();

        self.record_event(Box::new(WorkflowStarted {
            workflow_instance_id: self.id.clone(),
            workflow_id: self.definition_id.clone(),
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// Build the step chain: one step instance per definition entry, in
    /// definition order, linked both ways. The first step starts Ready,
    /// the rest Waiting.
    fn build_chain(&mut self, definition: &WorkflowDefinition) {
        let ids: Vec<StepInstanceId> = definition
            .steps
            .iter()
            .map(|_| StepInstanceId(Uuid::new_v4().to_string()))
            .collect();

        self.steps = definition
            .steps
            .iter()
            .enumerate()
            .map(|(i, step_def)| StepInstance {
                id: ids[i].clone(),
                definition: step_def.clone(),
                state: if i == 0 {
                    StepState::Ready
                } else {
                    StepState::Waiting
                },
                predecessor: (i > 0).then(|| StepRef {
                    instance: self.id.clone(),
                    step: ids[i - 1].clone(),
                }),
                successor: (i + 1 < ids.len()).then(|| StepRef {
                    instance: self.id.clone(),
                    step: ids[i + 1].clone(),
                }),
                document: None,
                delegated_workflow: None,
            })
            .collect();
    }

    /// Complete the instance
    pub fn complete(&mut self) -> Result<(), EngineError> {
        if self.state != WorkflowState::Active {
            return Err(EngineError::ValidationError(format!(
                "Cannot complete workflow instance {} in state {:?}",
                self.id.0, self.state
            )));
        }

        self.state = WorkflowState::Completed;
        self.update_timestamp();

        self.record_event(Box::new(WorkflowCompleted {
            workflow_instance_id: self.id.clone(),
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// Cancel the instance and every non-terminal step on its chain.
    ///
    /// Already-terminal steps keep their state; a Done step stays Done.
    /// Calling this on an already-terminal instance is a no-op.
    pub fn cancel(&mut self) {
        if matches!(
            self.state,
            WorkflowState::Completed | WorkflowState::Cancelled
        ) {
            return;
        }

        self.state = WorkflowState::Cancelled;
        self.update_timestamp();

        let instance_id = self.id.clone();
        for step in &mut self.steps {
            if !step.state.is_terminal() {
                step.state = StepState::Cancelled;
                self.events.push(Box::new(StepCancelled {
                    workflow_instance_id: instance_id.clone(),
                    step_id: step.id.clone(),
                    timestamp: Utc::now(),
                }));
            }
        }

        self.record_event(Box::new(WorkflowCancelled {
            workflow_instance_id: instance_id,
            timestamp: Utc::now(),
        }));
    }

    /// Mark a step Done and attach the document it produced.
    ///
    /// Chain propagation (promoting the successor, completing the
    /// instance) is the execution service's job; this only handles the
    /// local transition.
    pub fn finish_step(
        &mut self,
        step_id: &StepInstanceId,
        document: Option<DocumentRef>,
    ) -> Result<(), EngineError> {
        let instance_id = self.id.clone();
        let step = self.step_mut(step_id)?;

        if !matches!(step.state, StepState::Ready | StepState::InProgress) {
            return Err(EngineError::ValidationError(format!(
                "Cannot finish step {} in state {:?}",
                step.id.0, step.state
            )));
        }

        step.state = StepState::Done;
        if document.is_some() {
            step.document = document.clone();
        }
        let step_id = step.id.clone();
        self.update_timestamp();

        self.record_event(Box::new(StepCompleted {
            workflow_instance_id: instance_id,
            step_id,
            document,
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// Look up a step by ID
    pub fn step(&self, step_id: &StepInstanceId) -> Result<&StepInstance, EngineError> {
        self.steps
            .iter()
            .find(|s| &s.id == step_id)
            .ok_or_else(|| EngineError::StepNotFound {
                instance: self.id.0.clone(),
                step: step_id.0.clone(),
            })
    }

    /// Look up a step by ID, mutably
    pub fn step_mut(&mut self, step_id: &StepInstanceId) -> Result<&mut StepInstance, EngineError> {
        let instance_id = self.id.0.clone();
        self.steps
            .iter_mut()
            .find(|s| &s.id == step_id)
            .ok_or_else(|| EngineError::StepNotFound {
                instance: instance_id,
                step: step_id.0.clone(),
            })
    }

    /// First step currently InProgress, if any
    #[inline]
    pub fn in_progress_step(&self) -> Option<&StepInstance> {
        self.steps.iter().find(|s| s.state == StepState::InProgress)
    }

    /// First step currently Ready, if any
    #[inline]
    pub fn ready_step(&self) -> Option<&StepInstance> {
        self.steps.iter().find(|s| s.state == StepState::Ready)
    }

    /// Whether any step on the chain runs on behalf of a different
    /// counterparty
    #[inline]
    pub fn needs_alt_counterparty(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.definition.requires_different_counterparty)
    }

    /// Update the timestamp
    #[inline]
    pub fn update_timestamp(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record a domain event
    #[inline]
    pub fn record_event(&mut self, event: Box<dyn DomainEvent>) {
        self.events.push(event);
    }

    /// Drain the recorded domain events
    pub fn take_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }
}
