//! Dispatch outcomes and execution context for the advance operation

use crate::domain::instance::{StepRef, WorkflowInstanceId};
use crate::types::{ContextKey, Counterparty, CurrencyCode, DocumentRef, OriginRef, TemplateRef};
use serde::{Deserialize, Serialize};

/// Caller-supplied context for one advance call
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Operating context the caller acts under
    pub operating_context: ContextKey,

    /// Counterparty chosen for steps that act on behalf of a
    /// different party
    pub chosen_counterparty: Option<Counterparty>,

    /// Target context chosen for a delegation step with several
    /// eligible targets
    pub delegation_target: Option<ContextKey>,

    /// Amount the delegated instance runs with, overriding the
    /// parent's amount
    pub amount_override: Option<f64>,
}

impl ExecutionContext {
    /// Create an execution context scoped to an operating context
    pub fn new(operating_context: ContextKey) -> Self {
        Self {
            operating_context,
            chosen_counterparty: None,
            delegation_target: None,
            amount_override: None,
        }
    }
}

/// What kind of external interaction the engine is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionKind {
    /// Pick the counterparty the step will act on behalf of
    ChooseCounterparty,

    /// Create a document and report the result
    CreateDocument,

    /// Register a payment and report the result
    CreatePayment,

    /// Reconcile with the originating bank movement and report the
    /// result
    Reconcile,

    /// Pick the delegation target context
    Delegate,
}

/// Data the external actor needs to carry out an interaction
#[derive(Debug, Clone, Default)]
pub struct InteractionContext {
    /// Counterparty the step acts on behalf of
    pub counterparty: Option<Counterparty>,

    /// Currency of the operation
    pub currency: Option<CurrencyCode>,

    /// Monetary amount of the operation
    pub amount: Option<f64>,

    /// Document template, for document-creation interactions
    pub template: Option<TemplateRef>,

    /// Originating bank movement, for reconciliation interactions
    pub origin: Option<OriginRef>,

    /// Latest document upstream on the chain, if any
    pub source_document: Option<DocumentRef>,
}

/// Outcome of one advance call
#[derive(Debug, Clone)]
pub enum Directive {
    /// The current step needs an external actor; nothing was mutated
    OpenInteraction {
        /// What the actor is asked to do
        kind: InteractionKind,

        /// The step awaiting the interaction
        step: StepRef,

        /// Data the actor needs
        context: InteractionContext,
    },

    /// One or more steps executed and the chain moved forward
    Completed {
        /// Document produced by the last executed step, if any
        document: Option<DocumentRef>,
    },

    /// The current step was already started elsewhere and is still
    /// pending; the caller is pointed at its document
    Redirected {
        /// Document attached to the pending step, if any
        document: Option<DocumentRef>,
    },

    /// The current step delegated to a nested workflow instance
    Delegated {
        /// The nested instance now carrying the work
        workflow: WorkflowInstanceId,
    },
}
