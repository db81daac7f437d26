//!
//! Ledgerflow Core - step-chain execution engine for multi-step
//! accounting workflows
//!
//! This crate defines the domain model, execution services, and
//! collaborator interfaces for running accounting operations as
//! ordered chains of steps, including delegation of part of a chain
//! to a nested workflow under another operating context.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;

/// Domain layer - core business models, entities, and rules
pub mod domain;

/// Application services - core application logic
pub mod application;

/// Core value types
pub mod types;

/// Error types
pub mod error;

// Re-export key types
pub use error::EngineError;
pub use types::{
    ContextKey, Counterparty, CurrencyCode, DocumentRef, OperatingContext, OriginInfo, OriginRef,
    TemplateRef,
};

// Re-export main API types for easy use
pub use application::definition_service::{DefinitionService, WorkflowInstanceSummary};
pub use application::dispatch::{
    Directive, ExecutionContext, InteractionContext, InteractionKind,
};
pub use application::workflow_service::{
    DomainEventHandler, LogEventHandler, StartRequest, StepReport, WorkflowService,
};
pub use domain::definition::{ActionKind, StepDefinition, WorkflowDefinition, WorkflowId};
pub use domain::instance::{
    StepInstance, StepInstanceId, StepRef, StepState, WorkflowInstance, WorkflowInstanceId,
    WorkflowState,
};
pub use domain::repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository};

/// Everything a document-creation collaborator needs to produce one
/// document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRequest {
    /// Template the document is created from
    pub template: TemplateRef,

    /// Operating context the document belongs to
    pub context: ContextKey,

    /// Counterparty the document concerns
    pub counterparty: Counterparty,

    /// Currency of the document
    pub currency: Option<CurrencyCode>,

    /// Monetary amount
    pub amount: Option<f64>,

    /// Free-form reference carried onto the document
    pub reference: Option<String>,

    /// Reuse the date of the source document instead of today
    pub preserve_document_date: bool,

    /// Document the new one derives from, if any exists upstream on
    /// the chain
    pub source_document: Option<DocumentRef>,
}

/// Collaborator that creates accounting documents
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Create a document and return its reference
    async fn create_document(&self, request: DocumentRequest) -> Result<DocumentRef, EngineError>;
}

/// Collaborator that registers payments
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Register a payment against a document, returning the payment
    /// document reference
    async fn create_payment(
        &self,
        document: &DocumentRef,
        context: &ContextKey,
    ) -> Result<DocumentRef, EngineError>;
}

/// Collaborator that reconciles documents with bank movements
#[async_trait]
pub trait ReconciliationService: Send + Sync {
    /// Reconcile a document with the originating bank movement,
    /// returning the reconciliation document reference
    async fn reconcile(
        &self,
        document: &DocumentRef,
        origin: &OriginRef,
        context: &ContextKey,
    ) -> Result<DocumentRef, EngineError>;
}

/// Collaborator that resolves operating contexts
#[async_trait]
pub trait ContextResolver: Send + Sync {
    /// Resolve an operating context by key
    async fn resolve(&self, key: &ContextKey) -> Result<OperatingContext, EngineError>;
}
