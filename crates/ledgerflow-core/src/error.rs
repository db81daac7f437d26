use thiserror::Error;

/// Core error type for the ledgerflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Workflow definition not found
    #[error("Workflow definition not found: {0}")]
    DefinitionNotFound(String),

    /// Workflow instance not found
    #[error("Workflow instance not found: {0}")]
    InstanceNotFound(String),

    /// Step not found on a workflow instance
    #[error("Step {step} not found on workflow instance {instance}")]
    StepNotFound {
        /// The workflow instance that was searched
        instance: String,
        /// The missing step
        step: String,
    },

    /// Starting a workflow without a counterparty
    #[error("A counterparty must be set before starting workflow instance {0}")]
    MissingCounterparty(String),

    /// No step is in progress and none is ready
    #[error("No step is ready or in progress on workflow instance {0}")]
    NoEligibleStep(String),

    /// Automatic payment/reconciliation found no document on the chain
    #[error("No source document found walking back from step {step} on workflow instance {instance}")]
    MissingSourceDocument {
        /// The workflow instance the step belongs to
        instance: String,
        /// The step that needed a source document
        step: String,
    },

    /// Automatic reconciliation without a bank-movement origin
    #[error("No origin reference available to reconcile step {step} on workflow instance {instance}")]
    MissingOriginReference {
        /// The workflow instance the step belongs to
        instance: String,
        /// The reconcile step
        step: String,
    },

    /// Not a failure: the caller must switch operating context and retry
    #[error("Continue workflow instance {instance} under operating context {context}")]
    CrossContextContinuation {
        /// The nested workflow instance to continue on
        instance: String,
        /// The operating context it runs under
        context: String,
    },

    /// A concurrent writer changed the instance since it was loaded
    #[error("Workflow instance {0} was modified concurrently")]
    ConcurrentModification(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// A collaborator service failed
    #[error("{service} failed: {message}")]
    Collaborator {
        /// The collaborator that failed (e.g. "document service")
        service: String,
        /// The collaborator's error message, carried opaquely
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (
                EngineError::DefinitionNotFound("wf1".to_string()),
                "Workflow definition not found: wf1",
            ),
            (
                EngineError::InstanceNotFound("inst1".to_string()),
                "Workflow instance not found: inst1",
            ),
            (
                EngineError::MissingCounterparty("inst1".to_string()),
                "A counterparty must be set before starting workflow instance inst1",
            ),
            (
                EngineError::NoEligibleStep("inst1".to_string()),
                "No step is ready or in progress on workflow instance inst1",
            ),
            (
                EngineError::MissingSourceDocument {
                    instance: "inst1".to_string(),
                    step: "s2".to_string(),
                },
                "No source document found walking back from step s2 on workflow instance inst1",
            ),
            (
                EngineError::CrossContextContinuation {
                    instance: "inst2".to_string(),
                    context: "company-b".to_string(),
                },
                "Continue workflow instance inst2 under operating context company-b",
            ),
            (
                EngineError::ConcurrentModification("inst1".to_string()),
                "Workflow instance inst1 was modified concurrently",
            ),
            (
                EngineError::Collaborator {
                    service: "payment service".to_string(),
                    message: "rejected".to_string(),
                },
                "payment service failed: rejected",
            ),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: EngineError = json_error.into();

        match error {
            EngineError::SerializationError(msg) => {
                assert!(msg.contains("expected value"));
            }
            _ => panic!("Expected SerializationError variant"),
        }
    }

    #[test]
    fn test_error_clone_and_eq() {
        let original = EngineError::ValidationError("test".to_string());
        let cloned = original.clone();

        assert_eq!(original, cloned);
    }
}
