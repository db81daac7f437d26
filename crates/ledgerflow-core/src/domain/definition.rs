use crate::types::{ContextKey, TemplateRef};
use crate::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a workflow definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

/// An ordered, immutable catalog of step definitions describing one
/// type of accounting operation.
///
/// Step order is insertion order and is the sole determinant of the
/// execution sequence when an instance builds its chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// ID of the workflow definition
    pub id: WorkflowId,

    /// Human-readable name
    pub name: String,

    /// Ordering key used when listing definitions
    pub sequence: i32,

    /// The steps, in execution order
    pub steps: Vec<StepDefinition>,

    /// Whether an instance may be started from an external trigger
    /// (e.g. directly from a bank movement)
    pub allow_external_trigger: bool,

    /// Definitions flagged as sub-workflow-only can only be reached
    /// through delegation, never started directly
    pub sub_workflow_only: bool,
}

/// One entry in a workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// ID of the step, unique within its definition
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Whether the step executes without an external actor
    pub automatic: bool,

    /// Whether the step runs on behalf of a counterparty different
    /// from the one set on the instance
    pub requires_different_counterparty: bool,

    /// What the step does, with kind-specific configuration
    pub kind: ActionKind,
}

/// The closed set of step action kinds.
///
/// Each variant carries only the configuration its collaborator needs,
/// so an unhandled kind is a compile error at every dispatch site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Create a document (journal entry, invoice) from a template
    CreateDocument {
        /// Template handed to the document-creation collaborator
        template: TemplateRef,
        /// Ask the collaborator to reuse the date of the previous
        /// document on the chain instead of today
        preserve_document_date: bool,
    },

    /// Register a payment against the latest document on the chain
    CreatePayment,

    /// Reconcile the latest document with the originating bank movement
    Reconcile,

    /// Delegate to a nested workflow instance under another context
    Delegate {
        /// Eligible target contexts and the definition to run there
        targets: HashMap<ContextKey, WorkflowId>,
    },

    /// Informational marker, completes immediately
    Info,
}

impl WorkflowDefinition {
    /// Validate the workflow definition
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.steps.is_empty() {
            return Err(EngineError::ValidationError(format!(
                "Workflow definition {} must have at least one step",
                self.id.0
            )));
        }

        let mut step_ids = std::collections::HashSet::new();
        for step in &self.steps {
            if !step_ids.insert(&step.id) {
                return Err(EngineError::ValidationError(format!(
                    "Duplicate step ID in workflow definition {}: {}",
                    self.id.0, step.id
                )));
            }

            if let ActionKind::Delegate { targets } = &step.kind {
                if targets.is_empty() {
                    return Err(EngineError::ValidationError(format!(
                        "Delegate step {} in workflow definition {} has no eligible targets",
                        step.id, self.id.0
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_step(id: &str) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            name: format!("Step {id}"),
            automatic: true,
            requires_different_counterparty: false,
            kind: ActionKind::Info,
        }
    }

    fn definition(steps: Vec<StepDefinition>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: WorkflowId("cash_return".to_string()),
            name: "Cash Return".to_string(),
            sequence: 10,
            steps,
            allow_external_trigger: true,
            sub_workflow_only: false,
        }
    }

    #[test]
    fn test_validate_ok() {
        let def = definition(vec![info_step("a"), info_step("b")]);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_steps() {
        let def = definition(vec![]);
        let result = def.validate();
        match result {
            Err(EngineError::ValidationError(msg)) => {
                assert!(msg.contains("at least one step"));
            }
            _ => panic!("Expected ValidationError"),
        }
    }

    #[test]
    fn test_validate_duplicate_step_ids() {
        let def = definition(vec![info_step("a"), info_step("a")]);
        let result = def.validate();
        match result {
            Err(EngineError::ValidationError(msg)) => {
                assert!(msg.contains("Duplicate step ID"));
            }
            _ => panic!("Expected ValidationError"),
        }
    }

    #[test]
    fn test_validate_delegate_without_targets() {
        let delegate = StepDefinition {
            id: "handover".to_string(),
            name: "Handover".to_string(),
            automatic: true,
            requires_different_counterparty: false,
            kind: ActionKind::Delegate {
                targets: HashMap::new(),
            },
        };
        let def = definition(vec![delegate]);
        let result = def.validate();
        match result {
            Err(EngineError::ValidationError(msg)) => {
                assert!(msg.contains("no eligible targets"));
            }
            _ => panic!("Expected ValidationError"),
        }
    }

    #[test]
    fn test_definition_serialization() {
        let mut targets = HashMap::new();
        targets.insert(
            ContextKey("company-b".to_string()),
            WorkflowId("sub_collect".to_string()),
        );
        let def = definition(vec![
            StepDefinition {
                id: "invoice".to_string(),
                name: "Create invoice".to_string(),
                automatic: true,
                requires_different_counterparty: false,
                kind: ActionKind::CreateDocument {
                    template: TemplateRef("tmpl-inv".to_string()),
                    preserve_document_date: true,
                },
            },
            StepDefinition {
                id: "handover".to_string(),
                name: "Handover".to_string(),
                automatic: true,
                requires_different_counterparty: false,
                kind: ActionKind::Delegate { targets },
            },
        ]);

        let serialized = serde_json::to_string(&def).unwrap();
        let deserialized: WorkflowDefinition = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.id, def.id);
        assert_eq!(deserialized.steps.len(), 2);
        assert_eq!(deserialized.steps[0].kind, def.steps[0].kind);
        assert_eq!(deserialized.steps[1].kind, def.steps[1].kind);
    }
}
