//! Workflow execution service
//!
//! Drives workflow instances through their step chains: starting
//! instances, advancing the current step, propagating completion along
//! chain links (across instances after delegation splicing), cascading
//! cancellation, and accepting step results reported by external
//! actors.
//!
//! Every operation works on a [`WorkingSet`]: instances are loaded
//! once, mutated in memory, and committed in a single atomic
//! revision-checked batch. A failed operation therefore never leaves a
//! partially-updated chain behind.

use crate::application::dispatch::{
    Directive, ExecutionContext, InteractionContext, InteractionKind,
};
use crate::domain::definition::{ActionKind, StepDefinition, WorkflowId};
use crate::domain::events::{DomainEvent, WorkflowDelegated};
use crate::domain::instance::{
    StepRef, StepState, WorkflowInstance, WorkflowInstanceId, WorkflowState,
};
use crate::domain::repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository};
use crate::types::{ContextKey, Counterparty, CurrencyCode, DocumentRef, OriginInfo};
use crate::{
    ContextResolver, DocumentRequest, DocumentService, EngineError, PaymentService,
    ReconciliationService,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Handler for domain events emitted by committed operations
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// Handle a single domain event
    async fn handle_event(&self, event: &dyn DomainEvent) -> Result<(), EngineError>;
}

/// Event handler that logs events through tracing
pub struct LogEventHandler;

#[async_trait]
impl DomainEventHandler for LogEventHandler {
    async fn handle_event(&self, event: &dyn DomainEvent) -> Result<(), EngineError> {
        tracing::info!(
            event_type = event.event_type(),
            workflow_instance_id = %event.workflow_instance_id().0,
            "Domain event"
        );
        Ok(())
    }
}

/// Request to start a new workflow instance
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Workflow definition to instantiate
    pub definition: WorkflowId,

    /// Operating context the instance runs under
    pub context: ContextKey,

    /// Counterparty the operation concerns
    pub counterparty: Option<Counterparty>,

    /// Counterparty for steps acting on behalf of a different party
    pub alt_counterparty: Option<Counterparty>,

    /// Currency of the operation; defaults to the context currency
    pub currency: Option<CurrencyCode>,

    /// Monetary amount of the operation
    pub amount: Option<f64>,

    /// Originating bank movement the instance was triggered from
    pub origin: Option<OriginInfo>,

    /// Free-form reference carried onto created documents
    pub reference: Option<String>,
}

/// Result of an interaction, reported back by an external actor
#[derive(Debug, Clone)]
pub enum StepReport {
    /// The actor started work; the step stays pending
    Started {
        /// Document produced so far, if any
        document: Option<DocumentRef>,
    },

    /// The actor finished; the step completes and the chain advances
    Finished {
        /// Document the step produced, if any
        document: Option<DocumentRef>,
    },
}

/// Set of workflow instances loaded for one operation.
///
/// Instances are cloned out of the repository, mutated freely, and
/// committed together. Only instances obtained mutably are saved, so
/// read-only traversals stay out of the commit batch.
struct WorkingSet {
    repo: Arc<dyn WorkflowInstanceRepository>,
    instances: HashMap<String, WorkflowInstance>,
    dirty: HashSet<String>,
}

impl WorkingSet {
    fn new(repo: Arc<dyn WorkflowInstanceRepository>) -> Self {
        Self {
            repo,
            instances: HashMap::new(),
            dirty: HashSet::new(),
        }
    }

    /// Load an instance into the set, failing when it does not exist
    async fn load(&mut self, id: &WorkflowInstanceId) -> Result<(), EngineError> {
        if self.instances.contains_key(&id.0) {
            return Ok(());
        }
        let instance = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(id.0.clone()))?;
        self.instances.insert(id.0.clone(), instance);
        Ok(())
    }

    /// Load an instance if it exists, reporting whether it did.
    ///
    /// Dangling references (a deleted delegated instance, a repointed
    /// chain link) are tolerated on traversal paths.
    async fn try_load(&mut self, id: &WorkflowInstanceId) -> Result<bool, EngineError> {
        if self.instances.contains_key(&id.0) {
            return Ok(true);
        }
        match self.repo.find_by_id(id).await? {
            Some(instance) => {
                self.instances.insert(id.0.clone(), instance);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get(&self, id: &WorkflowInstanceId) -> Result<&WorkflowInstance, EngineError> {
        self.instances
            .get(&id.0)
            .ok_or_else(|| EngineError::InstanceNotFound(id.0.clone()))
    }

    fn get_mut(&mut self, id: &WorkflowInstanceId) -> Result<&mut WorkflowInstance, EngineError> {
        let instance = self
            .instances
            .get_mut(&id.0)
            .ok_or_else(|| EngineError::InstanceNotFound(id.0.clone()))?;
        self.dirty.insert(id.0.clone());
        Ok(instance)
    }

    /// Add a freshly-created instance to the set
    fn insert(&mut self, instance: WorkflowInstance) {
        self.dirty.insert(instance.id.0.clone());
        self.instances.insert(instance.id.0.clone(), instance);
    }

    /// Resolve the successor of a step, honouring only two-sided links.
    ///
    /// A successor pointer counts only when the step it names still
    /// points back here as its predecessor. Repointed or dangling
    /// links read as unset.
    async fn resolve_successor(&mut self, at: &StepRef) -> Result<Option<StepRef>, EngineError> {
        let succ = match self.get(&at.instance)?.step(&at.step)?.successor.clone() {
            Some(succ) => succ,
            None => return Ok(None),
        };
        if !self.try_load(&succ.instance).await? {
            return Ok(None);
        }
        let succ_instance = self.get(&succ.instance)?;
        let succ_step = match succ_instance.step(&succ.step) {
            Ok(step) => step,
            Err(_) => return Ok(None),
        };
        if succ_step.predecessor.as_ref() == Some(at) {
            Ok(Some(succ))
        } else {
            Ok(None)
        }
    }

    /// Resolve the predecessor of a step, honouring only two-sided
    /// links
    async fn resolve_predecessor(&mut self, at: &StepRef) -> Result<Option<StepRef>, EngineError> {
        let pred = match self.get(&at.instance)?.step(&at.step)?.predecessor.clone() {
            Some(pred) => pred,
            None => return Ok(None),
        };
        if !self.try_load(&pred.instance).await? {
            return Ok(None);
        }
        let pred_instance = self.get(&pred.instance)?;
        let pred_step = match pred_instance.step(&pred.step) {
            Ok(step) => step,
            Err(_) => return Ok(None),
        };
        if pred_step.successor.as_ref() == Some(at) {
            Ok(Some(pred))
        } else {
            Ok(None)
        }
    }

    /// Walk backward along validated links and return the first
    /// document found upstream of the given step
    async fn latest_document(&mut self, from: &StepRef) -> Result<Option<DocumentRef>, EngineError> {
        let mut seen = HashSet::new();
        let mut cursor = self.resolve_predecessor(from).await?;
        while let Some(at) = cursor {
            if !seen.insert(at.clone()) {
                break;
            }
            let step = self.get(&at.instance)?.step(&at.step)?;
            if let Some(document) = &step.document {
                return Ok(Some(document.clone()));
            }
            cursor = self.resolve_predecessor(&at).await?;
        }
        Ok(None)
    }

    /// Commit all dirty instances atomically and drain their events
    async fn commit(&mut self) -> Result<Vec<Box<dyn DomainEvent>>, EngineError> {
        if self.dirty.is_empty() {
            return Ok(Vec::new());
        }

        let batch: Vec<&WorkflowInstance> = self
            .dirty
            .iter()
            .filter_map(|id| self.instances.get(id))
            .collect();
        self.repo.save_all(&batch).await?;

        let ids: Vec<String> = self.dirty.drain().collect();
        let mut events = Vec::new();
        for id in ids {
            if let Some(instance) = self.instances.get_mut(&id) {
                events.append(&mut instance.take_events());
            }
        }
        Ok(events)
    }
}

/// Service driving workflow instances through their step chains
pub struct WorkflowService {
    definition_repo: Arc<dyn WorkflowDefinitionRepository>,
    instance_repo: Arc<dyn WorkflowInstanceRepository>,
    documents: Arc<dyn DocumentService>,
    payments: Arc<dyn PaymentService>,
    reconciliation: Arc<dyn ReconciliationService>,
    contexts: Arc<dyn ContextResolver>,
    event_handler: Arc<dyn DomainEventHandler>,
}

impl WorkflowService {
    /// Create a new workflow execution service
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        definition_repo: Arc<dyn WorkflowDefinitionRepository>,
        instance_repo: Arc<dyn WorkflowInstanceRepository>,
        documents: Arc<dyn DocumentService>,
        payments: Arc<dyn PaymentService>,
        reconciliation: Arc<dyn ReconciliationService>,
        contexts: Arc<dyn ContextResolver>,
        event_handler: Arc<dyn DomainEventHandler>,
    ) -> Self {
        Self {
            definition_repo,
            instance_repo,
            documents,
            payments,
            reconciliation,
            contexts,
            event_handler,
        }
    }

    /// Start a new workflow instance from a definition
    pub async fn start(&self, request: StartRequest) -> Result<WorkflowInstanceId, EngineError> {
        let definition = self
            .definition_repo
            .find_by_id(&request.definition)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound(request.definition.0.clone()))?;

        if definition.sub_workflow_only {
            return Err(EngineError::ValidationError(format!(
                "Workflow definition {} can only be started through delegation",
                definition.id.0
            )));
        }
        if request.origin.is_some() && !definition.allow_external_trigger {
            return Err(EngineError::ValidationError(format!(
                "Workflow definition {} cannot be started from a bank movement",
                definition.id.0
            )));
        }
        definition.validate()?;

        let operating_context = self.contexts.resolve(&request.context).await?;

        let mut instance = WorkflowInstance::new(definition.id.clone(), request.context);
        instance.alt_counterparty = request.alt_counterparty;
        instance.reference = request.reference;

        // Explicit request fields win over values carried by the origin
        let (origin_counterparty, origin_currency, origin_amount, origin_ref) =
            match request.origin {
                Some(origin) => (
                    origin.counterparty,
                    origin.currency,
                    origin.amount,
                    Some(origin.reference),
                ),
                None => (None, None, None, None),
            };
        instance.counterparty = request.counterparty.or(origin_counterparty);
        instance.currency = request
            .currency
            .or(origin_currency)
            .or(Some(operating_context.currency));
        instance.amount = request.amount.or(origin_amount);
        instance.origin = origin_ref;

        instance.start(&definition)?;

        tracing::info!(
            workflow_instance_id = %instance.id.0,
            workflow_id = %definition.id.0,
            steps = instance.steps.len(),
            "Started workflow instance"
        );

        let instance_id = instance.id.clone();
        let mut ws = WorkingSet::new(self.instance_repo.clone());
        ws.insert(instance);
        self.finish(ws).await?;

        Ok(instance_id)
    }

    /// Advance a workflow instance by resolving and, where possible,
    /// executing its current step.
    ///
    /// Returns what happened: the step executed and the chain moved
    /// ([`Directive::Completed`]), an external actor is needed
    /// ([`Directive::OpenInteraction`]), the step is already pending
    /// elsewhere ([`Directive::Redirected`]), or the step delegated to
    /// a nested instance ([`Directive::Delegated`]). Any error leaves
    /// all instances untouched.
    pub async fn advance(
        &self,
        instance_id: &WorkflowInstanceId,
        ctx: &ExecutionContext,
    ) -> Result<Directive, EngineError> {
        let mut ws = WorkingSet::new(self.instance_repo.clone());
        let mut target = instance_id.clone();

        loop {
            ws.load(&target).await?;

            let instance = ws.get(&target)?;
            if instance.state != WorkflowState::Active {
                return Err(EngineError::NoEligibleStep(target.0.clone()));
            }

            // A counterparty chosen by the caller sticks to the instance
            if let Some(chosen) = &ctx.chosen_counterparty {
                if instance.needs_alt_counterparty()
                    && instance.alt_counterparty.as_ref() != Some(chosen)
                {
                    ws.get_mut(&target)?.alt_counterparty = Some(chosen.clone());
                }
            }

            let instance = ws.get(&target)?;
            let step = instance
                .in_progress_step()
                .or_else(|| instance.ready_step())
                .ok_or_else(|| EngineError::NoEligibleStep(target.0.clone()))?;

            let step_ref = StepRef {
                instance: target.clone(),
                step: step.id.clone(),
            };
            let step_state = step.state;
            let definition = step.definition.clone();
            let step_document = step.document.clone();
            let delegated = step.delegated_workflow.clone();
            let alt_counterparty = instance.alt_counterparty.clone();

            // A different-counterparty step blocks everything until the
            // party is chosen
            if definition.requires_different_counterparty && alt_counterparty.is_none() {
                let context = self.interaction_context(&mut ws, &step_ref, &definition).await?;
                self.finish(ws).await?;
                return Ok(Directive::OpenInteraction {
                    kind: InteractionKind::ChooseCounterparty,
                    step: step_ref,
                    context,
                });
            }

            if step_state == StepState::InProgress {
                if let Some(nested_id) = delegated {
                    if ws.try_load(&nested_id).await? {
                        let nested = ws.get(&nested_id)?;
                        if nested.state == WorkflowState::Active {
                            if nested.context != ctx.operating_context {
                                return Err(EngineError::CrossContextContinuation {
                                    instance: nested_id.0.clone(),
                                    context: nested.context.0.clone(),
                                });
                            }
                            // Continue inside the nested instance
                            target = nested_id;
                            continue;
                        }
                    }
                }
                self.finish(ws).await?;
                return Ok(Directive::Redirected {
                    document: step_document,
                });
            }

            // Ready step: dispatch on kind
            let directive = match definition.kind.clone() {
                ActionKind::CreateDocument {
                    template,
                    preserve_document_date,
                } => {
                    let source_document = ws.latest_document(&step_ref).await?;
                    if !definition.automatic {
                        let context = self
                            .interaction_context(&mut ws, &step_ref, &definition)
                            .await?;
                        self.finish(ws).await?;
                        return Ok(Directive::OpenInteraction {
                            kind: InteractionKind::CreateDocument,
                            step: step_ref,
                            context,
                        });
                    }

                    let instance = ws.get(&target)?;
                    let counterparty = if definition.requires_different_counterparty {
                        instance.alt_counterparty.clone()
                    } else {
                        instance.counterparty.clone()
                    }
                    .ok_or_else(|| EngineError::MissingCounterparty(target.0.clone()))?;
                    let request = DocumentRequest {
                        template,
                        context: instance.context.clone(),
                        counterparty,
                        currency: instance.currency.clone(),
                        amount: instance.amount,
                        reference: instance.reference.clone(),
                        preserve_document_date,
                        source_document,
                    };

                    ws.get_mut(&target)?.step_mut(&step_ref.step)?.begin()?;
                    let document = self.documents.create_document(request).await?;
                    self.complete_chain(&mut ws, step_ref, Some(document.clone()))
                        .await?;
                    Directive::Completed {
                        document: Some(document),
                    }
                }
                ActionKind::CreatePayment => {
                    if !definition.automatic {
                        let context = self
                            .interaction_context(&mut ws, &step_ref, &definition)
                            .await?;
                        self.finish(ws).await?;
                        return Ok(Directive::OpenInteraction {
                            kind: InteractionKind::CreatePayment,
                            step: step_ref,
                            context,
                        });
                    }
                    let source_document = ws
                        .latest_document(&step_ref)
                        .await?
                        .ok_or_else(|| EngineError::MissingSourceDocument {
                            instance: step_ref.instance.0.clone(),
                            step: step_ref.step.0.clone(),
                        })?;
                    let context = ws.get(&target)?.context.clone();
                    ws.get_mut(&target)?.step_mut(&step_ref.step)?.begin()?;
                    let document = self
                        .payments
                        .create_payment(&source_document, &context)
                        .await?;
                    self.complete_chain(&mut ws, step_ref, Some(document.clone()))
                        .await?;
                    Directive::Completed {
                        document: Some(document),
                    }
                }
                ActionKind::Reconcile => {
                    if !definition.automatic {
                        let context = self
                            .interaction_context(&mut ws, &step_ref, &definition)
                            .await?;
                        self.finish(ws).await?;
                        return Ok(Directive::OpenInteraction {
                            kind: InteractionKind::Reconcile,
                            step: step_ref,
                            context,
                        });
                    }
                    let source_document = ws
                        .latest_document(&step_ref)
                        .await?
                        .ok_or_else(|| EngineError::MissingSourceDocument {
                            instance: step_ref.instance.0.clone(),
                            step: step_ref.step.0.clone(),
                        })?;
                    let origin = ws.get(&target)?.origin.clone().ok_or_else(|| {
                        EngineError::MissingOriginReference {
                            instance: step_ref.instance.0.clone(),
                            step: step_ref.step.0.clone(),
                        }
                    })?;
                    let context = ws.get(&target)?.context.clone();
                    ws.get_mut(&target)?.step_mut(&step_ref.step)?.begin()?;
                    let document = self
                        .reconciliation
                        .reconcile(&source_document, &origin, &context)
                        .await?;
                    self.complete_chain(&mut ws, step_ref, Some(document.clone()))
                        .await?;
                    Directive::Completed {
                        document: Some(document),
                    }
                }
                ActionKind::Delegate { targets } => {
                    let target_context = match &ctx.delegation_target {
                        Some(chosen) => {
                            if !targets.contains_key(chosen) {
                                return Err(EngineError::ValidationError(format!(
                                    "Context {} is not an eligible delegation target for step {}",
                                    chosen.0, step_ref.step.0
                                )));
                            }
                            chosen.clone()
                        }
                        None if definition.automatic && targets.len() == 1 => targets
                            .keys()
                            .next()
                            .cloned()
                            .ok_or_else(|| EngineError::NoEligibleStep(target.0.clone()))?,
                        None => {
                            let context = self
                                .interaction_context(&mut ws, &step_ref, &definition)
                                .await?;
                            self.finish(ws).await?;
                            return Ok(Directive::OpenInteraction {
                                kind: InteractionKind::Delegate,
                                step: step_ref,
                                context,
                            });
                        }
                    };
                    let nested_definition = targets
                        .get(&target_context)
                        .cloned()
                        .ok_or_else(|| EngineError::NoEligibleStep(target.0.clone()))?;
                    let workflow = self
                        .splice_delegation(
                            &mut ws,
                            step_ref,
                            target_context,
                            nested_definition,
                            ctx.amount_override,
                        )
                        .await?;
                    Directive::Delegated { workflow }
                }
                ActionKind::Info => {
                    self.complete_chain(&mut ws, step_ref, None).await?;
                    Directive::Completed { document: None }
                }
            };

            self.finish(ws).await?;
            return Ok(directive);
        }
    }

    /// Accept the result of an interaction for one step
    pub async fn report_step_result(
        &self,
        step: &StepRef,
        report: StepReport,
    ) -> Result<(), EngineError> {
        let mut ws = WorkingSet::new(self.instance_repo.clone());
        ws.load(&step.instance).await?;

        let state = ws.get(&step.instance)?.step(&step.step)?.state;
        if !matches!(state, StepState::Ready | StepState::InProgress) {
            return Err(EngineError::ValidationError(format!(
                "Step {} cannot accept a result in state {:?}",
                step.step.0, state
            )));
        }

        match report {
            StepReport::Started { document } => {
                let instance = ws.get_mut(&step.instance)?;
                let step_instance = instance.step_mut(&step.step)?;
                if step_instance.state == StepState::Ready {
                    step_instance.begin()?;
                }
                if document.is_some() {
                    step_instance.document = document;
                }
                instance.update_timestamp();
            }
            StepReport::Finished { document } => {
                self.complete_chain(&mut ws, step.clone(), document).await?;
            }
        }

        self.finish(ws).await
    }

    /// Cancel a workflow instance and everything that depends on it:
    /// nested instances it delegated to, and instances downstream of a
    /// spliced chain link.
    ///
    /// Cancelling an already-terminal instance is a no-op.
    pub async fn cancel(&self, instance_id: &WorkflowInstanceId) -> Result<(), EngineError> {
        let mut ws = WorkingSet::new(self.instance_repo.clone());
        ws.load(instance_id).await?;

        let mut worklist = vec![instance_id.clone()];
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(current) = worklist.pop() {
            if !visited.insert(current.0.clone()) {
                continue;
            }
            if !ws.try_load(&current).await? {
                continue;
            }
            if matches!(
                ws.get(&current)?.state,
                WorkflowState::Completed | WorkflowState::Cancelled
            ) {
                continue;
            }

            // Collect dependents before mutating the chain
            let pending: Vec<StepRef> = ws
                .get(&current)?
                .steps
                .iter()
                .filter(|s| !s.state.is_terminal())
                .map(|s| StepRef {
                    instance: current.clone(),
                    step: s.id.clone(),
                })
                .collect();
            for step_ref in &pending {
                let step = ws.get(&current)?.step(&step_ref.step)?;
                if let Some(nested) = step.delegated_workflow.clone() {
                    worklist.push(nested);
                }
                if let Some(succ) = ws.resolve_successor(step_ref).await? {
                    if succ.instance != current {
                        worklist.push(succ.instance);
                    }
                }
            }

            ws.get_mut(&current)?.cancel();
            tracing::info!(workflow_instance_id = %current.0, "Cancelled workflow instance");
        }

        self.finish(ws).await
    }

    /// Mark a step done and propagate along the chain: promote a
    /// waiting successor, or complete the owning instance and, when
    /// the successor is a pending step on another instance, complete
    /// that step too.
    async fn complete_chain(
        &self,
        ws: &mut WorkingSet,
        step: StepRef,
        document: Option<DocumentRef>,
    ) -> Result<(), EngineError> {
        let mut current = step;
        let mut document = document;

        loop {
            ws.get_mut(&current.instance)?
                .finish_step(&current.step, document.take())?;

            match ws.resolve_successor(&current).await? {
                Some(succ) => {
                    let state = ws.get(&succ.instance)?.step(&succ.step)?.state;
                    match state {
                        StepState::Waiting => {
                            let instance = ws.get_mut(&succ.instance)?;
                            instance.step_mut(&succ.step)?.promote()?;
                            instance.update_timestamp();
                            break;
                        }
                        StepState::InProgress => {
                            // Chain continues on another instance; this
                            // one is finished
                            ws.get_mut(&current.instance)?.complete()?;
                            current = succ;
                            continue;
                        }
                        _ => {
                            ws.get_mut(&current.instance)?.complete()?;
                            break;
                        }
                    }
                }
                None => {
                    ws.get_mut(&current.instance)?.complete()?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Build a nested instance for a delegating step and splice it
    /// into the chain.
    ///
    /// The nested chain's last step gains the delegating step as its
    /// successor, and the delegating step repoints its predecessor to
    /// that last step, so completion flows back across the splice. The
    /// nested first step keeps a one-sided note of the delegating
    /// step's old predecessor; it never validates, since the old
    /// predecessor still points at the delegating step.
    async fn splice_delegation(
        &self,
        ws: &mut WorkingSet,
        parent_step: StepRef,
        target_context: ContextKey,
        definition_id: WorkflowId,
        amount_override: Option<f64>,
    ) -> Result<WorkflowInstanceId, EngineError> {
        let definition = self
            .definition_repo
            .find_by_id(&definition_id)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound(definition_id.0.clone()))?;
        definition.validate()?;

        let operating_context = self.contexts.resolve(&target_context).await?;
        let old_predecessor = ws.resolve_predecessor(&parent_step).await?;

        let parent = ws.get(&parent_step.instance)?;
        let mut nested = WorkflowInstance::new(definition.id.clone(), target_context.clone());
        nested.counterparty = parent.counterparty.clone();
        nested.currency = parent
            .currency
            .clone()
            .or(Some(operating_context.currency));
        nested.amount = amount_override.or(parent.amount);
        nested.reference = parent.reference.clone();
        nested.parent_step = Some(parent_step.clone());
        nested.start(&definition)?;

        let nested_id = nested.id.clone();
        if let Some(first) = nested.steps.first_mut() {
            first.predecessor = old_predecessor;
        }
        let last_ref = match nested.steps.last_mut() {
            Some(last) => {
                last.successor = Some(parent_step.clone());
                StepRef {
                    instance: nested_id.clone(),
                    step: last.id.clone(),
                }
            }
            None => {
                return Err(EngineError::ValidationError(format!(
                    "Workflow definition {} has no steps to delegate to",
                    definition.id.0
                )))
            }
        };
        ws.insert(nested);

        let parent = ws.get_mut(&parent_step.instance)?;
        {
            let step = parent.step_mut(&parent_step.step)?;
            step.predecessor = Some(last_ref);
            step.delegated_workflow = Some(nested_id.clone());
            step.begin()?;
        }
        parent.update_timestamp();
        parent.record_event(Box::new(WorkflowDelegated {
            workflow_instance_id: parent_step.instance.clone(),
            step_id: parent_step.step.clone(),
            delegated_instance_id: nested_id.clone(),
            target_context,
            timestamp: chrono::Utc::now(),
        }));

        tracing::info!(
            workflow_instance_id = %parent_step.instance.0,
            delegated_instance_id = %nested_id.0,
            "Delegated to nested workflow instance"
        );

        Ok(nested_id)
    }

    /// Assemble the data an external actor needs for an interaction
    async fn interaction_context(
        &self,
        ws: &mut WorkingSet,
        step: &StepRef,
        definition: &StepDefinition,
    ) -> Result<InteractionContext, EngineError> {
        let source_document = ws.latest_document(step).await?;
        let instance = ws.get(&step.instance)?;
        let counterparty = if definition.requires_different_counterparty {
            instance.alt_counterparty.clone()
        } else {
            instance.counterparty.clone()
        };
        let template = match &definition.kind {
            ActionKind::CreateDocument { template, .. } => Some(template.clone()),
            _ => None,
        };
        Ok(InteractionContext {
            counterparty,
            currency: instance.currency.clone(),
            amount: instance.amount,
            template,
            origin: instance.origin.clone(),
            source_document,
        })
    }

    /// Commit the working set and dispatch the resulting events
    async fn finish(&self, mut ws: WorkingSet) -> Result<(), EngineError> {
        let events = ws.commit().await?;
        for event in events {
            self.event_handler.handle_event(event.as_ref()).await?;
        }
        Ok(())
    }
}
