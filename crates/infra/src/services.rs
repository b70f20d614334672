//! Application service for PPE requests and the Kardex.
//!
//! Every mutating operation runs through the `CommandDispatcher` (load →
//! decide → append → publish) and then applies the committed envelopes to the
//! request projection before returning, so callers read their own writes.
//! External lookups (worker directory, catalog) happen here, never inside the
//! aggregate.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, instrument, warn};

use kardex_catalog::{CatalogItem, CatalogService, EppId};
use kardex_compliance::{
    CatalogTerms, DeliveredLine, DeliveredRequest, KardexFilter, KardexRow, WorkerKardex,
    build_kardex_list, build_worker_kardex,
};
use kardex_core::{AggregateId, CompanyId, DomainError, UserId, WorkerId};
use kardex_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use kardex_requests::{
    AGGREGATE_TYPE, AddLine, CodeFormat, CreateRequest, ItemSnapshot, LineId, LineSnapshot,
    NewLine, PpeRequest, PpeRequestCommand, RemoveRequest, RequestId, RequestMetadata,
    RequestStatus, RequestUpdate, ToggleException, TransitionRequest, UpdateRequest,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::KardexConfig;
use crate::directory::WorkerDirectory;
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
use crate::projections::{
    InMemoryRequestsProjection, PpeRequestsProjection, RequestLineRecord, RequestProjectionError,
    RequestRecord, RequestView,
};
use crate::read_model::{CompanyStore, InMemoryCompanyStore};
use crate::time::TimeSource;

/// The single error type surfaced by the service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("immutable state: {0}")]
    ImmutableState(String),

    #[error("cross-tenant access: {0}")]
    CrossTenant(String),

    /// Another writer changed the request first; reload and retry.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl ServiceError {
    /// Stable machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::ImmutableState(_) => "immutable_state",
            ServiceError::CrossTenant(_) => "cross_tenant",
            ServiceError::Concurrency(_) => "concurrency",
            ServiceError::Infrastructure(_) => "infrastructure",
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(msg) => ServiceError::NotFound(msg),
            DomainError::InvalidTransition { from, to } => ServiceError::InvalidTransition { from, to },
            DomainError::ImmutableState(msg) => ServiceError::ImmutableState(msg),
            DomainError::CrossTenant(msg) => ServiceError::CrossTenant(msg),
            DomainError::Conflict(msg) => ServiceError::Concurrency(msg),
            DomainError::InvariantViolation(msg) => ServiceError::Infrastructure(msg),
        }
    }
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => e.into(),
            DispatchError::Concurrency(msg) => ServiceError::Concurrency(msg),
            DispatchError::CompanyIsolation(msg) => ServiceError::CrossTenant(msg),
            other => ServiceError::Infrastructure(other.to_string()),
        }
    }
}

impl From<RequestProjectionError> for ServiceError {
    fn from(value: RequestProjectionError) -> Self {
        ServiceError::Infrastructure(value.to_string())
    }
}

impl From<EventStoreError> for ServiceError {
    fn from(value: EventStoreError) -> Self {
        DispatchError::from(value).into()
    }
}

/// A line as asked for by the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub epp_id: EppId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub company_id: CompanyId,
    pub requester_id: UserId,
    pub worker_id: WorkerId,
    pub lines: Vec<LineRequest>,
    pub metadata: RequestMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionInput {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub target: RequestStatus,
    pub actor_id: UserId,
    pub comments: Option<String>,
    pub receipt_signature: Option<String>,
}

impl TransitionInput {
    pub fn new(company_id: CompanyId, request_id: RequestId, target: RequestStatus, actor_id: UserId) -> Self {
        Self {
            company_id,
            request_id,
            target,
            actor_id,
            comments: None,
            receipt_signature: None,
        }
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn with_receipt_signature(mut self, signature: impl Into<String>) -> Self {
        self.receipt_signature = Some(signature.into());
        self
    }
}

pub type InMemoryPpeRequestService = PpeRequestService<
    Arc<InMemoryEventStore>,
    Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
    InMemoryCompanyStore<RequestId, RequestRecord>,
    InMemoryCompanyStore<LineId, RequestLineRecord>,
>;

pub struct PpeRequestService<S, B, R, L>
where
    R: CompanyStore<RequestId, RequestRecord>,
    L: CompanyStore<LineId, RequestLineRecord>,
{
    dispatcher: CommandDispatcher<S, B>,
    projection: Arc<PpeRequestsProjection<R, L>>,
    catalog: Arc<dyn CatalogService>,
    workers: Arc<dyn WorkerDirectory>,
    clock: Arc<dyn TimeSource>,
    codes: CodeFormat,
}

impl InMemoryPpeRequestService {
    /// Fully in-memory wiring: fresh store, bus and record sets.
    pub fn in_memory(
        catalog: Arc<dyn CatalogService>,
        workers: Arc<dyn WorkerDirectory>,
        clock: Arc<dyn TimeSource>,
        config: &KardexConfig,
    ) -> Self {
        let dispatcher = CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()));
        let projection: Arc<InMemoryRequestsProjection> = Arc::new(PpeRequestsProjection::new(
            InMemoryCompanyStore::new(),
            InMemoryCompanyStore::new(),
        ));
        Self::new(dispatcher, projection, catalog, workers, clock, config)
    }
}

impl<S, B, R, L> PpeRequestService<S, B, R, L>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: CompanyStore<RequestId, RequestRecord>,
    L: CompanyStore<LineId, RequestLineRecord>,
{
    pub fn new(
        dispatcher: CommandDispatcher<S, B>,
        projection: Arc<PpeRequestsProjection<R, L>>,
        catalog: Arc<dyn CatalogService>,
        workers: Arc<dyn WorkerDirectory>,
        clock: Arc<dyn TimeSource>,
        config: &KardexConfig,
    ) -> Self {
        Self {
            dispatcher,
            projection,
            catalog,
            workers,
            clock,
            codes: config.code_format(),
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn projection(&self) -> &Arc<PpeRequestsProjection<R, L>> {
        &self.projection
    }

    /// Subscribe to every committed request event (document generation and
    /// other read-only consumers).
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    #[instrument(skip_all, fields(company_id = %input.company_id, worker_id = %input.worker_id), err)]
    pub fn create_request(&self, input: NewRequest) -> Result<RequestView, ServiceError> {
        self.create_inner(input).inspect_err(|e| rejected("create_request", e))
    }

    #[instrument(skip(self, changes), fields(company_id = %company_id, request_id = %request_id), err)]
    pub fn update_request(
        &self,
        company_id: CompanyId,
        request_id: RequestId,
        actor_id: UserId,
        changes: RequestUpdate,
    ) -> Result<RequestView, ServiceError> {
        let command = PpeRequestCommand::UpdateRequest(UpdateRequest {
            company_id,
            request_id,
            actor_id,
            changes,
            occurred_at: self.clock.now(),
        });
        self.execute(company_id, request_id, command)
            .inspect_err(|e| rejected("update_request", e))
    }

    #[instrument(
        skip_all,
        fields(company_id = %input.company_id, request_id = %input.request_id, target = %input.target),
        err
    )]
    pub fn transition_request(&self, input: TransitionInput) -> Result<RequestView, ServiceError> {
        self.transition_inner(input).inspect_err(|e| rejected("transition_request", e))
    }

    #[instrument(skip(self), fields(company_id = %company_id, request_id = %request_id, line_id = %line_id), err)]
    pub fn toggle_exception(
        &self,
        company_id: CompanyId,
        request_id: RequestId,
        line_id: LineId,
        actor_id: UserId,
    ) -> Result<RequestView, ServiceError> {
        let command = PpeRequestCommand::ToggleException(ToggleException {
            company_id,
            request_id,
            line_id,
            actor_id,
            occurred_at: self.clock.now(),
        });
        self.execute(company_id, request_id, command)
            .inspect_err(|e| rejected("toggle_exception", e))
    }

    #[instrument(skip(self), fields(company_id = %company_id, request_id = %request_id, epp_id = %epp_id), err)]
    pub fn add_line_item(
        &self,
        company_id: CompanyId,
        request_id: RequestId,
        epp_id: EppId,
        quantity: i64,
        actor_id: UserId,
    ) -> Result<RequestView, ServiceError> {
        self.add_line_inner(company_id, request_id, epp_id, quantity, actor_id)
            .inspect_err(|e| rejected("add_line_item", e))
    }

    /// Soft-delete a request. Not allowed once delivered.
    #[instrument(skip(self), fields(company_id = %company_id, request_id = %request_id), err)]
    pub fn remove_request(
        &self,
        company_id: CompanyId,
        request_id: RequestId,
        actor_id: UserId,
    ) -> Result<(), ServiceError> {
        let command = PpeRequestCommand::RemoveRequest(RemoveRequest {
            company_id,
            request_id,
            actor_id,
            occurred_at: self.clock.now(),
        });
        self.dispatch(company_id, request_id, command)
            .map(|_| ())
            .inspect_err(|e| rejected("remove_request", e))
    }

    pub fn get_request(&self, company_id: CompanyId, request_id: RequestId) -> Result<RequestView, ServiceError> {
        self.projection
            .get(company_id, request_id)
            .ok_or_else(|| ServiceError::NotFound(format!("request {request_id}")))
    }

    /// Live requests of a company, newest first.
    pub fn list_requests(&self, company_id: CompanyId) -> Vec<RequestRecord> {
        self.projection.list(company_id)
    }

    /// Full Kardex of one worker, evaluated now.
    #[instrument(skip(self), fields(worker_id = %worker_id), err)]
    pub fn get_kardex(&self, worker_id: WorkerId) -> Result<WorkerKardex, ServiceError> {
        let worker = self
            .workers
            .get_worker(worker_id)
            .ok_or_else(|| ServiceError::NotFound(format!("worker {worker_id}")))?;

        let history: Vec<DeliveredRequest> = self
            .projection
            .delivered(worker.company_id, Some(worker_id))
            .iter()
            .map(|view| delivered_request(view, &worker.full_name))
            .collect();
        let terms = self.terms_for(&history);

        Ok(build_worker_kardex(
            worker_id,
            worker.full_name,
            &history,
            &terms,
            self.clock.now(),
        ))
    }

    /// One row per worker across `company_ids`, evaluated now.
    #[instrument(skip(self, filter), fields(companies = company_ids.len()))]
    pub fn get_kardex_list(&self, company_ids: &[CompanyId], filter: &KardexFilter) -> Vec<KardexRow> {
        let companies: BTreeSet<CompanyId> = company_ids.iter().copied().collect();
        let mut names: HashMap<WorkerId, String> = HashMap::new();
        let mut history = Vec::new();

        for company_id in &companies {
            for view in self.projection.delivered(*company_id, None) {
                let worker_id = view.request.worker_id;
                let name = names
                    .entry(worker_id)
                    .or_insert_with(|| {
                        self.workers
                            .get_worker(worker_id)
                            .map(|w| w.full_name)
                            .unwrap_or_else(|| worker_id.to_string())
                    })
                    .clone();
                history.push(delivered_request(&view, &name));
            }
        }

        let terms = self.terms_for(&history);
        let rows = build_kardex_list(&history, company_ids, &terms, filter, self.clock.now());
        info!(rows = rows.len(), "kardex list evaluated");
        rows
    }

    /// Rebuild the request record sets from the event store.
    ///
    /// Returns the number of events replayed.
    pub fn rebuild_read_models(&self) -> Result<usize, ServiceError> {
        let events = self.dispatcher.store().load_by_aggregate_type(AGGREGATE_TYPE)?;
        let count = events.len();
        self.projection
            .rebuild_from_scratch(events.iter().map(StoredEvent::to_envelope))?;
        info!(events = count, "request read models rebuilt");
        Ok(count)
    }

    fn create_inner(&self, input: NewRequest) -> Result<RequestView, ServiceError> {
        let worker = self
            .workers
            .get_worker(input.worker_id)
            .ok_or_else(|| ServiceError::NotFound(format!("worker {}", input.worker_id)))?;
        if worker.company_id != input.company_id {
            return Err(ServiceError::CrossTenant(format!(
                "worker {} belongs to another company",
                input.worker_id
            )));
        }

        let lines = input
            .lines
            .iter()
            .map(|l| {
                let item = self.catalog_item(l.epp_id)?;
                Ok(NewLine {
                    line_id: LineId::new(AggregateId::new()),
                    epp_id: l.epp_id,
                    quantity: l.quantity,
                    item_company_id: item.company_id,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        // Count-then-assign: two concurrent creations can observe the same count.
        let now = self.clock.now();
        let created_this_year = self.projection.count_created_in_year(input.company_id, now.year());
        let code = self.codes.code_for(now.year(), created_this_year);

        let request_id = RequestId::new(AggregateId::new());
        let command = PpeRequestCommand::CreateRequest(CreateRequest {
            company_id: input.company_id,
            request_id,
            code: code.clone(),
            requester_id: input.requester_id,
            worker_id: input.worker_id,
            lines,
            metadata: input.metadata,
            occurred_at: now,
        });

        let view = self.execute(input.company_id, request_id, command)?;
        info!(request_id = %request_id, code = %code, "request created");
        Ok(view)
    }

    fn transition_inner(&self, input: TransitionInput) -> Result<RequestView, ServiceError> {
        let item_snapshots = if input.target == RequestStatus::Entregada {
            self.item_snapshots(input.company_id, input.request_id)?
        } else {
            Vec::new()
        };

        let command = PpeRequestCommand::TransitionRequest(TransitionRequest {
            company_id: input.company_id,
            request_id: input.request_id,
            target: input.target,
            actor_id: input.actor_id,
            comments: input.comments,
            receipt_signature: input.receipt_signature,
            item_snapshots,
            occurred_at: self.clock.now(),
        });

        let view = self.execute(input.company_id, input.request_id, command)?;
        info!(status = %view.request.status, "request transitioned");
        Ok(view)
    }

    fn add_line_inner(
        &self,
        company_id: CompanyId,
        request_id: RequestId,
        epp_id: EppId,
        quantity: i64,
        actor_id: UserId,
    ) -> Result<RequestView, ServiceError> {
        let item = self.catalog_item(epp_id)?;
        let command = PpeRequestCommand::AddLine(AddLine {
            company_id,
            request_id,
            line: NewLine {
                line_id: LineId::new(AggregateId::new()),
                epp_id,
                quantity,
                item_company_id: item.company_id,
            },
            actor_id,
            occurred_at: self.clock.now(),
        });
        self.execute(company_id, request_id, command)
    }

    /// Current catalog data for every item on the request, frozen into the
    /// delivery event. Items missing from the catalog are left out; the
    /// aggregate rejects the delivery for them.
    fn item_snapshots(&self, company_id: CompanyId, request_id: RequestId) -> Result<Vec<ItemSnapshot>, ServiceError> {
        let request: PpeRequest = self.dispatcher.load(company_id, request_id.0, make_request)?;
        let ids: BTreeSet<EppId> = request.lines().iter().map(|l| l.epp_id).collect();

        Ok(ids
            .into_iter()
            .filter_map(|epp_id| self.catalog.get_item(epp_id))
            .map(|item| ItemSnapshot {
                epp_id: item.id,
                snapshot: LineSnapshot {
                    item_name: item.name,
                    category: item.category,
                },
            })
            .collect())
    }

    fn catalog_item(&self, epp_id: EppId) -> Result<CatalogItem, ServiceError> {
        self.catalog
            .get_item(epp_id)
            .ok_or_else(|| ServiceError::NotFound(format!("catalog item {epp_id}")))
    }

    fn terms_for(&self, history: &[DeliveredRequest]) -> CatalogTerms {
        let ids: BTreeSet<EppId> = history
            .iter()
            .flat_map(|r| r.lines.iter().map(|l| l.epp_id))
            .collect();
        let items: Vec<CatalogItem> = ids.into_iter().filter_map(|id| self.catalog.get_item(id)).collect();
        items.iter().collect()
    }

    fn dispatch(
        &self,
        company_id: CompanyId,
        request_id: RequestId,
        command: PpeRequestCommand,
    ) -> Result<Vec<StoredEvent>, ServiceError> {
        let committed = self
            .dispatcher
            .dispatch(company_id, request_id.0, AGGREGATE_TYPE, command, make_request)?;

        if !committed.is_empty() {
            self.catch_up(company_id, request_id)?;
        }
        Ok(committed)
    }

    /// Apply every stored event of the stream past the projection cursor.
    ///
    /// Events committed by other writers on the same store land in order
    /// ahead of ours.
    fn catch_up(&self, company_id: CompanyId, request_id: RequestId) -> Result<(), ServiceError> {
        let position = self.projection.position(company_id, request_id.0);
        let stream = self.dispatcher.store().load_stream(company_id, request_id.0)?;
        for stored in stream.iter().filter(|s| s.sequence_number > position) {
            self.projection.apply_envelope(&stored.to_envelope())?;
        }
        Ok(())
    }

    fn execute(
        &self,
        company_id: CompanyId,
        request_id: RequestId,
        command: PpeRequestCommand,
    ) -> Result<RequestView, ServiceError> {
        self.dispatch(company_id, request_id, command)?;
        self.get_request(company_id, request_id)
    }
}

fn make_request(_: CompanyId, id: AggregateId) -> PpeRequest {
    PpeRequest::empty(RequestId::new(id))
}

fn rejected(operation: &'static str, err: &ServiceError) {
    warn!(operation, kind = err.kind(), error = %err, "request operation rejected");
}

fn delivered_request(view: &RequestView, worker_name: &str) -> DeliveredRequest {
    let request = &view.request;
    DeliveredRequest {
        request_id: request.request_id,
        code: request.code.clone(),
        company_id: request.company_id,
        worker_id: request.worker_id,
        worker_name: worker_name.to_string(),
        area: request.metadata.area.clone(),
        unit: request.metadata.unit.clone(),
        site: request.metadata.site.clone(),
        delivered_at: request.delivered_at(),
        lines: view
            .lines
            .iter()
            .map(|l| DeliveredLine {
                line_id: l.line_id,
                epp_id: l.epp_id,
                quantity: l.quantity,
                excepted: l.excepted,
                delivered_at: l.delivered_at,
                snapshot: l.item_name.clone().zip(l.item_category).map(|(item_name, category)| {
                    LineSnapshot { item_name, category }
                }),
            })
            .collect(),
    }
}
