use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kardex_catalog::EppId;
use kardex_core::{Aggregate, AggregateId, AggregateRoot, CompanyId, DomainError, UserId, WorkerId};
use kardex_events::Event;

use crate::code::RequestCode;
use crate::line::{ItemSnapshot, LineId, LineSnapshot, NewLine, RequestLine};
use crate::status::RequestStatus;

/// Stream type under which request events are stored.
pub const AGGREGATE_TYPE: &str = "requests.request";

/// Request identifier (company-scoped via `company_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub AggregateId);

impl RequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Descriptive fields captured at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub area: Option<String>,
    pub unit: Option<String>,
    pub site: Option<String>,
    pub motive: Option<String>,
    pub cost_center: Option<String>,
    pub comments: Option<String>,
}

/// Partial edit of business fields; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUpdate {
    pub area: Option<String>,
    pub unit: Option<String>,
    pub site: Option<String>,
    pub motive: Option<String>,
    pub cost_center: Option<String>,
    pub comments: Option<String>,
}

impl RequestUpdate {
    pub fn is_empty(&self) -> bool {
        self.area.is_none()
            && self.unit.is_none()
            && self.site.is_none()
            && self.motive.is_none()
            && self.cost_center.is_none()
            && self.comments.is_none()
    }

    pub fn apply_to(&self, metadata: &mut RequestMetadata) {
        let fields = [
            (&self.area, &mut metadata.area),
            (&self.unit, &mut metadata.unit),
            (&self.site, &mut metadata.site),
            (&self.motive, &mut metadata.motive),
            (&self.cost_center, &mut metadata.cost_center),
            (&self.comments, &mut metadata.comments),
        ];
        for (change, field) in fields {
            if let Some(value) = change {
                *field = Some(value.clone());
            }
        }
    }
}

/// Who approved the request, when, and with which remarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStamp {
    pub approver_id: UserId,
    pub approved_at: DateTime<Utc>,
    pub comments: Option<String>,
}

/// Who handed the equipment over, when, and the receipt-signature reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStamp {
    pub deliverer_id: UserId,
    pub delivered_at: DateTime<Utc>,
    pub receipt_signature: Option<String>,
}

/// Per-line facts recorded when a request is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDelivery {
    pub line_id: LineId,
    pub delivered_at: Option<DateTime<Utc>>,
    pub snapshot: Option<LineSnapshot>,
}

/// Aggregate root: PpeRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpeRequest {
    id: RequestId,
    company_id: Option<CompanyId>,
    code: Option<RequestCode>,
    requester_id: Option<UserId>,
    worker_id: Option<WorkerId>,
    status: RequestStatus,
    metadata: RequestMetadata,
    observations: Option<String>,
    approval: Option<ApprovalStamp>,
    delivery: Option<DeliveryStamp>,
    lines: Vec<RequestLine>,
    created_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl PpeRequest {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RequestId) -> Self {
        Self {
            id,
            company_id: None,
            code: None,
            requester_id: None,
            worker_id: None,
            status: RequestStatus::Pendiente,
            metadata: RequestMetadata::default(),
            observations: None,
            approval: None,
            delivery: None,
            lines: Vec::new(),
            created_at: None,
            deleted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RequestId {
        self.id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn code(&self) -> Option<&RequestCode> {
        self.code.as_ref()
    }

    pub fn requester_id(&self) -> Option<UserId> {
        self.requester_id
    }

    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker_id
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    pub fn observations(&self) -> Option<&str> {
        self.observations.as_deref()
    }

    pub fn approval(&self) -> Option<&ApprovalStamp> {
        self.approval.as_ref()
    }

    pub fn delivery(&self) -> Option<&DeliveryStamp> {
        self.delivery.as_ref()
    }

    pub fn lines(&self) -> &[RequestLine] {
        &self.lines
    }

    pub fn line(&self, line_id: LineId) -> Option<&RequestLine> {
        self.lines.iter().find(|l| l.line_id == line_id)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_removed(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Lines that were actually handed over (empty until delivery).
    pub fn delivered_lines(&self) -> impl Iterator<Item = &RequestLine> {
        let delivered = self.status == RequestStatus::Entregada;
        self.lines
            .iter()
            .filter(move |l| delivered && l.counts_toward_delivery())
    }

    pub fn delivered_quantity(&self) -> i64 {
        self.delivered_lines().map(|l| l.quantity).sum()
    }
}

impl AggregateRoot for PpeRequest {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub code: RequestCode,
    pub requester_id: UserId,
    pub worker_id: WorkerId,
    pub lines: Vec<NewLine>,
    pub metadata: RequestMetadata,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateRequest (only allowed in Observada).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub actor_id: UserId,
    pub changes: RequestUpdate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionRequest.
///
/// `item_snapshots` must cover every line's item when the target is Entregada;
/// it is ignored otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub target: RequestStatus,
    pub actor_id: UserId,
    pub comments: Option<String>,
    pub receipt_signature: Option<String>,
    pub item_snapshots: Vec<ItemSnapshot>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ToggleException (only allowed in Observada).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleException {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub line_id: LineId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (only allowed in Observada or Aprobada).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub line: NewLine,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveRequest (soft delete; not allowed once delivered).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PpeRequestCommand {
    CreateRequest(CreateRequest),
    UpdateRequest(UpdateRequest),
    TransitionRequest(TransitionRequest),
    ToggleException(ToggleException),
    AddLine(AddLine),
    RemoveRequest(RemoveRequest),
}

/// Event: RequestCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCreated {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub code: RequestCode,
    pub requester_id: UserId,
    pub worker_id: WorkerId,
    pub metadata: RequestMetadata,
    pub lines: Vec<RequestLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUpdated {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub actor_id: UserId,
    pub changes: RequestUpdate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestTransitioned.
///
/// Stamps are only present when they were written by this transition; an
/// absent stamp never clears an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTransitioned {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub actor_id: UserId,
    pub comments: Option<String>,
    pub approval: Option<ApprovalStamp>,
    pub delivery: Option<DeliveryStamp>,
    pub line_deliveries: Vec<LineDelivery>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineExceptionToggled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineExceptionToggled {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub line_id: LineId,
    pub excepted: bool,
    pub excepted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub line: RequestLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRemoved {
    pub company_id: CompanyId,
    pub request_id: RequestId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PpeRequestEvent {
    RequestCreated(RequestCreated),
    RequestUpdated(RequestUpdated),
    RequestTransitioned(RequestTransitioned),
    LineExceptionToggled(LineExceptionToggled),
    LineAdded(LineAdded),
    RequestRemoved(RequestRemoved),
}

impl PpeRequestEvent {
    pub fn company_id(&self) -> CompanyId {
        match self {
            PpeRequestEvent::RequestCreated(e) => e.company_id,
            PpeRequestEvent::RequestUpdated(e) => e.company_id,
            PpeRequestEvent::RequestTransitioned(e) => e.company_id,
            PpeRequestEvent::LineExceptionToggled(e) => e.company_id,
            PpeRequestEvent::LineAdded(e) => e.company_id,
            PpeRequestEvent::RequestRemoved(e) => e.company_id,
        }
    }

    pub fn request_id(&self) -> RequestId {
        match self {
            PpeRequestEvent::RequestCreated(e) => e.request_id,
            PpeRequestEvent::RequestUpdated(e) => e.request_id,
            PpeRequestEvent::RequestTransitioned(e) => e.request_id,
            PpeRequestEvent::LineExceptionToggled(e) => e.request_id,
            PpeRequestEvent::LineAdded(e) => e.request_id,
            PpeRequestEvent::RequestRemoved(e) => e.request_id,
        }
    }
}

impl Event for PpeRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PpeRequestEvent::RequestCreated(_) => "requests.request.created",
            PpeRequestEvent::RequestUpdated(_) => "requests.request.updated",
            PpeRequestEvent::RequestTransitioned(_) => "requests.request.transitioned",
            PpeRequestEvent::LineExceptionToggled(_) => "requests.request.line_exception_toggled",
            PpeRequestEvent::LineAdded(_) => "requests.request.line_added",
            PpeRequestEvent::RequestRemoved(_) => "requests.request.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PpeRequestEvent::RequestCreated(e) => e.occurred_at,
            PpeRequestEvent::RequestUpdated(e) => e.occurred_at,
            PpeRequestEvent::RequestTransitioned(e) => e.occurred_at,
            PpeRequestEvent::LineExceptionToggled(e) => e.occurred_at,
            PpeRequestEvent::LineAdded(e) => e.occurred_at,
            PpeRequestEvent::RequestRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PpeRequest {
    type Command = PpeRequestCommand;
    type Event = PpeRequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PpeRequestEvent::RequestCreated(e) => {
                self.id = e.request_id;
                self.company_id = Some(e.company_id);
                self.code = Some(e.code.clone());
                self.requester_id = Some(e.requester_id);
                self.worker_id = Some(e.worker_id);
                self.status = RequestStatus::Pendiente;
                self.metadata = e.metadata.clone();
                self.lines = e.lines.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            PpeRequestEvent::RequestUpdated(e) => {
                e.changes.apply_to(&mut self.metadata);
            }
            PpeRequestEvent::RequestTransitioned(e) => {
                self.status = e.to;
                if matches!(e.to, RequestStatus::Observada | RequestStatus::Rechazada)
                    && e.comments.is_some()
                {
                    self.observations = e.comments.clone();
                }
                if self.approval.is_none() {
                    self.approval = e.approval.clone();
                }
                if self.delivery.is_none() {
                    self.delivery = e.delivery.clone();
                }
                for d in &e.line_deliveries {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_id == d.line_id) {
                        if let Some(at) = d.delivered_at {
                            line.stamp_delivery(at);
                        }
                        if let Some(snapshot) = &d.snapshot {
                            line.capture_snapshot(snapshot.clone());
                        }
                    }
                }
            }
            PpeRequestEvent::LineExceptionToggled(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_id == e.line_id) {
                    line.set_exception(e.excepted, e.excepted_by);
                }
            }
            PpeRequestEvent::LineAdded(e) => {
                self.lines.push(e.line.clone());
            }
            PpeRequestEvent::RequestRemoved(e) => {
                self.deleted_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PpeRequestCommand::CreateRequest(cmd) => self.handle_create(cmd),
            PpeRequestCommand::UpdateRequest(cmd) => self.handle_update(cmd),
            PpeRequestCommand::TransitionRequest(cmd) => self.handle_transition(cmd),
            PpeRequestCommand::ToggleException(cmd) => self.handle_toggle_exception(cmd),
            PpeRequestCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PpeRequestCommand::RemoveRequest(cmd) => self.handle_remove(cmd),
        }
    }
}

impl PpeRequest {
    /// Common guard: the request exists, is live, and is addressed correctly.
    fn ensure_live(&self, company_id: CompanyId, request_id: RequestId) -> Result<(), DomainError> {
        if !self.created || self.is_removed() {
            return Err(DomainError::not_found(format!("request {request_id}")));
        }
        if self.company_id != Some(company_id) {
            return Err(DomainError::cross_tenant(format!(
                "request {request_id} belongs to another company"
            )));
        }
        if self.id != request_id {
            return Err(DomainError::invariant("request_id mismatch"));
        }
        Ok(())
    }

    fn validate_new_line(company_id: CompanyId, line: &NewLine) -> Result<(), DomainError> {
        if line.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "quantity must be positive (item {}, got {})",
                line.epp_id, line.quantity
            )));
        }
        if line.item_company_id != company_id {
            return Err(DomainError::cross_tenant(format!(
                "catalog item {} belongs to another company",
                line.epp_id
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateRequest) -> Result<Vec<PpeRequestEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("request already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("a request needs at least one line"));
        }
        for line in &cmd.lines {
            Self::validate_new_line(cmd.company_id, line)?;
        }

        let lines = cmd
            .lines
            .iter()
            .map(|l| RequestLine::original(l.line_id, l.epp_id, l.quantity))
            .collect();

        Ok(vec![PpeRequestEvent::RequestCreated(RequestCreated {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            code: cmd.code.clone(),
            requester_id: cmd.requester_id,
            worker_id: cmd.worker_id,
            metadata: cmd.metadata.clone(),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateRequest) -> Result<Vec<PpeRequestEvent>, DomainError> {
        self.ensure_live(cmd.company_id, cmd.request_id)?;

        if !self.status.permits_update() {
            return Err(DomainError::immutable(format!(
                "request fields can only be edited while observada (current: {})",
                self.status
            )));
        }
        if cmd.changes.is_empty() {
            return Err(DomainError::validation("update carries no fields"));
        }

        Ok(vec![PpeRequestEvent::RequestUpdated(RequestUpdated {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            actor_id: cmd.actor_id,
            changes: cmd.changes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(
        &self,
        cmd: &TransitionRequest,
    ) -> Result<Vec<PpeRequestEvent>, DomainError> {
        self.ensure_live(cmd.company_id, cmd.request_id)?;

        if !self.status.can_transition_to(cmd.target) {
            return Err(DomainError::invalid_transition(self.status, cmd.target));
        }

        let approval = (cmd.target == RequestStatus::Aprobada && self.approval.is_none()).then(|| {
            ApprovalStamp {
                approver_id: cmd.actor_id,
                approved_at: cmd.occurred_at,
                comments: cmd.comments.clone(),
            }
        });

        let (delivery, line_deliveries) = if cmd.target == RequestStatus::Entregada {
            let delivery = self.delivery.is_none().then(|| DeliveryStamp {
                deliverer_id: cmd.actor_id,
                delivered_at: cmd.occurred_at,
                receipt_signature: cmd.receipt_signature.clone(),
            });
            (delivery, self.decide_line_deliveries(cmd)?)
        } else {
            (None, Vec::new())
        };

        Ok(vec![PpeRequestEvent::RequestTransitioned(RequestTransitioned {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            from: self.status,
            to: cmd.target,
            actor_id: cmd.actor_id,
            comments: cmd.comments.clone(),
            approval,
            delivery,
            line_deliveries,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Delivery stamps go to non-excepted lines; snapshots are captured for every
    /// line so the delivered document can still name excepted items.
    fn decide_line_deliveries(
        &self,
        cmd: &TransitionRequest,
    ) -> Result<Vec<LineDelivery>, DomainError> {
        let mut out = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            let delivered_at = (line.counts_toward_delivery() && line.delivered_at().is_none())
                .then_some(cmd.occurred_at);

            let snapshot = if line.snapshot().is_some() {
                None
            } else {
                let found = snapshot_for(&cmd.item_snapshots, line.epp_id).ok_or_else(|| {
                    DomainError::not_found(format!("catalog item {}", line.epp_id))
                })?;
                Some(found.clone())
            };

            if delivered_at.is_some() || snapshot.is_some() {
                out.push(LineDelivery {
                    line_id: line.line_id,
                    delivered_at,
                    snapshot,
                });
            }
        }
        Ok(out)
    }

    fn handle_toggle_exception(
        &self,
        cmd: &ToggleException,
    ) -> Result<Vec<PpeRequestEvent>, DomainError> {
        self.ensure_live(cmd.company_id, cmd.request_id)?;

        if !self.status.permits_exception_toggle() {
            return Err(DomainError::immutable(format!(
                "line exceptions can only be toggled while observada (current: {})",
                self.status
            )));
        }

        let line = self
            .line(cmd.line_id)
            .ok_or_else(|| DomainError::not_found(format!("line {}", cmd.line_id)))?;
        let (excepted, excepted_by) = line.toggled_exception(cmd.actor_id);

        Ok(vec![PpeRequestEvent::LineExceptionToggled(LineExceptionToggled {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            line_id: cmd.line_id,
            excepted,
            excepted_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PpeRequestEvent>, DomainError> {
        self.ensure_live(cmd.company_id, cmd.request_id)?;

        if !self.status.permits_line_addition() {
            return Err(DomainError::immutable(format!(
                "lines can only be added while observada or aprobada (current: {})",
                self.status
            )));
        }
        Self::validate_new_line(cmd.company_id, &cmd.line)?;
        if self.line(cmd.line.line_id).is_some() {
            return Err(DomainError::conflict(format!("line {} already exists", cmd.line.line_id)));
        }

        Ok(vec![PpeRequestEvent::LineAdded(LineAdded {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            line: RequestLine::manual_addition(
                cmd.line.line_id,
                cmd.line.epp_id,
                cmd.line.quantity,
                cmd.actor_id,
            ),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveRequest) -> Result<Vec<PpeRequestEvent>, DomainError> {
        self.ensure_live(cmd.company_id, cmd.request_id)?;

        if !self.status.permits_removal() {
            return Err(DomainError::immutable(
                "delivered requests are retained and cannot be removed",
            ));
        }

        Ok(vec![PpeRequestEvent::RequestRemoved(RequestRemoved {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn snapshot_for(snapshots: &[ItemSnapshot], epp_id: EppId) -> Option<&LineSnapshot> {
    snapshots.iter().find(|s| s.epp_id == epp_id).map(|s| &s.snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use kardex_catalog::ItemCategory;

    use crate::code::CodeFormat;

    struct Fixture {
        company_id: CompanyId,
        request_id: RequestId,
        actor: UserId,
        items: Vec<EppId>,
        now: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                company_id: CompanyId::new(),
                request_id: RequestId::new(AggregateId::new()),
                actor: UserId::new(),
                items: vec![EppId::new(AggregateId::new()), EppId::new(AggregateId::new())],
                now: Utc.with_ymd_and_hms(2024, 1, 10, 8, 30, 0).unwrap(),
            }
        }

        fn new_line(&self, epp_id: EppId, quantity: i64) -> NewLine {
            NewLine {
                line_id: LineId::new(AggregateId::new()),
                epp_id,
                quantity,
                item_company_id: self.company_id,
            }
        }

        fn create_cmd(&self, lines: Vec<NewLine>) -> PpeRequestCommand {
            PpeRequestCommand::CreateRequest(CreateRequest {
                company_id: self.company_id,
                request_id: self.request_id,
                code: CodeFormat::default().code_for(2024, 0),
                requester_id: self.actor,
                worker_id: WorkerId::new(),
                lines,
                metadata: RequestMetadata {
                    area: Some("Maintenance".into()),
                    ..RequestMetadata::default()
                },
                occurred_at: self.now,
            })
        }

        fn snapshots(&self) -> Vec<ItemSnapshot> {
            self.items
                .iter()
                .enumerate()
                .map(|(i, id)| ItemSnapshot {
                    epp_id: *id,
                    snapshot: LineSnapshot {
                        item_name: format!("Item {i}"),
                        category: ItemCategory::Ppe,
                    },
                })
                .collect()
        }

        fn transition_cmd(&self, target: RequestStatus, at: DateTime<Utc>) -> PpeRequestCommand {
            PpeRequestCommand::TransitionRequest(TransitionRequest {
                company_id: self.company_id,
                request_id: self.request_id,
                target,
                actor_id: self.actor,
                comments: None,
                receipt_signature: Some("sig-001".into()),
                item_snapshots: self.snapshots(),
                occurred_at: at,
            })
        }

        fn created(&self) -> PpeRequest {
            let mut request = PpeRequest::empty(self.request_id);
            let lines = self.items.iter().map(|id| self.new_line(*id, 2)).collect();
            execute(&mut request, &self.create_cmd(lines)).unwrap();
            request
        }

        fn in_state(&self, path: &[RequestStatus]) -> PpeRequest {
            let mut request = self.created();
            for (i, target) in path.iter().enumerate() {
                let at = self.now + Duration::hours(i as i64 + 1);
                execute(&mut request, &self.transition_cmd(*target, at)).unwrap();
            }
            request
        }
    }

    fn execute(
        request: &mut PpeRequest,
        cmd: &PpeRequestCommand,
    ) -> Result<Vec<PpeRequestEvent>, DomainError> {
        let events = request.handle(cmd)?;
        for e in &events {
            request.apply(e);
        }
        Ok(events)
    }

    fn path_to(status: RequestStatus) -> Vec<RequestStatus> {
        use RequestStatus::*;
        match status {
            Pendiente => vec![],
            Observada => vec![Observada],
            Aprobada => vec![Aprobada],
            Entregada => vec![Aprobada, Entregada],
            Rechazada => vec![Rechazada],
        }
    }

    #[test]
    fn create_starts_pending_with_lines() {
        let fx = Fixture::new();
        let request = fx.created();

        assert_eq!(request.status(), RequestStatus::Pendiente);
        assert_eq!(request.lines().len(), 2);
        assert_eq!(request.code().unwrap().as_str(), "EPP-2024-0001");
        assert_eq!(request.version(), 1);
    }

    #[test]
    fn create_without_lines_is_rejected() {
        let fx = Fixture::new();
        let err = PpeRequest::empty(fx.request_id)
            .handle(&fx.create_cmd(vec![]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_with_non_positive_quantity_is_rejected() {
        let fx = Fixture::new();
        let lines = vec![fx.new_line(fx.items[0], 1), fx.new_line(fx.items[1], 0)];
        let err = PpeRequest::empty(fx.request_id)
            .handle(&fx.create_cmd(lines))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_with_foreign_catalog_item_is_rejected() {
        let fx = Fixture::new();
        let mut line = fx.new_line(fx.items[0], 1);
        line.item_company_id = CompanyId::new();
        let err = PpeRequest::empty(fx.request_id)
            .handle(&fx.create_cmd(vec![line]))
            .unwrap_err();
        assert!(matches!(err, DomainError::CrossTenant(_)));
    }

    #[test]
    fn approved_request_cannot_go_back_to_observed() {
        let fx = Fixture::new();
        let request = fx.in_state(&[RequestStatus::Aprobada]);

        let err = request
            .handle(&fx.transition_cmd(RequestStatus::Observada, fx.now))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: "aprobada".into(),
                to: "observada".into()
            }
        );
    }

    #[test]
    fn approval_stamp_is_written_once() {
        let fx = Fixture::new();
        let mut request = fx.in_state(&[RequestStatus::Aprobada]);
        let stamp = request.approval().cloned().unwrap();
        assert_eq!(stamp.approver_id, fx.actor);

        // A replayed transition carrying a stamp must not overwrite history.
        request.apply(&PpeRequestEvent::RequestTransitioned(RequestTransitioned {
            company_id: fx.company_id,
            request_id: fx.request_id,
            from: RequestStatus::Aprobada,
            to: RequestStatus::Aprobada,
            actor_id: UserId::new(),
            comments: None,
            approval: Some(ApprovalStamp {
                approver_id: UserId::new(),
                approved_at: fx.now + Duration::days(3),
                comments: Some("again".into()),
            }),
            delivery: None,
            line_deliveries: vec![],
            occurred_at: fx.now + Duration::days(3),
        }));
        assert_eq!(request.approval(), Some(&stamp));
    }

    #[test]
    fn delivery_stamps_request_and_non_excepted_lines() {
        let fx = Fixture::new();
        let mut request = fx.in_state(&[RequestStatus::Observada]);
        let excepted_line = request.lines()[1].line_id;
        execute(
            &mut request,
            &PpeRequestCommand::ToggleException(ToggleException {
                company_id: fx.company_id,
                request_id: fx.request_id,
                line_id: excepted_line,
                actor_id: fx.actor,
                occurred_at: fx.now,
            }),
        )
        .unwrap();

        let delivered_at = fx.now + Duration::days(1);
        execute(&mut request, &fx.transition_cmd(RequestStatus::Aprobada, fx.now)).unwrap();
        execute(&mut request, &fx.transition_cmd(RequestStatus::Entregada, delivered_at)).unwrap();

        let delivery = request.delivery().unwrap();
        assert_eq!(delivery.delivered_at, delivered_at);
        assert_eq!(delivery.receipt_signature.as_deref(), Some("sig-001"));

        assert_eq!(request.lines()[0].delivered_at(), Some(delivered_at));
        assert_eq!(request.line(excepted_line).unwrap().delivered_at(), None);
        assert!(request.lines().iter().all(|l| l.snapshot().is_some()));
        assert_eq!(request.delivered_quantity(), 2);
        assert_eq!(request.delivered_lines().count(), 1);
    }

    #[test]
    fn delivery_requires_catalog_data_for_every_line() {
        let fx = Fixture::new();
        let request = fx.in_state(&[RequestStatus::Aprobada]);
        let mut cmd = fx.transition_cmd(RequestStatus::Entregada, fx.now);
        if let PpeRequestCommand::TransitionRequest(t) = &mut cmd {
            t.item_snapshots.truncate(1);
        }
        assert!(matches!(request.handle(&cmd), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn delivered_request_rejects_update_remove_and_additions() {
        let fx = Fixture::new();
        let request = fx.in_state(&path_to(RequestStatus::Entregada));

        let update = PpeRequestCommand::UpdateRequest(UpdateRequest {
            company_id: fx.company_id,
            request_id: fx.request_id,
            actor_id: fx.actor,
            changes: RequestUpdate {
                motive: Some("replacement".into()),
                ..RequestUpdate::default()
            },
            occurred_at: fx.now,
        });
        assert!(matches!(request.handle(&update), Err(DomainError::ImmutableState(_))));

        let remove = PpeRequestCommand::RemoveRequest(RemoveRequest {
            company_id: fx.company_id,
            request_id: fx.request_id,
            actor_id: fx.actor,
            occurred_at: fx.now,
        });
        assert!(matches!(request.handle(&remove), Err(DomainError::ImmutableState(_))));

        let add = PpeRequestCommand::AddLine(AddLine {
            company_id: fx.company_id,
            request_id: fx.request_id,
            line: fx.new_line(fx.items[0], 1),
            actor_id: fx.actor,
            occurred_at: fx.now,
        });
        assert!(matches!(request.handle(&add), Err(DomainError::ImmutableState(_))));
    }

    #[test]
    fn update_only_while_observed() {
        let fx = Fixture::new();
        let update = |request: &PpeRequest| {
            request.handle(&PpeRequestCommand::UpdateRequest(UpdateRequest {
                company_id: fx.company_id,
                request_id: fx.request_id,
                actor_id: fx.actor,
                changes: RequestUpdate {
                    cost_center: Some("CC-77".into()),
                    ..RequestUpdate::default()
                },
                occurred_at: fx.now,
            }))
        };

        assert!(matches!(update(&fx.created()), Err(DomainError::ImmutableState(_))));

        let mut observed = fx.in_state(&[RequestStatus::Observada]);
        let events = update(&observed).unwrap();
        observed.apply(&events[0]);
        assert_eq!(observed.metadata().cost_center.as_deref(), Some("CC-77"));
        assert_eq!(observed.metadata().area.as_deref(), Some("Maintenance"));
    }

    #[test]
    fn toggle_exception_twice_restores_line() {
        let fx = Fixture::new();
        let mut request = fx.in_state(&[RequestStatus::Observada]);
        let line_id = request.lines()[0].line_id;
        let before = request.line(line_id).cloned().unwrap();

        let toggle = PpeRequestCommand::ToggleException(ToggleException {
            company_id: fx.company_id,
            request_id: fx.request_id,
            line_id,
            actor_id: fx.actor,
            occurred_at: fx.now,
        });
        execute(&mut request, &toggle).unwrap();
        assert!(request.line(line_id).unwrap().excepted);
        assert_eq!(request.line(line_id).unwrap().excepted_by, Some(fx.actor));

        execute(&mut request, &toggle).unwrap();
        assert_eq!(request.line(line_id), Some(&before));
    }

    #[test]
    fn toggle_exception_outside_observed_is_rejected() {
        let fx = Fixture::new();
        let request = fx.created();
        let cmd = PpeRequestCommand::ToggleException(ToggleException {
            company_id: fx.company_id,
            request_id: fx.request_id,
            line_id: request.lines()[0].line_id,
            actor_id: fx.actor,
            occurred_at: fx.now,
        });
        assert!(matches!(request.handle(&cmd), Err(DomainError::ImmutableState(_))));
    }

    #[test]
    fn toggle_unknown_line_is_not_found() {
        let fx = Fixture::new();
        let request = fx.in_state(&[RequestStatus::Observada]);
        let cmd = PpeRequestCommand::ToggleException(ToggleException {
            company_id: fx.company_id,
            request_id: fx.request_id,
            line_id: LineId::new(AggregateId::new()),
            actor_id: fx.actor,
            occurred_at: fx.now,
        });
        assert!(matches!(request.handle(&cmd), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn add_line_marks_addition_and_checks_company() {
        let fx = Fixture::new();
        let mut request = fx.in_state(&[RequestStatus::Aprobada]);

        let mut foreign = fx.new_line(fx.items[0], 1);
        foreign.item_company_id = CompanyId::new();
        let cross = PpeRequestCommand::AddLine(AddLine {
            company_id: fx.company_id,
            request_id: fx.request_id,
            line: foreign,
            actor_id: fx.actor,
            occurred_at: fx.now,
        });
        assert!(matches!(request.handle(&cross), Err(DomainError::CrossTenant(_))));

        let add = PpeRequestCommand::AddLine(AddLine {
            company_id: fx.company_id,
            request_id: fx.request_id,
            line: fx.new_line(fx.items[1], 3),
            actor_id: fx.actor,
            occurred_at: fx.now,
        });
        execute(&mut request, &add).unwrap();
        let added = request.lines().last().unwrap();
        assert!(added.added);
        assert_eq!(added.added_by, Some(fx.actor));
        assert_eq!(added.quantity, 3);
    }

    #[test]
    fn removed_request_behaves_as_missing() {
        let fx = Fixture::new();
        let mut request = fx.in_state(&[RequestStatus::Rechazada]);
        execute(
            &mut request,
            &PpeRequestCommand::RemoveRequest(RemoveRequest {
                company_id: fx.company_id,
                request_id: fx.request_id,
                actor_id: fx.actor,
                occurred_at: fx.now,
            }),
        )
        .unwrap();

        assert!(request.is_removed());
        let err = request
            .handle(&fx.transition_cmd(RequestStatus::Pendiente, fx.now))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn observation_comments_are_recorded() {
        let fx = Fixture::new();
        let mut request = fx.created();
        let mut cmd = fx.transition_cmd(RequestStatus::Observada, fx.now);
        if let PpeRequestCommand::TransitionRequest(t) = &mut cmd {
            t.comments = Some("wrong glove size".into());
        }
        execute(&mut request, &cmd).unwrap();
        assert_eq!(request.observations(), Some("wrong glove size"));
    }

    #[test]
    fn events_survive_json_round_trip_for_rehydration() {
        let fx = Fixture::new();
        let lines = vec![fx.new_line(fx.items[0], 1)];
        let events = PpeRequest::empty(fx.request_id)
            .handle(&fx.create_cmd(lines))
            .unwrap();
        let json = serde_json::to_value(&events[0]).unwrap();
        let back: PpeRequestEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, events[0]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: a transition succeeds iff the target is in the table row
            /// of the current state.
            #[test]
            fn transition_succeeds_iff_allowed(
                from in proptest::sample::select(RequestStatus::ALL.to_vec()),
                to in proptest::sample::select(RequestStatus::ALL.to_vec()),
            ) {
                let fx = Fixture::new();
                let request = fx.in_state(&path_to(from));
                prop_assert_eq!(request.status(), from);

                let result = request.handle(&fx.transition_cmd(to, fx.now + Duration::days(2)));
                if from.can_transition_to(to) {
                    let events = result.unwrap();
                    prop_assert_eq!(events.len(), 1);
                } else {
                    let is_invalid_transition =
                        matches!(result, Err(DomainError::InvalidTransition { .. }));
                    prop_assert!(is_invalid_transition);
                }
            }

            /// Property: exception toggles are accepted only in Observada and
            /// manual additions only in Observada or Aprobada.
            #[test]
            fn line_commands_follow_the_state_guard(
                state in proptest::sample::select(RequestStatus::ALL.to_vec()),
                quantity in 1i64..50,
            ) {
                let fx = Fixture::new();
                let request = fx.in_state(&path_to(state));
                prop_assert_eq!(request.status(), state);

                let toggle = request.handle(&PpeRequestCommand::ToggleException(ToggleException {
                    company_id: fx.company_id,
                    request_id: fx.request_id,
                    line_id: request.lines()[0].line_id,
                    actor_id: fx.actor,
                    occurred_at: fx.now + Duration::days(2),
                }));
                if state == RequestStatus::Observada {
                    let events = toggle.unwrap();
                    let toggled = matches!(
                        events.as_slice(),
                        [PpeRequestEvent::LineExceptionToggled(e)] if e.excepted
                    );
                    prop_assert!(toggled);
                } else {
                    let immutable = matches!(toggle, Err(DomainError::ImmutableState(_)));
                    prop_assert!(immutable);
                }

                let add = request.handle(&PpeRequestCommand::AddLine(AddLine {
                    company_id: fx.company_id,
                    request_id: fx.request_id,
                    line: fx.new_line(fx.items[1], quantity),
                    actor_id: fx.actor,
                    occurred_at: fx.now + Duration::days(2),
                }));
                if matches!(state, RequestStatus::Observada | RequestStatus::Aprobada) {
                    let events = add.unwrap();
                    let added = matches!(
                        events.as_slice(),
                        [PpeRequestEvent::LineAdded(e)] if e.line.added && e.line.quantity == quantity
                    );
                    prop_assert!(added);
                } else {
                    let immutable = matches!(add, Err(DomainError::ImmutableState(_)));
                    prop_assert!(immutable);
                }
            }

            /// Property: handle never mutates the aggregate.
            #[test]
            fn handle_is_side_effect_free(
                to in proptest::sample::select(RequestStatus::ALL.to_vec()),
            ) {
                let fx = Fixture::new();
                let request = fx.created();
                let before = request.clone();
                let _ = request.handle(&fx.transition_cmd(to, fx.now));
                prop_assert_eq!(request, before);
            }
        }
    }
}
