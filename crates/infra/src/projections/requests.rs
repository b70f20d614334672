//! `requests` / `request_lines` record sets maintained from the request stream.
//!
//! Records are soft-deleted: a removed request keeps its rows with a
//! `deleted_at` timestamp so it still counts toward the yearly code sequence,
//! but it disappears from every other query.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use kardex_catalog::{EppId, ItemCategory};
use kardex_core::{AggregateId, CompanyId, UserId, WorkerId};
use kardex_events::EventEnvelope;
use kardex_requests::{
    ApprovalStamp, DeliveryStamp, LineId, PpeRequestEvent, RequestCode, RequestId, RequestLine,
    RequestMetadata, RequestStatus,
};

use crate::read_model::{CompanyStore, InMemoryCompanyStore};

/// One row of the `requests` record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request_id: RequestId,
    pub company_id: CompanyId,
    pub code: RequestCode,
    pub requester_id: UserId,
    pub worker_id: WorkerId,
    pub status: RequestStatus,
    pub metadata: RequestMetadata,
    pub observations: Option<String>,
    pub approval: Option<ApprovalStamp>,
    pub delivery: Option<DeliveryStamp>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RequestRecord {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivery.as_ref().map(|d| d.delivered_at)
    }
}

/// One row of the `request_lines` record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLineRecord {
    pub line_id: LineId,
    pub request_id: RequestId,
    /// Insertion order within the request.
    pub position: usize,
    pub epp_id: EppId,
    pub quantity: i64,
    pub excepted: bool,
    pub excepted_by: Option<UserId>,
    pub added: bool,
    pub added_by: Option<UserId>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub item_name: Option<String>,
    pub item_category: Option<ItemCategory>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RequestLineRecord {
    fn from_line(request_id: RequestId, position: usize, line: &RequestLine) -> Self {
        Self {
            line_id: line.line_id,
            request_id,
            position,
            epp_id: line.epp_id,
            quantity: line.quantity,
            excepted: line.excepted,
            excepted_by: line.excepted_by,
            added: line.added,
            added_by: line.added_by,
            delivered_at: line.delivered_at(),
            item_name: line.snapshot().map(|s| s.item_name.clone()),
            item_category: line.snapshot().map(|s| s.category),
            deleted_at: None,
        }
    }
}

/// A live request joined with its lines (in insertion order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestView {
    pub request: RequestRecord,
    pub lines: Vec<RequestLineRecord>,
}

impl RequestView {
    /// Sum of quantities over non-excepted lines once delivered.
    pub fn delivered_quantity(&self) -> i64 {
        if self.request.status != RequestStatus::Entregada {
            return 0;
        }
        self.lines.iter().filter(|l| !l.excepted).map(|l| l.quantity).sum()
    }
}

/// Request projection backed by in-memory record sets.
pub type InMemoryRequestsProjection = PpeRequestsProjection<
    InMemoryCompanyStore<RequestId, RequestRecord>,
    InMemoryCompanyStore<LineId, RequestLineRecord>,
>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    company_id: CompanyId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum RequestProjectionError {
    #[error("failed to deserialize request event: {0}")]
    Deserialize(String),

    #[error("company isolation violation: {0}")]
    CompanyIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event references unknown {0}")]
    MissingRecord(String),
}

/// Request projection over published envelopes.
///
/// Idempotent under at-least-once delivery: envelopes at or below the stream
/// cursor are skipped.
#[derive(Debug)]
pub struct PpeRequestsProjection<R, L>
where
    R: CompanyStore<RequestId, RequestRecord>,
    L: CompanyStore<LineId, RequestLineRecord>,
{
    requests: R,
    lines: L,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<R, L> PpeRequestsProjection<R, L>
where
    R: CompanyStore<RequestId, RequestRecord>,
    L: CompanyStore<LineId, RequestLineRecord>,
{
    pub fn new(requests: R, lines: L) -> Self {
        Self {
            requests,
            lines,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// A live request with its lines.
    pub fn get(&self, company_id: CompanyId, request_id: RequestId) -> Option<RequestView> {
        let request = self.requests.get(company_id, &request_id).filter(RequestRecord::is_live)?;
        Some(self.view(request))
    }

    /// Every live request of a company, newest first.
    pub fn list(&self, company_id: CompanyId) -> Vec<RequestRecord> {
        let mut out: Vec<_> = self
            .requests
            .list(company_id)
            .into_iter()
            .filter(RequestRecord::is_live)
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Requests created by a company in `year`, soft-deleted ones included.
    pub fn count_created_in_year(&self, company_id: CompanyId, year: i32) -> u64 {
        self.requests
            .list(company_id)
            .iter()
            .filter(|r| r.created_at.year() == year)
            .count() as u64
    }

    /// Live delivered requests of a company, optionally for one worker.
    pub fn delivered(&self, company_id: CompanyId, worker_id: Option<WorkerId>) -> Vec<RequestView> {
        let delivered: Vec<RequestRecord> = self
            .requests
            .list(company_id)
            .into_iter()
            .filter(|r| {
                r.is_live()
                    && r.status == RequestStatus::Entregada
                    && worker_id.is_none_or(|w| r.worker_id == w)
            })
            .collect();
        if delivered.is_empty() {
            return Vec::new();
        }

        let mut by_request: HashMap<RequestId, Vec<RequestLineRecord>> = HashMap::new();
        for line in self.lines.list(company_id) {
            if line.deleted_at.is_none() {
                by_request.entry(line.request_id).or_default().push(line);
            }
        }

        delivered
            .into_iter()
            .map(|request| {
                let mut lines = by_request.remove(&request.request_id).unwrap_or_default();
                lines.sort_by_key(|l| l.position);
                RequestView { request, lines }
            })
            .collect()
    }

    fn view(&self, request: RequestRecord) -> RequestView {
        let mut lines = self.lines_of(request.company_id, request.request_id);
        lines.retain(|l| l.deleted_at.is_none());
        RequestView { request, lines }
    }

    fn lines_of(&self, company_id: CompanyId, request_id: RequestId) -> Vec<RequestLineRecord> {
        let mut lines: Vec<_> = self
            .lines
            .list(company_id)
            .into_iter()
            .filter(|l| l.request_id == request_id)
            .collect();
        lines.sort_by_key(|l| l.position);
        lines
    }

    fn record(&self, company_id: CompanyId, request_id: RequestId) -> Result<RequestRecord, RequestProjectionError> {
        self.requests
            .get(company_id, &request_id)
            .ok_or_else(|| RequestProjectionError::MissingRecord(format!("request {request_id}")))
    }

    fn line_record(&self, company_id: CompanyId, line_id: LineId) -> Result<RequestLineRecord, RequestProjectionError> {
        self.lines
            .get(company_id, &line_id)
            .ok_or_else(|| RequestProjectionError::MissingRecord(format!("line {line_id}")))
    }

    /// Last sequence number applied for a stream, 0 if none.
    pub fn position(&self, company_id: CompanyId, aggregate_id: AggregateId) -> u64 {
        let key = CursorKey {
            company_id,
            aggregate_id,
        };
        self.cursors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    /// Apply a published envelope.
    ///
    /// Enforces company isolation and a strictly increasing sequence per stream.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), RequestProjectionError> {
        let company_id = envelope.company_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| RequestProjectionError::Deserialize("cursor lock poisoned".to_string()))?;
        let key = CursorKey {
            company_id,
            aggregate_id,
        };
        let last = cursors.get(&key).copied().unwrap_or(0);

        if seq == 0 {
            return Err(RequestProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(RequestProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: PpeRequestEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| RequestProjectionError::Deserialize(e.to_string()))?;

        if event.company_id() != company_id {
            return Err(RequestProjectionError::CompanyIsolation(
                "event company_id does not match envelope company_id".to_string(),
            ));
        }
        if event.request_id().0 != aggregate_id {
            return Err(RequestProjectionError::CompanyIsolation(
                "event request_id does not match envelope aggregate_id".to_string(),
            ));
        }

        self.apply_event(company_id, event)?;
        cursors.insert(key, seq);
        Ok(())
    }

    fn apply_event(&self, company_id: CompanyId, event: PpeRequestEvent) -> Result<(), RequestProjectionError> {
        match event {
            PpeRequestEvent::RequestCreated(e) => {
                for (position, line) in e.lines.iter().enumerate() {
                    self.lines.upsert(
                        company_id,
                        line.line_id,
                        RequestLineRecord::from_line(e.request_id, position, line),
                    );
                }
                self.requests.upsert(
                    company_id,
                    e.request_id,
                    RequestRecord {
                        request_id: e.request_id,
                        company_id,
                        code: e.code,
                        requester_id: e.requester_id,
                        worker_id: e.worker_id,
                        status: RequestStatus::Pendiente,
                        metadata: e.metadata,
                        observations: None,
                        approval: None,
                        delivery: None,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                        deleted_at: None,
                    },
                );
            }
            PpeRequestEvent::RequestUpdated(e) => {
                let mut record = self.record(company_id, e.request_id)?;
                e.changes.apply_to(&mut record.metadata);
                record.updated_at = e.occurred_at;
                self.requests.upsert(company_id, e.request_id, record);
            }
            PpeRequestEvent::RequestTransitioned(e) => {
                let mut record = self.record(company_id, e.request_id)?;
                record.status = e.to;
                if matches!(e.to, RequestStatus::Observada | RequestStatus::Rechazada) && e.comments.is_some() {
                    record.observations = e.comments;
                }
                if record.approval.is_none() {
                    record.approval = e.approval;
                }
                if record.delivery.is_none() {
                    record.delivery = e.delivery;
                }
                record.updated_at = e.occurred_at;

                for delivery in e.line_deliveries {
                    let mut line = self.line_record(company_id, delivery.line_id)?;
                    if line.delivered_at.is_none() {
                        line.delivered_at = delivery.delivered_at;
                    }
                    if let (None, Some(snapshot)) = (&line.item_name, delivery.snapshot) {
                        line.item_name = Some(snapshot.item_name);
                        line.item_category = Some(snapshot.category);
                    }
                    self.lines.upsert(company_id, line.line_id, line);
                }
                self.requests.upsert(company_id, e.request_id, record);
            }
            PpeRequestEvent::LineExceptionToggled(e) => {
                let mut line = self.line_record(company_id, e.line_id)?;
                line.excepted = e.excepted;
                line.excepted_by = e.excepted_by;
                self.lines.upsert(company_id, e.line_id, line);
                self.touch(company_id, e.request_id, e.occurred_at)?;
            }
            PpeRequestEvent::LineAdded(e) => {
                let position = self.lines_of(company_id, e.request_id).len();
                self.lines.upsert(
                    company_id,
                    e.line.line_id,
                    RequestLineRecord::from_line(e.request_id, position, &e.line),
                );
                self.touch(company_id, e.request_id, e.occurred_at)?;
            }
            PpeRequestEvent::RequestRemoved(e) => {
                let mut record = self.record(company_id, e.request_id)?;
                record.deleted_at = Some(e.occurred_at);
                record.updated_at = e.occurred_at;
                self.requests.upsert(company_id, e.request_id, record);
                for mut line in self.lines_of(company_id, e.request_id) {
                    line.deleted_at = Some(e.occurred_at);
                    self.lines.upsert(company_id, line.line_id, line);
                }
            }
        }
        Ok(())
    }

    fn touch(&self, company_id: CompanyId, request_id: RequestId, at: DateTime<Utc>) -> Result<(), RequestProjectionError> {
        let mut record = self.record(company_id, request_id)?;
        record.updated_at = at;
        self.requests.upsert(company_id, request_id, record);
        Ok(())
    }

    /// Rebuild both record sets from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), RequestProjectionError> {
        self.cursors.write().unwrap_or_else(PoisonError::into_inner).clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut companies = envs.iter().map(|e| e.company_id()).collect::<Vec<_>>();
        companies.sort();
        companies.dedup();
        for c in companies {
            self.requests.clear_company(c);
            self.lines.clear_company(c);
        }

        // Deterministic replay order: company, aggregate, sequence.
        envs.sort_by_key(|e| (e.company_id(), e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
