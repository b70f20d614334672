//! Request lines and the per-line overrides applied during review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kardex_catalog::{EppId, ItemCategory};
use kardex_core::{AggregateId, CompanyId, Entity, UserId, ValueObject};

/// Line identifier (unique within the whole system, not just the request).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(pub AggregateId);

impl LineId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What the catalog said about the item at the moment it was handed over.
///
/// Legal audit record: captured once at delivery, never recomputed from the
/// live catalog afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub item_name: String,
    pub category: ItemCategory,
}

impl ValueObject for LineSnapshot {}

/// Catalog data for one item, supplied with a delivery command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub epp_id: EppId,
    pub snapshot: LineSnapshot,
}

/// A line as requested by a caller, before it becomes part of a request.
///
/// `item_company_id` is the owning company of the referenced catalog item, as
/// reported by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub line_id: LineId,
    pub epp_id: EppId,
    pub quantity: i64,
    pub item_company_id: CompanyId,
}

/// Request line entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLine {
    pub line_id: LineId,
    pub epp_id: EppId,
    pub quantity: i64,
    pub excepted: bool,
    pub excepted_by: Option<UserId>,
    pub added: bool,
    pub added_by: Option<UserId>,
    delivered_at: Option<DateTime<Utc>>,
    snapshot: Option<LineSnapshot>,
}

impl RequestLine {
    /// A line present when the request was created.
    pub fn original(line_id: LineId, epp_id: EppId, quantity: i64) -> Self {
        Self {
            line_id,
            epp_id,
            quantity,
            excepted: false,
            excepted_by: None,
            added: false,
            added_by: None,
            delivered_at: None,
            snapshot: None,
        }
    }

    /// A line added by a reviewer after creation.
    pub fn manual_addition(line_id: LineId, epp_id: EppId, quantity: i64, actor: UserId) -> Self {
        Self {
            added: true,
            added_by: Some(actor),
            ..Self::original(line_id, epp_id, quantity)
        }
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn snapshot(&self) -> Option<&LineSnapshot> {
        self.snapshot.as_ref()
    }

    /// Excepted lines neither count as delivered nor feed the Kardex.
    pub fn counts_toward_delivery(&self) -> bool {
        !self.excepted
    }

    /// The `(excepted, excepted_by)` pair a toggle by `actor` would produce.
    pub fn toggled_exception(&self, actor: UserId) -> (bool, Option<UserId>) {
        if self.excepted {
            (false, None)
        } else {
            (true, Some(actor))
        }
    }

    pub(crate) fn set_exception(&mut self, excepted: bool, by: Option<UserId>) {
        self.excepted = excepted;
        self.excepted_by = by;
    }

    /// Write-once; later calls are ignored.
    pub(crate) fn stamp_delivery(&mut self, at: DateTime<Utc>) {
        if self.delivered_at.is_none() {
            self.delivered_at = Some(at);
        }
    }

    /// Write-once; later calls are ignored.
    pub(crate) fn capture_snapshot(&mut self, snapshot: LineSnapshot) {
        if self.snapshot.is_none() {
            self.snapshot = Some(snapshot);
        }
    }
}

impl Entity for RequestLine {
    type Id = LineId;

    fn id(&self) -> &Self::Id {
        &self.line_id
    }
}
