//! Engine input: a worker's delivered requests as persisted by the lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kardex_catalog::{EppId, ItemCategory};
use kardex_core::{CompanyId, WorkerId};
use kardex_requests::{LineId, LineSnapshot, RequestCode, RequestId};

/// One line of a delivered request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredLine {
    pub line_id: LineId,
    pub epp_id: EppId,
    pub quantity: i64,
    pub excepted: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub snapshot: Option<LineSnapshot>,
}

impl DeliveredLine {
    /// Category as frozen at delivery, if a snapshot exists.
    pub fn snapshot_category(&self) -> Option<ItemCategory> {
        self.snapshot.as_ref().map(|s| s.category)
    }
}

/// A request in state Entregada, with the display fields the list view needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredRequest {
    pub request_id: RequestId,
    pub code: RequestCode,
    pub company_id: CompanyId,
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub area: Option<String>,
    pub unit: Option<String>,
    pub site: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub lines: Vec<DeliveredLine>,
}

impl DeliveredRequest {
    pub fn counted_lines(&self) -> impl Iterator<Item = &DeliveredLine> {
        self.lines.iter().filter(|l| !l.excepted)
    }
}
