use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use kardex_catalog::{CriticalityTier, EppId};
use kardex_core::WorkerId;
use kardex_requests::{LineId, RequestId};

use crate::history::DeliveredRequest;
use crate::terms::CatalogTerms;

/// Derived compliance status of a worker, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    /// At least one Core item has expired.
    Vencido,
    /// Only Recurring or untiered items have expired.
    VencimientoMenor,
    /// Has delivered items and none has expired.
    Vigente,
    /// Nothing delivered (or everything excepted).
    SinRegistro,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Vencido => "vencido",
            ComplianceStatus::VencimientoMenor => "vencimiento_menor",
            ComplianceStatus::Vigente => "vigente",
            ComplianceStatus::SinRegistro => "sin_registro",
        }
    }
}

impl core::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one delivered line stands at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStanding {
    pub request_id: RequestId,
    pub line_id: LineId,
    pub epp_id: EppId,
    pub item_name: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
    pub criticality: Option<CriticalityTier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceEvaluation {
    pub status: ComplianceStatus,
    pub lines: Vec<LineStanding>,
    pub expired_core: usize,
    pub expired_minor: usize,
}

impl ComplianceEvaluation {
    pub fn delivered_lines(&self) -> usize {
        self.lines.len()
    }
}

/// `delivered_at + validity_months` in calendar months (day clamped to month end).
///
/// `None` for perpetual items (no validity, or zero months).
pub fn expires_at(delivered_at: DateTime<Utc>, validity_months: Option<u32>) -> Option<DateTime<Utc>> {
    match validity_months {
        Some(months) if months > 0 => delivered_at.checked_add_months(Months::new(months)),
        _ => None,
    }
}

/// Evaluate one worker's delivered history at instant `now`.
///
/// First match wins: expired Core → Vencido; expired Recurring/untiered →
/// VencimientoMenor; any counted line → Vigente; otherwise SinRegistro.
pub fn evaluate_worker(
    history: &[DeliveredRequest],
    terms: &CatalogTerms,
    now: DateTime<Utc>,
) -> ComplianceEvaluation {
    let mut lines = Vec::new();
    let mut expired_core = 0;
    let mut expired_minor = 0;

    for request in history {
        for line in request.counted_lines() {
            let item = terms.get(line.epp_id);
            let criticality = item.and_then(|t| t.criticality);
            let expires = line
                .delivered_at
                .and_then(|at| expires_at(at, item.and_then(|t| t.validity_months)));
            let expired = expires.is_some_and(|exp| now > exp);

            if expired {
                match criticality {
                    Some(CriticalityTier::Core) => expired_core += 1,
                    Some(CriticalityTier::Recurring) | None => expired_minor += 1,
                }
            }

            lines.push(LineStanding {
                request_id: request.request_id,
                line_id: line.line_id,
                epp_id: line.epp_id,
                item_name: line.snapshot.as_ref().map(|s| s.item_name.clone()),
                delivered_at: line.delivered_at,
                expires_at: expires,
                expired,
                criticality,
            });
        }
    }

    let status = if expired_core > 0 {
        ComplianceStatus::Vencido
    } else if expired_minor > 0 {
        ComplianceStatus::VencimientoMenor
    } else if !lines.is_empty() {
        ComplianceStatus::Vigente
    } else {
        ComplianceStatus::SinRegistro
    };

    ComplianceEvaluation {
        status,
        lines,
        expired_core,
        expired_minor,
    }
}

/// Full Kardex of one worker: delivered history (newest first) plus its evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerKardex {
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub status: ComplianceStatus,
    pub evaluation: ComplianceEvaluation,
    pub requests: Vec<DeliveredRequest>,
}

pub fn build_worker_kardex(
    worker_id: WorkerId,
    worker_name: impl Into<String>,
    history: &[DeliveredRequest],
    terms: &CatalogTerms,
    now: DateTime<Utc>,
) -> WorkerKardex {
    let mut requests: Vec<DeliveredRequest> = history
        .iter()
        .filter(|r| r.worker_id == worker_id)
        .cloned()
        .collect();
    requests.sort_by(|a, b| b.delivered_at.cmp(&a.delivered_at));

    let evaluation = evaluate_worker(&requests, terms, now);
    WorkerKardex {
        worker_id,
        worker_name: worker_name.into(),
        status: evaluation.status,
        evaluation,
        requests,
    }
}
