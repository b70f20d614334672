//! Kardex list view: one row per worker across a set of companies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kardex_catalog::ItemCategory;
use kardex_core::{CompanyId, WorkerId};
use kardex_requests::RequestCode;

use crate::engine::{evaluate_worker, ComplianceStatus};
use crate::history::DeliveredRequest;
use crate::terms::CatalogTerms;

/// Optional narrowing of the list. Text filters compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KardexFilter {
    pub delivered_from: Option<DateTime<Utc>>,
    pub delivered_to: Option<DateTime<Utc>>,
    pub unit: Option<String>,
    pub site: Option<String>,
    pub area: Option<String>,
    /// Substring of the worker's name.
    pub worker_name: Option<String>,
    pub status: Option<ComplianceStatus>,
    pub category: Option<ItemCategory>,
}

impl KardexFilter {
    /// Request-level criteria: which delivered requests may seed a row.
    fn admits_request(&self, request: &DeliveredRequest) -> bool {
        let Some(delivered_at) = request.delivered_at else {
            return false;
        };
        if self.delivered_from.is_some_and(|from| delivered_at < from) {
            return false;
        }
        if self.delivered_to.is_some_and(|to| delivered_at > to) {
            return false;
        }
        text_matches(&self.unit, &request.unit)
            && text_matches(&self.site, &request.site)
            && text_matches(&self.area, &request.area)
    }

    fn admits_row(&self, row: &KardexRow) -> bool {
        if let Some(needle) = &self.worker_name {
            if !row.worker_name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != row.status) {
            return false;
        }
        if let Some(category) = self.category {
            if row.category != Some(category) {
                return false;
            }
        }
        true
    }
}

fn text_matches(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match (wanted, actual) {
        (None, _) => true,
        (Some(w), Some(a)) => w.trim().to_lowercase() == a.trim().to_lowercase(),
        (Some(_), None) => false,
    }
}

/// One worker's line in the Kardex list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KardexRow {
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub company_id: CompanyId,
    pub unit: Option<String>,
    pub area: Option<String>,
    pub site: Option<String>,
    pub status: ComplianceStatus,
    pub last_delivery_date: DateTime<Utc>,
    pub last_request_code: RequestCode,
    /// Category of the first counted line of the most recent delivery.
    pub category: Option<ItemCategory>,
    pub delivered_requests: usize,
    pub expired_core: usize,
    pub expired_minor: usize,
}

/// Build the Kardex list.
///
/// Display fields come from each worker's most recent delivered request that
/// passes the request-level filters; the status is always computed over the
/// worker's entire delivered history. Rows are ordered by last delivery date,
/// newest first. An empty company set yields an empty list.
pub fn build_kardex_list(
    history: &[DeliveredRequest],
    company_ids: &[CompanyId],
    terms: &CatalogTerms,
    filter: &KardexFilter,
    now: DateTime<Utc>,
) -> Vec<KardexRow> {
    let mut by_worker: BTreeMap<WorkerId, Vec<&DeliveredRequest>> = BTreeMap::new();
    for request in history {
        by_worker.entry(request.worker_id).or_default().push(request);
    }

    let mut rows: Vec<KardexRow> = by_worker
        .into_values()
        .filter_map(|requests| {
            let seed = requests
                .iter()
                .copied()
                .filter(|r| company_ids.contains(&r.company_id) && filter.admits_request(r))
                .max_by_key(|r| r.delivered_at)?;
            let last_delivery_date = seed.delivered_at?;

            let full: Vec<DeliveredRequest> = requests.iter().map(|r| (*r).clone()).collect();
            let evaluation = evaluate_worker(&full, terms, now);

            let category = seed.counted_lines().next().and_then(|line| {
                line.snapshot_category()
                    .or_else(|| terms.get(line.epp_id).map(|t| t.category))
            });

            Some(KardexRow {
                worker_id: seed.worker_id,
                worker_name: seed.worker_name.clone(),
                company_id: seed.company_id,
                unit: seed.unit.clone(),
                area: seed.area.clone(),
                site: seed.site.clone(),
                status: evaluation.status,
                last_delivery_date,
                last_request_code: seed.code.clone(),
                category,
                delivered_requests: requests.len(),
                expired_core: evaluation.expired_core,
                expired_minor: evaluation.expired_minor,
            })
        })
        .filter(|row| filter.admits_row(row))
        .collect();

    rows.sort_by(|a, b| {
        b.last_delivery_date
            .cmp(&a.last_delivery_date)
            .then_with(|| a.worker_name.cmp(&b.worker_name))
            .then_with(|| a.worker_id.cmp(&b.worker_id))
    });
    rows
}
