//! Compliance ledger ("Kardex") engine.
//!
//! Derives a worker's compliance status from their delivered PPE history and
//! the catalog's validity/criticality terms. Everything here is a pure function
//! of its inputs: nothing is stored, cached or mutated, and the status is
//! recomputed on every query.

pub mod engine;
pub mod history;
pub mod list;
pub mod terms;

pub use engine::{
    evaluate_worker, expires_at, ComplianceEvaluation, ComplianceStatus, LineStanding,
    WorkerKardex, build_worker_kardex,
};
pub use history::{DeliveredLine, DeliveredRequest};
pub use list::{build_kardex_list, KardexFilter, KardexRow};
pub use terms::{CatalogTerms, ItemTerms};
