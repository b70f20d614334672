#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use kardex_catalog::{CatalogItem, CriticalityTier, EppId, InMemoryCatalog, ItemCategory};
use kardex_core::{AggregateId, CompanyId, UserId, WorkerId};
use kardex_infra::projections::RequestView;
use kardex_infra::{
    FixedTimeSource, InMemoryPpeRequestService, InMemoryWorkerDirectory, KardexConfig,
    LineRequest, NewRequest, ServiceError, TransitionInput, WorkerProfile,
};
use kardex_requests::{RequestId, RequestMetadata, RequestStatus};

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
}

/// A company with a small catalog, one worker and a service over in-memory
/// infrastructure.
pub struct Harness {
    pub company: CompanyId,
    pub requester: UserId,
    pub reviewer: UserId,
    pub worker: WorkerId,
    /// Core, 6 months.
    pub helmet: EppId,
    /// Recurring, 12 months.
    pub gloves: EppId,
    /// Uniform, perpetual, untiered.
    pub shirt: EppId,
    pub catalog: Arc<InMemoryCatalog>,
    pub workers: Arc<InMemoryWorkerDirectory>,
    pub clock: Arc<FixedTimeSource>,
    pub service: InMemoryPpeRequestService,
}

impl Harness {
    pub fn new() -> Self {
        // Logging honours the environment; code formatting stays at the defaults.
        let logging = KardexConfig::from_env().unwrap_or_default();
        kardex_observability::tracing::init_with_filter(&logging.log_filter);

        let company = CompanyId::new();
        let catalog = Arc::new(InMemoryCatalog::new());
        let helmet = EppId::new(AggregateId::new());
        let gloves = EppId::new(AggregateId::new());
        let shirt = EppId::new(AggregateId::new());
        catalog.upsert(
            CatalogItem::new(helmet, company, "Safety helmet", ItemCategory::Ppe)
                .with_validity_months(6)
                .with_criticality(CriticalityTier::Core)
                .with_protection_type("head"),
        );
        catalog.upsert(
            CatalogItem::new(gloves, company, "Nitrile gloves", ItemCategory::Ppe)
                .with_validity_months(12)
                .with_criticality(CriticalityTier::Recurring),
        );
        catalog.upsert(CatalogItem::new(shirt, company, "Work shirt", ItemCategory::Uniform));

        let worker = WorkerId::new();
        let workers = Arc::new(InMemoryWorkerDirectory::new());
        workers.upsert(WorkerProfile::new(worker, company, "Ana Quispe"));

        let clock = Arc::new(FixedTimeSource::new(at(2024, 1, 10)));
        let service = InMemoryPpeRequestService::in_memory(
            catalog.clone(),
            workers.clone(),
            clock.clone(),
            &KardexConfig::default(),
        );

        Self {
            company,
            requester: UserId::new(),
            reviewer: UserId::new(),
            worker,
            helmet,
            gloves,
            shirt,
            catalog,
            workers,
            clock,
            service,
        }
    }

    pub fn new_request(&self, worker: WorkerId, items: &[EppId]) -> NewRequest {
        NewRequest {
            company_id: self.company,
            requester_id: self.requester,
            worker_id: worker,
            lines: items
                .iter()
                .map(|epp_id| LineRequest {
                    epp_id: *epp_id,
                    quantity: 1,
                })
                .collect(),
            metadata: RequestMetadata {
                area: Some("Operations".into()),
                unit: Some("Mining".into()),
                site: Some("North pit".into()),
                motive: Some("Replacement".into()),
                ..RequestMetadata::default()
            },
        }
    }

    pub fn create(&self, items: &[EppId]) -> RequestView {
        self.service
            .create_request(self.new_request(self.worker, items))
            .unwrap()
    }

    pub fn transition(&self, request_id: RequestId, target: RequestStatus) -> Result<RequestView, ServiceError> {
        self.service
            .transition_request(TransitionInput::new(self.company, request_id, target, self.reviewer))
    }

    pub fn move_to(&self, request_id: RequestId, path: &[RequestStatus]) -> RequestView {
        let mut last = None;
        for target in path {
            last = Some(self.transition(request_id, *target).unwrap());
        }
        last.unwrap()
    }

    /// Create, approve and deliver `items` to `worker` at instant `when`.
    pub fn deliver_to(&self, worker: WorkerId, items: &[EppId], when: DateTime<Utc>) -> RequestView {
        self.clock.set(when);
        let created = self
            .service
            .create_request(self.new_request(worker, items))
            .unwrap();
        self.move_to(
            created.request.request_id,
            &[RequestStatus::Aprobada, RequestStatus::Entregada],
        )
    }

    pub fn hire(&self, name: &str) -> WorkerId {
        let worker = WorkerId::new();
        self.workers.upsert(WorkerProfile::new(worker, self.company, name));
        worker
    }
}
