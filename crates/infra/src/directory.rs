//! Worker directory port: existence, company membership and display name.
//!
//! Worker CRUD lives elsewhere; the request service only reads from it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use kardex_core::{CompanyId, WorkerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub worker_id: WorkerId,
    pub company_id: CompanyId,
    pub full_name: String,
}

impl WorkerProfile {
    pub fn new(worker_id: WorkerId, company_id: CompanyId, full_name: impl Into<String>) -> Self {
        Self {
            worker_id,
            company_id,
            full_name: full_name.into(),
        }
    }
}

pub trait WorkerDirectory: Send + Sync {
    fn get_worker(&self, worker_id: WorkerId) -> Option<WorkerProfile>;
}

impl<D: WorkerDirectory + ?Sized> WorkerDirectory for Arc<D> {
    fn get_worker(&self, worker_id: WorkerId) -> Option<WorkerProfile> {
        (**self).get_worker(worker_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryWorkerDirectory {
    workers: RwLock<HashMap<WorkerId, WorkerProfile>>,
}

impl InMemoryWorkerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, profile: WorkerProfile) {
        self.workers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.worker_id, profile);
    }
}

impl WorkerDirectory for InMemoryWorkerDirectory {
    fn get_worker(&self, worker_id: WorkerId) -> Option<WorkerProfile> {
        self.workers.read().unwrap_or_else(PoisonError::into_inner).get(&worker_id).cloned()
    }
}
