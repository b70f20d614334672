//! Infrastructure and application layer: event store, dispatcher, request
//! read models, external ports and the request/Kardex service.

pub mod command_dispatcher;
pub mod config;
pub mod directory;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod services;
pub mod time;

pub use config::{ConfigError, KardexConfig};
pub use directory::{InMemoryWorkerDirectory, WorkerDirectory, WorkerProfile};
pub use services::{
    InMemoryPpeRequestService, LineRequest, NewRequest, PpeRequestService, ServiceError,
    TransitionInput,
};
pub use time::{FixedTimeSource, SystemTimeSource, TimeSource};
