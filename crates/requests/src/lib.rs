//! PPE request domain module (event-sourced).
//!
//! Business rules for the request lifecycle and its item ledger, implemented as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod code;
pub mod line;
pub mod request;
pub mod status;

pub use code::{CodeFormat, RequestCode};
pub use line::{ItemSnapshot, LineId, LineSnapshot, NewLine, RequestLine};
pub use request::{
    AddLine, ApprovalStamp, CreateRequest, DeliveryStamp, LineAdded, LineDelivery,
    LineExceptionToggled, PpeRequest, PpeRequestCommand, PpeRequestEvent, RemoveRequest,
    RequestCreated, RequestId, RequestMetadata, RequestRemoved, RequestTransitioned,
    RequestUpdate, RequestUpdated, ToggleException, TransitionRequest, UpdateRequest,
    AGGREGATE_TYPE,
};
pub use status::RequestStatus;
