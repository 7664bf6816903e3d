//! Lending domain module: borrow windows, the reservation engine and the
//! borrow request lifecycle.
//!
//! Pure, deterministic domain logic (no IO, no HTTP, no storage).

pub mod request;
pub mod reservation;
pub mod status;
pub mod window;

pub use request::{
    ApproveRequest, BorrowRequest, CancelRequest, IssueRequest, LendingCommand, LendingEvent,
    MarkOverdue, RejectRequest, RequestApproved, RequestCancelled, RequestIssued,
    RequestMarkedOverdue, RequestRejected, RequestReturned, RequestSnapshot, RequestSubmitted,
    ReturnRequest, SubmitRequest,
};
pub use reservation::{
    AvailabilityPeriod, AvailabilityReport, availability_report, check_availability, compute_available_quantity,
    reserved_quantity,
};
pub use status::RequestStatus;
pub use window::BorrowWindow;
