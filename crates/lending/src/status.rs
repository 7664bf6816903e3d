use core::str::FromStr;

use serde::{Deserialize, Serialize};

use equiplend_core::DomainError;

/// Borrow request status lifecycle.
///
/// ```text
/// pending ──► approved ──► issued ──► returned
///    │           │           │           ▲
///    │           │           └──► overdue ┘
///    ├──► rejected
///    └──► cancelled ◄── (approved)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Issued,
    Returned,
    Overdue,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 7] = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::Rejected,
        RequestStatus::Issued,
        RequestStatus::Returned,
        RequestStatus::Overdue,
        RequestStatus::Cancelled,
    ];

    /// Statuses that count against an item's capacity in the reservation engine.
    pub const CAPACITY_HOLDING: [RequestStatus; 2] = [RequestStatus::Approved, RequestStatus::Issued];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Issued => "issued",
            RequestStatus::Returned => "returned",
            RequestStatus::Overdue => "overdue",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn holds_capacity(self) -> bool {
        Self::CAPACITY_HOLDING.contains(&self)
    }

    /// No transition leaves this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Rejected | RequestStatus::Returned | RequestStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, Issued)
                | (Approved, Cancelled)
                | (Issued, Returned)
                | (Issued, Overdue)
                | (Overdue, Returned)
        )
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        RequestStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown request status '{s}'")))
    }
}
