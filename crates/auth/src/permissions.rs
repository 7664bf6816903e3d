use serde::{Deserialize, Serialize};

use crate::Role;

/// Operations the API exposes, as seen by the policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ViewEquipment,
    ManageEquipment,
    CreateRequest,
    ViewRequests,
    CancelRequest,
    ApproveRequest,
    RejectRequest,
    IssueEquipment,
    ReturnEquipment,
    ViewPending,
    SweepOverdue,
    ViewHistory,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ViewEquipment => "equipment.view",
            Operation::ManageEquipment => "equipment.manage",
            Operation::CreateRequest => "requests.create",
            Operation::ViewRequests => "requests.view",
            Operation::CancelRequest => "requests.cancel",
            Operation::ApproveRequest => "requests.approve",
            Operation::RejectRequest => "requests.reject",
            Operation::IssueEquipment => "requests.issue",
            Operation::ReturnEquipment => "requests.return",
            Operation::ViewPending => "requests.pending",
            Operation::SweepOverdue => "requests.sweep_overdue",
            Operation::ViewHistory => "requests.history",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role policy.
///
/// - students: browse equipment, create and cancel (own) requests, list what they can see
/// - staff: the approval desk on top of that
/// - admin: everything, including equipment management
///
/// Ownership ("own requests") is not a role question; the query layer scopes
/// what a student can see at all.
pub fn can_perform(role: Role, operation: Operation) -> bool {
    match operation {
        Operation::ViewEquipment
        | Operation::CreateRequest
        | Operation::ViewRequests
        | Operation::CancelRequest => true,
        Operation::ApproveRequest
        | Operation::RejectRequest
        | Operation::IssueEquipment
        | Operation::ReturnEquipment
        | Operation::ViewPending
        | Operation::SweepOverdue
        | Operation::ViewHistory => role.is_staff(),
        Operation::ManageEquipment => role.is_admin(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn students_cannot_run_the_approval_desk() {
        for op in [
            Operation::ApproveRequest,
            Operation::RejectRequest,
            Operation::IssueEquipment,
            Operation::ReturnEquipment,
            Operation::ViewPending,
        ] {
            assert!(!can_perform(Role::Student, op), "{op}");
            assert!(can_perform(Role::Staff, op), "{op}");
            assert!(can_perform(Role::Admin, op), "{op}");
        }
    }

    #[test]
    fn only_admin_manages_equipment() {
        assert!(!can_perform(Role::Student, Operation::ManageEquipment));
        assert!(!can_perform(Role::Staff, Operation::ManageEquipment));
        assert!(can_perform(Role::Admin, Operation::ManageEquipment));
    }

    #[test]
    fn everyone_can_borrow() {
        for role in Role::ALL {
            assert!(can_perform(role, Operation::CreateRequest));
            assert!(can_perform(role, Operation::ViewEquipment));
        }
    }
}
