use thiserror::Error;

use crate::{Caller, Operation, can_perform};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' may not perform '{operation}'")]
    Forbidden { role: String, operation: String },
}

/// Authorize a caller for an operation.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(caller: &Caller, operation: Operation) -> Result<(), AuthzError> {
    if can_perform(caller.role, operation) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %caller.user_id,
            role = %caller.role,
            operation = %operation,
            "authorization denied"
        );
        Err(AuthzError::Forbidden {
            role: caller.role.to_string(),
            operation: operation.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use equiplend_core::UserId;

    #[test]
    fn student_approval_is_forbidden() {
        let caller = Caller::new(UserId::new(), Role::Student);
        let err = authorize(&caller, Operation::ApproveRequest).unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden { .. }));
        assert!(err.to_string().contains("requests.approve"));
    }

    #[test]
    fn staff_may_approve() {
        let caller = Caller::new(UserId::new(), Role::Staff);
        assert!(authorize(&caller, Operation::ApproveRequest).is_ok());
    }

    #[test]
    fn admin_manages_equipment_but_staff_does_not() {
        let admin = Caller::new(UserId::new(), Role::Admin);
        let staff = Caller::new(UserId::new(), Role::Staff);
        assert!(authorize(&admin, Operation::ManageEquipment).is_ok());
        assert!(authorize(&staff, Operation::ManageEquipment).is_err());
    }
}
