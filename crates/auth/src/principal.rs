use serde::{Deserialize, Serialize};

use equiplend_core::UserId;

use crate::Role;

/// The authenticated party behind a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}
