//! Role policy consulted by every operation that reads or mutates sales.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::user::{Role, User};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    RecordSale,
    ListMovements,
    ViewClientHistory,
    RequestCancellation,
    ListCancellationRequests,
    ResolveCancellation,
    DeleteMovement,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordSale => "record a sale",
            Self::ListMovements => "list movements",
            Self::ViewClientHistory => "view client history",
            Self::RequestCancellation => "request a cancellation",
            Self::ListCancellationRequests => "list cancellation requests",
            Self::ResolveCancellation => "resolve a cancellation request",
            Self::DeleteMovement => "delete a movement",
        }
    }

    pub fn required_role(&self) -> Role {
        match self {
            Self::ListCancellationRequests | Self::ResolveCancellation | Self::DeleteMovement => {
                Role::Admin
            }
            Self::RecordSale
            | Self::ListMovements
            | Self::ViewClientHistory
            | Self::RequestCancellation => Role::User,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn role_rank(role: Role) -> u8 {
    match role {
        Role::User => 1,
        Role::Admin => 2,
    }
}

pub fn is_allowed(user: &User, action: Action) -> bool {
    role_rank(user.role) >= role_rank(action.required_role())
}

pub fn authorize(user: &User, action: Action) -> Result<(), DomainError> {
    if is_allowed(user, action) {
        return Ok(());
    }

    Err(DomainError::Forbidden { user_id: user.id.0.clone(), action })
}

#[cfg(test)]
mod tests {
    use super::{authorize, is_allowed, Action};
    use crate::domain::user::{Role, User};
    use crate::errors::DomainError;

    const ALL_ACTIONS: [Action; 7] = [
        Action::RecordSale,
        Action::ListMovements,
        Action::ViewClientHistory,
        Action::RequestCancellation,
        Action::ListCancellationRequests,
        Action::ResolveCancellation,
        Action::DeleteMovement,
    ];

    #[test]
    fn admin_may_perform_every_action() {
        let admin = User::new("admin-1", "Dra. Paola", Role::Admin);
        assert!(ALL_ACTIONS.iter().all(|action| is_allowed(&admin, *action)));
    }

    #[test]
    fn staff_is_limited_to_unprivileged_actions() {
        let staff = User::new("staff-1", "Recepción", Role::User);

        assert!(is_allowed(&staff, Action::RecordSale));
        assert!(is_allowed(&staff, Action::RequestCancellation));
        assert!(!is_allowed(&staff, Action::ResolveCancellation));
        assert!(!is_allowed(&staff, Action::ListCancellationRequests));
        assert!(!is_allowed(&staff, Action::DeleteMovement));
    }

    #[test]
    fn denial_names_user_and_action() {
        let staff = User::new("staff-1", "Recepción", Role::User);
        let error = authorize(&staff, Action::DeleteMovement).expect_err("forbidden");

        assert_eq!(
            error,
            DomainError::Forbidden {
                user_id: "staff-1".to_string(),
                action: Action::DeleteMovement,
            }
        );
        assert_eq!(error.to_string(), "user `staff-1` is not allowed to delete a movement");
    }
}
