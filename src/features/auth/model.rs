use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use utoipa::ToSchema;

/// User role stored in `users.role`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Database model for users
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// The user a request was made by, resolved from the session cookie
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners can always see their own records; admins can see everyone's.
    pub fn can_access(&self, owner_id: i64) -> bool {
        self.id == owner_id || self.is_admin()
    }
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, role: Role) -> CurrentUser {
        CurrentUser {
            id,
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn test_owner_can_access() {
        assert!(user(1, Role::User).can_access(1));
        assert!(!user(1, Role::User).can_access(2));
    }

    #[test]
    fn test_admin_can_access_anything() {
        assert!(user(1, Role::Admin).can_access(2));
        assert!(user(1, Role::Admin).is_admin());
    }
}
