//! Instructors and the resolved caller identity.

use serde::{Deserialize, Serialize};

use crate::api::UserId;
use crate::services::load::MIN_LOAD;

pub const INITIALS_LEN: usize = 3;
pub const MAX_NAME_LEN: usize = 100;

/// Authorization role derived from the user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
}

/// An instructor account.
///
/// `bkd` is the load score for the currently active semester; it is zero
/// when no semester is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub initials: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub bkd: f64,
}

impl User {
    pub fn role(&self) -> Role {
        if self.is_admin {
            Role::Admin
        } else {
            Role::Instructor
        }
    }

    pub fn is_under_loaded(&self) -> bool {
        self.bkd < MIN_LOAD
    }
}

/// Input for creating a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub initials: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl NewUser {
    pub fn new(name: impl Into<String>, initials: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initials: initials.into(),
            is_admin: false,
        }
    }

    pub fn admin(name: impl Into<String>, initials: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(name, initials)
        }
    }

    /// Validate and normalize: trims the name and upper-cases the initials.
    pub fn normalized(&self) -> Result<NewUser, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Name must not be empty".to_string());
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(format!("Name must be at most {} characters", MAX_NAME_LEN));
        }
        Ok(NewUser {
            name: name.to_string(),
            initials: normalize_initials(&self.initials)?,
            is_admin: self.is_admin,
        })
    }
}

/// Initials are exactly three ASCII letters or digits, stored upper-case.
pub fn normalize_initials(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.chars().count() != INITIALS_LEN
        || !trimmed.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(format!(
            "Initials must be exactly {} letters or digits, got '{}'",
            INITIALS_LEN, raw
        ));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Identity and role handed to the engine by the authentication gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn instructor(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Instructor,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for Caller {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_initials() {
        assert_eq!(normalize_initials("abc").unwrap(), "ABC");
        assert_eq!(normalize_initials(" x1z ").unwrap(), "X1Z");
        assert!(normalize_initials("ab").is_err());
        assert!(normalize_initials("abcd").is_err());
        assert!(normalize_initials("a-c").is_err());
    }

    #[test]
    fn test_new_user_normalized() {
        let user = NewUser::new("  Ada Lovelace ", "ada").normalized().unwrap();
        assert_eq!(user.name, "Ada Lovelace");
        assert_eq!(user.initials, "ADA");
        assert!(!user.is_admin);

        assert!(NewUser::new("   ", "ada").normalized().is_err());
        assert!(NewUser::new("x".repeat(MAX_NAME_LEN + 1), "ada").normalized().is_err());
    }

    #[test]
    fn test_role_and_caller() {
        let user = User {
            id: UserId::new(5),
            name: "Root".into(),
            initials: "ROO".into(),
            is_admin: true,
            is_active: true,
            bkd: 4.0,
        };
        let caller = Caller::from(&user);
        assert!(caller.is_admin());
        assert_eq!(caller.user_id, UserId::new(5));
        assert!(!user.is_under_loaded());
        assert!(!Caller::instructor(UserId::new(1)).is_admin());
    }
}
