//! Records persisted by a [`Store`](crate::Store).

use crate::types::{
    ActionId, ActionName, Email, PermissionId, PrincipalId, ResourceId, ResourceName, RoleId,
    RoleName,
};
use chrono::{DateTime, Utc};
use std::fmt;

/// UTC timestamp used by every record.
pub type Timestamp = DateTime<Utc>;

/// Named business object category.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resource {
    pub id: ResourceId,
    pub name: ResourceName,
    pub description: String,
    pub created_at: Timestamp,
}

/// Named operation category.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Action {
    pub id: ActionId,
    pub name: ActionName,
    pub description: String,
    pub created_at: Timestamp,
}

/// One grantable (resource, action) capability.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Permission {
    pub id: PermissionId,
    pub resource_id: ResourceId,
    pub action_id: ActionId,
    pub created_at: Timestamp,
}

/// Named bundle of permissions. The bundle itself lives in [`RoleGrant`] rows.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Role {
    pub id: RoleId,
    pub name: RoleName,
    pub description: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Role to permission binding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoleGrant {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
    pub created_at: Timestamp,
}

/// Principal to role binding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Assignment {
    pub principal_id: PrincipalId,
    pub role_id: RoleId,
    pub created_at: Timestamp,
}

/// Identity capable of holding roles.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Principal {
    pub id: PrincipalId,
    pub email: Email,
    pub is_active: bool,
    /// Exempt from role checks.
    pub is_privileged: bool,
    pub date_joined: Timestamp,
    pub last_login: Option<Timestamp>,
}

/// Principal insertion payload.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub email: Email,
    pub password_hash: Option<String>,
    pub is_privileged: bool,
    /// Names stored on the profile created with the principal.
    pub profile: ProfileUpdate,
}

/// Personal names kept next to a principal. Every principal has exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Profile {
    pub principal_id: PrincipalId,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Profile {
    /// Writes the fields present in `update`, leaving the others alone.
    pub fn apply(&mut self, update: ProfileUpdate) {
        if let Some(first_name) = update.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            self.last_name = last_name;
        }
        if let Some(middle_name) = update.middle_name {
            self.middle_name = middle_name;
        }
    }
}

/// Partial profile change. `None` keeps the stored value; `Some("")` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle_name: Option<String>,
}

impl ProfileUpdate {
    /// Sets the first name.
    pub fn first_name(mut self, name: impl Into<String>) -> Self {
        self.first_name = Some(name.into());
        self
    }

    /// Sets the last name.
    pub fn last_name(mut self, name: impl Into<String>) -> Self {
        self.last_name = Some(name.into());
        self
    }

    /// Sets the middle name.
    pub fn middle_name(mut self, name: impl Into<String>) -> Self {
        self.middle_name = Some(name.into());
        self
    }

    pub(crate) fn fields_mut(&mut self) -> [(&'static str, &mut Option<String>); 3] {
        [
            ("first_name", &mut self.first_name),
            ("last_name", &mut self.last_name),
            ("middle_name", &mut self.middle_name),
        ]
    }
}

/// Opaque bearer credential value.
///
/// `Debug` only shows a short prefix so values do not end up in logs.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TokenValue(String);

impl TokenValue {
    /// Wraps a raw token string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn prefix(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(6)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl fmt::Debug for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenValue({}...)", self.prefix())
    }
}

/// Bearer credential bound to a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Token {
    pub value: TokenValue,
    pub principal_id: PrincipalId,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub is_active: bool,
}

impl Token {
    /// Returns whether `now` is past the expiry.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}
