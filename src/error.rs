use crate::types::{PermissionId, PrincipalId, RoleId};
use std::fmt;
use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Uniqueness constraints a store must enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// `Resource.name`.
    ResourceName,
    /// `Action.name`.
    ActionName,
    /// `(Permission.resource, Permission.action)`.
    PermissionPair,
    /// `Role.name`.
    RoleName,
    /// `(RoleGrant.role, RoleGrant.permission)`.
    RoleGrant,
    /// `(Assignment.principal, Assignment.role)`.
    Assignment,
    /// `Principal.email`.
    PrincipalEmail,
    /// `Token.value`.
    TokenValue,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResourceName => "resource.name",
            Self::ActionName => "action.name",
            Self::PermissionPair => "permission.resource_action",
            Self::RoleName => "role.name",
            Self::RoleGrant => "role_grant.role_permission",
            Self::Assignment => "assignment.principal_role",
            Self::PrincipalEmail => "principal.email",
            Self::TokenValue => "token.value",
        };
        f.write_str(name)
    }
}

/// Errors reported by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write collided with an existing row.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(Constraint),
    /// A write referenced a row that does not exist.
    #[error("referenced {0} does not exist")]
    MissingReference(&'static str),
    /// Any other backend failure.
    #[error("store backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps an arbitrary backend error.
    pub fn backend(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(error.into())
    }
}

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Store error wrapper.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
    /// A uniquely named entity already exists.
    #[error("{kind} named {name:?} already exists")]
    DuplicateName { kind: &'static str, name: String },
    /// The role already holds the permission.
    #[error("role {role} already has permission {permission}")]
    AlreadyGranted {
        role: RoleId,
        permission: PermissionId,
    },
    /// The principal already holds the role.
    #[error("principal {principal} already has role {role}")]
    AlreadyAssigned { principal: PrincipalId, role: RoleId },
    /// A referenced entity does not exist.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    /// No active token matches the presented value.
    #[error("invalid token")]
    InvalidToken,
    /// The token was active but past its expiry; it is now invalidated.
    #[error("token expired")]
    TokenExpired,
    /// The token owner is deactivated.
    #[error("principal is disabled")]
    PrincipalDisabled,
    /// Unknown email or wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// The principal lacks the authority for an administrative operation.
    #[error("permission denied")]
    PermissionDenied,
    /// Malformed input.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Two generated token values collided; the store refused the second.
    #[error("token value collision")]
    TokenCollision,
    /// The password hasher failed.
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, key: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub(crate) fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    /// Returns true for failures that should reach an unauthenticated caller
    /// as one generic rejection.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken
                | Self::TokenExpired
                | Self::PrincipalDisabled
                | Self::InvalidCredentials
        )
    }
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}
