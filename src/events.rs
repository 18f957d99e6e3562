use std::fmt;

/// Domain events reported through an [`EventSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A permission row was inserted.
    PermissionCreated,
    /// A role was created.
    RoleCreated,
    /// A role was deleted with its grants and assignments.
    RoleDeleted,
    /// A permission was granted to a role.
    GrantAdded,
    /// A permission was taken away from a role.
    GrantRevoked,
    /// Every grant of a role was replaced at once.
    GrantsReplaced,
    /// A role was assigned to a principal.
    RoleAssigned,
    /// A role assignment was removed.
    RoleRevoked,
    /// A bearer token was issued.
    TokenIssued,
    /// A presented token was past its expiry and got deactivated.
    TokenExpired,
    /// One or more tokens were deactivated on request.
    TokenInvalidated,
    /// Credentials were accepted and a token issued.
    LoginSucceeded,
    /// Credentials were rejected.
    LoginFailed,
    /// A principal account was created.
    PrincipalRegistered,
    /// A principal was soft-deleted.
    PrincipalDeactivated,
    /// An authorization check or the admin gate said no.
    AccessDenied,
}

impl EventKind {
    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PermissionCreated => "permission_created",
            Self::RoleCreated => "role_created",
            Self::RoleDeleted => "role_deleted",
            Self::GrantAdded => "grant_added",
            Self::GrantRevoked => "grant_revoked",
            Self::GrantsReplaced => "grants_replaced",
            Self::RoleAssigned => "role_assigned",
            Self::RoleRevoked => "role_revoked",
            Self::TokenIssued => "token_issued",
            Self::TokenExpired => "token_expired",
            Self::TokenInvalidated => "token_invalidated",
            Self::LoginSucceeded => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::PrincipalRegistered => "principal_registered",
            Self::PrincipalDeactivated => "principal_deactivated",
            Self::AccessDenied => "access_denied",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observability interface for domain events.
pub trait EventSink: Send + Sync {
    /// Records one event with its attributes.
    fn record_event(&self, kind: EventKind, attributes: &[(&str, String)]);
}

/// No-op sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record_event(&self, _kind: EventKind, _attributes: &[(&str, String)]) {}
}

/// Attribute keys that [`TracingSink`] records as fields of their own.
const AUDIT_FIELDS: [&str; 13] = [
    "principal_id",
    "role_id",
    "permission_id",
    "role",
    "resource",
    "action",
    "token",
    "expires_at",
    "count",
    "tokens",
    "privileged",
    "reason",
    "scope",
];

fn audit_field<'a>(attributes: &'a [(&str, String)], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, value)| value.as_str())
}

fn extra_attributes(attributes: &[(&str, String)]) -> Option<String> {
    let extra: Vec<String> = attributes
        .iter()
        .filter(|(key, _)| !AUDIT_FIELDS.contains(key))
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    (!extra.is_empty()).then(|| extra.join(" "))
}

/// Sink that writes events as `tracing` records on target `rs_rbac::audit`.
///
/// Known attributes become separate structured fields; absent ones are left
/// out of the record. Unknown keys are flattened into one `extra` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record_event(&self, kind: EventKind, attributes: &[(&str, String)]) {
        let extra = extra_attributes(attributes);
        tracing::info!(
            target: "rs_rbac::audit",
            event = kind.as_str(),
            principal_id = audit_field(attributes, "principal_id"),
            role_id = audit_field(attributes, "role_id"),
            permission_id = audit_field(attributes, "permission_id"),
            role = audit_field(attributes, "role"),
            resource = audit_field(attributes, "resource"),
            action = audit_field(attributes, "action"),
            token = audit_field(attributes, "token"),
            expires_at = audit_field(attributes, "expires_at"),
            count = audit_field(attributes, "count"),
            tokens = audit_field(attributes, "tokens"),
            privileged = audit_field(attributes, "privileged"),
            reason = audit_field(attributes, "reason"),
            scope = audit_field(attributes, "scope"),
            extra = extra.as_deref(),
        );
    }
}
