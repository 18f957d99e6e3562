use crate::error::{Error, Result};
use crate::types::{ActionName, ResourceName};
use std::fmt;

/// Permission named by its parts, written `resource.action`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PermissionKey {
    resource: ResourceName,
    action: ActionName,
}

impl PermissionKey {
    /// Creates a key from validated parts.
    pub fn new(resource: impl AsRef<str>, action: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            resource: ResourceName::new(resource)?,
            action: ActionName::new(action)?,
        })
    }

    /// Creates a key from names that are already validated.
    pub fn from_names(resource: ResourceName, action: ActionName) -> Self {
        Self { resource, action }
    }

    /// Parses `resource.action`. The last dot separates the action.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        let (resource, action) = split_permission(trimmed).ok_or_else(|| {
            Error::Validation("permission must be in resource.action format".to_string())
        })?;
        if resource.is_empty() || action.is_empty() {
            return Err(Error::Validation(
                "permission must not have empty segments".to_string(),
            ));
        }
        Self::new(resource, action)
    }

    /// Resource part.
    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    /// Action part.
    pub fn action(&self) -> &ActionName {
        &self.action
    }

    /// Exact, case-sensitive comparison against literal names.
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        self.resource.as_str() == resource && self.action.as_str() == action
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.action)
    }
}

impl TryFrom<&str> for PermissionKey {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

fn split_permission(value: &str) -> Option<(&str, &str)> {
    value.rsplit_once('.')
}

/// Maps a conventional CRUD handler verb to the action name it requires.
///
/// `retrieve` reads, `partial_update` updates, `destroy` deletes; `list`,
/// `create` and `update` map to themselves. Unmapped verbs pass through.
/// This is a caller-side policy: [`Engine`](crate::Engine) only compares
/// literal names.
pub fn crud_action(verb: &str) -> &str {
    match verb {
        "list" => "list",
        "retrieve" => "read",
        "create" => "create",
        "update" | "partial_update" => "update",
        "destroy" => "delete",
        other => other,
    }
}
