use std::sync::Arc;

use crate::catalog::{PermissionCatalog, duplicate_or_store};
use crate::error::{Error, Result, StoreError};
use crate::events::{EventKind, EventSink, TracingSink};
use crate::model::{Permission, Role, RoleGrant};
use crate::store::Store;
use crate::types::{PermissionId, RoleId, RoleName};

/// Named roles and the permissions granted to them.
#[derive(Clone)]
pub struct RoleRegistry<S> {
    store: S,
    catalog: PermissionCatalog<S>,
    events: Arc<dyn EventSink>,
}

impl<S: Clone> RoleRegistry<S> {
    /// Creates a registry that reports events through [`TracingSink`].
    pub fn new(store: S) -> Self {
        Self {
            catalog: PermissionCatalog::new(store.clone()),
            store,
            events: Arc::new(TracingSink),
        }
    }

    /// Sets the event sink.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.catalog = self.catalog.with_events(events.clone());
        self.events = events;
        self
    }

    /// Replaces the catalog used for grants by name.
    pub fn with_catalog(mut self, catalog: PermissionCatalog<S>) -> Self {
        self.catalog = catalog;
        self
    }
}

impl<S: Store> RoleRegistry<S> {
    /// Creates a role; fails with `DuplicateName` when the name is taken.
    pub async fn create_role(&self, name: &str, description: impl Into<String>) -> Result<Role> {
        let name = RoleName::new(name)?;
        let role = self
            .store
            .insert_role(name.clone(), description.into())
            .await
            .map_err(|err| duplicate_or_store(err, "role", name.as_str()))?;
        self.events.record_event(
            EventKind::RoleCreated,
            &[
                ("role_id", role.id.to_string()),
                ("role", role.name.to_string()),
            ],
        );
        Ok(role)
    }

    /// Returns a role by id.
    pub async fn role(&self, id: RoleId) -> Result<Role> {
        self.store
            .role(id)
            .await?
            .ok_or_else(|| Error::not_found("role", id))
    }

    /// Returns a role by exact name.
    pub async fn role_by_name(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.store.role_by_name(name).await?)
    }

    /// Returns all roles ordered by name.
    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        Ok(self.store.roles().await?)
    }

    /// Renames and/or redescribes a role.
    pub async fn update_role(
        &self,
        id: RoleId,
        name: Option<&str>,
        description: Option<String>,
    ) -> Result<Role> {
        let name = name.map(RoleName::new).transpose()?;
        let label = name.as_ref().map(|n| n.to_string()).unwrap_or_default();
        self.store
            .update_role(id, name, description)
            .await
            .map_err(|err| duplicate_or_store(err, "role", &label))?
            .ok_or_else(|| Error::not_found("role", id))
    }

    /// Deletes a role with its grants and assignments.
    pub async fn delete_role(&self, id: RoleId) -> Result<()> {
        if !self.store.delete_role(id).await? {
            return Err(Error::not_found("role", id));
        }
        self.events
            .record_event(EventKind::RoleDeleted, &[("role_id", id.to_string())]);
        Ok(())
    }

    /// Grants a permission to a role.
    ///
    /// Unlike the catalog's get-or-create, a repeated grant is a conflict:
    /// it fails with `AlreadyGranted`.
    pub async fn grant_permission(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<RoleGrant> {
        self.role(role_id).await?;
        if self.store.permission(permission_id).await?.is_none() {
            return Err(Error::not_found("permission", permission_id));
        }
        let grant = match self.store.insert_grant(role_id, permission_id).await {
            Ok(grant) => grant,
            Err(StoreError::UniqueViolation(_)) => {
                return Err(Error::AlreadyGranted {
                    role: role_id,
                    permission: permission_id,
                });
            }
            Err(StoreError::MissingReference(kind)) => {
                return Err(Error::not_found(kind, format!("{role_id}/{permission_id}")));
            }
            Err(err) => return Err(err.into()),
        };
        self.events.record_event(
            EventKind::GrantAdded,
            &[
                ("role_id", role_id.to_string()),
                ("permission_id", permission_id.to_string()),
            ],
        );
        Ok(grant)
    }

    /// Grants `resource_name.action_name`, creating the permission on demand.
    pub async fn grant_permission_by_names(
        &self,
        role_id: RoleId,
        resource_name: &str,
        action_name: &str,
    ) -> Result<RoleGrant> {
        self.role(role_id).await?;
        let (permission, _) = self
            .catalog
            .get_or_create_permission(resource_name, action_name)
            .await?;
        self.grant_permission(role_id, permission.id).await
    }

    /// Removes a grant; fails with `NotFound` when the role does not hold it.
    pub async fn revoke_permission(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<()> {
        if !self.store.delete_grant(role_id, permission_id).await? {
            return Err(Error::not_found(
                "role grant",
                format!("{role_id}/{permission_id}"),
            ));
        }
        self.events.record_event(
            EventKind::GrantRevoked,
            &[
                ("role_id", role_id.to_string()),
                ("permission_id", permission_id.to_string()),
            ],
        );
        Ok(())
    }

    /// Returns whether the role holds the permission with these exact names.
    pub async fn has_permission(
        &self,
        role_id: RoleId,
        resource_name: &str,
        action_name: &str,
    ) -> Result<bool> {
        let Some(permission) = self
            .store
            .permission_by_names(resource_name, action_name)
            .await?
        else {
            return Ok(false);
        };
        Ok(self.store.grant_exists(role_id, permission.id).await?)
    }

    /// Returns the permissions granted to a role.
    pub async fn role_permissions(&self, role_id: RoleId) -> Result<Vec<Permission>> {
        self.role(role_id).await?;
        Ok(self.store.role_permissions(role_id).await?)
    }

    /// Replaces the whole permission set of a role in one transaction.
    ///
    /// An unknown permission id fails with `NotFound` and leaves the previous
    /// set in place. Duplicate ids are collapsed.
    pub async fn replace_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> Result<Vec<RoleGrant>> {
        self.role(role_id).await?;
        for id in permission_ids {
            if self.store.permission(*id).await?.is_none() {
                return Err(Error::not_found("permission", id));
            }
        }
        let grants = self
            .store
            .replace_grants(role_id, permission_ids)
            .await
            .map_err(|err| match err {
                StoreError::MissingReference(kind) => Error::not_found(kind, role_id),
                other => other.into(),
            })?;
        self.events.record_event(
            EventKind::GrantsReplaced,
            &[
                ("role_id", role_id.to_string()),
                ("count", grants.len().to_string()),
            ],
        );
        Ok(grants)
    }
}
