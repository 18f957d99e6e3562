use std::sync::Arc;

use crate::error::{Constraint, Error, Result, StoreError};
use crate::events::{EventKind, EventSink, TracingSink};
use crate::model::{Action, Permission, Resource};
use crate::permission::PermissionKey;
use crate::store::Store;
use crate::types::{ActionId, ActionName, PermissionId, ResourceId, ResourceName};

/// Resources, actions and the permissions that pair them.
#[derive(Clone)]
pub struct PermissionCatalog<S> {
    store: S,
    events: Arc<dyn EventSink>,
    max_conflict_retries: u32,
}

impl<S> PermissionCatalog<S> {
    /// Creates a catalog that reports events through [`TracingSink`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            events: Arc::new(TracingSink),
            max_conflict_retries: 3,
        }
    }

    /// Sets the event sink.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets how many times get-or-create re-reads after losing an insert race.
    /// One re-read always happens, so `0` behaves like `1`.
    pub fn max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    fn conflict_budget(&self) -> u32 {
        self.max_conflict_retries.max(1)
    }
}

impl<S: Store> PermissionCatalog<S> {
    /// Returns the permission for `(resource_name, action_name)`, creating the
    /// resource, action and permission rows that are missing.
    ///
    /// `created` is true only when this call inserted the permission row.
    /// Concurrent callers racing on the same names all end up with the row
    /// that was inserted first.
    pub async fn get_or_create_permission(
        &self,
        resource_name: &str,
        action_name: &str,
    ) -> Result<(Permission, bool)> {
        let resource_name = ResourceName::new(resource_name)?;
        let action_name = ActionName::new(action_name)?;
        let resource = self.get_or_create_resource(resource_name).await?;
        let action = self.get_or_create_action(action_name).await?;

        let mut conflicts = 0;
        loop {
            if let Some(existing) = self
                .store
                .permission_by_pair(resource.id, action.id)
                .await?
            {
                return Ok((existing, false));
            }
            match self.store.insert_permission(resource.id, action.id).await {
                Ok(permission) => {
                    self.events.record_event(
                        EventKind::PermissionCreated,
                        &[
                            ("permission_id", permission.id.to_string()),
                            ("resource", resource.name.to_string()),
                            ("action", action.name.to_string()),
                        ],
                    );
                    return Ok((permission, true));
                }
                Err(StoreError::UniqueViolation(Constraint::PermissionPair))
                    if conflicts < self.conflict_budget() =>
                {
                    conflicts += 1;
                    tracing::debug!(
                        resource = %resource.name,
                        action = %action.name,
                        conflicts,
                        "permission insert lost a race; re-reading"
                    );
                }
                Err(StoreError::MissingReference(kind)) => {
                    let key = format!("{}.{}", resource.name, action.name);
                    return Err(Error::not_found(kind, key));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Same as [`get_or_create_permission`](Self::get_or_create_permission)
    /// for a parsed key.
    pub async fn get_or_create_key(&self, key: &PermissionKey) -> Result<(Permission, bool)> {
        self.get_or_create_permission(key.resource().as_str(), key.action().as_str())
            .await
    }

    async fn get_or_create_resource(&self, name: ResourceName) -> Result<Resource> {
        let mut conflicts = 0;
        loop {
            if let Some(existing) = self.store.resource_by_name(name.as_str()).await? {
                return Ok(existing);
            }
            match self.store.insert_resource(name.clone(), String::new()).await {
                Ok(resource) => return Ok(resource),
                Err(StoreError::UniqueViolation(Constraint::ResourceName))
                    if conflicts < self.conflict_budget() =>
                {
                    conflicts += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn get_or_create_action(&self, name: ActionName) -> Result<Action> {
        let mut conflicts = 0;
        loop {
            if let Some(existing) = self.store.action_by_name(name.as_str()).await? {
                return Ok(existing);
            }
            match self.store.insert_action(name.clone(), String::new()).await {
                Ok(action) => return Ok(action),
                Err(StoreError::UniqueViolation(Constraint::ActionName))
                    if conflicts < self.conflict_budget() =>
                {
                    conflicts += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Creates a resource; fails with `DuplicateName` when the name is taken.
    pub async fn create_resource(
        &self,
        name: &str,
        description: impl Into<String>,
    ) -> Result<Resource> {
        let name = ResourceName::new(name)?;
        self.store
            .insert_resource(name.clone(), description.into())
            .await
            .map_err(|err| duplicate_or_store(err, "resource", name.as_str()))
    }

    /// Returns a resource by id.
    pub async fn resource(&self, id: ResourceId) -> Result<Resource> {
        self.store
            .resource(id)
            .await?
            .ok_or_else(|| Error::not_found("resource", id))
    }

    /// Returns all resources ordered by name.
    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        Ok(self.store.resources().await?)
    }

    /// Changes the description; the name is immutable.
    pub async fn update_resource_description(
        &self,
        id: ResourceId,
        description: impl Into<String>,
    ) -> Result<Resource> {
        self.store
            .update_resource_description(id, description.into())
            .await?
            .ok_or_else(|| Error::not_found("resource", id))
    }

    /// Deletes a resource together with its permissions and their grants.
    pub async fn delete_resource(&self, id: ResourceId) -> Result<()> {
        if self.store.delete_resource(id).await? {
            tracing::debug!(resource_id = %id, "resource deleted");
            Ok(())
        } else {
            Err(Error::not_found("resource", id))
        }
    }

    /// Creates an action; fails with `DuplicateName` when the name is taken.
    pub async fn create_action(
        &self,
        name: &str,
        description: impl Into<String>,
    ) -> Result<Action> {
        let name = ActionName::new(name)?;
        self.store
            .insert_action(name.clone(), description.into())
            .await
            .map_err(|err| duplicate_or_store(err, "action", name.as_str()))
    }

    /// Returns an action by id.
    pub async fn action(&self, id: ActionId) -> Result<Action> {
        self.store
            .action(id)
            .await?
            .ok_or_else(|| Error::not_found("action", id))
    }

    /// Returns all actions ordered by name.
    pub async fn list_actions(&self) -> Result<Vec<Action>> {
        Ok(self.store.actions().await?)
    }

    /// Changes the description; the name is immutable.
    pub async fn update_action_description(
        &self,
        id: ActionId,
        description: impl Into<String>,
    ) -> Result<Action> {
        self.store
            .update_action_description(id, description.into())
            .await?
            .ok_or_else(|| Error::not_found("action", id))
    }

    /// Deletes an action together with its permissions and their grants.
    pub async fn delete_action(&self, id: ActionId) -> Result<()> {
        if self.store.delete_action(id).await? {
            tracing::debug!(action_id = %id, "action deleted");
            Ok(())
        } else {
            Err(Error::not_found("action", id))
        }
    }

    /// Creates the permission for existing resource and action rows.
    pub async fn create_permission(
        &self,
        resource_id: ResourceId,
        action_id: ActionId,
    ) -> Result<Permission> {
        let resource = self.resource(resource_id).await?;
        let action = self.action(action_id).await?;
        match self.store.insert_permission(resource_id, action_id).await {
            Ok(permission) => {
                self.events.record_event(
                    EventKind::PermissionCreated,
                    &[
                        ("permission_id", permission.id.to_string()),
                        ("resource", resource.name.to_string()),
                        ("action", action.name.to_string()),
                    ],
                );
                Ok(permission)
            }
            Err(StoreError::UniqueViolation(_)) => Err(Error::duplicate(
                "permission",
                format!("{}.{}", resource.name, action.name),
            )),
            Err(StoreError::MissingReference(kind)) => {
                Err(Error::not_found(kind, format!("{resource_id}/{action_id}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns a permission by id.
    pub async fn permission(&self, id: PermissionId) -> Result<Permission> {
        self.store
            .permission(id)
            .await?
            .ok_or_else(|| Error::not_found("permission", id))
    }

    /// Returns all permissions.
    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        Ok(self.store.permissions().await?)
    }

    /// Resolves the names behind a permission.
    pub async fn permission_key(&self, permission: &Permission) -> Result<PermissionKey> {
        let resource = self.resource(permission.resource_id).await?;
        let action = self.action(permission.action_id).await?;
        Ok(PermissionKey::from_names(resource.name, action.name))
    }

    /// Deletes a permission together with the grants that reference it.
    pub async fn delete_permission(&self, id: PermissionId) -> Result<()> {
        if self.store.delete_permission(id).await? {
            tracing::debug!(permission_id = %id, "permission deleted");
            Ok(())
        } else {
            Err(Error::not_found("permission", id))
        }
    }
}

pub(crate) fn duplicate_or_store(err: StoreError, kind: &'static str, name: &str) -> Error {
    match err {
        StoreError::UniqueViolation(_) => Error::duplicate(kind, name),
        other => other.into(),
    }
}
