use crate::error::StoreError;
use crate::model::{
    Action, Assignment, NewPrincipal, Permission, Principal, Profile, ProfileUpdate, Resource,
    Role, RoleGrant, Timestamp, Token, TokenValue,
};
use crate::types::{
    ActionId, ActionName, Email, PermissionId, PrincipalId, ResourceId, ResourceName, RoleId,
    RoleName,
};
use async_trait::async_trait;

/// Store result type.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store interface for principals and their password hashes.
#[async_trait]
pub trait IdentityStore {
    /// Inserts a principal together with its profile. Fails with a
    /// `PrincipalEmail` unique violation.
    async fn insert_principal(&self, principal: NewPrincipal) -> StoreResult<Principal>;

    /// Returns a principal by id.
    async fn principal(&self, id: PrincipalId) -> StoreResult<Option<Principal>>;

    /// Returns a principal by normalized email.
    async fn principal_by_email(&self, email: &Email) -> StoreResult<Option<Principal>>;

    /// Returns the stored password hash, if any.
    async fn password_hash(&self, id: PrincipalId) -> StoreResult<Option<String>>;

    /// Replaces the password hash. Returns false when the principal is absent.
    async fn set_password_hash(&self, id: PrincipalId, hash: String) -> StoreResult<bool>;

    /// Sets the active flag. Returns false when the principal is absent.
    async fn set_principal_active(&self, id: PrincipalId, active: bool) -> StoreResult<bool>;

    /// Returns the profile of a principal.
    async fn profile(&self, id: PrincipalId) -> StoreResult<Option<Profile>>;

    /// Applies a partial profile change and bumps `updated_at`. Returns `None`
    /// when the principal is absent.
    async fn update_profile(
        &self,
        id: PrincipalId,
        update: ProfileUpdate,
    ) -> StoreResult<Option<Profile>>;

    /// Stamps the last successful login.
    async fn touch_last_login(&self, id: PrincipalId, at: Timestamp) -> StoreResult<bool>;

    /// Hard-deletes a principal with its assignments and tokens. Returns
    /// false when absent.
    async fn delete_principal(&self, id: PrincipalId) -> StoreResult<bool>;
}

/// Store interface for resources, actions and permissions.
///
/// Deleting a resource or action cascades to its permissions; deleting a
/// permission cascades to its role grants.
#[async_trait]
pub trait CatalogStore {
    /// Inserts a resource. Fails with a `ResourceName` unique violation.
    async fn insert_resource(&self, name: ResourceName, description: String)
    -> StoreResult<Resource>;

    /// Returns a resource by id.
    async fn resource(&self, id: ResourceId) -> StoreResult<Option<Resource>>;

    /// Returns a resource by exact name.
    async fn resource_by_name(&self, name: &str) -> StoreResult<Option<Resource>>;

    /// Returns all resources ordered by name.
    async fn resources(&self) -> StoreResult<Vec<Resource>>;

    /// Updates the description only.
    async fn update_resource_description(
        &self,
        id: ResourceId,
        description: String,
    ) -> StoreResult<Option<Resource>>;

    /// Deletes a resource. Returns false when absent.
    async fn delete_resource(&self, id: ResourceId) -> StoreResult<bool>;

    /// Inserts an action. Fails with an `ActionName` unique violation.
    async fn insert_action(&self, name: ActionName, description: String) -> StoreResult<Action>;

    /// Returns an action by id.
    async fn action(&self, id: ActionId) -> StoreResult<Option<Action>>;

    /// Returns an action by exact name.
    async fn action_by_name(&self, name: &str) -> StoreResult<Option<Action>>;

    /// Returns all actions ordered by name.
    async fn actions(&self) -> StoreResult<Vec<Action>>;

    /// Updates the description only.
    async fn update_action_description(
        &self,
        id: ActionId,
        description: String,
    ) -> StoreResult<Option<Action>>;

    /// Deletes an action. Returns false when absent.
    async fn delete_action(&self, id: ActionId) -> StoreResult<bool>;

    /// Inserts a permission. Fails with a `PermissionPair` unique violation or
    /// a missing reference.
    async fn insert_permission(
        &self,
        resource: ResourceId,
        action: ActionId,
    ) -> StoreResult<Permission>;

    /// Returns a permission by id.
    async fn permission(&self, id: PermissionId) -> StoreResult<Option<Permission>>;

    /// Returns the permission for a (resource, action) pair.
    async fn permission_by_pair(
        &self,
        resource: ResourceId,
        action: ActionId,
    ) -> StoreResult<Option<Permission>>;

    /// Returns the permission whose resource and action carry these exact names.
    async fn permission_by_names(
        &self,
        resource: &str,
        action: &str,
    ) -> StoreResult<Option<Permission>>;

    /// Returns all permissions.
    async fn permissions(&self) -> StoreResult<Vec<Permission>>;

    /// Deletes a permission. Returns false when absent.
    async fn delete_permission(&self, id: PermissionId) -> StoreResult<bool>;
}

/// Store interface for roles and their grants.
#[async_trait]
pub trait RoleStore {
    /// Inserts a role. Fails with a `RoleName` unique violation.
    async fn insert_role(&self, name: RoleName, description: String) -> StoreResult<Role>;

    /// Returns a role by id.
    async fn role(&self, id: RoleId) -> StoreResult<Option<Role>>;

    /// Returns a role by exact name.
    async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;

    /// Returns all roles ordered by name.
    async fn roles(&self) -> StoreResult<Vec<Role>>;

    /// Renames and/or redescribes a role.
    async fn update_role(
        &self,
        id: RoleId,
        name: Option<RoleName>,
        description: Option<String>,
    ) -> StoreResult<Option<Role>>;

    /// Deletes a role with its grants and assignments. Returns false when absent.
    async fn delete_role(&self, id: RoleId) -> StoreResult<bool>;

    /// Inserts a grant. Fails with a `RoleGrant` unique violation or a missing
    /// reference.
    async fn insert_grant(&self, role: RoleId, permission: PermissionId)
    -> StoreResult<RoleGrant>;

    /// Deletes a grant. Returns false when absent.
    async fn delete_grant(&self, role: RoleId, permission: PermissionId) -> StoreResult<bool>;

    /// Returns whether the grant exists.
    async fn grant_exists(&self, role: RoleId, permission: PermissionId) -> StoreResult<bool>;

    /// Returns the permissions granted to a role.
    async fn role_permissions(&self, role: RoleId) -> StoreResult<Vec<Permission>>;

    /// Replaces every grant of a role in one transaction. Either all of
    /// `permissions` are granted afterwards or nothing changed.
    async fn replace_grants(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> StoreResult<Vec<RoleGrant>>;
}

/// Store interface for principal to role assignments.
#[async_trait]
pub trait AssignmentStore {
    /// Inserts an assignment. Fails with an `Assignment` unique violation or a
    /// missing reference.
    async fn insert_assignment(
        &self,
        principal: PrincipalId,
        role: RoleId,
    ) -> StoreResult<Assignment>;

    /// Deletes an assignment. Returns false when absent.
    async fn delete_assignment(&self, principal: PrincipalId, role: RoleId) -> StoreResult<bool>;

    /// Returns roles assigned to a principal.
    async fn principal_roles(&self, principal: PrincipalId) -> StoreResult<Vec<RoleId>>;

    /// Returns all assignments.
    async fn assignments(&self) -> StoreResult<Vec<Assignment>>;
}

/// Store interface for bearer tokens.
#[async_trait]
pub trait TokenStore {
    /// Inserts a token. Fails with a `TokenValue` unique violation; an
    /// existing row is never overwritten.
    async fn insert_token(&self, token: Token) -> StoreResult<()>;

    /// Returns the token with this value if it is still active.
    async fn active_token(&self, value: &TokenValue) -> StoreResult<Option<Token>>;

    /// Flips an active token to inactive. Returns false when nothing changed.
    async fn deactivate_token(&self, value: &TokenValue) -> StoreResult<bool>;

    /// Flips an active token owned by `principal` to inactive.
    async fn deactivate_owned_token(
        &self,
        value: &TokenValue,
        principal: PrincipalId,
    ) -> StoreResult<bool>;

    /// Flips every active token of a principal to inactive.
    async fn deactivate_principal_tokens(&self, principal: PrincipalId) -> StoreResult<usize>;
}

/// Composite store trait.
pub trait Store:
    IdentityStore + CatalogStore + RoleStore + AssignmentStore + TokenStore + Send + Sync
{
}

impl<T> Store for T where
    T: IdentityStore + CatalogStore + RoleStore + AssignmentStore + TokenStore + Send + Sync
{
}
