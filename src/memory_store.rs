use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Constraint, StoreError};
use crate::model::{
    Action, Assignment, NewPrincipal, Permission, Principal, Profile, ProfileUpdate, Resource,
    Role, RoleGrant, Timestamp, Token, TokenValue,
};
use crate::store::{
    AssignmentStore, CatalogStore, IdentityStore, RoleStore, StoreResult, TokenStore,
};
use crate::types::{
    ActionId, ActionName, Email, PermissionId, PrincipalId, ResourceId, ResourceName, RoleId,
    RoleName,
};

/// In-memory store implementation for tests and demos.
///
/// Every unique index is enforced and every write, cascades included, runs
/// under one write lock, so each call is atomic. Clones share the same data.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
    #[cfg(test)]
    faults: Arc<std::sync::Mutex<std::collections::VecDeque<Fault>>>,
}

/// Insert outcome forced by a test.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    /// The row is written, then a unique conflict is reported, as seen by a
    /// writer that lost a race.
    LostRace,
    /// A unique conflict is reported and nothing is written.
    Conflict,
}

#[derive(Debug, Default)]
struct Sequences {
    principal: u64,
    resource: u64,
    action: u64,
    permission: u64,
    role: u64,
}

fn next(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

#[derive(Debug)]
struct PrincipalRow {
    principal: Principal,
    password_hash: Option<String>,
    profile: Profile,
}

#[derive(Debug, Default)]
struct Tables {
    seq: Sequences,
    principals: BTreeMap<PrincipalId, PrincipalRow>,
    principal_emails: HashMap<Email, PrincipalId>,
    resources: BTreeMap<ResourceId, Resource>,
    resource_names: HashMap<String, ResourceId>,
    actions: BTreeMap<ActionId, Action>,
    action_names: HashMap<String, ActionId>,
    permissions: BTreeMap<PermissionId, Permission>,
    permission_pairs: HashMap<(ResourceId, ActionId), PermissionId>,
    roles: BTreeMap<RoleId, Role>,
    role_names: HashMap<String, RoleId>,
    grants: BTreeMap<(RoleId, PermissionId), RoleGrant>,
    assignments: BTreeMap<(PrincipalId, RoleId), Assignment>,
    tokens: HashMap<TokenValue, Token>,
}

impl Tables {
    fn grant_keys_for_role(&self, role: RoleId) -> Vec<(RoleId, PermissionId)> {
        self.grants
            .range((role, PermissionId::new(0))..=(role, PermissionId::new(u64::MAX)))
            .map(|(key, _)| *key)
            .collect()
    }

    fn remove_permission_row(&mut self, id: PermissionId) -> bool {
        let Some(permission) = self.permissions.remove(&id) else {
            return false;
        };
        self.permission_pairs
            .remove(&(permission.resource_id, permission.action_id));
        self.grants.retain(|(_, granted), _| *granted != id);
        true
    }

    fn remove_permissions_where(&mut self, predicate: impl Fn(&Permission) -> bool) {
        let doomed: Vec<PermissionId> = self
            .permissions
            .values()
            .filter(|permission| predicate(permission))
            .map(|permission| permission.id)
            .collect();
        for id in doomed {
            self.remove_permission_row(id);
        }
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.inner
            .read()
            .map_err(|_| StoreError::backend("memory store lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.inner
            .write()
            .map_err(|_| StoreError::backend("memory store lock poisoned"))
    }

    #[cfg(not(test))]
    fn unique_insert<T>(
        &self,
        _constraint: Constraint,
        insert: impl FnOnce() -> StoreResult<T>,
    ) -> StoreResult<T> {
        insert()
    }

    #[cfg(test)]
    fn unique_insert<T>(
        &self,
        constraint: Constraint,
        insert: impl FnOnce() -> StoreResult<T>,
    ) -> StoreResult<T> {
        let fault = self.faults.lock().unwrap().pop_front();
        match fault {
            Some(Fault::LostRace) => insert().and(Err(StoreError::UniqueViolation(constraint))),
            Some(Fault::Conflict) => Err(StoreError::UniqueViolation(constraint)),
            None => insert(),
        }
    }

    /// Queues faults consumed in order by the next resource, action,
    /// permission and token inserts.
    #[cfg(test)]
    pub(crate) fn inject(&self, faults: &[Fault]) {
        self.faults.lock().unwrap().extend(faults.iter().copied());
    }
}

fn now() -> Timestamp {
    Utc::now()
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn insert_principal(&self, principal: NewPrincipal) -> StoreResult<Principal> {
        let mut guard = self.write()?;
        if guard.principal_emails.contains_key(&principal.email) {
            return Err(StoreError::UniqueViolation(Constraint::PrincipalEmail));
        }
        let id = PrincipalId::new(next(&mut guard.seq.principal));
        let joined = now();
        let record = Principal {
            id,
            email: principal.email.clone(),
            is_active: true,
            is_privileged: principal.is_privileged,
            date_joined: joined,
            last_login: None,
        };
        let mut profile = Profile {
            principal_id: id,
            first_name: String::new(),
            last_name: String::new(),
            middle_name: String::new(),
            created_at: joined,
            updated_at: joined,
        };
        profile.apply(principal.profile);
        guard.principal_emails.insert(principal.email, id);
        guard.principals.insert(
            id,
            PrincipalRow {
                principal: record.clone(),
                password_hash: principal.password_hash,
                profile,
            },
        );
        Ok(record)
    }

    async fn principal(&self, id: PrincipalId) -> StoreResult<Option<Principal>> {
        let guard = self.read()?;
        Ok(guard.principals.get(&id).map(|row| row.principal.clone()))
    }

    async fn principal_by_email(&self, email: &Email) -> StoreResult<Option<Principal>> {
        let guard = self.read()?;
        Ok(guard
            .principal_emails
            .get(email)
            .and_then(|id| guard.principals.get(id))
            .map(|row| row.principal.clone()))
    }

    async fn password_hash(&self, id: PrincipalId) -> StoreResult<Option<String>> {
        let guard = self.read()?;
        Ok(guard
            .principals
            .get(&id)
            .and_then(|row| row.password_hash.clone()))
    }

    async fn set_password_hash(&self, id: PrincipalId, hash: String) -> StoreResult<bool> {
        let mut guard = self.write()?;
        Ok(match guard.principals.get_mut(&id) {
            Some(row) => {
                row.password_hash = Some(hash);
                true
            }
            None => false,
        })
    }

    async fn set_principal_active(&self, id: PrincipalId, active: bool) -> StoreResult<bool> {
        let mut guard = self.write()?;
        Ok(match guard.principals.get_mut(&id) {
            Some(row) => {
                row.principal.is_active = active;
                true
            }
            None => false,
        })
    }

    async fn profile(&self, id: PrincipalId) -> StoreResult<Option<Profile>> {
        let guard = self.read()?;
        Ok(guard.principals.get(&id).map(|row| row.profile.clone()))
    }

    async fn update_profile(
        &self,
        id: PrincipalId,
        update: ProfileUpdate,
    ) -> StoreResult<Option<Profile>> {
        let mut guard = self.write()?;
        Ok(guard.principals.get_mut(&id).map(|row| {
            row.profile.apply(update);
            row.profile.updated_at = now();
            row.profile.clone()
        }))
    }

    async fn touch_last_login(&self, id: PrincipalId, at: Timestamp) -> StoreResult<bool> {
        let mut guard = self.write()?;
        Ok(match guard.principals.get_mut(&id) {
            Some(row) => {
                row.principal.last_login = Some(at);
                true
            }
            None => false,
        })
    }

    async fn delete_principal(&self, id: PrincipalId) -> StoreResult<bool> {
        let mut guard = self.write()?;
        let Some(row) = guard.principals.remove(&id) else {
            return Ok(false);
        };
        guard.principal_emails.remove(&row.principal.email);
        guard.assignments.retain(|(principal, _), _| *principal != id);
        guard.tokens.retain(|_, token| token.principal_id != id);
        Ok(true)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_resource(
        &self,
        name: ResourceName,
        description: String,
    ) -> StoreResult<Resource> {
        self.unique_insert(Constraint::ResourceName, || {
            let mut guard = self.write()?;
            if guard.resource_names.contains_key(name.as_str()) {
                return Err(StoreError::UniqueViolation(Constraint::ResourceName));
            }
            let id = ResourceId::new(next(&mut guard.seq.resource));
            let resource = Resource {
                id,
                name,
                description,
                created_at: now(),
            };
            guard
                .resource_names
                .insert(resource.name.as_str().to_string(), id);
            guard.resources.insert(id, resource.clone());
            Ok(resource)
        })
    }

    async fn resource(&self, id: ResourceId) -> StoreResult<Option<Resource>> {
        let guard = self.read()?;
        Ok(guard.resources.get(&id).cloned())
    }

    async fn resource_by_name(&self, name: &str) -> StoreResult<Option<Resource>> {
        let guard = self.read()?;
        Ok(guard
            .resource_names
            .get(name)
            .and_then(|id| guard.resources.get(id))
            .cloned())
    }

    async fn resources(&self) -> StoreResult<Vec<Resource>> {
        let guard = self.read()?;
        let mut resources: Vec<Resource> = guard.resources.values().cloned().collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(resources)
    }

    async fn update_resource_description(
        &self,
        id: ResourceId,
        description: String,
    ) -> StoreResult<Option<Resource>> {
        let mut guard = self.write()?;
        Ok(guard.resources.get_mut(&id).map(|resource| {
            resource.description = description;
            resource.clone()
        }))
    }

    async fn delete_resource(&self, id: ResourceId) -> StoreResult<bool> {
        let mut guard = self.write()?;
        let Some(resource) = guard.resources.remove(&id) else {
            return Ok(false);
        };
        guard.resource_names.remove(resource.name.as_str());
        guard.remove_permissions_where(|permission| permission.resource_id == id);
        Ok(true)
    }

    async fn insert_action(&self, name: ActionName, description: String) -> StoreResult<Action> {
        self.unique_insert(Constraint::ActionName, || {
            let mut guard = self.write()?;
            if guard.action_names.contains_key(name.as_str()) {
                return Err(StoreError::UniqueViolation(Constraint::ActionName));
            }
            let id = ActionId::new(next(&mut guard.seq.action));
            let action = Action {
                id,
                name,
                description,
                created_at: now(),
            };
            guard
                .action_names
                .insert(action.name.as_str().to_string(), id);
            guard.actions.insert(id, action.clone());
            Ok(action)
        })
    }

    async fn action(&self, id: ActionId) -> StoreResult<Option<Action>> {
        let guard = self.read()?;
        Ok(guard.actions.get(&id).cloned())
    }

    async fn action_by_name(&self, name: &str) -> StoreResult<Option<Action>> {
        let guard = self.read()?;
        Ok(guard
            .action_names
            .get(name)
            .and_then(|id| guard.actions.get(id))
            .cloned())
    }

    async fn actions(&self) -> StoreResult<Vec<Action>> {
        let guard = self.read()?;
        let mut actions: Vec<Action> = guard.actions.values().cloned().collect();
        actions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(actions)
    }

    async fn update_action_description(
        &self,
        id: ActionId,
        description: String,
    ) -> StoreResult<Option<Action>> {
        let mut guard = self.write()?;
        Ok(guard.actions.get_mut(&id).map(|action| {
            action.description = description;
            action.clone()
        }))
    }

    async fn delete_action(&self, id: ActionId) -> StoreResult<bool> {
        let mut guard = self.write()?;
        let Some(action) = guard.actions.remove(&id) else {
            return Ok(false);
        };
        guard.action_names.remove(action.name.as_str());
        guard.remove_permissions_where(|permission| permission.action_id == id);
        Ok(true)
    }

    async fn insert_permission(
        &self,
        resource: ResourceId,
        action: ActionId,
    ) -> StoreResult<Permission> {
        self.unique_insert(Constraint::PermissionPair, || {
            let mut guard = self.write()?;
            if !guard.resources.contains_key(&resource) {
                return Err(StoreError::MissingReference("resource"));
            }
            if !guard.actions.contains_key(&action) {
                return Err(StoreError::MissingReference("action"));
            }
            if guard.permission_pairs.contains_key(&(resource, action)) {
                return Err(StoreError::UniqueViolation(Constraint::PermissionPair));
            }
            let id = PermissionId::new(next(&mut guard.seq.permission));
            let permission = Permission {
                id,
                resource_id: resource,
                action_id: action,
                created_at: now(),
            };
            guard.permission_pairs.insert((resource, action), id);
            guard.permissions.insert(id, permission.clone());
            Ok(permission)
        })
    }

    async fn permission(&self, id: PermissionId) -> StoreResult<Option<Permission>> {
        let guard = self.read()?;
        Ok(guard.permissions.get(&id).cloned())
    }

    async fn permission_by_pair(
        &self,
        resource: ResourceId,
        action: ActionId,
    ) -> StoreResult<Option<Permission>> {
        let guard = self.read()?;
        Ok(guard
            .permission_pairs
            .get(&(resource, action))
            .and_then(|id| guard.permissions.get(id))
            .cloned())
    }

    async fn permission_by_names(
        &self,
        resource: &str,
        action: &str,
    ) -> StoreResult<Option<Permission>> {
        let guard = self.read()?;
        let (Some(resource), Some(action)) = (
            guard.resource_names.get(resource),
            guard.action_names.get(action),
        ) else {
            return Ok(None);
        };
        Ok(guard
            .permission_pairs
            .get(&(*resource, *action))
            .and_then(|id| guard.permissions.get(id))
            .cloned())
    }

    async fn permissions(&self) -> StoreResult<Vec<Permission>> {
        let guard = self.read()?;
        Ok(guard.permissions.values().cloned().collect())
    }

    async fn delete_permission(&self, id: PermissionId) -> StoreResult<bool> {
        let mut guard = self.write()?;
        Ok(guard.remove_permission_row(id))
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn insert_role(&self, name: RoleName, description: String) -> StoreResult<Role> {
        let mut guard = self.write()?;
        if guard.role_names.contains_key(name.as_str()) {
            return Err(StoreError::UniqueViolation(Constraint::RoleName));
        }
        let id = RoleId::new(next(&mut guard.seq.role));
        let created_at = now();
        let role = Role {
            id,
            name,
            description,
            created_at,
            updated_at: created_at,
        };
        guard.role_names.insert(role.name.as_str().to_string(), id);
        guard.roles.insert(id, role.clone());
        Ok(role)
    }

    async fn role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        let guard = self.read()?;
        Ok(guard.roles.get(&id).cloned())
    }

    async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let guard = self.read()?;
        Ok(guard
            .role_names
            .get(name)
            .and_then(|id| guard.roles.get(id))
            .cloned())
    }

    async fn roles(&self) -> StoreResult<Vec<Role>> {
        let guard = self.read()?;
        let mut roles: Vec<Role> = guard.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn update_role(
        &self,
        id: RoleId,
        name: Option<RoleName>,
        description: Option<String>,
    ) -> StoreResult<Option<Role>> {
        let mut guard = self.write()?;
        let Some(current) = guard.roles.get(&id).cloned() else {
            return Ok(None);
        };
        if let Some(name) = &name
            && name != &current.name
            && guard.role_names.contains_key(name.as_str())
        {
            return Err(StoreError::UniqueViolation(Constraint::RoleName));
        }
        let mut updated = current;
        if let Some(name) = name {
            guard.role_names.remove(updated.name.as_str());
            guard.role_names.insert(name.as_str().to_string(), id);
            updated.name = name;
        }
        if let Some(description) = description {
            updated.description = description;
        }
        updated.updated_at = now();
        guard.roles.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_role(&self, id: RoleId) -> StoreResult<bool> {
        let mut guard = self.write()?;
        let Some(role) = guard.roles.remove(&id) else {
            return Ok(false);
        };
        guard.role_names.remove(role.name.as_str());
        for key in guard.grant_keys_for_role(id) {
            guard.grants.remove(&key);
        }
        guard.assignments.retain(|(_, role), _| *role != id);
        Ok(true)
    }

    async fn insert_grant(
        &self,
        role: RoleId,
        permission: PermissionId,
    ) -> StoreResult<RoleGrant> {
        let mut guard = self.write()?;
        if !guard.roles.contains_key(&role) {
            return Err(StoreError::MissingReference("role"));
        }
        if !guard.permissions.contains_key(&permission) {
            return Err(StoreError::MissingReference("permission"));
        }
        if guard.grants.contains_key(&(role, permission)) {
            return Err(StoreError::UniqueViolation(Constraint::RoleGrant));
        }
        let grant = RoleGrant {
            role_id: role,
            permission_id: permission,
            created_at: now(),
        };
        guard.grants.insert((role, permission), grant.clone());
        Ok(grant)
    }

    async fn delete_grant(&self, role: RoleId, permission: PermissionId) -> StoreResult<bool> {
        let mut guard = self.write()?;
        Ok(guard.grants.remove(&(role, permission)).is_some())
    }

    async fn grant_exists(&self, role: RoleId, permission: PermissionId) -> StoreResult<bool> {
        let guard = self.read()?;
        Ok(guard.grants.contains_key(&(role, permission)))
    }

    async fn role_permissions(&self, role: RoleId) -> StoreResult<Vec<Permission>> {
        let guard = self.read()?;
        Ok(guard
            .grant_keys_for_role(role)
            .into_iter()
            .filter_map(|(_, permission)| guard.permissions.get(&permission).cloned())
            .collect())
    }

    async fn replace_grants(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> StoreResult<Vec<RoleGrant>> {
        let mut guard = self.write()?;
        if !guard.roles.contains_key(&role) {
            return Err(StoreError::MissingReference("role"));
        }
        let wanted: BTreeSet<PermissionId> = permissions.iter().copied().collect();
        if wanted.iter().any(|id| !guard.permissions.contains_key(id)) {
            return Err(StoreError::MissingReference("permission"));
        }

        for key in guard.grant_keys_for_role(role) {
            guard.grants.remove(&key);
        }
        let created_at = now();
        let mut grants = Vec::with_capacity(wanted.len());
        for permission in wanted {
            let grant = RoleGrant {
                role_id: role,
                permission_id: permission,
                created_at,
            };
            guard.grants.insert((role, permission), grant.clone());
            grants.push(grant);
        }
        if let Some(record) = guard.roles.get_mut(&role) {
            record.updated_at = created_at;
        }
        Ok(grants)
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn insert_assignment(
        &self,
        principal: PrincipalId,
        role: RoleId,
    ) -> StoreResult<Assignment> {
        let mut guard = self.write()?;
        if !guard.principals.contains_key(&principal) {
            return Err(StoreError::MissingReference("principal"));
        }
        if !guard.roles.contains_key(&role) {
            return Err(StoreError::MissingReference("role"));
        }
        if guard.assignments.contains_key(&(principal, role)) {
            return Err(StoreError::UniqueViolation(Constraint::Assignment));
        }
        let assignment = Assignment {
            principal_id: principal,
            role_id: role,
            created_at: now(),
        };
        guard
            .assignments
            .insert((principal, role), assignment.clone());
        Ok(assignment)
    }

    async fn delete_assignment(&self, principal: PrincipalId, role: RoleId) -> StoreResult<bool> {
        let mut guard = self.write()?;
        Ok(guard.assignments.remove(&(principal, role)).is_some())
    }

    async fn principal_roles(&self, principal: PrincipalId) -> StoreResult<Vec<RoleId>> {
        let guard = self.read()?;
        Ok(guard
            .assignments
            .range((principal, RoleId::new(0))..=(principal, RoleId::new(u64::MAX)))
            .map(|((_, role), _)| *role)
            .collect())
    }

    async fn assignments(&self) -> StoreResult<Vec<Assignment>> {
        let guard = self.read()?;
        Ok(guard.assignments.values().cloned().collect())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, token: Token) -> StoreResult<()> {
        self.unique_insert(Constraint::TokenValue, || {
            let mut guard = self.write()?;
            if guard.tokens.contains_key(&token.value) {
                return Err(StoreError::UniqueViolation(Constraint::TokenValue));
            }
            if !guard.principals.contains_key(&token.principal_id) {
                return Err(StoreError::MissingReference("principal"));
            }
            guard.tokens.insert(token.value.clone(), token);
            Ok(())
        })
    }

    async fn active_token(&self, value: &TokenValue) -> StoreResult<Option<Token>> {
        let guard = self.read()?;
        Ok(guard
            .tokens
            .get(value)
            .filter(|token| token.is_active)
            .cloned())
    }

    async fn deactivate_token(&self, value: &TokenValue) -> StoreResult<bool> {
        let mut guard = self.write()?;
        Ok(match guard.tokens.get_mut(value) {
            Some(token) if token.is_active => {
                token.is_active = false;
                true
            }
            _ => false,
        })
    }

    async fn deactivate_owned_token(
        &self,
        value: &TokenValue,
        principal: PrincipalId,
    ) -> StoreResult<bool> {
        let mut guard = self.write()?;
        Ok(match guard.tokens.get_mut(value) {
            Some(token) if token.is_active && token.principal_id == principal => {
                token.is_active = false;
                true
            }
            _ => false,
        })
    }

    async fn deactivate_principal_tokens(&self, principal: PrincipalId) -> StoreResult<usize> {
        let mut guard = self.write()?;
        let mut count = 0;
        for token in guard.tokens.values_mut() {
            if token.principal_id == principal && token.is_active {
                token.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }
}
