use std::sync::Arc;

use crate::error::Result;
use crate::events::{EventKind, EventSink, TracingSink};
use crate::model::Principal;
use crate::permission::PermissionKey;
use crate::store::Store;

/// Authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Permission is granted.
    Allow,
    /// Permission is denied.
    Deny,
}

impl Decision {
    /// Returns true for [`Decision::Allow`].
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny }
    }
}

/// RBAC engine over a pluggable store.
///
/// Deny by default: anonymous and inactive principals are denied, unknown
/// permissions are denied, and only an exact `(resource, action)` grant on one
/// of the principal's roles allows. Privileged principals bypass the role
/// lookup entirely.
#[derive(Clone)]
pub struct Engine<S> {
    store: S,
    events: Arc<dyn EventSink>,
    admin_role_name: String,
}

/// Builder for [`Engine`].
pub struct EngineBuilder<S> {
    store: S,
    events: Arc<dyn EventSink>,
    admin_role_name: String,
}

impl<S> EngineBuilder<S> {
    /// Creates a new builder with default configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            events: Arc::new(TracingSink),
            admin_role_name: "Admin".to_string(),
        }
    }

    /// Sets the event sink that receives denials.
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the role name that grants administrative authority.
    pub fn admin_role_name(mut self, name: impl Into<String>) -> Self {
        self.admin_role_name = name.into();
        self
    }

    /// Builds the engine.
    pub fn build(self) -> Engine<S> {
        Engine {
            store: self.store,
            events: self.events,
            admin_role_name: self.admin_role_name,
        }
    }
}

impl<S> Engine<S> {
    /// Returns the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the configured administrator role name.
    pub fn admin_role_name(&self) -> &str {
        &self.admin_role_name
    }
}

impl<S: Store> Engine<S> {
    /// Decides whether `principal` may perform `action_name` on `resource_name`.
    ///
    /// Names are compared exactly. An unknown permission is a deny, not an
    /// error; store failures are propagated.
    pub async fn authorize(
        &self,
        principal: Option<&Principal>,
        resource_name: &str,
        action_name: &str,
    ) -> Result<Decision> {
        let Some(principal) = principal.filter(|p| p.is_active) else {
            return Ok(Decision::Deny);
        };
        if principal.is_privileged {
            return Ok(Decision::Allow);
        }

        let decision = Decision::from(
            self.holds_permission(principal, resource_name, action_name)
                .await?,
        );
        if decision == Decision::Deny {
            self.events.record_event(
                EventKind::AccessDenied,
                &[
                    ("principal_id", principal.id.to_string()),
                    ("resource", resource_name.to_string()),
                    ("action", action_name.to_string()),
                ],
            );
        }
        Ok(decision)
    }

    /// Same as [`authorize`](Self::authorize) for a parsed key.
    pub async fn authorize_key(
        &self,
        principal: Option<&Principal>,
        key: &PermissionKey,
    ) -> Result<Decision> {
        self.authorize(principal, key.resource().as_str(), key.action().as_str())
            .await
    }

    /// Boolean form of [`authorize`](Self::authorize).
    pub async fn is_authorized(
        &self,
        principal: Option<&Principal>,
        resource_name: &str,
        action_name: &str,
    ) -> Result<bool> {
        Ok(self
            .authorize(principal, resource_name, action_name)
            .await?
            .is_allowed())
    }

    /// Returns whether the principal may run administrative operations: it is
    /// privileged or holds the administrator role.
    pub async fn is_admin(&self, principal: Option<&Principal>) -> Result<bool> {
        let Some(principal) = principal.filter(|p| p.is_active) else {
            return Ok(false);
        };
        if principal.is_privileged {
            return Ok(true);
        }
        let Some(admin) = self.store.role_by_name(&self.admin_role_name).await? else {
            return Ok(false);
        };
        let roles = self.store.principal_roles(principal.id).await?;
        Ok(roles.contains(&admin.id))
    }

    async fn holds_permission(
        &self,
        principal: &Principal,
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
        for role in self.store.principal_roles(principal.id).await? {
            if self.store.grant_exists(role, permission.id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignments::Assignments;
    use crate::events::testing::RecordingSink;
    use crate::memory_store::MemoryStore;
    use crate::model::{NewPrincipal, ProfileUpdate};
    use crate::roles::RoleRegistry;
    use crate::store::IdentityStore;
    use crate::types::{Email, PrincipalId};
    use futures::executor::block_on;

    struct Fixture {
        store: MemoryStore,
        roles: RoleRegistry<MemoryStore>,
        assignments: Assignments<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        Fixture {
            roles: RoleRegistry::new(store.clone()),
            assignments: Assignments::new(store.clone()),
            store,
        }
    }

    fn principal(store: &MemoryStore, email: &str, is_privileged: bool) -> Principal {
        block_on(store.insert_principal(NewPrincipal {
            email: Email::new(email).unwrap(),
            password_hash: None,
            is_privileged,
            profile: ProfileUpdate::default(),
        }))
        .unwrap()
    }

    #[test]
    fn authorize_should_follow_manager_grants() {
        let fx = fixture();
        let manager = block_on(fx.roles.create_role("Manager", "")).unwrap();
        for action in ["list", "read", "update"] {
            block_on(fx.roles.grant_permission_by_names(manager.id, "orders", action)).unwrap();
        }
        let alice = principal(&fx.store, "alice@example.com", false);
        block_on(fx.assignments.assign_role(alice.id, manager.id)).unwrap();

        let engine = EngineBuilder::new(fx.store.clone()).build();
        for action in ["list", "read", "update"] {
            let decision = block_on(engine.authorize(Some(&alice), "orders", action)).unwrap();
            assert_eq!(decision, Decision::Allow, "orders.{action}");
        }
        let decision = block_on(engine.authorize(Some(&alice), "orders", "delete")).unwrap();
        assert_eq!(decision, Decision::Deny);
    }

    #[test]
    fn authorize_should_deny_anonymous_and_inactive() {
        let fx = fixture();
        let role = block_on(fx.roles.create_role("Guest", "")).unwrap();
        block_on(fx.roles.grant_permission_by_names(role.id, "products", "list")).unwrap();
        let mut bob = principal(&fx.store, "bob@example.com", false);
        block_on(fx.assignments.assign_role(bob.id, role.id)).unwrap();

        let engine = EngineBuilder::new(fx.store.clone()).build();
        assert_eq!(
            block_on(engine.authorize(None, "products", "list")).unwrap(),
            Decision::Deny
        );
        bob.is_active = false;
        assert_eq!(
            block_on(engine.authorize(Some(&bob), "products", "list")).unwrap(),
            Decision::Deny
        );
    }

    #[test]
    fn authorize_should_deny_unknown_permission_without_error() {
        let fx = fixture();
        let carol = principal(&fx.store, "carol@example.com", false);
        let sink = Arc::new(RecordingSink::default());
        let engine = EngineBuilder::new(fx.store.clone())
            .events(sink.clone())
            .build();

        let decision = block_on(engine.authorize(Some(&carol), "nothing", "here")).unwrap();
        assert_eq!(decision, Decision::Deny);
        assert_eq!(sink.kinds(), vec![EventKind::AccessDenied]);
    }

    #[test]
    fn privileged_principal_bypasses_lookup() {
        let engine = EngineBuilder::new(MemoryStore::new()).build();
        let root = Principal {
            id: PrincipalId::new(1),
            email: Email::new("root@example.com").unwrap(),
            is_active: true,
            is_privileged: true,
            date_joined: chrono::Utc::now(),
            last_login: None,
        };

        assert!(block_on(engine.is_authorized(Some(&root), "anything", "at_all")).unwrap());
        assert!(block_on(engine.is_admin(Some(&root))).unwrap());
    }

    #[test]
    fn authorize_is_case_sensitive() {
        let fx = fixture();
        let role = block_on(fx.roles.create_role("User", "")).unwrap();
        block_on(fx.roles.grant_permission_by_names(role.id, "orders", "create")).unwrap();
        let dave = principal(&fx.store, "dave@example.com", false);
        block_on(fx.assignments.assign_role(dave.id, role.id)).unwrap();

        let engine = EngineBuilder::new(fx.store.clone()).build();
        let key = PermissionKey::parse("orders.create").unwrap();
        assert!(block_on(engine.authorize_key(Some(&dave), &key)).unwrap().is_allowed());
        assert!(!block_on(engine.is_authorized(Some(&dave), "Orders", "create")).unwrap());
    }

    #[test]
    fn is_admin_requires_the_configured_role() {
        let fx = fixture();
        let staff = block_on(fx.roles.create_role("Staff", "")).unwrap();
        let erin = principal(&fx.store, "erin@example.com", false);
        block_on(fx.assignments.assign_role(erin.id, staff.id)).unwrap();

        let engine = EngineBuilder::new(fx.store.clone()).build();
        assert!(!block_on(engine.is_admin(Some(&erin))).unwrap());

        let engine = EngineBuilder::new(fx.store.clone())
            .admin_role_name("Staff")
            .build();
        assert!(block_on(engine.is_admin(Some(&erin))).unwrap());
        assert!(!block_on(engine.is_admin(None)).unwrap());
    }
}
