use std::sync::Arc;

use crate::error::{Error, Result, StoreError};
use crate::events::{EventKind, EventSink, TracingSink};
use crate::model::{Assignment, Role};
use crate::store::Store;
use crate::types::{PrincipalId, RoleId};

/// Which principals hold which roles.
#[derive(Clone)]
pub struct Assignments<S> {
    store: S,
    events: Arc<dyn EventSink>,
}

impl<S> Assignments<S> {
    /// Creates the service with a [`TracingSink`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            events: Arc::new(TracingSink),
        }
    }

    /// Sets the event sink.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}

impl<S: Store> Assignments<S> {
    /// Assigns a role to a principal.
    pub async fn assign_role(&self, principal: PrincipalId, role: RoleId) -> Result<Assignment> {
        if self.store.principal(principal).await?.is_none() {
            return Err(Error::not_found("principal", principal));
        }
        if self.store.role(role).await?.is_none() {
            return Err(Error::not_found("role", role));
        }
        let assignment = match self.store.insert_assignment(principal, role).await {
            Ok(assignment) => assignment,
            Err(StoreError::UniqueViolation(_)) => {
                return Err(Error::AlreadyAssigned { principal, role });
            }
            Err(StoreError::MissingReference(kind)) => {
                return Err(Error::not_found(kind, format!("{principal}/{role}")));
            }
            Err(err) => return Err(err.into()),
        };
        self.events.record_event(
            EventKind::RoleAssigned,
            &[
                ("principal_id", principal.to_string()),
                ("role_id", role.to_string()),
            ],
        );
        Ok(assignment)
    }

    /// Returns the roles a principal holds, ordered by name. Unknown
    /// principals hold nothing.
    pub async fn list_roles_for_principal(&self, principal: PrincipalId) -> Result<Vec<Role>> {
        let ids = self.store.principal_roles(principal).await?;
        let mut roles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(role) = self.store.role(id).await? {
                roles.push(role);
            }
        }
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    /// Removes a role from a principal.
    pub async fn revoke_role(&self, principal: PrincipalId, role: RoleId) -> Result<()> {
        if !self.store.delete_assignment(principal, role).await? {
            return Err(Error::not_found("assignment", format!("{principal}/{role}")));
        }
        self.events.record_event(
            EventKind::RoleRevoked,
            &[
                ("principal_id", principal.to_string()),
                ("role_id", role.to_string()),
            ],
        );
        Ok(())
    }

    /// Returns every assignment.
    pub async fn list_assignments(&self) -> Result<Vec<Assignment>> {
        Ok(self.store.assignments().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingSink;
    use crate::memory_store::MemoryStore;
    use crate::model::{NewPrincipal, ProfileUpdate};
    use crate::store::{IdentityStore, RoleStore};
    use crate::types::{Email, RoleName};
    use futures::executor::block_on;

    fn setup() -> (MemoryStore, Assignments<MemoryStore>, Arc<RecordingSink>) {
        let store = MemoryStore::new();
        let sink = Arc::new(RecordingSink::default());
        let assignments = Assignments::new(store.clone()).with_events(sink.clone());
        (store, assignments, sink)
    }

    fn principal(store: &MemoryStore, email: &str) -> PrincipalId {
        block_on(store.insert_principal(NewPrincipal {
            email: Email::new(email).unwrap(),
            password_hash: None,
            is_privileged: false,
            profile: ProfileUpdate::default(),
        }))
        .unwrap()
        .id
    }

    fn role(store: &MemoryStore, name: &str) -> RoleId {
        block_on(store.insert_role(RoleName::new(name).unwrap(), String::new()))
            .unwrap()
            .id
    }

    #[test]
    fn assign_twice_is_already_assigned() {
        let (store, assignments, sink) = setup();
        let alice = principal(&store, "alice@example.com");
        let manager = role(&store, "Manager");

        block_on(assignments.assign_role(alice, manager)).unwrap();
        let again = block_on(assignments.assign_role(alice, manager));
        assert!(matches!(again, Err(Error::AlreadyAssigned { .. })));
        assert_eq!(sink.kinds(), vec![EventKind::RoleAssigned]);
    }

    #[test]
    fn assign_checks_both_sides_exist() {
        let (store, assignments, _) = setup();
        let alice = principal(&store, "alice@example.com");
        let manager = role(&store, "Manager");

        let missing_role = block_on(assignments.assign_role(alice, RoleId::new(40)));
        assert!(matches!(missing_role, Err(Error::NotFound { kind: "role", .. })));
        let missing_principal = block_on(assignments.assign_role(PrincipalId::new(40), manager));
        assert!(matches!(
            missing_principal,
            Err(Error::NotFound { kind: "principal", .. })
        ));
    }

    #[test]
    fn roles_for_principal_are_sorted_and_scoped() {
        let (store, assignments, _) = setup();
        let alice = principal(&store, "alice@example.com");
        let bob = principal(&store, "bob@example.com");
        let user = role(&store, "User");
        let manager = role(&store, "Manager");
        block_on(assignments.assign_role(alice, user)).unwrap();
        block_on(assignments.assign_role(alice, manager)).unwrap();
        block_on(assignments.assign_role(bob, user)).unwrap();

        let names: Vec<_> = block_on(assignments.list_roles_for_principal(alice))
            .unwrap()
            .into_iter()
            .map(|role| role.name.to_string())
            .collect();
        assert_eq!(names, vec!["Manager", "User"]);
        assert!(
            block_on(assignments.list_roles_for_principal(PrincipalId::new(99)))
                .unwrap()
                .is_empty()
        );
        assert_eq!(block_on(assignments.list_assignments()).unwrap().len(), 3);
    }

    #[test]
    fn revoke_missing_assignment_is_not_found() {
        let (store, assignments, _) = setup();
        let alice = principal(&store, "alice@example.com");
        let manager = role(&store, "Manager");

        let result = block_on(assignments.revoke_role(alice, manager));
        assert!(matches!(
            result,
            Err(Error::NotFound { kind: "assignment", .. })
        ));

        block_on(assignments.assign_role(alice, manager)).unwrap();
        block_on(assignments.revoke_role(alice, manager)).unwrap();
        assert!(
            block_on(assignments.list_roles_for_principal(alice))
                .unwrap()
                .is_empty()
        );
    }
}
