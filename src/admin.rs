use std::sync::Arc;

use crate::assignments::Assignments;
use crate::auth::Authenticator;
use crate::catalog::PermissionCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::{Engine, EngineBuilder};
use crate::error::{Error, Result};
use crate::events::{EventKind, EventSink, TracingSink};
use crate::identity::{Argon2Hasher, Identity, PasswordHasher};
use crate::model::{Principal, Profile, ProfileUpdate};
use crate::roles::RoleRegistry;
use crate::store::Store;
use crate::token::TokenService;

/// All services wired over one store and one [`Config`].
///
/// Catalog, role, assignment and account management is only reachable through
/// [`Gatekeeper::admin`]. Everyone else gets self-service registration and
/// profile upkeep, which never creates privileged principals.
#[derive(Clone)]
pub struct Gatekeeper<S> {
    config: Config,
    engine: Engine<S>,
    catalog: PermissionCatalog<S>,
    roles: RoleRegistry<S>,
    assignments: Assignments<S>,
    tokens: TokenService<S>,
    identity: Identity<S>,
    authenticator: Authenticator<S>,
    events: Arc<dyn EventSink>,
}

/// Builder for [`Gatekeeper`].
pub struct GatekeeperBuilder<S> {
    store: S,
    config: Config,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn PasswordHasher>,
}

impl<S> GatekeeperBuilder<S> {
    /// Creates a builder with default configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: Config::default(),
            events: Arc::new(TracingSink),
            clock: Arc::new(SystemClock),
            hasher: Arc::new(Argon2Hasher),
        }
    }

    /// Sets the configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink shared by every service.
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the clock used for token lifetimes and login stamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the password hasher.
    pub fn password_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }
}

impl<S: Clone> GatekeeperBuilder<S> {
    /// Builds the gatekeeper.
    pub fn build(self) -> Gatekeeper<S> {
        let Self {
            store,
            config,
            events,
            clock,
            hasher,
        } = self;

        let catalog = PermissionCatalog::new(store.clone())
            .with_events(events.clone())
            .max_conflict_retries(config.max_conflict_retries);
        let roles = RoleRegistry::new(store.clone())
            .with_events(events.clone())
            .with_catalog(catalog.clone());
        let assignments = Assignments::new(store.clone()).with_events(events.clone());
        let tokens = TokenService::new(store.clone())
            .with_clock(clock.clone())
            .with_events(events.clone())
            .token_bytes(config.effective_token_bytes());
        let identity = Identity::new(store.clone())
            .with_hasher(hasher)
            .with_tokens(tokens.clone())
            .with_events(events.clone());
        let authenticator = Authenticator::new(store.clone())
            .with_identity(identity.clone())
            .with_tokens(tokens.clone())
            .with_clock(clock)
            .with_events(events.clone())
            .token_ttl_hours(config.token_ttl_hours);
        let engine = EngineBuilder::new(store)
            .events(events.clone())
            .admin_role_name(config.admin_role_name.clone())
            .build();

        Gatekeeper {
            config,
            engine,
            catalog,
            roles,
            assignments,
            tokens,
            identity,
            authenticator,
            events,
        }
    }
}

impl<S> Gatekeeper<S> {
    /// Returns the configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the authorization engine.
    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    /// Returns the token service.
    pub fn tokens(&self) -> &TokenService<S> {
        &self.tokens
    }

    /// Returns the login/logout service.
    pub fn authenticator(&self) -> &Authenticator<S> {
        &self.authenticator
    }
}

impl<S: Store> Gatekeeper<S> {
    /// Registers an unprivileged principal.
    pub async fn register(&self, email: &str, password: &str) -> Result<Principal> {
        self.identity.register(email, password).await
    }

    /// Registers an unprivileged principal with profile names.
    pub async fn register_with_profile(
        &self,
        email: &str,
        password: &str,
        profile: ProfileUpdate,
    ) -> Result<Principal> {
        self.identity
            .register_with_profile(email, password, profile)
            .await
    }

    /// Returns the caller's own profile.
    pub async fn profile(&self, principal: &Principal) -> Result<Profile> {
        self.identity.profile(principal.id).await
    }

    /// Applies a partial change to the caller's own profile.
    pub async fn update_profile(
        &self,
        principal: &Principal,
        update: ProfileUpdate,
    ) -> Result<Profile> {
        self.identity.update_profile(principal.id, update).await
    }

    /// Soft-deletes the caller's own account and ends all of its sessions.
    pub async fn close_account(&self, principal: &Principal) -> Result<usize> {
        self.identity.deactivate(principal.id).await
    }

    /// Opens the administrative surface for `principal`.
    ///
    /// Fails with `PermissionDenied` unless the principal is privileged or
    /// holds the administrator role.
    pub async fn admin(&self, principal: Option<&Principal>) -> Result<AdminScope<'_, S>> {
        if !self.engine.is_admin(principal).await? {
            let principal_id = principal.map(|p| p.id.to_string()).unwrap_or_default();
            self.events.record_event(
                EventKind::AccessDenied,
                &[("principal_id", principal_id), ("scope", "admin".to_string())],
            );
            return Err(Error::PermissionDenied);
        }
        Ok(AdminScope {
            catalog: &self.catalog,
            roles: &self.roles,
            assignments: &self.assignments,
            identity: &self.identity,
        })
    }
}

/// Administrative services, handed out by [`Gatekeeper::admin`].
pub struct AdminScope<'a, S> {
    catalog: &'a PermissionCatalog<S>,
    roles: &'a RoleRegistry<S>,
    assignments: &'a Assignments<S>,
    identity: &'a Identity<S>,
}

impl<'a, S> AdminScope<'a, S> {
    /// Resources, actions and permissions.
    pub fn catalog(&self) -> &'a PermissionCatalog<S> {
        self.catalog
    }

    /// Roles and their grants.
    pub fn roles(&self) -> &'a RoleRegistry<S> {
        self.roles
    }

    /// Principal to role assignments.
    pub fn assignments(&self) -> &'a Assignments<S> {
        self.assignments
    }

    /// Every principal account, including privileged creation, deactivation
    /// and deletion.
    pub fn identity(&self) -> &'a Identity<S> {
        self.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::testing::PlainHasher;
    use crate::memory_store::MemoryStore;
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use futures::executor::block_on;

    fn gatekeeper(config: Config) -> (Gatekeeper<MemoryStore>, Principal) {
        let store = MemoryStore::new();
        let root = block_on(
            Identity::new(store.clone())
                .with_hasher(Arc::new(PlainHasher))
                .create_privileged("root@example.com", "root-password"),
        )
        .unwrap();
        let gate = GatekeeperBuilder::new(store)
            .password_hasher(Arc::new(PlainHasher))
            .config(config)
            .build();
        (gate, root)
    }

    #[test]
    fn admin_scope_requires_authority() {
        let (gate, root) = gatekeeper(Config::default());
        let alice = block_on(gate.register("alice@example.com", "opensesame")).unwrap();

        assert!(matches!(
            block_on(gate.admin(None)),
            Err(Error::PermissionDenied)
        ));
        assert!(matches!(
            block_on(gate.admin(Some(&alice))),
            Err(Error::PermissionDenied)
        ));

        let scope = block_on(gate.admin(Some(&root))).unwrap();
        let admin_role = block_on(scope.roles().create_role("Admin", "")).unwrap();
        block_on(scope.assignments().assign_role(alice.id, admin_role.id)).unwrap();

        assert!(block_on(gate.admin(Some(&alice))).is_ok());
    }

    #[test]
    fn privileged_accounts_need_the_admin_scope() {
        let (gate, root) = gatekeeper(Config::default());
        let mallory = block_on(gate.register("mallory@example.com", "opensesame")).unwrap();
        assert!(!mallory.is_privileged);
        assert!(block_on(gate.admin(Some(&mallory))).is_err());

        let scope = block_on(gate.admin(Some(&root))).unwrap();
        let ops = block_on(scope.identity().create_privileged("ops@example.com", "opensesame"))
            .unwrap();
        assert!(ops.is_privileged);
        block_on(scope.identity().delete(mallory.id)).unwrap();
        assert!(matches!(
            block_on(gate.profile(&mallory)),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn self_service_profile_and_account_closure() {
        let (gate, _) = gatekeeper(Config::default());
        let judy = block_on(gate.register_with_profile(
            "judy@example.com",
            "opensesame",
            ProfileUpdate::default().first_name("Judy"),
        ))
        .unwrap();

        let profile =
            block_on(gate.update_profile(&judy, ProfileUpdate::default().last_name("Hopps")))
                .unwrap();
        assert_eq!(profile.first_name, "Judy");
        assert_eq!(profile.last_name, "Hopps");
        assert_eq!(block_on(gate.profile(&judy)).unwrap(), profile);

        block_on(gate.authenticator().login("judy@example.com", "opensesame")).unwrap();
        assert_eq!(block_on(gate.close_account(&judy)).unwrap(), 1);
        assert!(matches!(
            block_on(gate.authenticator().login("judy@example.com", "opensesame")),
            Err(Error::PrincipalDisabled)
        ));
    }

    #[test]
    fn admin_role_name_comes_from_config() {
        let (gate, root) = gatekeeper(Config::default().admin_role_name("Operators"));
        let bob = block_on(gate.register("bob@example.com", "opensesame")).unwrap();
        let scope = block_on(gate.admin(Some(&root))).unwrap();
        let admin = block_on(scope.roles().create_role("Admin", "")).unwrap();
        block_on(scope.assignments().assign_role(bob.id, admin.id)).unwrap();

        assert!(block_on(gate.admin(Some(&bob))).is_err());
        assert_eq!(gate.engine().admin_role_name(), "Operators");
    }

    #[test]
    fn login_uses_configured_ttl() {
        let (gate, _) = gatekeeper(Config::default().token_ttl_hours(2));
        block_on(gate.register("carol@example.com", "opensesame")).unwrap();

        let (token, _) =
            block_on(gate.authenticator().login("carol@example.com", "opensesame")).unwrap();
        assert_eq!(
            token.expires_at - token.created_at,
            chrono::TimeDelta::hours(2)
        );
    }

    #[test]
    fn oversized_token_bytes_never_reach_login() {
        let (gate, _) = gatekeeper(Config::default().token_bytes(usize::MAX));
        block_on(gate.register("dan@example.com", "opensesame")).unwrap();
        let (token, _) =
            block_on(gate.authenticator().login("dan@example.com", "opensesame")).unwrap();
        let decoded = URL_SAFE_NO_PAD.decode(token.value.as_str()).unwrap();
        assert_eq!(decoded.len(), crate::MAX_TOKEN_BYTES);
    }
}
