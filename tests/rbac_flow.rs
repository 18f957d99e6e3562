#![cfg(feature = "memory-store")]

use chrono::TimeDelta;
use futures::executor::block_on;
use rs_rbac::{
    Config, Decision, Error, Gatekeeper, GatekeeperBuilder, Identity, ManualClock, MemoryStore,
    PasswordHasher, Principal, ProfileUpdate, Result, TokenStore, crud_action,
};
use std::sync::Arc;

struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> Result<String> {
        Ok(format!("plain${password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        hash.strip_prefix("plain$") == Some(password)
    }
}

struct Shop {
    store: MemoryStore,
    clock: ManualClock,
    gate: Gatekeeper<MemoryStore>,
    root: Principal,
}

fn shop() -> Shop {
    let store = MemoryStore::new();
    let clock = ManualClock::default();
    let root = block_on(
        Identity::new(store.clone())
            .with_hasher(Arc::new(PlainHasher))
            .create_privileged("root@shop.test", "root-password"),
    )
    .unwrap();
    let gate = GatekeeperBuilder::new(store.clone())
        .password_hasher(Arc::new(PlainHasher))
        .clock(Arc::new(clock.clone()))
        .config(Config::default().token_ttl_hours(8))
        .build();
    Shop {
        store,
        clock,
        gate,
        root,
    }
}

fn member(shop: &Shop, email: &str, role: &str, grants: &[(&str, &str)]) -> Principal {
    let admin = block_on(shop.gate.admin(Some(&shop.root))).unwrap();
    let principal = block_on(shop.gate.register(email, "opensesame")).unwrap();
    let role = match block_on(admin.roles().role_by_name(role)).unwrap() {
        Some(role) => role,
        None => block_on(admin.roles().create_role(role, "")).unwrap(),
    };
    for (resource, action) in grants {
        block_on(
            admin
                .roles()
                .grant_permission_by_names(role.id, resource, action),
        )
        .unwrap();
    }
    block_on(admin.assignments().assign_role(principal.id, role.id)).unwrap();
    principal
}

fn allowed(shop: &Shop, principal: &Principal, resource: &str, action: &str) -> bool {
    block_on(
        shop.gate
            .engine()
            .is_authorized(Some(principal), resource, action),
    )
    .unwrap()
}

#[test]
fn manager_can_browse_orders_but_not_create_them() {
    let shop = shop();
    let manager = member(&shop, "manager@shop.test", "Manager", &[
        ("orders", "list"),
        ("orders", "read"),
        ("orders", "update"),
        ("products", "list"),
    ]);

    assert!(allowed(&shop, &manager, "orders", crud_action("list")));
    assert!(allowed(&shop, &manager, "orders", crud_action("retrieve")));
    assert!(allowed(&shop, &manager, "orders", crud_action("partial_update")));
    assert!(!allowed(&shop, &manager, "orders", crud_action("create")));
    assert!(!allowed(&shop, &manager, "orders", crud_action("destroy")));
}

#[test]
fn privileged_principal_is_allowed_everything() {
    let shop = shop();
    assert!(allowed(&shop, &shop.root, "orders", "create"));
    assert!(allowed(&shop, &shop.root, "never_registered", "anything"));
}

#[test]
fn principal_without_assignments_is_denied() {
    let shop = shop();
    let loner = block_on(shop.gate.register("loner@shop.test", "opensesame")).unwrap();
    let admin = block_on(shop.gate.admin(Some(&shop.root))).unwrap();
    block_on(admin.catalog().get_or_create_permission("products", "read")).unwrap();

    assert!(!allowed(&shop, &loner, "products", "read"));
    assert_eq!(
        block_on(shop.gate.engine().authorize(None, "products", "read")).unwrap(),
        Decision::Deny
    );
}

#[test]
fn assign_then_revoke_flips_the_decision() {
    let shop = shop();
    let admin = block_on(shop.gate.admin(Some(&shop.root))).unwrap();
    let reader = block_on(admin.roles().create_role("Reader", "")).unwrap();
    block_on(
        admin
            .roles()
            .grant_permission_by_names(reader.id, "products", "read"),
    )
    .unwrap();
    let bob = block_on(shop.gate.register("bob@shop.test", "opensesame")).unwrap();

    assert!(!allowed(&shop, &bob, "products", "read"));
    block_on(admin.assignments().assign_role(bob.id, reader.id)).unwrap();
    assert!(allowed(&shop, &bob, "products", "read"));
    block_on(admin.assignments().revoke_role(bob.id, reader.id)).unwrap();
    assert!(!allowed(&shop, &bob, "products", "read"));
}

#[test]
fn get_or_create_is_idempotent_and_grants_conflict() {
    let shop = shop();
    let admin = block_on(shop.gate.admin(Some(&shop.root))).unwrap();
    let (first, created) =
        block_on(admin.catalog().get_or_create_permission("orders", "read")).unwrap();
    let (second, created_again) =
        block_on(admin.catalog().get_or_create_permission("orders", "read")).unwrap();
    assert!(created);
    assert!(!created_again);
    assert_eq!(first.id, second.id);

    let role = block_on(admin.roles().create_role("Clerk", "")).unwrap();
    block_on(admin.roles().grant_permission(role.id, first.id)).unwrap();
    assert!(matches!(
        block_on(admin.roles().grant_permission(role.id, first.id)),
        Err(Error::AlreadyGranted { .. })
    ));
}

#[test]
fn replacing_permissions_changes_decisions_at_once() {
    let shop = shop();
    let clerk = member(&shop, "clerk@shop.test", "Clerk", &[("orders", "read")]);
    let admin = block_on(shop.gate.admin(Some(&shop.root))).unwrap();
    let role = block_on(admin.roles().role_by_name("Clerk"))
        .unwrap()
        .unwrap();
    let (list, _) = block_on(admin.catalog().get_or_create_permission("orders", "list")).unwrap();

    block_on(admin.roles().replace_permissions(role.id, &[list.id])).unwrap();
    assert!(allowed(&shop, &clerk, "orders", "list"));
    assert!(!allowed(&shop, &clerk, "orders", "read"));
}

#[test]
fn login_token_round_trip() {
    let shop = shop();
    let alice = member(&shop, "alice@shop.test", "User", &[("orders", "create")]);
    let auth = shop.gate.authenticator();

    let (token, _) = block_on(auth.login("alice@shop.test", "opensesame")).unwrap();
    assert_eq!(token.expires_at - token.created_at, TimeDelta::hours(8));
    let header = format!("Token {}", token.value.as_str());
    let (principal, _) = block_on(auth.authenticate(Some(&header)))
        .unwrap()
        .unwrap();
    assert_eq!(principal.id, alice.id);
    assert!(allowed(&shop, &principal, "orders", "create"));

    block_on(auth.logout(Some(&header), &principal)).unwrap();
    block_on(auth.logout(Some(&header), &principal)).unwrap();
    assert!(matches!(
        block_on(auth.authenticate(Some(&header))),
        Err(Error::InvalidToken)
    ));
}

#[test]
fn expired_token_is_rejected_then_invalid() {
    let shop = shop();
    let carol = block_on(shop.gate.register("carol@shop.test", "opensesame")).unwrap();
    let token = block_on(shop.gate.tokens().issue(&carol, 0)).unwrap();
    shop.clock.advance(TimeDelta::seconds(1));

    let first = block_on(shop.gate.tokens().resolve(token.value.as_str()));
    assert!(matches!(first, Err(Error::TokenExpired)));
    assert!(
        block_on(shop.store.active_token(&token.value))
            .unwrap()
            .is_none()
    );
    let second = block_on(shop.gate.tokens().resolve(token.value.as_str()));
    assert!(matches!(second, Err(Error::InvalidToken)));
}

#[test]
fn invalidate_never_fails() {
    let shop = shop();
    let dave = block_on(shop.gate.register("dave@shop.test", "opensesame")).unwrap();
    let tokens = shop.gate.tokens();

    block_on(tokens.invalidate("no-such-token", dave.id)).unwrap();
    let token = block_on(tokens.issue(&dave, 1)).unwrap();
    block_on(tokens.invalidate(token.value.as_str(), dave.id)).unwrap();
    block_on(tokens.invalidate(token.value.as_str(), dave.id)).unwrap();
}

#[test]
fn deactivated_account_loses_every_session() {
    let shop = shop();
    let erin = block_on(shop.gate.register("erin@shop.test", "opensesame")).unwrap();
    let auth = shop.gate.authenticator();
    let (first, _) = block_on(auth.login("erin@shop.test", "opensesame")).unwrap();
    let (second, _) = block_on(auth.login("erin@shop.test", "opensesame")).unwrap();

    let admin = block_on(shop.gate.admin(Some(&shop.root))).unwrap();
    assert_eq!(block_on(admin.identity().deactivate(erin.id)).unwrap(), 2);
    for token in [first, second] {
        let header = format!("Token {}", token.value.as_str());
        let err = block_on(auth.authenticate(Some(&header))).unwrap_err();
        assert!(err.is_authentication_failure());
    }
    assert!(matches!(
        block_on(auth.login("erin@shop.test", "opensesame")),
        Err(Error::PrincipalDisabled)
    ));
}

#[test]
fn admin_surface_is_gated() {
    let shop = shop();
    let staff = member(&shop, "staff@shop.test", "Staff", &[]);
    assert!(matches!(
        block_on(shop.gate.admin(Some(&staff))),
        Err(Error::PermissionDenied)
    ));

    let boss = member(&shop, "boss@shop.test", "Admin", &[]);
    let admin = block_on(shop.gate.admin(Some(&boss))).unwrap();
    assert!(block_on(admin.roles().list_roles()).unwrap().len() >= 2);
}

#[test]
fn self_registration_cannot_escalate() {
    let shop = shop();
    let mallory = block_on(shop.gate.register("mallory@shop.test", "opensesame")).unwrap();
    assert!(!mallory.is_privileged);
    assert!(!allowed(&shop, &mallory, "orders", "create"));
    assert!(matches!(
        block_on(shop.gate.admin(Some(&mallory))),
        Err(Error::PermissionDenied)
    ));

    let admin = block_on(shop.gate.admin(Some(&shop.root))).unwrap();
    let ops = block_on(
        admin
            .identity()
            .create_privileged("ops@shop.test", "opensesame"),
    )
    .unwrap();
    assert!(allowed(&shop, &ops, "orders", "create"));
}

#[test]
fn profile_follows_the_account() {
    let shop = shop();
    let names = ProfileUpdate::default()
        .first_name("Ivan")
        .middle_name("Petrovich")
        .last_name("Sidorov");
    let ivan =
        block_on(shop.gate.register_with_profile("ivan@shop.test", "opensesame", names)).unwrap();
    let (_, principal) =
        block_on(shop.gate.authenticator().login("ivan@shop.test", "opensesame")).unwrap();

    let profile = block_on(shop.gate.update_profile(
        &principal,
        ProfileUpdate::default().middle_name(""),
    ))
    .unwrap();
    assert_eq!(profile.principal_id, ivan.id);
    assert_eq!(profile.first_name, "Ivan");
    assert_eq!(profile.middle_name, "");
    assert_eq!(profile.last_name, "Sidorov");

    assert_eq!(block_on(shop.gate.close_account(&principal)).unwrap(), 1);
    assert!(matches!(
        block_on(shop.gate.authenticator().login("ivan@shop.test", "opensesame")),
        Err(Error::PrincipalDisabled)
    ));
}
