//! Role-based access control with opaque bearer tokens.
//!
//! The crate answers one question: may this principal perform this action on
//! this resource? Permissions are `(resource, action)` pairs, roles bundle
//! permissions, and principals hold roles. The default is deny: anonymous,
//! inactive and unassigned principals are denied, and privileged principals
//! are allowed everything.
//!
//! Identity is established by opaque tokens sent as `Authorization: Token
//! <value>`. Tokens expire, are deactivated on logout, and are never revived.
//!
//! Storage is pluggable through the async [`Store`] traits; [`MemoryStore`]
//! (feature `memory-store`, on by default) keeps everything in process.
//!
//! # Examples
//!
//! ```no_run
//! # #[cfg(feature = "memory-store")]
//! # futures::executor::block_on(async {
//! use rs_rbac::{GatekeeperBuilder, Identity, MemoryStore};
//!
//! let store = MemoryStore::new();
//! // Privileged accounts are provisioned directly against the store.
//! let root = Identity::new(store.clone())
//!     .create_privileged("root@example.com", "correct horse")
//!     .await?;
//!
//! let gate = GatekeeperBuilder::new(store).build();
//! let alice = gate.register("alice@example.com", "battery staple").await?;
//!
//! let admin = gate.admin(Some(&root)).await?;
//! let manager = admin.roles().create_role("Manager", "Runs orders").await?;
//! admin.roles().grant_permission_by_names(manager.id, "orders", "list").await?;
//! admin.assignments().assign_role(alice.id, manager.id).await?;
//!
//! let (token, _) = gate.authenticator().login("alice@example.com", "battery staple").await?;
//! let header = format!("Token {}", token.value.as_str());
//! let (principal, _) = gate.authenticator().authenticate(Some(&header)).await?.unwrap();
//! assert!(gate.engine().is_authorized(Some(&principal), "orders", "list").await?);
//! # Ok::<(), rs_rbac::Error>(())
//! # });
//! ```
#![forbid(unsafe_code)]

mod admin;
mod assignments;
mod auth;
mod catalog;
mod clock;
mod config;
mod engine;
mod error;
mod events;
mod identity;
mod model;
mod permission;
mod roles;
mod store;
mod token;
mod types;

#[cfg(any(test, feature = "memory-store"))]
mod memory_store;

#[cfg(feature = "axum")]
pub mod axum;

pub use crate::admin::{AdminScope, Gatekeeper, GatekeeperBuilder};
pub use crate::assignments::Assignments;
pub use crate::auth::Authenticator;
pub use crate::catalog::PermissionCatalog;
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{Config, MAX_TOKEN_BYTES, MIN_TOKEN_BYTES};
pub use crate::engine::{Decision, Engine, EngineBuilder};
pub use crate::error::{Constraint, Error, Result, StoreError};
pub use crate::events::{EventKind, EventSink, NoopSink, TracingSink};
pub use crate::identity::{Argon2Hasher, Identity, MIN_PASSWORD_LENGTH, PasswordHasher};
pub use crate::model::{
    Action, Assignment, NewPrincipal, Permission, Principal, Profile, ProfileUpdate, Resource,
    Role, RoleGrant, Timestamp, Token, TokenValue,
};
pub use crate::permission::{PermissionKey, crud_action};
pub use crate::roles::RoleRegistry;
pub use crate::store::{
    AssignmentStore, CatalogStore, IdentityStore, RoleStore, Store, StoreResult, TokenStore,
};
pub use crate::token::{TOKEN_SCHEME, TokenService, token_from_header};
pub use crate::types::{
    ActionId, ActionName, Email, PermissionId, PrincipalId, ResourceId, ResourceName, RoleId,
    RoleName,
};

#[cfg(feature = "memory-store")]
pub use crate::memory_store::MemoryStore;
