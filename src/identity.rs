use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{Error, Result, StoreError};
use crate::events::{EventKind, EventSink, TracingSink};
use crate::model::{NewPrincipal, Principal, Profile, ProfileUpdate};
use crate::store::Store;
use crate::token::TokenService;
use crate::types::{Email, PrincipalId};

/// Shortest password accepted at registration or password change.
pub const MIN_PASSWORD_LENGTH: usize = 8;

const MAX_NAME_LENGTH: usize = 150;

/// One-way password hashing.
pub trait PasswordHasher: Send + Sync {
    /// Hashes a plaintext password into a self-describing string.
    fn hash(&self, password: &str) -> Result<String>;

    /// Checks a plaintext password against a stored hash. Malformed hashes
    /// never verify.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2id with a random 16-byte salt, stored in PHC string format.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(|err| Error::Hashing(err.to_string()))?;
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| Error::Hashing(err.to_string()))?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Principal accounts and their credentials.
#[derive(Clone)]
pub struct Identity<S> {
    store: S,
    tokens: TokenService<S>,
    hasher: Arc<dyn PasswordHasher>,
    events: Arc<dyn EventSink>,
}

impl<S: Clone> Identity<S> {
    /// Creates the service with [`Argon2Hasher`] and a [`TracingSink`].
    pub fn new(store: S) -> Self {
        Self {
            tokens: TokenService::new(store.clone()),
            store,
            hasher: Arc::new(Argon2Hasher),
            events: Arc::new(TracingSink),
        }
    }
}

impl<S> Identity<S> {
    /// Sets the password hasher.
    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Sets the token service used when accounts are deactivated.
    pub fn with_tokens(mut self, tokens: TokenService<S>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Sets the event sink.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}

impl<S: Store> Identity<S> {
    /// Registers an active, unprivileged principal with an empty profile.
    pub async fn register(&self, email: &str, password: &str) -> Result<Principal> {
        self.create(email, password, false, ProfileUpdate::default()).await
    }

    /// Registers an active, unprivileged principal and fills in its profile.
    pub async fn register_with_profile(
        &self,
        email: &str,
        password: &str,
        profile: ProfileUpdate,
    ) -> Result<Principal> {
        self.create(email, password, false, profile).await
    }

    /// Creates a privileged principal, exempt from every role check.
    ///
    /// Meant for provisioning and for [`AdminScope`](crate::AdminScope);
    /// the self-service surface of [`Gatekeeper`](crate::Gatekeeper) never
    /// reaches it.
    pub async fn create_privileged(&self, email: &str, password: &str) -> Result<Principal> {
        self.create(email, password, true, ProfileUpdate::default()).await
    }

    async fn create(
        &self,
        email: &str,
        password: &str,
        is_privileged: bool,
        mut profile: ProfileUpdate,
    ) -> Result<Principal> {
        let email = Email::new(email)?;
        validate_password(password)?;
        normalize_profile(&mut profile)?;
        let password_hash = self.hasher.hash(password)?;
        let principal = self
            .store
            .insert_principal(NewPrincipal {
                email: email.clone(),
                password_hash: Some(password_hash),
                is_privileged,
                profile,
            })
            .await
            .map_err(|err| match err {
                StoreError::UniqueViolation(_) => Error::duplicate("principal", email.as_str()),
                other => other.into(),
            })?;
        self.events.record_event(
            EventKind::PrincipalRegistered,
            &[
                ("principal_id", principal.id.to_string()),
                ("privileged", is_privileged.to_string()),
            ],
        );
        Ok(principal)
    }

    /// Returns a principal by id.
    pub async fn principal(&self, id: PrincipalId) -> Result<Principal> {
        self.store
            .principal(id)
            .await?
            .ok_or_else(|| Error::not_found("principal", id))
    }

    /// Returns a principal by email, normalized the same way as at
    /// registration.
    pub async fn principal_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let email = Email::new(email)?;
        Ok(self.store.principal_by_email(&email).await?)
    }

    /// Returns the profile of a principal.
    pub async fn profile(&self, id: PrincipalId) -> Result<Profile> {
        self.store
            .profile(id)
            .await?
            .ok_or_else(|| Error::not_found("principal", id))
    }

    /// Changes the profile fields present in `update`; absent fields keep
    /// their value. Names are trimmed and limited to 150 characters.
    pub async fn update_profile(
        &self,
        id: PrincipalId,
        mut update: ProfileUpdate,
    ) -> Result<Profile> {
        normalize_profile(&mut update)?;
        let profile = self
            .store
            .update_profile(id, update)
            .await?
            .ok_or_else(|| Error::not_found("principal", id))?;
        tracing::debug!(principal_id = %id, "profile updated");
        Ok(profile)
    }

    /// Replaces a principal's password.
    pub async fn set_password(&self, id: PrincipalId, password: &str) -> Result<()> {
        validate_password(password)?;
        let hash = self.hasher.hash(password)?;
        if !self.store.set_password_hash(id, hash).await? {
            return Err(Error::not_found("principal", id));
        }
        Ok(())
    }

    /// Checks an email and password pair.
    ///
    /// Unknown email and wrong password both fail with `InvalidCredentials`;
    /// an inactive account fails with `PrincipalDisabled`.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<Principal> {
        let Ok(email) = Email::new(email) else {
            return Err(Error::InvalidCredentials);
        };
        let Some(principal) = self.store.principal_by_email(&email).await? else {
            return Err(Error::InvalidCredentials);
        };
        if !principal.is_active {
            return Err(Error::PrincipalDisabled);
        }
        let hash = self.store.password_hash(principal.id).await?;
        match hash {
            Some(hash) if self.hasher.verify(password, &hash) => Ok(principal),
            _ => Err(Error::InvalidCredentials),
        }
    }

    /// Soft-deletes a principal: marks it inactive and invalidates every
    /// active token. Returns the number of tokens invalidated.
    pub async fn deactivate(&self, id: PrincipalId) -> Result<usize> {
        if !self.store.set_principal_active(id, false).await? {
            return Err(Error::not_found("principal", id));
        }
        let invalidated = self.tokens.invalidate_all(id).await?;
        self.events.record_event(
            EventKind::PrincipalDeactivated,
            &[
                ("principal_id", id.to_string()),
                ("tokens", invalidated.to_string()),
            ],
        );
        Ok(invalidated)
    }

    /// Removes a principal along with its assignments and tokens.
    pub async fn delete(&self, id: PrincipalId) -> Result<()> {
        if !self.store.delete_principal(id).await? {
            return Err(Error::not_found("principal", id));
        }
        Ok(())
    }
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Validation("password must not be entirely numeric".to_string()));
    }
    Ok(())
}

fn normalize_profile(update: &mut ProfileUpdate) -> Result<()> {
    for (field, value) in update.fields_mut() {
        let Some(name) = value else {
            continue;
        };
        let trimmed = name.trim();
        if trimmed.chars().count() > MAX_NAME_LENGTH {
            return Err(Error::Validation(format!(
                "{field} must be at most {MAX_NAME_LENGTH} characters"
            )));
        }
        if trimmed.len() != name.len() {
            *name = trimmed.to_string();
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::PasswordHasher;
    use crate::error::Result;

    /// Reversible hasher that keeps unit tests fast.
    #[derive(Debug, Default)]
    pub(crate) struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, password: &str) -> Result<String> {
            Ok(format!("plain${password}"))
        }

        fn verify(&self, password: &str, hash: &str) -> bool {
            hash.strip_prefix("plain$") == Some(password)
        }
    }
}
