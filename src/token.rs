use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::TimeDelta;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::clock::{Clock, SystemClock};
use crate::config::{MAX_TOKEN_BYTES, MIN_TOKEN_BYTES};
use crate::error::{Constraint, Error, Result, StoreError};
use crate::events::{EventKind, EventSink, TracingSink};
use crate::model::{Principal, Token, TokenValue};
use crate::store::Store;
use crate::types::PrincipalId;

/// Scheme expected in the `Authorization` header.
pub const TOKEN_SCHEME: &str = "Token";

/// Issues, resolves and invalidates opaque bearer tokens.
///
/// Token states only move forward: active tokens become inactive at logout,
/// on expiry detection or through [`invalidate_all`](Self::invalidate_all),
/// and are never reactivated.
#[derive(Clone)]
pub struct TokenService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    token_bytes: usize,
}

impl<S> TokenService<S> {
    /// Creates a service on the system clock.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            events: Arc::new(TracingSink),
            token_bytes: MIN_TOKEN_BYTES,
        }
    }

    /// Sets the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the event sink.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the entropy per token, clamped to
    /// [`MIN_TOKEN_BYTES`]..=[`MAX_TOKEN_BYTES`].
    pub fn token_bytes(mut self, bytes: usize) -> Self {
        self.token_bytes = bytes.clamp(MIN_TOKEN_BYTES, MAX_TOKEN_BYTES);
        self
    }

    fn generate_value(&self) -> TokenValue {
        let mut bytes = vec![0u8; self.token_bytes];
        OsRng.fill_bytes(&mut bytes);
        TokenValue::new(URL_SAFE_NO_PAD.encode(bytes))
    }
}

impl<S: Store> TokenService<S> {
    /// Issues a new active token for `principal` valid for `ttl_hours`.
    ///
    /// Other tokens of the principal stay active.
    pub async fn issue(&self, principal: &Principal, ttl_hours: i64) -> Result<Token> {
        let now = self.clock.now();
        let expires_at = TimeDelta::try_hours(ttl_hours)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                Error::Validation(format!("token ttl of {ttl_hours}h is out of range"))
            })?;
        let token = Token {
            value: self.generate_value(),
            principal_id: principal.id,
            created_at: now,
            expires_at,
            is_active: true,
        };

        match self.store.insert_token(token.clone()).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(Constraint::TokenValue)) => {
                tracing::error!(
                    principal_id = %principal.id,
                    "generated token value collided with an existing token"
                );
                return Err(Error::TokenCollision);
            }
            Err(StoreError::MissingReference(kind)) => {
                return Err(Error::not_found(kind, principal.id));
            }
            Err(err) => return Err(err.into()),
        }

        self.events.record_event(
            EventKind::TokenIssued,
            &[
                ("principal_id", principal.id.to_string()),
                ("token", token.value.prefix().to_string()),
                ("expires_at", token.expires_at.to_rfc3339()),
            ],
        );
        Ok(token)
    }

    /// Resolves a presented token value to its principal.
    ///
    /// An expired token is deactivated before `TokenExpired` is returned, so
    /// presenting it again yields `InvalidToken`. A disabled owner leaves the
    /// token untouched.
    pub async fn resolve(&self, value: &str) -> Result<(Principal, Token)> {
        let value = TokenValue::new(value);
        let Some(token) = self.store.active_token(&value).await? else {
            return Err(Error::InvalidToken);
        };

        if token.is_expired(self.clock.now()) {
            self.store.deactivate_token(&value).await?;
            self.events.record_event(
                EventKind::TokenExpired,
                &[
                    ("principal_id", token.principal_id.to_string()),
                    ("token", value.prefix().to_string()),
                ],
            );
            return Err(Error::TokenExpired);
        }

        let Some(principal) = self.store.principal(token.principal_id).await? else {
            tracing::warn!(
                principal_id = %token.principal_id,
                "active token references a missing principal"
            );
            return Err(Error::InvalidToken);
        };
        if !principal.is_active {
            return Err(Error::PrincipalDisabled);
        }
        Ok((principal, token))
    }

    /// Deactivates `value` if it is an active token owned by `owner`.
    ///
    /// Never fails because the token is unknown, already inactive or owned by
    /// someone else.
    pub async fn invalidate(&self, value: &str, owner: PrincipalId) -> Result<()> {
        let value = TokenValue::new(value);
        if self.store.deactivate_owned_token(&value, owner).await? {
            self.events.record_event(
                EventKind::TokenInvalidated,
                &[
                    ("principal_id", owner.to_string()),
                    ("token", value.prefix().to_string()),
                ],
            );
        }
        Ok(())
    }

    /// Deactivates every active token of a principal and returns how many
    /// changed.
    pub async fn invalidate_all(&self, principal: PrincipalId) -> Result<usize> {
        let count = self.store.deactivate_principal_tokens(principal).await?;
        if count > 0 {
            self.events.record_event(
                EventKind::TokenInvalidated,
                &[
                    ("principal_id", principal.to_string()),
                    ("count", count.to_string()),
                ],
            );
        }
        Ok(count)
    }
}

/// Extracts the token from an `Authorization` header value of the form
/// `Token <value>`.
///
/// The scheme is matched case-insensitively. Returns `None` for any other
/// shape, which callers treat as anonymous. An empty value after the scheme
/// is returned as `Some("")` and fails resolution.
pub fn token_from_header(header: &str) -> Option<&str> {
    let (scheme, value) = header.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(TOKEN_SCHEME) {
        return None;
    }
    Some(value.trim())
}
