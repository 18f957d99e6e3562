use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::events::{EventKind, EventSink, TracingSink};
use crate::identity::Identity;
use crate::model::{Principal, Token};
use crate::store::Store;
use crate::token::{TokenService, token_from_header};

/// Login, logout and per-request authentication.
#[derive(Clone)]
pub struct Authenticator<S> {
    store: S,
    identity: Identity<S>,
    tokens: TokenService<S>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    token_ttl_hours: i64,
}

impl<S: Clone> Authenticator<S> {
    /// Creates an authenticator issuing 24 hour tokens.
    pub fn new(store: S) -> Self {
        Self {
            identity: Identity::new(store.clone()),
            tokens: TokenService::new(store.clone()),
            store,
            clock: Arc::new(SystemClock),
            events: Arc::new(TracingSink),
            token_ttl_hours: 24,
        }
    }
}

impl<S> Authenticator<S> {
    /// Sets the identity service that checks credentials.
    pub fn with_identity(mut self, identity: Identity<S>) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the token service.
    pub fn with_tokens(mut self, tokens: TokenService<S>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Sets the clock used to stamp `last_login`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the event sink.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the lifetime of tokens issued at login.
    pub fn token_ttl_hours(mut self, hours: i64) -> Self {
        self.token_ttl_hours = hours;
        self
    }
}

impl<S: Store> Authenticator<S> {
    /// Exchanges an email and password for a fresh token.
    pub async fn login(&self, email: &str, password: &str) -> Result<(Token, Principal)> {
        let mut principal = match self.identity.verify_credentials(email, password).await {
            Ok(principal) => principal,
            Err(err) => {
                if err.is_authentication_failure() {
                    self.events
                        .record_event(EventKind::LoginFailed, &[("reason", err.to_string())]);
                }
                return Err(err);
            }
        };

        let token = self.tokens.issue(&principal, self.token_ttl_hours).await?;
        let now = self.clock.now();
        self.store.touch_last_login(principal.id, now).await?;
        principal.last_login = Some(now);

        self.events.record_event(
            EventKind::LoginSucceeded,
            &[("principal_id", principal.id.to_string())],
        );
        Ok((token, principal))
    }

    /// Resolves an `Authorization` header.
    ///
    /// `Ok(None)` means anonymous: no header, or one that is not shaped
    /// `Token <value>`. A well-formed header that fails resolution is an
    /// error.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Option<(Principal, Token)>> {
        let Some(value) = header.and_then(token_from_header) else {
            return Ok(None);
        };
        if value.is_empty() {
            return Err(Error::InvalidToken);
        }
        self.tokens.resolve(value).await.map(Some)
    }

    /// Invalidates the token in `header` when `principal` owns it. Missing,
    /// malformed or already invalid tokens are ignored.
    pub async fn logout(&self, header: Option<&str>, principal: &Principal) -> Result<()> {
        let Some(value) = header.and_then(token_from_header) else {
            return Ok(());
        };
        self.tokens.invalidate(value, principal.id).await
    }
}
