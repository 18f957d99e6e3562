//! Axum integration utilities.
//!
//! [`TokenAuthLayer`] turns a `Token <value>` header into an [`AuthContext`]
//! request extension; [`AuthorizeLayer`] gates a route on a permission or on
//! administrator authority.

use std::convert::Infallible;
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::auth::Authenticator;
use crate::engine::{Decision, Engine};
use crate::model::{Principal, Token};
use crate::permission::crud_action;
use crate::store::Store;

use ::axum::body::Body;
use ::axum::extract::{FromRequestParts, OptionalFromRequestParts};
use ::axum::response::{IntoResponse, Response};
use ::http::header::AUTHORIZATION;
use ::http::request::Parts;
use ::http::{Request, StatusCode};
use ::tower::{Layer, Service};

type BoxFuture<T> = Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Authenticated caller attached to a request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Resolved principal.
    pub principal: Principal,
    /// Token the request presented.
    pub token: Token,
}

impl<St> FromRequestParts<St> for AuthContext
where
    St: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or((StatusCode::UNAUTHORIZED, "authentication required"))
    }
}

impl<St> OptionalFromRequestParts<St> for AuthContext
where
    St: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &St,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthContext>().cloned())
    }
}

/// Middleware layer that authenticates the `Authorization` header.
///
/// Requests without a usable header continue anonymously. A well-formed
/// header that does not resolve gets one generic 401, whatever the reason.
#[derive(Clone)]
pub struct TokenAuthLayer<S> {
    authenticator: Arc<Authenticator<S>>,
}

impl<S> TokenAuthLayer<S> {
    /// Creates a new authentication layer.
    pub fn new(authenticator: Arc<Authenticator<S>>) -> Self {
        Self { authenticator }
    }
}

impl<S, Inner> Layer<Inner> for TokenAuthLayer<S> {
    type Service = TokenAuthService<Inner, S>;

    fn layer(&self, inner: Inner) -> Self::Service {
        TokenAuthService {
            inner,
            authenticator: self.authenticator.clone(),
        }
    }
}

/// Middleware service that attaches [`AuthContext`].
#[derive(Clone)]
pub struct TokenAuthService<Inner, S> {
    inner: Inner,
    authenticator: Arc<Authenticator<S>>,
}

impl<Inner, S> Service<Request<Body>> for TokenAuthService<Inner, S>
where
    Inner: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    Inner::Future: Send + 'static,
    S: Store + 'static,
{
    type Response = Response;
    type Error = Inner::Error;
    type Future = BoxFuture<Result<Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let authenticator = self.authenticator.clone();

        Box::pin(async move {
            let header = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            match authenticator.authenticate(header.as_deref()).await {
                Ok(Some((principal, token))) => {
                    req.extensions_mut().insert(AuthContext { principal, token });
                }
                Ok(None) => {}
                Err(err) if err.is_authentication_failure() => {
                    tracing::debug!(error = %err, "rejected bearer credential");
                    return Ok((StatusCode::UNAUTHORIZED, "invalid credentials").into_response());
                }
                Err(err) => {
                    tracing::error!(error = %err, "authentication failed");
                    return Ok((StatusCode::INTERNAL_SERVER_ERROR, "auth error").into_response());
                }
            }
            poll_fn(|cx| inner.poll_ready(cx)).await?;
            inner.call(req).await
        })
    }
}

#[derive(Debug, Clone)]
enum Requirement {
    Permission { resource: String, action: String },
    Admin,
}

/// Middleware layer that authorizes a request using [`Engine`].
#[derive(Clone)]
pub struct AuthorizeLayer<S> {
    engine: Arc<Engine<S>>,
    requirement: Requirement,
}

impl<S> AuthorizeLayer<S> {
    /// Requires `resource.action`.
    pub fn permission(
        engine: Arc<Engine<S>>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            requirement: Requirement::Permission {
                resource: resource.into(),
                action: action.into(),
            },
        }
    }

    /// Requires the action a CRUD handler verb maps to, see [`crud_action`].
    pub fn crud(engine: Arc<Engine<S>>, resource: impl Into<String>, verb: &str) -> Self {
        Self::permission(engine, resource, crud_action(verb))
    }

    /// Requires administrator authority.
    pub fn admin(engine: Arc<Engine<S>>) -> Self {
        Self {
            engine,
            requirement: Requirement::Admin,
        }
    }
}

impl<S, Inner> Layer<Inner> for AuthorizeLayer<S> {
    type Service = AuthorizeService<Inner, S>;

    fn layer(&self, inner: Inner) -> Self::Service {
        AuthorizeService {
            inner,
            engine: self.engine.clone(),
            requirement: self.requirement.clone(),
        }
    }
}

/// Middleware service that enforces permission checks.
#[derive(Clone)]
pub struct AuthorizeService<Inner, S> {
    inner: Inner,
    engine: Arc<Engine<S>>,
    requirement: Requirement,
}

impl<Inner, S> Service<Request<Body>> for AuthorizeService<Inner, S>
where
    Inner: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    Inner::Future: Send + 'static,
    S: Store + 'static,
{
    type Response = Response;
    type Error = Inner::Error;
    type Future = BoxFuture<Result<Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let engine = self.engine.clone();
        let requirement = self.requirement.clone();

        Box::pin(async move {
            let Some(context) = req.extensions().get::<AuthContext>().cloned() else {
                return Ok((StatusCode::UNAUTHORIZED, "authentication required").into_response());
            };

            let decision = match &requirement {
                Requirement::Permission { resource, action } => {
                    engine
                        .authorize(Some(&context.principal), resource, action)
                        .await
                }
                Requirement::Admin => engine
                    .is_admin(Some(&context.principal))
                    .await
                    .map(Decision::from),
            };

            match decision {
                Ok(Decision::Allow) => {
                    poll_fn(|cx| inner.poll_ready(cx)).await?;
                    inner.call(req).await
                }
                Ok(Decision::Deny) => Ok((StatusCode::FORBIDDEN, "forbidden").into_response()),
                Err(err) => {
                    tracing::error!(error = %err, "authorization failed");
                    Ok((StatusCode::INTERNAL_SERVER_ERROR, "auth error").into_response())
                }
            }
        })
    }
}
