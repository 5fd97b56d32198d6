//! Descriptors: declarations of what a route needs.
//!
//! A descriptor turns one piece of the request (a form field, the session,
//! an authorization decision, the CSRF token) into a [`Value`] for the
//! handler, or explains why it cannot.
//!
//! The built-in descriptors are:
//! - [`Field`]: a converted, validated form or JSON field
//! - [`Authorization`]: a capability granted by a registered authorizer
//! - [`SessionValue`]: facts about the procured session
//! - [`Csrf`]: the cross-site request forgery check
//! - [`RequestValue`]: the request URL or a framework-attached component
//!
//! Applications can add their own by implementing [`Descriptor`].

mod authorization;
mod csrf;
mod field;
mod request;
mod session;

use std::sync::Arc;

use async_trait::async_trait;

use crate::authorizer::{AuthorizeContext, AuthorizerRegistry};
use crate::error::{Denial, Error};
use crate::session::{Session, SessionStore};
use crate::validate::ValidationError;
use crate::value::Value;
use crate::web::{RequestAdapter, RequestInputs};

pub use authorization::Authorization;
pub use csrf::{Csrf, CSRF_FIELD};
pub use field::Field;
pub use request::RequestValue;
pub use session::SessionValue;

/// The result of resolving one descriptor.
#[derive(Debug)]
pub enum Resolved {
    /// The value to inject.
    Value(Value),
    /// The client sent something unacceptable for this descriptor.
    Invalid(ValidationError),
    /// Access was refused. Stops resolution.
    Denied(Denial),
    /// Resolution could not be completed. Stops resolution.
    Unavailable(Error),
}

/// Everything a descriptor may consult while resolving.
///
/// Built by the requirer once per descriptor, after the session has been
/// procured and the request inputs decoded.
pub struct ResolveContext<'a, C> {
    pub(crate) name: &'a str,
    pub(crate) request: &'a RequestAdapter,
    pub(crate) inputs: &'a RequestInputs,
    pub(crate) session: &'a Arc<Session>,
    pub(crate) store: &'a dyn SessionStore,
    pub(crate) authorizers: &'a AuthorizerRegistry<C>,
    pub(crate) connection: &'a C,
}

impl<'a, C> ResolveContext<'a, C> {
    /// The parameter name this descriptor was declared under.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The request being handled.
    pub fn request(&self) -> &'a RequestAdapter {
        self.request
    }

    /// The decoded query string and body.
    pub fn inputs(&self) -> &'a RequestInputs {
        self.inputs
    }

    /// The session procured for the request.
    pub fn session(&self) -> &'a Arc<Session> {
        self.session
    }

    /// The session store.
    pub fn store(&self) -> &'a dyn SessionStore {
        self.store
    }

    /// Registered authorizers.
    pub fn authorizers(&self) -> &'a AuthorizerRegistry<C> {
        self.authorizers
    }

    /// The application connection.
    pub fn connection(&self) -> &'a C {
        self.connection
    }

    /// Context handed to an authorizer for this request.
    pub fn authorize_context(&self) -> AuthorizeContext<'a, C> {
        AuthorizeContext {
            connection: self.connection,
            store: self.store,
            session: self.session,
        }
    }
}

/// A declaration of one thing a route needs from the request.
///
/// # Examples
///
/// A descriptor that injects the request ID:
///
/// ```
/// use async_trait::async_trait;
/// use session_requirer::{Descriptor, ResolveContext, Resolved, Value};
///
/// struct RequestId;
///
/// #[async_trait]
/// impl<C: Sync + 'static> Descriptor<C> for RequestId {
///     async fn resolve(&self, cx: &ResolveContext<'_, C>) -> Resolved {
///         Resolved::Value(Value::Text(cx.request().request_id().to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait Descriptor<C>: Send + Sync {
    /// Resolves this descriptor for one request.
    async fn resolve(&self, cx: &ResolveContext<'_, C>) -> Resolved;
}
