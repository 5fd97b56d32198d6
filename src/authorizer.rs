//! Authorizers: session-to-capability functions.
//!
//! An [`Authorizer`] decides whether a session holds a capability and, if it
//! does, returns the capability object. Authorizers are registered per
//! capability type in an [`AuthorizerRegistry`], which the requirer consults
//! whenever an `Authorization<T>` descriptor is resolved.
//!
//! The registry is built once at startup and read-only afterwards, so it is
//! shared across requests without locking.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AuthorizerError;
use crate::session::{Session, SessionStore};
use crate::value::Capability;

/// Inputs available to an authorizer.
pub struct AuthorizeContext<'a, C> {
    /// Application connection (for example a database handle).
    pub connection: &'a C,
    /// The session store, for looking up bound accounts.
    pub store: &'a dyn SessionStore,
    /// The session being authorized.
    pub session: &'a Session,
}

impl<C> Clone for AuthorizeContext<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for AuthorizeContext<'_, C> {}

/// Produces a capability of one type for a session.
///
/// Return `Ok(None)` when the session does not hold the capability, and an
/// error only when the decision itself could not be made.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use session_requirer::{AuthorizeContext, Authorizer, AuthorizerError};
///
/// struct FoodCritic { account_id: String }
///
/// struct CriticAuthorizer;
///
/// #[async_trait]
/// impl Authorizer<()> for CriticAuthorizer {
///     type Capability = FoodCritic;
///
///     async fn authorize(
///         &self,
///         cx: AuthorizeContext<'_, ()>,
///     ) -> Result<Option<FoodCritic>, AuthorizerError> {
///         let accounts = cx
///             .store
///             .bound_accounts(cx.session)
///             .await
///             .map_err(|e| AuthorizerError::backend(e.to_string()))?;
///         Ok(accounts
///             .into_iter()
///             .next()
///             .map(|account| FoodCritic { account_id: account.account_id }))
///     }
/// }
/// ```
#[async_trait]
pub trait Authorizer<C>: Send + Sync + 'static {
    /// The capability type this authorizer grants.
    type Capability: Send + Sync + 'static;

    /// Decides whether `cx.session` holds the capability.
    ///
    /// # Errors
    ///
    /// Returns `AuthorizerError` if the decision could not be made.
    async fn authorize(
        &self,
        cx: AuthorizeContext<'_, C>,
    ) -> Result<Option<Self::Capability>, AuthorizerError>;
}

#[async_trait]
trait ErasedAuthorizer<C>: Send + Sync {
    async fn authorize_erased(
        &self,
        cx: AuthorizeContext<'_, C>,
    ) -> Result<Option<Capability>, AuthorizerError>;
}

#[async_trait]
impl<C, A> ErasedAuthorizer<C> for A
where
    C: Sync + 'static,
    A: Authorizer<C>,
{
    async fn authorize_erased(
        &self,
        cx: AuthorizeContext<'_, C>,
    ) -> Result<Option<Capability>, AuthorizerError> {
        Ok(self.authorize(cx).await?.map(Capability::new))
    }
}

/// Authorizers keyed by the capability type they produce.
///
/// # Examples
///
/// ```
/// # use async_trait::async_trait;
/// # use session_requirer::{AuthorizeContext, Authorizer, AuthorizerError};
/// use session_requirer::AuthorizerRegistry;
/// # struct Admin;
/// # struct AdminAuthorizer;
/// # #[async_trait]
/// # impl Authorizer<()> for AdminAuthorizer {
/// #     type Capability = Admin;
/// #     async fn authorize(&self, _: AuthorizeContext<'_, ()>) -> Result<Option<Admin>, AuthorizerError> {
/// #         Ok(None)
/// #     }
/// # }
///
/// let registry = AuthorizerRegistry::new().with(AdminAuthorizer);
/// assert!(registry.contains::<Admin>());
/// assert!(!registry.contains::<String>());
/// ```
pub struct AuthorizerRegistry<C = ()> {
    authorizers: HashMap<TypeId, Arc<dyn ErasedAuthorizer<C>>>,
    timeout: Option<Duration>,
}

impl<C: Sync + 'static> AuthorizerRegistry<C> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            authorizers: HashMap::new(),
            timeout: None,
        }
    }

    /// Registers `authorizer` for its capability type, replacing any earlier
    /// authorizer for the same type.
    pub fn register<A: Authorizer<C>>(&mut self, authorizer: A) -> &mut Self {
        let previous = self
            .authorizers
            .insert(TypeId::of::<A::Capability>(), Arc::new(authorizer));
        if previous.is_some() {
            tracing::warn!(
                capability = type_name::<A::Capability>(),
                "replaced previously registered authorizer"
            );
        }
        self
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with<A: Authorizer<C>>(mut self, authorizer: A) -> Self {
        self.register(authorizer);
        self
    }

    /// Returns `true` if an authorizer for `T` is registered.
    pub fn contains<T: 'static>(&self) -> bool {
        self.authorizers.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered authorizers.
    pub fn len(&self) -> usize {
        self.authorizers.len()
    }

    /// Returns `true` if no authorizers are registered.
    pub fn is_empty(&self) -> bool {
        self.authorizers.is_empty()
    }

    /// Limits how long a single authorizer may run.
    pub(crate) fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Runs the authorizer for `T`.
    ///
    /// Returns `Ok(None)` when no authorizer for `T` is registered.
    ///
    /// # Errors
    ///
    /// Returns the authorizer's error, or `AuthorizerError::TimedOut`.
    pub async fn authorize<T: Send + Sync + 'static>(
        &self,
        cx: AuthorizeContext<'_, C>,
    ) -> Result<Option<Arc<T>>, AuthorizerError> {
        let capability = self
            .authorize_type(TypeId::of::<T>(), type_name::<T>(), cx)
            .await?;
        Ok(capability.and_then(|cap| cap.downcast::<T>()))
    }

    pub(crate) async fn authorize_type(
        &self,
        capability: TypeId,
        capability_name: &'static str,
        cx: AuthorizeContext<'_, C>,
    ) -> Result<Option<Capability>, AuthorizerError> {
        let Some(authorizer) = self.authorizers.get(&capability) else {
            tracing::debug!(
                capability = capability_name,
                "no authorizer registered; capability not granted"
            );
            return Ok(None);
        };

        let decision = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, authorizer.authorize_erased(cx))
                .await
                .map_err(|_| AuthorizerError::TimedOut {
                    capability: capability_name,
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => authorizer.authorize_erased(cx).await,
        };

        tracing::debug!(
            capability = capability_name,
            granted = matches!(decision, Ok(Some(_))),
            "authorizer finished"
        );
        decision
    }
}

impl<C: Sync + 'static> Default for AuthorizerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for AuthorizerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizerRegistry")
            .field("authorizers", &self.authorizers.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
