//! The requirer: resolves requirement sets against requests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::authorizer::{Authorizer, AuthorizerRegistry};
use crate::descriptor::{Descriptor, ResolveContext, Resolved};
use crate::error::{Denial, DenialKind, Error, RequirementError};
use crate::failure::ValidationFailures;
use crate::requirement::{check_names, Requirement, RequirementSet};
use crate::session::{ProcureSession, Session, SessionStore};
use crate::value::Bundle;
use crate::web::{ExtractInputs, RequestAdapter, RequestInputs};

/// What resolving a requirement set produced.
#[derive(Debug)]
pub enum Resolution {
    /// Every descriptor resolved; the values are ready for the handler.
    Resolved(Bundle),
    /// One or more fields failed validation; all failures are listed.
    ValidationFailed(ValidationFailures),
    /// Access was refused.
    Denied(Denial),
    /// The session or an authorizer was unavailable.
    SessionUnavailable(Error),
}

impl Resolution {
    fn label(&self) -> &'static str {
        match self {
            Resolution::Resolved(_) => "resolved",
            Resolution::ValidationFailed(_) => "validation_failed",
            Resolution::Denied(_) => "denied",
            Resolution::SessionUnavailable(_) => "session_unavailable",
        }
    }
}

struct RequirerInner<C> {
    procurer: Box<dyn ProcureSession>,
    store: Arc<dyn SessionStore>,
    authorizers: AuthorizerRegistry<C>,
    connection: C,
    prerequisites: Vec<Requirement<C>>,
}

/// Resolves requirement sets for incoming requests.
///
/// A `Requirer` is built once per application and shared by every route.
/// Cloning is cheap.
///
/// # Resolution order
///
/// 1. Procure the session (once).
/// 2. Decode the query string and body (once).
/// 3. Check the requirer's prerequisites, then the set's prerequisites.
///    Any failure denies the request.
/// 4. Resolve the set's descriptors in declaration order, collecting every
///    validation error. A denial stops resolution immediately.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use session_requirer::{Field, MemorySessionStore, RequestAdapter, Requirer, RequirementSet, Resolution, SessionProcurer};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = Arc::new(MemorySessionStore::new());
/// let requirer = Requirer::builder(SessionProcurer::new(store.clone()), store)
///     .build()
///     .unwrap();
///
/// let set = RequirementSet::builder()
///     .require("rating", Field::integer_in(1..=5))
///     .build()
///     .unwrap();
///
/// let mut request = RequestAdapter::new("req-1".to_string());
/// request.set_secure(true);
/// request.set_query_string("rating=4");
///
/// match requirer.resolve(&set, &mut request).await {
///     Resolution::Resolved(bundle) => assert_eq!(bundle.integer("rating"), Some(4)),
///     other => panic!("unexpected {:?}", other),
/// }
/// # }
/// ```
pub struct Requirer<C = ()> {
    inner: Arc<RequirerInner<C>>,
}

impl<C> Clone for Requirer<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for Requirer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requirer")
            .field("authorizers", &self.inner.authorizers)
            .field(
                "prerequisites",
                &self.prerequisite_names().collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Requirer<()> {
    /// Starts building a requirer with no application connection.
    pub fn builder(
        procurer: impl ProcureSession + 'static,
        store: Arc<dyn SessionStore>,
    ) -> RequirerBuilder<()> {
        RequirerBuilder::new(procurer, store, ())
    }
}

impl<C> Requirer<C> {
    /// Names of the prerequisites applied to every route.
    pub fn prerequisite_names(&self) -> impl Iterator<Item = &str> {
        self.inner.prerequisites.iter().map(|r| r.name.as_str())
    }
}

impl<C: Send + Sync + 'static> Requirer<C> {
    /// Resolves `set` against `request`.
    ///
    /// Never invokes a handler; see [`Route`](crate::Route) for that.
    pub async fn resolve(&self, set: &RequirementSet<C>, request: &mut RequestAdapter) -> Resolution {
        let request_id = request.request_id().to_string();

        let session = match self.inner.procurer.procure(request).await {
            Ok(session) => session,
            Err(error) => {
                tracing::warn!(
                    request_id = %request_id,
                    error = %error,
                    "session unavailable"
                );
                return Resolution::SessionUnavailable(error.into());
            }
        };

        let request: &RequestAdapter = request;
        let inputs = request.extract_inputs().await;
        let resolution = self.resolve_with(set, request, &inputs, &session).await;

        match &resolution {
            Resolution::Resolved(_) => {}
            Resolution::ValidationFailed(failures) => tracing::info!(
                request_id = %request_id,
                fields = ?failures.fields().collect::<Vec<_>>(),
                "validation failed"
            ),
            Resolution::Denied(denial) => tracing::warn!(
                request_id = %request_id,
                descriptor = %denial.descriptor,
                kind = %denial.kind,
                "request denied"
            ),
            Resolution::SessionUnavailable(error) => tracing::warn!(
                request_id = %request_id,
                error = %error,
                "authorization unavailable"
            ),
        }
        tracing::info!(
            request_id = %request_id,
            outcome = resolution.label(),
            "requirements resolved"
        );
        resolution
    }

    async fn resolve_with(
        &self,
        set: &RequirementSet<C>,
        request: &RequestAdapter,
        inputs: &RequestInputs,
        session: &Arc<Session>,
    ) -> Resolution {
        let prerequisites = self.inner.prerequisites.iter().chain(set.prerequisites());
        for requirement in prerequisites {
            let cx = self.context(&requirement.name, request, inputs, session);
            match requirement.descriptor.resolve(&cx).await {
                Resolved::Value(_) => {}
                Resolved::Invalid(error) => {
                    return Resolution::Denied(Denial::new(
                        &requirement.name,
                        DenialKind::PrerequisiteFailed,
                        error.message(),
                    ))
                }
                Resolved::Denied(denial) => return Resolution::Denied(denial),
                Resolved::Unavailable(error) => return Resolution::SessionUnavailable(error),
            }
        }

        let mut bundle = Bundle::with_capacity(set.len());
        let mut failures = ValidationFailures::new();
        for requirement in set.descriptors() {
            let cx = self.context(&requirement.name, request, inputs, session);
            match requirement.descriptor.resolve(&cx).await {
                Resolved::Value(value) => bundle.insert(requirement.name.clone(), value),
                Resolved::Invalid(error) => {
                    tracing::debug!(
                        request_id = %request.request_id(),
                        field = %requirement.name,
                        kind = %error.kind(),
                        "field rejected"
                    );
                    failures.record(requirement.name.clone(), error);
                }
                Resolved::Denied(denial) => return Resolution::Denied(denial),
                Resolved::Unavailable(error) => return Resolution::SessionUnavailable(error),
            }
        }

        if failures.is_empty() {
            Resolution::Resolved(bundle)
        } else {
            Resolution::ValidationFailed(failures)
        }
    }

    fn context<'a>(
        &'a self,
        name: &'a str,
        request: &'a RequestAdapter,
        inputs: &'a RequestInputs,
        session: &'a Arc<Session>,
    ) -> ResolveContext<'a, C> {
        ResolveContext {
            name,
            request,
            inputs,
            session,
            store: self.inner.store.as_ref(),
            authorizers: &self.inner.authorizers,
            connection: &self.inner.connection,
        }
    }
}

/// Builder for [`Requirer`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use session_requirer::{Csrf, MemorySessionStore, RequirerBuilder, SessionProcurer};
///
/// struct Database;
///
/// let store = Arc::new(MemorySessionStore::new());
/// let requirer = RequirerBuilder::new(SessionProcurer::new(store.clone()), store, Database)
///     .prerequisite("csrf", Csrf::new())
///     .authorization_timeout(Duration::from_secs(2))
///     .build()
///     .unwrap();
///
/// assert_eq!(requirer.prerequisite_names().collect::<Vec<_>>(), ["csrf"]);
/// ```
pub struct RequirerBuilder<C> {
    procurer: Box<dyn ProcureSession>,
    store: Arc<dyn SessionStore>,
    authorizers: AuthorizerRegistry<C>,
    connection: C,
    prerequisites: Vec<Requirement<C>>,
    authorization_timeout: Option<Duration>,
}

impl<C: Send + Sync + 'static> RequirerBuilder<C> {
    /// Starts building a requirer whose authorizers receive `connection`.
    pub fn new(
        procurer: impl ProcureSession + 'static,
        store: Arc<dyn SessionStore>,
        connection: C,
    ) -> Self {
        Self {
            procurer: Box::new(procurer),
            store,
            authorizers: AuthorizerRegistry::new(),
            connection,
            prerequisites: Vec::new(),
            authorization_timeout: None,
        }
    }

    /// Replaces the authorizer registry.
    #[must_use]
    pub fn authorizers(mut self, authorizers: AuthorizerRegistry<C>) -> Self {
        self.authorizers = authorizers;
        self
    }

    /// Registers one authorizer.
    #[must_use]
    pub fn authorizer<A: Authorizer<C>>(mut self, authorizer: A) -> Self {
        self.authorizers.register(authorizer);
        self
    }

    /// Adds a prerequisite checked before every route's own requirements.
    #[must_use]
    pub fn prerequisite(
        mut self,
        name: impl Into<String>,
        descriptor: impl Descriptor<C> + 'static,
    ) -> Self {
        self.prerequisites.push(Requirement {
            name: name.into(),
            descriptor: Arc::new(descriptor),
        });
        self
    }

    /// Gives up on an authorizer after `timeout`.
    ///
    /// A timed-out authorization ends the request as session-unavailable.
    #[must_use]
    pub fn authorization_timeout(mut self, timeout: Duration) -> Self {
        self.authorization_timeout = Some(timeout);
        self
    }

    /// Finishes the requirer.
    ///
    /// # Errors
    ///
    /// Returns `RequirementError` if prerequisite names are empty or repeated.
    pub fn build(mut self) -> Result<Requirer<C>, RequirementError> {
        check_names(self.prerequisites.iter())?;
        self.authorizers.set_timeout(self.authorization_timeout);

        tracing::debug!(
            authorizers = self.authorizers.len(),
            prerequisites = self.prerequisites.len(),
            "requirer built"
        );
        Ok(Requirer {
            inner: Arc::new(RequirerInner {
                procurer: self.procurer,
                store: self.store,
                authorizers: self.authorizers,
                connection: self.connection,
                prerequisites: self.prerequisites,
            }),
        })
    }
}
