//! Routes: a requirement set bound to its three handlers.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Denial, Error, RequirementError};
use crate::failure::ValidationFailures;
use crate::requirement::RequirementSet;
use crate::requirer::{Requirer, Resolution};
use crate::value::Bundle;
use crate::web::RequestAdapter;

/// The route's primary handler. Runs only when every requirement resolved.
///
/// Any `async` function or closure taking a [`Bundle`] is a handler.
#[async_trait]
pub trait Handler<T>: Send + Sync {
    /// Handles a fully resolved request.
    async fn call(&self, bundle: Bundle) -> T;
}

#[async_trait]
impl<F, Fut, T> Handler<T> for F
where
    F: Fn(Bundle) -> Fut + Send + Sync,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    async fn call(&self, bundle: Bundle) -> T {
        self(bundle).await
    }
}

/// Renders the response for a request whose fields failed validation.
pub trait ValidationFailureHandler<T>: Send + Sync {
    /// Builds the response listing `failures`.
    fn validation_failed(&self, request: &RequestAdapter, failures: ValidationFailures) -> T;
}

impl<F, T> ValidationFailureHandler<T> for F
where
    F: Fn(&RequestAdapter, ValidationFailures) -> T + Send + Sync,
{
    fn validation_failed(&self, request: &RequestAdapter, failures: ValidationFailures) -> T {
        self(request, failures)
    }
}

/// Renders the response for a denied request.
pub trait DeniedHandler<T>: Send + Sync {
    /// Builds the response for `denial`.
    fn denied(&self, request: &RequestAdapter, denial: Denial) -> T;
}

impl<F, T> DeniedHandler<T> for F
where
    F: Fn(&RequestAdapter, Denial) -> T + Send + Sync,
{
    fn denied(&self, request: &RequestAdapter, denial: Denial) -> T {
        self(request, denial)
    }
}

/// How a route finished.
///
/// Exactly one handler ran for the first three variants; none ran for the
/// last two.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The primary handler's response.
    Resolved(T),
    /// The validation-failure handler's response.
    ValidationFailed(T),
    /// The denied handler's response.
    Denied(T),
    /// No session (or authorization decision) could be had. No handler ran.
    SessionUnavailable(Error),
    /// The request was cancelled before a handler ran.
    Cancelled,
}

impl<T> Outcome<T> {
    /// The response produced by whichever handler ran.
    pub fn into_response(self) -> Option<T> {
        match self {
            Outcome::Resolved(response)
            | Outcome::ValidationFailed(response)
            | Outcome::Denied(response) => Some(response),
            Outcome::SessionUnavailable(_) | Outcome::Cancelled => None,
        }
    }

    /// Returns `true` if the primary handler ran.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Outcome::Resolved(_))
    }
}

/// A requirement set bound to a primary handler and its two failure handlers.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use session_requirer::{
///     Bundle, Denial, Field, MemorySessionStore, Outcome, RequestAdapter, Requirer, RequirementSet,
///     SessionProcurer, ValidationFailures,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = Arc::new(MemorySessionStore::new());
/// let requirer = Requirer::builder(SessionProcurer::new(store.clone()), store)
///     .build()
///     .unwrap();
///
/// let route = requirer
///     .route(
///         RequirementSet::builder()
///             .require("rating", Field::integer_in(1..=5))
///             .build()
///             .unwrap(),
///     )
///     .handler(|bundle: Bundle| async move {
///         format!("rated {}", bundle.integer("rating").unwrap_or(0))
///     })
///     .on_validation_failure(|_req: &RequestAdapter, failures: ValidationFailures| {
///         format!("invalid: {}", failures)
///     })
///     .on_denied(|_req: &RequestAdapter, denial: Denial| format!("denied: {}", denial))
///     .build()
///     .unwrap();
///
/// let mut request = RequestAdapter::new("req-1".to_string());
/// request.set_secure(true);
/// request.set_query_string("rating=6");
///
/// match route.handle(&mut request).await {
///     Outcome::ValidationFailed(page) => assert!(page.contains("between 1 and 5")),
///     other => panic!("unexpected {:?}", other),
/// }
/// # }
/// ```
pub struct Route<C, T> {
    requirer: Requirer<C>,
    requirements: RequirementSet<C>,
    handler: Box<dyn Handler<T>>,
    on_validation_failure: Box<dyn ValidationFailureHandler<T>>,
    on_denied: Box<dyn DeniedHandler<T>>,
}

impl<C, T> fmt::Debug for Route<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("requirements", &self.requirements)
            .finish_non_exhaustive()
    }
}

impl<C: Send + Sync + 'static, T: Send + 'static> Route<C, T> {
    /// Resolves the requirements and runs exactly one handler.
    pub async fn handle(&self, request: &mut RequestAdapter) -> Outcome<T> {
        let resolution = self.requirer.resolve(&self.requirements, request).await;
        self.dispatch(request, resolution).await
    }

    /// Like [`handle`](Self::handle), but gives up if `cancel` fires before a
    /// handler starts.
    ///
    /// In-flight descriptor resolution is dropped on cancellation. A handler
    /// that has already started runs to completion.
    pub async fn handle_until(
        &self,
        request: &mut RequestAdapter,
        cancel: &CancellationToken,
    ) -> Outcome<T> {
        let resolution = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            resolution = self.requirer.resolve(&self.requirements, request) => Some(resolution),
        };

        match resolution {
            Some(resolution) if !cancel.is_cancelled() => self.dispatch(request, resolution).await,
            _ => {
                tracing::info!(
                    request_id = %request.request_id(),
                    "request cancelled before a handler ran"
                );
                Outcome::Cancelled
            }
        }
    }

    async fn dispatch(&self, request: &RequestAdapter, resolution: Resolution) -> Outcome<T> {
        match resolution {
            Resolution::Resolved(bundle) => {
                tracing::debug!(request_id = %request.request_id(), "invoking handler");
                Outcome::Resolved(self.handler.call(bundle).await)
            }
            Resolution::ValidationFailed(failures) => Outcome::ValidationFailed(
                self.on_validation_failure.validation_failed(request, failures),
            ),
            Resolution::Denied(denial) => Outcome::Denied(self.on_denied.denied(request, denial)),
            Resolution::SessionUnavailable(error) => Outcome::SessionUnavailable(error),
        }
    }
}

impl<C: Send + Sync + 'static> Requirer<C> {
    /// Starts binding `requirements` to handlers.
    pub fn route<T>(&self, requirements: RequirementSet<C>) -> RouteBuilder<C, T> {
        RouteBuilder {
            requirer: self.clone(),
            requirements,
            handler: None,
            on_validation_failure: None,
            on_denied: None,
        }
    }
}

/// Builder for [`Route`]. All three handlers are mandatory.
pub struct RouteBuilder<C, T> {
    requirer: Requirer<C>,
    requirements: RequirementSet<C>,
    handler: Option<Box<dyn Handler<T>>>,
    on_validation_failure: Option<Box<dyn ValidationFailureHandler<T>>>,
    on_denied: Option<Box<dyn DeniedHandler<T>>>,
}

impl<C: Send + Sync + 'static, T: Send + 'static> RouteBuilder<C, T> {
    /// Sets the primary handler.
    #[must_use]
    pub fn handler(mut self, handler: impl Handler<T> + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Sets the handler for requests with invalid fields.
    #[must_use]
    pub fn on_validation_failure(
        mut self,
        handler: impl ValidationFailureHandler<T> + 'static,
    ) -> Self {
        self.on_validation_failure = Some(Box::new(handler));
        self
    }

    /// Sets the handler for denied requests.
    #[must_use]
    pub fn on_denied(mut self, handler: impl DeniedHandler<T> + 'static) -> Self {
        self.on_denied = Some(Box::new(handler));
        self
    }

    /// Finishes the route.
    ///
    /// # Errors
    ///
    /// - `RequirementError::MissingHandler` if a handler was not set
    /// - `RequirementError::DuplicateName` if a name in the set is also a
    ///   requirer-wide prerequisite
    pub fn build(self) -> Result<Route<C, T>, RequirementError> {
        let handler = self
            .handler
            .ok_or(RequirementError::MissingHandler("primary"))?;
        let on_validation_failure = self
            .on_validation_failure
            .ok_or(RequirementError::MissingHandler("validation failure"))?;
        let on_denied = self
            .on_denied
            .ok_or(RequirementError::MissingHandler("denied"))?;

        if let Some(name) = self
            .requirements
            .conflict_with(self.requirer.prerequisite_names())
        {
            return Err(RequirementError::DuplicateName(name));
        }

        Ok(Route {
            requirer: self.requirer,
            requirements: self.requirements,
            handler,
            on_validation_failure,
            on_denied,
        })
    }
}
