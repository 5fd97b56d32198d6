//! Declarative request requirements for web handlers.
//!
//! A route declares what it needs (form fields, the session, authorized
//! capabilities, a valid CSRF token) and a [`Requirer`] resolves all of it
//! before any handler code runs. Exactly one of three handlers then sees the
//! request:
//! - the **primary handler**, with a [`Bundle`] of converted, validated values
//! - the **validation-failure handler**, with every field error at once
//! - the **denied handler**, when authorization or CSRF checks fail
//!
//! # Core Types
//!
//! - [`Requirer`]: Resolves requirement sets; built once per application
//! - [`RequirementSet`]: The ordered, named descriptors of one route
//! - [`Route`]: A requirement set bound to its three handlers
//! - [`Field`], [`Authorization`], [`SessionValue`], [`Csrf`], [`RequestValue`]: Built-in descriptors
//! - [`SessionProcurer`], [`MemorySessionStore`]: Session handling
//! - [`Secret<T>`]: Wrapper that redacts session tokens and passwords in logs
//! - [`Tainted<T>`]: Wrapper for request input not yet through a descriptor
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use session_requirer::{
//!     Bundle, Denial, Field, MemorySessionStore, Outcome, RequestAdapter, Requirer,
//!     RequirementSet, SessionProcurer, TextSanitizer, ValidationFailures,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemorySessionStore::new());
//! let requirer = Requirer::builder(SessionProcurer::new(store.clone()), store)
//!     .build()
//!     .expect("valid requirer");
//!
//! let rate_food = requirer
//!     .route(
//!         RequirementSet::builder()
//!             .require("name", Field::text().validate(TextSanitizer::default_limits()))
//!             .require("rating", Field::integer_in(1..=5))
//!             .build()
//!             .expect("valid requirements"),
//!     )
//!     .handler(|bundle: Bundle| async move {
//!         format!("{} rated {}", bundle.text("name").unwrap_or(""), bundle.integer("rating").unwrap_or(0))
//!     })
//!     .on_validation_failure(|_req: &RequestAdapter, failures: ValidationFailures| failures.to_string())
//!     .on_denied(|_req: &RequestAdapter, denial: Denial| denial.to_string())
//!     .build()
//!     .expect("valid route");
//!
//! let mut request = RequestAdapter::new("req-123".to_string());
//! request.set_secure(true);
//! request.set_query_string("name=Pizza&rating=4");
//!
//! let outcome = rate_food.handle(&mut request).await;
//! assert!(matches!(outcome, Outcome::Resolved(ref page) if page == "Pizza rated 4"));
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod authorizer;
mod descriptor;
mod error;
mod failure;
mod requirement;
mod requirer;
mod route;
mod secret;
pub mod session;
mod tainted;
mod validate;
mod value;
pub mod web;

#[cfg(test)]
mod test_utils;

pub use authorizer::{AuthorizeContext, Authorizer, AuthorizerRegistry};
pub use descriptor::{
    Authorization, Csrf, Descriptor, Field, RequestValue, ResolveContext, Resolved, SessionValue,
    CSRF_FIELD,
};
pub use error::{AuthorizerError, Denial, DenialKind, Error, RequirementError, SessionError};
pub use failure::{FieldFailure, ValidationFailures};
pub use requirement::{RequirementSet, RequirementSetBuilder};
pub use requirer::{Requirer, RequirerBuilder, Resolution};
pub use route::{DeniedHandler, Handler, Outcome, Route, RouteBuilder, ValidationFailureHandler};
pub use secret::Secret;
pub use session::{
    Account, MemorySessionStore, ProcureSession, ProcurerConfig, Session, SessionMechanism,
    SessionProcurer, SessionStore,
};
pub use tainted::Tainted;
pub use validate::{TextSanitizer, ValidationError, ValidationErrorKind, Validator};
pub use value::{Bundle, Capability, Value};
pub use web::{RequestAdapter, Source};
