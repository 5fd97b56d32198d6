use std::fmt;

use thiserror::Error;

/// Fatal errors that end a request with `SessionUnavailable`.
///
/// These are infrastructure problems, not problems with what the client
/// sent. No handler runs when one of them occurs.
#[derive(Debug, Error)]
pub enum Error {
    /// The session could not be procured.
    #[error("session unavailable: {0}")]
    Session(#[from] SessionError),

    /// An authorizer could not reach a decision.
    #[error("authorization unavailable: {0}")]
    Authorizer(#[from] AuthorizerError),
}

/// Errors raised while procuring or storing a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The presented token names no session, and none may be created.
    #[error("no such session: {0}")]
    NoSuchSession(String),

    /// A cookie session had to be created after the response headers went out.
    #[error("too late to set a session cookie: response headers were already sent")]
    TooLateForCookies,

    /// The backing store failed.
    #[error("session storage error: {0}")]
    Storage(String),
}

/// Errors raised by an authorizer that could not decide either way.
///
/// Returning `Ok(None)` from an authorizer means "not authorized"; these
/// errors mean "could not find out".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizerError {
    /// The authorizer's backend (usually a database) failed.
    #[error("authorizer backend failed: {reason}")]
    Backend {
        /// Why the backend failed.
        reason: String,
    },

    /// The authorizer did not answer within the configured timeout.
    #[error("authorizer for {capability} timed out after {timeout_ms}ms")]
    TimedOut {
        /// The capability type that was being authorized.
        capability: &'static str,
        /// Time waited before giving up, in milliseconds.
        timeout_ms: u64,
    },
}

impl AuthorizerError {
    /// Creates a backend error.
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Mistakes in how a requirement set or route was declared.
///
/// These are programming defects, reported when the set or route is built,
/// never while a request is being handled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementError {
    /// Two descriptors (or prerequisites) share a name.
    #[error("descriptor name {0:?} is declared more than once")]
    DuplicateName(String),

    /// A descriptor was declared with an empty name.
    #[error("descriptor names must not be empty")]
    EmptyName,

    /// A route was built without one of its handlers.
    #[error("route is missing its {0} handler")]
    MissingHandler(&'static str),
}

/// An access-control decision that stopped a request.
///
/// Denials are never merged with field validation errors; they go to the
/// route's denied handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} ({descriptor}): {message}")]
pub struct Denial {
    /// Name of the descriptor or prerequisite that denied the request.
    pub descriptor: String,
    /// The kind of denial.
    pub kind: DenialKind,
    /// Human-readable explanation. Never contains submitted values or tokens.
    pub message: String,
}

impl Denial {
    /// Creates a new denial.
    pub fn new(descriptor: impl Into<String>, kind: DenialKind, message: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            kind,
            message: message.into(),
        }
    }
}

/// The kind of access-control denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    /// A required capability was not granted to the session.
    Unauthorized {
        /// The capability type that was refused.
        capability: &'static str,
    },
    /// The CSRF token did not match the session.
    CrossSiteRequestForgery,
    /// A prerequisite failed validation.
    PrerequisiteFailed,
}

impl fmt::Display for DenialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialKind::Unauthorized { capability } => write!(f, "{} DENIED", capability),
            DenialKind::CrossSiteRequestForgery => write!(f, "CSRF TOKEN FAILURE"),
            DenialKind::PrerequisiteFailed => write!(f, "prerequisite failed"),
        }
    }
}
