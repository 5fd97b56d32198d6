//! Sessions, session storage, and session procurement.
//!
//! A [`Session`] is an opaque, unguessable identifier plus two facts about
//! how it was established: whether it is *confidential* (only ever sent over
//! an encrypted transport) and which [`SessionMechanism`] carried it.
//!
//! Sessions live in a [`SessionStore`]. A [`ProcureSession`] implementation
//! (normally [`SessionProcurer`]) finds or creates the session for each
//! request.

mod memory;
mod procurer;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SessionError;
use crate::secret::Secret;

pub use memory::MemorySessionStore;
pub use procurer::{ProcureSession, ProcurerConfig, SessionProcurer};

/// How a session identifier travelled with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionMechanism {
    /// A cookie set by the server. Subject to CSRF checks.
    Cookie,
    /// A token header set explicitly by the client.
    Header,
}

impl fmt::Display for SessionMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMechanism::Cookie => write!(f, "cookie"),
            SessionMechanism::Header => write!(f, "header"),
        }
    }
}

/// A server-side session.
///
/// The identifier is a bearer credential and is wrapped in [`Secret`], so it
/// never shows up in `Debug` output or logs.
#[derive(Debug)]
pub struct Session {
    identifier: Secret<String>,
    is_confidential: bool,
    mechanism: SessionMechanism,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session record with the current time as its creation time.
    pub fn new(identifier: String, is_confidential: bool, mechanism: SessionMechanism) -> Self {
        Self {
            identifier: Secret::new(identifier),
            is_confidential,
            mechanism,
            created_at: Utc::now(),
        }
    }

    /// The session identifier.
    pub fn identifier(&self) -> &Secret<String> {
        &self.identifier
    }

    /// `true` if this session is only ever transmitted over encrypted transports.
    pub fn is_confidential(&self) -> bool {
        self.is_confidential
    }

    /// The mechanism that carried the identifier.
    pub fn mechanism(&self) -> SessionMechanism {
        self.mechanism
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns a copy of this session as presented through `mechanism`.
    ///
    /// Stores keep one record per identifier; the mechanism describes the
    /// request that loaded it.
    pub(crate) fn presented_via(&self, mechanism: SessionMechanism) -> Self {
        Self {
            identifier: Secret::new(self.identifier.expose_secret().clone()),
            is_confidential: self.is_confidential,
            mechanism,
            created_at: self.created_at,
        }
    }
}

/// An account bound to a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Account {
    /// Stable account identifier.
    pub account_id: String,
    /// Display name.
    pub username: String,
}

impl Account {
    /// Creates an account record.
    pub fn new(account_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            username: username.into(),
        }
    }
}

/// Backing storage for sessions.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates and stores a fresh session with an unguessable identifier.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the backend fails.
    async fn new_session(
        &self,
        is_confidential: bool,
        mechanism: SessionMechanism,
    ) -> Result<Arc<Session>, SessionError>;

    /// Loads the session named by `identifier` from the confidential or
    /// non-confidential population.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoSuchSession` if no such session exists.
    async fn load_session(
        &self,
        identifier: &str,
        is_confidential: bool,
        mechanism: SessionMechanism,
    ) -> Result<Arc<Session>, SessionError>;

    /// Reports identifiers that arrived over an insecure transport.
    ///
    /// Any confidential session named here has been exposed and must be
    /// invalidated.
    async fn sent_insecurely(&self, identifiers: &[String]);

    /// Accounts currently bound to `session`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the backend fails.
    async fn bound_accounts(&self, session: &Session) -> Result<Vec<Account>, SessionError>;
}
