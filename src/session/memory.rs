use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::SessionError;

use super::{Account, Session, SessionMechanism, SessionStore};

/// Length of a session identifier in random bytes (hex-encoded to twice that).
const IDENTIFIER_BYTES: usize = 32;

/// In-memory, process-local session store.
///
/// Confidential and non-confidential sessions are kept in separate maps, so an
/// identifier from one population can never load a session from the other.
/// Nothing is persisted; a restart forgets every session.
///
/// # Examples
///
/// ```
/// use session_requirer::{MemorySessionStore, SessionMechanism, SessionStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemorySessionStore::new();
/// let session = store.new_session(true, SessionMechanism::Cookie).await.unwrap();
///
/// let id = session.identifier().expose_secret().clone();
/// assert!(store.load_session(&id, true, SessionMechanism::Cookie).await.is_ok());
/// assert!(store.load_session(&id, false, SessionMechanism::Cookie).await.is_err());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    /// Sessions only ever sent over encrypted transports.
    secure: RwLock<HashMap<String, Arc<Session>>>,
    /// Sessions that may travel in the clear.
    insecure: RwLock<HashMap<String, Arc<Session>>>,
    /// Accounts bound to each session identifier.
    accounts: RwLock<HashMap<String, Vec<Account>>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `account` to `session`.
    ///
    /// Binding the same account twice has no effect.
    pub async fn bind_account(&self, session: &Session, account: Account) {
        let mut accounts = self.accounts.write().await;
        let bound = accounts
            .entry(session.identifier().expose_secret().clone())
            .or_default();
        if !bound.contains(&account) {
            tracing::debug!(account_id = %account.account_id, "bound account to session");
            bound.push(account);
        }
    }

    /// Removes every account binding from `session`.
    pub async fn unbind_accounts(&self, session: &Session) {
        self.accounts
            .write()
            .await
            .remove(session.identifier().expose_secret());
    }

    /// Number of stored sessions in both populations.
    pub async fn len(&self) -> usize {
        self.secure.read().await.len() + self.insecure.read().await.len()
    }

    /// Returns `true` if no sessions are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn population(&self, is_confidential: bool) -> &RwLock<HashMap<String, Arc<Session>>> {
        if is_confidential {
            &self.secure
        } else {
            &self.insecure
        }
    }
}

fn generate_identifier() -> String {
    hex::encode(rand::random::<[u8; IDENTIFIER_BYTES]>())
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn new_session(
        &self,
        is_confidential: bool,
        mechanism: SessionMechanism,
    ) -> Result<Arc<Session>, SessionError> {
        let identifier = generate_identifier();
        let session = Arc::new(Session::new(identifier.clone(), is_confidential, mechanism));
        self.population(is_confidential)
            .write()
            .await
            .insert(identifier, Arc::clone(&session));

        tracing::debug!(
            confidential = is_confidential,
            mechanism = %mechanism,
            "created session"
        );
        Ok(session)
    }

    async fn load_session(
        &self,
        identifier: &str,
        is_confidential: bool,
        mechanism: SessionMechanism,
    ) -> Result<Arc<Session>, SessionError> {
        let sessions = self.population(is_confidential).read().await;
        match sessions.get(identifier) {
            Some(session) if session.mechanism() == mechanism => Ok(Arc::clone(session)),
            Some(session) => Ok(Arc::new(session.presented_via(mechanism))),
            None => Err(SessionError::NoSuchSession(
                "no session with the presented identifier".to_string(),
            )),
        }
    }

    async fn sent_insecurely(&self, identifiers: &[String]) {
        let mut secure = self.secure.write().await;
        let mut accounts = self.accounts.write().await;
        for identifier in identifiers {
            if secure.remove(identifier).is_some() {
                accounts.remove(identifier);
                tracing::warn!("confidential session identifier sent over insecure transport; session revoked");
            }
        }
    }

    async fn bound_accounts(&self, session: &Session) -> Result<Vec<Account>, SessionError> {
        Ok(self
            .accounts
            .read()
            .await
            .get(session.identifier().expose_secret())
            .cloned()
            .unwrap_or_default())
    }
}
