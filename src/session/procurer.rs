use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SessionError;
use crate::web::{RequestAdapter, SetCookie};

use super::{Session, SessionMechanism, SessionStore};

/// Finds or creates the session for a request.
#[async_trait]
pub trait ProcureSession: Send + Sync {
    /// Returns the session for `request`, creating one if allowed.
    ///
    /// May queue a `Set-Cookie` on the request adapter when it creates a
    /// cookie-based session.
    ///
    /// # Errors
    ///
    /// - `SessionError::NoSuchSession` when the presented token is unknown
    ///   and no session may be created for this request
    /// - `SessionError::TooLateForCookies` when a cookie session would be
    ///   needed but the response headers are already sent
    /// - `SessionError::Storage` when the store fails
    async fn procure(&self, request: &mut RequestAdapter) -> Result<Arc<Session>, SessionError>;
}

/// Names and cookie attributes used by [`SessionProcurer`].
///
/// Deserializable so it can live in the application's config file; every
/// field has a default.
///
/// # Examples
///
/// ```
/// use session_requirer::ProcurerConfig;
///
/// let config: ProcurerConfig = serde_json::from_str(r#"{"max_age": 600}"#).unwrap();
/// assert_eq!(config.max_age, 600);
/// assert_eq!(config.secure_cookie, "Requirer-Secure-Session");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProcurerConfig {
    /// `Max-Age` of new session cookies, in seconds.
    pub max_age: u64,
    /// Cookie carrying confidential sessions.
    pub secure_cookie: String,
    /// Cookie carrying non-confidential sessions.
    pub insecure_cookie: String,
    /// `Domain` attribute of session cookies.
    pub cookie_domain: Option<String>,
    /// `Path` attribute of session cookies.
    pub cookie_path: String,
    /// Header carrying confidential session tokens.
    pub secure_token_header: String,
    /// Header carrying non-confidential session tokens.
    pub insecure_token_header: String,
    /// Whether a `GET` without a valid session gets a new cookie session.
    pub set_cookie_on_get: bool,
}

impl Default for ProcurerConfig {
    fn default() -> Self {
        Self {
            max_age: 3600,
            secure_cookie: "Requirer-Secure-Session".to_string(),
            insecure_cookie: "Requirer-INSECURE-Session".to_string(),
            cookie_domain: None,
            cookie_path: "/".to_string(),
            secure_token_header: "X-Auth-Token".to_string(),
            insecure_token_header: "X-INSECURE-Auth-Token".to_string(),
            set_cookie_on_get: true,
        }
    }
}

/// Header and cookie names to read for one request.
struct Transport<'a> {
    token_header: &'a str,
    cookie_name: &'a str,
    sent_securely: bool,
}

/// The standard session procurer.
///
/// # Procurement rules
///
/// 1. Over TLS, the confidential header and cookie are consulted and the
///    session is confidential.
/// 2. Over plain HTTP, the non-confidential names are consulted. Every token
///    present in *any* session header or cookie is first reported to
///    [`SessionStore::sent_insecurely`], revoking exposed confidential
///    sessions.
/// 3. A token header selects the header mechanism; its session is never
///    auto-created.
/// 4. Otherwise the session cookie is used. If it names no session, a new one
///    is created, but only for a `GET` whose response headers have not been
///    sent, and only when `set_cookie_on_get` is on.
pub struct SessionProcurer {
    store: Arc<dyn SessionStore>,
    config: ProcurerConfig,
    force_insecure: bool,
}

impl SessionProcurer {
    /// Creates a procurer with the default configuration.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_config(store, ProcurerConfig::default())
    }

    /// Creates a procurer with an explicit configuration.
    pub fn with_config(store: Arc<dyn SessionStore>, config: ProcurerConfig) -> Self {
        Self {
            store,
            config,
            force_insecure: false,
        }
    }

    /// Always procures the non-confidential session, even over TLS.
    ///
    /// Useful for pages that must share a session with plain-HTTP pages.
    #[must_use]
    pub fn force_insecure(mut self) -> Self {
        self.force_insecure = true;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &ProcurerConfig {
        &self.config
    }

    async fn transport(&self, request: &RequestAdapter) -> Transport<'_> {
        let secure = Transport {
            token_header: &self.config.secure_token_header,
            cookie_name: &self.config.secure_cookie,
            sent_securely: true,
        };
        let insecure = Transport {
            token_header: &self.config.insecure_token_header,
            cookie_name: &self.config.insecure_cookie,
            sent_securely: false,
        };

        if request.is_secure() {
            return if self.force_insecure { insecure } else { secure };
        }

        let exposed = self.exposed_tokens(request);
        if !exposed.is_empty() {
            self.store.sent_insecurely(&exposed).await;
        }
        insecure
    }

    fn exposed_tokens(&self, request: &RequestAdapter) -> Vec<String> {
        let headers = [
            &self.config.secure_token_header,
            &self.config.insecure_token_header,
        ];
        let cookies = [&self.config.secure_cookie, &self.config.insecure_cookie];

        headers
            .iter()
            .flat_map(|name| request.header_values(name).iter().cloned())
            .chain(
                cookies
                    .iter()
                    .filter_map(|name| request.cookie(name).map(str::to_string)),
            )
            .filter(|token| !token.is_empty())
            .collect()
    }

    async fn procure_by_cookie(
        &self,
        request: &mut RequestAdapter,
        transport: &Transport<'_>,
    ) -> Result<Arc<Session>, SessionError> {
        let token = request
            .cookie(transport.cookie_name)
            .unwrap_or_default()
            .to_string();
        if !token.is_empty() {
            match self
                .store
                .load_session(&token, transport.sent_securely, SessionMechanism::Cookie)
                .await
            {
                Err(SessionError::NoSuchSession(_)) => {}
                loaded => return loaded,
            }
        }

        if request.headers_sent() {
            return Err(SessionError::TooLateForCookies);
        }
        if request.method() != "GET" {
            return Err(SessionError::NoSuchSession(format!(
                "cannot create a session on a {} request",
                request.method()
            )));
        }
        if !self.config.set_cookie_on_get {
            return Err(SessionError::NoSuchSession(
                "automatic session creation is disabled".to_string(),
            ));
        }

        let session = self
            .store
            .new_session(transport.sent_securely, SessionMechanism::Cookie)
            .await?;
        request.push_response_cookie(SetCookie {
            name: transport.cookie_name.to_string(),
            value: session.identifier().expose_secret().clone(),
            max_age: self.config.max_age,
            domain: self.config.cookie_domain.clone(),
            path: self.config.cookie_path.clone(),
            secure: transport.sent_securely,
            http_only: true,
        });
        tracing::info!(
            request_id = %request.request_id(),
            confidential = transport.sent_securely,
            "issued new session cookie"
        );
        Ok(session)
    }
}

#[async_trait]
impl ProcureSession for SessionProcurer {
    async fn procure(&self, request: &mut RequestAdapter) -> Result<Arc<Session>, SessionError> {
        let transport = self.transport(request).await;

        let token = request
            .header(transport.token_header)
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        match token {
            Some(token) => {
                tracing::debug!(
                    request_id = %request.request_id(),
                    confidential = transport.sent_securely,
                    "procuring session from token header"
                );
                self.store
                    .load_session(&token, transport.sent_securely, SessionMechanism::Header)
                    .await
            }
            None => self.procure_by_cookie(request, &transport).await,
        }
    }
}
