//! Request adapter for mapping HTTP requests to requirer types.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use crate::value::Capability;

// Header values never shown by `Debug`: they carry credentials.
const CREDENTIAL_HEADERS: &[&str] = &["authorization", "cookie"];

/// Adapter for converting framework-specific HTTP requests into the one
/// request shape the requirer understands.
///
/// `RequestAdapter` is the integration point between web frameworks and this
/// crate. It carries:
/// - The request ID, method, transport security flag, host and path
/// - Headers and cookies (read by the session procurer)
/// - Query parameters and the raw body (read by field descriptors)
/// - Response cookies set while a session was being procured
/// - Typed extensions the framework attaches for `RequestValue::component`
///
/// # Design Notes
///
/// This type holds simple, owned data so it does not couple to any
/// framework's request types. Framework-specific code should implement
/// `From<FrameworkRequest>` for `RequestAdapter`, and copy
/// [`response_cookies`](Self::response_cookies) onto the outgoing response.
///
/// # Examples
///
/// ```
/// use session_requirer::web::RequestAdapter;
///
/// let mut adapter = RequestAdapter::new("req-12345".to_string());
/// adapter.set_method("POST");
/// adapter.set_secure(true);
/// adapter.add_cookie("Requirer-Secure-Session".to_string(), "abc123".to_string());
/// adapter.set_body("application/x-www-form-urlencoded", "name=Pizza&rating=4");
///
/// assert_eq!(adapter.method(), "POST");
/// assert_eq!(adapter.cookie("Requirer-Secure-Session"), Some("abc123"));
/// ```
#[derive(Clone)]
pub struct RequestAdapter {
    /// Unique request identifier (required)
    request_id: String,
    /// Upper-cased HTTP method
    method: String,
    /// Whether the request arrived over an encrypted transport
    secure: bool,
    /// Request path, percent-encoded as it arrived
    path: String,
    /// Request headers, keyed by lower-cased name (all tainted)
    headers: HashMap<String, Vec<String>>,
    /// Request cookies (all tainted)
    cookies: HashMap<String, String>,
    /// Query parameters in arrival order; names may repeat (all tainted)
    query_params: Vec<(String, String)>,
    /// Raw request body (tainted)
    body: Bytes,
    /// Set once the response status line and headers have been written
    headers_sent: bool,
    /// Cookies to add to the response
    response_cookies: Vec<SetCookie>,
    /// Framework-supplied objects, keyed by type
    extensions: HashMap<TypeId, Capability>,
}

impl RequestAdapter {
    /// Creates a new request adapter for a `GET` over an insecure transport.
    ///
    /// Use builder-style methods to populate everything else.
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            method: "GET".to_string(),
            secure: false,
            path: "/".to_string(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            query_params: Vec::new(),
            body: Bytes::new(),
            headers_sent: false,
            response_cookies: Vec::new(),
            extensions: HashMap::new(),
        }
    }

    /// Sets the HTTP method.
    pub fn set_method(&mut self, method: &str) {
        self.method = method.to_ascii_uppercase();
    }

    /// Marks whether the request arrived over TLS.
    pub fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    /// Sets the request path (`/food/rate`). A missing leading `/` is added.
    pub fn set_path(&mut self, path: &str) {
        self.path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
    }

    /// Attaches a framework object that descriptors can look up by type.
    ///
    /// A second value of the same type replaces the first.
    pub fn insert_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions
            .insert(TypeId::of::<T>(), Capability::new(value));
    }

    /// Adds a header value. Header names are case-insensitive.
    pub fn add_header(&mut self, key: String, value: String) {
        self.headers
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value);
    }

    /// Adds a request cookie.
    pub fn add_cookie(&mut self, name: String, value: String) {
        self.cookies.insert(name, value);
    }

    /// Adds a query parameter. Repeated names are kept in order.
    pub fn add_query_param(&mut self, key: String, value: String) {
        self.query_params.push((key, value));
    }

    /// Parses and adds every parameter of a raw query string (`a=1&b=2`).
    pub fn set_query_string(&mut self, query: &str) {
        self.query_params.extend(
            url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()).into_owned(),
        );
    }

    /// Sets the request body and its `Content-Type`.
    pub fn set_body(&mut self, content_type: &str, body: impl Into<Bytes>) {
        self.headers
            .insert("content-type".to_string(), vec![content_type.to_string()]);
        self.body = body.into();
    }

    /// Records that the response headers have already been written.
    ///
    /// After this, a new cookie-based session can no longer be created.
    pub fn mark_headers_sent(&mut self) {
        self.headers_sent = true;
    }

    /// Queues a cookie to be set on the response.
    pub fn push_response_cookie(&mut self, cookie: SetCookie) {
        self.response_cookies.push(cookie);
    }

    /// Returns a reference to the request ID.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the upper-cased HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns `true` if the request arrived over an encrypted transport.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Returns the first value of a header.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.header_values(key).first().map(String::as_str)
    }

    /// Returns every value of a header.
    pub fn header_values(&self, key: &str) -> &[String] {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns a request cookie.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Returns the `Content-Type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns the request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the `Host` header, or `localhost` when the client sent none.
    pub fn host(&self) -> &str {
        self.header("host").unwrap_or("localhost")
    }

    /// Reconstructs the URL the client requested.
    ///
    /// The scheme follows the transport, the host comes from the `Host`
    /// header, and the query string is rebuilt from the query parameters.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the `Host` header is not a valid authority.
    pub fn url(&self) -> Result<Url, url::ParseError> {
        let scheme = if self.secure { "https" } else { "http" };
        let mut url = Url::parse(&format!("{}://{}", scheme, self.host()))?;
        url.set_path(&self.path);
        if !self.query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query_params);
        }
        Ok(url)
    }

    /// Returns the extension of type `T`, if one was attached.
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.extension_by_type(TypeId::of::<T>())
            .and_then(Capability::downcast::<T>)
    }

    pub(crate) fn extension_by_type(&self, type_id: TypeId) -> Option<&Capability> {
        self.extensions.get(&type_id)
    }

    /// Returns the raw query parameters.
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query_params
    }

    /// Returns the raw body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` once the response headers have been written.
    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Cookies that must be added to the response.
    pub fn response_cookies(&self) -> &[SetCookie] {
        &self.response_cookies
    }
}

fn is_credential_header(name: &str) -> bool {
    CREDENTIAL_HEADERS.contains(&name) || name.ends_with("auth-token")
}

// Cookie values and token headers are live session identifiers.
impl fmt::Debug for RequestAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: HashMap<&str, Vec<&str>> = self
            .headers
            .iter()
            .map(|(name, values)| {
                let shown = if is_credential_header(name) {
                    vec!["[REDACTED]"; values.len()]
                } else {
                    values.iter().map(String::as_str).collect()
                };
                (name.as_str(), shown)
            })
            .collect();
        let cookies: HashMap<&str, &str> = self
            .cookies
            .keys()
            .map(|name| (name.as_str(), "[REDACTED]"))
            .collect();

        f.debug_struct("RequestAdapter")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("secure", &self.secure)
            .field("path", &self.path)
            .field("headers", &headers)
            .field("cookies", &cookies)
            .field("query_params", &self.query_params)
            .field("body_len", &self.body.len())
            .field("headers_sent", &self.headers_sent)
            .field("response_cookies", &self.response_cookies)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

/// A `Set-Cookie` directive produced while procuring a session.
#[derive(Clone, PartialEq, Eq)]
pub struct SetCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value (a session identifier).
    pub value: String,
    /// `Max-Age` in seconds.
    pub max_age: u64,
    /// Optional `Domain` attribute.
    pub domain: Option<String>,
    /// `Path` attribute.
    pub path: String,
    /// Whether to send the `Secure` attribute.
    pub secure: bool,
    /// Whether to send the `HttpOnly` attribute.
    pub http_only: bool,
}

impl SetCookie {
    /// Renders the value of a `Set-Cookie` response header.
    pub fn header_value(&self) -> String {
        let mut out = format!("{}={}; Max-Age={}", self.name, self.value, self.max_age);
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        out.push_str("; Path=");
        out.push_str(&self.path);
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

// The value is a live session token.
impl fmt::Debug for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetCookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("max_age", &self.max_age)
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .finish()
    }
}
