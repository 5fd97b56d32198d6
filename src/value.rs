//! Resolved values and the bundle handed to a route handler.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::secret::Secret;
use crate::session::Session;

/// A value produced by resolving one descriptor.
#[derive(Debug, Clone)]
pub enum Value {
    /// Text from a text field.
    Text(String),
    /// Text from a password field; redacted in `Debug` output.
    Secret(Arc<Secret<String>>),
    /// An integer field.
    Integer(i64),
    /// A floating-point field.
    Float(f64),
    /// A boolean, e.g. the session's confidentiality flag.
    Bool(bool),
    /// An arbitrary JSON member from a JSON request body.
    Json(serde_json::Value),
    /// The session procured for this request.
    Session(Arc<Session>),
    /// The URL the client requested.
    Url(Url),
    /// A capability granted by an authorizer.
    Capability(Capability),
    /// An optional value that was not supplied or not granted.
    Absent,
}

impl Value {
    /// Returns the text if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the integer if this is an `Integer` value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the number if this is a `Float` value.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the flag if this is a `Bool` value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns `true` for `Value::Absent`.
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }
}

/// A capability object granted by an authorizer.
///
/// Capabilities are type-erased while they travel through the resolution
/// pipeline and recovered with [`Capability::downcast`] in the handler.
///
/// # Examples
///
/// ```
/// use session_requirer::Capability;
///
/// struct FoodCritic { name: String }
///
/// let cap = Capability::new(FoodCritic { name: "Ada".into() });
/// assert_eq!(cap.downcast::<FoodCritic>().unwrap().name, "Ada");
/// assert!(cap.downcast::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct Capability {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Capability {
    /// Wraps a capability object.
    pub fn new<T: Send + Sync + 'static>(capability: T) -> Self {
        Self::from_arc(Arc::new(capability))
    }

    /// Wraps a capability object that is already shared.
    pub fn from_arc<T: Send + Sync + 'static>(capability: Arc<T>) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: capability,
        }
    }

    /// The Rust type name of the wrapped capability.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the capability is a `T`.
    pub fn is<T: 'static>(&self) -> bool {
        (*self.inner).type_id() == TypeId::of::<T>()
    }

    /// Recovers the concrete capability.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// The values handed to a route handler, in declaration order.
///
/// A bundle only exists once every descriptor of a requirement set has
/// resolved. Prerequisites are not included.
///
/// # Examples
///
/// ```ignore
/// async fn rate_food(bundle: Bundle) -> String {
///     let name = bundle.text("name").unwrap_or_default();
///     let rating = bundle.integer("rating").unwrap_or_default();
///     format!("{} rated {}", name, rating)
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct Bundle {
    entries: Vec<(String, Value)>,
}

impl Bundle {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.entries.push((name.into(), value));
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the requirement set declared no descriptors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Looks up a value by parameter name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Removes and returns a value by parameter name.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Text value of `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }

    /// Password value of `name`.
    pub fn secret(&self, name: &str) -> Option<&Secret<String>> {
        match self.get(name) {
            Some(Value::Secret(secret)) => Some(secret.as_ref()),
            _ => None,
        }
    }

    /// Integer value of `name`.
    pub fn integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_integer)
    }

    /// Float value of `name`.
    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    /// Boolean value of `name`.
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// JSON value of `name`.
    pub fn json(&self, name: &str) -> Option<&serde_json::Value> {
        match self.get(name) {
            Some(Value::Json(json)) => Some(json),
            _ => None,
        }
    }

    /// Request URL injected under `name`.
    pub fn url(&self, name: &str) -> Option<&Url> {
        match self.get(name) {
            Some(Value::Url(url)) => Some(url),
            _ => None,
        }
    }

    /// Session injected under `name`.
    pub fn session(&self, name: &str) -> Option<&Arc<Session>> {
        match self.get(name) {
            Some(Value::Session(session)) => Some(session),
            _ => None,
        }
    }

    /// Capability of type `T` injected under `name`.
    ///
    /// Returns `None` both for an optional authorization that was not granted
    /// and for a capability of a different type.
    pub fn capability<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        match self.get(name) {
            Some(Value::Capability(cap)) => cap.downcast::<T>(),
            _ => None,
        }
    }

    /// Returns `true` if `name` resolved to `Value::Absent`.
    pub fn is_absent(&self, name: &str) -> bool {
        self.get(name).is_some_and(Value::is_absent)
    }

    /// Consumes the bundle, returning `(name, value)` pairs in declaration order.
    pub fn into_values(self) -> Vec<(String, Value)> {
        self.entries
    }
}
