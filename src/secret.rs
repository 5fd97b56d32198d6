use std::fmt;

/// A wrapper that keeps session tokens and password fields out of logs.
///
/// `Secret<T>` holds values that would let anyone who sees them act on behalf
/// of a client: session identifiers, submitted passwords, API keys. The wrapped
/// value can only be read through [`expose_secret`](Self::expose_secret).
///
/// # Security Properties
///
/// - Does NOT implement `Deref`, `AsRef`, `Borrow`, `Clone`, or `Copy`
/// - Debug and Display output is always `[REDACTED]`
/// - No type information is leaked in formatted output
///
/// # Examples
///
/// ```
/// use session_requirer::Secret;
///
/// let token = Secret::new("3f9a0c".to_string());
///
/// assert_eq!(format!("{:?}", token), "[REDACTED]");
/// assert_eq!(format!("{}", token), "[REDACTED]");
/// assert_eq!(token.expose_secret(), "3f9a0c");
/// ```
// BREAKING CHANGE WARNING: Do NOT add Clone, Copy, or Default derives.
// Sessions are shared through `Arc<Session>`; the token itself is never duplicated.
pub struct Secret<T> {
    inner: T,
}

impl<T> Secret<T> {
    /// Wraps a sensitive value in a `Secret`.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    /// Explicitly exposes the secret value.
    ///
    /// The verbose name makes every read site easy to audit. Do not log the
    /// returned value.
    pub fn expose_secret(&self) -> &T {
        &self.inner
    }

    /// Consumes the wrapper and returns the secret value.
    pub fn into_exposed(self) -> T {
        self.inner
    }
}

impl Secret<String> {
    /// Compares a presented token against this secret without short-circuiting
    /// on the first differing byte.
    ///
    /// Used for CSRF tokens, which an attacker may try to guess byte by byte.
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.inner.as_bytes();
        let presented = presented.as_bytes();
        if expected.len() != presented.len() {
            return false;
        }
        expected
            .iter()
            .zip(presented)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

// BREAKING CHANGE WARNING: Do NOT implement Deref, AsRef, Borrow, or a Debug/Display
// that shows the value. The ONLY access is through expose_secret().

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
