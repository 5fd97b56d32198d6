use std::fmt;

/// A wrapper for request input that has not been through a descriptor yet.
///
/// Everything a client sends (query parameters, form fields, JSON body members,
/// headers) reaches the crate as `Tainted<T>`. Only descriptors inside this
/// crate can unwrap it, and they only hand the result to a handler after it
/// has been converted and validated.
///
/// # Security Properties
///
/// - Does NOT implement `Deref` or any implicit conversion traits
/// - Inner value is inaccessible outside the crate
///
/// # Examples
///
/// ```
/// use session_requirer::Tainted;
///
/// let rating = Tainted::new("6".to_string());
/// println!("{:?}", rating); // Tainted { inner: "6" }
///
/// // let n: String = rating; // Won't compile!
/// ```
// BREAKING CHANGE WARNING: Do NOT remove Clone - a field is re-read when several
// descriptors name the same input.
#[derive(Clone, PartialEq)]
pub struct Tainted<T> {
    // BREAKING CHANGE WARNING: This field MUST remain private.
    // External code must go through a Descriptor to obtain a usable value.
    inner: T,
}

impl<T> Tainted<T> {
    /// Wraps an untrusted value in `Tainted`.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    /// Extracts the inner value for conversion.
    ///
    /// Only field converters call this, immediately before validating the
    /// value.
    pub(crate) fn into_inner(self) -> T {
        self.inner
    }

    /// Borrows the inner value for crate-internal comparisons (CSRF tokens).
    pub(crate) fn peek(&self) -> &T {
        &self.inner
    }

    /// Transforms the tainted value without releasing it.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tainted<U> {
        Tainted { inner: f(self.inner) }
    }
}

// BREAKING CHANGE WARNING: Do NOT add Deref, AsRef, Borrow, From<T>, Into<T>, or any other
// implicit conversion traits to Tainted<T>. These would let raw request input reach a
// handler without passing through validation.

impl<T: fmt::Debug> fmt::Debug for Tainted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tainted")
            .field("inner", &self.inner)
            .finish()
    }
}
