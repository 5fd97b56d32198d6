use std::fmt;

use crate::validate::ValidationError;

/// One field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    /// The parameter name of the failing descriptor.
    pub field: String,
    /// Why it failed.
    pub error: ValidationError,
}

/// Every validation error of one request, in declaration order.
///
/// Handed to the route's validation-failure handler, which typically
/// re-renders the form with a message next to each failing field.
///
/// # Examples
///
/// ```ignore
/// fn on_invalid(request: &RequestAdapter, failures: ValidationFailures) -> Response {
///     let mut page = FormPage::new();
///     for failure in failures.iter() {
///         page.error(&failure.field, failure.error.message());
///     }
///     page.into_response()
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationFailures {
    failures: Vec<FieldFailure>,
}

impl ValidationFailures {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, field: impl Into<String>, error: ValidationError) {
        self.failures.push(FieldFailure {
            field: field.into(),
            error,
        });
    }

    /// Returns `true` if nothing failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failing fields.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Failures in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldFailure> {
        self.failures.iter()
    }

    /// The error for `field`, if it failed.
    pub fn get(&self, field: &str) -> Option<&ValidationError> {
        self.failures
            .iter()
            .find(|failure| failure.field == field)
            .map(|failure| &failure.error)
    }

    /// Names of the failing fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|failure| failure.field.as_str())
    }

    /// Consumes the collection.
    pub fn into_vec(self) -> Vec<FieldFailure> {
        self.failures
    }
}

impl fmt::Display for ValidationFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} invalid field(s)", self.failures.len())?;
        for (index, failure) in self.failures.iter().enumerate() {
            let separator = if index == 0 { ": " } else { "; " };
            write!(f, "{}{}: {}", separator, failure.field, failure.error.message())?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ValidationFailures {
    type Item = &'a FieldFailure;
    type IntoIter = std::slice::Iter<'a, FieldFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.iter()
    }
}
