use std::fmt;

use crate::value::Value;

/// Error returned when a field value fails conversion or validation.
///
/// The message is meant for the person who filled in the form ("value must be
/// between 1 and 5"). It never echoes the rejected input back.
///
/// # Examples
///
/// ```
/// use session_requirer::{ValidationError, ValidationErrorKind};
///
/// let error = ValidationError::new(ValidationErrorKind::OutOfRange, "value must be between 1 and 5");
/// assert_eq!(error.kind(), ValidationErrorKind::OutOfRange);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    kind: ValidationErrorKind,
    message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A required field was not submitted.
    pub fn required() -> Self {
        Self::new(ValidationErrorKind::Required, "field required")
    }

    /// The submitted value could not be converted to `expected`.
    pub fn invalid_type(expected: &str) -> Self {
        Self::new(ValidationErrorKind::InvalidType, format!("expected {}", expected))
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ValidationErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed ({}): {}", self.kind, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Kind of validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A required value was not supplied.
    Required,
    /// The value could not be converted to the declared type.
    InvalidType,
    /// A number fell outside its declared bounds.
    OutOfRange,
    /// The request body could not be decoded.
    MalformedBody,
    /// Input is empty or contains only whitespace.
    Empty,
    /// Input exceeds maximum allowed length.
    TooLong,
    /// Input contains control or non-printable characters.
    ContainsControlChars,
    /// A custom validator rejected the value.
    Invalid,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::InvalidType => write!(f, "invalid type"),
            Self::OutOfRange => write!(f, "out of range"),
            Self::MalformedBody => write!(f, "malformed body"),
            Self::Empty => write!(f, "empty input"),
            Self::TooLong => write!(f, "input too long"),
            Self::ContainsControlChars => write!(f, "contains control characters"),
            Self::Invalid => write!(f, "invalid input"),
        }
    }
}

/// A post-conversion check on a field value.
///
/// Validators run in the order they were attached to a field, each receiving
/// the previous one's output. Closures of the right shape are validators:
///
/// ```
/// use session_requirer::{Field, Value, ValidationError, ValidationErrorKind};
///
/// let even = Field::integer().validate(|value: Value| match value.as_integer() {
///     Some(n) if n % 2 == 0 => Ok(value),
///     _ => Err(ValidationError::new(ValidationErrorKind::Invalid, "must be even")),
/// });
/// ```
pub trait Validator: Send + Sync {
    /// Checks (and possibly normalizes) a converted value.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the value is not acceptable.
    fn validate(&self, value: Value) -> Result<Value, ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(Value) -> Result<Value, ValidationError> + Send + Sync,
{
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        self(value)
    }
}

/// A text validator that enforces basic safety and length constraints.
///
/// - Trims leading and trailing whitespace
/// - Rejects empty strings (after trimming)
/// - Rejects strings containing control or non-printable characters
/// - Enforces a maximum length in characters
///
/// # Examples
///
/// ```
/// use session_requirer::{TextSanitizer, Validator, Value};
///
/// let sanitizer = TextSanitizer::new(32);
/// let value = sanitizer.validate(Value::Text("  Pizza  ".to_string())).unwrap();
/// assert_eq!(value.as_text(), Some("Pizza"));
///
/// assert!(sanitizer.validate(Value::Text("   ".to_string())).is_err());
/// assert!(sanitizer.validate(Value::Text("a\nb".to_string())).is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TextSanitizer {
    max_len: usize,
}

impl TextSanitizer {
    /// Creates a sanitizer with the given maximum length in characters.
    ///
    /// # Panics
    ///
    /// Panics if `max_len` is 0.
    pub fn new(max_len: usize) -> Self {
        assert!(max_len > 0, "max_len must be greater than 0");
        Self { max_len }
    }

    /// Creates a sanitizer with the default maximum length of 256 characters.
    pub fn default_limits() -> Self {
        Self::new(256)
    }

    fn is_control_char(c: char) -> bool {
        c.is_control() || c == '\u{007F}'
    }
}

impl Validator for TextSanitizer {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let raw = match value {
            Value::Text(text) => text,
            _ => return Err(ValidationError::invalid_type("text")),
        };

        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::new(
                ValidationErrorKind::Empty,
                "input is empty or contains only whitespace",
            ));
        }

        if trimmed.chars().any(Self::is_control_char) {
            return Err(ValidationError::new(
                ValidationErrorKind::ContainsControlChars,
                "input contains control or non-printable characters",
            ));
        }

        if trimmed.chars().count() > self.max_len {
            return Err(ValidationError::new(
                ValidationErrorKind::TooLong,
                format!("input exceeds maximum length of {}", self.max_len),
            ));
        }

        Ok(Value::Text(trimmed.to_string()))
    }
}

/// Checks `value` against optional inclusive bounds.
pub(crate) fn check_bounds<T>(value: T, minimum: Option<T>, maximum: Option<T>) -> Result<T, ValidationError>
where
    T: PartialOrd + fmt::Display + Copy,
{
    let message = match (minimum, maximum) {
        (Some(min), Some(max)) if value < min || value > max => {
            format!("value must be between {} and {}", min, max)
        }
        (Some(min), None) if value < min => format!("value must be at least {}", min),
        (None, Some(max)) if value > max => format!("value must be at most {}", max),
        _ => return Ok(value),
    };
    Err(ValidationError::new(ValidationErrorKind::OutOfRange, message))
}
