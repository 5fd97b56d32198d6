use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;

use crate::secret::Secret;
use crate::tainted::Tainted;
use crate::validate::{check_bounds, ValidationError, Validator};
use crate::value::Value;
use crate::web::{RawValue, Source};

use super::{Descriptor, ResolveContext, Resolved};

#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldKind {
    Text,
    Password,
    Integer {
        minimum: Option<i64>,
        maximum: Option<i64>,
    },
    Float {
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    Json,
}

/// A form or JSON body field, converted and validated.
///
/// Fields are required unless marked [`optional`](Self::optional) or given a
/// [`default`](Self::default). The parameter name is also the field's name in
/// the request unless overridden with [`form_name`](Self::form_name).
///
/// When a name occurs several times, the first value wins.
///
/// # Examples
///
/// ```
/// use session_requirer::{Field, Source, TextSanitizer, Value};
///
/// let name = Field::text().validate(TextSanitizer::default_limits());
/// let rating = Field::integer_in(1..=5);
/// let page = Field::integer().source(Source::Query).default(Value::Integer(1));
/// ```
pub struct Field {
    kind: FieldKind,
    source: Source,
    form_name: Option<String>,
    required: bool,
    default: Option<Value>,
    validators: Vec<Arc<dyn Validator>>,
}

impl Field {
    fn of_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            source: Source::Any,
            form_name: None,
            required: true,
            default: None,
            validators: Vec::new(),
        }
    }

    /// A text field.
    pub fn text() -> Self {
        Self::of_kind(FieldKind::Text)
    }

    /// A text field whose value is kept out of logs and `Debug` output.
    pub fn password() -> Self {
        Self::of_kind(FieldKind::Password)
    }

    /// An unbounded integer field.
    pub fn integer() -> Self {
        Self::bounded_integer(None, None)
    }

    /// An integer field with inclusive bounds.
    pub fn integer_in(range: RangeInclusive<i64>) -> Self {
        Self::bounded_integer(Some(*range.start()), Some(*range.end()))
    }

    /// An integer field with optional inclusive bounds.
    pub fn bounded_integer(minimum: Option<i64>, maximum: Option<i64>) -> Self {
        Self::of_kind(FieldKind::Integer { minimum, maximum })
    }

    /// An unbounded floating-point field.
    pub fn float() -> Self {
        Self::bounded_float(None, None)
    }

    /// A floating-point field with optional inclusive bounds.
    pub fn bounded_float(minimum: Option<f64>, maximum: Option<f64>) -> Self {
        Self::of_kind(FieldKind::Float { minimum, maximum })
    }

    /// A field taken as-is from a JSON body (or as a string from a form).
    pub fn json() -> Self {
        Self::of_kind(FieldKind::Json)
    }

    /// Makes the field optional. A missing value resolves to `Value::Absent`.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Makes the field optional with a default for a missing value.
    ///
    /// Defaults are not passed through validators.
    #[must_use]
    pub fn default(mut self, value: Value) -> Self {
        self.required = false;
        self.default = Some(value);
        self
    }

    /// Restricts where the value is looked up. Defaults to [`Source::Any`].
    #[must_use]
    pub fn source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// Reads the value from a differently-named request field.
    #[must_use]
    pub fn form_name(mut self, name: impl Into<String>) -> Self {
        self.form_name = Some(name.into());
        self
    }

    /// Appends a validator that runs after conversion.
    #[must_use]
    pub fn validate(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Returns `true` unless the field is optional.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Converts and validates a raw value.
    pub(crate) fn extract(&self, raw: Option<Tainted<RawValue>>) -> Result<Value, ValidationError> {
        let Some(raw) = raw else {
            return match (&self.default, self.required) {
                (Some(value), _) => Ok(value.clone()),
                (None, true) => Err(ValidationError::required()),
                (None, false) => Ok(Value::Absent),
            };
        };

        let value = self.convert(raw.into_inner())?;
        self.validators
            .iter()
            .try_fold(value, |value, validator| validator.validate(value))
    }

    fn convert(&self, raw: RawValue) -> Result<Value, ValidationError> {
        match self.kind {
            FieldKind::Text => text_of(raw).map(Value::Text),
            FieldKind::Password => {
                text_of(raw).map(|text| Value::Secret(Arc::new(Secret::new(text))))
            }
            FieldKind::Integer { minimum, maximum } => {
                let number = integer_of(raw)?;
                check_bounds(number, minimum, maximum).map(Value::Integer)
            }
            FieldKind::Float { minimum, maximum } => {
                let number = float_of(raw)?;
                check_bounds(number, minimum, maximum).map(Value::Float)
            }
            FieldKind::Json => Ok(match raw {
                RawValue::Text(text) => Value::Json(serde_json::Value::String(text)),
                RawValue::Json(json) => Value::Json(json),
            }),
        }
    }
}

fn text_of(raw: RawValue) -> Result<String, ValidationError> {
    match raw {
        RawValue::Text(text) | RawValue::Json(serde_json::Value::String(text)) => Ok(text),
        RawValue::Json(_) => Err(ValidationError::invalid_type("text")),
    }
}

fn integer_of(raw: RawValue) -> Result<i64, ValidationError> {
    let parsed = match raw {
        RawValue::Text(text) | RawValue::Json(serde_json::Value::String(text)) => {
            text.trim().parse::<i64>().ok()
        }
        RawValue::Json(serde_json::Value::Number(number)) => number.as_i64(),
        RawValue::Json(_) => None,
    };
    parsed.ok_or_else(|| ValidationError::invalid_type("an integer"))
}

fn float_of(raw: RawValue) -> Result<f64, ValidationError> {
    let parsed = match raw {
        RawValue::Text(text) | RawValue::Json(serde_json::Value::String(text)) => {
            text.trim().parse::<f64>().ok()
        }
        RawValue::Json(serde_json::Value::Number(number)) => number.as_f64(),
        RawValue::Json(_) => None,
    };
    parsed
        .filter(|number| number.is_finite())
        .ok_or_else(|| ValidationError::invalid_type("a number"))
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("form_name", &self.form_name)
            .field("required", &self.required)
            .field("validators", &self.validators.len())
            .finish()
    }
}

#[async_trait]
impl<C: Sync + 'static> Descriptor<C> for Field {
    async fn resolve(&self, cx: &ResolveContext<'_, C>) -> Resolved {
        let wire_name = self.form_name.as_deref().unwrap_or(cx.name());
        let outcome = cx
            .inputs()
            .lookup(self.source, wire_name)
            .and_then(|raw| self.extract(raw));

        match outcome {
            Ok(value) => Resolved::Value(value),
            Err(error) => Resolved::Invalid(error),
        }
    }
}
