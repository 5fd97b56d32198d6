use async_trait::async_trait;

use crate::validate::{ValidationError, ValidationErrorKind};
use crate::value::Value;

use super::{Descriptor, ResolveContext, Resolved};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fact {
    Session,
    IsConfidential,
    RequireConfidential,
}

/// Injects facts about the session procured for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionValue {
    fact: Fact,
}

impl SessionValue {
    /// The session itself, as `Value::Session`.
    pub fn session() -> Self {
        Self {
            fact: Fact::Session,
        }
    }

    /// Whether the session is confidential, as `Value::Bool`.
    pub fn is_confidential() -> Self {
        Self {
            fact: Fact::IsConfidential,
        }
    }

    /// The session, but only if it is confidential.
    ///
    /// Used as a prerequisite, this keeps a route off plain HTTP.
    pub fn require_confidential() -> Self {
        Self {
            fact: Fact::RequireConfidential,
        }
    }
}

#[async_trait]
impl<C: Sync + 'static> Descriptor<C> for SessionValue {
    async fn resolve(&self, cx: &ResolveContext<'_, C>) -> Resolved {
        let session = cx.session();
        match self.fact {
            Fact::Session => Resolved::Value(Value::Session(session.clone())),
            Fact::IsConfidential => Resolved::Value(Value::Bool(session.is_confidential())),
            Fact::RequireConfidential if session.is_confidential() => {
                Resolved::Value(Value::Session(session.clone()))
            }
            Fact::RequireConfidential => Resolved::Invalid(ValidationError::new(
                ValidationErrorKind::Invalid,
                "a confidential session is required",
            )),
        }
    }
}
