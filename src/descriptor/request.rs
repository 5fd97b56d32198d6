use std::any::{type_name, TypeId};

use async_trait::async_trait;

use crate::validate::{ValidationError, ValidationErrorKind};
use crate::value::Value;

use super::{Descriptor, ResolveContext, Resolved};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Url,
    Component {
        type_id: TypeId,
        type_name: &'static str,
    },
}

/// Injects parts of the request itself rather than client-submitted fields.
///
/// # Examples
///
/// ```
/// use session_requirer::{RequestValue, RequirementSet};
///
/// struct Tenant;
///
/// let set = RequirementSet::<()>::builder()
///     .require("here", RequestValue::url())
///     .require("tenant", RequestValue::component::<Tenant>())
///     .build()
///     .unwrap();
/// assert_eq!(set.len(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestValue {
    part: Part,
}

impl RequestValue {
    /// The URL the client requested, as `Value::Url`.
    pub fn url() -> Self {
        Self { part: Part::Url }
    }

    /// The extension of type `T` attached with
    /// [`RequestAdapter::insert_extension`](crate::web::RequestAdapter::insert_extension),
    /// as `Value::Capability`, or `Value::Absent` when none was attached.
    pub fn component<T: Send + Sync + 'static>() -> Self {
        Self {
            part: Part::Component {
                type_id: TypeId::of::<T>(),
                type_name: type_name::<T>(),
            },
        }
    }
}

#[async_trait]
impl<C: Sync + 'static> Descriptor<C> for RequestValue {
    async fn resolve(&self, cx: &ResolveContext<'_, C>) -> Resolved {
        match self.part {
            Part::Url => match cx.request().url() {
                Ok(url) => Resolved::Value(Value::Url(url)),
                Err(_) => Resolved::Invalid(ValidationError::new(
                    ValidationErrorKind::Invalid,
                    "request URL could not be decoded",
                )),
            },
            Part::Component { type_id, type_name } => {
                let found = cx.request().extension_by_type(type_id).cloned();
                if found.is_none() {
                    tracing::debug!(
                        request_id = %cx.request().request_id(),
                        component = type_name,
                        "request component not attached"
                    );
                }
                Resolved::Value(found.map_or(Value::Absent, Value::Capability))
            }
        }
    }
}
