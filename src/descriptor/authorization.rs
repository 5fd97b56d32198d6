use std::any::{type_name, TypeId};
use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::{Denial, DenialKind};
use crate::value::Value;

use super::{Descriptor, ResolveContext, Resolved};

/// Injects the capability `T` granted by the registered authorizer for `T`.
///
/// A required authorization that is not granted denies the request. An
/// optional one resolves to `Value::Absent` instead. A capability type with
/// no registered authorizer is never granted.
///
/// # Examples
///
/// ```
/// use session_requirer::Authorization;
///
/// struct FoodCritic;
///
/// let critic = Authorization::<FoodCritic>::required();
/// assert!(critic.is_required());
/// ```
pub struct Authorization<T> {
    required: bool,
    _capability: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Authorization<T> {
    /// The request is denied unless the capability is granted.
    pub fn required() -> Self {
        Self {
            required: true,
            _capability: PhantomData,
        }
    }

    /// The capability is injected if granted, `Value::Absent` otherwise.
    pub fn optional() -> Self {
        Self {
            required: false,
            _capability: PhantomData,
        }
    }

    /// Returns `true` for a required authorization.
    pub fn is_required(&self) -> bool {
        self.required
    }
}

impl<T> fmt::Debug for Authorization<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("capability", &type_name::<T>())
            .field("required", &self.required)
            .finish()
    }
}

#[async_trait]
impl<C, T> Descriptor<C> for Authorization<T>
where
    C: Sync + 'static,
    T: Send + Sync + 'static,
{
    async fn resolve(&self, cx: &ResolveContext<'_, C>) -> Resolved {
        let decision = cx
            .authorizers()
            .authorize_type(TypeId::of::<T>(), type_name::<T>(), cx.authorize_context())
            .await;

        match decision {
            Ok(Some(capability)) => Resolved::Value(Value::Capability(capability)),
            Ok(None) if self.required => Resolved::Denied(Denial::new(
                cx.name(),
                DenialKind::Unauthorized {
                    capability: type_name::<T>(),
                },
                "capability not granted to this session",
            )),
            Ok(None) => Resolved::Value(Value::Absent),
            Err(error) => Resolved::Unavailable(error.into()),
        }
    }
}
