use async_trait::async_trait;

use crate::error::{Denial, DenialKind};
use crate::session::SessionMechanism;
use crate::value::Value;
use crate::web::{RawValue, Source};

use super::{Descriptor, ResolveContext, Resolved};

/// Form field that must carry the session identifier on unsafe requests.
pub const CSRF_FIELD: &str = "__csrf_protection__";

/// Cross-site request forgery check.
///
/// Requests other than `GET` and `HEAD` from a cookie-based session must
/// submit the session identifier in the [`CSRF_FIELD`] field. Header-based
/// sessions are exempt: a cross-site form cannot set custom headers.
///
/// Resolves to `Value::Absent`; it is normally declared as a prerequisite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Csrf;

impl Csrf {
    /// Creates the check.
    pub fn new() -> Self {
        Self
    }
}

fn is_safe_method(method: &str) -> bool {
    matches!(method, "GET" | "HEAD")
}

#[async_trait]
impl<C: Sync + 'static> Descriptor<C> for Csrf {
    async fn resolve(&self, cx: &ResolveContext<'_, C>) -> Resolved {
        let session = cx.session();
        if is_safe_method(cx.request().method())
            || session.mechanism() == SessionMechanism::Header
        {
            return Resolved::Value(Value::Absent);
        }

        let presented = match cx.inputs().lookup(Source::Any, CSRF_FIELD) {
            Ok(Some(raw)) => match raw.peek() {
                RawValue::Text(token) => Some(session.identifier().matches(token)),
                RawValue::Json(serde_json::Value::String(token)) => {
                    Some(session.identifier().matches(token))
                }
                RawValue::Json(_) => Some(false),
            },
            Ok(None) | Err(_) => None,
        };

        match presented {
            Some(true) => Resolved::Value(Value::Absent),
            Some(false) => Resolved::Denied(Denial::new(
                cx.name(),
                DenialKind::CrossSiteRequestForgery,
                "CSRF token does not match the session",
            )),
            None => Resolved::Denied(Denial::new(
                cx.name(),
                DenialKind::CrossSiteRequestForgery,
                "CSRF token missing",
            )),
        }
    }
}
