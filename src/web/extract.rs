//! Extraction boundary for request inputs.
//!
//! This module collects everything a client can control in a request's query
//! string and body into one `RequestInputs` value. Every lookup hands back a
//! `Tainted` value; only field descriptors unwrap it.

use std::convert::Infallible;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Map;

use crate::tainted::Tainted;
use crate::validate::{ValidationError, ValidationErrorKind};

use super::RequestAdapter;

/// Where a field descriptor looks for its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Source {
    /// The form-encoded or JSON request body.
    Body,
    /// The query string.
    Query,
    /// Merged request arguments: form body values override query values,
    /// and a JSON body is the only source.
    #[default]
    Any,
}

/// A raw input value, before conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// A string from the query string or a form-encoded body.
    Text(String),
    /// A member of a JSON object body.
    Json(serde_json::Value),
}

/// The decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyInputs {
    /// No body was sent.
    Empty,
    /// A form-encoded or multipart body, in arrival order.
    Form(Vec<(String, String)>),
    /// A JSON object body.
    Json(Map<String, serde_json::Value>),
    /// A body that could not be decoded.
    Undecodable(&'static str),
}

/// All untrusted inputs of one request, decoded once.
///
/// # Examples
///
/// ```
/// use session_requirer::web::{ExtractInputs, RequestAdapter, Source};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut adapter = RequestAdapter::new("req-1".to_string());
/// adapter.set_query_string("rating=4");
/// let inputs = adapter.extract_inputs().await;
///
/// assert!(inputs.lookup(Source::Query, "rating").unwrap().is_some());
/// assert!(inputs.lookup(Source::Query, "name").unwrap().is_none());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RequestInputs {
    query: Vec<(String, String)>,
    body: BodyInputs,
}

impl RequestInputs {
    /// Builds inputs from already-decoded parts.
    pub fn new(query: Vec<(String, String)>, body: BodyInputs) -> Self {
        Self { query, body }
    }

    /// The decoded body.
    pub fn body(&self) -> &BodyInputs {
        &self.body
    }

    /// Looks up the first value named `name` in `source`.
    ///
    /// A JSON `null` counts as not supplied.
    ///
    /// # Errors
    ///
    /// Returns a `MalformedBody` validation error when the body has to be
    /// consulted and it could not be decoded.
    pub fn lookup(
        &self,
        source: Source,
        name: &str,
    ) -> Result<Option<Tainted<RawValue>>, ValidationError> {
        match source {
            Source::Query => Ok(self.query_value(name)),
            Source::Body => self.body_value(name),
            Source::Any => match &self.body {
                BodyInputs::Empty => Ok(self.query_value(name)),
                BodyInputs::Form(_) => match self.body_value(name)? {
                    Some(value) => Ok(Some(value)),
                    None => Ok(self.query_value(name)),
                },
                BodyInputs::Json(_) | BodyInputs::Undecodable(_) => self.body_value(name),
            },
        }
    }

    fn query_value(&self, name: &str) -> Option<Tainted<RawValue>> {
        first_pair(&self.query, name)
    }

    fn body_value(&self, name: &str) -> Result<Option<Tainted<RawValue>>, ValidationError> {
        match &self.body {
            BodyInputs::Empty => Ok(None),
            BodyInputs::Form(pairs) => Ok(first_pair(pairs, name)),
            BodyInputs::Json(object) => Ok(object
                .get(name)
                .filter(|value| !value.is_null())
                .map(|value| Tainted::new(RawValue::Json(value.clone())))),
            BodyInputs::Undecodable(reason) => Err(ValidationError::new(
                ValidationErrorKind::MalformedBody,
                *reason,
            )),
        }
    }
}

fn first_pair(pairs: &[(String, String)], name: &str) -> Option<Tainted<RawValue>> {
    pairs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| Tainted::new(RawValue::Text(value.clone())))
}

/// Extracts untrusted inputs from a request.
///
/// All extracted inputs are wrapped in `Tainted<T>` so they cannot reach a
/// handler without passing through a descriptor.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use session_requirer::web::{ExtractInputs, RequestAdapter, RequestInputs};
/// use std::collections::HashMap;
///
/// // Example framework-specific implementation
/// struct MyFrameworkRequest {
///     query: HashMap<String, String>,
/// }
///
/// #[async_trait]
/// impl ExtractInputs for MyFrameworkRequest {
///     async fn extract_inputs(&self) -> RequestInputs {
///         let mut adapter = RequestAdapter::new("req-1".to_string());
///         for (k, v) in &self.query {
///             adapter.add_query_param(k.clone(), v.clone());
///         }
///         adapter.extract_inputs().await
///     }
/// }
/// ```
#[async_trait]
pub trait ExtractInputs {
    /// Decodes the query string and body.
    async fn extract_inputs(&self) -> RequestInputs;
}

#[async_trait]
impl ExtractInputs for RequestAdapter {
    async fn extract_inputs(&self) -> RequestInputs {
        RequestInputs::new(self.query_params().to_vec(), decode_body(self).await)
    }
}

const UNDECODABLE: &str = "request body could not be decoded";

async fn decode_body(request: &RequestAdapter) -> BodyInputs {
    if request.body().is_empty() {
        return BodyInputs::Empty;
    }

    let content_type = request.content_type().unwrap_or_default();
    let media_type = content_type
        .split(';')
        .next()
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match media_type.as_str() {
        "application/x-www-form-urlencoded" => BodyInputs::Form(
            url::form_urlencoded::parse(request.body()).into_owned().collect(),
        ),
        "multipart/form-data" => match decode_multipart(content_type, request.body().clone()).await
        {
            Ok(pairs) => BodyInputs::Form(pairs),
            Err(error) => {
                tracing::debug!(
                    request_id = %request.request_id(),
                    error = %error,
                    "multipart body rejected"
                );
                BodyInputs::Undecodable(UNDECODABLE)
            }
        },
        json if json.starts_with("application/json") => {
            match serde_json::from_slice::<serde_json::Value>(request.body()) {
                Ok(serde_json::Value::Object(object)) => BodyInputs::Json(object),
                _ => BodyInputs::Undecodable(UNDECODABLE),
            }
        }
        _ => BodyInputs::Undecodable("unsupported request body content type"),
    }
}

/// Collects the named text parts of a multipart body. File uploads are
/// skipped.
async fn decode_multipart(
    content_type: &str,
    body: Bytes,
) -> Result<Vec<(String, String)>, multer::Error> {
    let boundary = multer::parse_boundary(content_type)?;
    let stream = futures_util::stream::iter([Ok::<Bytes, Infallible>(body)]);
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut pairs = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = match (field.name(), field.file_name()) {
            (Some(name), None) => name.to_string(),
            _ => continue,
        };
        pairs.push((name, field.text().await?));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(raw: Option<Tainted<RawValue>>) -> Option<String> {
        match raw.map(Tainted::into_inner) {
            Some(RawValue::Text(s)) => Some(s),
            other => panic!("expected text, got {:?}", other),
        }
    }

    fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, file_name, value) in parts {
            body.push_str(&format!("--{}\r\n", boundary));
            match file_name {
                Some(file_name) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    name, file_name
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    name
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", boundary));
        body
    }

    #[tokio::test]
    async fn empty_request_has_no_inputs() {
        let adapter = RequestAdapter::new("req-1".to_string());
        let inputs = adapter.extract_inputs().await;

        assert_eq!(inputs.body(), &BodyInputs::Empty);
        assert!(inputs.lookup(Source::Any, "name").unwrap().is_none());
    }

    #[tokio::test]
    async fn first_value_wins_for_repeated_names() {
        let mut adapter = RequestAdapter::new("req-1".to_string());
        adapter.set_query_string("rating=2&rating=5");

        let inputs = adapter.extract_inputs().await;
        assert_eq!(
            text(inputs.lookup(Source::Query, "rating").unwrap()),
            Some("2".to_string())
        );
    }

    #[tokio::test]
    async fn form_body_is_decoded() {
        let mut adapter = RequestAdapter::new("req-1".to_string());
        adapter.set_body(
            "application/x-www-form-urlencoded; charset=utf-8",
            "name=Deep+Dish&rating=4",
        );

        let inputs = adapter.extract_inputs().await;
        assert_eq!(
            text(inputs.lookup(Source::Body, "name").unwrap()),
            Some("Deep Dish".to_string())
        );
        assert!(inputs.lookup(Source::Query, "name").unwrap().is_none());
    }

    #[tokio::test]
    async fn any_prefers_form_body_over_query() {
        let mut adapter = RequestAdapter::new("req-1".to_string());
        adapter.set_method("POST");
        adapter.set_query_string("rating=1&page=2");
        adapter.set_body("application/x-www-form-urlencoded", "rating=5");

        let inputs = adapter.extract_inputs().await;
        assert_eq!(
            text(inputs.lookup(Source::Any, "rating").unwrap()),
            Some("5".to_string())
        );
        assert_eq!(
            text(inputs.lookup(Source::Any, "page").unwrap()),
            Some("2".to_string())
        );
        assert_eq!(
            text(inputs.lookup(Source::Query, "rating").unwrap()),
            Some("1".to_string())
        );
    }

    #[tokio::test]
    async fn any_reads_only_the_json_body() {
        let mut adapter = RequestAdapter::new("req-1".to_string());
        adapter.set_method("POST");
        adapter.set_query_string("rating=1&page=2");
        adapter.set_body("application/json", r#"{"rating": 5}"#);

        let inputs = adapter.extract_inputs().await;
        let rating = inputs.lookup(Source::Any, "rating").unwrap().unwrap();
        assert_eq!(rating.into_inner(), RawValue::Json(serde_json::json!(5)));
        assert!(inputs.lookup(Source::Any, "page").unwrap().is_none());
        assert!(inputs.lookup(Source::Query, "page").unwrap().is_some());
    }

    #[tokio::test]
    async fn json_body_members_are_looked_up() {
        let mut adapter = RequestAdapter::new("req-1".to_string());
        adapter.set_body("application/json", r#"{"rating": 4, "note": null}"#);

        let inputs = adapter.extract_inputs().await;
        let rating = inputs.lookup(Source::Body, "rating").unwrap().unwrap();
        assert_eq!(rating.into_inner(), RawValue::Json(serde_json::json!(4)));
        assert!(inputs.lookup(Source::Body, "note").unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_json_body_fails_body_lookups_only() {
        let mut adapter = RequestAdapter::new("req-1".to_string());
        adapter.set_query_string("page=2");
        adapter.set_body("application/json", "{not json");

        let inputs = adapter.extract_inputs().await;
        let error = inputs.lookup(Source::Body, "rating").unwrap_err();
        assert_eq!(error.kind(), ValidationErrorKind::MalformedBody);
        assert_eq!(error.message(), "request body could not be decoded");

        assert!(inputs.lookup(Source::Any, "page").is_err());
        assert!(inputs.lookup(Source::Query, "page").unwrap().is_some());
    }

    #[tokio::test]
    async fn json_array_body_is_undecodable() {
        let mut adapter = RequestAdapter::new("req-1".to_string());
        adapter.set_body("application/json", "[1, 2]");

        let inputs = adapter.extract_inputs().await;
        assert_eq!(
            inputs.body(),
            &BodyInputs::Undecodable("request body could not be decoded")
        );
    }

    #[tokio::test]
    async fn multipart_text_parts_are_decoded() {
        let body = multipart_body(
            "X-BOUNDARY",
            &[
                ("name", None, "Deep Dish"),
                ("photo", Some("pie.jpg"), "\u{1}\u{2}"),
                ("rating", None, "5"),
            ],
        );
        let mut adapter = RequestAdapter::new("req-1".to_string());
        adapter.set_method("POST");
        adapter.set_query_string("rating=1");
        adapter.set_body("multipart/form-data; boundary=X-BOUNDARY", body);

        let inputs = adapter.extract_inputs().await;
        assert_eq!(
            inputs.body(),
            &BodyInputs::Form(vec![
                ("name".to_string(), "Deep Dish".to_string()),
                ("rating".to_string(), "5".to_string()),
            ])
        );
        assert_eq!(
            text(inputs.lookup(Source::Any, "rating").unwrap()),
            Some("5".to_string())
        );
    }

    #[tokio::test]
    async fn multipart_without_boundary_is_undecodable() {
        let mut adapter = RequestAdapter::new("req-1".to_string());
        adapter.set_body("multipart/form-data", "--X\r\n");

        let inputs = adapter.extract_inputs().await;
        assert_eq!(
            inputs.body(),
            &BodyInputs::Undecodable("request body could not be decoded")
        );
    }

    #[tokio::test]
    async fn unknown_content_type_is_undecodable() {
        let mut adapter = RequestAdapter::new("req-1".to_string());
        adapter.set_body("text/plain", "hello");

        let inputs = adapter.extract_inputs().await;
        assert!(matches!(inputs.body(), BodyInputs::Undecodable(_)));
    }
}
