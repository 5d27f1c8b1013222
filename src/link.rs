//! Hypermedia links embedded in resources.
//!
//! A [`Link`] describes a follow-up call the service offers on a resource:
//! the next page of a collection, a status poll for a batch upload, and so
//! on. Links are followed with
//! [`PartnerClient::invoke_link`](crate::PartnerClient::invoke_link).

use http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP verb of a link.
///
/// Parsing is case-insensitive and falls back to [`LinkMethod::Get`] for any
/// verb it does not recognize.
///
/// ```
/// use partner_client::LinkMethod;
///
/// assert_eq!(LinkMethod::parse("delete"), LinkMethod::Delete);
/// assert_eq!(LinkMethod::parse("TRACE"), LinkMethod::Get);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LinkMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl LinkMethod {
    pub fn parse(verb: &str) -> Self {
        match verb.trim().to_ascii_uppercase().as_str() {
            "POST" => LinkMethod::Post,
            "PUT" => LinkMethod::Put,
            "PATCH" => LinkMethod::Patch,
            "DELETE" => LinkMethod::Delete,
            "HEAD" => LinkMethod::Head,
            _ => LinkMethod::Get,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMethod::Get => "GET",
            LinkMethod::Post => "POST",
            LinkMethod::Put => "PUT",
            LinkMethod::Patch => "PATCH",
            LinkMethod::Delete => "DELETE",
            LinkMethod::Head => "HEAD",
        }
    }

    pub fn to_method(self) -> Method {
        match self {
            LinkMethod::Get => Method::GET,
            LinkMethod::Post => Method::POST,
            LinkMethod::Put => Method::PUT,
            LinkMethod::Patch => Method::PATCH,
            LinkMethod::Delete => Method::DELETE,
            LinkMethod::Head => Method::HEAD,
        }
    }

    /// POST, PUT and PATCH send the caller's body.
    pub fn carries_body(self) -> bool {
        matches!(self, LinkMethod::Post | LinkMethod::Put | LinkMethod::Patch)
    }

    /// DELETE and HEAD responses are discarded and the caller gets a default value.
    pub fn discards_response(self) -> bool {
        matches!(self, LinkMethod::Delete | LinkMethod::Head)
    }
}

impl From<String> for LinkMethod {
    fn from(verb: String) -> Self {
        LinkMethod::parse(&verb)
    }
}

impl From<LinkMethod> for String {
    fn from(method: LinkMethod) -> Self {
        method.as_str().to_string()
    }
}

impl fmt::Display for LinkMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A header the service asks to be sent with a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkHeader {
    pub key: String,
    pub value: String,
}

/// A server-supplied follow-up action.
///
/// The URI is used verbatim, query string included. It may be absolute or
/// relative to the service root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub uri: String,

    #[serde(default)]
    pub method: LinkMethod,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<LinkHeader>,
}

impl Link {
    /// Creates a GET link without headers.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            method: LinkMethod::Get,
            headers: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: LinkMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(LinkHeader {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Returns the value of the first header named `key`, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(key))
            .map(|h| h.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_or_missing_method_defaults_to_get() {
        let link: Link = serde_json::from_str(r#"{"uri": "/v1/customers", "method": "TRACE"}"#).unwrap();
        assert_eq!(link.method, LinkMethod::Get);

        let link: Link = serde_json::from_str(r#"{"uri": "/v1/customers"}"#).unwrap();
        assert_eq!(link.method, LinkMethod::Get);
        assert!(link.headers.is_empty());
    }

    #[test]
    fn test_parses_service_link_with_headers() {
        let link: Link = serde_json::from_str(
            r#"{
                "uri": "/v1/customers?size=2&seekOperation=Next",
                "method": "get",
                "headers": [{"key": "MS-ContinuationToken", "value": "abc"}]
            }"#,
        )
        .unwrap();

        assert_eq!(link.method, LinkMethod::Get);
        assert_eq!(link.header("ms-continuationtoken"), Some("abc"));
    }

    #[test]
    fn test_method_serializes_uppercase() {
        let link = Link::new("/v1/devices/1").with_method(LinkMethod::Delete);
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json, serde_json::json!({"uri": "/v1/devices/1", "method": "DELETE"}));
    }

    #[test]
    fn test_body_and_response_rules() {
        assert!(LinkMethod::Patch.carries_body());
        assert!(!LinkMethod::Get.carries_body());
        assert!(LinkMethod::Head.discards_response());
        assert!(!LinkMethod::Post.discards_response());
        assert_eq!(LinkMethod::Head.to_method(), Method::HEAD);
    }
}
