//! Translation of failed responses into structured service faults.

use crate::{config::HeaderNames, rate_limit::parse_retry_after};
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// A structured failure returned by the service.
///
/// Built from every non-success response. When the body is not a
/// recognizable fault payload the fault is synthesized from the status alone,
/// so callers never see an unstructured failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFault {
    status: StatusCode,
    code: Option<String>,
    description: String,
    data: Vec<String>,
    inner: Vec<ServiceFault>,
    correlation_id: Option<String>,
    request_id: Option<String>,
    retry_after: Option<Duration>,
    raw_body: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FaultPayload {
    #[serde(default, alias = "errorCode")]
    code: Option<FaultCode>,
    #[serde(default, alias = "message", alias = "errorMessage")]
    description: Option<String>,
    #[serde(default)]
    data: Option<Vec<serde_json::Value>>,
    #[serde(default, alias = "details")]
    inner_errors: Option<Vec<FaultPayload>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FaultCode {
    Number(i64),
    Text(String),
}

impl FaultCode {
    fn into_string(self) -> String {
        match self {
            FaultCode::Number(n) => n.to_string(),
            FaultCode::Text(s) => s,
        }
    }
}

impl ServiceFault {
    /// Translates a non-success response into a fault.
    ///
    /// # Examples
    ///
    /// ```
    /// use partner_client::ServiceFault;
    /// use http::{HeaderMap, StatusCode};
    ///
    /// let body = br#"{"code": 600008, "description": "Customer not found"}"#;
    /// let fault = ServiceFault::from_response(
    ///     StatusCode::NOT_FOUND,
    ///     &HeaderMap::new(),
    ///     body,
    ///     &Default::default(),
    /// );
    ///
    /// assert_eq!(fault.code(), Some("600008"));
    /// assert_eq!(fault.description(), "Customer not found");
    ///
    /// let fault = ServiceFault::from_response(
    ///     StatusCode::BAD_GATEWAY,
    ///     &HeaderMap::new(),
    ///     b"<html>upstream down</html>",
    ///     &Default::default(),
    /// );
    /// assert_eq!(fault.code(), None);
    /// assert_eq!(fault.status(), StatusCode::BAD_GATEWAY);
    /// ```
    pub fn from_response(
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        header_names: &HeaderNames,
    ) -> Self {
        let raw_body = String::from_utf8_lossy(body).into_owned();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let mut fault = match serde_json::from_slice::<FaultPayload>(body) {
            Ok(payload) if payload.code.is_some() || payload.description.is_some() => {
                Self::from_payload(status, payload)
            }
            _ => Self::generic(status),
        };

        fault.correlation_id = header(&header_names.correlation_id);
        fault.request_id = header(&header_names.request_id);
        fault.retry_after = parse_retry_after(headers);
        fault.raw_body = raw_body;
        fault
    }

    fn from_payload(status: StatusCode, payload: FaultPayload) -> Self {
        let description = payload
            .description
            .unwrap_or_else(|| generic_description(status));
        let data = payload
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|value| match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        let inner = payload
            .inner_errors
            .unwrap_or_default()
            .into_iter()
            .map(|inner| Self::from_payload(status, inner))
            .collect();

        Self {
            status,
            code: payload.code.map(FaultCode::into_string),
            description,
            data,
            inner,
            correlation_id: None,
            request_id: None,
            retry_after: None,
            raw_body: String::new(),
        }
    }

    fn generic(status: StatusCode) -> Self {
        Self {
            status,
            code: None,
            description: generic_description(status),
            data: Vec::new(),
            inner: Vec::new(),
            correlation_id: None,
            request_id: None,
            retry_after: None,
            raw_body: String::new(),
        }
    }

    /// The HTTP status of the failed response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The service error code, when the body carried one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Extra detail strings attached to the fault.
    pub fn data(&self) -> &[String] {
        &self.data
    }

    /// Nested faults, in payload order.
    pub fn inner_faults(&self) -> &[ServiceFault] {
        &self.inner
    }

    /// Correlation id echoed by the service.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Request id echoed by the service.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// The response body exactly as received.
    pub fn raw_body(&self) -> &str {
        &self.raw_body
    }
}

fn generic_description(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("The service returned {} {}", status.as_u16(), reason),
        None => format!("The service returned status {}", status.as_u16()),
    }
}

impl fmt::Display for ServiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service fault {}", self.status.as_u16())?;
        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }
        write!(f, ": {}", self.description)
    }
}

impl std::error::Error for ServiceFault {}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn translate(status: u16, body: &str) -> ServiceFault {
        ServiceFault::from_response(
            StatusCode::from_u16(status).unwrap(),
            &HeaderMap::new(),
            body.as_bytes(),
            &HeaderNames::default(),
        )
    }

    #[test]
    fn test_parses_fault_payload_with_nested_faults() {
        let fault = translate(
            400,
            r#"{
                "code": "2000",
                "description": "Request body is invalid",
                "data": ["companyName", 42],
                "innerErrors": [
                    {"code": 2001, "description": "Company name is required"},
                    {"errorCode": "2002", "message": "Country is not supported"}
                ]
            }"#,
        );

        assert_eq!(fault.status(), StatusCode::BAD_REQUEST);
        assert_eq!(fault.code(), Some("2000"));
        assert_eq!(fault.description(), "Request body is invalid");
        assert_eq!(fault.data(), ["companyName".to_string(), "42".to_string()]);
        assert_eq!(fault.inner_faults().len(), 2);
        assert_eq!(fault.inner_faults()[0].code(), Some("2001"));
        assert_eq!(
            fault.inner_faults()[1].description(),
            "Country is not supported"
        );
        assert!(fault.raw_body().contains("innerErrors"));
    }

    #[test]
    fn test_empty_body_synthesizes_generic_fault() {
        let fault = translate(503, "");
        assert_eq!(fault.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(fault.code(), None);
        assert_eq!(
            fault.description(),
            "The service returned 503 Service Unavailable"
        );
        assert!(fault.inner_faults().is_empty());
    }

    #[test]
    fn test_malformed_or_unrelated_json_synthesizes_generic_fault() {
        let fault = translate(500, "{not json");
        assert_eq!(fault.code(), None);
        assert_eq!(fault.raw_body(), "{not json");

        let fault = translate(404, r#"{"unrelated": true}"#);
        assert_eq!(fault.code(), None);
        assert_eq!(fault.description(), "The service returned 404 Not Found");
    }

    #[test]
    fn test_echoed_ids_and_retry_after_are_captured() {
        let mut headers = HeaderMap::new();
        headers.insert("ms-correlationid", HeaderValue::from_static("corr-1"));
        headers.insert("ms-requestid", HeaderValue::from_static("req-1"));
        headers.insert("retry-after", HeaderValue::from_static("2"));

        let fault = ServiceFault::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            &headers,
            b"",
            &HeaderNames::default(),
        );

        assert_eq!(fault.correlation_id(), Some("corr-1"));
        assert_eq!(fault.request_id(), Some("req-1"));
        assert_eq!(fault.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_display() {
        let fault = translate(409, r#"{"code": 800, "description": "Already exists"}"#);
        assert_eq!(fault.to_string(), "Service fault 409 [800]: Already exists");
    }
}
