//! Error types for partner service calls.
//!
//! Every failure a caller can observe is a variant of [`Error`]. Local
//! precondition failures, authentication problems, transport failures, faults
//! returned by the service and fatal runtime conditions are all first-class
//! values, so callers can branch on them after a call (or after a
//! [`run_sync`](crate::sync::run_sync) thread hop) without unwrapping layers.

use crate::{fault::ServiceFault, retry::RetryPolicy};
use http::StatusCode;
use std::time::Duration;

/// The main error type for partner service calls.
///
/// # Examples
///
/// ```no_run
/// use partner_client::{Error, PartnerClient, RequestDescriptor};
/// use http::Method;
///
/// # async fn example(client: PartnerClient) -> Result<(), Error> {
/// let request = RequestDescriptor::builder(Method::GET, "customers/{0}")
///     .arg("cust-1")
///     .build()?;
///
/// match client.execute::<serde_json::Value>(request).await {
///     Ok(customer) => println!("Customer: {customer}"),
///     Err(Error::Service(fault)) if fault.status().as_u16() == 404 => {
///         eprintln!("No such customer: {}", fault.description());
///     }
///     Err(Error::Authentication(reason)) => eprintln!("Sign in again: {reason}"),
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A local precondition was violated before any network call was made.
    ///
    /// Raised for empty required parameters, malformed path templates,
    /// out-of-range pagination values and invalid header names or values.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// No usable credential could be obtained.
    ///
    /// The credential is missing, it expired with no refresh delegate
    /// configured, or the refresh delegate itself failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A network-level error occurred (connection refused, DNS failure, reset...).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// The service answered with a non-success status.
    #[error("{0}")]
    Service(Box<ServiceFault>),

    /// An unrecoverable runtime condition. Never retried.
    #[error("Fatal runtime error: {0}")]
    Fatal(String),

    /// The call was cancelled through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    Serialization(String),

    /// A success response body could not be converted into the expected type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    Deserialization {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The converter's error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// Invalid client or service configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was produced or supplied.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<ServiceFault> for Error {
    fn from(fault: ServiceFault) -> Self {
        Error::Service(Box::new(fault))
    }
}

impl Error {
    /// Maps a transport error, folding reqwest timeouts into [`Error::Timeout`].
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(error)
        }
    }

    /// Returns `true` if this error is likely to succeed on retry under `policy`.
    ///
    /// Connection failures and timeouts are transient, as are service faults
    /// whose status is in the policy's retryable set. Everything else is not.
    ///
    /// # Examples
    ///
    /// ```
    /// use partner_client::{Error, RetryPolicy, ServiceFault};
    /// use http::{HeaderMap, StatusCode};
    ///
    /// let policy = RetryPolicy::default();
    ///
    /// let unavailable = ServiceFault::from_response(
    ///     StatusCode::SERVICE_UNAVAILABLE,
    ///     &HeaderMap::new(),
    ///     b"",
    ///     &Default::default(),
    /// );
    /// assert!(Error::from(unavailable).is_transient(&policy));
    ///
    /// let conflict = ServiceFault::from_response(
    ///     StatusCode::CONFLICT,
    ///     &HeaderMap::new(),
    ///     b"",
    ///     &Default::default(),
    /// );
    /// assert!(!Error::from(conflict).is_transient(&policy));
    /// ```
    pub fn is_transient(&self, policy: &RetryPolicy) -> bool {
        match self {
            Error::Network(e) => {
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
            }
            Error::Timeout => true,
            Error::Service(fault) => policy.is_retryable_status(fault.status()),
            Error::Argument(_)
            | Error::Authentication(_)
            | Error::Fatal(_)
            | Error::Cancelled
            | Error::Serialization(_)
            | Error::Deserialization { .. }
            | Error::Configuration(_)
            | Error::InvalidUrl(_) => false,
        }
    }

    /// Returns `true` for unrecoverable runtime conditions.
    ///
    /// Fatal errors short-circuit the retry loop before any backoff is computed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }

    /// Returns the service fault if this error carries one.
    pub fn fault(&self) -> Option<&ServiceFault> {
        match self {
            Error::Service(fault) => Some(&**fault),
            _ => None,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Service(fault) => Some(fault.status()),
            Error::Deserialization { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Service(fault) => Some(fault.raw_body()),
            Error::Deserialization { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns the `Retry-After` hint sent with a throttled response.
    pub fn retry_after(&self) -> Option<Duration> {
        self.fault()?.retry_after()
    }
}

/// A specialized `Result` type for partner service calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderNames;
    use http::{HeaderMap, HeaderValue};

    fn fault(status: u16, headers: &HeaderMap) -> Error {
        ServiceFault::from_response(
            StatusCode::from_u16(status).unwrap(),
            headers,
            b"",
            &HeaderNames::default(),
        )
        .into()
    }

    #[test]
    fn test_transient_classification_follows_policy_statuses() {
        let policy = RetryPolicy::default();
        let headers = HeaderMap::new();

        for status in [429, 502, 503, 504] {
            assert!(fault(status, &headers).is_transient(&policy), "{status}");
        }
        for status in [400, 401, 404, 409, 500] {
            assert!(!fault(status, &headers).is_transient(&policy), "{status}");
        }

        let policy = RetryPolicy::default().with_retryable_statuses([500]);
        assert!(fault(500, &headers).is_transient(&policy));
        assert!(!fault(503, &headers).is_transient(&policy));
    }

    #[test]
    fn test_local_errors_are_not_transient() {
        let policy = RetryPolicy::default();
        assert!(Error::Timeout.is_transient(&policy));
        assert!(!Error::Argument("x".into()).is_transient(&policy));
        assert!(!Error::Authentication("x".into()).is_transient(&policy));
        assert!(!Error::Cancelled.is_transient(&policy));
        assert!(!Error::Fatal("oom".into()).is_transient(&policy));
    }

    #[test]
    fn test_only_fatal_is_fatal() {
        assert!(Error::Fatal("out of memory".into()).is_fatal());
        assert!(!Error::Timeout.is_fatal());
        assert!(!Error::Cancelled.is_fatal());
    }

    #[test]
    fn test_accessors_expose_fault_details() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("7"));
        let err = fault(429, &headers);

        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(err.raw_response(), Some(""));
        assert!(err.fault().is_some());
        assert_eq!(Error::Timeout.status(), None);
    }
}
