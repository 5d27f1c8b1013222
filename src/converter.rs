//! Body converters.
//!
//! A [`Converter`] encodes request bodies and decodes success bodies. Calls
//! use [`JsonConverter`] unless a resource needs its own representation.

use crate::{Error, Result};
use http::StatusCode;
use serde::{de::DeserializeOwned, Serialize};

/// Encodes request bodies and decodes success response bodies.
pub trait Converter: Send + Sync {
    /// Content type sent with encoded bodies.
    fn content_type(&self) -> &str {
        "application/json"
    }

    /// Encodes a request body.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decodes the body of a success response.
    fn decode<T: DeserializeOwned>(&self, status: StatusCode, body: &[u8]) -> Result<T>;
}

/// The standard JSON converter.
///
/// An empty body decodes as JSON `null`, so `()` and `Option<T>` are valid
/// result types for calls that return no content.
///
/// # Examples
///
/// ```
/// use partner_client::{Converter, JsonConverter};
/// use http::StatusCode;
///
/// let converter = JsonConverter;
/// let none: Option<u32> = converter.decode(StatusCode::NO_CONTENT, b"").unwrap();
/// assert_eq!(none, None);
///
/// let n: u32 = converter.decode(StatusCode::OK, b"7").unwrap();
/// assert_eq!(n, 7);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl Converter for JsonConverter {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, status: StatusCode, body: &[u8]) -> Result<T> {
        let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            body
        };

        serde_json::from_slice(body).map_err(|e| {
            let raw_response = String::from_utf8_lossy(body).into_owned();
            tracing::error!(
                error = %e,
                raw_response = %raw_response,
                "Failed to deserialize response"
            );
            Error::Deserialization {
                raw_response,
                serde_error: e.to_string(),
                status,
            }
        })
    }
}
