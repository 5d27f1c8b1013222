//! Typed results together with the transport details of the call that
//! produced them.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A successful call's decoded result plus its status, headers and timing.
///
/// Returned by [`PartnerClient::send`](crate::PartnerClient::send).
/// [`PartnerClient::execute`](crate::PartnerClient::execute) returns only
/// [`data`](Self::data).
///
/// # Examples
///
/// ```no_run
/// use partner_client::{JsonConverter, PartnerClient, RequestDescriptor};
/// use http::Method;
///
/// # async fn example(client: PartnerClient) -> Result<(), partner_client::Error> {
/// let request = RequestDescriptor::builder(Method::GET, "customers/{0}")
///     .arg("cust-1")
///     .build()?;
///
/// let response = client
///     .send::<serde_json::Value, _>(request, &JsonConverter)
///     .await?;
///
/// println!("Customer: {}", response.data);
/// println!("Status {} after {} attempt(s)", response.status, response.attempts);
/// if let Some(request_id) = response.header("MS-RequestId") {
///     println!("Service request id: {request_id}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded body.
    pub data: T,

    /// The raw body, lossily decoded as UTF-8.
    pub raw_body: String,

    pub status: StatusCode,

    pub headers: HeaderMap,

    /// Time from the first attempt until the successful response, including
    /// backoff waits and credential refreshes.
    pub latency: Duration,

    /// Attempts made, `1` if the first one succeeded.
    pub attempts: u32,
}

impl<T> Response<T> {
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Maps the decoded body, keeping the call details.
    ///
    /// # Examples
    ///
    /// ```
    /// # use partner_client::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     vec!["dev-1", "dev-2"],
    ///     String::new(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(40),
    ///     1,
    /// );
    ///
    /// let count = response.map(|devices| devices.len());
    /// assert_eq!(count.data, 2);
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the call needed more than one attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns the first value of a response header, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Consumes the response, returning the decoded body.
    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
