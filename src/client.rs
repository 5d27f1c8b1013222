//! The service proxy.
//!
//! [`PartnerClient`] runs one logical call end to end: it makes sure the
//! credential is fresh, attaches the bearer token and context headers,
//! encodes the body, sends, and translates the response into a typed result
//! or an [`Error`]. The retry policy wraps that whole sequence, so a retried
//! attempt re-checks the credential and re-encodes the body.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::{
    config::ServiceConfig,
    context::RequestContext,
    converter::{Converter, JsonConverter},
    credential::{Credential, CredentialProvider, CredentialRefresher},
    fault::ServiceFault,
    link::Link,
    request::{MultipartPart, RequestBody, RequestDescriptor},
    retry::{RetryDecision, RetryPolicy, RetryState},
    Error, Response, Result,
};
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderMap, HeaderName, HeaderValue, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Body of a file download, yielded chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Client for the partner service.
///
/// Cloning is cheap. Clones share the connection pool, the credential
/// provider and the retry policy.
///
/// # Examples
///
/// ```no_run
/// use partner_client::{Credential, PartnerClient, RequestDescriptor, ServiceConfig};
/// use http::Method;
/// use serde::Deserialize;
/// use std::time::Duration;
///
/// #[derive(Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct Customer {
///     id: String,
///     company_profile: serde_json::Value,
/// }
///
/// # async fn example() -> Result<(), partner_client::Error> {
/// let config = ServiceConfig::from_json_file("partner.json")?;
/// let client = PartnerClient::builder()
///     .config(config)
///     .credential(Credential::expiring_in("token", Duration::from_secs(3600))?)
///     .build()?;
///
/// let request = RequestDescriptor::builder(Method::GET, client.config().api("GetCustomer")?)
///     .arg("cust-1")
///     .build()?;
/// let customer: Customer = client.execute(request).await?;
/// println!("Customer {}", customer.id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PartnerClient {
    inner: Arc<ClientInner>,
    context: RequestContext,
}

struct ClientInner {
    http_client: reqwest::Client,
    config: ServiceConfig,
    base_url: Url,
    credentials: CredentialProvider,
    retry_policy: RetryPolicy,
    timeout: Option<Duration>,
}

impl PartnerClient {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Returns a client that sends `context` instead of this client's.
    ///
    /// The returned client shares everything else with `self`.
    pub fn with_context(&self, context: RequestContext) -> PartnerClient {
        PartnerClient {
            inner: Arc::clone(&self.inner),
            context,
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn credentials(&self) -> &CredentialProvider {
        &self.inner.credentials
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry_policy
    }

    /// Executes a call and decodes its JSON result.
    ///
    /// An empty body decodes as `null`, so use `()` or `Option<T>` for calls
    /// that return no content.
    pub async fn execute<T>(&self, descriptor: RequestDescriptor) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.execute_with(descriptor, &JsonConverter).await
    }

    /// Executes a call, encoding the body and decoding the result with `converter`.
    pub async fn execute_with<T, C>(&self, descriptor: RequestDescriptor, converter: &C) -> Result<T>
    where
        T: DeserializeOwned,
        C: Converter,
    {
        Ok(self.send(descriptor, converter).await?.data)
    }

    /// Executes a call and returns the result with its status, headers and timing.
    ///
    /// # Errors
    ///
    /// Argument errors are raised before anything is sent. Service faults,
    /// transport failures and decode failures are raised after the retry
    /// policy gives up; the error of the last attempt is returned unchanged.
    pub async fn send<T, C>(&self, descriptor: RequestDescriptor, converter: &C) -> Result<Response<T>>
    where
        T: DeserializeOwned,
        C: Converter,
    {
        let started = Instant::now();

        let ((data, raw_body, status, headers), attempts) = self
            .run(&descriptor, converter, |response| async move {
                let status = response.status();
                let headers = response.headers().clone();
                let body = response.bytes().await.map_err(Error::from_transport)?;
                let data = converter.decode::<T>(status, &body)?;
                Ok((data, String::from_utf8_lossy(&body).into_owned(), status, headers))
            })
            .await?;

        Ok(Response::new(
            data,
            raw_body,
            status,
            headers,
            started.elapsed(),
            attempts,
        ))
    }

    /// Executes a call and returns the success body as a byte stream.
    ///
    /// Retries cover everything up to the response headers. Errors while
    /// reading the stream are yielded by the stream and are not retried.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use futures::TryStreamExt;
    /// use partner_client::{PartnerClient, RequestDescriptor};
    /// use http::Method;
    ///
    /// # async fn example(client: PartnerClient) -> Result<(), partner_client::Error> {
    /// let request = RequestDescriptor::builder(Method::GET, "invoices/{0}/documents/statement")
    ///     .arg("INV-1")
    ///     .build()?;
    ///
    /// let mut stream = client.execute_stream(request).await?;
    /// let mut pdf = Vec::new();
    /// while let Some(chunk) = stream.try_next().await? {
    ///     pdf.extend_from_slice(&chunk);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute_stream(&self, descriptor: RequestDescriptor) -> Result<ByteStream> {
        let (response, _) = self
            .run(&descriptor, &JsonConverter, |response| async move { Ok(response) })
            .await?;

        Ok(response.bytes_stream().map_err(Error::from_transport).boxed())
    }

    /// Follows a hypermedia link.
    ///
    /// The link URI is used as-is. `body` is sent for POST, PUT and PATCH
    /// links and ignored otherwise. DELETE and HEAD links discard the
    /// response and return `T::default()`.
    pub async fn invoke_link<T, B>(&self, link: &Link, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        let mut builder =
            RequestDescriptor::builder(link.method.to_method(), link.uri.clone()).path_already_built();
        for header in &link.headers {
            builder = builder.header(header.key.clone(), header.value.clone());
        }
        if let (true, Some(body)) = (link.method.carries_body(), body) {
            builder = builder.json_body(body)?;
        }
        let descriptor = builder.build()?;

        if link.method.discards_response() {
            self.run(&descriptor, &JsonConverter, |_response| async { Ok(()) })
                .await?;
            return Ok(T::default());
        }

        self.execute(descriptor).await
    }

    /// Follows a link without a body.
    pub async fn follow_link<T>(&self, link: &Link) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        self.invoke_link::<T, ()>(link, None).await
    }

    /// Runs attempts until one succeeds or the retry policy stops.
    ///
    /// Returns the success value and the number of attempts made.
    async fn run<C, R, F, Fut>(
        &self,
        descriptor: &RequestDescriptor,
        converter: &C,
        on_success: F,
    ) -> Result<(R, u32)>
    where
        C: Converter,
        F: Fn(reqwest::Response) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let url = descriptor.resolve_url(&self.inner.base_url, &self.inner.config.api_version)?;
        let mut state = RetryState::for_method(descriptor.method());

        loop {
            let attempt = state.begin_attempt();

            let result = cancellable(
                descriptor,
                self.attempt(descriptor, &url, converter, attempt, &on_success),
            )
            .await;

            let error = match result {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => e,
            };

            tracing::warn!(
                error = %error,
                attempt = attempt,
                method = %descriptor.method(),
                path = %descriptor.path(),
                "Request failed"
            );
            state.record_failure(&error);

            let delay = match self.inner.retry_policy.should_retry(&state, &error) {
                RetryDecision::Retry(delay) => delay,
                RetryDecision::Stop => return Err(error),
            };

            if !state.is_idempotent() {
                tracing::warn!(
                    method = %descriptor.method(),
                    path = %descriptor.path(),
                    attempt = attempt,
                    "Retrying a non-idempotent request; the service may apply it more than once"
                );
            }
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt = attempt,
                "Retrying request after delay"
            );

            cancellable(descriptor, async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
            state.record_wait(delay);
        }
    }

    /// One credential check, send and translate.
    async fn attempt<C, R, F, Fut>(
        &self,
        descriptor: &RequestDescriptor,
        url: &Url,
        converter: &C,
        attempt: u32,
        on_success: &F,
    ) -> Result<R>
    where
        C: Converter,
        F: Fn(reqwest::Response) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let credential = self.inner.credentials.ensure_fresh(&self.context).await?;
        let headers = self.request_headers(descriptor, &credential)?;

        tracing::debug!(
            method = %descriptor.method(),
            url = %url,
            attempt = attempt,
            "Executing HTTP request"
        );

        let mut request = self
            .inner
            .http_client
            .request(descriptor.method().clone(), url.clone())
            .headers(headers);

        if let Some(timeout) = self.inner.timeout {
            request = request.timeout(timeout);
        }

        request = match descriptor.body() {
            None => request,
            Some(RequestBody::Json(value)) => request
                .header(CONTENT_TYPE, header_value(converter.content_type())?)
                .body(converter.encode(value)?),
            Some(RequestBody::Raw {
                content,
                content_type,
            }) => request
                .header(CONTENT_TYPE, header_value(content_type)?)
                .body(content.clone()),
            Some(RequestBody::Multipart(parts)) => request.multipart(multipart_form(parts)?),
        };

        let sent_at = Instant::now();
        let response = request.send().await.map_err(Error::from_transport)?;
        let status = response.status();

        tracing::info!(
            status = status.as_u16(),
            latency_ms = sent_at.elapsed().as_millis() as u64,
            attempt = attempt,
            "Received HTTP response"
        );

        if !status.is_success() {
            return Err(self.translate_failure(status, response).await);
        }

        on_success(response).await
    }

    /// Builds the fault for a non-success response.
    async fn translate_failure(&self, status: StatusCode, response: reqwest::Response) -> Error {
        let headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return Error::from_transport(e),
        };

        let fault = ServiceFault::from_response(status, &headers, &body, &self.inner.config.headers);

        if status.is_client_error() {
            tracing::error!(
                status = status.as_u16(),
                code = fault.code().unwrap_or_default(),
                response = %fault.raw_body(),
                "Client error (4xx)"
            );
        } else if status.is_server_error() {
            tracing::warn!(
                status = status.as_u16(),
                code = fault.code().unwrap_or_default(),
                response = %fault.raw_body(),
                "Server error (5xx)"
            );
        }

        fault.into()
    }

    fn request_headers(
        &self,
        descriptor: &RequestDescriptor,
        credential: &Credential,
    ) -> Result<HeaderMap> {
        let names = &self.inner.config.headers;
        let mut headers = HeaderMap::new();

        let mut authorization = header_value(&credential.authorization_header())?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        append_header(
            &mut headers,
            &names.correlation_id,
            &self.context.correlation_id().to_string(),
        )?;
        append_header(
            &mut headers,
            &names.request_id,
            &self.context.request_id().to_string(),
        )?;
        append_header(&mut headers, &names.locale, self.context.locale())?;

        if let Some(application_name) = &self.inner.config.application_name {
            append_header(&mut headers, &names.application_name, application_name)?;
        }
        if let Some(subscription_key) = &self.inner.config.subscription_key {
            append_header(&mut headers, &names.subscription_key, subscription_key)?;
        }
        if let Some(token) = descriptor.continuation_token() {
            append_header(&mut headers, &names.continuation_token, token)?;
        }

        for (name, value) in descriptor.headers() {
            append_header(&mut headers, name, value)?;
        }

        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));

        Ok(headers)
    }
}

/// Races `work` against the descriptor's cancellation token.
async fn cancellable<T>(
    descriptor: &RequestDescriptor,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    match descriptor.cancellation() {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            result = work => result,
        },
        None => work.await,
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Argument(format!("Invalid header value: {}", e)))
}

fn append_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let name = HeaderName::try_from(name)
        .map_err(|e| Error::Argument(format!("Invalid header name {:?}: {}", name, e)))?;
    headers.append(name, header_value(value)?);
    Ok(())
}

fn multipart_form(parts: &[MultipartPart]) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        let mut field = reqwest::multipart::Part::bytes(part.content.to_vec());
        if let Some(file_name) = &part.file_name {
            field = field.file_name(file_name.clone());
        }
        if let Some(content_type) = &part.content_type {
            field = field.mime_str(content_type).map_err(|e| {
                Error::Argument(format!("Invalid content type {:?}: {}", content_type, e))
            })?;
        }
        form = form.part(part.name.clone(), field);
    }
    Ok(form)
}

/// Builder for configuring and creating a [`PartnerClient`].
///
/// A credential is required. Everything else defaults from the
/// [`ServiceConfig`], which itself defaults to the public service.
///
/// # Examples
///
/// ```no_run
/// use partner_client::{BoxError, Credential, PartnerClient, RequestContext, RetryPolicy};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), partner_client::Error> {
/// let client = PartnerClient::builder()
///     .base_url("https://api.partner.example.com")?
///     .credential(Credential::expiring_in("initial-token", Duration::from_secs(3600))?)
///     .refresher(|_stale: Credential, _context: RequestContext| async move {
///         // Ask the identity provider for a new token here.
///         Ok::<_, BoxError>(Credential::expiring_in("renewed", Duration::from_secs(3600))?)
///     })
///     .retry_policy(RetryPolicy::default().retry_non_idempotent(false))
///     .timeout(Duration::from_secs(30))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ServiceConfig,
    credential: Option<Credential>,
    refresher: Option<Arc<dyn CredentialRefresher>>,
    retry_policy: Option<RetryPolicy>,
    context: Option<RequestContext>,
    timeout: Option<Duration>,
    http_client: Option<reqwest::Client>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
            credential: None,
            refresher: None,
            retry_policy: None,
            context: None,
            timeout: None,
            http_client: None,
        }
    }

    /// Replaces the whole service configuration.
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the service root URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())?;
        self.config.base_url = url.to_string();
        Ok(self)
    }

    /// Sets the initial credential.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Sets the delegate that replaces expired credentials.
    pub fn refresher(mut self, refresher: impl CredentialRefresher + 'static) -> Self {
        self.refresher = Some(Arc::new(refresher));
        self
    }

    /// Overrides the policy derived from the configuration.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the context sent with every call. Defaults to fresh ids and the
    /// configured locale.
    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Overrides the configured per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Uses an existing `reqwest` client, e.g. to share its connection pool.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the configured `PartnerClient`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the configuration is invalid and
    /// [`Error::Authentication`] if no credential was provided.
    pub fn build(self) -> Result<PartnerClient> {
        let config = self.config;
        config.validate()?;
        let base_url = config.base_url()?;

        let credential = self.credential.ok_or_else(|| {
            Error::Authentication("a credential is required to build a client".to_string())
        })?;
        let credentials = CredentialProvider::new(credential, self.refresher)
            .with_default_expiry_buffer(config.credential_expiry_buffer());

        let http_client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder().build().map_err(|e| {
                Error::Configuration(format!("Failed to build HTTP client: {}", e))
            })?,
        };

        let retry_policy = self
            .retry_policy
            .unwrap_or_else(|| RetryPolicy::from_config(&config));
        let context = self
            .context
            .unwrap_or_else(|| RequestContext::new().with_locale(config.locale.clone()));
        let timeout = self.timeout.or_else(|| config.timeout());

        tracing::debug!(
            base_url = %base_url,
            api_version = %config.api_version,
            max_attempts = retry_policy.max_attempts(),
            "Partner client configured"
        );

        Ok(PartnerClient {
            inner: Arc::new(ClientInner {
                http_client,
                config,
                base_url,
                credentials,
                retry_policy,
                timeout,
            }),
            context,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
