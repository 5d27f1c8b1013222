//! Per-session tracing identity attached to every outbound request.

use uuid::Uuid;

/// Correlation id, request id and locale sent with each call.
///
/// A context is created once per client and shared by every call it makes.
/// [`PartnerClient::with_context`](crate::PartnerClient::with_context) scopes a
/// client to a different context without rebuilding it.
///
/// # Examples
///
/// ```
/// use partner_client::RequestContext;
///
/// let session = RequestContext::new().with_locale("fr-FR");
/// let scoped = session.with_new_request_id();
///
/// assert_eq!(scoped.correlation_id(), session.correlation_id());
/// assert_ne!(scoped.request_id(), session.request_id());
/// assert_eq!(scoped.locale(), "fr-FR");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    correlation_id: Uuid,
    request_id: Uuid,
    locale: String,
}

impl RequestContext {
    /// Creates a context with fresh random ids and the `en-US` locale.
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            locale: "en-US".to_string(),
        }
    }

    /// Creates a context that continues an existing conversation.
    pub fn with_correlation_id(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            ..Self::new()
        }
    }

    /// Returns a copy using `locale`.
    pub fn with_locale(&self, locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            ..self.clone()
        }
    }

    /// Returns a copy with a new request id and the same correlation id.
    pub fn with_new_request_id(&self) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            ..self.clone()
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
