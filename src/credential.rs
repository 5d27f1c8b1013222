//! Bearer credentials and their refresh lifecycle.
//!
//! A [`Credential`] is an immutable token with an absolute expiry. The
//! [`CredentialProvider`] owns the current credential for a client and swaps
//! in a replacement from its [`CredentialRefresher`] when the current one has
//! expired. Concurrent callers that all see an expired credential share a
//! single refresh.

use crate::{context::RequestContext, Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

/// Error type returned by refresh delegates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A bearer token usable against the service.
///
/// The credential counts as expired once `now > expires_at - expiry_buffer`.
/// The buffer can only move that point earlier. A credential created without
/// a buffer picks up the provider's default; an explicit buffer, zero
/// included, is kept as given.
///
/// # Examples
///
/// ```
/// use partner_client::Credential;
/// use std::time::{Duration, SystemTime};
///
/// let expires_at = SystemTime::now() + Duration::from_secs(600);
/// let credential = Credential::new("token", expires_at)?
///     .with_expiry_buffer(Duration::from_secs(300));
/// assert!(!credential.is_expired());
///
/// let nearly_gone = Credential::new("token", SystemTime::now() + Duration::from_secs(60))?
///     .with_expiry_buffer(Duration::from_secs(300));
/// assert!(nearly_gone.is_expired());
/// # Ok::<(), partner_client::Error>(())
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: Arc<str>,
    expires_at: SystemTime,
    expiry_buffer: Option<Duration>,
}

impl Credential {
    /// Creates a credential with no expiry buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if the token is empty or blank.
    pub fn new(token: impl Into<String>, expires_at: SystemTime) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::Argument("credential token must not be empty".to_string()));
        }

        Ok(Self {
            token: token.into(),
            expires_at,
            expiry_buffer: None,
        })
    }

    /// Creates a credential that expires `ttl` from now.
    pub fn expiring_in(token: impl Into<String>, ttl: Duration) -> Result<Self> {
        Self::new(token, SystemTime::now() + ttl)
    }

    /// Returns a copy with the given expiry buffer.
    pub fn with_expiry_buffer(&self, buffer: Duration) -> Self {
        Self {
            expiry_buffer: Some(buffer),
            ..self.clone()
        }
    }

    /// Returns a copy with a buffer given in seconds. Negative values clamp to zero.
    pub fn with_expiry_buffer_secs(&self, secs: i64) -> Self {
        self.with_expiry_buffer(Duration::from_secs(secs.max(0) as u64))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// The buffer in effect. Zero when none was set.
    pub fn expiry_buffer(&self) -> Duration {
        self.expiry_buffer.unwrap_or(Duration::ZERO)
    }

    /// Returns `true` if a buffer was set explicitly, even a zero one.
    pub fn has_explicit_buffer(&self) -> bool {
        self.expiry_buffer.is_some()
    }

    /// Returns `true` if the credential is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    /// Returns `true` if the credential is expired at `now`.
    ///
    /// The boundary is exclusive: at exactly `expires_at - expiry_buffer` the
    /// credential is still fresh.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        let fresh_until = self
            .expires_at
            .checked_sub(self.expiry_buffer())
            .unwrap_or(UNIX_EPOCH);
        now > fresh_until
    }

    pub(crate) fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("expiry_buffer", &self.expiry_buffer)
            .finish()
    }
}

/// Fetches a replacement for an expired credential.
///
/// Implemented for any `Fn(Credential, RequestContext) -> impl Future<Output =
/// Result<Credential, BoxError>>`, so an async closure works as a delegate.
///
/// # Examples
///
/// ```
/// use partner_client::{BoxError, Credential, RequestContext};
/// use partner_client::credential::CredentialRefresher;
/// use std::time::Duration;
///
/// fn delegate() -> impl CredentialRefresher {
///     |_stale: Credential, _context: RequestContext| async move {
///         Ok::<_, BoxError>(Credential::expiring_in("renewed", Duration::from_secs(3600))?)
///     }
/// }
/// ```
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    /// Returns a new credential to replace `stale`.
    async fn refresh(
        &self,
        stale: Credential,
        context: RequestContext,
    ) -> std::result::Result<Credential, BoxError>;
}

#[async_trait]
impl<F, Fut> CredentialRefresher for F
where
    F: Fn(Credential, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Credential, BoxError>> + Send + 'static,
{
    async fn refresh(
        &self,
        stale: Credential,
        context: RequestContext,
    ) -> std::result::Result<Credential, BoxError> {
        (self)(stale, context).await
    }
}

/// Holds the current credential and refreshes it on demand.
pub struct CredentialProvider {
    current: RwLock<Credential>,
    refresher: Option<Arc<dyn CredentialRefresher>>,
    /// Held for the duration of a refresh. Holds the failure reason of the
    /// last finished refresh, if it failed.
    refresh_gate: Mutex<Option<String>>,
    /// Number of finished refreshes.
    refresh_rounds: AtomicU64,
    default_expiry_buffer: Duration,
}

impl CredentialProvider {
    /// Creates a provider. Without a refresher, an expired credential is fatal
    /// to every call until [`replace`](Self::replace) installs a new one.
    pub fn new(initial: Credential, refresher: Option<Arc<dyn CredentialRefresher>>) -> Self {
        Self {
            current: RwLock::new(initial),
            refresher,
            refresh_gate: Mutex::new(None),
            refresh_rounds: AtomicU64::new(0),
            default_expiry_buffer: Duration::ZERO,
        }
    }

    /// Applies `buffer` to every credential entering the provider that was
    /// created without a buffer, including the initial one.
    pub fn with_default_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.default_expiry_buffer = buffer;
        let initial = self.current.get_mut().clone();
        let initial = self.apply_default_buffer(initial);
        *self.current.get_mut() = initial;
        self
    }

    fn apply_default_buffer(&self, credential: Credential) -> Credential {
        if !credential.has_explicit_buffer() {
            credential.with_expiry_buffer(self.default_expiry_buffer)
        } else {
            credential
        }
    }

    /// Returns the current credential without checking freshness.
    pub async fn current(&self) -> Credential {
        self.current.read().await.clone()
    }

    /// Installs a new credential, e.g. after an interactive sign-in.
    pub async fn replace(&self, credential: Credential) {
        let credential = self.apply_default_buffer(credential);
        *self.current.write().await = credential;
    }

    /// Returns a credential that is not expired, refreshing it if needed.
    ///
    /// At most one refresh runs at a time. Callers that queue behind a refresh
    /// take its outcome: the swapped-in credential, or the same
    /// [`Error::Authentication`] if it failed. The delegate is not called
    /// again for them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if the credential is expired and no
    /// refresher is configured, if the refresher fails, or if it returns a
    /// credential that is already expired.
    pub async fn ensure_fresh(&self, context: &RequestContext) -> Result<Credential> {
        let round = self.refresh_rounds.load(Ordering::Acquire);
        let current = self.current().await;
        if !current.is_expired() {
            return Ok(current);
        }

        let refresher = self.refresher.as_ref().ok_or_else(|| {
            Error::Authentication(
                "credential expired and no refresh delegate is configured".to_string(),
            )
        })?;

        let mut last_failure = self.refresh_gate.lock().await;

        let current = self.current().await;
        if !current.is_expired() {
            tracing::debug!("Credential was refreshed by a concurrent call");
            return Ok(current);
        }
        if self.refresh_rounds.load(Ordering::Acquire) != round {
            if let Some(reason) = last_failure.as_ref() {
                tracing::debug!("Concurrent credential refresh failed");
                return Err(Error::Authentication(reason.clone()));
            }
        }

        tracing::info!(
            correlation_id = %context.correlation_id(),
            "Refreshing expired credential"
        );

        let outcome = self.refresh(&**refresher, current, context).await;
        *last_failure = outcome.as_ref().err().cloned();
        self.refresh_rounds.fetch_add(1, Ordering::Release);

        outcome.map_err(Error::Authentication)
    }

    async fn refresh(
        &self,
        refresher: &dyn CredentialRefresher,
        stale: Credential,
        context: &RequestContext,
    ) -> std::result::Result<Credential, String> {
        let refreshed = refresher
            .refresh(stale, context.clone())
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Credential refresh failed");
                format!("credential refresh failed: {}", e)
            })?;
        let refreshed = self.apply_default_buffer(refreshed);

        if refreshed.is_expired() {
            return Err("refresh delegate returned an expired credential".to_string());
        }

        *self.current.write().await = refreshed.clone();
        Ok(refreshed)
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("has_refresher", &self.refresher.is_some())
            .field("default_expiry_buffer", &self.default_expiry_buffer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn expired() -> Credential {
        Credential::new("stale", SystemTime::now() - Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_empty_token_is_rejected() {
        let later = SystemTime::now() + Duration::from_secs(60);
        assert!(matches!(Credential::new("", later), Err(Error::Argument(_))));
        assert!(matches!(Credential::new("   ", later), Err(Error::Argument(_))));
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let expires_at = UNIX_EPOCH + Duration::from_secs(1_000);
        let credential = Credential::new("t", expires_at)
            .unwrap()
            .with_expiry_buffer(Duration::from_secs(100));
        let boundary = UNIX_EPOCH + Duration::from_secs(900);

        assert!(!credential.is_expired_at(boundary));
        assert!(credential.is_expired_at(boundary + Duration::from_nanos(1)));
        assert!(!credential.is_expired_at(boundary - Duration::from_secs(1)));
    }

    #[test]
    fn test_zero_and_negative_buffers_are_plain_expiry_checks() {
        let expires_at = UNIX_EPOCH + Duration::from_secs(1_000);
        for credential in [
            Credential::new("t", expires_at).unwrap(),
            Credential::new("t", expires_at)
                .unwrap()
                .with_expiry_buffer_secs(-500),
        ] {
            assert_eq!(credential.expiry_buffer(), Duration::ZERO);
            assert!(!credential.is_expired_at(expires_at));
            assert!(credential.is_expired_at(expires_at + Duration::from_millis(1)));
        }
    }

    #[test]
    fn test_buffer_larger_than_lifetime_means_expired() {
        let credential = Credential::new("t", UNIX_EPOCH + Duration::from_secs(5))
            .unwrap()
            .with_expiry_buffer(Duration::from_secs(10));
        assert!(credential.is_expired_at(UNIX_EPOCH + Duration::from_secs(1)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::expiring_in("super-secret", Duration::from_secs(60)).unwrap();
        assert!(!format!("{:?}", credential).contains("super-secret"));
    }

    #[tokio::test]
    async fn test_fresh_credential_is_returned_without_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let refresher = move |_: Credential, _: RequestContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, BoxError>(expired()) }
        };
        let fresh = Credential::expiring_in("fresh", Duration::from_secs(3600)).unwrap();
        let provider = CredentialProvider::new(fresh, Some(Arc::new(refresher)));

        let credential = provider.ensure_fresh(&RequestContext::new()).await.unwrap();

        assert_eq!(credential.token(), "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_without_refresher_is_authentication_error() {
        let provider = CredentialProvider::new(expired(), None);
        let result = provider.ensure_fresh(&RequestContext::new()).await;
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn test_refresher_receives_stale_credential_and_context() {
        let context = RequestContext::new();
        let expected_correlation = context.correlation_id();
        let refresher = move |stale: Credential, ctx: RequestContext| async move {
            assert_eq!(stale.token(), "stale");
            assert_eq!(ctx.correlation_id(), expected_correlation);
            Ok::<_, BoxError>(Credential::expiring_in("renewed", Duration::from_secs(3600))?)
        };
        let provider = CredentialProvider::new(expired(), Some(Arc::new(refresher)));

        let credential = provider.ensure_fresh(&context).await.unwrap();

        assert_eq!(credential.token(), "renewed");
        assert_eq!(provider.current().await.token(), "renewed");
    }

    #[tokio::test]
    async fn test_failed_refresh_is_authentication_error() {
        let refresher = |_: Credential, _: RequestContext| async move {
            Err::<Credential, BoxError>("identity provider unavailable".into())
        };
        let provider = CredentialProvider::new(expired(), Some(Arc::new(refresher)));

        match provider.ensure_fresh(&RequestContext::new()).await {
            Err(Error::Authentication(reason)) => {
                assert!(reason.contains("identity provider unavailable"))
            }
            other => panic!("Expected Authentication, got {:?}", other),
        }
        assert_eq!(provider.current().await.token(), "stale");
    }

    #[tokio::test]
    async fn test_refresh_returning_expired_credential_is_rejected() {
        let refresher =
            |_: Credential, _: RequestContext| async move { Ok::<_, BoxError>(expired()) };
        let provider = CredentialProvider::new(expired(), Some(Arc::new(refresher)));

        let result = provider.ensure_fresh(&RequestContext::new()).await;
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let refresher = move |_: Credential, _: RequestContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, BoxError>(Credential::expiring_in("renewed", Duration::from_secs(3600))?)
            }
        };
        let provider = Arc::new(CredentialProvider::new(
            expired(),
            Some(Arc::new(refresher)),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.ensure_fresh(&RequestContext::new()).await })
            })
            .collect();

        for task in tasks {
            let credential = task.await.unwrap().unwrap();
            assert_eq!(credential.token(), "renewed");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_failed_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let refresher = move |_: Credential, _: RequestContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err::<Credential, BoxError>("identity provider unavailable".into())
            }
        };
        let provider = Arc::new(CredentialProvider::new(
            expired(),
            Some(Arc::new(refresher)),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.ensure_fresh(&RequestContext::new()).await })
            })
            .collect();

        for task in tasks {
            match task.await.unwrap() {
                Err(Error::Authentication(reason)) => {
                    assert!(reason.contains("identity provider unavailable"))
                }
                other => panic!("Expected Authentication, got {:?}", other),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_later_call_after_failed_refresh_tries_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let refresher = move |_: Credential, _: RequestContext| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    return Err::<Credential, BoxError>("temporarily unavailable".into());
                }
                Ok(Credential::expiring_in("renewed", Duration::from_secs(3600))?)
            }
        };
        let provider = CredentialProvider::new(expired(), Some(Arc::new(refresher)));

        assert!(provider.ensure_fresh(&RequestContext::new()).await.is_err());
        let credential = provider.ensure_fresh(&RequestContext::new()).await.unwrap();

        assert_eq!(credential.token(), "renewed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_explicit_zero_buffer_survives_default() {
        let zero = Credential::expiring_in("t", Duration::from_secs(120))
            .unwrap()
            .with_expiry_buffer(Duration::ZERO);
        let provider = CredentialProvider::new(zero, None)
            .with_default_expiry_buffer(Duration::from_secs(300));

        let credential = provider.ensure_fresh(&RequestContext::new()).await.unwrap();
        assert_eq!(credential.token(), "t");
        assert_eq!(credential.expiry_buffer(), Duration::ZERO);

        let clamped = Credential::expiring_in("n", Duration::from_secs(120))
            .unwrap()
            .with_expiry_buffer_secs(-30);
        provider.replace(clamped).await;
        let credential = provider.ensure_fresh(&RequestContext::new()).await.unwrap();
        assert_eq!(credential.token(), "n");
        assert_eq!(credential.expiry_buffer(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_default_buffer_applies_only_to_unbuffered_credentials() {
        let unbuffered = Credential::expiring_in("a", Duration::from_secs(3600)).unwrap();
        let provider = CredentialProvider::new(unbuffered, None)
            .with_default_expiry_buffer(Duration::from_secs(300));
        assert_eq!(
            provider.current().await.expiry_buffer(),
            Duration::from_secs(300)
        );

        let own_buffer = Credential::expiring_in("b", Duration::from_secs(3600))
            .unwrap()
            .with_expiry_buffer(Duration::from_secs(5));
        provider.replace(own_buffer).await;
        assert_eq!(
            provider.current().await.expiry_buffer(),
            Duration::from_secs(5)
        );
    }
}
