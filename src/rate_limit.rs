//! Throttling hints sent by the service.
//!
//! Throttled (`429`) and unavailable (`503`) responses may carry a
//! `Retry-After` header. The retry policy uses it as a floor for the next
//! backoff delay.

use http::HeaderMap;
use std::time::{Duration, SystemTime};

/// Parses the `Retry-After` header.
///
/// Supports both delay-seconds (integer) and HTTP-date formats. A date in
/// the past yields `None`.
///
/// # Examples
///
/// ```
/// use partner_client::rate_limit::parse_retry_after;
/// use http::HeaderMap;
/// use std::time::Duration;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("retry-after", "30".parse().unwrap());
///
/// assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(30)));
/// ```
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date_time = httpdate::parse_http_date(header).ok()?;
    date_time.duration_since(SystemTime::now()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("60"));

        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let mut headers = HeaderMap::new();
        let later = SystemTime::now() + Duration::from_secs(120);
        headers.insert(
            "retry-after",
            HeaderValue::from_str(&httpdate::fmt_http_date(later)).unwrap(),
        );

        let delay = parse_retry_after(&headers).expect("future date parses");
        // HTTP dates have whole-second precision
        assert!(
            delay >= Duration::from_secs(118) && delay <= Duration::from_secs(120),
            "unexpected delay {delay:?}"
        );
    }

    #[test]
    fn test_parse_retry_after_past_date_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );

        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_missing_or_garbage_header() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }
}
