use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(super) const RATE_LIMIT_MAX_RETRIES: usize = 4;
pub(super) const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(1);
pub(super) const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Whether the translation service asked us to slow down.
pub(super) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit") || lower.contains("rate_limit") || lower.contains("overloaded")
}

pub(super) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    None
}

pub(super) async fn wait_with_backoff(
    service: &str,
    attempt: usize,
    delay: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let wait = retry_after.map_or(delay, |retry_after| retry_after.max(delay));
    warn!(
        "{} rate limited; retrying in {:.1}s (attempt {}/{})",
        service,
        wait.as_secs_f32(),
        attempt,
        RATE_LIMIT_MAX_RETRIES
    );
    sleep(wait).await;
    next_delay(delay)
}

fn next_delay(current: Duration) -> Duration {
    current
        .saturating_mul(2)
        .max(RATE_LIMIT_BASE_DELAY)
        .min(RATE_LIMIT_MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        assert_eq!(next_delay(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(next_delay(Duration::ZERO), RATE_LIMIT_BASE_DELAY);
        assert_eq!(next_delay(Duration::from_secs(20)), RATE_LIMIT_MAX_DELAY);
    }

    #[test]
    fn retry_after_reads_whole_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert("retry-after", HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn detects_rate_limits() {
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, ""));
        assert!(is_rate_limited(StatusCode::BAD_REQUEST, "Rate limit reached"));
        assert!(!is_rate_limited(StatusCode::UNAUTHORIZED, "invalid key"));
    }
}
