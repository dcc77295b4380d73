//! Retry with class-specific backoff for the FETCHING state.
//!
//! Failures are mapped to an [`ErrorClass`] by [`classify_message`] (or
//! [`SourceError::class`]), and each class has its own exponential base
//! and jitter window. Parsing failures are never retried since the same
//! bytes will fail the same way.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::{ErrorClass, FetchAttempt, SourceError};

/// Default number of attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

const RATE_LIMIT_MARKERS: &[&str] = &["429", "rate limit", "too many requests", "ratelimit"];
const BOT_MARKERS: &[&str] = &[
    "403",
    "cloudflare",
    "captcha",
    "forbidden",
    "access denied",
    "bot detected",
    "blocked",
];
const AUTH_MARKERS: &[&str] = &["401", "unauthorized", "authentication", "auth failed"];
const NETWORK_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "connect",
    "network",
    "dns",
    "reset by peer",
    "502",
    "503",
    "504",
];
const PARSING_MARKERS: &[&str] = &[
    "parse",
    "json",
    "decode",
    "not found in data",
    "out of range",
    "cannot navigate",
    "keyerror",
    "typeerror",
    "valueerror",
];

/// Classifies a failure from its message and optional HTTP status.
///
/// Status codes win over message text. Message markers are checked in the
/// order rate limit, bot detection, auth, network, parsing.
#[must_use]
pub fn classify_message(message: &str, status: Option<u16>) -> ErrorClass {
    if let Some(class) = status.and_then(status_class) {
        return class;
    }

    let lower = message.to_ascii_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if has(RATE_LIMIT_MARKERS) {
        ErrorClass::RateLimit
    } else if has(BOT_MARKERS) {
        ErrorClass::BotDetection
    } else if has(AUTH_MARKERS) {
        ErrorClass::Auth
    } else if has(NETWORK_MARKERS) {
        ErrorClass::Network
    } else if has(PARSING_MARKERS) {
        ErrorClass::Parsing
    } else {
        ErrorClass::Unknown
    }
}

/// Class implied by an HTTP status alone, if the status is one that
/// carries meaning for retries.
#[must_use]
pub const fn status_class(status: u16) -> Option<ErrorClass> {
    match status {
        429 => Some(ErrorClass::RateLimit),
        403 => Some(ErrorClass::BotDetection),
        401 => Some(ErrorClass::Auth),
        500.. => Some(ErrorClass::Network),
        _ => None,
    }
}

/// Exponential base and jitter window (seconds) per class.
#[must_use]
pub const fn backoff_params(class: ErrorClass) -> (f64, (f64, f64)) {
    match class {
        ErrorClass::RateLimit => (3.0, (5.0, 15.0)),
        ErrorClass::BotDetection => (4.0, (10.0, 30.0)),
        ErrorClass::Auth => (2.0, (2.0, 5.0)),
        ErrorClass::Network => (2.0, (0.5, 2.0)),
        ErrorClass::Unknown => (2.0, (0.5, 1.5)),
        ErrorClass::Parsing => (1.0, (0.0, 0.0)),
    }
}

/// How often and how patiently to retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Add the class jitter window to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_DELAY,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay before retrying after failure number `attempt` (0-based).
    ///
    /// `base * factor^attempt`, plus uniform jitter from the class window
    /// when enabled.
    #[must_use]
    pub fn delay(&self, class: ErrorClass, attempt: u32) -> Duration {
        let (factor, (lo, hi)) = backoff_params(class);
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let mut seconds = self.base_delay.as_secs_f64() * factor.powi(exponent);
        if self.jitter && hi > lo {
            seconds += rand::thread_rng().gen_range(lo..hi);
        }
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable class, or
/// `policy.max_retries` attempts have been made. The last error is
/// returned on exhaustion.
///
/// `op` receives the attempt index and the class of the previous failure
/// so it can refresh a session after an auth failure.
///
/// # Errors
///
/// Returns the last [`SourceError`] produced by `op`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, SourceError>
where
    F: FnMut(FetchAttempt) -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let attempts = policy.max_retries.max(1);
    let mut previous = None;
    let mut seen_bot = false;

    for index in 0..attempts {
        let error = match op(FetchAttempt { index, previous }).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let class = error.class();
        if !class.is_retryable() {
            log::error!("Not retrying {class} error: {error}");
            return Err(error);
        }
        if index + 1 >= attempts {
            log::error!("All {attempts} attempts failed: {error}");
            return Err(error);
        }

        if class == ErrorClass::BotDetection && !seen_bot {
            seen_bot = true;
            log::warn!("Bot detection suspected; consider enabling stealth mode");
        }

        let delay = policy.delay(class, index);
        log::warn!(
            "Attempt {}/{attempts} failed ({class}): {error}. Retrying in {:.1}s...",
            index + 1,
            delay.as_secs_f64()
        );
        tokio::time::sleep(delay).await;
        previous = Some(class);
    }

    Err(SourceError::Empty("no attempts were made".to_owned()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn instant() -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::ZERO)
            .with_jitter(false)
    }

    #[test]
    fn classifies_by_status_then_message() {
        assert_eq!(classify_message("whatever", Some(429)), ErrorClass::RateLimit);
        assert_eq!(classify_message("Rate limit exceeded", None), ErrorClass::RateLimit);
        assert_eq!(classify_message("Cloudflare challenge", None), ErrorClass::BotDetection);
        assert_eq!(classify_message("solve the CAPTCHA", None), ErrorClass::BotDetection);
        assert_eq!(classify_message("401 Unauthorized", None), ErrorClass::Auth);
        assert_eq!(classify_message("operation timed out", None), ErrorClass::Network);
        assert_eq!(classify_message("JSON error: EOF", None), ErrorClass::Parsing);
        assert_eq!(classify_message("something odd", None), ErrorClass::Unknown);
        assert_eq!(classify_message("", Some(503)), ErrorClass::Network);
    }

    #[test]
    fn delays_follow_class_formula() {
        let policy = RetryPolicy::default().with_jitter(false);
        assert_eq!(policy.delay(ErrorClass::RateLimit, 2), Duration::from_secs(18));
        assert_eq!(policy.delay(ErrorClass::BotDetection, 1), Duration::from_secs(8));
        assert_eq!(policy.delay(ErrorClass::Network, 0), Duration::from_secs(2));

        let jittered = RetryPolicy::default();
        for _ in 0..20 {
            let d = jittered.delay(ErrorClass::RateLimit, 0).as_secs_f64();
            assert!((7.0..17.0).contains(&d), "{d}");
        }
    }

    #[tokio::test]
    async fn exhausts_after_max_retries_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&instant(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SourceError::Empty("connection reset".to_owned())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_MAX_RETRIES);
        assert_eq!(result.unwrap_err().to_string(), "connection reset");
    }

    #[tokio::test]
    async fn recovers_and_reports_previous_class() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&instant(), |attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(SourceError::Status {
                        status: 429,
                        url: String::new(),
                    })
                } else {
                    Ok(attempt.previous)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), Some(ErrorClass::RateLimit));
    }
}
