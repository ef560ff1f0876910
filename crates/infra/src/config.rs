//! Dispatch configuration loaded from the environment.
//!
//! Unparseable values are logged and replaced by their defaults; startup never
//! fails because of a typo in a tuning knob.

use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use fiscalbridge_fiscal::{BackoffStrategy, FailureClassifier, RetryPolicy};

/// Queue, reaper, retry and shift-cache tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// How often bridges are told to poll.
    pub poll_interval_ms: u64,
    /// Maximum jobs returned per poll.
    pub batch_size: usize,
    /// A processing job older than this is considered abandoned.
    pub stuck_timeout: Duration,
    /// Delay before a reaped job becomes eligible again.
    pub reap_cooldown: Duration,
    pub retry_policy: RetryPolicy,
    /// Built-in permanent-failure phrases plus `FISCAL_NON_RETRIABLE_PATTERNS`.
    pub failure_classifier: FailureClassifier,
    pub shift_status_ttl: Duration,
    /// Offset used for bridge timestamps that carry none.
    pub merchant_offset: FixedOffset,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            batch_size: 5,
            stuck_timeout: Duration::from_secs(300),
            reap_cooldown: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            failure_classifier: FailureClassifier::default(),
            shift_status_ttl: Duration::from_secs(120),
            merchant_offset: default_offset(),
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let lookup = &lookup;

        let strategy = match lookup("FISCAL_JOB_BACKOFF") {
            None => defaults.retry_policy.strategy,
            Some(raw) => BackoffStrategy::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(key = "FISCAL_JOB_BACKOFF", value = %raw, "unknown backoff strategy; using fixed");
                BackoffStrategy::Fixed
            }),
        };

        let merchant_offset = match lookup("MERCHANT_UTC_OFFSET") {
            None => defaults.merchant_offset,
            Some(raw) => parse_utc_offset(&raw).unwrap_or_else(|| {
                tracing::warn!(key = "MERCHANT_UTC_OFFSET", value = %raw, "invalid UTC offset; using +03:00");
                defaults.merchant_offset
            }),
        };

        // Comma separated, added to the built-in phrases.
        let failure_classifier = lookup("FISCAL_NON_RETRIABLE_PATTERNS")
            .map(|raw| {
                raw.split(',')
                    .fold(FailureClassifier::default(), |classifier, phrase| {
                        classifier.with_pattern(phrase)
                    })
            })
            .unwrap_or(defaults.failure_classifier);

        Self {
            poll_interval_ms: parse_or(lookup, "BRIDGE_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            batch_size: parse_or(lookup, "FISCAL_JOB_BATCH_SIZE", defaults.batch_size).max(1),
            stuck_timeout: secs_or(lookup, "FISCAL_JOB_STUCK_TIMEOUT_SECS", defaults.stuck_timeout),
            reap_cooldown: secs_or(lookup, "FISCAL_JOB_REAP_COOLDOWN_SECS", defaults.reap_cooldown),
            retry_policy: RetryPolicy {
                max_retries: parse_or(lookup, "FISCAL_JOB_MAX_RETRIES", defaults.retry_policy.max_retries),
                base_delay: secs_or(lookup, "FISCAL_JOB_RETRY_DELAY_SECS", defaults.retry_policy.base_delay),
                max_delay: secs_or(
                    lookup,
                    "FISCAL_JOB_RETRY_MAX_DELAY_SECS",
                    defaults.retry_policy.max_delay,
                ),
                strategy,
            },
            failure_classifier,
            shift_status_ttl: secs_or(lookup, "SHIFT_STATUS_TTL_SECS", defaults.shift_status_ttl),
            merchant_offset,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "invalid value; using default");
            default
        }),
    }
}

fn secs_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_or(lookup, key, default.as_secs()))
}

fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap_or_else(|| Utc.fix())
}

/// Parse `+03:00`, `-0530`, `+3` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => (rest.get(..2)?, rest.get(2..)?),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
