//! Fiscal shift projection.
//!
//! A bridge reports whether the fiscal shift is open. The projection lives in a
//! TTL cache (presence) and in the printer config (durable); both are built
//! from a `ShiftUpdate`.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use fiscalbridge_core::{DomainError, DomainResult};

use crate::job::ProviderId;

/// Cached shift state for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftStatus {
    pub shift_open: bool,
    pub shift_opened_at: Option<DateTime<Utc>>,
    pub provider: ProviderId,
    pub last_updated: DateTime<Utc>,
}

/// Shift state as reported by a bridge or derived from a shift job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftUpdate {
    pub shift_open: bool,
    pub shift_opened_at: Option<DateTime<Utc>>,
    pub provider: ProviderId,
}

impl ShiftUpdate {
    pub fn opened(provider: ProviderId, at: Option<DateTime<Utc>>) -> Self {
        Self {
            shift_open: true,
            shift_opened_at: at,
            provider,
        }
    }

    pub fn closed(provider: ProviderId) -> Self {
        Self {
            shift_open: false,
            shift_opened_at: None,
            provider,
        }
    }

    /// Cache entry for this update. A closed shift has no opening time.
    pub fn to_status(&self, now: DateTime<Utc>) -> ShiftStatus {
        ShiftStatus {
            shift_open: self.shift_open,
            shift_opened_at: if self.shift_open {
                self.shift_opened_at
            } else {
                None
            },
            provider: self.provider.clone(),
            last_updated: now,
        }
    }
}

/// What UI readers get. `online == false` means "no fresh report", in which
/// case `shift_open` is unknown (`None`), never `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftStatusView {
    pub online: bool,
    pub shift_open: Option<bool>,
    pub shift_opened_at: Option<DateTime<Utc>>,
    pub provider: Option<ProviderId>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ShiftStatusView {
    pub fn offline() -> Self {
        Self {
            online: false,
            shift_open: None,
            shift_opened_at: None,
            provider: None,
            last_updated: None,
        }
    }

    pub fn from_cache(entry: Option<ShiftStatus>) -> Self {
        match entry {
            Some(s) => Self {
                online: true,
                shift_open: Some(s.shift_open),
                shift_opened_at: s.shift_opened_at,
                provider: Some(s.provider),
                last_updated: Some(s.last_updated),
            },
            None => Self::offline(),
        }
    }
}

/// Accepted `shift_opened_at` encodings.
///
/// `Rfc3339` (v2) carries its own offset and is what current bridges send.
/// The v1 forms are merchant wall-clock time without an offset and are
/// interpreted in the merchant's configured fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftTimestampFormat {
    /// `2026-01-05T09:30:00+03:00`
    Rfc3339,
    /// `2026-01-05T09:30:00` or `2026-01-05 09:30:00`, optional fraction
    NaiveIso,
    /// `05.01.2026 09:30:00` or `05.01.2026 09:30`
    DottedDayFirst,
}

impl ShiftTimestampFormat {
    pub const ALL: [ShiftTimestampFormat; 3] = [
        ShiftTimestampFormat::Rfc3339,
        ShiftTimestampFormat::NaiveIso,
        ShiftTimestampFormat::DottedDayFirst,
    ];

    pub fn version(&self) -> u8 {
        match self {
            ShiftTimestampFormat::Rfc3339 => 2,
            ShiftTimestampFormat::NaiveIso | ShiftTimestampFormat::DottedDayFirst => 1,
        }
    }

    fn naive_patterns(&self) -> &'static [&'static str] {
        match self {
            ShiftTimestampFormat::Rfc3339 => &[],
            ShiftTimestampFormat::NaiveIso => &[
                "%Y-%m-%dT%H:%M:%S",
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%dT%H:%M:%S%.f",
                "%Y-%m-%d %H:%M:%S%.f",
            ],
            ShiftTimestampFormat::DottedDayFirst => &["%d.%m.%Y %H:%M:%S", "%d.%m.%Y %H:%M"],
        }
    }

    fn parse(&self, raw: &str, merchant_offset: FixedOffset) -> Option<DateTime<Utc>> {
        if *self == ShiftTimestampFormat::Rfc3339 {
            return DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }

        self.naive_patterns().iter().find_map(|pattern| {
            let naive = NaiveDateTime::parse_from_str(raw, pattern).ok()?;
            merchant_offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        })
    }
}

/// Parse a bridge-reported shift opening time into UTC.
///
/// Formats are tried in `ShiftTimestampFormat::ALL` order; the matching
/// format is returned alongside the instant.
pub fn parse_shift_opened_at(
    raw: &str,
    merchant_offset: FixedOffset,
) -> DomainResult<(DateTime<Utc>, ShiftTimestampFormat)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DomainError::validation("shift_opened_at is empty"));
    }

    ShiftTimestampFormat::ALL
        .iter()
        .find_map(|format| format.parse(raw, merchant_offset).map(|at| (at, *format)))
        .ok_or_else(|| {
            DomainError::validation(format!("unrecognized shift_opened_at format: {raw:?}"))
        })
}
