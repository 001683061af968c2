use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use super::AccountKey;

/// Interval length a reading row stands for.
///
/// Raw portal readings are always `Quarter`; aggregation queries label their
/// rows `Hour` or `Day` so consumers can tell rollups from raw intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AggregateSpan {
    Quarter,
    Hour,
    Day,
}

impl AggregateSpan {
    pub const fn minutes(self) -> i64 {
        match self {
            Self::Quarter => 15,
            Self::Hour => 60,
            Self::Day => 24 * 60,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::minutes(self.minutes())
    }
}

/// One interval of consumption split over the three rates.
///
/// `period_start` is portal-local time. For raw readings it sits on a
/// 15-minute boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeterReading {
    pub period_start: PrimitiveDateTime,
    pub rate_a: Decimal,
    pub rate_b: Decimal,
    pub rate_c: Decimal,
    pub span: AggregateSpan,
}

impl MeterReading {
    pub fn new(period_start: PrimitiveDateTime, rate_a: Decimal, rate_b: Decimal, rate_c: Decimal) -> Self {
        Self::aggregated(period_start, rate_a, rate_b, rate_c, AggregateSpan::Quarter)
    }

    pub fn aggregated(
        period_start: PrimitiveDateTime,
        rate_a: Decimal,
        rate_b: Decimal,
        rate_c: Decimal,
        span: AggregateSpan,
    ) -> Self {
        Self {
            period_start,
            rate_a,
            rate_b,
            rate_c,
            span,
        }
    }

    /// Last instant covered by this row (start + span - 1ms).
    pub fn period_end(&self) -> PrimitiveDateTime {
        self.period_start + self.span.duration() - Duration::milliseconds(1)
    }

    /// Always derived from the rates; the portal's own total column is never trusted.
    pub fn total(&self) -> Decimal {
        self.rate_a.saturating_add(self.rate_b).saturating_add(self.rate_c)
    }
}

impl fmt::Display for MeterReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}: A={} B={} C={} total={}",
            self.period_start,
            self.period_end(),
            self.rate_a,
            self.rate_b,
            self.rate_c,
            self.total()
        )
    }
}

/// Persisted form of a [`MeterReading`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReading {
    pub account_key: AccountKey,
    pub reading: MeterReading,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<StoredReading> for MeterReading {
    fn from(stored: StoredReading) -> Self {
        stored.reading
    }
}
