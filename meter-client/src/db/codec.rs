//! Column encodings shared by the query modules.
//!
//! Rates are stored as integer ten-thousandths so SQLite can `SUM` them
//! exactly. Period timestamps are fixed-width text, so lexical order is
//! chronological order and `substr` yields date/hour/minute buckets.

use rust_decimal::{prelude::ToPrimitive, Decimal};
use time::{
    format_description::BorrowedFormatItem, macros::format_description, Date, OffsetDateTime, PrimitiveDateTime,
};

use super::StoreError;
use crate::domain::{AccountKey, MeterReading, StoredReading};

pub(crate) const FIXED_SCALE: u32 = 4;
const FIXED_FACTOR: i64 = 10_000;

const PERIOD_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const PERIOD_END_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");

pub(crate) fn to_fixed(value: Decimal) -> Result<i64, StoreError> {
    value
        .checked_mul(Decimal::from(FIXED_FACTOR))
        .and_then(|scaled| scaled.round().to_i64())
        .ok_or(StoreError::RateOutOfRange(value))
}

pub(crate) fn from_fixed(value: i64) -> Decimal {
    Decimal::new(value, FIXED_SCALE)
}

pub(crate) fn encode_period(ts: PrimitiveDateTime) -> Result<String, StoreError> {
    ts.format(PERIOD_FORMAT).map_err(|e| StoreError::Timestamp(e.to_string()))
}

pub(crate) fn encode_period_end(ts: PrimitiveDateTime) -> Result<String, StoreError> {
    ts.format(PERIOD_END_FORMAT).map_err(|e| StoreError::Timestamp(e.to_string()))
}

pub(crate) fn decode_period(s: &str) -> Result<PrimitiveDateTime, StoreError> {
    PrimitiveDateTime::parse(s, PERIOD_FORMAT).map_err(|e| StoreError::CorruptRow(format!("period '{s}': {e}")))
}

/// Half-open `[midnight, next midnight)` bounds of a day, encoded.
pub(crate) fn day_bounds(date: Date) -> Result<(String, String), StoreError> {
    let start = date.midnight();
    let end = date
        .next_day()
        .ok_or_else(|| StoreError::Timestamp(format!("no day after {date}")))?
        .midnight();
    Ok((encode_period(start)?, encode_period(end)?))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ReadingRow {
    pub account_key: String,
    pub period_start: String,
    pub rate_a: i64,
    pub rate_b: i64,
    pub rate_c: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ReadingRow {
    pub(crate) fn into_stored(self) -> Result<StoredReading, StoreError> {
        Ok(StoredReading {
            account_key: AccountKey::new(&self.account_key)?,
            reading: MeterReading::new(
                decode_period(&self.period_start)?,
                from_fixed(self.rate_a),
                from_fixed(self.rate_b),
                from_fixed(self.rate_c),
            ),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
