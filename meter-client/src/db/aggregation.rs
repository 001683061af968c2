//! Rollups over one account's raw 15-minute readings.
//!
//! Buckets are cut with `substr` over the fixed-width period text and summed
//! in SQL over the integer fixed-point columns. Averages divide the decimal
//! sum by the integer sample count, so no floating point is involved.
//! Empty windows yield empty results.

use rust_decimal::Decimal;
use time::{macros::format_description, Date, Duration, PrimitiveDateTime, Time};

use super::{
    codec::{encode_period, from_fixed},
    AccountPartition, StoreError,
};
use crate::domain::{AggregateSpan, MeterReading};

const DATE_BUCKET: &str = "substr(period_start, 1, 10)";
const HOUR_BUCKET: &str = "substr(period_start, 1, 13)";
const HOUR_OF_DAY_BUCKET: &str = "substr(period_start, 12, 2)";
const TIME_OF_DAY_BUCKET: &str = "substr(period_start, 12, 5)";

#[derive(Debug, sqlx::FromRow)]
struct BucketRow {
    bucket: String,
    rate_a: i64,
    rate_b: i64,
    rate_c: i64,
    samples: i64,
}

impl BucketRow {
    fn sum(&self, start: PrimitiveDateTime, span: AggregateSpan) -> MeterReading {
        MeterReading::aggregated(
            start,
            from_fixed(self.rate_a),
            from_fixed(self.rate_b),
            from_fixed(self.rate_c),
            span,
        )
    }

    fn average(&self, start: PrimitiveDateTime, span: AggregateSpan) -> MeterReading {
        let n = Decimal::from(self.samples.max(1));
        MeterReading::aggregated(
            start,
            from_fixed(self.rate_a) / n,
            from_fixed(self.rate_b) / n,
            from_fixed(self.rate_c) / n,
            span,
        )
    }
}

/// Group `[start, end)` by `bucket_expr`, ordered by bucket.
async fn buckets(
    partition: &AccountPartition,
    bucket_expr: &str,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Result<Vec<BucketRow>, StoreError> {
    let sql = format!(
        r#"
        SELECT
            {bucket_expr} AS bucket,
            SUM(rate_a)   AS rate_a,
            SUM(rate_b)   AS rate_b,
            SUM(rate_c)   AS rate_c,
            COUNT(*)      AS samples
        FROM meter_readings
        WHERE account_key = ?1
          AND period_start >= ?2
          AND period_start <  ?3
        GROUP BY bucket
        ORDER BY bucket
        "#
    );

    let rows = sqlx::query_as::<_, BucketRow>(&sql)
        .bind(partition.key().as_str())
        .bind(encode_period(start)?)
        .bind(encode_period(end)?)
        .fetch_all(partition.pool())
        .await?;

    Ok(rows)
}

fn corrupt(bucket: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::CorruptRow(format!("bucket '{bucket}': {e}"))
}

fn parse_date(bucket: &str) -> Result<Date, StoreError> {
    Date::parse(bucket, format_description!("[year]-[month]-[day]")).map_err(|e| corrupt(bucket, e))
}

fn parse_hour(bucket: &str) -> Result<u8, StoreError> {
    bucket.parse::<u8>().map_err(|e| corrupt(bucket, e))
}

fn parse_time_of_day(bucket: &str) -> Result<Time, StoreError> {
    Time::parse(bucket, format_description!("[hour]:[minute]")).map_err(|e| corrupt(bucket, e))
}

fn at_hour(date: Date, hour: u8, bucket: &str) -> Result<PrimitiveDateTime, StoreError> {
    let time = Time::from_hms(hour, 0, 0).map_err(|e| corrupt(bucket, e))?;
    Ok(PrimitiveDateTime::new(date, time))
}

/// `end` minus `days` whole days, clamped to the earliest representable instant.
pub fn days_back(end: PrimitiveDateTime, days: u32) -> PrimitiveDateTime {
    end.checked_sub(Duration::days(i64::from(days)))
        .unwrap_or(Date::MIN.midnight())
}

/// Average of each 15-minute slot over the `days` complete days before `today`.
///
/// Rows are stamped on `today` at their time of day.
pub async fn average_by_time_of_day(
    partition: &AccountPartition,
    days: u32,
    today: Date,
) -> Result<Vec<MeterReading>, StoreError> {
    let end = today.midnight();
    let start = days_back(end, days);

    buckets(partition, TIME_OF_DAY_BUCKET, start, end)
        .await?
        .iter()
        .map(|row| {
            let time = parse_time_of_day(&row.bucket)?;
            Ok(row.average(PrimitiveDateTime::new(today, time), AggregateSpan::Quarter))
        })
        .collect()
}

/// Sums per calendar hour over `[start, end)`.
pub async fn hourly_totals(
    partition: &AccountPartition,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Result<Vec<MeterReading>, StoreError> {
    buckets(partition, HOUR_BUCKET, start, end)
        .await?
        .iter()
        .map(|row| {
            let (date, hour) = row
                .bucket
                .split_once(' ')
                .ok_or_else(|| corrupt(&row.bucket, "missing hour"))?;
            let ts = at_hour(parse_date(date)?, parse_hour(hour)?, &row.bucket)?;
            Ok(row.sum(ts, AggregateSpan::Hour))
        })
        .collect()
}

/// Average reading per hour of day (0-23) over `[start, end)`, collapsed across days.
///
/// Rows are stamped on `today` at their hour.
pub async fn hourly_averages(
    partition: &AccountPartition,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
    today: Date,
) -> Result<Vec<MeterReading>, StoreError> {
    buckets(partition, HOUR_OF_DAY_BUCKET, start, end)
        .await?
        .iter()
        .map(|row| {
            let ts = at_hour(today, parse_hour(&row.bucket)?, &row.bucket)?;
            Ok(row.average(ts, AggregateSpan::Hour))
        })
        .collect()
}

/// Sums per calendar day over `[start, end)`.
pub async fn daily_totals(
    partition: &AccountPartition,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Result<Vec<MeterReading>, StoreError> {
    buckets(partition, DATE_BUCKET, start, end)
        .await?
        .iter()
        .map(|row| Ok(row.sum(parse_date(&row.bucket)?.midnight(), AggregateSpan::Day)))
        .collect()
}
