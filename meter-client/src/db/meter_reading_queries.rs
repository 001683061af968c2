use sqlx::{QueryBuilder, Sqlite};
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use super::{
    codec::{day_bounds, decode_period, encode_period, encode_period_end, to_fixed, ReadingRow},
    AccountPartition, StoreError,
};
use crate::domain::{MeterReading, StoredReading};

// Ten bound columns per row keeps each statement well under SQLite's variable limit.
const INSERT_BATCH: usize = 500;

const SELECT_COLUMNS: &str = "account_key, period_start, rate_a, rate_b, rate_c, created_at, updated_at";

struct EncodedReading {
    period_start: String,
    period_end: String,
    rate_a: i64,
    rate_b: i64,
    rate_c: i64,
    total: i64,
}

fn encode(reading: &MeterReading) -> Result<EncodedReading, StoreError> {
    let rate_a = to_fixed(reading.rate_a)?;
    let rate_b = to_fixed(reading.rate_b)?;
    let rate_c = to_fixed(reading.rate_c)?;
    let total = rate_a
        .checked_add(rate_b)
        .and_then(|ab| ab.checked_add(rate_c))
        .ok_or(StoreError::RateOutOfRange(reading.total()))?;
    Ok(EncodedReading {
        period_start: encode_period(reading.period_start)?,
        period_end: encode_period_end(reading.period_end())?,
        rate_a,
        rate_b,
        rate_c,
        total,
    })
}

/// Insert a batch of readings in one transaction.
///
/// Fails on a `(account_key, period_start)` collision; callers check
/// [`exists_for_date`] first.
pub async fn add_range(partition: &AccountPartition, readings: &[MeterReading]) -> Result<u64, StoreError> {
    if readings.is_empty() {
        return Ok(0);
    }

    let encoded = readings.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
    let now = OffsetDateTime::now_utc();
    let key = partition.key().as_str();

    let mut tx = partition.pool().begin().await?;
    let mut inserted = 0;
    for chunk in encoded.chunks(INSERT_BATCH) {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "INSERT INTO meter_readings (account_key, period_start, period_end, rate_a, rate_b, rate_c, total, created_at, updated_at) ",
        );
        builder.push_values(chunk, |mut b, r| {
            b.push_bind(key)
                .push_bind(&r.period_start)
                .push_bind(&r.period_end)
                .push_bind(r.rate_a)
                .push_bind(r.rate_b)
                .push_bind(r.rate_c)
                .push_bind(r.total)
                .push_bind(now)
                .push_bind(now);
        });
        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;

    tracing::debug!(account = %partition.key(), inserted, "stored readings");
    Ok(inserted)
}

/// True iff any reading starts within `[date 00:00, date+1 00:00)`.
pub async fn exists_for_date(partition: &AccountPartition, date: Date) -> Result<bool, StoreError> {
    let (start, end) = day_bounds(date)?;
    let found: i64 = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM meter_readings
            WHERE account_key = ?1
              AND period_start >= ?2
              AND period_start <  ?3
        )
        "#,
    )
    .bind(partition.key().as_str())
    .bind(start)
    .bind(end)
    .fetch_one(partition.pool())
    .await?;

    Ok(found != 0)
}

/// Stored rows with `start <= period_start <= end`, oldest first.
pub async fn stored_readings_in_range(
    partition: &AccountPartition,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Result<Vec<StoredReading>, StoreError> {
    let sql = format!(
        r#"
        SELECT {SELECT_COLUMNS}
        FROM meter_readings
        WHERE account_key = ?1
          AND period_start >= ?2
          AND period_start <= ?3
        ORDER BY period_start
        "#
    );
    let rows = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(partition.key().as_str())
        .bind(encode_period(start)?)
        .bind(encode_period(end)?)
        .fetch_all(partition.pool())
        .await?;

    rows.into_iter().map(ReadingRow::into_stored).collect()
}

/// Readings with `start <= period_start <= end`, oldest first.
pub async fn readings_in_range(
    partition: &AccountPartition,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Result<Vec<MeterReading>, StoreError> {
    Ok(stored_readings_in_range(partition, start, end)
        .await?
        .into_iter()
        .map(MeterReading::from)
        .collect())
}

/// All readings starting on the given calendar day.
pub async fn readings_for_date(partition: &AccountPartition, date: Date) -> Result<Vec<MeterReading>, StoreError> {
    let (start, end) = day_bounds(date)?;
    let sql = format!(
        r#"
        SELECT {SELECT_COLUMNS}
        FROM meter_readings
        WHERE account_key = ?1
          AND period_start >= ?2
          AND period_start <  ?3
        ORDER BY period_start
        "#
    );
    let rows = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(partition.key().as_str())
        .bind(start)
        .bind(end)
        .fetch_all(partition.pool())
        .await?;

    rows.into_iter()
        .map(|row| row.into_stored().map(MeterReading::from))
        .collect()
}

pub async fn latest_reading_date(partition: &AccountPartition) -> Result<Option<PrimitiveDateTime>, StoreError> {
    let latest: Option<String> =
        sqlx::query_scalar("SELECT MAX(period_start) FROM meter_readings WHERE account_key = ?1")
            .bind(partition.key().as_str())
            .fetch_one(partition.pool())
            .await?;

    latest.as_deref().map(decode_period).transpose()
}

pub async fn earliest_reading(partition: &AccountPartition) -> Result<Option<MeterReading>, StoreError> {
    let sql = format!(
        r#"
        SELECT {SELECT_COLUMNS}
        FROM meter_readings
        WHERE account_key = ?1
        ORDER BY period_start
        LIMIT 1
        "#
    );
    let row = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(partition.key().as_str())
        .fetch_optional(partition.pool())
        .await?;

    row.map(|r| r.into_stored().map(MeterReading::from)).transpose()
}

/// Remove every reading of the partition's account.
pub async fn delete_all(partition: &AccountPartition) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM meter_readings WHERE account_key = ?1")
        .bind(partition.key().as_str())
        .execute(partition.pool())
        .await?;

    tracing::info!(account = %partition.key(), deleted = result.rows_affected(), "deleted all readings");
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::ReadingStore, domain::AccountKey};
    use rust_decimal::Decimal;
    use time::macros::{date, datetime};

    fn reading(ts: PrimitiveDateTime, a: i64) -> MeterReading {
        MeterReading::new(ts, Decimal::new(a, 2), Decimal::new(25, 2), Decimal::ZERO)
    }

    async fn open(dir: &tempfile::TempDir, account: &str) -> AccountPartition {
        ReadingStore::new(dir.path())
            .open(&AccountKey::new(account).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stored_reading_round_trips_for_its_day() {
        let dir = tempfile::tempdir().unwrap();
        let p = open(&dir, "alice").await;

        let r = MeterReading::new(
            datetime!(2026-02-18 23:45),
            Decimal::new(15625, 4),
            Decimal::new(3, 1),
            Decimal::new(7, 0),
        );
        assert_eq!(add_range(&p, std::slice::from_ref(&r)).await.unwrap(), 1);

        let back = readings_for_date(&p, date!(2026 - 02 - 18)).await.unwrap();
        assert_eq!(back, vec![r]);
        assert!(readings_for_date(&p, date!(2026 - 02 - 19)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exists_for_date_uses_half_open_day() {
        let dir = tempfile::tempdir().unwrap();
        let p = open(&dir, "alice").await;

        add_range(&p, &[reading(datetime!(2026-02-19 00:00), 10)]).await.unwrap();

        assert!(exists_for_date(&p, date!(2026 - 02 - 19)).await.unwrap());
        assert!(!exists_for_date(&p, date!(2026 - 02 - 18)).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_period_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = open(&dir, "alice").await;

        let r = reading(datetime!(2026-02-18 10:00), 10);
        add_range(&p, std::slice::from_ref(&r)).await.unwrap();
        let err = add_range(&p, &[r]).await.unwrap_err();
        assert!(matches!(err, StoreError::Sqlx(_)));
    }

    #[tokio::test]
    async fn oversized_rate_fails_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let p = open(&dir, "alice").await;

        let huge = MeterReading::new(
            datetime!(2026-02-18 10:15),
            Decimal::from_str_exact("79228162514264337593543950335").unwrap(),
            Decimal::ZERO,
            Decimal::ZERO,
        );
        let err = add_range(&p, &[reading(datetime!(2026-02-18 10:00), 1), huge])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RateOutOfRange(_)));
        assert!(!exists_for_date(&p, date!(2026 - 02 - 18)).await.unwrap());
    }

    #[tokio::test]
    async fn total_overflow_is_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let p = open(&dir, "alice").await;

        // Each rate fits the column on its own; their sum does not.
        let big = Decimal::from(i64::MAX / 10_000);
        let r = MeterReading::new(datetime!(2026-02-18 10:00), big, big, Decimal::ZERO);
        let err = add_range(&p, &[r]).await.unwrap_err();
        assert!(matches!(err, StoreError::RateOutOfRange(_)));
    }

    #[tokio::test]
    async fn range_query_is_ordered_and_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let p = open(&dir, "alice").await;

        add_range(
            &p,
            &[
                reading(datetime!(2026-02-18 10:30), 3),
                reading(datetime!(2026-02-18 10:00), 1),
                reading(datetime!(2026-02-18 10:15), 2),
                reading(datetime!(2026-02-18 10:45), 4),
            ],
        )
        .await
        .unwrap();

        let got = readings_in_range(&p, datetime!(2026-02-18 10:00), datetime!(2026-02-18 10:30))
            .await
            .unwrap();
        let starts: Vec<_> = got.iter().map(|r| r.period_start).collect();
        assert_eq!(
            starts,
            vec![
                datetime!(2026-02-18 10:00),
                datetime!(2026-02-18 10:15),
                datetime!(2026-02-18 10:30)
            ]
        );

        let stored = stored_readings_in_range(&p, datetime!(2026-02-18 10:00), datetime!(2026-02-18 10:00))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].account_key.as_str(), "alice");
        assert_eq!(stored[0].created_at, stored[0].updated_at);
    }

    #[tokio::test]
    async fn earliest_latest_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let p = open(&dir, "alice").await;

        assert!(latest_reading_date(&p).await.unwrap().is_none());
        assert!(earliest_reading(&p).await.unwrap().is_none());

        add_range(
            &p,
            &[
                reading(datetime!(2026-02-17 00:00), 1),
                reading(datetime!(2026-02-18 23:45), 2),
            ],
        )
        .await
        .unwrap();

        assert_eq!(latest_reading_date(&p).await.unwrap(), Some(datetime!(2026-02-18 23:45)));
        assert_eq!(
            earliest_reading(&p).await.unwrap().map(|r| r.period_start),
            Some(datetime!(2026-02-17 00:00))
        );

        assert_eq!(delete_all(&p).await.unwrap(), 2);
        assert!(!exists_for_date(&p, date!(2026 - 02 - 17)).await.unwrap());
    }

    #[tokio::test]
    async fn accounts_do_not_see_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let alice = open(&dir, "alice").await;
        let bob = open(&dir, "bob").await;

        add_range(&alice, &[reading(datetime!(2026-02-18 10:00), 1)]).await.unwrap();

        assert!(exists_for_date(&alice, date!(2026 - 02 - 18)).await.unwrap());
        assert!(!exists_for_date(&bob, date!(2026 - 02 - 18)).await.unwrap());
    }
}
