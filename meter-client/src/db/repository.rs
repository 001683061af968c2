use std::sync::Arc;

use time::{Date, PrimitiveDateTime};

use super::{aggregation, meter_reading_queries as queries, ReadingStore, StoreError};
use crate::domain::{AccountKey, Clock, MeterReading};

/// Account-keyed reading access for collaborators (presentation, reports).
///
/// Every call opens its own partition handle and closes it before returning,
/// so calls may run concurrently.
#[derive(Clone)]
pub struct ReadingRepository {
    store: ReadingStore,
    clock: Arc<dyn Clock>,
}

impl ReadingRepository {
    pub fn new(store: ReadingStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    pub fn today(&self) -> Date {
        self.clock.today()
    }

    pub async fn add_readings(&self, key: &AccountKey, readings: &[MeterReading]) -> Result<u64, StoreError> {
        let partition = self.store.open(key).await?;
        let result = queries::add_range(&partition, readings).await;
        partition.close().await;
        result
    }

    pub async fn readings_in_range(
        &self,
        key: &AccountKey,
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
    ) -> Result<Vec<MeterReading>, StoreError> {
        let partition = self.store.open(key).await?;
        let result = queries::readings_in_range(&partition, start, end).await;
        partition.close().await;
        result
    }

    pub async fn readings_for_date(&self, key: &AccountKey, date: Date) -> Result<Vec<MeterReading>, StoreError> {
        let partition = self.store.open(key).await?;
        let result = queries::readings_for_date(&partition, date).await;
        partition.close().await;
        result
    }

    pub async fn has_readings_for_date(&self, key: &AccountKey, date: Date) -> Result<bool, StoreError> {
        let partition = self.store.open(key).await?;
        let result = queries::exists_for_date(&partition, date).await;
        partition.close().await;
        result
    }

    pub async fn latest_reading_date(&self, key: &AccountKey) -> Result<Option<PrimitiveDateTime>, StoreError> {
        let partition = self.store.open(key).await?;
        let result = queries::latest_reading_date(&partition).await;
        partition.close().await;
        result
    }

    pub async fn earliest_reading(&self, key: &AccountKey) -> Result<Option<MeterReading>, StoreError> {
        let partition = self.store.open(key).await?;
        let result = queries::earliest_reading(&partition).await;
        partition.close().await;
        result
    }

    pub async fn average_by_time_of_day(&self, key: &AccountKey, days: u32) -> Result<Vec<MeterReading>, StoreError> {
        let partition = self.store.open(key).await?;
        let result = aggregation::average_by_time_of_day(&partition, days, self.today()).await;
        partition.close().await;
        result
    }

    pub async fn hourly_totals(
        &self,
        key: &AccountKey,
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
    ) -> Result<Vec<MeterReading>, StoreError> {
        let partition = self.store.open(key).await?;
        let result = aggregation::hourly_totals(&partition, start, end).await;
        partition.close().await;
        result
    }

    pub async fn hourly_averages(
        &self,
        key: &AccountKey,
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
    ) -> Result<Vec<MeterReading>, StoreError> {
        let partition = self.store.open(key).await?;
        let result = aggregation::hourly_averages(&partition, start, end, self.today()).await;
        partition.close().await;
        result
    }

    pub async fn daily_totals(
        &self,
        key: &AccountKey,
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
    ) -> Result<Vec<MeterReading>, StoreError> {
        let partition = self.store.open(key).await?;
        let result = aggregation::daily_totals(&partition, start, end).await;
        partition.close().await;
        result
    }

    pub async fn delete_all_for_account(&self, key: &AccountKey) -> Result<u64, StoreError> {
        let partition = self.store.open(key).await?;
        let result = queries::delete_all(&partition).await;
        partition.close().await;
        result
    }
}
