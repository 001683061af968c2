use rust_decimal::Decimal;

use crate::domain::InvalidAccountKey;

pub mod aggregation;
mod codec;
pub mod meter_reading_queries;
pub mod repository;
pub mod store;

pub use repository::ReadingRepository;
pub use store::{AccountPartition, ReadingStore};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    InvalidAccountKey(#[from] InvalidAccountKey),
    #[error("rate {0} does not fit the fixed-point column")]
    RateOutOfRange(Decimal),
    #[error("timestamp error: {0}")]
    Timestamp(String),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}
