use std::collections::HashSet;

use meter_client::domain::MeterReading;
use rust_decimal::Decimal;
use time::{Date, PrimitiveDateTime};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("negative rate {rate} at {period_start}")]
    NegativeRate {
        period_start: PrimitiveDateTime,
        rate: Decimal,
    },
    #[error("{0} is not on a 15-minute boundary")]
    Misaligned(PrimitiveDateTime),
    #[error("reading at {period_start} does not belong to {date}")]
    WrongDay {
        period_start: PrimitiveDateTime,
        date: Date,
    },
    #[error("slot {0} appears twice")]
    Duplicate(PrimitiveDateTime),
}

/// Pure validation of one scraped reading.
///
/// Rules:
/// - rates must be non-negative.
/// - `period_start` must sit on a quarter hour with zero seconds.
pub fn validate_reading(reading: &MeterReading) -> Result<(), ValidationError> {
    for rate in [reading.rate_a, reading.rate_b, reading.rate_c] {
        if rate < Decimal::ZERO {
            return Err(ValidationError::NegativeRate {
                period_start: reading.period_start,
                rate,
            });
        }
    }

    let t = reading.period_start.time();
    if t.minute() % 15 != 0 || t.second() != 0 || t.nanosecond() != 0 {
        return Err(ValidationError::Misaligned(reading.period_start));
    }

    Ok(())
}

/// Validate a whole fetched day; a single bad reading rejects the day.
pub fn validate_day(date: Date, readings: Vec<MeterReading>) -> Result<Vec<MeterReading>, ValidationError> {
    match check_day(date, &readings) {
        Ok(()) => Ok(readings),
        Err(e) => {
            metrics::counter!("validation_reading_rejected_total").increment(1);
            Err(e)
        }
    }
}

fn check_day(date: Date, readings: &[MeterReading]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(readings.len());

    for reading in readings {
        validate_reading(reading)?;

        if reading.period_start.date() != date {
            return Err(ValidationError::WrongDay {
                period_start: reading.period_start,
                date,
            });
        }
        if !seen.insert(reading.period_start) {
            return Err(ValidationError::Duplicate(reading.period_start));
        }
    }

    Ok(())
}
