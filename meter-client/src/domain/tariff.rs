use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::MeterReading;

/// Per-kWh prices used to compare a time-of-use tariff against a flat one.
///
/// Rate A is billed at the peak price, rates B and C at the off-peak price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffRates {
    pub flat_rate: Decimal,
    pub peak_rate: Decimal,
    pub off_peak_rate: Decimal,
}

impl Default for TariffRates {
    fn default() -> Self {
        Self {
            flat_rate: Decimal::new(39086, 4),
            peak_rate: Decimal::new(51135, 4),
            off_peak_rate: Decimal::new(26037, 4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tariff {
    TimeOfUse,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCost {
    pub reading: MeterReading,
    pub tou_cost: Decimal,
    pub flat_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TariffComparison {
    pub days: Vec<DayCost>,
    pub tou_total: Decimal,
    pub flat_total: Decimal,
    /// `flat_total - tou_total`; positive means time-of-use is cheaper.
    pub difference: Decimal,
    /// Difference of the per-day averages, relative to the flat average.
    pub difference_percent: Decimal,
    pub cheaper: Tariff,
}

impl TariffRates {
    pub fn day_cost(&self, reading: &MeterReading) -> DayCost {
        let tou_cost = reading.rate_a * self.peak_rate + (reading.rate_b + reading.rate_c) * self.off_peak_rate;
        let flat_cost = reading.total() * self.flat_rate;
        DayCost {
            reading: reading.clone(),
            tou_cost,
            flat_cost,
        }
    }

    /// Compare both tariffs over a series of daily totals.
    pub fn compare(&self, daily_totals: &[MeterReading]) -> TariffComparison {
        let days: Vec<DayCost> = daily_totals.iter().map(|r| self.day_cost(r)).collect();

        let tou_total: Decimal = days.iter().map(|d| d.tou_cost).sum();
        let flat_total: Decimal = days.iter().map(|d| d.flat_cost).sum();
        let difference = flat_total - tou_total;

        let difference_percent = if days.is_empty() || flat_total.is_zero() {
            Decimal::ZERO
        } else {
            let n = Decimal::from(days.len());
            let flat_avg = flat_total / n;
            let tou_avg = tou_total / n;
            (flat_avg - tou_avg) / flat_avg * Decimal::ONE_HUNDRED
        };

        let cheaper = if difference < Decimal::ZERO {
            Tariff::Flat
        } else {
            Tariff::TimeOfUse
        };

        TariffComparison {
            days,
            tou_total,
            flat_total,
            difference,
            difference_percent,
            cheaper,
        }
    }
}
