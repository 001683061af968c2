pub mod account;
pub mod clock;
pub mod meter_reading;
pub mod tariff;

pub use account::{AccountIdentity, AccountKey, InvalidAccountKey};
pub use clock::{Clock, FixedClock, PortalClock};
pub use meter_reading::{AggregateSpan, MeterReading, StoredReading};
pub use tariff::{DayCost, Tariff, TariffComparison, TariffRates};
