use time::{format_description::BorrowedFormatItem, macros::format_description, Duration, PrimitiveDateTime};

use super::FormatError;

/// `dd/MM/yyyy HH.mm`, as printed in the daily profile table.
const SOURCE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[day]/[month]/[year] [hour].[minute]");

/// The portal stamps each row with the end of its interval.
pub const END_OF_INTERVAL_OFFSET: Duration = Duration::minutes(15);

const HOUR_24: &str = " 24.";

/// Parse a portal timestamp, mapping hour `24` onto 00 of the next day.
pub fn normalize(raw: &str) -> Result<PrimitiveDateTime, FormatError> {
    let raw = raw.trim();

    match raw.split_once(HOUR_24) {
        Some((date, minute)) => {
            let midnight = parse(&format!("{date} 00.{minute}"), raw)?;
            midnight
                .checked_add(Duration::days(1))
                .ok_or_else(|| FormatError::new(raw, "date out of range"))
        }
        None => parse(raw, raw),
    }
}

/// Start of the 15-minute interval a table row reports on.
pub fn interval_start(raw: &str) -> Result<PrimitiveDateTime, FormatError> {
    let end = normalize(raw)?;
    end.checked_sub(END_OF_INTERVAL_OFFSET)
        .ok_or_else(|| FormatError::new(raw, "date out of range"))
}

fn parse(candidate: &str, raw: &str) -> Result<PrimitiveDateTime, FormatError> {
    PrimitiveDateTime::parse(candidate, SOURCE_FORMAT).map_err(|e| FormatError::new(raw, e))
}
