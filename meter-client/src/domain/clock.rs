use time::{Date, OffsetDateTime, UtcOffset};

/// Source of "today" on the portal's local time axis.
///
/// Queries exclude the current day because it is usually incomplete, so every
/// caller that needs "today" goes through this seam.
pub trait Clock: Send + Sync {
    fn today(&self) -> Date;

    fn yesterday(&self) -> Date {
        self.today().previous_day().unwrap_or(Date::MIN)
    }
}

/// Wall clock shifted to the portal's fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct PortalClock {
    offset: UtcOffset,
}

impl PortalClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Clock for PortalClock {
    fn today(&self) -> Date {
        OffsetDateTime::now_utc().to_offset(self.offset).date()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Date);

impl Clock for FixedClock {
    fn today(&self) -> Date {
        self.0
    }
}
