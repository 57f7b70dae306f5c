//! Calendar source for day-scoped cache keys.

use chrono::{NaiveDate, Utc};

/// Supplies "today" so rollover logic can be driven from tests.
pub trait Clock: Send + Sync {
    /// Current calendar day (UTC).
    fn today(&self) -> NaiveDate;
}

/// Wall-clock UTC date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// `YYYY-MM-DD`, the date component of every day-scoped key.
pub fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Hand-set clock for tests.
#[cfg(test)]
pub(crate) struct ManualClock(std::sync::Mutex<NaiveDate>);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(date: NaiveDate) -> Self {
        Self(std::sync::Mutex::new(date))
    }

    pub(crate) fn set(&self, date: NaiveDate) {
        *self.0.lock().unwrap() = date;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.0.lock().unwrap()
    }
}
