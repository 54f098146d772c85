use std::sync::Arc;

use parking_lot::Mutex;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

const ISO8601_MILLIS: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);

pub trait TimeSource {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to. Used to exercise dedup expiry.
#[derive(Clone)]
pub struct ManualTime {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualTime {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: time::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: OffsetDateTime) {
        *self.now.lock() = to;
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock()
    }
}

/// ISO 8601 in UTC with millisecond precision, e.g. `2024-03-01T10:00:00.000Z`.
pub fn iso8601_millis(ts: OffsetDateTime) -> Result<String, time::error::Format> {
    ts.to_offset(time::UtcOffset::UTC).format(ISO8601_MILLIS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn formats_with_millis_in_utc() {
        let ts = datetime!(2024-03-01 10:00:05.123456 +02:00);
        assert_eq!(iso8601_millis(ts).unwrap(), "2024-03-01T08:00:05.123Z");
    }

    #[test]
    fn manual_time_only_moves_when_advanced() {
        let clock = ManualTime::new(datetime!(2024-03-01 10:00 UTC));
        assert_eq!(clock.now(), datetime!(2024-03-01 10:00 UTC));
        clock.advance(time::Duration::minutes(6));
        assert_eq!(clock.now(), datetime!(2024-03-01 10:06 UTC));
    }
}
