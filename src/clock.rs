use time::{Duration, OffsetDateTime};

pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Latest period boundary at or before `now`.
pub fn tick_floor(now: OffsetDateTime, period: i32) -> OffsetDateTime {
    let period = i64::from(period.max(1));
    let ts = now.unix_timestamp();
    now - Duration::seconds(ts.rem_euclid(period)) - Duration::nanoseconds(i64::from(now.nanosecond()))
}

/// First period boundary strictly after `now`.
pub fn next_tick(now: OffsetDateTime, period: i32) -> OffsetDateTime {
    tick_floor(now, period) + Duration::seconds(i64::from(period.max(1)))
}

/// Whole seconds left in the current step, 1..=period.
pub fn seconds_remaining(now: OffsetDateTime, period: i32) -> i64 {
    let period = i64::from(period.max(1));
    period - now.unix_timestamp().rem_euclid(period)
}
