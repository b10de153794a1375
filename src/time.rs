//! Time arithmetic for checkpoint timestamps.
//!
//! Checkpoint crossings are wall-clock times of day ([`NaiveTime`], nanosecond
//! resolution). Anything derived from them (elapsed, adjusted and cumulative
//! times) is a [`TimeDelta`], which does not wrap at 24h. Summing stage times
//! as times of day would silently drop whole days once a rider's general
//! classification time passes 24 hours.

use chrono::{NaiveTime, TimeDelta};

/// Elapsed time between two crossings.
///
/// Negative when `end` is before `start`; callers validate ordering first.
pub fn elapsed(start: NaiveTime, end: NaiveTime) -> TimeDelta {
    end.signed_duration_since(start)
}

/// Sum of two durations.
pub fn add(a: TimeDelta, b: TimeDelta) -> TimeDelta {
    a + b
}

/// Sum of any number of durations, starting from zero.
pub fn total<I>(durations: I) -> TimeDelta
where
    I: IntoIterator<Item = TimeDelta>,
{
    durations.into_iter().fold(TimeDelta::zero(), add)
}

/// Gap between two durations truncated to whole seconds.
///
/// Sub-second remainders are discarded, so 0.9s gives 0.
pub fn whole_seconds_between(earlier: TimeDelta, later: TimeDelta) -> i64 {
    (later - earlier).num_seconds()
}

/// Render a duration as `HH:MM:SS.mmm`. Hours are not capped at 24.
pub fn format_duration(d: TimeDelta) -> String {
    let sign = if d < TimeDelta::zero() { "-" } else { "" };
    let d = d.abs();
    let secs = d.num_seconds();
    let millis = d.subsec_nanos() / 1_000_000;
    format!(
        "{}{:02}:{:02}:{:02}.{:03}",
        sign,
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        millis
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32, milli: u32) -> NaiveTime {
        NaiveTime::from_hms_milli_opt(h, m, s, milli).unwrap()
    }

    #[test]
    fn test_elapsed() {
        let d = elapsed(t(10, 0, 0, 0), t(11, 30, 15, 500));
        assert_eq!(d, TimeDelta::milliseconds(5_415_500));
    }

    #[test]
    fn test_total_exceeds_a_day() {
        let stage = TimeDelta::hours(5);
        let sum = total(vec![stage; 6]);
        assert_eq!(sum, TimeDelta::hours(30));
        assert_eq!(format_duration(sum), "30:00:00.000");
    }

    #[test]
    fn test_whole_seconds_truncates() {
        let a = TimeDelta::hours(1);
        assert_eq!(whole_seconds_between(a, a + TimeDelta::milliseconds(900)), 0);
        assert_eq!(whole_seconds_between(a, a + TimeDelta::milliseconds(1000)), 1);
        assert_eq!(whole_seconds_between(a, a + TimeDelta::milliseconds(2999)), 2);
    }

    #[test]
    fn test_format_duration() {
        let d = TimeDelta::milliseconds(3_723_045);
        assert_eq!(format_duration(d), "01:02:03.045");
    }
}
