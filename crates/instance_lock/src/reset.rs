//! Reset time computation.

use crate::clock::WorldClock;
use crate::config::ResetScheduleConfig;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use map_catalog::ResetInterval;

/// Computes the next reset instant for a reset cadence.
///
/// Broken-down local time is consulted to find the next occurrence of the
/// configured hour (and, for weekly schedules, weekday), with minutes and
/// seconds zeroed. The local result is converted to an instant through the
/// clock, so DST transitions may yield a period that is 23 or 25 hours long;
/// that is accepted and not special-cased.
///
/// [`ResetInterval::Never`] returns the current time truncated to the hour;
/// difficulties without a reset schedule never create bindings, so the value
/// is unused.
pub fn next_reset_time(
    clock: &dyn WorldClock,
    config: &ResetScheduleConfig,
    interval: ResetInterval,
) -> DateTime<Utc> {
    let mut local = clock
        .local_now()
        .with_minute(0)
        .unwrap()
        .with_second(0)
        .unwrap()
        .with_nanosecond(0)
        .unwrap();

    match interval {
        ResetInterval::Daily => {
            if local.hour() >= config.daily_hour {
                local += Duration::days(1);
            }
            local = local.with_hour(config.daily_hour).unwrap();
        }
        ResetInterval::Weekly => {
            let weekday = local.weekday().num_days_from_sunday();
            let mut days_adjust = i64::from(config.weekly_day) - i64::from(weekday);
            // Already past this week's reset; take next week's.
            if weekday > config.weekly_day
                || (weekday == config.weekly_day && local.hour() >= config.daily_hour)
            {
                days_adjust += 7;
            }
            local = local.with_hour(config.daily_hour).unwrap() + Duration::days(days_adjust);
        }
        ResetInterval::Never => {}
    }

    clock.from_local(local)
}
