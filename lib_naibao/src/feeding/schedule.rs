use crate::models::FeedingSettings;
use chrono::{DateTime, Duration, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

const MINUTES_PER_DAY: i64 = 24 * 60;
const FALLBACK_INTERVAL_HOURS: i64 = 3;

/// The day window `[day_start_hour, day_end_hour)` and the interval used
/// inside and outside of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub day_start_hour: u32,
    pub day_end_hour: u32,
    pub day_interval_hours: i64,
    pub night_interval_hours: i64,
}

impl Default for DaySchedule {
    fn default() -> Self {
        Self {
            day_start_hour: 6,
            day_end_hour: 18,
            day_interval_hours: 3,
            night_interval_hours: 5,
        }
    }
}

impl From<&FeedingSettings> for DaySchedule {
    fn from(s: &FeedingSettings) -> Self {
        Self {
            day_start_hour: s.day_start_hour,
            day_end_hour: s.day_end_hour,
            day_interval_hours: s.day_interval_hours,
            night_interval_hours: s.night_interval_hours,
        }
    }
}

impl DaySchedule {
    pub fn is_day_hour(&self, hour: u32) -> bool {
        hour >= self.day_start_hour && hour < self.day_end_hour
    }

    fn interval_for_hour(&self, hour: u32) -> i64 {
        if self.is_day_hour(hour) {
            self.day_interval_hours
        } else {
            self.night_interval_hours
        }
    }

    /// The interval that applies after a feeding at `hour`, with the
    /// three hour fallback for non-positive settings.
    pub fn interval_after(&self, hour: u32) -> i64 {
        let interval = self.interval_for_hour(hour);
        if interval <= 0 {
            FALLBACK_INTERVAL_HOURS
        } else {
            interval
        }
    }
}

/// Feedings still expected before the next day window starts. Never below 1.
///
/// Inside the day window this counts the rest of the window at the day
/// interval plus the whole night at the night interval. At night it counts
/// the minutes from now until the day start after the calendar day ends,
/// so the small hours still see the rest of their calendar day. Intervals
/// below one hour are treated as one hour.
pub fn compute_remaining_feedings<Z: TimeZone>(now: &DateTime<Z>, schedule: &DaySchedule) -> i64 {
    let day_step = schedule.day_interval_hours.max(1) * 60;
    let night_step = schedule.night_interval_hours.max(1) * 60;
    let current = i64::from(now.hour()) * 60 + i64::from(now.minute());
    let day_start = i64::from(schedule.day_start_hour) * 60;
    let day_end = i64::from(schedule.day_end_hour) * 60;

    let remaining = if schedule.is_day_hour(now.hour()) {
        let night_span = MINUTES_PER_DAY + day_start - day_end;
        (day_end - current) / day_step + night_span / night_step
    } else {
        (MINUTES_PER_DAY + day_start - current) / night_step
    };

    remaining.max(1)
}

/// When the next feeding is due.
///
/// The interval follows the hour of the last feeding, with no smoothing
/// across the day/night boundary. If that lands before `now`, the result is
/// `now` plus the interval for `now`'s hour instead, so it is never earlier
/// than `now`. A missing last feeding counts as `now`.
pub fn compute_next_feeding_time<Z: TimeZone>(
    now: &DateTime<Z>,
    last_feeding: Option<&DateTime<Z>>,
    schedule: &DaySchedule,
) -> DateTime<Z> {
    let last = last_feeding.unwrap_or(now);

    let interval = schedule.interval_after(last.hour());
    let next = last.clone() + Duration::hours(interval);
    if next >= *now {
        return next;
    }

    let mut catch_up = schedule.interval_for_hour(now.hour());
    if catch_up <= 0 {
        catch_up = interval;
    }
    now.clone() + Duration::hours(catch_up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::CivilClock;
    use chrono::NaiveDateTime;
    use chrono_tz::Tz;
    use proptest::prelude::*;

    fn at(s: &str) -> DateTime<Tz> {
        let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap();
        CivilClock::default().from_wall_clock(naive)
    }

    fn wall(dt: &DateTime<Tz>) -> String {
        dt.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    #[test]
    fn test_next_time_uses_day_interval_of_last_feeding() {
        let s = DaySchedule::default();
        let next = compute_next_feeding_time(&at("2026-02-01T16:00:01"), Some(&at("2026-02-01T16:00:00")), &s);
        assert_eq!(wall(&next), "2026-02-01T19:00:00");
    }

    #[test]
    fn test_next_time_uses_night_interval_of_last_feeding() {
        let s = DaySchedule::default();
        let next = compute_next_feeding_time(&at("2026-02-01T20:00:01"), Some(&at("2026-02-01T20:00:00")), &s);
        assert_eq!(wall(&next), "2026-02-02T01:00:00");
    }

    #[test]
    fn test_stale_last_feeding_restarts_from_now() {
        let s = DaySchedule::default();
        let next = compute_next_feeding_time(&at("2026-02-01T20:00:00"), Some(&at("2026-02-01T09:00:00")), &s);
        assert_eq!(wall(&next), "2026-02-02T01:00:00");
    }

    #[test]
    fn test_missing_last_feeding_counts_from_now() {
        let s = DaySchedule::default();
        let next = compute_next_feeding_time(&at("2026-02-01T10:30:00"), None, &s);
        assert_eq!(wall(&next), "2026-02-01T13:30:00");
    }

    #[test]
    fn test_non_positive_intervals_fall_back_to_three_hours() {
        let s = DaySchedule { day_interval_hours: 0, night_interval_hours: -2, ..DaySchedule::default() };
        let now = at("2026-02-01T10:00:00");
        assert_eq!(wall(&compute_next_feeding_time(&now, Some(&now), &s)), "2026-02-01T13:00:00");
        let stale = at("2026-02-01T01:00:00");
        assert_eq!(wall(&compute_next_feeding_time(&now, Some(&stale), &s)), "2026-02-01T13:00:00");
    }

    #[test]
    fn test_remaining_during_day_adds_whole_night() {
        let s = DaySchedule::default();
        // 12:00 -> 6h of day at 3h, plus 12h of night at 5h.
        assert_eq!(compute_remaining_feedings(&at("2026-02-01T12:00:00"), &s), 2 + 2);
    }

    #[test]
    fn test_remaining_at_night_wraps_past_midnight() {
        let s = DaySchedule::default();
        // 20:00 -> 10h until 06:00.
        assert_eq!(compute_remaining_feedings(&at("2026-02-01T20:00:00"), &s), 2);
        // 01:00 -> 29h until the 06:00 after the calendar day ends.
        assert_eq!(compute_remaining_feedings(&at("2026-02-02T01:00:00"), &s), 5);
        // just before day start there is still a full day ahead
        assert_eq!(compute_remaining_feedings(&at("2026-02-02T05:59:00"), &s), 4);
    }

    #[test]
    fn test_remaining_never_divides_by_zero() {
        let s = DaySchedule { day_interval_hours: 0, night_interval_hours: 0, ..DaySchedule::default() };
        assert_eq!(compute_remaining_feedings(&at("2026-02-01T12:00:00"), &s), 6 + 12);
        assert_eq!(compute_remaining_feedings(&at("2026-02-01T05:59:00"), &s), 24);
    }

    fn arb_schedule() -> impl Strategy<Value = DaySchedule> {
        (0u32..23, 1u32..=24, -2i64..8, -2i64..8).prop_map(|(start, end, day, night)| DaySchedule {
            day_start_hour: start,
            day_end_hour: end.max(start + 1),
            day_interval_hours: day,
            night_interval_hours: night,
        })
    }

    fn arb_time() -> impl Strategy<Value = DateTime<Tz>> {
        (0i64..(3 * 24 * 3600)).prop_map(|secs| at("2026-02-01T00:00:00") + Duration::seconds(secs))
    }

    proptest! {
        #[test]
        fn prop_remaining_is_at_least_one(schedule in arb_schedule(), now in arb_time()) {
            prop_assert!(compute_remaining_feedings(&now, &schedule) >= 1);
        }

        #[test]
        fn prop_next_time_is_never_before_now(
            schedule in arb_schedule(),
            now in arb_time(),
            last in prop::option::of(arb_time()),
        ) {
            let next = compute_next_feeding_time(&now, last.as_ref(), &schedule);
            prop_assert!(next >= now);
        }
    }
}
