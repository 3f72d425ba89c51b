//! Trigger resolution — pure mapping from a schedule spec to concrete fire
//! rules and next-fire instants.
//!
//! All arithmetic happens in the schedule's own timezone and is converted to
//! UTC at the edge, so daylight-saving transitions shift with the zone
//! instead of drifting by a baked-in offset.

use chrono::{DateTime, Duration, NaiveDate, offset::LocalResult, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tidings_core::thread::{IntervalUnit, ScheduleSpec, TimeOfDay};

/// A concrete recurring fire rule derived from a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FireRule {
    /// Every `every` units, starting at `anchor` (already rolled forward
    /// past "now" at resolution time).
    Interval {
        anchor: DateTime<Utc>,
        unit: IntervalUnit,
        every: u32,
        timezone: Tz,
    },
    /// At a fixed local time of day, daily.
    DailyAt { time: TimeOfDay, timezone: Tz },
}

/// Resolve a schedule into its fire rules.
///
/// Interval schedules yield exactly one rule; daily schedules yield one rule
/// per configured time of day (so each can be cancelled independently).
pub fn resolve(spec: &ScheduleSpec, now: DateTime<Utc>) -> Vec<FireRule> {
    match spec {
        ScheduleSpec::Interval { unit, every, start_time, timezone } => {
            let anchor = interval_anchor(*timezone, *start_time, now);
            vec![FireRule::Interval {
                anchor,
                unit: *unit,
                every: *every,
                timezone: *timezone,
            }]
        }
        ScheduleSpec::Daily { times, timezone } => times
            .iter()
            .map(|t| FireRule::DailyAt { time: *t, timezone: *timezone })
            .collect(),
    }
}

/// Today's date in the schedule timezone at `start_time`; rolled forward one
/// day if that instant has already passed.
fn interval_anchor(tz: Tz, start_time: TimeOfDay, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();
    let anchor = local_instant(tz, today, start_time)
        .or_else(|| local_instant(tz, today + Duration::days(1), start_time))
        .unwrap_or(now);
    if anchor <= now {
        local_instant(tz, today + Duration::days(1), start_time).unwrap_or(anchor)
    } else {
        anchor
    }
}

/// Map a local wall-clock time in `tz` to a UTC instant.
///
/// DST: an ambiguous local time (fall-back) resolves to its earliest
/// occurrence; a nonexistent one (spring-forward gap) yields None and the
/// caller tries the next day.
fn local_instant(tz: Tz, date: NaiveDate, t: TimeOfDay) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(t.hour, t.minute, 0)?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

impl FireRule {
    /// The next fire instant strictly after `after`.
    ///
    /// Returns None only when a rule can find no valid instant (pathological
    /// zone data); callers treat that as "rule dormant".
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            FireRule::Interval { anchor, unit, every, timezone } => {
                next_interval_after(*anchor, *unit, *every, *timezone, after)
            }
            FireRule::DailyAt { time, timezone } => {
                next_daily_after(*time, *timezone, after)
            }
        }
    }

    /// The rule's timezone, for status display.
    pub fn timezone(&self) -> Tz {
        match self {
            FireRule::Interval { timezone, .. } | FireRule::DailyAt { timezone, .. } => *timezone,
        }
    }
}

fn next_interval_after(
    anchor: DateTime<Utc>,
    unit: IntervalUnit,
    every: u32,
    tz: Tz,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if anchor > after {
        return Some(anchor);
    }
    match unit {
        IntervalUnit::Minutes | IntervalUnit::Hours => {
            let step_secs = match unit {
                IntervalUnit::Minutes => every as i64 * 60,
                _ => every as i64 * 3600,
            };
            let elapsed = (after - anchor).num_seconds();
            let k = elapsed / step_secs + 1;
            Some(anchor + Duration::seconds(k * step_secs))
        }
        IntervalUnit::Days | IntervalUnit::Weeks => {
            // Calendar stepping in the schedule tz: the local wall-clock time
            // of the anchor is preserved across DST transitions.
            let step_days = match unit {
                IntervalUnit::Days => every as i64,
                _ => every as i64 * 7,
            };
            let local_anchor = anchor.with_timezone(&tz);
            let time = TimeOfDay {
                hour: chrono::Timelike::hour(&local_anchor),
                minute: chrono::Timelike::minute(&local_anchor),
            };
            let mut k = ((after - anchor).num_days() / step_days).max(0);
            // Bounded: at most a few steps past the estimate.
            for _ in 0..5 {
                let date = local_anchor.date_naive() + Duration::days(k * step_days);
                if let Some(candidate) = local_instant(tz, date, time)
                    && candidate > after
                {
                    return Some(candidate);
                }
                k += 1;
            }
            None
        }
    }
}

fn next_daily_after(time: TimeOfDay, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local_date = after.with_timezone(&tz).date_naive();
    // Today, tomorrow, or the day after (covers DST gaps).
    for offset in 0..3 {
        let date = local_date + Duration::days(offset);
        if let Some(candidate) = local_instant(tz, date, time)
            && candidate > after
        {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> TimeOfDay {
        TimeOfDay { hour: h, minute: m }
    }

    #[test]
    fn test_interval_start_already_passed_rolls_to_tomorrow() {
        // Spec scenario: every 60 minutes from 00:00 UTC, requested at 10:30.
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        let spec = ScheduleSpec::Interval {
            unit: IntervalUnit::Minutes,
            every: 60,
            start_time: t(0, 0),
            timezone: chrono_tz::UTC,
        };
        let rules = resolve(&spec, now);
        assert_eq!(rules.len(), 1);
        let first = rules[0].next_after(now).unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_interval_start_still_ahead_today() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        let spec = ScheduleSpec::Interval {
            unit: IntervalUnit::Hours,
            every: 2,
            start_time: t(18, 0),
            timezone: chrono_tz::UTC,
        };
        let first = resolve(&spec, now)[0].next_after(now).unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap());
        // And the fire after that is two hours later.
        let second = resolve(&spec, now)[0].next_after(first).unwrap();
        assert_eq!(second, Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap());
    }

    #[test]
    fn test_interval_respects_schedule_timezone() {
        // 08:00 in Shanghai is 00:00 UTC.
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap(); // 10:00 SH
        let spec = ScheduleSpec::Interval {
            unit: IntervalUnit::Minutes,
            every: 30,
            start_time: t(8, 0),
            timezone: chrono_tz::Asia::Shanghai,
        };
        // 08:00 SH already passed today; anchor is 08:00 SH tomorrow = 00:00 UTC June 2.
        let first = resolve(&spec, now)[0].next_after(now).unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_daily_one_rule_per_time() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let spec = ScheduleSpec::Daily {
            times: vec![t(9, 0), t(21, 30)],
            timezone: chrono_tz::UTC,
        };
        let rules = resolve(&spec, now);
        assert_eq!(rules.len(), 2);
        // 09:00 passed → tomorrow; 21:30 still ahead → today.
        assert_eq!(
            rules[0].next_after(now).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
        );
        assert_eq!(
            rules[1].next_after(now).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 21, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_daily_dst_spring_forward_gap() {
        // US Eastern, 2024-03-10: 02:30 local does not exist.
        let rule = FireRule::DailyAt {
            time: t(2, 30),
            timezone: chrono_tz::America::New_York,
        };
        let after = Utc.with_ymd_and_hms(2024, 3, 10, 1, 0, 0).unwrap(); // pre-transition
        let next = rule.next_after(after).unwrap();
        // Skips to 02:30 EDT on March 11 (06:30 UTC).
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 6, 30, 0).unwrap());
    }

    #[test]
    fn test_daily_tracks_utc_offset_change() {
        let rule = FireRule::DailyAt {
            time: t(12, 0),
            timezone: chrono_tz::America::New_York,
        };
        // Winter: noon EST = 17:00 UTC.
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(
            rule.next_after(winter).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 15, 17, 0, 0).unwrap()
        );
        // Summer: noon EDT = 16:00 UTC — same rule, different offset.
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap();
        assert_eq!(
            rule.next_after(summer).unwrap(),
            Utc.with_ymd_and_hms(2024, 7, 15, 16, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_interval_day_unit_survives_dst() {
        // Daily-at-09:00-local via a 1-day interval across the US spring transition.
        let now = Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap();
        let spec = ScheduleSpec::Interval {
            unit: IntervalUnit::Days,
            every: 1,
            start_time: t(9, 0),
            timezone: chrono_tz::America::New_York,
        };
        let rule = &resolve(&spec, now)[0];
        let first = rule.next_after(now).unwrap(); // Mar 8, 09:00 EST = 14:00 UTC
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 3, 8, 14, 0, 0).unwrap());
        let second = rule.next_after(first).unwrap();
        let third = rule.next_after(second).unwrap();
        let fourth = rule.next_after(third).unwrap(); // Mar 11, after the switch
        // Local time stays 09:00; UTC offset shifts from -5 to -4.
        assert_eq!(fourth, Utc.with_ymd_and_hms(2024, 3, 11, 13, 0, 0).unwrap());
    }
}
