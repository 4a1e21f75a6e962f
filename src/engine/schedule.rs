//! Weekly opening-hours resolution.
//!
//! A [`WeeklySchedule`] is validated once per store and run, then queried per
//! local calendar date by the interval builder.

use crate::model::ScheduleRule;
use chrono::{NaiveTime, Weekday};
use serde::Deserialize;
use thiserror::Error;

/// How a weekday without any rule is treated for a store that has rules on
/// other days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscheduledDays {
    /// Open around the clock, the same as a store with no rules at all.
    #[default]
    Open,
    Closed,
}

/// How several rules for the same store and weekday are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateDayRules {
    #[default]
    Reject,
    /// Non-overlapping rules on one weekday are separate shifts.
    SplitShifts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub unscheduled_days: UnscheduledDays,
    pub duplicate_day_rules: DuplicateDayRules,
    pub allow_overnight: bool,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            unscheduled_days: UnscheduledDays::default(),
            duplicate_day_rules: DuplicateDayRules::default(),
            allow_overnight: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleIssue {
    #[error("day_of_week {0} outside 0..=6")]
    InvalidWeekday(u8),
    #[error("rule on day {day} opens and closes at {at}")]
    EmptySpan { day: u8, at: NaiveTime },
    #[error("overnight rule {open}-{close} on day {day} while overnight spans are disabled")]
    OvernightDisabled {
        day: u8,
        open: NaiveTime,
        close: NaiveTime,
    },
    #[error("{count} rules for day {day}")]
    DuplicateDay { day: u8, count: usize },
    #[error("overlapping rules on day {day}")]
    Overlapping { day: u8 },
}

/// Opening span in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSpan {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl LocalSpan {
    pub fn is_overnight(&self) -> bool {
        self.close < self.open
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DaySchedule {
    #[default]
    AllDay,
    /// Spans ordered by opening time; empty means closed.
    Open(Vec<LocalSpan>),
}

static ALL_DAY: DaySchedule = DaySchedule::AllDay;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    days: Option<[DaySchedule; 7]>,
}

impl WeeklySchedule {
    pub fn always_open() -> Self {
        Self { days: None }
    }

    /// Validate one store's rules.
    ///
    /// A store with no rules is always open.
    pub fn from_rules<'a, I>(rules: I, policy: &SchedulePolicy) -> Result<Self, ScheduleIssue>
    where
        I: IntoIterator<Item = &'a ScheduleRule>,
    {
        let mut per_day: [Vec<LocalSpan>; 7] = Default::default();
        let mut any = false;

        for rule in rules {
            any = true;
            let day = rule.day_of_week;
            let slot = per_day
                .get_mut(usize::from(day))
                .ok_or(ScheduleIssue::InvalidWeekday(day))?;
            let span = LocalSpan {
                open: rule.open_time_local,
                close: rule.close_time_local,
            };
            if span.open == span.close {
                return Err(ScheduleIssue::EmptySpan { day, at: span.open });
            }
            if span.is_overnight() && !policy.allow_overnight {
                return Err(ScheduleIssue::OvernightDisabled {
                    day,
                    open: span.open,
                    close: span.close,
                });
            }
            slot.push(span);
        }

        if !any {
            return Ok(Self::always_open());
        }

        let mut days: [DaySchedule; 7] = Default::default();
        for (index, mut spans) in per_day.into_iter().enumerate() {
            let day = index as u8;
            if spans.is_empty() {
                days[index] = match policy.unscheduled_days {
                    UnscheduledDays::Closed => DaySchedule::Open(Vec::new()),
                    UnscheduledDays::Open => DaySchedule::AllDay,
                };
                continue;
            }
            if spans.len() > 1 && policy.duplicate_day_rules == DuplicateDayRules::Reject {
                return Err(ScheduleIssue::DuplicateDay {
                    day,
                    count: spans.len(),
                });
            }
            spans.sort_by_key(|span| (span.open, span.close));
            if has_overlap(&spans) {
                return Err(ScheduleIssue::Overlapping { day });
            }
            days[index] = DaySchedule::Open(spans);
        }

        Ok(Self { days: Some(days) })
    }

    pub fn is_always_open(&self) -> bool {
        self.days.is_none()
    }

    pub fn day(&self, weekday: Weekday) -> &DaySchedule {
        match &self.days {
            None => &ALL_DAY,
            Some(days) => &days[weekday.num_days_from_monday() as usize],
        }
    }
}

// Spans are sorted by opening time. An overnight span runs to midnight on its
// own day, so anything opening after it overlaps.
fn has_overlap(spans: &[LocalSpan]) -> bool {
    spans.windows(2).any(|pair| {
        let (first, second) = (pair[0], pair[1]);
        first.is_overnight() || second.open < first.close
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    fn rule(day: u8, open: NaiveTime, close: NaiveTime) -> ScheduleRule {
        ScheduleRule {
            store_id: 1,
            day_of_week: day,
            open_time_local: open,
            close_time_local: close,
        }
    }

    #[test]
    fn no_rules_means_always_open() -> Result<(), ScheduleIssue> {
        let schedule = WeeklySchedule::from_rules(&[], &SchedulePolicy::default())?;
        assert!(schedule.is_always_open());
        assert_eq!(schedule.day(Weekday::Wed), &DaySchedule::AllDay);
        Ok(())
    }

    #[test]
    fn unscheduled_days_follow_policy() -> Result<(), ScheduleIssue> {
        let rules = vec![rule(0, hm(9, 0), hm(17, 0))];

        let open = WeeklySchedule::from_rules(&rules, &SchedulePolicy::default())?;
        assert_eq!(
            open.day(Weekday::Mon),
            &DaySchedule::Open(vec![LocalSpan {
                open: hm(9, 0),
                close: hm(17, 0)
            }])
        );
        assert_eq!(open.day(Weekday::Tue), &DaySchedule::AllDay);
        assert!(!open.is_always_open());

        let closed = WeeklySchedule::from_rules(
            &rules,
            &SchedulePolicy {
                unscheduled_days: UnscheduledDays::Closed,
                ..SchedulePolicy::default()
            },
        )?;
        assert_eq!(closed.day(Weekday::Tue), &DaySchedule::Open(Vec::new()));
        Ok(())
    }

    #[test]
    fn duplicate_day_rejected_by_default() {
        let rules = vec![rule(2, hm(9, 0), hm(12, 0)), rule(2, hm(14, 0), hm(18, 0))];
        let result = WeeklySchedule::from_rules(&rules, &SchedulePolicy::default());
        assert_eq!(result, Err(ScheduleIssue::DuplicateDay { day: 2, count: 2 }));
    }

    #[test]
    fn split_shifts_are_sorted() -> Result<(), ScheduleIssue> {
        let rules = vec![rule(2, hm(14, 0), hm(18, 0)), rule(2, hm(9, 0), hm(12, 0))];
        let policy = SchedulePolicy {
            duplicate_day_rules: DuplicateDayRules::SplitShifts,
            ..SchedulePolicy::default()
        };
        let schedule = WeeklySchedule::from_rules(&rules, &policy)?;
        match schedule.day(Weekday::Wed) {
            DaySchedule::Open(spans) => {
                assert_eq!(spans.len(), 2);
                assert_eq!(spans[0].open, hm(9, 0));
                assert_eq!(spans[1].open, hm(14, 0));
            }
            other => panic!("expected open spans, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn overlapping_shifts_are_rejected() {
        let rules = vec![rule(4, hm(9, 0), hm(13, 0)), rule(4, hm(12, 0), hm(18, 0))];
        let policy = SchedulePolicy {
            duplicate_day_rules: DuplicateDayRules::SplitShifts,
            ..SchedulePolicy::default()
        };
        let result = WeeklySchedule::from_rules(&rules, &policy);
        assert_eq!(result, Err(ScheduleIssue::Overlapping { day: 4 }));
    }

    #[test]
    fn overnight_rule_follows_policy() {
        let rules = vec![rule(5, hm(20, 0), hm(2, 0))];
        assert!(WeeklySchedule::from_rules(&rules, &SchedulePolicy::default()).is_ok());

        let disabled = SchedulePolicy {
            allow_overnight: false,
            ..SchedulePolicy::default()
        };
        assert!(matches!(
            WeeklySchedule::from_rules(&rules, &disabled),
            Err(ScheduleIssue::OvernightDisabled { day: 5, .. })
        ));
    }

    #[test]
    fn invalid_weekday_and_empty_span_are_rejected() {
        let policy = SchedulePolicy::default();
        assert_eq!(
            WeeklySchedule::from_rules(&[rule(7, hm(9, 0), hm(10, 0))], &policy),
            Err(ScheduleIssue::InvalidWeekday(7))
        );
        assert_eq!(
            WeeklySchedule::from_rules(&[rule(1, hm(9, 0), hm(9, 0))], &policy),
            Err(ScheduleIssue::EmptySpan { day: 1, at: hm(9, 0) })
        );
    }
}
