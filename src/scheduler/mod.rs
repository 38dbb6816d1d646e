//! Daily trigger evaluation.
//!
//! A [`DailyTrigger`] fires once per calendar day at a fixed wall-clock time,
//! optionally restricted to some days of the week. The [`Scheduler`] keeps the next
//! due instant and is polled by the scheduler loop.
//!
//! # Example
//!
//! ```rust
//! use certpost::scheduler::{DailyTrigger, Scheduler};
//! use chrono::{Local, NaiveTime, TimeZone};
//!
//! let trigger = DailyTrigger {
//!     at: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
//!     days: vec![],
//! };
//! let now = Local.with_ymd_and_hms(2024, 5, 1, 7, 30, 0).unwrap();
//! let mut scheduler = Scheduler::new(trigger, now);
//!
//! assert!(!scheduler.poll(now));
//! assert!(scheduler.poll(Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 1).unwrap()));
//! ```

use chrono::{DateTime, Datelike, Duration, Local, NaiveTime};
use serde::{Deserialize, Serialize};

/// Number of days searched ahead for the next matching weekday
const LOOKAHEAD_DAYS: i64 = 8;

/// Days of the week a trigger may be restricted to
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Weekday {
    /// Monday
    Monday,
    /// Tuesday
    Tuesday,
    /// Wednesday
    Wednesday,
    /// Thursday
    Thursday,
    /// Friday
    Friday,
    /// Saturday
    Saturday,
    /// Sunday
    Sunday,
}

impl Weekday {
    /// Convert from chrono::Weekday to our Weekday
    pub fn from_chrono(wd: chrono::Weekday) -> Self {
        use chrono::Weekday as ChronoWd;
        match wd {
            ChronoWd::Mon => Weekday::Monday,
            ChronoWd::Tue => Weekday::Tuesday,
            ChronoWd::Wed => Weekday::Wednesday,
            ChronoWd::Thu => Weekday::Thursday,
            ChronoWd::Fri => Weekday::Friday,
            ChronoWd::Sat => Weekday::Saturday,
            ChronoWd::Sun => Weekday::Sunday,
        }
    }
}

/// Fires once per day at `at`, on `days` (empty = every day)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyTrigger {
    /// Wall-clock time of day (HH:MM or HH:MM:SS, local time)
    #[serde(with = "time_format")]
    pub at: NaiveTime,

    /// Days this trigger applies (empty = all days)
    #[serde(default)]
    pub days: Vec<Weekday>,
}

impl DailyTrigger {
    /// Whether the trigger is active on the given day
    pub fn runs_on(&self, weekday: chrono::Weekday) -> bool {
        self.days.is_empty() || self.days.contains(&Weekday::from_chrono(weekday))
    }

    /// First firing instant strictly after `now`
    ///
    /// Days on which `at` does not exist locally (DST gap) are skipped.
    pub fn next_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let today = now.date_naive();

        (0..LOOKAHEAD_DAYS)
            .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
            .filter(|day| self.runs_on(day.weekday()))
            .filter_map(|day| day.and_time(self.at).and_local_timezone(Local).earliest())
            .find(|candidate| *candidate > now)
    }
}

/// Tracks when the daily trigger is next due
#[derive(Clone, Debug)]
pub struct Scheduler {
    trigger: DailyTrigger,
    next_due: Option<DateTime<Local>>,
}

impl Scheduler {
    /// Create a scheduler whose first firing is the next occurrence after `now`
    pub fn new(trigger: DailyTrigger, now: DateTime<Local>) -> Self {
        let next_due = trigger.next_after(now);
        Self { trigger, next_due }
    }

    /// The trigger this scheduler evaluates
    pub fn trigger(&self) -> &DailyTrigger {
        &self.trigger
    }

    /// Next instant at which [`poll`](Self::poll) returns true
    pub fn next_due(&self) -> Option<DateTime<Local>> {
        self.next_due
    }

    /// Returns true when the trigger is due, and reschedules it
    ///
    /// A trigger overdue by several days (machine asleep) fires once, then moves to
    /// the next occurrence after `now`.
    pub fn poll(&mut self, now: DateTime<Local>) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = self.trigger.next_after(now);
                true
            }
            _ => false,
        }
    }
}

/// Serde module for NaiveTime as `HH:MM:SS` (also accepts `HH:MM`)
pub(crate) mod time_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = time.format("%H:%M:%S").to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M"))
            .map_err(serde::de::Error::custom)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
