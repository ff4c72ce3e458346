//! Run cadence and catch-up planning
//!
//! Intervals are aligned to UTC boundaries. A run for an interval fires once
//! the interval has closed, so the first run happens one period after the
//! first boundary on or after the start date.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Hourly,
    Daily,
    /// Sunday 00:00 UTC
    Weekly,
    /// First of the month, 00:00 UTC
    Monthly,
}

impl Schedule {
    /// Latest boundary at or before `t`
    pub fn floor(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let date = t.date_naive();
        match self {
            Schedule::Hourly => midnight(date) + Duration::hours(i64::from(t.hour())),
            Schedule::Daily => midnight(date),
            Schedule::Weekly => {
                midnight(date - Duration::days(i64::from(date.weekday().num_days_from_sunday())))
            }
            Schedule::Monthly => midnight(date.with_day(1).unwrap_or(date)),
        }
    }

    /// The boundary one period after `boundary`
    pub fn advance(&self, boundary: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Schedule::Hourly => boundary + Duration::hours(1),
            Schedule::Daily => boundary + Duration::days(1),
            Schedule::Weekly => boundary + Duration::days(7),
            Schedule::Monthly => boundary
                .checked_add_months(Months::new(1))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// First boundary strictly after `t`
    pub fn next_after(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.advance(self.floor(t))
    }

    /// Boundaries strictly between `after` and `before`
    pub fn boundaries_between(&self, after: DateTime<Utc>, before: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut boundaries = Vec::new();
        let mut boundary = self.next_after(after);
        while boundary < before {
            boundaries.push(boundary);
            boundary = self.advance(boundary);
        }
        boundaries
    }

    /// Run times owed at startup.
    ///
    /// With `catchup` every closed interval since `start_date` gets a run;
    /// without it only the most recent one does.
    pub fn missed_runs(
        &self,
        start_date: NaiveDate,
        now: DateTime<Utc>,
        catchup: bool,
    ) -> Vec<DateTime<Utc>> {
        let start = midnight(start_date);
        let first = if self.floor(start) == start {
            start
        } else {
            self.next_after(start)
        };

        let mut runs = Vec::new();
        let mut fire = self.advance(first);
        while fire <= now {
            runs.push(fire);
            fire = self.advance(fire);
        }

        if !catchup && runs.len() > 1 {
            runs.drain(..runs.len() - 1);
        }
        runs
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('@').to_lowercase().as_str() {
            "hourly" => Ok(Schedule::Hourly),
            "daily" => Ok(Schedule::Daily),
            "weekly" => Ok(Schedule::Weekly),
            "monthly" => Ok(Schedule::Monthly),
            other => Err(format!(
                "unknown schedule {:?} (expected @hourly, @daily, @weekly or @monthly)",
                other
            )),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Hourly => write!(f, "@hourly"),
            Schedule::Daily => write!(f, "@daily"),
            Schedule::Weekly => write!(f, "@weekly"),
            Schedule::Monthly => write!(f, "@monthly"),
        }
    }
}
