//! Budgets and period windows
//!
//! A budget caps a user's (optionally project-scoped) spend over a
//! rolling window derived from its reset period. All window math is UTC;
//! the weekly anchor day is configurable for non-ISO locales.

use chrono::{DateTime, Datelike, Days, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// How often a budget's accounting window resets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetPeriod {
    /// The window is the budget's whole lifetime
    Never,
    /// Resets at UTC midnight
    Daily,
    /// Resets at the start of the configured week day
    Weekly,
    /// Resets on the first of the month
    Monthly,
    /// Resets on the first day of the quarter
    Quarterly,
    /// Resets on January 1
    Yearly,
}

/// First day of the accounting week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    /// ISO default
    #[default]
    Monday,
    /// Used by some locales
    Sunday,
    /// Used by some locales
    Saturday,
}

impl WeekStart {
    fn weekday(self) -> Weekday {
        match self {
            WeekStart::Monday => Weekday::Mon,
            WeekStart::Sunday => Weekday::Sun,
            WeekStart::Saturday => Weekday::Sat,
        }
    }
}

/// A spend budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    /// Budget id
    pub id: String,
    /// Owning user; only the owner may delete the budget
    pub owner_user_id: String,
    /// Restrict the budget to one project's spend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Cap in USD, strictly positive
    pub amount_usd: f64,
    /// Budget comes into force at this instant
    pub start_date: DateTime<Utc>,
    /// Budget expires at this instant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Window reset cadence
    pub reset_period: ResetPeriod,
    /// Alert once usage crosses this percentage of the cap
    pub alert_threshold_pct: f64,
    /// Deny requests that would exceed the cap
    pub enforce: bool,
    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    /// Validate budget constraints
    pub fn validate(&self) -> Result<(), String> {
        if self.amount_usd <= 0.0 {
            return Err("budget amount must be positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.alert_threshold_pct) {
            return Err("alert threshold must be in [0, 100]".to_string());
        }
        Ok(())
    }

    /// Whether the budget applies at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_date && self.end_date.is_none_or(|end| now <= end)
    }

    /// The accounting window containing `now`.
    ///
    /// The start is the latest period boundary at or before `now`, never
    /// earlier than the budget's own start date; the end is the budget's
    /// end date, if any.
    pub fn period_window(
        &self,
        now: DateTime<Utc>,
        week_start: WeekStart,
    ) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        let boundary = match self.reset_period {
            ResetPeriod::Never => self.start_date,
            ResetPeriod::Daily => utc_midnight(now),
            ResetPeriod::Weekly => week_origin(now, week_start),
            ResetPeriod::Monthly => month_origin(now),
            ResetPeriod::Quarterly => quarter_origin(now),
            ResetPeriod::Yearly => year_origin(now),
        };
        (boundary.max(self.start_date), self.end_date)
    }

    /// The next reset boundary strictly after `now`, or `None` for
    /// never-resetting budgets and budgets already past their end date.
    pub fn next_reset_date(
        &self,
        now: DateTime<Utc>,
        week_start: WeekStart,
    ) -> Option<DateTime<Utc>> {
        if self.end_date.is_some_and(|end| now > end) {
            return None;
        }
        match self.reset_period {
            ResetPeriod::Never => None,
            ResetPeriod::Daily => utc_midnight(now).checked_add_days(Days::new(1)),
            ResetPeriod::Weekly => week_origin(now, week_start).checked_add_days(Days::new(7)),
            ResetPeriod::Monthly => Some(add_months(month_origin(now), 1)),
            ResetPeriod::Quarterly => Some(add_months(quarter_origin(now), 3)),
            ResetPeriod::Yearly => Some(add_months(year_origin(now), 12)),
        }
    }
}

fn utc_midnight(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn week_origin(at: DateTime<Utc>, week_start: WeekStart) -> DateTime<Utc> {
    let anchor = week_start.weekday().num_days_from_monday();
    let today = at.weekday().num_days_from_monday();
    let back = (today + 7 - anchor) % 7;
    utc_midnight(at) - chrono::Duration::days(i64::from(back))
}

fn month_origin(at: DateTime<Utc>) -> DateTime<Utc> {
    let date = at.date_naive().with_day(1).unwrap_or(at.date_naive());
    date.and_time(NaiveTime::MIN).and_utc()
}

fn quarter_origin(at: DateTime<Utc>) -> DateTime<Utc> {
    let month = (at.month0() / 3) * 3 + 1;
    let date = at
        .date_naive()
        .with_day(1)
        .and_then(|d| d.with_month(month))
        .unwrap_or(at.date_naive());
    date.and_time(NaiveTime::MIN).and_utc()
}

fn year_origin(at: DateTime<Utc>) -> DateTime<Utc> {
    let date = at
        .date_naive()
        .with_day(1)
        .and_then(|d| d.with_month(1))
        .unwrap_or(at.date_naive());
    date.and_time(NaiveTime::MIN).and_utc()
}

fn add_months(origin: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let total = origin.month0() + months;
    let year = origin.year() + (total / 12) as i32;
    let month = total % 12 + 1;
    let date = origin
        .date_naive()
        .with_year(year)
        .and_then(|d| d.with_month(month))
        .unwrap_or(origin.date_naive());
    date.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn budget(reset: ResetPeriod) -> Budget {
        Budget {
            id: "b1".to_string(),
            owner_user_id: "u1".to_string(),
            project_id: None,
            amount_usd: 10.0,
            start_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end_date: None,
            reset_period: reset,
            alert_threshold_pct: 80.0,
            enforce: true,
            tags: Vec::new(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    // 2024-06-19 was a Wednesday.
    fn wednesday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 19, 15, 30, 0).unwrap()
    }

    #[test]
    fn daily_window_starts_at_utc_midnight() {
        let (start, end) = budget(ResetPeriod::Daily).period_window(wednesday(), WeekStart::Monday);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 19, 0, 0, 0).unwrap());
        assert!(end.is_none());
    }

    #[test]
    fn weekly_window_anchors_on_monday() {
        let (start, _) = budget(ResetPeriod::Weekly).period_window(wednesday(), WeekStart::Monday);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 17, 0, 0, 0).unwrap());
    }

    #[test]
    fn weekly_window_respects_configured_anchor() {
        let (start, _) = budget(ResetPeriod::Weekly).period_window(wednesday(), WeekStart::Sunday);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn monthly_quarterly_yearly_origins() {
        let now = wednesday();
        let (m, _) = budget(ResetPeriod::Monthly).period_window(now, WeekStart::Monday);
        assert_eq!(m, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());

        let (q, _) = budget(ResetPeriod::Quarterly).period_window(now, WeekStart::Monday);
        assert_eq!(q, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());

        let (y, _) = budget(ResetPeriod::Yearly).period_window(now, WeekStart::Monday);
        assert_eq!(y, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn late_start_date_overrides_period_origin() {
        let mut b = budget(ResetPeriod::Monthly);
        b.start_date = Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap();
        let (start, _) = b.period_window(wednesday(), WeekStart::Monday);
        assert_eq!(start, b.start_date);
    }

    #[test]
    fn next_reset_is_strictly_future() {
        let now = wednesday();
        for reset in [
            ResetPeriod::Daily,
            ResetPeriod::Weekly,
            ResetPeriod::Monthly,
            ResetPeriod::Quarterly,
            ResetPeriod::Yearly,
        ] {
            let next = budget(reset)
                .next_reset_date(now, WeekStart::Monday)
                .expect("resetting budgets have a next boundary");
            assert!(next > now, "{:?} reset not in the future", reset);
        }
        assert!(budget(ResetPeriod::Never)
            .next_reset_date(now, WeekStart::Monday)
            .is_none());
    }

    #[test]
    fn next_reset_after_end_date_is_none() {
        let mut b = budget(ResetPeriod::Daily);
        b.end_date = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        assert!(b.next_reset_date(wednesday(), WeekStart::Monday).is_none());
    }

    #[test]
    fn quarter_rollover_crosses_year() {
        let december = Utc.with_ymd_and_hms(2024, 12, 5, 0, 0, 0).unwrap();
        let next = budget(ResetPeriod::Quarterly)
            .next_reset_date(december, WeekStart::Monday)
            .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn validation_rejects_nonpositive_amounts() {
        let mut b = budget(ResetPeriod::Never);
        b.amount_usd = 0.0;
        assert!(b.validate().is_err());
        b.amount_usd = 5.0;
        b.alert_threshold_pct = 150.0;
        assert!(b.validate().is_err());
    }
}
