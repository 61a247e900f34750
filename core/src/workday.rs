//! Working-day and SLA deadline arithmetic, shared by batch,
//! disbursement and suspense tracking.
//!
//! Saturdays and Sundays are non-working. Public-holiday calendars are an
//! external collaborator concern and are not consulted here.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

/// Hours a monthly batch has to finish calculating.
pub const BATCH_SLA_HOURS: i64 = 6;

/// Working days a disbursement has to reach COMPLETED.
pub const DISBURSEMENT_SLA_WORKING_DAYS: u32 = 10;

pub fn is_working_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The date `days` working days after `start`. The start date itself does
/// not count: Friday + 1 working day is Monday.
pub fn add_working_days(start: NaiveDate, days: u32) -> NaiveDate {
    let mut date = start;
    let mut remaining = days;
    while remaining > 0 {
        date += Duration::days(1);
        if is_working_day(date) {
            remaining -= 1;
        }
    }
    date
}

/// Working days in the half-open interval `(from, to]`.
/// Returns 0 when `to <= from`.
pub fn working_days_between(from: NaiveDate, to: NaiveDate) -> u32 {
    if to <= from {
        return 0;
    }
    let mut date = from;
    let mut count = 0;
    while date < to {
        date += Duration::days(1);
        if is_working_day(date) {
            count += 1;
        }
    }
    count
}

/// Batch SLA: wall-clock hours, weekends included.
pub fn batch_sla_deadline(started_at: NaiveDateTime) -> NaiveDateTime {
    started_at + Duration::hours(BATCH_SLA_HOURS)
}

/// Disbursement SLA: 10 working days from initiation, same time of day.
pub fn disbursement_sla_deadline(initiated_at: NaiveDateTime) -> NaiveDateTime {
    let deadline_date = add_working_days(initiated_at.date(), DISBURSEMENT_SLA_WORKING_DAYS);
    NaiveDateTime::new(deadline_date, initiated_at.time())
}
