use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

use crate::model::{DutyRecord, DutyStatus};

pub const GRID_WEEKS: usize = 6;
pub const GRID_DAYS: usize = GRID_WEEKS * 7;

#[derive(Debug, Clone, Serialize)]
pub struct CalendarError {
    pub code: String,
    pub message: String,
}

impl CalendarError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCounts {
    pub total: usize,
    pub completed: usize,
    pub missed: usize,
    pub scheduled: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub date: NaiveDate,
    pub day: u32,
    pub month: u32,
    pub year: i32,
    pub in_month: bool,
    pub is_today: bool,
    pub duties: Vec<DutyRecord>,
    pub counts: DayCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<Vec<DayCell>>,
}

fn check_month(year: i32, month: u32) -> Result<NaiveDate, CalendarError> {
    if !(1..=12).contains(&month) {
        return Err(CalendarError::new(
            "bad_params",
            "month must be between 1 and 12",
        ));
    }
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| CalendarError::new("bad_params", "year out of range"))
}

/// First cell of the 6x7 grid for a month: the first of the month walked
/// back to the preceding Monday. A month starting on Monday anchors on its
/// own first day.
pub fn grid_anchor(year: i32, month: u32) -> Result<NaiveDate, CalendarError> {
    let first = check_month(year, month)?;
    let back = match first.weekday() {
        Weekday::Sun => 6,
        w => w.num_days_from_monday() as i64,
    };
    Ok(first - Duration::days(back))
}

/// Lay a month out as 6 weeks of 7 days, bucketing `duties` by calendar
/// day and tallying per-day status counts. `today` is injected so the
/// grid is deterministic under test; production callers pass the wall
/// clock date.
pub fn month_grid(
    year: i32,
    month: u32,
    duties: &[DutyRecord],
    today: NaiveDate,
) -> Result<MonthGrid, CalendarError> {
    let anchor = grid_anchor(year, month)?;

    let mut weeks: Vec<Vec<DayCell>> = Vec::with_capacity(GRID_WEEKS);
    let mut week: Vec<DayCell> = Vec::with_capacity(7);
    for i in 0..GRID_DAYS {
        let date = anchor + Duration::days(i as i64);
        let day_duties: Vec<DutyRecord> = duties
            .iter()
            .filter(|d| d.date == date)
            .cloned()
            .collect();
        let mut counts = DayCounts {
            total: day_duties.len(),
            ..DayCounts::default()
        };
        for d in &day_duties {
            match d.status {
                DutyStatus::Completed => counts.completed += 1,
                DutyStatus::Missed => counts.missed += 1,
                DutyStatus::Scheduled => counts.scheduled += 1,
                DutyStatus::Excused => {}
            }
        }
        week.push(DayCell {
            date,
            day: date.day(),
            month: date.month(),
            year: date.year(),
            in_month: date.year() == year && date.month() == month,
            is_today: date == today,
            duties: day_duties,
            counts,
        });
        if week.len() == 7 {
            weeks.push(std::mem::take(&mut week));
            week = Vec::with_capacity(7);
        }
    }

    Ok(MonthGrid { year, month, weeks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Shift;

    fn duty(id: &str, date: &str, status: DutyStatus) -> DutyRecord {
        DutyRecord {
            id: id.to_string(),
            user_id: "u1".to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("date"),
            shift: Shift::Morning,
            location: "yard".to_string(),
            task: "sweep".to_string(),
            status,
            notes: None,
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn anchor_is_monday_on_or_before_the_first() {
        // Jan 1 2024 is itself a Monday.
        assert_eq!(grid_anchor(2024, 1).unwrap(), d("2024-01-01"));
        // Sep 1 2024 is a Sunday: back up six days.
        assert_eq!(grid_anchor(2024, 9).unwrap(), d("2024-08-26"));
        // Feb 1 2024 is a Thursday.
        assert_eq!(grid_anchor(2024, 2).unwrap(), d("2024-01-29"));
    }

    #[test]
    fn grid_is_always_42_consecutive_days() {
        for month in 1..=12 {
            let grid = month_grid(2024, month, &[], d("2024-06-15")).unwrap();
            assert_eq!(grid.weeks.len(), GRID_WEEKS);
            let anchor = grid_anchor(2024, month).unwrap();
            let cells: Vec<&DayCell> = grid.weeks.iter().flatten().collect();
            assert_eq!(cells.len(), GRID_DAYS);
            for (i, cell) in cells.iter().enumerate() {
                assert_eq!(cell.date, anchor + Duration::days(i as i64));
            }
        }
    }

    #[test]
    fn in_month_marks_exactly_the_days_of_the_month() {
        let grid = month_grid(2024, 2, &[], d("2024-02-10")).unwrap();
        let in_month = grid
            .weeks
            .iter()
            .flatten()
            .filter(|c| c.in_month)
            .count();
        assert_eq!(in_month, 29); // leap February
    }

    #[test]
    fn duties_bucket_by_calendar_day_with_counts() {
        let duties = vec![
            duty("1", "2024-01-15", DutyStatus::Completed),
            duty("2", "2024-01-20", DutyStatus::Scheduled),
            duty("3", "2024-01-18", DutyStatus::Completed),
            duty("4", "2024-01-22", DutyStatus::Missed),
        ];
        let grid = month_grid(2024, 1, &duties, d("2024-01-15")).unwrap();
        let cells: Vec<&DayCell> = grid.weeks.iter().flatten().collect();

        // Jan 1 2024 is a Monday, so the anchor is the first itself and
        // Jan 15 lands at index 14.
        let jan15 = cells[14];
        assert_eq!(jan15.date, d("2024-01-15"));
        assert!(jan15.is_today);
        assert_eq!(jan15.counts.completed, 1);
        assert_eq!(jan15.counts.total, 1);

        let jan20 = cells[19];
        assert_eq!(jan20.counts.scheduled, 1);
        assert_eq!(jan20.counts.completed, 0);

        let jan22 = cells[21];
        assert_eq!(jan22.counts.missed, 1);
    }

    #[test]
    fn excused_counts_toward_total_only() {
        let duties = vec![duty("1", "2024-03-05", DutyStatus::Excused)];
        let grid = month_grid(2024, 3, &duties, d("2024-03-01")).unwrap();
        let cell = grid
            .weeks
            .iter()
            .flatten()
            .find(|c| c.date == d("2024-03-05"))
            .unwrap();
        assert_eq!(cell.counts.total, 1);
        assert_eq!(cell.counts.completed, 0);
        assert_eq!(cell.counts.missed, 0);
        assert_eq!(cell.counts.scheduled, 0);
    }

    #[test]
    fn month_out_of_range_is_rejected() {
        assert!(month_grid(2024, 0, &[], d("2024-01-01")).is_err());
        assert!(month_grid(2024, 13, &[], d("2024-01-01")).is_err());
        assert!(grid_anchor(2024, 13).is_err());
    }
}
