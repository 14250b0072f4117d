use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::model::{DutyRecord, DutyStatus, Shift};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DutySummary {
    pub total: usize,
    pub completed: usize,
    pub missed: usize,
    pub excused: usize,
    pub scheduled: usize,
    /// Integer percentage, rounded to nearest; 0 when there are no duties.
    pub completion_rate: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftBucket {
    pub shift: Shift,
    pub summary: DutySummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBucket {
    pub location: String,
    pub summary: DutySummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBucket {
    pub user_id: String,
    pub summary: DutySummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    pub summary: DutySummary,
}

/// Single-pass status tally over a snapshot of duties. Order-independent.
pub fn summarize(duties: &[DutyRecord]) -> DutySummary {
    let mut s = DutySummary {
        total: duties.len(),
        ..DutySummary::default()
    };
    for d in duties {
        match d.status {
            DutyStatus::Completed => s.completed += 1,
            DutyStatus::Missed => s.missed += 1,
            DutyStatus::Excused => s.excused += 1,
            DutyStatus::Scheduled => s.scheduled += 1,
        }
    }
    if s.total > 0 {
        s.completion_rate =
            ((s.completed as f64 / s.total as f64) * 100.0).round() as u32;
    }
    s
}

pub fn by_shift(duties: &[DutyRecord]) -> Vec<ShiftBucket> {
    Shift::ALL
        .iter()
        .map(|&shift| {
            let part: Vec<DutyRecord> = duties
                .iter()
                .filter(|d| d.shift == shift)
                .cloned()
                .collect();
            ShiftBucket {
                shift,
                summary: summarize(&part),
            }
        })
        .collect()
}

/// Buckets preserve first-appearance order of the location in the input.
pub fn by_location(duties: &[DutyRecord]) -> Vec<LocationBucket> {
    let mut order: Vec<String> = Vec::new();
    for d in duties {
        if !order.iter().any(|l| *l == d.location) {
            order.push(d.location.clone());
        }
    }
    order
        .into_iter()
        .map(|location| {
            let part: Vec<DutyRecord> = duties
                .iter()
                .filter(|d| d.location == location)
                .cloned()
                .collect();
            LocationBucket {
                location,
                summary: summarize(&part),
            }
        })
        .collect()
}

/// Buckets preserve first-appearance order of the user in the input.
pub fn by_user(duties: &[DutyRecord]) -> Vec<UserBucket> {
    let mut order: Vec<String> = Vec::new();
    for d in duties {
        if !order.iter().any(|u| *u == d.user_id) {
            order.push(d.user_id.clone());
        }
    }
    order
        .into_iter()
        .map(|user_id| {
            let part: Vec<DutyRecord> = duties
                .iter()
                .filter(|d| d.user_id == user_id)
                .cloned()
                .collect();
            UserBucket {
                user_id,
                summary: summarize(&part),
            }
        })
        .collect()
}

/// Rank users by completed count. Ties break by completion rate, then by
/// first appearance in the input (stable sort).
pub fn top_performers(duties: &[DutyRecord], limit: usize) -> Vec<UserBucket> {
    let mut buckets = by_user(duties);
    buckets.sort_by(|a, b| {
        b.summary
            .completed
            .cmp(&a.summary.completed)
            .then(b.summary.completion_rate.cmp(&a.summary.completion_rate))
    });
    buckets.truncate(limit);
    buckets
}

fn month_back(year: i32, month: u32, back: u32) -> (i32, u32) {
    let idx = year * 12 + (month as i32 - 1) - back as i32;
    (idx.div_euclid(12), (idx.rem_euclid(12) + 1) as u32)
}

/// One bucket per calendar month for the last `months` months, oldest
/// first, inclusive of the partial current month. Empty months are
/// emitted with zero counts. `now` is injected for determinism.
pub fn by_month(duties: &[DutyRecord], now: NaiveDate, months: u32) -> Vec<MonthBucket> {
    let mut out = Vec::with_capacity(months as usize);
    for back in (0..months).rev() {
        let (year, month) = month_back(now.year(), now.month(), back);
        let part: Vec<DutyRecord> = duties
            .iter()
            .filter(|d| d.date.year() == year && d.date.month() == month)
            .cloned()
            .collect();
        out.push(MonthBucket {
            year,
            month,
            summary: summarize(&part),
        });
    }
    out
}

/// Scheduled duties falling within [today, today + days], soonest first.
pub fn upcoming(duties: &[DutyRecord], today: NaiveDate, days: i64) -> Vec<DutyRecord> {
    let horizon = today + Duration::days(days);
    let mut out: Vec<DutyRecord> = duties
        .iter()
        .filter(|d| {
            d.status == DutyStatus::Scheduled && d.date >= today && d.date <= horizon
        })
        .cloned()
        .collect();
    out.sort_by_key(|d| d.date);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duty(user: &str, date: &str, shift: Shift, location: &str, status: DutyStatus) -> DutyRecord {
        DutyRecord {
            id: format!("{}-{}", user, date),
            user_id: user.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("date"),
            shift,
            location: location.to_string(),
            task: "clean".to_string(),
            status,
            notes: None,
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn sample() -> Vec<DutyRecord> {
        vec![
            duty("u2", "2024-01-15", Shift::Morning, "yard", DutyStatus::Completed),
            duty("u2", "2024-01-20", Shift::Afternoon, "room 12A1", DutyStatus::Scheduled),
            duty("u2", "2024-01-18", Shift::Evening, "library", DutyStatus::Completed),
            duty("u2", "2024-01-22", Shift::Morning, "canteen", DutyStatus::Missed),
        ]
    }

    #[test]
    fn empty_input_is_all_zeroes() {
        let s = summarize(&[]);
        assert_eq!(s, DutySummary::default());
        assert_eq!(s.completion_rate, 0);
    }

    #[test]
    fn summarize_counts_and_rounds_rate() {
        let s = summarize(&sample());
        assert_eq!(s.total, 4);
        assert_eq!(s.completed, 2);
        assert_eq!(s.missed, 1);
        assert_eq!(s.excused, 0);
        assert_eq!(s.scheduled, 1);
        assert_eq!(s.completion_rate, 50);
    }

    #[test]
    fn summarize_is_order_independent() {
        let mut duties = sample();
        let forward = summarize(&duties);
        duties.reverse();
        assert_eq!(summarize(&duties), forward);
    }

    #[test]
    fn all_completed_is_one_hundred_percent() {
        let duties = vec![
            duty("u1", "2024-02-01", Shift::Morning, "yard", DutyStatus::Completed),
            duty("u1", "2024-02-02", Shift::Morning, "yard", DutyStatus::Completed),
            duty("u1", "2024-02-03", Shift::Morning, "yard", DutyStatus::Completed),
        ];
        assert_eq!(summarize(&duties).completion_rate, 100);
    }

    #[test]
    fn rate_rounds_to_nearest_integer() {
        let duties = vec![
            duty("u1", "2024-02-01", Shift::Morning, "yard", DutyStatus::Completed),
            duty("u1", "2024-02-02", Shift::Morning, "yard", DutyStatus::Missed),
            duty("u1", "2024-02-03", Shift::Morning, "yard", DutyStatus::Missed),
        ];
        // 1/3 -> 33.33 -> 33
        assert_eq!(summarize(&duties).completion_rate, 33);
    }

    #[test]
    fn by_shift_always_emits_all_three_buckets() {
        let buckets = by_shift(&sample());
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].shift, Shift::Morning);
        assert_eq!(buckets[0].summary.total, 2);
        assert_eq!(buckets[1].summary.total, 1);
        assert_eq!(buckets[2].summary.total, 1);
    }

    #[test]
    fn by_location_keeps_first_seen_order() {
        let buckets = by_location(&sample());
        let names: Vec<&str> = buckets.iter().map(|b| b.location.as_str()).collect();
        assert_eq!(names, vec!["yard", "room 12A1", "library", "canteen"]);
    }

    #[test]
    fn top_performers_breaks_ties_by_rate_then_input_order() {
        let duties = vec![
            // u1: 1 completed of 2 (50%)
            duty("u1", "2024-01-01", Shift::Morning, "yard", DutyStatus::Completed),
            duty("u1", "2024-01-02", Shift::Morning, "yard", DutyStatus::Missed),
            // u2: 1 completed of 1 (100%)
            duty("u2", "2024-01-03", Shift::Morning, "yard", DutyStatus::Completed),
            // u3: 2 completed
            duty("u3", "2024-01-04", Shift::Morning, "yard", DutyStatus::Completed),
            duty("u3", "2024-01-05", Shift::Morning, "yard", DutyStatus::Completed),
        ];
        let top = top_performers(&duties, 5);
        let ids: Vec<&str> = top.iter().map(|b| b.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u3", "u2", "u1"]);

        let top2 = top_performers(&duties, 2);
        assert_eq!(top2.len(), 2);
    }

    #[test]
    fn by_month_emits_empty_buckets_and_wraps_years() {
        let duties = vec![duty("u1", "2024-01-15", Shift::Morning, "yard", DutyStatus::Completed)];
        let buckets = by_month(&duties, d("2024-02-10"), 6);
        assert_eq!(buckets.len(), 6);
        assert_eq!((buckets[0].year, buckets[0].month), (2023, 9));
        assert_eq!((buckets[5].year, buckets[5].month), (2024, 2));
        let jan = &buckets[4];
        assert_eq!((jan.year, jan.month), (2024, 1));
        assert_eq!(jan.summary.total, 1);
        assert_eq!(buckets[5].summary.total, 0);
    }

    #[test]
    fn upcoming_filters_window_and_sorts_ascending() {
        let duties = vec![
            duty("u1", "2024-01-10", Shift::Morning, "yard", DutyStatus::Scheduled),
            duty("u1", "2024-01-12", Shift::Morning, "yard", DutyStatus::Completed),
            duty("u1", "2024-01-11", Shift::Morning, "yard", DutyStatus::Scheduled),
            duty("u1", "2024-01-30", Shift::Morning, "yard", DutyStatus::Scheduled),
        ];
        let up = upcoming(&duties, d("2024-01-09"), 7);
        let dates: Vec<NaiveDate> = up.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![d("2024-01-10"), d("2024-01-11")]);
    }
}
