use chrono::{Duration, NaiveDate};

/// The calendar window homework is spread over: `total_days` elapsed days
/// from `start_date` through `due_date`, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudyWindow {
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_days: usize,
}

impl StudyWindow {
    /// An inverted window (due before start) collapses onto the due date:
    /// everything becomes a single-day task.
    pub fn new(start_date: NaiveDate, due_date: NaiveDate) -> Self {
        let span = due_date.signed_duration_since(start_date).num_days() + 1;
        if span < 1 {
            StudyWindow { start_date: due_date, due_date, total_days: 1 }
        } else {
            StudyWindow { start_date, due_date, total_days: span as usize }
        }
    }
}

/// Splits sorted day indices into consecutive chunks of `ceil(n / total_days)`
/// so the work spreads evenly; the last chunk may be short. `total_days` below
/// 1 is clamped to 1. Every input index lands in exactly one chunk.
pub fn chunk_days(days: &[u32], total_days: usize) -> Vec<Vec<u32>> {
    if days.is_empty() {
        return Vec::new();
    }
    let total_days = total_days.max(1);
    let per_day = days.len().div_ceil(total_days);
    days.chunks(per_day).map(|chunk| chunk.to_vec()).collect()
}

/// Assigns one calendar date per chunk, walking forward from the window start.
/// The date cursor advances once per chunk slot even if a slot is empty, so a
/// window longer than the chunk list simply leaves its trailing days free.
pub fn plan_daily(days: &[u32], window: &StudyWindow) -> Vec<(NaiveDate, Vec<u32>)> {
    chunk_days(days, window.total_days)
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| (window.start_date + Duration::days(i as i64), chunk))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn even_split() {
        let days: Vec<u32> = (1..=10).collect();
        let chunks = chunk_days(&days, 5);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.len() == 2));
    }

    #[test]
    fn single_day_takes_everything() {
        assert_eq!(chunk_days(&[1, 2, 3], 1), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn zero_days_clamped() {
        assert_eq!(chunk_days(&[1, 2], 0), vec![vec![1, 2]]);
    }

    #[test]
    fn chunks_partition_input() {
        let days: Vec<u32> = vec![1, 2, 3, 5, 8, 9, 10, 14];
        for total in 1..=10 {
            let chunks = chunk_days(&days, total);
            let mut seen = BTreeSet::new();
            for chunk in &chunks {
                assert!(!chunk.is_empty());
                for d in chunk {
                    assert!(seen.insert(*d), "duplicated index {d}");
                }
            }
            assert_eq!(seen.into_iter().collect::<Vec<_>>(), days);
        }
    }

    #[test]
    fn window_spans_inclusive() {
        let w = StudyWindow::new(date(2024, 1, 2), date(2024, 1, 8));
        assert_eq!(w.total_days, 7);
    }

    #[test]
    fn inverted_window_collapses_to_due_date() {
        let w = StudyWindow::new(date(2024, 1, 9), date(2024, 1, 8));
        assert_eq!(w.start_date, date(2024, 1, 8));
        assert_eq!(w.due_date, date(2024, 1, 8));
        assert_eq!(w.total_days, 1);
    }

    #[test]
    fn sparse_split_leaves_trailing_days_free() {
        // 6 items over 7 days: one item per day, day 7 receives nothing.
        let days: Vec<u32> = (1..=6).collect();
        let w = StudyWindow::new(date(2024, 1, 2), date(2024, 1, 8));
        let plan = plan_daily(&days, &w);
        assert_eq!(plan.len(), 6);
        assert_eq!(plan[0], (date(2024, 1, 2), vec![1]));
        assert_eq!(plan[5], (date(2024, 1, 7), vec![6]));
    }
}
