//! Training window policies.
//!
//! A policy maps an iteration index (1-based) to the window's optional start
//! date and its cutoff. Cutoffs advance by a fixed number of business days,
//! so they strictly increase from one iteration to the next.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::{add_business_days, sub_business_days};

/// Configured window policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowKind {
    /// Train on all history before the cutoff.
    #[default]
    Expanding,
    /// Train on rows from the last `train_days` business days before the cutoff.
    Sliding { train_days: u32 },
}

impl WindowKind {
    pub fn build(&self, initial_cutoff: NaiveDate, step_days: u32) -> Box<dyn WindowPolicy> {
        match *self {
            Self::Expanding => Box::new(ExpandingWindow {
                initial_cutoff,
                step_days,
            }),
            Self::Sliding { train_days } => Box::new(SlidingWindow {
                initial_cutoff,
                step_days,
                train_days,
            }),
        }
    }
}

/// Strategy for placing the training window of each iteration.
pub trait WindowPolicy: Send + Sync {
    /// `(start, cutoff)` for a 1-based iteration index. `None` start means
    /// all available history.
    fn bounds(&self, iteration: usize) -> (Option<NaiveDate>, NaiveDate);
}

fn nth_cutoff(initial: NaiveDate, step_days: u32, iteration: usize) -> NaiveDate {
    let steps = iteration.saturating_sub(1) as u32;
    add_business_days(initial, step_days.saturating_mul(steps))
}

#[derive(Debug, Clone, Copy)]
pub struct ExpandingWindow {
    pub initial_cutoff: NaiveDate,
    pub step_days: u32,
}

impl WindowPolicy for ExpandingWindow {
    fn bounds(&self, iteration: usize) -> (Option<NaiveDate>, NaiveDate) {
        (None, nth_cutoff(self.initial_cutoff, self.step_days, iteration))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SlidingWindow {
    pub initial_cutoff: NaiveDate,
    pub step_days: u32,
    pub train_days: u32,
}

impl WindowPolicy for SlidingWindow {
    fn bounds(&self, iteration: usize) -> (Option<NaiveDate>, NaiveDate) {
        let cutoff = nth_cutoff(self.initial_cutoff, self.step_days, iteration);
        (Some(sub_business_days(cutoff, self.train_days)), cutoff)
    }
}

/// The symbol set and date bounds one iteration trains on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingWindow {
    pub iteration: usize,
    pub symbols: Vec<String>,
    pub start: Option<NaiveDate>,
    pub cutoff: NaiveDate,
}

impl TrainingWindow {
    /// Window of the first iteration.
    pub fn first(symbols: Vec<String>, policy: &dyn WindowPolicy) -> Self {
        let (start, cutoff) = policy.bounds(1);
        Self {
            iteration: 1,
            symbols,
            start,
            cutoff,
        }
    }

    /// Window of the next iteration, same symbols with a later cutoff.
    pub fn advance(&self, policy: &dyn WindowPolicy) -> Self {
        let iteration = self.iteration + 1;
        let (start, cutoff) = policy.bounds(iteration);
        debug_assert!(cutoff > self.cutoff, "cutoff must move forward");
        Self {
            iteration,
            symbols: self.symbols.clone(),
            start,
            cutoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_expanding_window_advances_cutoff() {
        let policy = WindowKind::Expanding.build(d(2024, 3, 1), 5);
        let first = TrainingWindow::first(vec!["A".into()], policy.as_ref());
        assert_eq!(first.iteration, 1);
        assert_eq!(first.cutoff, d(2024, 3, 1));
        assert_eq!(first.start, None);

        let second = first.advance(policy.as_ref());
        assert_eq!(second.iteration, 2);
        assert_eq!(second.cutoff, d(2024, 3, 8));
        assert_eq!(second.symbols, first.symbols);

        let mut window = second;
        for _ in 0..10 {
            let next = window.advance(policy.as_ref());
            assert!(next.cutoff > window.cutoff);
            window = next;
        }
    }

    #[test]
    fn test_sliding_window_keeps_fixed_length() {
        let policy = WindowKind::Sliding { train_days: 10 }.build(d(2024, 3, 15), 5);
        let (start, cutoff) = policy.bounds(1);
        assert_eq!(cutoff, d(2024, 3, 15));
        assert_eq!(start, Some(d(2024, 3, 1)));

        let (start, cutoff) = policy.bounds(2);
        assert_eq!(cutoff, d(2024, 3, 22));
        assert_eq!(start, Some(d(2024, 3, 8)));
    }

    #[test]
    fn test_window_kind_serde() {
        let kind: WindowKind = serde_json::from_str(r#"{"kind":"sliding","train_days":60}"#).unwrap();
        assert_eq!(kind, WindowKind::Sliding { train_days: 60 });
        let kind: WindowKind = serde_json::from_str(r#"{"kind":"expanding"}"#).unwrap();
        assert_eq!(kind, WindowKind::Expanding);
    }
}
