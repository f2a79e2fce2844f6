use chrono::{DateTime, Utc};

/// A word graduates out of the weak-word pool after this many consecutive
/// correct answers.
pub const GRADUATION_COUNT: i32 = 3;

/// 3-strike counter for one (student, word) pair. A wrong answer always
/// resets to zero; correct answers saturate at [`GRADUATION_COUNT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MasteryState {
    pub success_count: i32,
    pub last_correct_at: Option<DateTime<Utc>>,
}

impl MasteryState {
    pub fn record_wrong(&mut self) {
        self.success_count = 0;
        self.last_correct_at = None;
    }

    pub fn record_correct(&mut self, now: DateTime<Utc>) {
        self.success_count = (self.success_count + 1).min(GRADUATION_COUNT);
        self.last_correct_at = Some(now);
    }

    /// Teacher accepted a grading correction: the miss was our fault, so the
    /// word graduates immediately.
    pub fn graduate(&mut self, now: DateTime<Utc>) {
        self.success_count = GRADUATION_COUNT;
        self.last_correct_at = Some(now);
    }

    pub fn is_graduated(&self) -> bool {
        self.success_count >= GRADUATION_COUNT
    }
}

/// Applies one graded answer. `None` is the implicit "never missed" state:
/// a correct answer leaves it untracked, the first wrong answer starts a
/// counter at zero.
pub fn apply_answer(
    state: Option<MasteryState>,
    is_correct: bool,
    now: DateTime<Utc>,
) -> Option<MasteryState> {
    match (state, is_correct) {
        (None, true) => None,
        (None, false) => Some(MasteryState::default()),
        (Some(mut s), true) => {
            s.record_correct(now);
            Some(s)
        }
        (Some(mut s), false) => {
            s.record_wrong();
            Some(s)
        }
    }
}

/// Canonical word identity: the same word missed in different books must
/// accumulate into one counter, so keys are trimmed lowercase English text.
pub fn canonical_text(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_answers_never_create_a_counter() {
        let now = Utc::now();
        assert_eq!(apply_answer(None, true, now), None);
    }

    #[test]
    fn first_miss_starts_tracking_at_zero() {
        let state = apply_answer(None, false, Utc::now()).unwrap();
        assert_eq!(state.success_count, 0);
        assert_eq!(state.last_correct_at, None);
    }

    #[test]
    fn saturates_at_three_and_resets_on_miss() {
        // correct x4, wrong, correct -> 1, 2, 3, 3, 0, 1
        let now = Utc::now();
        let mut state = Some(MasteryState::default());
        let mut observed = Vec::new();
        for is_correct in [true, true, true, true, false, true] {
            state = apply_answer(state, is_correct, now);
            observed.push(state.unwrap().success_count);
        }
        assert_eq!(observed, vec![1, 2, 3, 3, 0, 1]);
    }

    #[test]
    fn wrong_clears_last_correct() {
        let now = Utc::now();
        let mut state = MasteryState::default();
        state.record_correct(now);
        assert!(state.last_correct_at.is_some());
        state.record_wrong();
        assert_eq!(state.last_correct_at, None);
    }

    #[test]
    fn graduation_threshold() {
        let now = Utc::now();
        let mut state = MasteryState::default();
        for _ in 0..2 {
            state.record_correct(now);
        }
        assert!(!state.is_graduated());
        state.record_correct(now);
        assert!(state.is_graduated());
        state.graduate(now);
        assert_eq!(state.success_count, GRADUATION_COUNT);
    }

    #[test]
    fn canonical_identity_folds_case_and_space() {
        assert_eq!(canonical_text("  Apple "), "apple");
    }
}
