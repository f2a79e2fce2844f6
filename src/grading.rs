/// Passing a vocabulary test (and completing the linked assignment) requires
/// at least 90% correct.
pub const PASS_RATIO: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct AnswerSheetItem {
    pub english: String,
    pub user_input: String,
    /// Stored meaning, possibly several candidates separated by commas.
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradedAnswer {
    pub question: String,
    pub student_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GradeSummary {
    pub score: i32,
    pub wrong_count: i32,
    pub details: Vec<GradedAnswer>,
}

/// Server-side scoring. Meanings like "사과, 능금" count any one candidate as
/// correct; comparison ignores spaces and letter case.
pub fn grade(items: &[AnswerSheetItem]) -> GradeSummary {
    let mut summary = GradeSummary::default();
    for item in items {
        let given = normalize(&item.user_input);
        let is_correct = item
            .correct_answer
            .split(',')
            .any(|candidate| normalize(candidate) == given);
        if is_correct {
            summary.score += 1;
        } else {
            summary.wrong_count += 1;
        }
        summary.details.push(GradedAnswer {
            question: item.english.clone(),
            student_answer: item.user_input.clone(),
            correct_answer: item.correct_answer.clone(),
            is_correct,
        });
    }
    summary
}

pub fn passes(score: i32, total: usize) -> bool {
    total > 0 && score as f64 / total as f64 >= PASS_RATIO
}

fn normalize(answer: &str) -> String {
    answer.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(english: &str, user: &str, answer: &str) -> AnswerSheetItem {
        AnswerSheetItem {
            english: english.to_string(),
            user_input: user.to_string(),
            correct_answer: answer.to_string(),
        }
    }

    #[test]
    fn any_candidate_matches() {
        let summary = grade(&[item("apple", "능금", "사과, 능금")]);
        assert_eq!(summary.score, 1);
        assert!(summary.details[0].is_correct);
    }

    #[test]
    fn comparison_ignores_space_and_case() {
        let summary = grade(&[item("give up", "Give Up", "give up, 포기하다")]);
        assert_eq!(summary.score, 1);
    }

    #[test]
    fn wrong_answer_counted() {
        let summary = grade(&[item("apple", "바나나", "사과"), item("run", "달리다", "달리다")]);
        assert_eq!(summary.score, 1);
        assert_eq!(summary.wrong_count, 1);
        assert!(!summary.details[0].is_correct);
    }

    #[test]
    fn pass_threshold_is_ninety_percent() {
        assert!(passes(27, 30));
        assert!(!passes(26, 30));
        assert!(!passes(0, 0));
    }
}
