use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::assignment::{
    due_date_for, manual_spec, spec_from_incoming, split_vocab_specs, vocab_specs, AssignmentSpec,
    ManualDirective, Signature, VocabDirective,
};
use crate::models::{Assignment, AssignmentKind, ClassLog, IncomingAssignment};
use crate::range::parse_range;
use crate::schedule::StudyWindow;

/// Class-log fields captured before an edit persisted. Without a snapshot the
/// planner assumes everything changed.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSnapshot {
    pub date: NaiveDate,
    pub hw_due_date: Option<NaiveDate>,
    pub hw_vocab_range: String,
    pub hw_vocab_book_id: Option<Uuid>,
    pub hw_main_book_id: Option<Uuid>,
}

impl LogSnapshot {
    pub fn of(log: &ClassLog) -> Self {
        LogSnapshot {
            date: log.date,
            hw_due_date: log.hw_due_date,
            hw_vocab_range: log.hw_vocab_range.clone(),
            hw_vocab_book_id: log.hw_vocab_book_id,
            hw_main_book_id: log.hw_main_book_id,
        }
    }
}

/// Minimal, safe mutations to apply after a class-log edit. Protected records
/// (completed or with a submission) never appear in `delete_ids`.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub delete_ids: Vec<Uuid>,
    pub retime: Vec<(Uuid, NaiveDate)>,
    pub create: Vec<AssignmentSpec>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.delete_ids.is_empty() && self.retime.is_empty() && self.create.is_empty()
    }
}

/// Diffs the desired assignment set against existing records for one log.
/// `today` is passed in explicitly; re-splits never schedule into the past.
pub fn plan_update(
    log: &ClassLog,
    vocab: Option<&VocabDirective>,
    manual: Option<&ManualDirective>,
    snapshot: Option<&LogSnapshot>,
    existing: &[Assignment],
    today: NaiveDate,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    if let Some(d) = vocab {
        plan_vocab(log, d, snapshot, existing, today, &mut plan);
    }
    if let Some(d) = manual {
        plan_manual(log, d, snapshot, existing, &mut plan);
    }
    plan
}

fn vocab_changed(log: &ClassLog, snapshot: Option<&LogSnapshot>) -> bool {
    snapshot.map_or(true, |prev| {
        prev.date != log.date
            || prev.hw_due_date != log.hw_due_date
            || prev.hw_vocab_range != log.hw_vocab_range
            || prev.hw_vocab_book_id != log.hw_vocab_book_id
    })
}

fn manual_changed(log: &ClassLog, snapshot: Option<&LogSnapshot>) -> bool {
    snapshot.map_or(true, |prev| {
        prev.date != log.date
            || prev.hw_due_date != log.hw_due_date
            || prev.hw_main_book_id != log.hw_main_book_id
    })
}

fn plan_vocab(
    log: &ClassLog,
    d: &VocabDirective,
    snapshot: Option<&LogSnapshot>,
    existing: &[Assignment],
    today: NaiveDate,
    plan: &mut ReconcilePlan,
) {
    let due = due_date_for(log.date, log.hw_due_date);
    let vocab_tasks: Vec<&Assignment> =
        existing.iter().filter(|a| a.kind == AssignmentKind::VocabTest).collect();

    // A log that never produced vocab tasks is handled like a fresh save.
    if vocab_tasks.is_empty() {
        plan.create.extend(vocab_specs(d, log.date, due));
        return;
    }
    if !vocab_changed(log, snapshot) {
        return;
    }

    let days = parse_range(&d.range);
    if days.is_empty() {
        retime_incomplete(&vocab_tasks, due, plan);
        return;
    }

    let completed_days: BTreeSet<u32> = vocab_tasks
        .iter()
        .filter(|t| t.is_completed && t.vocab_range_start > 0 && t.vocab_range_end > 0)
        .flat_map(|t| (t.vocab_range_start as u32)..=(t.vocab_range_end as u32))
        .collect();
    let remaining: Vec<u32> =
        days.into_iter().filter(|day| !completed_days.contains(day)).collect();

    if remaining.is_empty() {
        retime_incomplete(&vocab_tasks, due, plan);
        return;
    }

    plan.delete_ids.extend(vocab_tasks.iter().filter(|t| !t.is_protected()).map(|t| t.id));
    // Re-splits start no earlier than today: the student already spent the
    // days before the edit.
    let start = (log.date + Duration::days(1)).max(today);
    let window = StudyWindow::new(start, due);
    plan.create.extend(split_vocab_specs(d, &remaining, &window));
}

fn plan_manual(
    log: &ClassLog,
    d: &ManualDirective,
    snapshot: Option<&LogSnapshot>,
    existing: &[Assignment],
    plan: &mut ReconcilePlan,
) {
    let due = due_date_for(log.date, log.hw_due_date);
    let manual_tasks: Vec<&Assignment> =
        existing.iter().filter(|a| a.kind == AssignmentKind::Manual).collect();

    if manual_tasks.is_empty() {
        plan.create.push(manual_spec(d, due));
        return;
    }
    if !manual_changed(log, snapshot) {
        return;
    }
    for task in manual_tasks {
        if task.is_protected() {
            continue;
        }
        if task.due_date != due {
            plan.retime.push((task.id, due));
        }
    }
}

fn retime_incomplete(tasks: &[&Assignment], due: NaiveDate, plan: &mut ReconcilePlan) {
    for task in tasks {
        if !task.is_completed && task.due_date != due {
            plan.retime.push((task.id, due));
        }
    }
}

/// Mutations for the signature-based editing surface.
#[derive(Debug, Clone, Default)]
pub struct ReplacementPlan {
    /// Protected records whose `is_replaced` flag must flip.
    pub mark_replaced: Vec<(Uuid, bool)>,
    pub delete_ids: Vec<Uuid>,
    pub create: Vec<AssignmentSpec>,
}

/// Safety net used when staff edits a log's assignment list directly.
/// Protected records are never deleted; when their signature no longer
/// appears in the incoming list they are flagged `is_replaced` for teacher
/// attention. Everything unprotected is rebuilt from the incoming items, and
/// re-sending a kept record unchanged is a no-op.
pub fn plan_replacement(
    existing: &[Assignment],
    incoming: &[IncomingAssignment],
) -> ReplacementPlan {
    let incoming_sigs: HashSet<Signature> = incoming.iter().map(Signature::of_incoming).collect();
    let mut plan = ReplacementPlan::default();
    let mut kept_sigs: HashMap<Uuid, Signature> = HashMap::new();

    for task in existing {
        if task.is_protected() {
            let sig = Signature::of_record(task);
            let should_replace = !incoming_sigs.contains(&sig);
            if task.is_replaced != should_replace {
                plan.mark_replaced.push((task.id, should_replace));
            }
            kept_sigs.insert(task.id, sig);
        } else {
            plan.delete_ids.push(task.id);
        }
    }

    for item in incoming {
        if let Some(id) = item.id {
            if kept_sigs.get(&id).is_some_and(|sig| *sig == Signature::of_incoming(item)) {
                continue;
            }
        }
        // A malformed due date skips this item only.
        if let Some(spec) = spec_from_incoming(item) {
            plan.create.push(spec);
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubmissionState;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_log(book_id: Uuid, range: &str) -> ClassLog {
        ClassLog {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            teacher_id: Uuid::new_v4(),
            date: date(2024, 1, 1),
            comment: String::new(),
            hw_vocab_book_id: Some(book_id),
            hw_vocab_range: range.to_string(),
            hw_main_book_id: None,
            hw_main_range: String::new(),
            hw_due_date: Some(date(2024, 1, 8)),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn directive(log: &ClassLog, book_id: Uuid) -> VocabDirective {
        VocabDirective {
            book_id,
            book_title: "워드마스터".to_string(),
            range: log.hw_vocab_range.clone(),
        }
    }

    fn record(log: &ClassLog, kind: AssignmentKind, start: i32, end: i32) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            student_id: log.student_id,
            teacher_id: Some(log.teacher_id),
            origin_log_id: Some(log.id),
            kind,
            title: format!("Day {start}~{end}"),
            description: String::new(),
            due_date: date(2024, 1, 5),
            start_date: None,
            vocab_book_id: log.hw_vocab_book_id,
            vocab_range_start: start,
            vocab_range_end: end,
            textbook_id: None,
            textbook_range: String::new(),
            is_cumulative: false,
            is_completed: false,
            completed_at: None,
            submission_state: SubmissionState::Unsubmitted,
            resubmission_deadline: None,
            is_replaced: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn unchanged_log_yields_empty_plan() {
        let book = Uuid::new_v4();
        let log = sample_log(book, "1-6");
        let d = directive(&log, book);
        let existing = vec![record(&log, AssignmentKind::VocabTest, 1, 3)];
        let snapshot = LogSnapshot::of(&log);
        let plan =
            plan_update(&log, Some(&d), None, Some(&snapshot), &existing, date(2024, 1, 2));
        assert!(plan.is_empty());
    }

    #[test]
    fn missing_snapshot_assumes_changed() {
        let book = Uuid::new_v4();
        let log = sample_log(book, "1-6");
        let d = directive(&log, book);
        let existing = vec![record(&log, AssignmentKind::VocabTest, 1, 3)];
        let plan = plan_update(&log, Some(&d), None, None, &existing, date(2024, 1, 2));
        assert!(!plan.is_empty());
    }

    #[test]
    fn no_existing_tasks_synthesizes_fresh() {
        let book = Uuid::new_v4();
        let log = sample_log(book, "1-6");
        let d = directive(&log, book);
        let plan = plan_update(&log, Some(&d), None, None, &[], date(2024, 1, 2));
        assert_eq!(plan.create.len(), 6);
        assert!(plan.delete_ids.is_empty());
    }

    #[test]
    fn empty_range_republishes_due_dates() {
        let book = Uuid::new_v4();
        let mut log = sample_log(book, "없음");
        log.hw_due_date = Some(date(2024, 1, 10));
        let d = directive(&log, book);
        let open = record(&log, AssignmentKind::VocabTest, 1, 3);
        let mut done = record(&log, AssignmentKind::VocabTest, 4, 6);
        done.is_completed = true;
        let plan = plan_update(
            &log,
            Some(&d),
            None,
            None,
            &[open.clone(), done.clone()],
            date(2024, 1, 2),
        );
        assert_eq!(plan.retime, vec![(open.id, date(2024, 1, 10))]);
        assert!(plan.delete_ids.is_empty());
        assert!(plan.create.is_empty());
    }

    #[test]
    fn resplit_excludes_completed_days() {
        let book = Uuid::new_v4();
        let log = sample_log(book, "1-10");
        let d = directive(&log, book);
        let mut done = record(&log, AssignmentKind::VocabTest, 1, 3);
        done.is_completed = true;
        let open = record(&log, AssignmentKind::VocabTest, 4, 10);
        let plan = plan_update(
            &log,
            Some(&d),
            None,
            None,
            &[done.clone(), open.clone()],
            date(2024, 1, 4),
        );
        assert_eq!(plan.delete_ids, vec![open.id]);
        let covered: Vec<u32> = plan
            .create
            .iter()
            .flat_map(|s| (s.vocab_range_start as u32)..=(s.vocab_range_end as u32))
            .collect();
        assert_eq!(covered, (4..=10).collect::<Vec<u32>>());
        // Re-split starts today, not on the stale day-after-class date.
        assert_eq!(plan.create[0].due_date, date(2024, 1, 4));
    }

    #[test]
    fn fully_completed_range_only_republishes() {
        let book = Uuid::new_v4();
        let log = sample_log(book, "1-6");
        let d = directive(&log, book);
        let mut done = record(&log, AssignmentKind::VocabTest, 1, 6);
        done.is_completed = true;
        let plan = plan_update(&log, Some(&d), None, None, &[done], date(2024, 1, 2));
        assert!(plan.delete_ids.is_empty());
        assert!(plan.create.is_empty());
        assert!(plan.retime.is_empty());
    }

    #[test]
    fn submitted_records_survive_any_edit() {
        let book = Uuid::new_v4();
        let log = sample_log(book, "1-10");
        let d = directive(&log, book);
        let mut submitted = record(&log, AssignmentKind::VocabTest, 1, 2);
        submitted.submission_state = SubmissionState::Submitted;
        let mut approved = record(&log, AssignmentKind::VocabTest, 3, 4);
        approved.submission_state = SubmissionState::Approved;
        approved.is_completed = true;
        let open = record(&log, AssignmentKind::VocabTest, 5, 10);
        let plan = plan_update(
            &log,
            Some(&d),
            None,
            None,
            &[submitted.clone(), approved.clone(), open.clone()],
            date(2024, 1, 2),
        );
        assert_eq!(plan.delete_ids, vec![open.id]);
        assert!(!plan.delete_ids.contains(&submitted.id));
        assert!(!plan.delete_ids.contains(&approved.id));
    }

    #[test]
    fn manual_flow_retimes_unsubmitted_only() {
        let book = Uuid::new_v4();
        let textbook = Uuid::new_v4();
        let mut log = sample_log(book, "");
        log.hw_vocab_book_id = None;
        log.hw_main_book_id = Some(textbook);
        log.hw_due_date = Some(date(2024, 1, 12));
        let d = ManualDirective {
            book_id: textbook,
            book_title: "천일문".to_string(),
            range: "p.10-20".to_string(),
        };
        let open = record(&log, AssignmentKind::Manual, 0, 0);
        let mut submitted = record(&log, AssignmentKind::Manual, 0, 0);
        submitted.submission_state = SubmissionState::Submitted;
        let plan = plan_update(
            &log,
            None,
            Some(&d),
            None,
            &[open.clone(), submitted.clone()],
            date(2024, 1, 2),
        );
        assert_eq!(plan.retime, vec![(open.id, date(2024, 1, 12))]);
        assert!(plan.create.is_empty());
    }

    #[test]
    fn manual_flow_creates_when_book_newly_set() {
        let book = Uuid::new_v4();
        let textbook = Uuid::new_v4();
        let mut log = sample_log(book, "");
        log.hw_vocab_book_id = None;
        log.hw_main_book_id = Some(textbook);
        let d = ManualDirective {
            book_id: textbook,
            book_title: "천일문".to_string(),
            range: String::new(),
        };
        let plan = plan_update(&log, None, Some(&d), None, &[], date(2024, 1, 2));
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.create[0].kind, AssignmentKind::Manual);
    }

    #[test]
    fn replacement_marks_protected_and_deletes_rest() {
        let book = Uuid::new_v4();
        let log = sample_log(book, "1-6");
        let mut kept = record(&log, AssignmentKind::VocabTest, 1, 3);
        kept.is_completed = true;
        let stale = record(&log, AssignmentKind::VocabTest, 4, 6);
        let incoming = vec![IncomingAssignment {
            kind: AssignmentKind::VocabTest,
            title: "새 과제".to_string(),
            due_date: Some("2024-01-20".to_string()),
            vocab_book_id: Some(book),
            vocab_range_start: Some(7),
            vocab_range_end: Some(9),
            ..Default::default()
        }];
        let plan = plan_replacement(&[kept.clone(), stale.clone()], &incoming);
        assert_eq!(plan.mark_replaced, vec![(kept.id, true)]);
        assert_eq!(plan.delete_ids, vec![stale.id]);
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.create[0].due_date, date(2024, 1, 20));
    }

    #[test]
    fn replacement_is_idempotent_for_kept_records() {
        let book = Uuid::new_v4();
        let log = sample_log(book, "1-6");
        let mut kept = record(&log, AssignmentKind::VocabTest, 1, 3);
        kept.is_completed = true;
        let incoming = vec![IncomingAssignment {
            id: Some(kept.id),
            kind: kept.kind,
            title: kept.title.clone(),
            description: kept.description.clone(),
            due_date: Some("2024-01-05".to_string()),
            vocab_book_id: kept.vocab_book_id,
            vocab_range_start: Some(kept.vocab_range_start),
            vocab_range_end: Some(kept.vocab_range_end),
            ..Default::default()
        }];
        let plan = plan_replacement(&[kept.clone()], &incoming);
        assert!(plan.mark_replaced.is_empty());
        assert!(plan.delete_ids.is_empty());
        assert!(plan.create.is_empty());
    }

    #[test]
    fn replacement_skips_items_with_bad_due_dates() {
        let incoming = vec![IncomingAssignment {
            kind: AssignmentKind::Manual,
            title: "broken".to_string(),
            due_date: Some("soon-ish".to_string()),
            ..Default::default()
        }];
        let plan = plan_replacement(&[], &incoming);
        assert!(plan.create.is_empty());
    }

    #[test]
    fn replacement_clears_stale_replaced_flag() {
        let book = Uuid::new_v4();
        let log = sample_log(book, "1-6");
        let mut kept = record(&log, AssignmentKind::VocabTest, 1, 3);
        kept.is_completed = true;
        kept.is_replaced = true;
        let incoming = vec![IncomingAssignment {
            kind: kept.kind,
            title: kept.title.clone(),
            description: kept.description.clone(),
            due_date: Some("2024-01-05".to_string()),
            vocab_book_id: kept.vocab_book_id,
            vocab_range_start: Some(kept.vocab_range_start),
            vocab_range_end: Some(kept.vocab_range_end),
            ..Default::default()
        }];
        let plan = plan_replacement(&[kept.clone()], &incoming);
        // Signature matches again, so the flag flips back off.
        assert_eq!(plan.mark_replaced, vec![(kept.id, false)]);
    }
}
