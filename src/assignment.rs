use chrono::{Datelike, Duration, NaiveDate};
use uuid::Uuid;

use crate::models::{Assignment, AssignmentKind, IncomingAssignment};
use crate::range::parse_range;
use crate::schedule::{plan_daily, StudyWindow};

/// Homework directive resolved against the word-book table.
#[derive(Debug, Clone)]
pub struct VocabDirective {
    pub book_id: Uuid,
    pub book_title: String,
    pub range: String,
}

/// Homework directive resolved against the textbook table.
#[derive(Debug, Clone)]
pub struct ManualDirective {
    pub book_id: Uuid,
    pub book_title: String,
    pub range: String,
}

/// A derived description of one assignment to create. Ephemeral: computed on
/// every class-log save and compared against persisted records by signature.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentSpec {
    pub kind: AssignmentKind,
    pub title: String,
    pub description: String,
    pub due_date: NaiveDate,
    pub start_date: Option<NaiveDate>,
    pub vocab_book_id: Option<Uuid>,
    pub vocab_range_start: i32,
    pub vocab_range_end: i32,
    pub textbook_id: Option<Uuid>,
    pub textbook_range: String,
    pub is_cumulative: bool,
}

/// The defining fields of an assignment, ignoring ids and timestamps. Two
/// equal signatures mean "the same assignment" across save cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub kind: AssignmentKind,
    pub title: String,
    pub vocab_book_id: Option<Uuid>,
    pub range_start: i32,
    pub range_end: i32,
    pub is_cumulative: bool,
    pub description: String,
}

impl Signature {
    pub fn of_spec(spec: &AssignmentSpec) -> Self {
        Signature {
            kind: spec.kind,
            title: spec.title.trim().to_string(),
            vocab_book_id: spec.vocab_book_id,
            range_start: spec.vocab_range_start,
            range_end: spec.vocab_range_end,
            is_cumulative: spec.is_cumulative,
            description: spec.description.trim().to_string(),
        }
    }

    pub fn of_record(rec: &Assignment) -> Self {
        Signature {
            kind: rec.kind,
            title: rec.title.trim().to_string(),
            vocab_book_id: rec.vocab_book_id,
            range_start: rec.vocab_range_start,
            range_end: rec.vocab_range_end,
            is_cumulative: rec.is_cumulative,
            description: rec.description.trim().to_string(),
        }
    }

    pub fn of_incoming(item: &IncomingAssignment) -> Self {
        Signature {
            kind: item.kind,
            title: item.title.trim().to_string(),
            vocab_book_id: item.vocab_book_id,
            range_start: item.vocab_range_start.unwrap_or(0),
            range_end: item.vocab_range_end.unwrap_or(0),
            is_cumulative: item.is_cumulative,
            description: item.description.trim().to_string(),
        }
    }
}

/// Explicit due date, or one week after the class by default.
pub fn due_date_for(event_date: NaiveDate, hw_due_date: Option<NaiveDate>) -> NaiveDate {
    hw_due_date.unwrap_or(event_date + Duration::days(7))
}

/// Vocabulary tasks unlock the evening before they are due. Applies to every
/// VOCAB_TEST regardless of how it was entered.
pub fn vocab_start_lock(due_date: NaiveDate) -> NaiveDate {
    due_date - Duration::days(1)
}

/// Derives the full set of assignment specs for a freshly saved class log.
pub fn synthesize(
    vocab: Option<&VocabDirective>,
    manual: Option<&ManualDirective>,
    event_date: NaiveDate,
    hw_due_date: Option<NaiveDate>,
) -> Vec<AssignmentSpec> {
    let due = due_date_for(event_date, hw_due_date);
    let mut specs = Vec::new();
    if let Some(d) = vocab {
        specs.extend(vocab_specs(d, event_date, due));
    }
    if let Some(d) = manual {
        specs.push(manual_spec(d, due));
    }
    specs
}

/// Vocabulary flow: split the parsed range across the study window, one task
/// per day. An unparseable range falls back to a single task quoting the
/// range string verbatim.
pub fn vocab_specs(d: &VocabDirective, event_date: NaiveDate, due: NaiveDate) -> Vec<AssignmentSpec> {
    let days = parse_range(&d.range);
    if days.is_empty() {
        return vec![fallback_vocab_spec(d, due)];
    }
    let window = StudyWindow::new(event_date + Duration::days(1), due);
    split_vocab_specs(d, &days, &window)
}

/// N-split: one VOCAB_TEST per non-empty chunk, due on consecutive days.
pub fn split_vocab_specs(
    d: &VocabDirective,
    days: &[u32],
    window: &StudyWindow,
) -> Vec<AssignmentSpec> {
    let mut specs = Vec::new();
    for (date, chunk) in plan_daily(days, window) {
        let (Some(&start), Some(&end)) = (chunk.first(), chunk.last()) else {
            continue;
        };
        specs.push(AssignmentSpec {
            kind: AssignmentKind::VocabTest,
            title: format!("[{}] Day {}~{} 암기", d.book_title, start, end),
            description: format!("{}월 {}일의 목표입니다. 미루지 마세요!", date.month(), date.day()),
            due_date: date,
            start_date: Some(vocab_start_lock(date)),
            vocab_book_id: Some(d.book_id),
            vocab_range_start: start as i32,
            vocab_range_end: end as i32,
            textbook_id: None,
            textbook_range: String::new(),
            is_cumulative: false,
        });
    }
    specs
}

fn fallback_vocab_spec(d: &VocabDirective, due: NaiveDate) -> AssignmentSpec {
    AssignmentSpec {
        kind: AssignmentKind::VocabTest,
        title: format!("[{}] {} 암기", d.book_title, d.range),
        description: "앱 내 단어 시험을 통과하세요.".to_string(),
        due_date: due,
        start_date: Some(vocab_start_lock(due)),
        vocab_book_id: Some(d.book_id),
        vocab_range_start: 0,
        vocab_range_end: 0,
        textbook_id: None,
        textbook_range: String::new(),
        is_cumulative: false,
    }
}

/// Textbook flow: a single photo-proof task covering the stated range.
pub fn manual_spec(d: &ManualDirective, due: NaiveDate) -> AssignmentSpec {
    let range = if d.range.trim().is_empty() { "진도 확인" } else { d.range.as_str() };
    AssignmentSpec {
        kind: AssignmentKind::Manual,
        title: format!("[{}] {} 풀기", d.book_title, range),
        description: "문제를 풀고 인증샷을 제출하세요.".to_string(),
        due_date: due,
        start_date: None,
        vocab_book_id: None,
        vocab_range_start: 0,
        vocab_range_end: 0,
        textbook_id: Some(d.book_id),
        textbook_range: range.to_string(),
        is_cumulative: false,
    }
}

/// Accepts `2024-01-08` or a full RFC 3339 timestamp.
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = raw.parse::<NaiveDate>() {
        return Some(date);
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Builds a spec from an assignment entered through the editing surface.
/// A missing or malformed due date drops the item, never the request.
pub fn spec_from_incoming(item: &IncomingAssignment) -> Option<AssignmentSpec> {
    let due = parse_due_date(item.due_date.as_deref()?)?;
    let start_date = match item.kind {
        AssignmentKind::VocabTest => Some(vocab_start_lock(due)),
        AssignmentKind::Manual => None,
    };
    Some(AssignmentSpec {
        kind: item.kind,
        title: item.title.clone(),
        description: item.description.clone(),
        due_date: due,
        start_date,
        vocab_book_id: item.vocab_book_id,
        vocab_range_start: item.vocab_range_start.unwrap_or(0),
        vocab_range_end: item.vocab_range_end.unwrap_or(0),
        textbook_id: item.textbook_id,
        textbook_range: item.textbook_range.clone(),
        is_cumulative: item.is_cumulative,
    })
}
