use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[sqlx(type_name = "assignment_kind")]
pub enum AssignmentKind {
    #[sqlx(rename = "VOCAB_TEST")]
    #[serde(rename = "VOCAB_TEST")]
    VocabTest,
    #[default]
    #[sqlx(rename = "MANUAL")]
    #[serde(rename = "MANUAL")]
    Manual,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "submission_state")]
pub enum SubmissionState {
    #[sqlx(rename = "UNSUBMITTED")]
    #[serde(rename = "UNSUBMITTED")]
    Unsubmitted,
    #[sqlx(rename = "SUBMITTED")]
    #[serde(rename = "SUBMITTED")]
    Submitted,
    #[sqlx(rename = "APPROVED")]
    #[serde(rename = "APPROVED")]
    Approved,
    #[sqlx(rename = "REJECTED")]
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl SubmissionState {
    /// A record counts as submitted once any submission exists, even a rejected one.
    pub fn is_submitted(self) -> bool {
        self != SubmissionState::Unsubmitted
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct WordBook {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Textbook {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Word {
    pub id: Uuid,
    pub book_id: Uuid,
    pub number: i32,
    pub english: String,
    pub korean: String,
    pub master_word_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct MasterWord {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// One tutoring session for one student, with optional homework directives.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct ClassLog {
    pub id: Uuid,
    pub student_id: Uuid,
    pub teacher_id: Uuid,
    pub date: NaiveDate,
    pub comment: String,
    pub hw_vocab_book_id: Option<Uuid>,
    pub hw_vocab_range: String,
    pub hw_main_book_id: Option<Uuid>,
    pub hw_main_range: String,
    pub hw_due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One concrete homework task, usually derived from a class log.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Assignment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub origin_log_id: Option<Uuid>,
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
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub submission_state: SubmissionState,
    pub resubmission_deadline: Option<NaiveDate>,
    pub is_replaced: bool,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    /// Records with a submission or a completion mark are protected from
    /// deletion by every reconciliation path.
    pub fn is_protected(&self) -> bool {
        self.is_completed || self.submission_state.is_submitted()
    }
}

/// Per-(student, word) 3-strike counter. Created on the first miss,
/// graduated at success_count == 3.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct WrongWord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub master_word_id: Uuid,
    pub success_count: i32,
    pub last_correct_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct TestResult {
    pub id: Uuid,
    pub student_id: Uuid,
    pub book_id: Option<Uuid>,
    pub assignment_id: Option<Uuid>,
    pub test_range: String,
    pub score: i32,
    pub wrong_count: i32,
    pub total_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct TestResultDetail {
    pub id: Uuid,
    pub result_id: Uuid,
    pub word_question: String,
    pub student_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
}

/// Weak-word pool row: a tracked word that has not graduated yet.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct WeakWord {
    pub master_word_id: Uuid,
    pub text: String,
    pub success_count: i32,
    pub last_correct_at: Option<DateTime<Utc>>,
}

// --- request/response bodies ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateBookReq {
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateWordReq {
    pub number: i32,
    pub english: String,
    pub korean: String,
}

/// Class log fields as submitted by staff; used for both create and edit.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClassLogInput {
    pub student_id: Uuid,
    pub teacher_id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub comment: String,
    pub hw_vocab_book_id: Option<Uuid>,
    #[serde(default)]
    pub hw_vocab_range: String,
    pub hw_main_book_id: Option<Uuid>,
    #[serde(default)]
    pub hw_main_range: String,
    pub hw_due_date: Option<NaiveDate>,
}

/// One assignment as submitted through the editing surface. The due date
/// stays a raw string so a malformed value skips the item instead of
/// failing the whole request.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct IncomingAssignment {
    pub id: Option<Uuid>,
    #[serde(default)]
    pub kind: AssignmentKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_date: Option<String>,
    pub vocab_book_id: Option<Uuid>,
    pub vocab_range_start: Option<i32>,
    pub vocab_range_end: Option<i32>,
    pub textbook_id: Option<Uuid>,
    #[serde(default)]
    pub textbook_range: String,
    #[serde(default)]
    pub is_cumulative: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReplaceAssignmentsReq {
    pub assignments: Vec<IncomingAssignment>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnswerInput {
    pub english: String,
    #[serde(default)]
    pub user_input: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitTestReq {
    pub student_id: Uuid,
    pub book_id: Option<Uuid>,
    pub assignment_id: Option<Uuid>,
    #[serde(default)]
    pub test_range: String,
    pub details: Vec<AnswerInput>,
}

#[derive(Serialize, Debug, Clone)]
pub struct SubmitTestResp {
    pub test_id: Uuid,
    pub score: i32,
    pub wrong_count: i32,
    pub total_count: i32,
    pub assignment_completed: bool,
    pub results: Vec<TestResultDetail>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CorrectionInput {
    pub word: String,
    pub accepted: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReviewTestReq {
    pub corrections: Vec<CorrectionInput>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ReviewTestResp {
    pub score: i32,
    pub wrong_count: i32,
    pub changed: i32,
    pub assignment_completed: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct ClassLogResp {
    pub log: ClassLog,
    pub assignments: Vec<Assignment>,
}
