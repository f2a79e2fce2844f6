use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::assignment::{synthesize, AssignmentSpec, ManualDirective, VocabDirective};
use crate::db::Db;
use crate::grading::{self, AnswerSheetItem};
use crate::mastery::{self, canonical_text, MasteryState, GRADUATION_COUNT};
use crate::models::*;
use crate::reconcile::{plan_replacement, plan_update, LogSnapshot, ReconcilePlan};

pub type Tx<'a> = Transaction<'a, Postgres>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub async fn create_word_book(tx: &mut Tx<'_>, title: &str) -> Result<WordBook, ServiceError> {
    let book = sqlx::query_as::<_, WordBook>(
        "INSERT INTO word_books (id, title) VALUES ($1, $2) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(title)
    .fetch_one(&mut **tx)
    .await?;
    Ok(book)
}

pub async fn create_textbook(tx: &mut Tx<'_>, title: &str) -> Result<Textbook, ServiceError> {
    let book = sqlx::query_as::<_, Textbook>(
        "INSERT INTO textbooks (id, title) VALUES ($1, $2) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(title)
    .fetch_one(&mut **tx)
    .await?;
    Ok(book)
}

pub async fn add_word(
    tx: &mut Tx<'_>,
    book_id: Uuid,
    req: &CreateWordReq,
) -> Result<Word, ServiceError> {
    let exists: Option<String> = sqlx::query_scalar("SELECT title FROM word_books WHERE id = $1")
        .bind(book_id)
        .fetch_optional(&mut **tx)
        .await?;
    if exists.is_none() {
        return Err(ServiceError::NotFound("word book"));
    }
    let master_id = ensure_master_word(tx, &canonical_text(&req.english)).await?;
    let word = sqlx::query_as::<_, Word>(
        r#"INSERT INTO words (id, book_id, number, english, korean, master_word_id)
           VALUES ($1, $2, $3, $4, $5, $6)
           RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(book_id)
    .bind(req.number)
    .bind(req.english.trim())
    .bind(req.korean.trim())
    .bind(master_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(word)
}

/// Persists a class log and immediately derives its homework. Runs inside the
/// caller's transaction: the log and its assignments commit together.
pub async fn create_class_log(
    tx: &mut Tx<'_>,
    input: &ClassLogInput,
) -> Result<(ClassLog, Vec<Assignment>), ServiceError> {
    let log = sqlx::query_as::<_, ClassLog>(
        r#"INSERT INTO class_logs
             (id, student_id, teacher_id, date, comment, hw_vocab_book_id, hw_vocab_range,
              hw_main_book_id, hw_main_range, hw_due_date)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
           RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(input.student_id)
    .bind(input.teacher_id)
    .bind(input.date)
    .bind(&input.comment)
    .bind(input.hw_vocab_book_id)
    .bind(&input.hw_vocab_range)
    .bind(input.hw_main_book_id)
    .bind(&input.hw_main_range)
    .bind(input.hw_due_date)
    .fetch_one(&mut **tx)
    .await?;

    let vocab = vocab_directive(tx, &log).await?;
    let manual = manual_directive(tx, &log).await?;
    let specs = synthesize(vocab.as_ref(), manual.as_ref(), log.date, log.hw_due_date);
    let created = create_from_specs(tx, &log, &specs).await?;
    tracing::info!(log_id = %log.id, count = created.len(), "assignments derived from class log");
    Ok((log, created))
}

/// Re-saves a class log and reconciles previously generated assignments
/// against the edited directives. `today` comes from the caller so re-splits
/// are deterministic under test.
pub async fn update_class_log(
    tx: &mut Tx<'_>,
    id: Uuid,
    input: &ClassLogInput,
    today: NaiveDate,
) -> Result<(ClassLog, Vec<Assignment>), ServiceError> {
    let prev = sqlx::query_as::<_, ClassLog>("SELECT * FROM class_logs WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::NotFound("class log"))?;
    let snapshot = LogSnapshot::of(&prev);

    let log = sqlx::query_as::<_, ClassLog>(
        r#"UPDATE class_logs
           SET student_id = $2, teacher_id = $3, date = $4, comment = $5,
               hw_vocab_book_id = $6, hw_vocab_range = $7, hw_main_book_id = $8,
               hw_main_range = $9, hw_due_date = $10, updated_at = now()
           WHERE id = $1
           RETURNING *"#,
    )
    .bind(id)
    .bind(input.student_id)
    .bind(input.teacher_id)
    .bind(input.date)
    .bind(&input.comment)
    .bind(input.hw_vocab_book_id)
    .bind(&input.hw_vocab_range)
    .bind(input.hw_main_book_id)
    .bind(&input.hw_main_range)
    .bind(input.hw_due_date)
    .fetch_one(&mut **tx)
    .await?;

    let existing = assignments_for_log_tx(tx, id).await?;
    let vocab = vocab_directive(tx, &log).await?;
    let manual = manual_directive(tx, &log).await?;
    let plan = plan_update(&log, vocab.as_ref(), manual.as_ref(), Some(&snapshot), &existing, today);
    if !plan.is_empty() {
        tracing::info!(
            log_id = %log.id,
            deleted = plan.delete_ids.len(),
            retimed = plan.retime.len(),
            created = plan.create.len(),
            "reconciling assignments"
        );
    }
    apply_plan(tx, &log, &plan).await?;

    let assignments = assignments_for_log_tx(tx, id).await?;
    Ok((log, assignments))
}

/// Signature-based editing surface: replaces a log's assignment list while
/// protecting completed/submitted records.
pub async fn replace_assignments(
    tx: &mut Tx<'_>,
    log_id: Uuid,
    incoming: &[IncomingAssignment],
) -> Result<Vec<Assignment>, ServiceError> {
    let log = sqlx::query_as::<_, ClassLog>("SELECT * FROM class_logs WHERE id = $1")
        .bind(log_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::NotFound("class log"))?;

    let existing = assignments_for_log_tx(tx, log_id).await?;
    let plan = plan_replacement(&existing, incoming);

    for (id, flag) in &plan.mark_replaced {
        sqlx::query("UPDATE assignments SET is_replaced = $2 WHERE id = $1")
            .bind(id)
            .bind(flag)
            .execute(&mut **tx)
            .await?;
    }
    for id in &plan.delete_ids {
        sqlx::query("DELETE FROM assignments WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    create_from_specs(tx, &log, &plan.create).await?;

    Ok(assignments_for_log_tx(tx, log_id).await?)
}

/// Grades a submitted vocabulary test, updates per-word mastery counters and
/// completes the linked assignment on a passing score. One transaction: the
/// result, its details and every counter update persist together.
pub async fn submit_test(
    tx: &mut Tx<'_>,
    req: &SubmitTestReq,
    now: DateTime<Utc>,
) -> Result<SubmitTestResp, ServiceError> {
    let mut sheet = Vec::new();
    for answer in &req.details {
        let key = canonical_text(&answer.english);
        if key.is_empty() {
            continue;
        }
        let correct: Option<String> = match req.book_id {
            Some(book_id) => {
                sqlx::query_scalar(
                    "SELECT korean FROM words WHERE book_id = $1 AND lower(trim(english)) = $2 LIMIT 1",
                )
                .bind(book_id)
                .bind(&key)
                .fetch_optional(&mut **tx)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "SELECT korean FROM words WHERE lower(trim(english)) = $1 ORDER BY created_at LIMIT 1",
                )
                .bind(&key)
                .fetch_optional(&mut **tx)
                .await?
            }
        };
        // No stored meaning means the question can't be graded; skip it.
        let Some(correct_answer) = correct else {
            tracing::warn!(word = %answer.english, "no answer on record, skipping");
            continue;
        };
        sheet.push(AnswerSheetItem {
            english: answer.english.clone(),
            user_input: answer.user_input.clone(),
            correct_answer,
        });
    }

    let summary = grading::grade(&sheet);
    let result = sqlx::query_as::<_, TestResult>(
        r#"INSERT INTO test_results
             (id, student_id, book_id, assignment_id, test_range, score, wrong_count, total_count)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
           RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(req.student_id)
    .bind(req.book_id)
    .bind(req.assignment_id)
    .bind(&req.test_range)
    .bind(summary.score)
    .bind(summary.wrong_count)
    .bind(summary.details.len() as i32)
    .fetch_one(&mut **tx)
    .await?;

    let mut results = Vec::with_capacity(summary.details.len());
    for detail in &summary.details {
        let row = sqlx::query_as::<_, TestResultDetail>(
            r#"INSERT INTO test_result_details
                 (id, result_id, word_question, student_answer, correct_answer, is_correct)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(result.id)
        .bind(&detail.question)
        .bind(&detail.student_answer)
        .bind(&detail.correct_answer)
        .bind(detail.is_correct)
        .fetch_one(&mut **tx)
        .await?;
        results.push(row);

        apply_mastery(tx, req.student_id, &detail.question, detail.is_correct, now).await?;
    }

    let mut assignment_completed = false;
    if let Some(assignment_id) = req.assignment_id {
        if grading::passes(summary.score, summary.details.len()) {
            let updated = sqlx::query(
                r#"UPDATE assignments SET is_completed = TRUE, completed_at = $2
                   WHERE id = $1 AND student_id = $3 AND is_completed = FALSE"#,
            )
            .bind(assignment_id)
            .bind(now)
            .bind(req.student_id)
            .execute(&mut **tx)
            .await?;
            assignment_completed = updated.rows_affected() > 0;
        }
    }

    Ok(SubmitTestResp {
        test_id: result.id,
        score: summary.score,
        wrong_count: summary.wrong_count,
        total_count: summary.details.len() as i32,
        assignment_completed,
        results,
    })
}

/// Applies teacher corrections to a graded test. Accepting a correction means
/// the miss was a grading error, so the word graduates immediately.
pub async fn review_test(
    tx: &mut Tx<'_>,
    result_id: Uuid,
    req: &ReviewTestReq,
    now: DateTime<Utc>,
) -> Result<ReviewTestResp, ServiceError> {
    let result = sqlx::query_as::<_, TestResult>("SELECT * FROM test_results WHERE id = $1")
        .bind(result_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::NotFound("test result"))?;

    let mut changed = 0i32;
    for correction in &req.corrections {
        let detail = sqlx::query_as::<_, TestResultDetail>(
            "SELECT * FROM test_result_details WHERE result_id = $1 AND word_question = $2",
        )
        .bind(result_id)
        .bind(&correction.word)
        .fetch_optional(&mut **tx)
        .await?;
        let Some(detail) = detail else {
            continue;
        };

        if correction.accepted {
            if !detail.is_correct {
                sqlx::query("UPDATE test_result_details SET is_correct = TRUE WHERE id = $1")
                    .bind(detail.id)
                    .execute(&mut **tx)
                    .await?;
                changed += 1;
            }
            graduate_word(tx, result.student_id, &detail.word_question, now).await?;
        } else if detail.is_correct {
            sqlx::query("UPDATE test_result_details SET is_correct = FALSE WHERE id = $1")
                .bind(detail.id)
                .execute(&mut **tx)
                .await?;
            changed -= 1;
        }
    }

    let (score, wrong_count) = if changed != 0 {
        let score = result.score + changed;
        let wrong_count = result.wrong_count - changed;
        sqlx::query("UPDATE test_results SET score = $2, wrong_count = $3 WHERE id = $1")
            .bind(result_id)
            .bind(score)
            .bind(wrong_count)
            .execute(&mut **tx)
            .await?;
        (score, wrong_count)
    } else {
        (result.score, result.wrong_count)
    };

    let mut assignment_completed = false;
    if let Some(assignment_id) = result.assignment_id {
        if grading::passes(score, result.total_count.max(0) as usize) {
            let updated = sqlx::query(
                r#"UPDATE assignments SET is_completed = TRUE, completed_at = $2
                   WHERE id = $1 AND is_completed = FALSE"#,
            )
            .bind(assignment_id)
            .bind(now)
            .execute(&mut **tx)
            .await?;
            assignment_completed = updated.rows_affected() > 0;
        }
    }

    Ok(ReviewTestResp { score, wrong_count, changed, assignment_completed })
}

// --- read-side queries ---

pub async fn assignments_for_log(db: &Db, log_id: Uuid) -> Result<Vec<Assignment>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM assignments WHERE origin_log_id = $1 ORDER BY due_date, created_at",
    )
    .bind(log_id)
    .fetch_all(db)
    .await
}

pub async fn class_log(db: &Db, id: Uuid) -> Result<Option<ClassLog>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM class_logs WHERE id = $1").bind(id).fetch_optional(db).await
}

/// Incomplete assignments due before a cutoff, for a set of students.
pub async fn due_assignments(
    db: &Db,
    student_ids: Vec<Uuid>,
    before: NaiveDate,
) -> Result<Vec<Assignment>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT * FROM assignments
           WHERE student_id = ANY($1) AND is_completed = FALSE AND due_date < $2
           ORDER BY due_date, created_at"#,
    )
    .bind(student_ids)
    .bind(before)
    .fetch_all(db)
    .await
}

/// Tracked words that have not graduated: the retest pool for one student.
pub async fn weak_words(db: &Db, student_id: Uuid) -> Result<Vec<WeakWord>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT w.master_word_id, m.text, w.success_count, w.last_correct_at
           FROM wrong_words w
           JOIN master_words m ON m.id = w.master_word_id
           WHERE w.student_id = $1 AND w.success_count < $2
           ORDER BY m.text"#,
    )
    .bind(student_id)
    .bind(GRADUATION_COUNT)
    .fetch_all(db)
    .await
}

// --- internals ---

async fn assignments_for_log_tx(
    tx: &mut Tx<'_>,
    log_id: Uuid,
) -> Result<Vec<Assignment>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM assignments WHERE origin_log_id = $1 ORDER BY due_date, created_at",
    )
    .bind(log_id)
    .fetch_all(&mut **tx)
    .await
}

async fn vocab_directive(
    tx: &mut Tx<'_>,
    log: &ClassLog,
) -> Result<Option<VocabDirective>, sqlx::Error> {
    let Some(book_id) = log.hw_vocab_book_id else {
        return Ok(None);
    };
    let title: Option<String> = sqlx::query_scalar("SELECT title FROM word_books WHERE id = $1")
        .bind(book_id)
        .fetch_optional(&mut **tx)
        .await?;
    match title {
        Some(book_title) => Ok(Some(VocabDirective {
            book_id,
            book_title,
            range: log.hw_vocab_range.clone(),
        })),
        None => {
            // Dangling reference (book deleted since the log was written):
            // degrade to "no vocabulary homework".
            tracing::warn!(%book_id, "vocab book missing, skipping vocabulary flow");
            Ok(None)
        }
    }
}

async fn manual_directive(
    tx: &mut Tx<'_>,
    log: &ClassLog,
) -> Result<Option<ManualDirective>, sqlx::Error> {
    let Some(book_id) = log.hw_main_book_id else {
        return Ok(None);
    };
    let title: Option<String> = sqlx::query_scalar("SELECT title FROM textbooks WHERE id = $1")
        .bind(book_id)
        .fetch_optional(&mut **tx)
        .await?;
    match title {
        Some(book_title) => Ok(Some(ManualDirective {
            book_id,
            book_title,
            range: log.hw_main_range.clone(),
        })),
        None => {
            tracing::warn!(%book_id, "textbook missing, skipping manual flow");
            Ok(None)
        }
    }
}

async fn apply_plan(
    tx: &mut Tx<'_>,
    log: &ClassLog,
    plan: &ReconcilePlan,
) -> Result<(), ServiceError> {
    for id in &plan.delete_ids {
        sqlx::query("DELETE FROM assignments WHERE id = $1").bind(id).execute(&mut **tx).await?;
    }
    for (id, due) in &plan.retime {
        sqlx::query("UPDATE assignments SET due_date = $2 WHERE id = $1")
            .bind(id)
            .bind(due)
            .execute(&mut **tx)
            .await?;
    }
    create_from_specs(tx, log, &plan.create).await?;
    Ok(())
}

async fn create_from_specs(
    tx: &mut Tx<'_>,
    log: &ClassLog,
    specs: &[AssignmentSpec],
) -> Result<Vec<Assignment>, ServiceError> {
    let mut created = Vec::with_capacity(specs.len());
    for spec in specs {
        let row = sqlx::query_as::<_, Assignment>(
            r#"INSERT INTO assignments
                 (id, student_id, teacher_id, origin_log_id, kind, title, description, due_date,
                  start_date, vocab_book_id, vocab_range_start, vocab_range_end, textbook_id,
                  textbook_range, is_cumulative)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(log.student_id)
        .bind(log.teacher_id)
        .bind(log.id)
        .bind(spec.kind)
        .bind(&spec.title)
        .bind(&spec.description)
        .bind(spec.due_date)
        .bind(spec.start_date)
        .bind(spec.vocab_book_id)
        .bind(spec.vocab_range_start)
        .bind(spec.vocab_range_end)
        .bind(spec.textbook_id)
        .bind(&spec.textbook_range)
        .bind(spec.is_cumulative)
        .fetch_one(&mut **tx)
        .await?;

        // Assigning from a word book enrolls the student in it.
        if let Some(book_id) = spec.vocab_book_id {
            sqlx::query(
                r#"INSERT INTO book_subscriptions (id, student_id, book_id)
                   VALUES ($1, $2, $3)
                   ON CONFLICT (student_id, book_id) DO NOTHING"#,
            )
            .bind(Uuid::new_v4())
            .bind(log.student_id)
            .bind(book_id)
            .execute(&mut **tx)
            .await?;
        }
        created.push(row);
    }
    Ok(created)
}

async fn ensure_master_word(tx: &mut Tx<'_>, key: &str) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r#"INSERT INTO master_words (id, text) VALUES ($1, $2)
           ON CONFLICT (text) DO UPDATE SET text = EXCLUDED.text
           RETURNING id"#,
    )
    .bind(Uuid::new_v4())
    .bind(key)
    .fetch_one(&mut **tx)
    .await
}

/// Runs one graded answer through the 3-strike state machine and persists
/// whatever state comes out. Words never missed stay untracked.
async fn apply_mastery(
    tx: &mut Tx<'_>,
    student_id: Uuid,
    word: &str,
    is_correct: bool,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let key = canonical_text(word);
    if key.is_empty() {
        return Ok(());
    }
    let row: Option<WrongWord> = sqlx::query_as(
        r#"SELECT w.* FROM wrong_words w
           JOIN master_words m ON m.id = w.master_word_id
           WHERE w.student_id = $1 AND m.text = $2"#,
    )
    .bind(student_id)
    .bind(&key)
    .fetch_optional(&mut **tx)
    .await?;

    let prev = row
        .as_ref()
        .map(|r| MasteryState { success_count: r.success_count, last_correct_at: r.last_correct_at });
    let Some(next) = mastery::apply_answer(prev, is_correct, now) else {
        return Ok(());
    };

    match row {
        Some(r) => {
            sqlx::query("UPDATE wrong_words SET success_count = $2, last_correct_at = $3 WHERE id = $1")
                .bind(r.id)
                .bind(next.success_count)
                .bind(next.last_correct_at)
                .execute(&mut **tx)
                .await?;
        }
        None => {
            let master_id = ensure_master_word(tx, &key).await?;
            sqlx::query(
                r#"INSERT INTO wrong_words (id, student_id, master_word_id, success_count, last_correct_at)
                   VALUES ($1, $2, $3, $4, $5)"#,
            )
            .bind(Uuid::new_v4())
            .bind(student_id)
            .bind(master_id)
            .bind(next.success_count)
            .bind(next.last_correct_at)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

async fn graduate_word(
    tx: &mut Tx<'_>,
    student_id: Uuid,
    word: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let key = canonical_text(word);
    let mut state = MasteryState::default();
    state.graduate(now);
    sqlx::query(
        r#"UPDATE wrong_words w SET success_count = $3, last_correct_at = $4
           FROM master_words m
           WHERE w.master_word_id = m.id AND w.student_id = $1 AND m.text = $2"#,
    )
    .bind(student_id)
    .bind(&key)
    .bind(state.success_count)
    .bind(state.last_correct_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
