use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use axum::http::StatusCode;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{db::Db, models::*, service, service::ServiceError};

pub fn router(db: Db) -> Router {
    Router::new()
        // catalog
        .route("/api/word-books", post(create_word_book))
        .route("/api/word-books/:id/words", post(add_word))
        .route("/api/textbooks", post(create_textbook))
        // class logs + derived homework
        .route("/api/class-logs", post(create_class_log))
        .route("/api/class-logs/:id", get(get_class_log).put(update_class_log))
        .route(
            "/api/class-logs/:id/assignments",
            get(list_assignments).post(replace_assignments),
        )
        // vocabulary testing
        .route("/api/tests/submit", post(submit_test))
        .route("/api/tests/:id/review", post(review_test))
        // query surface
        .route("/api/assignments/due", get(due_assignments))
        .route("/api/students/:id/weak-words", get(weak_words))
        .with_state(db)
}

async fn create_word_book(
    State(db): State<Db>,
    Json(req): Json<CreateBookReq>,
) -> Result<Json<WordBook>, (StatusCode, String)> {
    let mut tx = db.begin().await.map_err(e500)?;
    let book = service::create_word_book(&mut tx, &req.title).await.map_err(map_err)?;
    tx.commit().await.map_err(e500)?;
    Ok(Json(book))
}

async fn create_textbook(
    State(db): State<Db>,
    Json(req): Json<CreateBookReq>,
) -> Result<Json<Textbook>, (StatusCode, String)> {
    let mut tx = db.begin().await.map_err(e500)?;
    let book = service::create_textbook(&mut tx, &req.title).await.map_err(map_err)?;
    tx.commit().await.map_err(e500)?;
    Ok(Json(book))
}

async fn add_word(
    State(db): State<Db>,
    Path(book_id): Path<Uuid>,
    Json(req): Json<CreateWordReq>,
) -> Result<Json<Word>, (StatusCode, String)> {
    let mut tx = db.begin().await.map_err(e500)?;
    let word = service::add_word(&mut tx, book_id, &req).await.map_err(map_err)?;
    tx.commit().await.map_err(e500)?;
    Ok(Json(word))
}

async fn create_class_log(
    State(db): State<Db>,
    Json(req): Json<ClassLogInput>,
) -> Result<Json<ClassLogResp>, (StatusCode, String)> {
    let mut tx = db.begin().await.map_err(e500)?;
    let (log, assignments) = service::create_class_log(&mut tx, &req).await.map_err(map_err)?;
    tx.commit().await.map_err(e500)?;
    Ok(Json(ClassLogResp { log, assignments }))
}

async fn update_class_log(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(req): Json<ClassLogInput>,
) -> Result<Json<ClassLogResp>, (StatusCode, String)> {
    let today = Utc::now().date_naive();
    let mut tx = db.begin().await.map_err(e500)?;
    let (log, assignments) =
        service::update_class_log(&mut tx, id, &req, today).await.map_err(map_err)?;
    tx.commit().await.map_err(e500)?;
    Ok(Json(ClassLogResp { log, assignments }))
}

async fn get_class_log(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClassLogResp>, (StatusCode, String)> {
    let log = service::class_log(&db, id)
        .await
        .map_err(e500)?
        .ok_or_else(|| e404("class log not found"))?;
    let assignments = service::assignments_for_log(&db, id).await.map_err(e500)?;
    Ok(Json(ClassLogResp { log, assignments }))
}

async fn list_assignments(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Assignment>>, (StatusCode, String)> {
    let assignments = service::assignments_for_log(&db, id).await.map_err(e500)?;
    Ok(Json(assignments))
}

async fn replace_assignments(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplaceAssignmentsReq>,
) -> Result<Json<Vec<Assignment>>, (StatusCode, String)> {
    let mut tx = db.begin().await.map_err(e500)?;
    let assignments =
        service::replace_assignments(&mut tx, id, &req.assignments).await.map_err(map_err)?;
    tx.commit().await.map_err(e500)?;
    Ok(Json(assignments))
}

async fn submit_test(
    State(db): State<Db>,
    Json(req): Json<SubmitTestReq>,
) -> Result<Json<SubmitTestResp>, (StatusCode, String)> {
    let mut tx = db.begin().await.map_err(e500)?;
    let resp = service::submit_test(&mut tx, &req, Utc::now()).await.map_err(map_err)?;
    tx.commit().await.map_err(e500)?;
    Ok(Json(resp))
}

async fn review_test(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewTestReq>,
) -> Result<Json<ReviewTestResp>, (StatusCode, String)> {
    let mut tx = db.begin().await.map_err(e500)?;
    let resp = service::review_test(&mut tx, id, &req, Utc::now()).await.map_err(map_err)?;
    tx.commit().await.map_err(e500)?;
    Ok(Json(resp))
}

#[derive(Deserialize)]
struct DueParams {
    // comma-separated; malformed entries are ignored
    student_ids: String,
    before: Option<NaiveDate>,
}

async fn due_assignments(
    State(db): State<Db>,
    Query(params): Query<DueParams>,
) -> Result<Json<Vec<Assignment>>, (StatusCode, String)> {
    let students: Vec<Uuid> = params
        .student_ids
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    if students.is_empty() {
        return Err(e400("student_ids is required"));
    }
    let before = params.before.unwrap_or_else(|| Utc::now().date_naive());
    let assignments = service::due_assignments(&db, students, before).await.map_err(e500)?;
    Ok(Json(assignments))
}

async fn weak_words(
    State(db): State<Db>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<Vec<WeakWord>>, (StatusCode, String)> {
    let words = service::weak_words(&db, student_id).await.map_err(e500)?;
    Ok(Json(words))
}

// --- helpers ---

fn map_err(e: ServiceError) -> (StatusCode, String) {
    match e {
        ServiceError::NotFound(what) => e404(format!("{what} not found")),
        ServiceError::Db(e) => e500(e),
    }
}

fn e400<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.into())
}

fn e404<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, msg.into())
}

fn e500<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    tracing::error!(error=%e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
