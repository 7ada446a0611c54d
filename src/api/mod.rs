use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::*;
use crate::services::DeletionReport;
use crate::state::AppState;

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    category: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollRequest {
    user_id: String,
}

#[derive(Serialize)]
struct VisitsResponse {
    visits: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/courses", get(list_courses).post(create_course))
        .route("/courses/search", get(search_courses))
        .route("/courses/reset", post(reset_courses))
        .route(
            "/courses/{id}",
            get(get_course).patch(edit_course).delete(delete_course),
        )
        .route("/courses/{id}/visits", post(increment_visits))
        .route("/courses/{id}/enroll", post(enroll_user))
        .route("/analytics", get(analytics))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn list_courses(State(state): State<AppState>) -> Json<Vec<Course>> {
    Json(state.courses.list_courses().await)
}

async fn create_course(
    State(state): State<AppState>,
    Json(req): Json<Option<NewCourseRequest>>,
) -> Result<(StatusCode, Json<Course>), AppError> {
    let req = req.ok_or_else(|| AppError::BadRequest("Course body is required".to_string()))?;
    let course = state
        .courses
        .create_course(req)
        .await?
        .ok_or_else(|| AppError::BadRequest("A course needs a title and a valid price".to_string()))?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn search_courses(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<Course>> {
    Json(state.courses.search_courses_by_category(&params.category))
}

async fn reset_courses(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.courses.reset_all_courses().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Course>, AppError> {
    let course = state.courses.get_course(id).ok_or(AppError::NotFound)?;
    Ok(Json(course))
}

async fn edit_course(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<UpdateCourseRequest>,
) -> Result<Json<Course>, AppError> {
    let valid = req.is_valid();
    match state.courses.edit_course(id, req).await? {
        Some(course) => Ok(Json(course)),
        // Classified after the edit so a concurrent delete reads as 404.
        None if valid || state.courses.get_course(id).is_none() => Err(AppError::NotFound),
        None => Err(AppError::BadRequest(
            "Title must not be blank and price must be non-negative".to_string(),
        )),
    }
}

async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<DeletionReport>, AppError> {
    let report = state
        .deletion
        .course_deletion(id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(report))
}

async fn increment_visits(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<VisitsResponse>, AppError> {
    let visits = state
        .courses
        .increment_visits(id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(VisitsResponse { visits }))
}

async fn enroll_user(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<EnrollRequest>,
) -> Result<StatusCode, AppError> {
    if state.courses.enroll_user(&req.user_id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else if state.courses.get_course(id).is_none() {
        Err(AppError::NotFound)
    } else {
        Err(AppError::Conflict(format!(
            "User {} is already enrolled in course {}",
            req.user_id, id
        )))
    }
}

async fn analytics(State(state): State<AppState>) -> Json<Analytics> {
    Json(state.courses.get_analytics())
}
