//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::logic::{self, ApiError};
use crate::protocol::*;
use crate::state::AppState;

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
      warn!(target: "quizchain_backend", error = %self, "Request failed");
    }
    (status, Json(ErrorOut { error: self.to_string() })).into_response()
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_courses(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.catalog.courses().to_vec())
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_course(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<CourseOut>, ApiError> {
  Ok(Json(logic::course_detail(&state, &id)?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_quizzes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(logic::quiz_summaries(&state))
}

#[instrument(level = "info", skip(state, body), fields(quiz = %body.quiz_id))]
pub async fn http_post_start(
  State(state): State<Arc<AppState>>,
  Json(body): Json<StartIn>,
) -> Result<impl IntoResponse, ApiError> {
  let view = logic::start_quiz(&state, &body.quiz_id).await?;
  info!(target: "quiz", quiz = %body.quiz_id, total = view.total, "HTTP quiz started");
  Ok(Json(view))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_retake(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(state.runner.retake().await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
  let view = state.runner.snapshot().await.ok_or(crate::runner::RunnerError::NoSession)?;
  Ok(Json(view))
}

#[instrument(level = "info", skip(state, body), fields(option = body.option))]
pub async fn http_post_select(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SelectIn>,
) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(state.runner.select(body.option).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_submit(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
  let reply = state.runner.submit().await?;
  info!(target: "quiz", question = %reply.outcome.question_id, correct = reply.outcome.correct, finished = reply.outcome.finished, "HTTP answer submitted");
  Ok(Json(reply))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_previous(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(state.runner.previous().await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_dismiss_explanation(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(state.runner.dismiss_explanation().await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let had_session = state.runner.abandon().await;
  Json(AbandonOut { had_session })
}

#[instrument(level = "info", skip(state, body), fields(has_name = body.as_ref().map_or(false, |b| b.name.is_some())))]
pub async fn http_post_certificate(
  State(state): State<Arc<AppState>>,
  body: Option<Json<CertificateIn>>,
) -> Result<impl IntoResponse, ApiError> {
  let body = body.map(|Json(b)| b).unwrap_or_default();
  let issued = logic::issue_certificate(&state, body.name.as_deref()).await?;
  Ok((StatusCode::CREATED, Json(issued)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_certificate_cancel(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
  state.runner.cancel_certificate().await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_certificates(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(logic::certificates_out(&state))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_progress(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(logic::progress_out(&state))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_profile(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(logic::profile_out(&state))
}

#[instrument(level = "info", skip(state, body), fields(name_len = body.username.len()))]
pub async fn http_put_profile(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ProfileIn>,
) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(logic::set_profile_name(&state, &body.username)?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_profile(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(logic::clear_profile(&state)?))
}
