//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! Handlers stay thin: they parse input, call into here, and serialize what
//! comes back. Errors are collected into `ApiError` so both transports report
//! them the same way.

use thiserror::Error;
use tracing::{info, instrument};

use crate::certificate::{validate_display_name, IssueError, IssuedCertificate};
use crate::progress::badges;
use crate::protocol::{to_summary, CertificateOut, CourseOut, ProfileOut, ProgressOut, QuizSummary};
use crate::runner::RunnerError;
use crate::session::{InputError, SessionView};
use crate::state::AppState;
use crate::storage::StorageError;
use crate::wallet::{explorer_url, Wallet};

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0} not found")]
  NotFound(String),
  #[error(transparent)]
  Runner(#[from] RunnerError),
  #[error(transparent)]
  Issue(#[from] IssueError),
  #[error(transparent)]
  Storage(#[from] StorageError),
}

impl ApiError {
  /// HTTP status code for this error.
  pub fn status_code(&self) -> u16 {
    match self {
      ApiError::NotFound(_) => 404,
      ApiError::Runner(RunnerError::NoSession)
      | ApiError::Runner(RunnerError::Input(InputError::Terminal))
      | ApiError::Runner(RunnerError::Input(InputError::ExplanationShowing)) => 409,
      ApiError::Runner(RunnerError::Input(_)) => 400,
      ApiError::Runner(RunnerError::Issue(e)) | ApiError::Issue(e) => match e {
        IssueError::EmptyName | IssueError::NameTooLong => 400,
        IssueError::NotEligible | IssueError::NotAwaitingName => 409,
      },
      ApiError::Storage(_) => 500,
    }
  }
}

pub fn quiz_summaries(state: &AppState) -> Vec<QuizSummary> {
  let completed = state.store.current_progress().completed_quizzes;
  state
    .catalog
    .quizzes()
    .map(|q| to_summary(q, completed.contains(&q.id)))
    .collect()
}

pub fn course_detail(state: &AppState, id: &str) -> Result<CourseOut, ApiError> {
  let course = state.catalog.course(id).ok_or_else(|| ApiError::NotFound(format!("course {id}")))?;
  let completed = state.store.current_progress().completed_quizzes;
  let quizzes = course
    .quiz_ids
    .iter()
    .filter_map(|qid| state.catalog.quiz(qid))
    .map(|q| to_summary(&q, completed.contains(&q.id)))
    .collect();
  Ok(CourseOut { course: course.clone(), quizzes })
}

#[instrument(level = "info", skip(state))]
pub async fn start_quiz(state: &AppState, quiz_id: &str) -> Result<SessionView, ApiError> {
  let quiz = state.catalog.quiz(quiz_id).ok_or_else(|| ApiError::NotFound(format!("quiz {quiz_id}")))?;
  Ok(state.runner.start(quiz).await?)
}

/// Confirm the pending certificate, defaulting the name to the profile name.
#[instrument(level = "info", skip(state))]
pub async fn issue_certificate(state: &AppState, name: Option<&str>) -> Result<IssuedCertificate, ApiError> {
  let name = match name {
    Some(n) => n.to_string(),
    None => state.store.default_display_name(),
  };
  let issued = state.runner.issue_certificate(&name, &state.wallet, &state.chain_options()).await?;
  info!(target: "certificate", id = %issued.record.id, stored = issued.stored, "Certificate request served");
  Ok(issued)
}

/// Always read from storage so a request right after a write sees it.
pub fn progress_out(state: &AppState) -> ProgressOut {
  let progress = state.store.current_progress();
  ProgressOut { badges: badges(&progress), progress }
}

/// Newest first, each with its receipt status and explorer link when there is one.
pub fn certificates_out(state: &AppState) -> Vec<CertificateOut> {
  let mut out: Vec<CertificateOut> = state
    .store
    .certificates_with_receipts()
    .into_iter()
    .map(|(record, receipt)| {
      let confirmed = receipt.map(|r| r.confirmed);
      let explorer = record.transaction_hash.as_deref().map(|h| explorer_url(h, &state.settings.network));
      CertificateOut { record, confirmed, explorer_url: explorer }
    })
    .collect();
  out.reverse();
  out
}

pub fn profile_out(state: &AppState) -> ProfileOut {
  ProfileOut {
    username: state.store.default_display_name(),
    wallet_address: state.wallet.connection().map(|c| c.address),
    network: state.settings.network.clone(),
  }
}

pub fn set_profile_name(state: &AppState, username: &str) -> Result<ProfileOut, ApiError> {
  let name = validate_display_name(username)?;
  state.store.set_profile_name(&name)?;
  Ok(profile_out(state))
}

pub fn clear_profile(state: &AppState) -> Result<ProfileOut, ApiError> {
  state.store.clear_profile()?;
  Ok(profile_out(state))
}
