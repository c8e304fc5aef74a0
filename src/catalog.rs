//! Content catalog: validated, immutable courses and quizzes.
//!
//! Built once at startup from the optional TOML catalog plus the built-in seeds
//! and shared as `Arc<Catalog>`. Quizzes are handed out as `Arc<Quiz>` so sessions
//! can hold a snapshot without copying question text.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::CatalogConfig;
use crate::domain::{Course, PassThreshold, Quiz, TimerMode};
use crate::seeds::{seed_courses, seed_quizzes};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
  #[error("quiz {0} has no questions")]
  EmptyQuiz(String),
  #[error("question {question} in quiz {quiz} needs at least two options")]
  TooFewOptions { quiz: String, question: String },
  #[error("question {question} in quiz {quiz} points at option {correct} but has {options}")]
  CorrectOutOfRange { quiz: String, question: String, correct: usize, options: usize },
  #[error("question {question} in quiz {quiz} must be worth at least one point")]
  ZeroPoints { quiz: String, question: String },
  #[error("quiz {quiz}: {reason}")]
  BadPolicy { quiz: String, reason: String },
}

/// Check the structural invariants a session relies on.
pub fn validate_quiz(quiz: &Quiz) -> Result<(), CatalogError> {
  if quiz.questions.is_empty() {
    return Err(CatalogError::EmptyQuiz(quiz.id.clone()));
  }
  for question in &quiz.questions {
    if question.options.len() < 2 {
      return Err(CatalogError::TooFewOptions { quiz: quiz.id.clone(), question: question.id.clone() });
    }
    if question.correct >= question.options.len() {
      return Err(CatalogError::CorrectOutOfRange {
        quiz: quiz.id.clone(),
        question: question.id.clone(),
        correct: question.correct,
        options: question.options.len(),
      });
    }
    if question.points == 0 {
      return Err(CatalogError::ZeroPoints { quiz: quiz.id.clone(), question: question.id.clone() });
    }
  }
  if quiz.questions.iter().try_fold(0u32, |total, q| total.checked_add(q.points)).is_none() {
    return Err(CatalogError::BadPolicy { quiz: quiz.id.clone(), reason: "total points overflow".into() });
  }
  match quiz.pass {
    PassThreshold::Percent(p) if p > 100 => {
      return Err(CatalogError::BadPolicy { quiz: quiz.id.clone(), reason: format!("pass percent {p} > 100") });
    }
    PassThreshold::Correct(n) if n > quiz.questions.len() => {
      return Err(CatalogError::BadPolicy {
        quiz: quiz.id.clone(),
        reason: format!("pass needs {n} correct but quiz has {} questions", quiz.questions.len()),
      });
    }
    _ => {}
  }
  let zero_timer = match quiz.timer {
    TimerMode::PerQuestion { default_secs } => {
      default_secs == 0 || quiz.questions.iter().any(|q| q.time_limit_secs == Some(0))
    }
    TimerMode::WholeQuiz { secs } => secs == 0,
  };
  if zero_timer {
    return Err(CatalogError::BadPolicy { quiz: quiz.id.clone(), reason: "time limits must be positive".into() });
  }
  Ok(())
}

#[derive(Debug, Default)]
pub struct Catalog {
  quizzes: HashMap<String, Arc<Quiz>>,
  quiz_order: Vec<String>,
  courses: Vec<Course>,
}

impl Catalog {
  /// Build from explicit lists, skipping (and logging) invalid quizzes.
  /// Earlier entries win on duplicate ids.
  pub fn build(quizzes: Vec<Quiz>, courses: Vec<Course>) -> Self {
    let mut catalog = Catalog::default();
    for quiz in quizzes {
      if catalog.quizzes.contains_key(&quiz.id) {
        continue;
      }
      if let Err(e) = validate_quiz(&quiz) {
        error!(target: "quiz", id = %quiz.id, error = %e, "Skipping invalid quiz.");
        continue;
      }
      catalog.quiz_order.push(quiz.id.clone());
      catalog.quizzes.insert(quiz.id.clone(), Arc::new(quiz));
    }
    for course in courses {
      if catalog.courses.iter().any(|c| c.id == course.id) {
        continue;
      }
      catalog.courses.push(course);
    }
    catalog
  }

  /// Configured entries first, then the built-in seeds (which never overwrite).
  #[instrument(level = "info", skip_all)]
  pub fn from_config(cfg: Option<CatalogConfig>) -> Self {
    let (mut quizzes, mut courses) = cfg.map(|c| (c.quizzes, c.courses)).unwrap_or_default();
    quizzes.extend(seed_quizzes());
    courses.extend(seed_courses());
    let catalog = Self::build(quizzes, courses);
    info!(target: "quiz", quizzes = catalog.quiz_order.len(), courses = catalog.courses.len(), "Catalog ready");
    catalog
  }

  pub fn quiz(&self, id: &str) -> Option<Arc<Quiz>> {
    self.quizzes.get(id).cloned()
  }

  /// Quizzes in catalog order.
  pub fn quizzes(&self) -> impl Iterator<Item = &Arc<Quiz>> + '_ {
    self.quiz_order.iter().filter_map(|id| self.quizzes.get(id))
  }

  pub fn courses(&self) -> &[Course] {
    &self.courses
  }

  pub fn course(&self, id: &str) -> Option<&Course> {
    self.courses.iter().find(|c| c.id == id)
  }
}
