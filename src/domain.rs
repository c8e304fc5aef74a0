//! Domain models: courses, quizzes, questions and the per-quiz policies
//! (timer, passing threshold, scoring mode, on-chain gate).

use serde::{Deserialize, Serialize};

/// Difficulty label shown next to a course or quiz.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Difficulty {
  #[default]
  Beginner,
  Intermediate,
  Advanced,
  Expert,
}

/// One multiple-choice question in canonical (unshuffled) order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  pub prompt: String,
  pub options: Vec<String>,
  /// Index into `options` as defined, never into a shuffled presentation.
  pub correct: usize,
  #[serde(default)]
  pub explanation: String,
  #[serde(default = "default_points")]
  pub points: u32,
  /// Per-question countdown; falls back to the quiz default in per-question mode.
  #[serde(default)]
  pub time_limit_secs: Option<u32>,
}

fn default_points() -> u32 { 1 }

/// How the countdown is attached to a quiz attempt.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
  /// Every question runs its own countdown.
  PerQuestion { default_secs: u32 },
  /// One countdown for the whole attempt.
  WholeQuiz { secs: u32 },
}

impl Default for TimerMode {
  fn default() -> Self { TimerMode::PerQuestion { default_secs: 30 } }
}

/// Passing threshold. Each quiz states which representation it uses.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassThreshold {
  /// Percentage (0..=100) of the maximum achievable score.
  Percent(u8),
  /// Absolute number of correctly answered questions.
  Correct(usize),
}

impl Default for PassThreshold {
  fn default() -> Self { PassThreshold::Percent(80) }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
  /// Sum of the point values of correct answers.
  #[default]
  Points,
  /// One point per correct answer.
  Count,
}

/// Which scores may trigger the on-chain proof-of-completion.
/// Checked independently of `PassThreshold`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnchainGate {
  #[default]
  PerfectOnly,
  MinPercent(u8),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quiz {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub difficulty: Difficulty,
  pub questions: Vec<Question>,
  #[serde(default)]
  pub timer: TimerMode,
  #[serde(default)]
  pub pass: PassThreshold,
  #[serde(default)]
  pub scoring: ScoringMode,
  #[serde(default = "default_xp_reward")]
  pub xp_reward: u32,
  #[serde(default)]
  pub onchain: OnchainGate,
  #[serde(default)]
  pub allow_back: bool,
  #[serde(default)]
  pub show_explanations: bool,
}

pub(crate) fn default_xp_reward() -> u32 { 50 }

impl Quiz {
  /// Maximum achievable raw score under the quiz's scoring mode.
  /// Saturates; the catalog rejects quizzes whose totals overflow.
  pub fn max_score(&self) -> u32 {
    match self.scoring {
      ScoringMode::Points => self.questions.iter().fold(0u32, |total, q| total.saturating_add(q.points)),
      ScoringMode::Count => self.questions.len() as u32,
    }
  }

  /// Countdown length for a question (canonical index) under per-question mode,
  /// or the whole-quiz budget otherwise.
  pub fn time_limit_for(&self, canonical_question: usize) -> u32 {
    match self.timer {
      TimerMode::PerQuestion { default_secs } => self
        .questions
        .get(canonical_question)
        .and_then(|q| q.time_limit_secs)
        .unwrap_or(default_secs),
      TimerMode::WholeQuiz { secs } => secs,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TheorySection {
  pub heading: String,
  pub body: String,
}

/// A course: theory to read, then one or more quizzes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Course {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub difficulty: Difficulty,
  #[serde(default)]
  pub theory: Vec<TheorySection>,
  #[serde(default)]
  pub quiz_ids: Vec<String>,
}
