//! Pure scoring over a session's recorded canonical answers.

use serde::Serialize;

use crate::domain::{OnchainGate, PassThreshold, Quiz, ScoringMode};
use crate::session::Session;
use crate::util::percent_round_half_up;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Score {
  pub raw: u32,
  pub max: u32,
  pub correct: usize,
  pub answered: usize,
  pub total: usize,
  pub percent: u8,
}

impl Score {
  pub fn is_perfect(&self) -> bool {
    self.max > 0 && self.raw == self.max
  }

  pub fn meets(&self, threshold: PassThreshold) -> bool {
    match threshold {
      PassThreshold::Percent(p) => self.percent >= p,
      PassThreshold::Correct(n) => self.correct >= n,
    }
  }
}

/// Final outcome of a finished attempt.
#[derive(Clone, Debug, Serialize)]
pub struct QuizResult {
  pub quiz_id: String,
  pub quiz_title: String,
  pub score: Score,
  pub passed: bool,
  pub xp_reward: u32,
  pub onchain: OnchainGate,
}

pub fn score_of(session: &Session) -> Score {
  let quiz = session.quiz();
  let mut score = Score {
    raw: 0,
    max: quiz.max_score(),
    correct: 0,
    answered: 0,
    total: session.len(),
    percent: 0,
  };
  for (canonical_q, answer) in session.recorded() {
    let Some(answer) = answer else { continue };
    score.answered += 1;
    let question = &quiz.questions[canonical_q];
    if answer.canonical() == Some(question.correct) {
      score.correct += 1;
      score.raw = score.raw.saturating_add(match quiz.scoring {
        ScoringMode::Points => question.points,
        ScoringMode::Count => 1,
      });
    }
  }
  score.percent = percent_round_half_up(score.raw, score.max);
  score
}

/// Whether the current state meets `quiz`'s threshold. Usable mid-attempt.
pub fn passed(session: &Session, quiz: &Quiz) -> bool {
  score_of(session).meets(quiz.pass)
}

/// Only available once the session is terminal.
pub fn final_result(session: &Session) -> Option<QuizResult> {
  if !session.is_terminal() {
    return None;
  }
  let quiz = session.quiz();
  let score = score_of(session);
  Some(QuizResult {
    quiz_id: quiz.id.clone(),
    quiz_title: quiz.title.clone(),
    score,
    passed: score.meets(quiz.pass),
    xp_reward: quiz.xp_reward,
    onchain: quiz.onchain,
  })
}

/// Whether a score may trigger the on-chain proof.
pub fn qualifies_onchain(score: &Score, gate: OnchainGate) -> bool {
  match gate {
    OnchainGate::PerfectOnly => score.is_perfect(),
    OnchainGate::MinPercent(p) => score.percent >= p,
  }
}
