//! Shared fixtures for unit tests.

use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};

use crate::domain::{Difficulty, OnchainGate, PassThreshold, Question, Quiz, ScoringMode, TimerMode};
use crate::session::Session;

pub fn seeded(seed: u64) -> StdRng {
  StdRng::seed_from_u64(seed)
}

/// Five questions, four options each, 20 points apiece, pass at 80%.
pub fn five_by_twenty() -> Arc<Quiz> {
  let correct = [0, 1, 2, 3, 1];
  let questions = correct
    .iter()
    .enumerate()
    .map(|(i, &c)| Question {
      id: format!("q{}", i + 1),
      prompt: format!("Question {}", i + 1),
      options: (0..4).map(|o| format!("Option {o}")).collect(),
      correct: c,
      explanation: format!("Option {c} is right"),
      points: 20,
      time_limit_secs: None,
    })
    .collect();
  Arc::new(Quiz {
    id: "five".into(),
    title: "Five Questions".into(),
    description: String::new(),
    category: "Test".into(),
    difficulty: Difficulty::Beginner,
    questions,
    timer: TimerMode::PerQuestion { default_secs: 30 },
    pass: PassThreshold::Percent(80),
    scoring: ScoringMode::Points,
    xp_reward: 50,
    onchain: OnchainGate::PerfectOnly,
    allow_back: false,
    show_explanations: false,
  })
}

/// Select the presentation index that maps to `canonical` on the current question.
pub fn choose_canonical(session: &mut Session, canonical: usize) {
  let pos = session.position();
  let pres = session.presentation_index_of(pos, canonical).expect("canonical option exists");
  session.select_answer(pres).expect("selection accepted");
}

/// Answer the current question right or wrong and submit.
pub fn answer_current(session: &mut Session, right: bool) {
  let canonical_q = session.question_order()[session.position()];
  let question = &session.quiz().questions[canonical_q];
  let target = if right { question.correct } else { (question.correct + 1) % question.options.len() };
  choose_canonical(session, target);
  session.submit_current().expect("submission accepted");
}
