//! Quiz session state machine.
//!
//! A `Session` is one attempt at one quiz. It owns the randomized presentation
//! (question order plus one option permutation per presented question) and the
//! recorded answers. Answers are always stored as canonical option indices so
//! scoring never needs to know about the shuffle.
//!
//! Time is driven from outside: the runner calls `tick()` once per second.
//! Nothing here sleeps, spawns or persists.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::{Quiz, TimerMode};
use crate::scoring::{passed, score_of, Score};

/// Invalid operation on a session. The session is left unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
  #[error("quiz has no questions")]
  EmptyQuiz,
  #[error("session is already finished")]
  Terminal,
  #[error("option {index} is out of range ({options} options)")]
  OptionOutOfRange { index: usize, options: usize },
  #[error("no option selected")]
  NoSelection,
  #[error("already at the first question")]
  AtFirstQuestion,
  #[error("this quiz does not allow going back")]
  BackNotAllowed,
  #[error("dismiss the explanation first")]
  ExplanationShowing,
}

/// What got recorded for a presented question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "option", rename_all = "snake_case")]
pub enum RecordedAnswer {
  /// Canonical option index.
  Chosen(usize),
  /// The countdown ran out with nothing selected.
  NoAnswer,
}

impl RecordedAnswer {
  pub fn canonical(self) -> Option<usize> {
    match self {
      RecordedAnswer::Chosen(c) => Some(c),
      RecordedAnswer::NoAnswer => None,
    }
  }
}

/// Feedback for the question that was just recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
  pub question_id: String,
  pub answer: RecordedAnswer,
  pub correct: bool,
  pub correct_option: usize,
  pub explanation: String,
  pub timed_out: bool,
  pub finished: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tick {
  /// Terminal, or paused while an explanation is showing.
  Idle,
  Counting(u32),
  Expired(SubmitOutcome),
}

/// The current question as the user sees it.
#[derive(Clone, Debug, Serialize)]
pub struct PresentedQuestion<'a> {
  pub position: usize,
  pub canonical_index: usize,
  pub id: &'a str,
  pub prompt: &'a str,
  /// In presentation order.
  pub options: Vec<&'a str>,
  pub points: u32,
  /// Presentation index of the pending choice.
  pub pending: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionView {
  pub quiz_id: String,
  pub quiz_title: String,
  pub position: usize,
  pub total: usize,
  pub answered: usize,
  pub remaining_secs: u32,
  pub whole_quiz_timer: bool,
  pub allow_back: bool,
  pub explanation_showing: bool,
  pub terminal: bool,
  pub started_at: DateTime<Utc>,
  /// Running score over the answers recorded so far.
  pub score: Score,
  /// Whether the running score already meets the pass threshold.
  pub passing: bool,
  pub question: Option<QuestionView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct QuestionView {
  pub id: String,
  pub prompt: String,
  pub options: Vec<String>,
  pub points: u32,
  pub pending: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct Session {
  quiz: Arc<Quiz>,
  /// presented position -> canonical question index
  question_order: Vec<usize>,
  /// presented position -> (presentation option index -> canonical option index)
  option_orders: Vec<Vec<usize>>,
  /// presented position -> recorded answer
  answers: Vec<Option<RecordedAnswer>>,
  position: usize,
  pending: Option<usize>,
  remaining_secs: u32,
  explanation_showing: bool,
  terminal: bool,
  started_at: DateTime<Utc>,
}

impl Session {
  /// New attempt with a fresh shuffle from the thread RNG.
  pub fn start(quiz: Arc<Quiz>) -> Result<Self, InputError> {
    Self::start_with_rng(quiz, &mut rand::thread_rng())
  }

  pub fn start_with_rng<R: Rng + ?Sized>(quiz: Arc<Quiz>, rng: &mut R) -> Result<Self, InputError> {
    if quiz.questions.is_empty() {
      return Err(InputError::EmptyQuiz);
    }
    let mut question_order: Vec<usize> = (0..quiz.questions.len()).collect();
    question_order.shuffle(rng);

    let option_orders = question_order
      .iter()
      .map(|&q| {
        let mut order: Vec<usize> = (0..quiz.questions[q].options.len()).collect();
        order.shuffle(rng);
        order
      })
      .collect();

    let remaining_secs = quiz.time_limit_for(question_order[0]);
    let total = question_order.len();
    debug!(target: "quiz", quiz = %quiz.id, total, remaining_secs, "Session started");
    Ok(Self {
      quiz,
      question_order,
      option_orders,
      answers: vec![None; total],
      position: 0,
      pending: None,
      remaining_secs,
      explanation_showing: false,
      terminal: false,
      started_at: Utc::now(),
    })
  }

  pub fn quiz(&self) -> &Arc<Quiz> { &self.quiz }
  pub fn position(&self) -> usize { self.position }
  pub fn len(&self) -> usize { self.question_order.len() }
  pub fn is_terminal(&self) -> bool { self.terminal }
  pub fn remaining_secs(&self) -> u32 { self.remaining_secs }
  pub fn pending(&self) -> Option<usize> { self.pending }
  pub fn explanation_showing(&self) -> bool { self.explanation_showing }
  pub fn question_order(&self) -> &[usize] { &self.question_order }

  /// Option permutation for a presented position.
  #[cfg(test)]
  pub fn option_order(&self, position: usize) -> Option<&[usize]> {
    self.option_orders.get(position).map(Vec::as_slice)
  }

  /// Recorded answers by presented position.
  #[cfg(test)]
  pub fn answers(&self) -> &[Option<RecordedAnswer>] {
    &self.answers
  }

  /// (canonical question index, recorded answer) pairs, in presentation order.
  pub fn recorded(&self) -> impl Iterator<Item = (usize, Option<RecordedAnswer>)> + '_ {
    self.question_order.iter().copied().zip(self.answers.iter().copied())
  }

  /// Where a canonical option ended up for a presented position.
  pub fn presentation_index_of(&self, position: usize, canonical: usize) -> Option<usize> {
    self.option_orders.get(position)?.iter().position(|&c| c == canonical)
  }

  pub fn current_question(&self) -> Option<PresentedQuestion<'_>> {
    if self.terminal {
      return None;
    }
    let canonical_index = *self.question_order.get(self.position)?;
    let question = &self.quiz.questions[canonical_index];
    Some(PresentedQuestion {
      position: self.position,
      canonical_index,
      id: &question.id,
      prompt: &question.prompt,
      options: self.option_orders[self.position].iter().map(|&c| question.options[c].as_str()).collect(),
      points: question.points,
      pending: self.pending,
    })
  }

  /// Record a pending choice for the current question. Does not advance.
  pub fn select_answer(&mut self, presentation_index: usize) -> Result<(), InputError> {
    if self.terminal {
      return Err(InputError::Terminal);
    }
    if self.explanation_showing {
      return Err(InputError::ExplanationShowing);
    }
    let options = self.option_orders[self.position].len();
    if presentation_index >= options {
      return Err(InputError::OptionOutOfRange { index: presentation_index, options });
    }
    self.pending = Some(presentation_index);
    Ok(())
  }

  /// Manual submission. Requires a pending choice.
  pub fn submit_current(&mut self) -> Result<SubmitOutcome, InputError> {
    if self.terminal {
      return Err(InputError::Terminal);
    }
    if self.explanation_showing {
      return Err(InputError::ExplanationShowing);
    }
    let presentation = self.pending.ok_or(InputError::NoSelection)?;
    let canonical = self.option_orders[self.position][presentation];
    Ok(self.record_and_advance(RecordedAnswer::Chosen(canonical), false))
  }

  /// Timeout-driven advance: the pending choice if any, otherwise "no answer".
  /// In whole-quiz mode this ends the attempt.
  pub fn expire_current(&mut self) -> Option<SubmitOutcome> {
    if self.terminal {
      return None;
    }
    let answer = match self.pending {
      Some(p) => RecordedAnswer::Chosen(self.option_orders[self.position][p]),
      None => RecordedAnswer::NoAnswer,
    };
    match self.quiz.timer {
      TimerMode::PerQuestion { .. } => Some(self.record_and_advance(answer, true)),
      TimerMode::WholeQuiz { .. } => {
        let outcome = self.outcome_for(self.position, answer, true);
        self.answers[self.position] = Some(answer);
        for slot in self.answers.iter_mut().filter(|a| a.is_none()) {
          *slot = Some(RecordedAnswer::NoAnswer);
        }
        self.finish();
        Some(SubmitOutcome { finished: true, ..outcome })
      }
    }
  }

  /// Step back one question, keeping its recorded answer and re-deriving the
  /// pending presentation index from it.
  pub fn previous(&mut self) -> Result<(), InputError> {
    if self.terminal {
      return Err(InputError::Terminal);
    }
    if !self.quiz.allow_back {
      return Err(InputError::BackNotAllowed);
    }
    if self.position == 0 {
      return Err(InputError::AtFirstQuestion);
    }
    self.position -= 1;
    self.explanation_showing = false;
    self.restore_pending();
    if let TimerMode::PerQuestion { .. } = self.quiz.timer {
      self.remaining_secs = self.quiz.time_limit_for(self.question_order[self.position]);
    }
    Ok(())
  }

  /// One second of wall-clock time.
  pub fn tick(&mut self) -> Tick {
    if self.terminal || self.explanation_showing {
      return Tick::Idle;
    }
    self.remaining_secs = self.remaining_secs.saturating_sub(1);
    if self.remaining_secs > 0 {
      return Tick::Counting(self.remaining_secs);
    }
    match self.expire_current() {
      Some(outcome) => Tick::Expired(outcome),
      None => Tick::Idle,
    }
  }

  /// Resume the countdown after feedback was shown.
  pub fn dismiss_explanation(&mut self) {
    self.explanation_showing = false;
  }

  pub fn view(&self) -> SessionView {
    let question = self.current_question().map(|q| QuestionView {
      id: q.id.to_string(),
      prompt: q.prompt.to_string(),
      options: q.options.iter().map(|s| s.to_string()).collect(),
      points: q.points,
      pending: q.pending,
    });
    SessionView {
      quiz_id: self.quiz.id.clone(),
      quiz_title: self.quiz.title.clone(),
      position: self.position,
      total: self.len(),
      answered: self.answers.iter().filter(|a| a.is_some()).count(),
      remaining_secs: self.remaining_secs,
      whole_quiz_timer: matches!(self.quiz.timer, TimerMode::WholeQuiz { .. }),
      allow_back: self.quiz.allow_back,
      explanation_showing: self.explanation_showing,
      terminal: self.terminal,
      started_at: self.started_at,
      score: score_of(self),
      passing: passed(self, &self.quiz),
      question,
    }
  }

  fn outcome_for(&self, position: usize, answer: RecordedAnswer, timed_out: bool) -> SubmitOutcome {
    let question = &self.quiz.questions[self.question_order[position]];
    SubmitOutcome {
      question_id: question.id.clone(),
      answer,
      correct: answer.canonical() == Some(question.correct),
      correct_option: question.correct,
      explanation: question.explanation.clone(),
      timed_out,
      finished: false,
    }
  }

  fn record_and_advance(&mut self, answer: RecordedAnswer, timed_out: bool) -> SubmitOutcome {
    let mut outcome = self.outcome_for(self.position, answer, timed_out);
    self.answers[self.position] = Some(answer);
    self.position += 1;
    if self.position >= self.len() {
      self.finish();
      outcome.finished = true;
      return outcome;
    }
    self.restore_pending();
    if let TimerMode::PerQuestion { .. } = self.quiz.timer {
      self.remaining_secs = self.quiz.time_limit_for(self.question_order[self.position]);
    }
    self.explanation_showing = self.quiz.show_explanations;
    outcome
  }

  fn restore_pending(&mut self) {
    self.pending = self.answers[self.position]
      .and_then(RecordedAnswer::canonical)
      .and_then(|c| self.presentation_index_of(self.position, c));
  }

  fn finish(&mut self) {
    self.terminal = true;
    self.pending = None;
    self.explanation_showing = false;
    self.position = self.len();
    debug!(target: "quiz", quiz = %self.quiz.id, "Session finished");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::{choose_canonical, five_by_twenty, seeded};

  fn is_permutation(order: &[usize], n: usize) -> bool {
    let mut sorted = order.to_vec();
    sorted.sort_unstable();
    sorted == (0..n).collect::<Vec<_>>()
  }

  #[test]
  fn start_builds_valid_permutations() {
    let quiz = five_by_twenty();
    let session = Session::start(quiz.clone()).unwrap();
    assert!(is_permutation(session.question_order(), 5));
    for pos in 0..5 {
      let canonical = session.question_order()[pos];
      let n = quiz.questions[canonical].options.len();
      assert!(is_permutation(session.option_order(pos).unwrap(), n));
    }
    assert_eq!(session.position(), 0);
    assert_eq!(session.remaining_secs(), 30);
    assert!(!session.is_terminal());
  }

  #[test]
  fn empty_quiz_is_rejected() {
    let mut quiz = (*five_by_twenty()).clone();
    quiz.questions.clear();
    assert_eq!(Session::start(Arc::new(quiz)).unwrap_err(), InputError::EmptyQuiz);
  }

  #[test]
  fn shuffles_differ_across_starts() {
    let quiz = five_by_twenty();
    let first = Session::start(quiz.clone()).unwrap();
    let differs = (0..20).any(|_| {
      let next = Session::start(quiz.clone()).unwrap();
      next.question_order() != first.question_order()
        || (0..5).any(|p| next.option_order(p) != first.option_order(p))
    });
    assert!(differs, "20 starts produced the same presentation");
  }

  #[test]
  fn submit_records_canonical_index() {
    let mut session = Session::start_with_rng(five_by_twenty(), &mut seeded(7)).unwrap();
    let canonical_q = session.question_order()[0];
    let pres = session.presentation_index_of(0, 3).unwrap();
    session.select_answer(pres).unwrap();
    let outcome = session.submit_current().unwrap();

    assert_eq!(outcome.answer, RecordedAnswer::Chosen(3));
    assert_eq!(outcome.correct, five_by_twenty().questions[canonical_q].correct == 3);
    assert_eq!(session.answers()[0], Some(RecordedAnswer::Chosen(3)));
    assert_eq!(session.position(), 1);
    assert_eq!(session.pending(), None);
  }

  #[test]
  fn select_can_change_before_submit() {
    let mut session = Session::start(five_by_twenty()).unwrap();
    session.select_answer(0).unwrap();
    session.select_answer(2).unwrap();
    assert_eq!(session.pending(), Some(2));
    assert_eq!(session.position(), 0);
  }

  #[test]
  fn out_of_range_selection_leaves_state_alone() {
    let mut session = Session::start(five_by_twenty()).unwrap();
    session.select_answer(1).unwrap();
    let err = session.select_answer(9).unwrap_err();
    assert_eq!(err, InputError::OptionOutOfRange { index: 9, options: 4 });
    assert_eq!(session.pending(), Some(1));
  }

  #[test]
  fn manual_submit_without_selection_is_rejected() {
    let mut session = Session::start(five_by_twenty()).unwrap();
    assert_eq!(session.submit_current().unwrap_err(), InputError::NoSelection);
    assert_eq!(session.position(), 0);
    assert_eq!(session.answers()[0], None);
  }

  #[test]
  fn last_submit_terminates_and_further_input_is_rejected() {
    let mut session = Session::start(five_by_twenty()).unwrap();
    for i in 0..5 {
      session.select_answer(0).unwrap();
      let outcome = session.submit_current().unwrap();
      assert_eq!(outcome.finished, i == 4);
    }
    assert!(session.is_terminal());
    assert!(session.current_question().is_none());
    assert_eq!(session.select_answer(0).unwrap_err(), InputError::Terminal);
    assert_eq!(session.submit_current().unwrap_err(), InputError::Terminal);
    assert_eq!(session.tick(), Tick::Idle);
  }

  #[test]
  fn previous_restores_pending_from_canonical_answer() {
    let mut quiz = (*five_by_twenty()).clone();
    quiz.allow_back = true;
    let mut session = Session::start_with_rng(Arc::new(quiz), &mut seeded(11)).unwrap();
    choose_canonical(&mut session, 2);
    session.submit_current().unwrap();

    session.previous().unwrap();
    assert_eq!(session.position(), 0);
    assert_eq!(session.answers()[0], Some(RecordedAnswer::Chosen(2)));
    assert_eq!(session.pending(), session.presentation_index_of(0, 2));

    // moving forward again lands on an unanswered question with nothing pending
    session.submit_current().unwrap();
    assert_eq!(session.position(), 1);
    assert_eq!(session.pending(), None);
  }

  #[test]
  fn previous_requires_back_navigation() {
    let mut session = Session::start(five_by_twenty()).unwrap();
    session.select_answer(0).unwrap();
    session.submit_current().unwrap();
    assert_eq!(session.previous().unwrap_err(), InputError::BackNotAllowed);
  }

  #[test]
  fn previous_at_first_question_is_rejected() {
    let mut quiz = (*five_by_twenty()).clone();
    quiz.allow_back = true;
    let mut session = Session::start(Arc::new(quiz)).unwrap();
    assert_eq!(session.previous().unwrap_err(), InputError::AtFirstQuestion);
  }

  #[test]
  fn per_question_timeout_records_no_answer_and_restarts_countdown() {
    let mut session = Session::start(five_by_twenty()).unwrap();
    for _ in 0..29 {
      assert!(matches!(session.tick(), Tick::Counting(_)));
    }
    match session.tick() {
      Tick::Expired(outcome) => {
        assert_eq!(outcome.answer, RecordedAnswer::NoAnswer);
        assert!(outcome.timed_out);
        assert!(!outcome.correct);
      }
      other => panic!("expected expiry, got {other:?}"),
    }
    assert_eq!(session.position(), 1);
    assert_eq!(session.remaining_secs(), 30);
  }

  #[test]
  fn timeout_keeps_a_pending_selection() {
    let mut session = Session::start_with_rng(five_by_twenty(), &mut seeded(3)).unwrap();
    choose_canonical(&mut session, 1);
    let outcome = session.expire_current().unwrap();
    assert_eq!(outcome.answer, RecordedAnswer::Chosen(1));
    assert_eq!(session.answers()[0], Some(RecordedAnswer::Chosen(1)));
  }

  #[test]
  fn whole_quiz_timeout_finishes_everything() {
    let mut quiz = (*five_by_twenty()).clone();
    quiz.timer = TimerMode::WholeQuiz { secs: 3 };
    let mut session = Session::start_with_rng(Arc::new(quiz), &mut seeded(5)).unwrap();
    choose_canonical(&mut session, 0);
    session.submit_current().unwrap();
    assert_eq!(session.remaining_secs(), 3, "whole-quiz budget is not reset per question");

    session.select_answer(1).unwrap();
    session.tick();
    session.tick();
    let Tick::Expired(outcome) = session.tick() else { panic!("expected expiry") };
    assert!(outcome.finished);
    assert!(session.is_terminal());
    assert!(matches!(session.answers()[1], Some(RecordedAnswer::Chosen(_))));
    assert!(session.answers()[2..].iter().all(|a| *a == Some(RecordedAnswer::NoAnswer)));
  }

  #[test]
  fn explanation_pauses_the_countdown() {
    let mut quiz = (*five_by_twenty()).clone();
    quiz.show_explanations = true;
    let mut session = Session::start(Arc::new(quiz)).unwrap();
    session.select_answer(0).unwrap();
    session.submit_current().unwrap();

    assert!(session.explanation_showing());
    assert_eq!(session.tick(), Tick::Idle);
    assert_eq!(session.remaining_secs(), 30);
    assert_eq!(session.select_answer(0).unwrap_err(), InputError::ExplanationShowing);

    session.dismiss_explanation();
    assert_eq!(session.tick(), Tick::Counting(29));
  }

  #[test]
  fn retake_starts_from_scratch() {
    let quiz = five_by_twenty();
    let mut first = Session::start(quiz.clone()).unwrap();
    while !first.is_terminal() {
      first.select_answer(0).unwrap();
      first.submit_current().unwrap();
    }
    let retake = Session::start(quiz).unwrap();
    assert_eq!(retake.position(), 0);
    assert!(retake.answers().iter().all(Option::is_none));
    assert!(!retake.is_terminal());
    assert!(first.is_terminal());
  }
}
