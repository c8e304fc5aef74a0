//! Quiz runner: the one active session, its countdown task, and the pending
//! certificate prompt.
//!
//! At most one ticker task exists. In per-question mode any transition that
//! changes the question aborts the previous ticker before spawning the next;
//! a whole-quiz countdown keeps one ticker for the entire attempt. A generation
//! counter makes a ticker that was aborted mid-tick a no-op.

use std::{sync::Arc, time::Duration};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, info, instrument, warn};

use crate::certificate::{CertificateIssuer, ChainOptions, IssueError, IssuedCertificate, IssuerState};
use crate::domain::{Quiz, TimerMode};
use crate::progress::ProgressStore;
use crate::scoring::{final_result, QuizResult};
use crate::session::{InputError, Session, SessionView, SubmitOutcome, Tick};
use crate::wallet::Wallet;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("no quiz in progress")]
    NoSession,
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Issue(#[from] IssueError),
}

/// Pushed to live clients (WebSocket) as the countdown runs.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunnerEvent {
    Tick { position: usize, remaining_secs: u32 },
    Expired { outcome: SubmitOutcome },
    Finished { result: QuizResult },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReply {
    pub outcome: SubmitOutcome,
    pub session: SessionView,
    pub result: Option<QuizResult>,
}

#[derive(Default)]
struct RunnerState {
    session: Option<Session>,
    last_quiz: Option<Arc<Quiz>>,
    last_result: Option<QuizResult>,
    issuer: Option<CertificateIssuer>,
    /// Set while a confirm is in flight with the issuer taken out.
    submitting: bool,
    /// Bumped on every start and abandon; an in-flight confirm only hands its
    /// issuer back to the attempt it was taken from.
    attempt: u64,
    generation: u64,
    ticker: Option<JoinHandle<()>>,
}

impl RunnerState {
    fn stop_ticker(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    /// Score a terminal session and open the certificate prompt when passed.
    fn finalize(&mut self) -> Option<QuizResult> {
        let result = self.session.as_ref().and_then(final_result)?;
        self.issuer = CertificateIssuer::new(result.clone()).ok();
        info!(
            target: "quiz",
            quiz = %result.quiz_id,
            raw = result.score.raw,
            max = result.score.max,
            percent = result.score.percent,
            passed = result.passed,
            "Quiz finished"
        );
        self.last_result = Some(result.clone());
        Some(result)
    }
}

#[derive(Clone)]
pub struct QuizRunner {
    inner: Arc<Mutex<RunnerState>>,
    store: ProgressStore,
    events: broadcast::Sender<RunnerEvent>,
}

impl QuizRunner {
    pub fn new(store: ProgressStore) -> Self {
        let (events, _rx) = broadcast::channel(64);
        Self { inner: Arc::new(Mutex::new(RunnerState::default())), store, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.events.subscribe()
    }

    #[cfg(test)]
    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// Begin a fresh attempt, replacing any session in progress. Counts as
    /// learning activity for the streak.
    #[instrument(level = "info", skip(self, quiz), fields(quiz = %quiz.id))]
    pub async fn start(&self, quiz: Arc<Quiz>) -> Result<SessionView, RunnerError> {
        self.start_on(quiz, Local::now().date_naive()).await
    }

    async fn start_on(&self, quiz: Arc<Quiz>, today: NaiveDate) -> Result<SessionView, RunnerError> {
        let session = Session::start(quiz.clone())?;
        if let Err(e) = self.store.record_activity(today) {
            warn!(target: "progress", error = %e, "Failed to record learning activity");
        }

        let mut st = self.inner.lock().await;
        st.stop_ticker();
        let view = session.view();
        st.session = Some(session);
        st.last_quiz = Some(quiz);
        st.last_result = None;
        st.issuer = None;
        st.submitting = false;
        st.attempt += 1;
        self.spawn_ticker(&mut st);
        info!(target: "quiz", quiz = %view.quiz_id, total = view.total, "Quiz started");
        Ok(view)
    }

    /// Start over on the most recent quiz with a new shuffle.
    pub async fn retake(&self) -> Result<SessionView, RunnerError> {
        let quiz = self.inner.lock().await.last_quiz.clone().ok_or(RunnerError::NoSession)?;
        self.start(quiz).await
    }

    pub async fn select(&self, option: usize) -> Result<SessionView, RunnerError> {
        let mut st = self.inner.lock().await;
        let session = st.session.as_mut().ok_or(RunnerError::NoSession)?;
        session.select_answer(option)?;
        Ok(session.view())
    }

    #[instrument(level = "info", skip(self))]
    pub async fn submit(&self) -> Result<SubmitReply, RunnerError> {
        let mut st = self.inner.lock().await;
        let session = st.session.as_mut().ok_or(RunnerError::NoSession)?;
        let outcome = session.submit_current()?;
        let view = session.view();
        debug!(target: "quiz", question = %outcome.question_id, correct = outcome.correct, "Answer submitted");

        let result = if outcome.finished {
            st.stop_ticker();
            let result = st.finalize();
            if let Some(result) = &result {
                let _ = self.events.send(RunnerEvent::Finished { result: result.clone() });
            }
            result
        } else {
            self.restart_question_ticker(&mut st);
            None
        };
        Ok(SubmitReply { outcome, session: view, result })
    }

    pub async fn previous(&self) -> Result<SessionView, RunnerError> {
        let mut st = self.inner.lock().await;
        let session = st.session.as_mut().ok_or(RunnerError::NoSession)?;
        session.previous()?;
        let view = session.view();
        self.restart_question_ticker(&mut st);
        Ok(view)
    }

    pub async fn dismiss_explanation(&self) -> Result<SessionView, RunnerError> {
        let mut st = self.inner.lock().await;
        let session = st.session.as_mut().ok_or(RunnerError::NoSession)?;
        session.dismiss_explanation();
        Ok(session.view())
    }

    pub async fn snapshot(&self) -> Option<SessionView> {
        self.inner.lock().await.session.as_ref().map(Session::view)
    }

    pub async fn last_result(&self) -> Option<QuizResult> {
        self.inner.lock().await.last_result.clone()
    }

    pub async fn certificate_state(&self) -> Option<IssuerState> {
        let st = self.inner.lock().await;
        if st.submitting {
            return Some(IssuerState::Submitting);
        }
        st.issuer.as_ref().map(CertificateIssuer::state)
    }

    /// Stop the countdown and drop the session. Nothing is scored or stored.
    #[instrument(level = "info", skip(self))]
    pub async fn abandon(&self) -> bool {
        let mut st = self.inner.lock().await;
        st.stop_ticker();
        st.issuer = None;
        st.submitting = false;
        st.attempt += 1;
        let had = st.session.take().is_some();
        if had {
            info!(target: "quiz", "Quiz abandoned");
        }
        had
    }

    /// Confirm the certificate prompt for the last passed attempt.
    #[instrument(level = "info", skip(self, wallet, opts))]
    pub async fn issue_certificate<W: Wallet>(
        &self,
        name: &str,
        wallet: &W,
        opts: &ChainOptions,
    ) -> Result<IssuedCertificate, RunnerError> {
        let (mut issuer, attempt) = {
            let mut st = self.inner.lock().await;
            match st.issuer.take() {
                Some(issuer) if issuer.state() == IssuerState::AwaitingName => {
                    st.submitting = true;
                    (issuer, st.attempt)
                }
                Some(issuer) => {
                    st.issuer = Some(issuer);
                    return Err(IssueError::NotAwaitingName.into());
                }
                None => return Err(Self::missing_issuer(&st).into()),
            }
        };

        let issued = issuer.confirm(name, &self.store, wallet, opts).await;

        let mut st = self.inner.lock().await;
        if st.attempt == attempt && st.issuer.is_none() {
            st.submitting = false;
            st.issuer = Some(issuer);
        } else {
            debug!(target: "certificate", "Attempt moved on while submitting; prompt left as is");
        }
        Ok(issued?)
    }

    pub async fn cancel_certificate(&self) -> Result<(), RunnerError> {
        let mut st = self.inner.lock().await;
        match st.issuer.as_mut() {
            Some(issuer) => Ok(issuer.cancel()?),
            None => Err(Self::missing_issuer(&st).into()),
        }
    }

    fn missing_issuer(st: &RunnerState) -> IssueError {
        match &st.last_result {
            Some(result) if !result.passed => IssueError::NotEligible,
            _ => IssueError::NotAwaitingName,
        }
    }

    /// Per-question countdowns start fresh on the new question. The whole-quiz
    /// countdown keeps running on its original schedule.
    fn restart_question_ticker(&self, st: &mut RunnerState) {
        let whole_quiz = st
            .session
            .as_ref()
            .is_some_and(|s| matches!(s.quiz().timer, TimerMode::WholeQuiz { .. }));
        if whole_quiz && st.ticker.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        st.stop_ticker();
        self.spawn_ticker(st);
    }

    fn spawn_ticker(&self, st: &mut RunnerState) {
        if st.session.as_ref().map_or(true, Session::is_terminal) {
            return;
        }
        let generation = st.generation;
        let inner = self.inner.clone();
        let events = self.events.clone();
        st.ticker = Some(tokio::spawn(run_ticker(inner, events, generation)));
    }

    #[cfg(test)]
    async fn session(&self) -> Option<Session> {
        self.inner.lock().await.session.clone()
    }

    #[cfg(test)]
    async fn ticker_running(&self) -> bool {
        self.inner.lock().await.ticker.as_ref().is_some_and(|h| !h.is_finished())
    }
}

async fn run_ticker(inner: Arc<Mutex<RunnerState>>, events: broadcast::Sender<RunnerEvent>, generation: u64) {
    let mut every = time::interval_at(Instant::now() + TICK, TICK);
    loop {
        every.tick().await;
        let mut st = inner.lock().await;
        if st.generation != generation {
            break;
        }
        let Some(session) = st.session.as_mut() else { break };
        match session.tick() {
            Tick::Counting(remaining_secs) => {
                let _ = events.send(RunnerEvent::Tick { position: session.position(), remaining_secs });
            }
            Tick::Expired(outcome) => {
                let finished = outcome.finished;
                info!(target: "quiz", question = %outcome.question_id, finished, "Time ran out");
                let _ = events.send(RunnerEvent::Expired { outcome });
                if finished {
                    if let Some(result) = st.finalize() {
                        let _ = events.send(RunnerEvent::Finished { result });
                    }
                    st.ticker = None;
                    break;
                }
            }
            Tick::Idle => {
                if session.is_terminal() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::certificate::ChainOutcome;
    use crate::storage::MemoryStore;
    use crate::testutil::five_by_twenty;
    use crate::wallet::{DisconnectedWallet, TransactionIntent, WalletConnection, WalletError};

    /// Connected wallet whose transactions are accepted but never confirmed.
    struct StalledWallet;

    impl Wallet for StalledWallet {
        fn connection(&self) -> Option<WalletConnection> {
            Some(WalletConnection { address: "0xa11ce".into(), network: "devnet".into() })
        }

        async fn balance(&self, _address: &str) -> Result<u64, WalletError> {
            Ok(1_000_000)
        }

        async fn sign_and_submit(&self, _intent: &TransactionIntent) -> Result<String, WalletError> {
            Ok("0xfeedbeef".into())
        }

        async fn wait_for_confirmation(&self, _hash: &str) -> Result<(), WalletError> {
            std::future::pending().await
        }
    }

    fn runner() -> QuizRunner {
        QuizRunner::new(ProgressStore::new(Arc::new(MemoryStore::new())))
    }

    fn opts() -> ChainOptions {
        ChainOptions { network: "devnet".into(), confirm_timeout: Duration::from_secs(30) }
    }

    /// Select the right (or a wrong) option for the current question through the runner.
    async fn answer(runner: &QuizRunner, right: bool) -> SubmitReply {
        let session = runner.session().await.unwrap();
        let pos = session.position();
        let question = &session.quiz().questions[session.question_order()[pos]];
        let target = if right { question.correct } else { (question.correct + 1) % question.options.len() };
        let pres = session.presentation_index_of(pos, target).unwrap();
        runner.select(pres).await.unwrap();
        runner.submit().await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_countdown_runs_across_restarts() {
        let runner = runner();
        runner.start(five_by_twenty()).await.unwrap();
        time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(runner.snapshot().await.unwrap().remaining_secs, 28);

        answer(&runner, true).await;
        answer(&runner, true).await;
        runner.start(five_by_twenty()).await.unwrap();
        runner.start(five_by_twenty()).await.unwrap();
        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(runner.snapshot().await.unwrap().remaining_secs, 27);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_advances_and_pushes_events() {
        let runner = runner();
        let mut events = runner.subscribe();
        runner.start(five_by_twenty()).await.unwrap();
        time::sleep(Duration::from_millis(30_500)).await;

        let view = runner.snapshot().await.unwrap();
        assert_eq!(view.position, 1);
        assert_eq!(view.remaining_secs, 30);

        let mut expired = None;
        while let Ok(event) = events.try_recv() {
            if let RunnerEvent::Expired { outcome } = event {
                expired = Some(outcome);
            }
        }
        let outcome = expired.unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.correct);
    }

    #[tokio::test(start_paused = true)]
    async fn whole_quiz_expiry_finishes_and_scores() {
        let mut quiz = (*five_by_twenty()).clone();
        quiz.timer = TimerMode::WholeQuiz { secs: 5 };
        let runner = runner();
        runner.start(Arc::new(quiz)).await.unwrap();
        answer(&runner, true).await;
        time::sleep(Duration::from_secs(6)).await;

        let view = runner.snapshot().await.unwrap();
        assert!(view.terminal);
        let result = runner.last_result().await.unwrap();
        assert_eq!(result.score.raw, 20);
        assert!(!result.passed);
        assert!(!runner.ticker_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_stops_the_timer_and_records_nothing() {
        let runner = runner();
        let mut events = runner.subscribe();
        runner.start(five_by_twenty()).await.unwrap();
        answer(&runner, true).await;
        time::sleep(Duration::from_millis(1500)).await;

        assert!(runner.abandon().await);
        while events.try_recv().is_ok() {}
        time::sleep(Duration::from_secs(40)).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        assert!(runner.snapshot().await.is_none());
        assert!(runner.last_result().await.is_none());
        assert!(!runner.ticker_running().await);
        assert_eq!(runner.store().current_progress().certificates, 0);
        assert_eq!(runner.submit().await.unwrap_err(), RunnerError::NoSession);
        assert!(!runner.abandon().await);
    }

    #[tokio::test(start_paused = true)]
    async fn passing_run_issues_a_local_certificate() {
        let runner = runner();
        runner.start(five_by_twenty()).await.unwrap();
        let mut last = None;
        for right in [true, true, true, true, false] {
            last = Some(answer(&runner, right).await);
        }
        let reply = last.unwrap();
        assert!(reply.outcome.finished);
        assert!(reply.session.terminal);
        let result = reply.result.unwrap();
        assert_eq!(result.score.percent, 80);
        assert!(result.passed);
        assert_eq!(runner.certificate_state().await, Some(IssuerState::AwaitingName));

        let issued = runner.issue_certificate("Ada", &DisconnectedWallet, &opts()).await.unwrap();
        assert!(matches!(issued.chain, ChainOutcome::Skipped { .. }));
        assert_eq!(runner.certificate_state().await, Some(IssuerState::Issued));

        let progress = runner.store().current_progress();
        assert_eq!(progress.certificates, 1);
        assert_eq!(progress.total_xp, 50);
        assert_eq!(progress.streak_days, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_run_has_no_certificate_prompt() {
        let runner = runner();
        runner.start(five_by_twenty()).await.unwrap();
        for right in [true, false, false, true, false] {
            answer(&runner, right).await;
        }
        assert_eq!(runner.certificate_state().await, None);
        assert_eq!(
            runner.issue_certificate("Ada", &DisconnectedWallet, &opts()).await.unwrap_err(),
            RunnerError::Issue(IssueError::NotEligible)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_then_retake_starts_fresh() {
        let runner = runner();
        runner.start(five_by_twenty()).await.unwrap();
        for _ in 0..5 {
            answer(&runner, true).await;
        }
        runner.cancel_certificate().await.unwrap();
        assert_eq!(runner.certificate_state().await, Some(IssuerState::Cancelled));

        let view = runner.retake().await.unwrap();
        assert_eq!(view.position, 0);
        assert_eq!(view.answered, 0);
        assert!(!view.terminal);
        assert!(runner.last_result().await.is_none());
        assert_eq!(runner.certificate_state().await, None);
        assert_eq!(runner.store().current_progress().certificates, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn whole_quiz_countdown_keeps_pace_while_navigating() {
        let mut quiz = (*five_by_twenty()).clone();
        quiz.timer = TimerMode::WholeQuiz { secs: 5 };
        quiz.allow_back = true;
        let runner = runner();
        runner.start(Arc::new(quiz)).await.unwrap();
        answer(&runner, true).await;

        for round in 0..6 {
            time::sleep(Duration::from_millis(450)).await;
            let _ = runner.previous().await;
            time::sleep(Duration::from_millis(450)).await;
            let _ = runner.submit().await;
            if round == 2 {
                assert_eq!(runner.snapshot().await.unwrap().remaining_secs, 3);
            }
        }
        time::sleep(Duration::from_secs(1)).await;

        let view = runner.snapshot().await.unwrap();
        assert!(view.terminal);
        assert_eq!(runner.last_result().await.unwrap().score.answered, 5);
        assert!(!runner.ticker_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn late_chain_result_leaves_a_newer_prompt_alone() {
        let runner = runner();
        runner.start(five_by_twenty()).await.unwrap();
        for _ in 0..5 {
            answer(&runner, true).await;
        }
        let first = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.issue_certificate("Ada", &StalledWallet, &opts()).await })
        };
        while runner.certificate_state().await != Some(IssuerState::Submitting) {
            tokio::task::yield_now().await;
        }

        runner.start(five_by_twenty()).await.unwrap();
        assert_eq!(runner.certificate_state().await, None);
        for _ in 0..5 {
            answer(&runner, true).await;
        }
        assert_eq!(runner.certificate_state().await, Some(IssuerState::AwaitingName));

        let late = first.await.unwrap().unwrap();
        assert!(matches!(late.chain, ChainOutcome::Unconfirmed { .. }));
        assert_eq!(runner.certificate_state().await, Some(IssuerState::AwaitingName));

        runner.issue_certificate("Grace", &DisconnectedWallet, &opts()).await.unwrap();
        assert_eq!(runner.certificate_state().await, Some(IssuerState::Issued));
        assert_eq!(runner.store().current_progress().certificates, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_during_submission_clears_the_prompt() {
        let runner = runner();
        runner.start(five_by_twenty()).await.unwrap();
        for _ in 0..5 {
            answer(&runner, true).await;
        }
        let pending = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.issue_certificate("Ada", &StalledWallet, &opts()).await })
        };
        while runner.certificate_state().await != Some(IssuerState::Submitting) {
            tokio::task::yield_now().await;
        }

        runner.abandon().await;
        assert_eq!(runner.certificate_state().await, None);
        pending.await.unwrap().unwrap();
        assert_eq!(runner.certificate_state().await, None);
        assert_eq!(runner.store().current_progress().certificates, 1);
    }

    #[tokio::test]
    async fn streak_counts_starts_on_consecutive_days() {
        let runner = runner();
        let day = |s: &str| s.parse::<NaiveDate>().unwrap();
        runner.start_on(five_by_twenty(), day("2026-10-14")).await.unwrap();
        runner.start_on(five_by_twenty(), day("2026-10-15")).await.unwrap();
        runner.start_on(five_by_twenty(), day("2026-10-15")).await.unwrap();
        assert_eq!(runner.store().current_progress().streak_days, 2);
        runner.abandon().await;
    }

    #[tokio::test]
    async fn operations_without_a_session_are_rejected() {
        let runner = runner();
        assert_eq!(runner.select(0).await.unwrap_err(), RunnerError::NoSession);
        assert_eq!(runner.previous().await.unwrap_err(), RunnerError::NoSession);
        assert_eq!(runner.retake().await.unwrap_err(), RunnerError::NoSession);
        assert!(runner.snapshot().await.is_none());
    }
}
