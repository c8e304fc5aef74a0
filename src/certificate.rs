//! Certificate issuance: name prompt, local record, optional on-chain proof.
//!
//! `AwaitingName -> Submitting -> Issued`, or `AwaitingName -> Cancelled`.
//! The local record is appended before any chain work, so a wallet failure
//! never loses the certificate.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::progress::{CertificateRecord, ChainReceipt, ProgressStore};
use crate::scoring::{qualifies_onchain, QuizResult};
use crate::util::short_hash;
use crate::wallet::{explorer_url, faucet_url, TransactionIntent, Wallet, WalletError, MIN_FEE_BALANCE};

pub const MAX_NAME_CHARS: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IssueError {
  #[error("certificates are only issued for passed quizzes")]
  NotEligible,
  #[error("name must not be empty")]
  EmptyName,
  #[error("name must be at most {MAX_NAME_CHARS} characters")]
  NameTooLong,
  #[error("no certificate is waiting for a name")]
  NotAwaitingName,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuerState {
  AwaitingName,
  Submitting,
  Issued,
  Cancelled,
}

/// What happened on the chain side of an issuance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainOutcome {
  Confirmed { hash: String },
  /// Submitted, but confirmation did not arrive in time.
  Unconfirmed { hash: String },
  Skipped { reason: String },
  Rejected,
  InsufficientBalance { faucet_url: String },
  Failed { message: String },
}

impl ChainOutcome {
  pub fn hash(&self) -> Option<&str> {
    match self {
      ChainOutcome::Confirmed { hash } | ChainOutcome::Unconfirmed { hash } => Some(hash),
      _ => None,
    }
  }

  fn from_wallet_error(e: WalletError) -> Self {
    match e {
      WalletError::Rejected => ChainOutcome::Rejected,
      WalletError::InsufficientBalance => ChainOutcome::InsufficientBalance { faucet_url: faucet_url().to_string() },
      WalletError::NotConnected => ChainOutcome::Skipped { reason: "wallet not connected".into() },
      other => ChainOutcome::Failed { message: other.to_string() },
    }
  }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCertificate {
  pub record: CertificateRecord,
  /// False when the local append failed; the failure has been logged.
  pub stored: bool,
  pub chain: ChainOutcome,
  pub explorer_url: Option<String>,
}

/// Chain-side knobs taken from `Settings`.
#[derive(Clone, Debug)]
pub struct ChainOptions {
  pub network: String,
  pub confirm_timeout: Duration,
}

impl From<&Settings> for ChainOptions {
  fn from(s: &Settings) -> Self {
    Self { network: s.network.clone(), confirm_timeout: s.confirm_timeout }
  }
}

/// Trimmed display name, or why it was refused.
pub fn validate_display_name(raw: &str) -> Result<String, IssueError> {
  let name = raw.trim();
  if name.is_empty() {
    return Err(IssueError::EmptyName);
  }
  if name.chars().count() > MAX_NAME_CHARS {
    return Err(IssueError::NameTooLong);
  }
  Ok(name.to_string())
}

#[derive(Debug)]
pub struct CertificateIssuer {
  result: QuizResult,
  state: IssuerState,
}

impl CertificateIssuer {
  pub fn new(result: QuizResult) -> Result<Self, IssueError> {
    if !result.passed {
      return Err(IssueError::NotEligible);
    }
    Ok(Self { result, state: IssuerState::AwaitingName })
  }

  pub fn state(&self) -> IssuerState {
    self.state
  }

  /// Dismiss the name prompt. Nothing is recorded.
  pub fn cancel(&mut self) -> Result<(), IssueError> {
    if self.state != IssuerState::AwaitingName {
      return Err(IssueError::NotAwaitingName);
    }
    self.state = IssuerState::Cancelled;
    info!(target: "certificate", quiz = %self.result.quiz_id, "Certificate prompt cancelled");
    Ok(())
  }

  /// Append the certificate locally, then try the on-chain proof when eligible.
  /// Ends in `Issued` whatever the chain does.
  #[instrument(level = "info", skip(self, store, wallet, opts), fields(quiz = %self.result.quiz_id))]
  pub async fn confirm<W: Wallet>(
    &mut self,
    name: &str,
    store: &ProgressStore,
    wallet: &W,
    opts: &ChainOptions,
  ) -> Result<IssuedCertificate, IssueError> {
    if self.state != IssuerState::AwaitingName {
      return Err(IssueError::NotAwaitingName);
    }
    let display_name = validate_display_name(name)?;
    self.state = IssuerState::Submitting;

    let score = self.result.score;
    let record = CertificateRecord {
      id: Uuid::new_v4().to_string(),
      quiz_id: self.result.quiz_id.clone(),
      title: self.result.quiz_title.clone(),
      display_name,
      score: score.percent,
      raw_score: score.raw,
      max_score: score.max,
      xp: self.result.xp_reward,
      issued_at: Utc::now(),
      transaction_hash: None,
    };

    let stored = match store.record_certificate(&record) {
      Ok(()) => true,
      Err(e) => {
        error!(target: "certificate", id = %record.id, error = %e, "Failed to store certificate");
        false
      }
    };

    let chain = if stored {
      self.submit_proof(&record, store, wallet, opts).await
    } else {
      ChainOutcome::Skipped { reason: "certificate was not saved locally".into() }
    };

    self.state = IssuerState::Issued;
    let explorer = chain.hash().map(|h| explorer_url(h, &opts.network));
    info!(target: "certificate", id = %record.id, score = record.score, chain = ?chain, "Certificate issued");
    Ok(IssuedCertificate { record, stored, chain, explorer_url: explorer })
  }

  async fn submit_proof<W: Wallet>(
    &self,
    record: &CertificateRecord,
    store: &ProgressStore,
    wallet: &W,
    opts: &ChainOptions,
  ) -> ChainOutcome {
    if !qualifies_onchain(&self.result.score, self.result.onchain) {
      return ChainOutcome::Skipped { reason: "score does not qualify for on-chain proof".into() };
    }
    let Some(conn) = wallet.connection() else {
      return ChainOutcome::Skipped { reason: "wallet not connected".into() };
    };

    match wallet.balance(&conn.address).await {
      Ok(balance) if balance < MIN_FEE_BALANCE => {
        warn!(target: "certificate", balance, required = MIN_FEE_BALANCE, "Balance too low for fees");
        return ChainOutcome::InsufficientBalance { faucet_url: faucet_url().to_string() };
      }
      Ok(_) => {}
      Err(e) => return ChainOutcome::from_wallet_error(e),
    }

    let intent = TransactionIntent::self_transfer(&conn.address, Utc::now());
    let hash = match wallet.sign_and_submit(&intent).await {
      Ok(hash) => hash,
      Err(e) => {
        warn!(target: "certificate", error = %e, "Submission failed; certificate kept locally");
        return ChainOutcome::from_wallet_error(e);
      }
    };

    let waited = tokio::time::timeout(opts.confirm_timeout, wallet.wait_for_confirmation(&hash)).await;
    let (confirmed, outcome) = match waited {
      Ok(Ok(())) => (true, ChainOutcome::Confirmed { hash: hash.clone() }),
      Ok(Err(WalletError::Failed(message))) => (false, ChainOutcome::Failed { message }),
      Ok(Err(e)) => {
        warn!(target: "certificate", hash = %short_hash(&hash), error = %e, "Confirmation lookup failed");
        (false, ChainOutcome::Unconfirmed { hash: hash.clone() })
      }
      Err(_) => {
        warn!(target: "certificate", hash = %short_hash(&hash), timeout = ?opts.confirm_timeout, "Confirmation timed out");
        (false, ChainOutcome::Unconfirmed { hash: hash.clone() })
      }
    };

    let receipt = ChainReceipt {
      certificate_id: record.id.clone(),
      transaction_hash: hash,
      confirmed,
      recorded_at: Utc::now(),
    };
    if let Err(e) = store.record_receipt(&receipt) {
      error!(target: "certificate", id = %record.id, error = %e, "Failed to store chain receipt");
    }
    outcome
  }
}
