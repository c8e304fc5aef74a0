//! Progress store: the append-only certificate list, the streak pair, and the
//! ProgressRecord derived from them.
//!
//! Reads never fail: missing or corrupted values fall back to the zero-state and
//! are logged. Every successful write bumps a revision on a `watch` channel so the
//! watcher can republish without waiting for its poll.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::domain::default_xp_reward;
use crate::storage::{read_json, write_json, KvStore, StorageError};

pub mod watcher;

pub const CERTIFICATES_KEY: &str = "certificates";
pub const RECEIPTS_KEY: &str = "chainReceipts";
pub const STREAK_KEY: &str = "streakDays";
pub const LAST_ACTIVITY_KEY: &str = "lastLearningDate";
pub const PROFILE_KEY: &str = "userProfile";

pub const XP_PER_LEVEL: u64 = 100;
pub const DEFAULT_DISPLAY_NAME: &str = "CryptoLearner";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
  pub id: String,
  #[serde(default)]
  pub quiz_id: String,
  #[serde(alias = "courseName")]
  pub title: String,
  #[serde(alias = "userName")]
  pub display_name: String,
  /// Percentage.
  pub score: u8,
  #[serde(default)]
  pub raw_score: u32,
  #[serde(default)]
  pub max_score: u32,
  #[serde(default = "default_xp_reward")]
  pub xp: u32,
  #[serde(alias = "date")]
  pub issued_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub transaction_hash: Option<String>,
}

/// Transaction metadata for a certificate, kept apart so certificates stay immutable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChainReceipt {
  pub certificate_id: String,
  pub transaction_hash: String,
  pub confirmed: bool,
  pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
struct Profile {
  #[serde(default)]
  username: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
  pub total_xp: u64,
  pub level: u32,
  pub xp_into_level: u64,
  pub xp_to_next_level: u64,
  pub certificates: usize,
  pub perfect_scores: usize,
  pub completed_quizzes: Vec<String>,
  pub streak_days: u32,
  pub last_activity: Option<NaiveDate>,
}

impl Default for ProgressRecord {
  fn default() -> Self {
    ProgressRecord::derive(&[], 0, None)
  }
}

impl ProgressRecord {
  /// Pure derivation: the same inputs always give the same record.
  pub fn derive(certificates: &[CertificateRecord], streak_days: u32, last_activity: Option<NaiveDate>) -> Self {
    let total_xp: u64 = certificates.iter().map(|c| u64::from(c.xp)).sum();
    let mut completed_quizzes: Vec<String> = Vec::new();
    for cert in certificates {
      let key = if cert.quiz_id.is_empty() { &cert.title } else { &cert.quiz_id };
      if !completed_quizzes.contains(key) {
        completed_quizzes.push(key.clone());
      }
    }
    ProgressRecord {
      total_xp,
      level: level_for(total_xp),
      xp_into_level: total_xp % XP_PER_LEVEL,
      xp_to_next_level: XP_PER_LEVEL - total_xp % XP_PER_LEVEL,
      certificates: certificates.len(),
      perfect_scores: certificates.iter().filter(|c| c.score == 100).count(),
      completed_quizzes,
      streak_days,
      last_activity,
    }
  }
}

/// `floor(xp / 100) + 1`
pub fn level_for(xp: u64) -> u32 {
  u32::try_from(xp / XP_PER_LEVEL).unwrap_or(u32::MAX - 1) + 1
}

/// Streak after a learning activity on `today`.
pub fn next_streak(current: u32, last_activity: Option<NaiveDate>, today: NaiveDate) -> u32 {
  match last_activity {
    Some(last) if last == today => current,
    Some(last) if Some(last) == today.pred_opt() => current.saturating_add(1),
    _ => 1,
  }
}

/// ISO dates, plus the `Wed Oct 16 2026` shape older profiles stored.
fn parse_activity_date(raw: &str) -> Option<NaiveDate> {
  let raw = raw.trim().trim_matches('"');
  raw.parse::<NaiveDate>()
    .ok()
    .or_else(|| NaiveDate::parse_from_str(raw, "%a %b %d %Y").ok())
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Badge {
  pub id: &'static str,
  pub name: &'static str,
  pub requirement: &'static str,
  pub earned: bool,
  /// Percent towards the badge while not yet earned.
  pub progress: Option<u8>,
}

fn badge(id: &'static str, name: &'static str, requirement: &'static str, have: usize, need: usize) -> Badge {
  let earned = have >= need;
  Badge {
    id,
    name,
    requirement,
    earned,
    progress: (!earned).then(|| crate::util::percent_round_half_up(have as u32, need as u32)),
  }
}

pub fn badges(record: &ProgressRecord) -> Vec<Badge> {
  let streak = record.streak_days as usize;
  let all_perfect = record.certificates >= 3 && record.perfect_scores == record.certificates;
  vec![
    badge("first_steps", "First Steps", "Earn 1 certificate", record.certificates, 1),
    badge("knowledge_seeker", "Knowledge Seeker", "Earn 3 certificates", record.certificates, 3),
    badge("quiz_master", "Quiz Master", "Earn 5 certificates", record.certificates, 5),
    Badge {
      id: "perfect_student",
      name: "Perfect Student",
      requirement: "100% on every certificate (min 3)",
      earned: all_perfect,
      progress: (!all_perfect && record.certificates > 0)
        .then(|| crate::util::percent_round_half_up(record.perfect_scores as u32, record.certificates as u32)),
    },
    badge("streak_keeper", "Streak Keeper", "7-day learning streak", streak, 7),
    badge("dedication_master", "Dedication Master", "30-day learning streak", streak, 30),
  ]
}

#[derive(Clone)]
pub struct ProgressStore {
  kv: Arc<dyn KvStore>,
  changes: Arc<watch::Sender<u64>>,
}

impl ProgressStore {
  pub fn new(kv: Arc<dyn KvStore>) -> Self {
    let (tx, _rx) = watch::channel(0u64);
    Self { kv, changes: Arc::new(tx) }
  }

  /// Revision counter bumped after every successful write.
  pub fn subscribe(&self) -> watch::Receiver<u64> {
    self.changes.subscribe()
  }

  fn notify(&self) {
    self.changes.send_modify(|rev| *rev += 1);
  }

  /// Raw list entries; anything that is not a JSON array reads as empty.
  fn raw_list(&self, key: &str) -> Vec<Value> {
    match read_json::<Value>(self.kv.as_ref(), key) {
      Ok(Some(Value::Array(items))) => items,
      Ok(None) => Vec::new(),
      Ok(Some(other)) => {
        warn!(target: "progress", %key, kind = %json_kind(&other), "Stored list is not an array; treating as empty");
        Vec::new()
      }
      Err(e) => {
        warn!(target: "progress", %key, error = %e, "Stored list unreadable; treating as empty");
        Vec::new()
      }
    }
  }

  fn typed_list<T: serde::de::DeserializeOwned>(&self, key: &str) -> Vec<T> {
    self
      .raw_list(key)
      .into_iter()
      .enumerate()
      .filter_map(|(i, v)| match serde_json::from_value::<T>(v) {
        Ok(item) => Some(item),
        Err(e) => {
          warn!(target: "progress", %key, index = i, error = %e, "Skipping malformed entry");
          None
        }
      })
      .collect()
  }

  fn append(&self, key: &str, item: Value) -> Result<(), StorageError> {
    let mut items = self.raw_list(key);
    items.push(item);
    write_json(self.kv.as_ref(), key, &items)?;
    self.notify();
    Ok(())
  }

  pub fn certificates(&self) -> Vec<CertificateRecord> {
    self.typed_list(CERTIFICATES_KEY)
  }

  /// Append-only; existing entries keep their order, duplicates are allowed.
  #[instrument(level = "info", skip(self, record), fields(id = %record.id, quiz = %record.quiz_id))]
  pub fn record_certificate(&self, record: &CertificateRecord) -> Result<(), StorageError> {
    self.append(CERTIFICATES_KEY, serde_json::to_value(record)?)?;
    info!(target: "progress", id = %record.id, score = record.score, xp = record.xp, "Certificate recorded");
    Ok(())
  }

  pub fn receipts(&self) -> Vec<ChainReceipt> {
    self.typed_list(RECEIPTS_KEY)
  }

  #[cfg(test)]
  pub fn receipt_for(&self, certificate_id: &str) -> Option<ChainReceipt> {
    latest_receipt(&self.receipts(), certificate_id).cloned()
  }

  pub fn record_receipt(&self, receipt: &ChainReceipt) -> Result<(), StorageError> {
    self.append(RECEIPTS_KEY, serde_json::to_value(receipt)?)?;
    info!(target: "progress", certificate = %receipt.certificate_id, confirmed = receipt.confirmed, "Chain receipt recorded");
    Ok(())
  }

  /// Certificates paired with their latest receipt, hash attached, for display.
  /// Reads each list once.
  pub fn certificates_with_receipts(&self) -> Vec<(CertificateRecord, Option<ChainReceipt>)> {
    let receipts = self.receipts();
    self
      .certificates()
      .into_iter()
      .map(|mut cert| {
        let receipt = latest_receipt(&receipts, &cert.id).cloned();
        if cert.transaction_hash.is_none() {
          cert.transaction_hash = receipt.as_ref().map(|r| r.transaction_hash.clone());
        }
        (cert, receipt)
      })
      .collect()
  }

  fn streak_pair(&self) -> (u32, Option<NaiveDate>) {
    let streak = match self.kv.get(STREAK_KEY) {
      Ok(Some(raw)) => raw.trim().trim_matches('"').parse::<u32>().unwrap_or_else(|_| {
        warn!(target: "progress", value = %crate::util::trunc_for_log(&raw, 40), "Unparsable streak; using 0");
        0
      }),
      Ok(None) => 0,
      Err(e) => {
        warn!(target: "progress", error = %e, "Streak unreadable; using 0");
        0
      }
    };
    let last = match self.kv.get(LAST_ACTIVITY_KEY) {
      Ok(Some(raw)) => parse_activity_date(&raw),
      Ok(None) => None,
      Err(e) => {
        warn!(target: "progress", error = %e, "Last activity unreadable");
        None
      }
    };
    (streak, last)
  }

  /// Derived from storage on every call; never writes.
  pub fn current_progress(&self) -> ProgressRecord {
    let (streak, last) = self.streak_pair();
    ProgressRecord::derive(&self.certificates(), streak, last)
  }

  /// The "learned today" event. Returns the streak after the update.
  #[instrument(level = "debug", skip(self))]
  pub fn record_activity(&self, today: NaiveDate) -> Result<u32, StorageError> {
    let (current, last) = self.streak_pair();
    // Activity today always means a streak of at least one day.
    let next = next_streak(current, last, today).max(1);
    if last == Some(today) && next == current {
      return Ok(next);
    }
    self.kv.set(STREAK_KEY, &next.to_string())?;
    self.kv.set(LAST_ACTIVITY_KEY, &today.to_string())?;
    self.notify();
    debug!(target: "progress", streak = next, "Activity recorded");
    Ok(next)
  }

  pub fn profile_name(&self) -> Option<String> {
    match read_json::<Profile>(self.kv.as_ref(), PROFILE_KEY) {
      Ok(p) => p.and_then(|p| p.username).filter(|n| !n.trim().is_empty()),
      Err(e) => {
        warn!(target: "progress", error = %e, "Profile unreadable");
        None
      }
    }
  }

  /// Name to pre-fill the certificate prompt with.
  pub fn default_display_name(&self) -> String {
    self.profile_name().unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())
  }

  pub fn set_profile_name(&self, name: &str) -> Result<(), StorageError> {
    let mut profile = read_json::<Profile>(self.kv.as_ref(), PROFILE_KEY).ok().flatten().unwrap_or_default();
    profile.username = Some(name.trim().to_string());
    write_json(self.kv.as_ref(), PROFILE_KEY, &profile)?;
    self.notify();
    Ok(())
  }

  /// Forget the stored profile; the prompt falls back to the default name.
  pub fn clear_profile(&self) -> Result<(), StorageError> {
    self.kv.remove(PROFILE_KEY)?;
    self.notify();
    info!(target: "progress", "Profile cleared");
    Ok(())
  }
}

fn latest_receipt<'a>(receipts: &'a [ChainReceipt], certificate_id: &str) -> Option<&'a ChainReceipt> {
  receipts.iter().rev().find(|r| r.certificate_id == certificate_id)
}

fn json_kind(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
