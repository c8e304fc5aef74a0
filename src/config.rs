//! Runtime settings (environment) and the optional TOML content catalog.
//!
//! See `Settings` for the environment variables and `CatalogConfig` for the
//! expected catalog schema.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{Course, Quiz};

/// Catalog file accepted via CATALOG_PATH.
///
/// ```toml
/// [[quizzes]]
/// id = "rust-basics"
/// title = "Rust Basics"
/// pass = { percent = 80 }
/// timer = { per_question = { default_secs = 30 } }
///
/// [[quizzes.questions]]
/// id = "rb-1"
/// prompt = "Which keyword declares an immutable binding?"
/// options = ["let", "mut", "var"]
/// correct = 0
/// points = 20
/// ```
#[derive(Clone, Debug, Deserialize, Default)]
pub struct CatalogConfig {
  #[serde(default)]
  pub quizzes: Vec<Quiz>,
  #[serde(default)]
  pub courses: Vec<Course>,
}

pub fn parse_catalog(text: &str) -> Result<CatalogConfig, toml::de::Error> {
  toml::from_str::<CatalogConfig>(text)
}

/// Attempt to load `CatalogConfig` from CATALOG_PATH. On any parsing/IO error, returns None.
pub fn load_catalog_config_from_env() -> Option<CatalogConfig> {
  let path = std::env::var("CATALOG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_catalog(&s) {
      Ok(cfg) => {
        info!(target: "quizchain_backend", %path, quizzes = cfg.quizzes.len(), courses = cfg.courses.len(), "Loaded catalog (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "quizchain_backend", %path, error = %e, "Failed to parse TOML catalog");
        None
      }
    },
    Err(e) => {
      error!(target: "quizchain_backend", %path, error = %e, "Failed to read TOML catalog file");
      None
    }
  }
}

/// Process settings. Every field has a default so the app starts with an empty env.
///
///   PORT                        : u16 (default 3000)
///   STORE_PATH                  : profile store file (default ./data/profile.json)
///   NODE_URL                    : fullnode REST base (default devnet)
///   SIGNER_URL                  : signer bridge; enables on-chain submission when set
///   WALLET_ADDRESS              : account the signer bridge signs for
///   NETWORK                     : explorer network name (default "devnet")
///   PROGRESS_POLL_SECS          : fallback progress poll period (default 10)
///   CHAIN_CONFIRM_TIMEOUT_SECS  : bound on waiting for confirmation (default 30)
#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub store_path: PathBuf,
  pub node_url: String,
  pub signer_url: Option<String>,
  pub wallet_address: Option<String>,
  pub network: String,
  pub progress_poll: Duration,
  pub confirm_timeout: Duration,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      port: 3000,
      store_path: PathBuf::from("./data/profile.json"),
      node_url: "https://fullnode.devnet.aptoslabs.com/v1".into(),
      signer_url: None,
      wallet_address: None,
      network: "devnet".into(),
      progress_poll: Duration::from_secs(10),
      confirm_timeout: Duration::from_secs(30),
    }
  }
}

impl Settings {
  pub fn from_env() -> Self {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Same as `from_env` but with an injectable lookup; unparsable values keep the default.
  pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
    let d = Settings::default();
    let secs = |key: &str, fallback: Duration| {
      get(key)
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
    };
    Self {
      port: get("PORT").and_then(|p| p.parse::<u16>().ok()).unwrap_or(d.port),
      store_path: get("STORE_PATH").map(PathBuf::from).unwrap_or(d.store_path),
      node_url: get("NODE_URL").unwrap_or(d.node_url),
      signer_url: get("SIGNER_URL").filter(|s| !s.trim().is_empty()),
      wallet_address: get("WALLET_ADDRESS").filter(|s| !s.trim().is_empty()),
      network: get("NETWORK").unwrap_or(d.network),
      progress_poll: secs("PROGRESS_POLL_SECS", d.progress_poll),
      confirm_timeout: secs("CHAIN_CONFIRM_TIMEOUT_SECS", d.confirm_timeout),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{PassThreshold, TimerMode};

  #[test]
  fn parses_catalog_with_explicit_policies() {
    let text = r#"
      [[quizzes]]
      id = "rust-basics"
      title = "Rust Basics"
      pass = { correct = 2 }
      timer = { whole_quiz = { secs = 120 } }
      onchain = { min_percent = 90 }

      [[quizzes.questions]]
      id = "rb-1"
      prompt = "Which keyword declares a binding?"
      options = ["let", "var"]
      correct = 0
      points = 20

      [[quizzes.questions]]
      id = "rb-2"
      prompt = "Which macro prints a line?"
      options = ["print", "println!", "echo"]
      correct = 1

      [[courses]]
      id = "rust-101"
      title = "Rust 101"
      quiz_ids = ["rust-basics"]
    "#;
    let cfg = parse_catalog(text).unwrap();
    let quiz = &cfg.quizzes[0];
    assert_eq!(quiz.pass, PassThreshold::Correct(2));
    assert_eq!(quiz.timer, TimerMode::WholeQuiz { secs: 120 });
    assert_eq!(quiz.questions[1].points, 1);
    assert_eq!(quiz.xp_reward, 50);
    assert_eq!(cfg.courses[0].quiz_ids, vec!["rust-basics".to_string()]);
  }

  #[test]
  fn settings_fall_back_on_garbage() {
    let s = Settings::from_lookup(|k| match k {
      "PORT" => Some("not-a-port".into()),
      "PROGRESS_POLL_SECS" => Some("0".into()),
      "CHAIN_CONFIRM_TIMEOUT_SECS" => Some("5".into()),
      "SIGNER_URL" => Some("  ".into()),
      _ => None,
    });
    assert_eq!(s.port, 3000);
    assert_eq!(s.progress_poll, Duration::from_secs(10));
    assert_eq!(s.confirm_timeout, Duration::from_secs(5));
    assert!(s.signer_url.is_none());
  }
}
