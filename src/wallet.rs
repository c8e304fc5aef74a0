//! Narrow seam to the external chain submitter.
//!
//! `RestWallet` reads balances and confirmations from a fullnode REST API and
//! hands signing to a local signer bridge (`POST {SIGNER_URL}/sign_and_submit`).
//! Without a signer it reports itself disconnected and the certificate flow
//! stays local-only.
//!
//! NOTE: We never log signer payload bodies, only status codes and hashes.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::{header::{CONTENT_TYPE, USER_AGENT}, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Settings;

/// Fee reserve required before attempting a submission, in octas.
pub const MIN_FEE_BALANCE: u64 = 100_000;
/// Amount moved by the proof-of-completion self-transfer, in octas.
pub const SELF_TRANSFER_AMOUNT: u64 = 10_000;
pub const FAUCET_URL: &str = "https://faucet.devnet.aptoslabs.com/";

const TRANSFER_FUNCTION: &str = "0x1::aptos_account::transfer";
const COIN_STORE_RESOURCE: &str = "0x1::coin::CoinStore<0x1::aptos_coin::AptosCoin>";
const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
  #[error("user rejected the transaction")]
  Rejected,
  #[error("insufficient balance for transaction fees")]
  InsufficientBalance,
  #[error("wallet not connected")]
  NotConnected,
  #[error("network error: {0}")]
  Network(String),
  #[error("timed out waiting for the wallet")]
  Timeout,
  #[error("transaction failed: {0}")]
  Failed(String),
}

/// Map a wallet/signer failure (optional numeric code plus message) to a `WalletError`.
pub fn classify_wallet_error(code: Option<i64>, message: &str) -> WalletError {
  let lower = message.to_lowercase();
  if code == Some(USER_REJECTED_CODE) || lower.contains("rejected") {
    WalletError::Rejected
  } else if lower.contains("insufficient") {
    WalletError::InsufficientBalance
  } else {
    WalletError::Failed(message.to_string())
  }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct WalletConnection {
  pub address: String,
  pub network: String,
}

/// An entry-function call to be signed by the connected account.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TransactionIntent {
  pub sender: String,
  pub function: String,
  pub type_arguments: Vec<String>,
  pub arguments: Vec<String>,
  pub max_gas_amount: u64,
  pub gas_unit_price: u64,
  pub expiration_timestamp_secs: i64,
}

impl TransactionIntent {
  /// Minimal transfer of the account to itself, used as the on-chain proof.
  pub fn self_transfer(address: &str, now: DateTime<Utc>) -> Self {
    Self {
      sender: address.to_string(),
      function: TRANSFER_FUNCTION.to_string(),
      type_arguments: Vec::new(),
      arguments: vec![address.to_string(), SELF_TRANSFER_AMOUNT.to_string()],
      max_gas_amount: 20_000,
      gas_unit_price: 100,
      expiration_timestamp_secs: now.timestamp() + 600,
    }
  }

  /// Request body in the fullnode's JSON transaction shape (u64s as strings).
  fn to_request_body(&self) -> Value {
    json!({
      "sender": self.sender,
      "payload": {
        "type": "entry_function_payload",
        "function": self.function,
        "type_arguments": self.type_arguments,
        "arguments": self.arguments,
      },
      "max_gas_amount": self.max_gas_amount.to_string(),
      "gas_unit_price": self.gas_unit_price.to_string(),
      "expiration_timestamp_secs": self.expiration_timestamp_secs.to_string(),
    })
  }
}

pub fn explorer_url(hash: &str, network: &str) -> String {
  format!("https://explorer.aptoslabs.com/txn/{hash}?network={network}")
}

pub fn faucet_url() -> &'static str {
  FAUCET_URL
}

pub trait Wallet: Send + Sync {
  /// `None` when no account is connected.
  fn connection(&self) -> Option<WalletConnection>;

  /// Spendable balance in octas.
  fn balance(&self, address: &str) -> impl Future<Output = Result<u64, WalletError>> + Send;

  /// Returns the transaction hash once the network accepted the submission.
  fn sign_and_submit(&self, intent: &TransactionIntent) -> impl Future<Output = Result<String, WalletError>> + Send;

  /// Resolves once the transaction is committed. Callers bound it with a timeout.
  fn wait_for_confirmation(&self, hash: &str) -> impl Future<Output = Result<(), WalletError>> + Send;
}

/// Wallet used when nothing is configured: every chain call reports `NotConnected`.
#[derive(Clone, Debug, Default)]
pub struct DisconnectedWallet;

impl Wallet for DisconnectedWallet {
  fn connection(&self) -> Option<WalletConnection> {
    None
  }

  async fn balance(&self, _address: &str) -> Result<u64, WalletError> {
    Err(WalletError::NotConnected)
  }

  async fn sign_and_submit(&self, _intent: &TransactionIntent) -> Result<String, WalletError> {
    Err(WalletError::NotConnected)
  }

  async fn wait_for_confirmation(&self, _hash: &str) -> Result<(), WalletError> {
    Err(WalletError::NotConnected)
  }
}

#[derive(Clone)]
pub struct RestWallet {
  client: reqwest::Client,
  pub node_url: String,
  pub signer_url: Option<String>,
  pub address: Option<String>,
  pub network: String,
  pub poll_every: Duration,
}

#[derive(Deserialize)]
struct SubmitResponse {
  hash: String,
}

#[derive(Deserialize)]
struct SignerError {
  #[serde(default)]
  code: Option<i64>,
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  error: Option<String>,
}

impl RestWallet {
  /// Build from settings; None if the HTTP client cannot be constructed.
  pub fn from_settings(settings: &Settings) -> Option<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(15))
      .build()
      .ok()?;
    Some(Self {
      client,
      node_url: settings.node_url.trim_end_matches('/').to_string(),
      signer_url: settings.signer_url.as_ref().map(|s| s.trim_end_matches('/').to_string()),
      address: settings.wallet_address.clone(),
      network: settings.network.clone(),
      poll_every: Duration::from_secs(1),
    })
  }

  fn get(&self, url: &str) -> reqwest::RequestBuilder {
    self.client.get(url).header(USER_AGENT, "quizchain-backend/0.1")
  }
}

fn network_error(e: reqwest::Error) -> WalletError {
  if e.is_timeout() {
    WalletError::Timeout
  } else {
    WalletError::Network(e.to_string())
  }
}

/// `{"data":{"coin":{"value":"123"}}}` -> 123
fn parse_coin_value(body: &Value) -> Option<u64> {
  body.pointer("/data/coin/value")?.as_str()?.parse().ok()
}

/// Outcome of a by-hash lookup: None while still pending.
fn parse_committed(body: &Value) -> Option<Result<(), WalletError>> {
  if body.get("type").and_then(Value::as_str) == Some("pending_transaction") {
    return None;
  }
  match body.get("success").and_then(Value::as_bool) {
    Some(true) => Some(Ok(())),
    Some(false) => {
      let status = body.get("vm_status").and_then(Value::as_str).unwrap_or("unknown vm status");
      Some(Err(WalletError::Failed(status.to_string())))
    }
    None => None,
  }
}

impl Wallet for RestWallet {
  fn connection(&self) -> Option<WalletConnection> {
    self.signer_url.as_ref()?;
    let address = self.address.clone()?;
    Some(WalletConnection { address, network: self.network.clone() })
  }

  #[instrument(level = "info", skip(self))]
  async fn balance(&self, address: &str) -> Result<u64, WalletError> {
    let url = format!("{}/accounts/{}/resource/{}", self.node_url, address, COIN_STORE_RESOURCE);
    let res = self.get(&url).send().await.map_err(network_error)?;
    if res.status() == StatusCode::NOT_FOUND {
      // account or coin store not created yet
      debug!(target: "wallet", "No coin store; balance is zero");
      return Ok(0);
    }
    if !res.status().is_success() {
      let status = res.status();
      return Err(WalletError::Network(format!("node HTTP {status}")));
    }
    let body: Value = res.json().await.map_err(network_error)?;
    parse_coin_value(&body).ok_or_else(|| WalletError::Network("unexpected balance payload".into()))
  }

  #[instrument(level = "info", skip(self, intent), fields(sender = %intent.sender, function = %intent.function))]
  async fn sign_and_submit(&self, intent: &TransactionIntent) -> Result<String, WalletError> {
    let signer = self.signer_url.as_ref().ok_or(WalletError::NotConnected)?;
    let url = format!("{signer}/sign_and_submit");
    let res = self.client.post(&url)
      .header(USER_AGENT, "quizchain-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&intent.to_request_body())
      .send().await.map_err(network_error)?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let err = match serde_json::from_str::<SignerError>(&body) {
        Ok(e) => {
          let msg = e.message.or(e.error).unwrap_or_else(|| format!("signer HTTP {status}"));
          classify_wallet_error(e.code, &msg)
        }
        Err(_) => classify_wallet_error(None, &format!("signer HTTP {status}: {}", crate::util::trunc_for_log(&body, 120))),
      };
      warn!(target: "wallet", %status, error = %err, "Signer refused submission");
      return Err(err);
    }

    let body: SubmitResponse = res.json().await.map_err(network_error)?;
    info!(target: "wallet", hash = %crate::util::short_hash(&body.hash), "Transaction submitted");
    Ok(body.hash)
  }

  #[instrument(level = "info", skip(self, hash), fields(hash = %crate::util::short_hash(hash)))]
  async fn wait_for_confirmation(&self, hash: &str) -> Result<(), WalletError> {
    let url = format!("{}/transactions/by_hash/{}", self.node_url, hash);
    loop {
      match self.get(&url).send().await {
        Ok(res) if res.status().is_success() => {
          let body: Value = res.json().await.map_err(network_error)?;
          if let Some(done) = parse_committed(&body) {
            if let Err(e) = &done {
              error!(target: "wallet", error = %e, "Transaction committed with failure");
            }
            return done;
          }
        }
        Ok(res) if res.status() == StatusCode::NOT_FOUND => {}
        Ok(res) => debug!(target: "wallet", status = %res.status(), "Confirmation lookup not ready"),
        Err(e) => debug!(target: "wallet", error = %e, "Confirmation lookup failed; retrying"),
      }
      tokio::time::sleep(self.poll_every).await;
    }
  }
}

/// Runtime choice between the configured wallets.
#[derive(Clone)]
pub enum HostWallet {
  Rest(RestWallet),
  Disconnected(DisconnectedWallet),
}

impl HostWallet {
  pub fn from_settings(settings: &Settings) -> Self {
    match RestWallet::from_settings(settings) {
      Some(w) if w.connection().is_some() => {
        info!(target: "wallet", node = %w.node_url, network = %w.network, "On-chain submission enabled");
        HostWallet::Rest(w)
      }
      Some(_) => {
        info!(target: "wallet", "No SIGNER_URL/WALLET_ADDRESS; certificates stay local-only");
        HostWallet::Disconnected(DisconnectedWallet)
      }
      None => {
        error!(target: "wallet", "Failed to build HTTP client; certificates stay local-only");
        HostWallet::Disconnected(DisconnectedWallet)
      }
    }
  }
}

impl Wallet for HostWallet {
  fn connection(&self) -> Option<WalletConnection> {
    match self {
      HostWallet::Rest(w) => w.connection(),
      HostWallet::Disconnected(w) => w.connection(),
    }
  }

  async fn balance(&self, address: &str) -> Result<u64, WalletError> {
    match self {
      HostWallet::Rest(w) => w.balance(address).await,
      HostWallet::Disconnected(w) => w.balance(address).await,
    }
  }

  async fn sign_and_submit(&self, intent: &TransactionIntent) -> Result<String, WalletError> {
    match self {
      HostWallet::Rest(w) => w.sign_and_submit(intent).await,
      HostWallet::Disconnected(w) => w.sign_and_submit(intent).await,
    }
  }

  async fn wait_for_confirmation(&self, hash: &str) -> Result<(), WalletError> {
    match self {
      HostWallet::Rest(w) => w.wait_for_confirmation(hash).await,
      HostWallet::Disconnected(w) => w.wait_for_confirmation(hash).await,
    }
  }
}
