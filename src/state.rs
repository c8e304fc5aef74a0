//! Application state shared by HTTP and WebSocket handlers.
//!
//! This module owns:
//!   - the immutable catalog (TOML catalog + built-in seeds)
//!   - the progress store over the profile file
//!   - the quiz runner (one active session, one countdown)
//!   - the wallet used for the optional on-chain proof
//!   - the latest ProgressRecord published by the watcher

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, instrument};

use crate::catalog::Catalog;
use crate::certificate::ChainOptions;
use crate::config::{load_catalog_config_from_env, Settings};
use crate::progress::{watcher, ProgressRecord, ProgressStore};
use crate::runner::QuizRunner;
use crate::storage::{FileStore, KvStore};
use crate::wallet::{HostWallet, Wallet};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub store: ProgressStore,
    pub runner: QuizRunner,
    pub wallet: HostWallet,
    pub progress: watch::Receiver<ProgressRecord>,
    pub settings: Settings,
}

impl AppState {
    /// Build state from env: load the catalog, open the profile file, pick a wallet,
    /// start the progress watcher. Must run inside the tokio runtime.
    #[instrument(level = "info", skip_all)]
    pub fn new(settings: Settings) -> Self {
        let catalog = Catalog::from_config(load_catalog_config_from_env());
        let kv: Arc<dyn KvStore> = Arc::new(FileStore::new(settings.store_path.clone()));
        info!(target: "quizchain_backend", path = %settings.store_path.display(), "Profile store opened");
        let wallet = HostWallet::from_settings(&settings);
        Self::with_parts(catalog, kv, wallet, settings)
    }

    pub fn with_parts(catalog: Catalog, kv: Arc<dyn KvStore>, wallet: HostWallet, settings: Settings) -> Self {
        let store = ProgressStore::new(kv);
        let (progress, _watcher) = watcher::spawn(store.clone(), settings.progress_poll);
        let current = progress.borrow().clone();
        info!(
            target: "quizchain_backend",
            certificates = current.certificates,
            total_xp = current.total_xp,
            level = current.level,
            streak = current.streak_days,
            onchain = wallet.connection().is_some(),
            "Profile loaded"
        );
        Self {
            catalog: Arc::new(catalog),
            runner: QuizRunner::new(store.clone()),
            store,
            wallet,
            progress,
            settings,
        }
    }

    pub fn chain_options(&self) -> ChainOptions {
        ChainOptions::from(&self.settings)
    }
}
