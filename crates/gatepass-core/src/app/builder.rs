//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 必須のポート（store / notifier / directory）が欠けていれば build() で BuildError
//! - 設定の検証（秘密鍵の長さ、周期）も build() 時に行う
//! - clock と id 生成器は省略時に SystemClock / UlidGenerator

use std::sync::Arc;


use crate::app::{ApprovalService, OverdueMonitor, TokenService};
use crate::config::{ConfigError, GatePassConfig};
use crate::ports::{Clock, IdGenerator, Notifier, OrgDirectory, PassStore, SystemClock, UlidGenerator};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(config)
///     .store(Arc::new(InMemoryPassStore::new()))
///     .notifier(Arc::new(TracingNotifier))
///     .directory(Arc::new(directory))
///     .build()?;
/// ```
pub struct AppBuilder {
    config: GatePassConfig,
    store: Option<Arc<dyn PassStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    directory: Option<Arc<dyn OrgDirectory>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no pass store configured")]
    MissingStore,

    #[error("no notifier configured")]
    MissingNotifier,

    #[error("no org directory configured")]
    MissingDirectory,

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new(config: GatePassConfig) -> Self {
        Self {
            config,
            store: None,
            notifier: None,
            directory: None,
            clock: None,
            ids: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn PassStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn OrgDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let notifier = self.notifier.ok_or(BuildError::MissingNotifier)?;
        let directory = self.directory.ok_or(BuildError::MissingDirectory)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));

        let tokens = Arc::new(TokenService::new(
            &self.config.secret_bytes()?,
            self.config.token.ttl()?,
            clock.clone(),
        )?);
        let approvals = Arc::new(ApprovalService::new(
            store.clone(),
            notifier.clone(),
            directory.clone(),
            clock.clone(),
            ids,
            tokens.clone(),
            self.config.passes.number_prefix.clone(),
        ));
        let monitor = Arc::new(OverdueMonitor::new(
            store,
            notifier,
            directory,
            clock,
            self.config.monitor.clone(),
        ));
        Ok(App {
            approvals,
            tokens,
            monitor,
        })
    }
}

/// App はワイヤリング済みのサービス一式
pub struct App {
    pub approvals: Arc<ApprovalService>,
    pub tokens: Arc<TokenService>,
    pub monitor: Arc<OverdueMonitor>,
}
