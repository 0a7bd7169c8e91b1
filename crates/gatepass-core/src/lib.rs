//! gatepass-core
//!
//! Core building blocks for the gate pass dispatch system.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, actor, pass, event, escalation, notification, errors）
//! - **ports**: 抽象化レイヤー（PassStore, Notifier, OrgDirectory, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（approvals, tokens, monitor, routing, builder）
//! - **impls**: 実装（InMemoryPassStore, InMemoryInbox など開発用）
//! - **config**: TOML 設定の読み込みと検証

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{App, AppBuilder, ApprovalService, BuildError, OverdueMonitor, TokenService};
pub use config::{ConfigError, GatePassConfig};
pub use domain::errors::{ErrorKind, GatePassError, TokenError};
