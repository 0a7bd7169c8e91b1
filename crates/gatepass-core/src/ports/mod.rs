//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部の協調者（パスの永続ストア、通知チャネル、組織ディレクトリ）
//! へのインターフェースで、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - PassStore が source of truth（正本）。状態遷移と監査ログは同一の原子的更新
//! - 通知は fire-and-forget（トランザクション境界の外）
//! - 時刻と ID は注入可能（テストで ManualClock を使う）

pub mod clock;
pub mod directory;
pub mod id_generator;
pub mod notifier;
pub mod pass_store;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::directory::OrgDirectory;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::notifier::{NotifyError, Notifier};
pub use self::pass_store::{PassStore, SessionBinding};
