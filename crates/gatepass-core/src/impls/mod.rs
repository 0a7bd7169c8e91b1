//! Implementations - ポートの実装
//!
//! 開発・テスト用のインメモリ実装です。
//! - InMemoryPassStore: PassStore
//! - InMemoryInbox / TracingNotifier: Notifier
//! - StaticDirectory: OrgDirectory

pub mod inmem_inbox;
pub mod inmem_store;
pub mod static_directory;
pub mod tracing_notifier;

pub use self::inmem_inbox::InMemoryInbox;
pub use self::inmem_store::InMemoryPassStore;
pub use self::static_directory::StaticDirectory;
pub use self::tracing_notifier::TracingNotifier;
