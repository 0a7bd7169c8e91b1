//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{EventId, PassId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はパスと監査行の ID を生成
pub trait IdGenerator: Send + Sync {
    fn generate_pass_id(&self) -> PassId;

    fn generate_event_id(&self) -> EventId;
}

/// UlidGenerator は Clock の時刻を timestamp 部に使う ULID 生成器
///
/// ManualClock を渡すと timestamp 部が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_pass_id(&self) -> PassId {
        PassId::from(self.next_ulid())
    }

    fn generate_event_id(&self) -> EventId {
        EventId::from(self.next_ulid())
    }
}
