//! Worker identifiers.
//!
//! 各ワーカーは起動時に ULID ベースの ID を持ちます。
//! ログの `worker` フィールドとイベントの送信元に使います。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: 起動順に並ぶ
//! - **分散生成可能**: 複数プロセス・複数ホストで調整なしに生成できる

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::ports::Clock;

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(Ulid);

impl WorkerId {
    /// Builds an id whose timestamp part comes from `clock`.
    pub fn generate(clock: &dyn Clock) -> Self {
        let timestamp_ms = clock.now().timestamp_millis() as u64;
        Self(Ulid::from_parts(timestamp_ms, rand::random()))
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for WorkerId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generated_ids_are_unique() {
        let a = WorkerId::generate(&SystemClock);
        let b = WorkerId::generate(&SystemClock);
        assert_ne!(a, b);
    }

    #[test]
    fn timestamp_part_comes_from_the_clock() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(fixed_time);

        let id = WorkerId::generate(&clock);
        assert_eq!(id.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }

    #[test]
    fn display_has_worker_prefix() {
        let id = WorkerId::generate(&SystemClock);
        assert!(id.to_string().starts_with("worker-"));
    }
}
