//! State - ワーカーループの状態
//!
//! # 状態遷移
//! - Idle → Polling → Acquired → DedupCleared → Processing → Notified → Acknowledged → Idle
//! - Idle → Polling → Idle（poll タイムアウト、またはエラー）
//!
//! 途中で失敗した場合はどの状態からでも Idle に戻ります。

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    /// Blocked in the atomic transfer. The only suspension point besides the handler.
    Polling,
    /// The task name is in the taken list and owned by this worker.
    Acquired,
    DedupCleared,
    Processing,
    /// The completion record is in the output queue.
    Notified,
    /// The lease in the taken list was released.
    Acknowledged,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Polling => "polling",
            LoopState::Acquired => "acquired",
            LoopState::DedupCleared => "dedup_cleared",
            LoopState::Processing => "processing",
            LoopState::Notified => "notified",
            LoopState::Acknowledged => "acknowledged",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
