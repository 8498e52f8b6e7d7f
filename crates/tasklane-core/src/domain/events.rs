//! Events - ワーカーのライフサイクルイベント
//!
//! 設定で有効にした場合のみ、ブローカーの pub/sub チャンネルへ JSON で送信されます。
//! 送信はベストエフォートで、失敗してもプロトコルの結果は変わりません。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::WorkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Moved from the input queue to the taken list.
    Taken,
    /// Pushed to the output queue and released from the taken list.
    Done,
    /// Rejected by the codec and left in the taken list.
    Stranded,
    /// Handler or queue write failed; the iteration was abandoned.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEvent {
    pub kind: EventKind,
    pub worker: String,
    pub task: String,
    /// The taken list holding the lease.
    pub queue: String,
    pub at: DateTime<Utc>,
}

impl WorkerEvent {
    pub fn new(
        kind: EventKind,
        worker: WorkerId,
        task: impl Into<String>,
        queue: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            worker: worker.to_string(),
            task: task.into(),
            queue: queue.into(),
            at,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
