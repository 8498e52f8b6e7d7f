//! Broker port - 共有ブローカー（Redis または InMemory）への操作
//!
//! Worker が必要とするのはリスト・セットに対する少数のアトミック操作だけです。
//! 実装の詳細（永続化、レプリケーション）はこの trait の外側にあります。
//!
//! # 実装
//! - **InMemoryBroker**: テスト・開発用
//! - **RedisBroker**: 本番用

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a broker adapter.
///
/// `Transport` covers everything that may go away on its own (dropped
/// connection, I/O, timeout). `Protocol` is a reply the broker refused to give
/// (wrong key type, bad argument, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Names the broker operations, for logs, errors and the in-memory journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerOp {
    AtomicTransfer,
    AppendList,
    RemoveOneFromList,
    RemoveFromSet,
    Publish,
}

impl fmt::Display for BrokerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BrokerOp::AtomicTransfer => "atomic_transfer",
            BrokerOp::AppendList => "append_list",
            BrokerOp::RemoveOneFromList => "remove_one_from_list",
            BrokerOp::RemoveFromSet => "remove_from_set",
            BrokerOp::Publish => "publish",
        };
        f.write_str(s)
    }
}

/// Broker is the only way the worker touches shared queue state.
///
/// # 設計原則
/// - 取り出しは `atomic_transfer` のみ（input から taken への移動が原子的）
/// - 削除系は冪等: 存在しない要素の削除はエラーではなく no-op
/// - アダプタ自身は状態を持たない
#[async_trait]
pub trait Broker: Send + Sync {
    /// Blocks up to `timeout`. If `source` is non-empty, atomically removes its
    /// tail element and pushes it as the new head of `dest`.
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing to move.
    async fn atomic_transfer(
        &self,
        source: &str,
        dest: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrokerError>;

    /// Pushes `value` as the new head of `list`.
    async fn append_list(&self, list: &str, value: &str) -> Result<(), BrokerError>;

    /// Removes one occurrence of `value` from `list`, if present.
    async fn remove_one_from_list(&self, list: &str, value: &str) -> Result<(), BrokerError>;

    /// Removes `value` from `set`, if present.
    async fn remove_from_set(&self, set: &str, value: &str) -> Result<(), BrokerError>;

    /// Fire-and-forget message on a pub/sub channel.
    async fn publish(&self, channel: &str, message: &str) -> Result<(), BrokerError>;
}
