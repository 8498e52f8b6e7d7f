//! Errors - エラー型と分類
//!
//! どのエラーもプロセスを止めません。ループはログを出して Idle に戻ります。
//! `ErrorKind` はテストや運用者が失敗モードを区別するための分類です。

use thiserror::Error;

use crate::app::runtime::ExecuteError;
use crate::domain::task_name::TaskNameError;
use crate::ports::{BrokerError, BrokerOp};

/// ErrorKind は 1 回のイテレーションの失敗分類
///
/// - Malformed: タスク名が不正（taken に残る）
/// - BrokerTransient: poll 中のブローカーエラー（即リトライ）
/// - BrokerWrite: notify / ack / dedup 削除の書き込み失敗
/// - ExecutionFailed: handler の失敗
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Malformed,
    BrokerTransient,
    BrokerWrite,
    ExecutionFailed,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("malformed task name {name:?}: {source}")]
    Malformed {
        name: String,
        #[source]
        source: TaskNameError,
    },

    #[error("polling {queue:?} failed: {source}")]
    BrokerTransient {
        queue: String,
        #[source]
        source: BrokerError,
    },

    #[error("{op} on {key:?} for task {task:?} failed: {source}")]
    BrokerWrite {
        op: BrokerOp,
        key: String,
        task: String,
        #[source]
        source: BrokerError,
    },

    #[error("execution of {task:?} failed: {source}")]
    ExecutionFailed {
        task: String,
        #[source]
        source: ExecuteError,
    },
}

impl WorkerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::Malformed { .. } => ErrorKind::Malformed,
            WorkerError::BrokerTransient { .. } => ErrorKind::BrokerTransient,
            WorkerError::BrokerWrite { .. } => ErrorKind::BrokerWrite,
            WorkerError::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
        }
    }

    /// The raw task name this error is about, if a task was acquired.
    pub fn task(&self) -> Option<&str> {
        match self {
            WorkerError::Malformed { name, .. } => Some(name),
            WorkerError::BrokerTransient { .. } => None,
            WorkerError::BrokerWrite { task, .. } => Some(task),
            WorkerError::ExecutionFailed { task, .. } => Some(task),
        }
    }
}
