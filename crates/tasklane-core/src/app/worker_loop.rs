//! WorkerLoop - タスク消費ループ
//!
//! # フロー（1 イテレーション）
//! 1. Broker::atomic_transfer() で input → taken へ原子的に移動（唯一の待機点）
//! 2. dedup が有効なら dedup セットから削除
//! 3. タスク名をパース（不正なら taken に残したまま中断）
//! 4. Runtime で handler を実行
//! 5. output キューへ完了通知を追加
//! 6. taken から 1 件削除（lease の解放）
//!
//! 5 は必ず 6 より先に行います。完了通知を失うより、
//! taken に残った重複に見えるエントリの方を許容します。
//!
//! どの失敗もプロセスを止めません。ログを出して Idle に戻ります。
//! taken に残ったタスクの回収（再キュー）はこのループの責務ではありません。

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::app::backoff::BackoffPolicy;
use crate::app::runtime::Runtime;
use crate::config::{DedupConfig, EventsConfig, QueueConfig};
use crate::domain::{
    ErrorKind, EventKind, LoopState, TaskName, WorkerError, WorkerEvent, WorkerId,
};
use crate::ports::{Broker, BrokerOp, Clock};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("{0} queue name must not be empty")]
    EmptyName(&'static str),

    #[error("taken queue must differ from the input queue")]
    TakenIsInput,

    #[error("output queue must differ from the input and taken queues")]
    OutputReused,
}

/// The lists one worker reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub input: String,
    /// The lease record. Must not be shared with another input queue.
    pub taken: String,
    pub output: String,
}

impl QueueNames {
    pub fn new(
        input: impl Into<String>,
        taken: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            taken: taken.into(),
            output: output.into(),
        }
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        for (role, name) in [
            ("input", &self.input),
            ("taken", &self.taken),
            ("output", &self.output),
        ] {
            if name.trim().is_empty() {
                return Err(QueueError::EmptyName(role));
            }
        }
        if self.input == self.taken {
            return Err(QueueError::TakenIsInput);
        }
        if self.output == self.input || self.output == self.taken {
            return Err(QueueError::OutputReused);
        }
        Ok(())
    }
}

impl From<&QueueConfig> for QueueNames {
    fn from(config: &QueueConfig) -> Self {
        Self::new(
            config.input.clone(),
            config.taken_queue(),
            config.output.clone(),
        )
    }
}

/// Whether the worker clears a dedup marker after acquiring a task.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DedupMode {
    #[default]
    Disabled,
    Enabled { set: String },
}

impl From<&DedupConfig> for DedupMode {
    fn from(config: &DedupConfig) -> Self {
        if config.enabled {
            DedupMode::Enabled {
                set: config.set_name.clone(),
            }
        } else {
            DedupMode::Disabled
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EventsMode {
    #[default]
    Disabled,
    Enabled { channel: String },
}

impl From<&EventsConfig> for EventsMode {
    fn from(config: &EventsConfig) -> Self {
        if config.enabled {
            EventsMode::Enabled {
                channel: config.channel.clone(),
            }
        } else {
            EventsMode::Disabled
        }
    }
}

/// One sequential consumer of an input queue.
///
/// Owns its broker handle exclusively. Build it with
/// [`WorkerBuilder`](crate::app::WorkerBuilder).
pub struct WorkerLoop {
    pub(crate) id: WorkerId,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) runtime: Runtime,
    pub(crate) queues: QueueNames,
    pub(crate) dedup: DedupMode,
    pub(crate) events: EventsMode,
    pub(crate) poll_timeout: Duration,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: watch::Sender<LoopState>,
    /// Consecutive failed polls, reset by any successful poll.
    pub(crate) poll_failures: u32,
}

impl WorkerLoop {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn queues(&self) -> &QueueNames {
        &self.queues
    }

    pub fn dedup(&self) -> &DedupMode {
        &self.dedup
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Watches the loop state. Between iterations it is always `Idle`.
    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Runs iterations until shutdown is requested (or the sender is dropped).
    ///
    /// Shutdown is checked between iterations only: an in-flight poll or
    /// handler is never abandoned, so stopping takes at most one poll timeout
    /// plus the current task.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            worker = %self.id,
            queue = %self.queues.input,
            "worker listening"
        );
        while !shutdown_requested(&shutdown) {
            let Err(err) = self.run_once().await else {
                continue;
            };
            self.log_error(&err);

            if err.kind() == ErrorKind::BrokerTransient {
                let delay = self.backoff.next_delay(self.poll_failures);
                if !delay.is_zero() {
                    debug!(worker = %self.id, ?delay, "backing off before next poll");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
        info!(worker = %self.id, "worker stopped");
    }

    /// Runs exactly one iteration.
    ///
    /// - `Ok(None)`: the poll timed out, nothing to do
    /// - `Ok(Some(task))`: the task was executed, notified and released
    /// - `Err(e)`: the iteration was abandoned; `e.kind()` tells where
    pub async fn run_once(&mut self) -> Result<Option<TaskName>, WorkerError> {
        self.set_state(LoopState::Polling);
        let polled = self
            .broker
            .atomic_transfer(&self.queues.input, &self.queues.taken, self.poll_timeout)
            .await;

        let name = match polled {
            Ok(Some(name)) => {
                self.poll_failures = 0;
                name
            }
            Ok(None) => {
                self.poll_failures = 0;
                self.set_state(LoopState::Idle);
                debug!(worker = %self.id, queue = %self.queues.input, "nothing to do");
                return Ok(None);
            }
            Err(source) => {
                self.poll_failures = self.poll_failures.saturating_add(1);
                self.set_state(LoopState::Idle);
                return Err(WorkerError::BrokerTransient {
                    queue: self.queues.input.clone(),
                    source,
                });
            }
        };

        let outcome = self.handle(&name).await;
        if let Err(err) = &outcome {
            let kind = match err.kind() {
                ErrorKind::Malformed => EventKind::Stranded,
                _ => EventKind::Failed,
            };
            self.emit(kind, &name).await;
        }
        self.set_state(LoopState::Idle);
        outcome.map(Some)
    }

    /// Everything after the task name is safely in the taken list.
    async fn handle(&self, name: &str) -> Result<TaskName, WorkerError> {
        self.set_state(LoopState::Acquired);
        info!(worker = %self.id, task = name, queue = %self.queues.input, "got task");
        self.emit(EventKind::Taken, name).await;

        self.clear_dedup(name).await;
        self.set_state(LoopState::DedupCleared);

        let task = TaskName::parse(name).map_err(|source| WorkerError::Malformed {
            name: name.to_owned(),
            source,
        })?;

        self.set_state(LoopState::Processing);
        self.runtime
            .execute(&task)
            .await
            .map_err(|source| WorkerError::ExecutionFailed {
                task: name.to_owned(),
                source,
            })?;

        // notify the scheduler first, then release the lease
        self.broker
            .append_list(&self.queues.output, name)
            .await
            .map_err(|source| self.write_error(BrokerOp::AppendList, &self.queues.output, name, source))?;
        self.set_state(LoopState::Notified);

        self.broker
            .remove_one_from_list(&self.queues.taken, name)
            .await
            .map_err(|source| {
                self.write_error(BrokerOp::RemoveOneFromList, &self.queues.taken, name, source)
            })?;
        self.set_state(LoopState::Acknowledged);

        info!(worker = %self.id, task = name, queue = %self.queues.output, "task done");
        self.emit(EventKind::Done, name).await;
        Ok(task)
    }

    /// A failure here is logged and processing goes on: the lease is already
    /// held and the marker only guards producers against duplicates.
    async fn clear_dedup(&self, name: &str) {
        let DedupMode::Enabled { set } = &self.dedup else {
            return;
        };
        if let Err(source) = self.broker.remove_from_set(set, name).await {
            let err = self.write_error(BrokerOp::RemoveFromSet, set, name, source);
            warn!(worker = %self.id, error = %err, "could not clear dedup marker");
        }
    }

    async fn emit(&self, kind: EventKind, name: &str) {
        let EventsMode::Enabled { channel } = &self.events else {
            return;
        };
        let event = WorkerEvent::new(kind, self.id, name, &self.queues.taken, self.clock.now());
        let message = match event.to_json() {
            Ok(message) => message,
            Err(e) => {
                warn!(worker = %self.id, error = %e, "could not encode event");
                return;
            }
        };
        if let Err(e) = self.broker.publish(channel, &message).await {
            warn!(worker = %self.id, channel = %channel, error = %e, "could not publish event");
        }
    }

    fn write_error(
        &self,
        op: BrokerOp,
        key: &str,
        task: &str,
        source: crate::ports::BrokerError,
    ) -> WorkerError {
        WorkerError::BrokerWrite {
            op,
            key: key.to_owned(),
            task: task.to_owned(),
            source,
        }
    }

    fn log_error(&self, err: &WorkerError) {
        match err.kind() {
            ErrorKind::Malformed => warn!(
                worker = %self.id,
                queue = %self.queues.taken,
                error = %err,
                "invalid task name, left in the taken list"
            ),
            ErrorKind::BrokerTransient => error!(
                worker = %self.id,
                failures = self.poll_failures,
                error = %err,
                "poll failed"
            ),
            ErrorKind::BrokerWrite | ErrorKind::ExecutionFailed => error!(
                worker = %self.id,
                task = err.task().unwrap_or_default(),
                error = %err,
                "task abandoned"
            ),
        }
    }

    fn set_state(&self, state: LoopState) {
        self.state.send_replace(state);
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}
