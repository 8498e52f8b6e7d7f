//! InMemoryBroker - 開発・テスト用のブローカー
//!
//! # 学習ポイント
//! - tokio Mutex + Notify による blocking pop（timeout 付き）
//! - 通知の取りこぼしを防ぐ `Notified::enable()`
//! - 操作ジャーナルによる順序の検証
//!
//! リストは `VecDeque` で、先頭（front）が head です。
//! `append_list` は head に追加し、`atomic_transfer` は tail から取り出します。

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::ports::{Broker, BrokerError, BrokerOp};

/// One successful mutation, in the order the broker applied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub op: BrokerOp,
    /// The list, set or channel that was written.
    pub key: String,
    pub value: String,
}

#[derive(Default)]
struct BrokerState {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, BTreeSet<String>>,
    journal: Vec<JournalEntry>,
    /// Injected failures: op -> (remaining count, error to return).
    failures: HashMap<BrokerOp, (usize, BrokerError)>,
}

impl BrokerState {
    fn take_failure(&mut self, op: BrokerOp) -> Result<(), BrokerError> {
        let Some((remaining, error)) = self.failures.get_mut(&op) else {
            return Ok(());
        };
        let error = error.clone();
        *remaining -= 1;
        if *remaining == 0 {
            self.failures.remove(&op);
        }
        Err(error)
    }

    fn record(&mut self, op: BrokerOp, key: &str, value: &str) {
        self.journal.push(JournalEntry {
            op,
            key: key.to_owned(),
            value: value.to_owned(),
        });
    }
}

/// In-memory stand-in for the shared broker.
///
/// Clones share the same state, so each clone behaves like a separate
/// connection to one broker.
///
/// # 使用例
/// ```ignore
/// let broker = InMemoryBroker::new();
/// broker.enqueue("todo", "widget/cutting/partA").await;
/// let task = broker.atomic_transfer("todo", "taken", Duration::from_secs(1)).await?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer side: pushes `value` at the head of `list` (not journaled).
    pub async fn enqueue(&self, list: &str, value: &str) {
        {
            let mut state = self.state.lock().await;
            state
                .lists
                .entry(list.to_owned())
                .or_default()
                .push_front(value.to_owned());
        }
        self.notify.notify_waiters();
    }

    /// Producer side: adds `value` to `set` (not journaled).
    pub async fn add_to_set(&self, set: &str, value: &str) {
        let mut state = self.state.lock().await;
        state
            .sets
            .entry(set.to_owned())
            .or_default()
            .insert(value.to_owned());
    }

    /// Contents of `list`, head first.
    pub async fn list(&self, list: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .lists
            .get(list)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Members of `set`, sorted.
    pub async fn set(&self, set: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .sets
            .get(set)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.state.lock().await.journal.clone()
    }

    /// Messages published on `channel`, oldest first.
    pub async fn published(&self, channel: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .journal
            .iter()
            .filter(|e| e.op == BrokerOp::Publish && e.key == channel)
            .map(|e| e.value.clone())
            .collect()
    }

    /// Makes the next `times` calls of `op` fail with `error`.
    pub async fn fail_next(&self, op: BrokerOp, times: usize, error: BrokerError) {
        let mut state = self.state.lock().await;
        if times == 0 {
            state.failures.remove(&op);
        } else {
            state.failures.insert(op, (times, error));
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn atomic_transfer(
        &self,
        source: &str,
        dest: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrokerError> {
        // too far out to represent: wait without a deadline
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            {
                let mut state = self.state.lock().await;
                state.take_failure(BrokerOp::AtomicTransfer)?;

                if let Some(value) = state.lists.get_mut(source).and_then(|l| l.pop_back()) {
                    state
                        .lists
                        .entry(dest.to_owned())
                        .or_default()
                        .push_front(value.clone());
                    state.record(BrokerOp::AtomicTransfer, dest, &value);
                    return Ok(Some(value));
                }

                // register before releasing the lock so a concurrent push is not missed
                notified.as_mut().enable();
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn append_list(&self, list: &str, value: &str) -> Result<(), BrokerError> {
        {
            let mut state = self.state.lock().await;
            state.take_failure(BrokerOp::AppendList)?;
            state
                .lists
                .entry(list.to_owned())
                .or_default()
                .push_front(value.to_owned());
            state.record(BrokerOp::AppendList, list, value);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn remove_one_from_list(&self, list: &str, value: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.take_failure(BrokerOp::RemoveOneFromList)?;
        let removed = match state.lists.get_mut(list) {
            Some(l) => match l.iter().position(|v| v == value) {
                Some(index) => l.remove(index).is_some(),
                None => false,
            },
            None => false,
        };
        if removed {
            state.record(BrokerOp::RemoveOneFromList, list, value);
        }
        Ok(())
    }

    async fn remove_from_set(&self, set: &str, value: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.take_failure(BrokerOp::RemoveFromSet)?;
        let removed = state
            .sets
            .get_mut(set)
            .is_some_and(|s| s.remove(value));
        if removed {
            state.record(BrokerOp::RemoveFromSet, set, value);
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.take_failure(BrokerOp::Publish)?;
        state.record(BrokerOp::Publish, channel, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn transfer_moves_tail_to_head_of_dest() {
        let broker = InMemoryBroker::new();
        broker.enqueue("todo", "a/b/1").await;
        broker.enqueue("todo", "a/b/2").await;
        broker.enqueue("taken", "a/b/0").await;

        let moved = broker.atomic_transfer("todo", "taken", SECOND).await.unwrap();

        assert_eq!(moved.as_deref(), Some("a/b/1"));
        assert_eq!(broker.list("todo").await, vec!["a/b/2"]);
        assert_eq!(broker.list("taken").await, vec!["a/b/1", "a/b/0"]);
    }

    #[tokio::test]
    async fn transfer_keeps_the_total_number_of_elements() {
        let broker = InMemoryBroker::new();
        for v in ["x/y/1", "x/y/2", "x/y/2"] {
            broker.enqueue("todo", v).await;
        }
        let before = broker.list("todo").await.len() + broker.list("taken").await.len();

        broker.atomic_transfer("todo", "taken", SECOND).await.unwrap();
        broker.atomic_transfer("todo", "taken", SECOND).await.unwrap();

        let after = broker.list("todo").await.len() + broker.list("taken").await.len();
        assert_eq!(before, after);
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_times_out_with_none() {
        let broker = InMemoryBroker::new();
        let start = tokio::time::Instant::now();

        let moved = broker
            .atomic_transfer("todo", "taken", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(moved, None);
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!(broker.list("taken").await.is_empty());
        assert!(broker.journal().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_wakes_a_blocked_transfer() {
        let broker = InMemoryBroker::new();

        let poll = tokio::spawn({
            let broker = broker.clone();
            async move {
                broker
                    .atomic_transfer("todo", "taken", Duration::from_secs(60))
                    .await
                    .unwrap()
            }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        broker.enqueue("todo", "widget/cutting/partA").await;

        assert_eq!(poll.await.unwrap().as_deref(), Some("widget/cutting/partA"));
        assert_eq!(broker.list("taken").await, vec!["widget/cutting/partA"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_waits_for_a_push() {
        let broker = InMemoryBroker::new();

        let poll = tokio::spawn({
            let broker = broker.clone();
            async move {
                broker
                    .atomic_transfer("todo", "taken", Duration::MAX)
                    .await
                    .unwrap()
            }
        });

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!poll.is_finished());
        broker.enqueue("todo", "widget/cutting/partA").await;

        assert_eq!(poll.await.unwrap().as_deref(), Some("widget/cutting/partA"));
    }

    #[tokio::test]
    async fn removing_absent_values_is_a_no_op() {
        let broker = InMemoryBroker::new();
        broker.enqueue("taken", "a/b/c").await;
        broker.add_to_set("dedup", "a/b/c").await;

        broker.remove_one_from_list("taken", "zzz").await.unwrap();
        broker.remove_one_from_list("missing", "a/b/c").await.unwrap();
        broker.remove_from_set("dedup", "zzz").await.unwrap();
        broker.remove_from_set("missing", "a/b/c").await.unwrap();

        assert_eq!(broker.list("taken").await, vec!["a/b/c"]);
        assert_eq!(broker.set("dedup").await, vec!["a/b/c"]);
        assert!(broker.journal().await.is_empty());
    }

    #[tokio::test]
    async fn remove_one_only_removes_a_single_occurrence() {
        let broker = InMemoryBroker::new();
        broker.enqueue("taken", "a/b/c").await;
        broker.enqueue("taken", "a/b/c").await;

        broker.remove_one_from_list("taken", "a/b/c").await.unwrap();

        assert_eq!(broker.list("taken").await, vec!["a/b/c"]);
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let broker = InMemoryBroker::new();
        broker
            .fail_next(BrokerOp::AppendList, 2, BrokerError::Transport("reset".into()))
            .await;

        assert!(broker.append_list("done", "a/b/c").await.is_err());
        assert!(broker.append_list("done", "a/b/c").await.is_err());
        broker.append_list("done", "a/b/c").await.unwrap();

        assert_eq!(broker.list("done").await, vec!["a/b/c"]);
    }

    #[tokio::test]
    async fn publish_is_recorded_per_channel() {
        let broker = InMemoryBroker::new();
        broker.publish("events", "one").await.unwrap();
        broker.publish("other", "two").await.unwrap();

        assert_eq!(broker.published("events").await, vec!["one"]);
    }
}
