//! WorkerBuilder - ワーカーループの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::app::backoff::BackoffPolicy;
use crate::app::runtime::{HandlerRegistry, RegistryError, Runtime, TaskHandler};
use crate::app::worker_loop::{DedupMode, EventsMode, QueueError, QueueNames, WorkerLoop};
use crate::config::{DEFAULT_POLL_TIMEOUT_SECS, WorkerConfig};
use crate::domain::{LoopState, WorkerId};
use crate::ports::{Broker, Clock, SystemClock};

/// BuildError はワーカー構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid queues: {0}")]
    InvalidQueues(#[from] QueueError),

    #[error("dedup is enabled but the set name is empty")]
    MissingDedupSet,

    #[error("events are enabled but the channel is empty")]
    MissingEventsChannel,

    #[error("poll timeout must be at least one second")]
    PollTimeoutTooShort,

    #[error("no handler registered")]
    NoHandlers,

    #[error("Missing handlers for natures: {0:?}. These natures were expected but not registered.")]
    MissingNatures(Vec<String>),
}

/// WorkerBuilder はワーカーループを構築
///
/// # 使用例
/// ```ignore
/// let worker = WorkerBuilder::new(broker, QueueNames::new("todo", "todo/taken", "global/done"))
///     .dedup(DedupMode::Enabled { set: "todo-set".into() })
///     .register("widget", Arc::new(WidgetHandler))?
///     .expect_natures(&["widget"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時にキュー名、dedup、イベント設定を検証
/// - expect_natures() で期待される nature が全て処理可能かチェック
pub struct WorkerBuilder {
    broker: Arc<dyn Broker>,
    queues: QueueNames,
    dedup: DedupMode,
    events: EventsMode,
    poll_timeout: Duration,
    backoff: BackoffPolicy,
    registry: HandlerRegistry,
    shared_runtime: Option<Runtime>,
    clock: Arc<dyn Clock>,
    expected_natures: Option<Vec<String>>,
}

impl WorkerBuilder {
    pub fn new(broker: Arc<dyn Broker>, queues: QueueNames) -> Self {
        Self {
            broker,
            queues,
            dedup: DedupMode::Disabled,
            events: EventsMode::Disabled,
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            backoff: BackoffPolicy::default(),
            registry: HandlerRegistry::new(),
            shared_runtime: None,
            clock: Arc::new(SystemClock),
            expected_natures: None,
        }
    }

    /// Takes queues, dedup, events, poll timeout and backoff from `config`.
    pub fn from_config(broker: Arc<dyn Broker>, config: &WorkerConfig) -> Self {
        Self::new(broker, QueueNames::from(&config.queues))
            .dedup(DedupMode::from(&config.dedup))
            .events(EventsMode::from(&config.events))
            .poll_timeout(config.poll_timeout())
            .backoff(config.poll_backoff.clone())
    }

    pub fn dedup(mut self, dedup: DedupMode) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn events(mut self, events: EventsMode) -> Self {
        self.events = events;
        self
    }

    pub fn poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handler を登録
    ///
    /// Drops a runtime set earlier with [`runtime`](Self::runtime).
    pub fn register(
        mut self,
        nature: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Self, RegistryError> {
        self.registry.register(nature, handler)?;
        self.shared_runtime = None;
        Ok(self)
    }

    pub fn fallback(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.registry.set_fallback(handler);
        self.shared_runtime = None;
        self
    }

    /// Uses a runtime shared with other workers instead of the local registry.
    pub fn runtime(mut self, runtime: Runtime) -> Self {
        self.shared_runtime = Some(runtime);
        self
    }

    /// 期待される nature のリストを設定
    pub fn expect_natures(mut self, natures: &[&str]) -> Self {
        self.expected_natures = Some(natures.iter().map(|n| n.to_string()).collect());
        self
    }

    /// WorkerBuilder を検証して WorkerLoop を生成
    pub fn build(self) -> Result<WorkerLoop, BuildError> {
        self.queues.validate()?;
        if let DedupMode::Enabled { set } = &self.dedup
            && set.trim().is_empty()
        {
            return Err(BuildError::MissingDedupSet);
        }
        if let EventsMode::Enabled { channel } = &self.events
            && channel.trim().is_empty()
        {
            return Err(BuildError::MissingEventsChannel);
        }
        if self.poll_timeout < Duration::from_secs(1) {
            return Err(BuildError::PollTimeoutTooShort);
        }

        let runtime = match self.shared_runtime {
            Some(runtime) => runtime,
            None => Runtime::new(Arc::new(self.registry)),
        };
        let registry = runtime.registry();
        if registry.is_empty() {
            return Err(BuildError::NoHandlers);
        }
        if let Some(expected) = &self.expected_natures
            && !registry.has_fallback()
        {
            let registered = registry.registered_natures();
            let missing: Vec<String> = expected
                .iter()
                .filter(|n| !registered.contains(n))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingNatures(missing));
            }
        }

        let id = WorkerId::generate(self.clock.as_ref());
        let (state, _) = watch::channel(LoopState::Idle);
        Ok(WorkerLoop {
            id,
            broker: self.broker,
            runtime,
            queues: self.queues,
            dedup: self.dedup,
            events: self.events,
            poll_timeout: self.poll_timeout,
            backoff: self.backoff,
            clock: self.clock,
            state,
            poll_failures: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::runtime::HandlerError;
    use crate::config::QueueConfig;
    use crate::domain::TaskName;
    use crate::impls::InMemoryBroker;
    use crate::ports::FixedClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    struct Noop;

    #[async_trait]
    impl TaskHandler for Noop {
        async fn execute(&self, _task: &TaskName) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn builder() -> WorkerBuilder {
        WorkerBuilder::new(
            Arc::new(InMemoryBroker::new()),
            QueueNames::new("todo", "todo/taken", "global/done"),
        )
    }

    #[test]
    fn test_build_success() {
        let worker = builder()
            .register("widget", Arc::new(Noop))
            .unwrap()
            .expect_natures(&["widget"])
            .build();
        assert!(worker.is_ok());
    }

    #[test]
    fn test_build_missing_natures() {
        let worker = builder()
            .register("widget", Arc::new(Noop))
            .unwrap()
            .expect_natures(&["widget", "trt"])
            .build();
        assert!(matches!(
            worker,
            Err(BuildError::MissingNatures(missing)) if missing == vec!["trt".to_string()]
        ));
    }

    #[test]
    fn test_fallback_covers_expected_natures() {
        let worker = builder()
            .fallback(Arc::new(Noop))
            .expect_natures(&["widget", "trt"])
            .build();
        assert!(worker.is_ok());
    }

    #[test]
    fn test_build_without_handlers() {
        assert!(matches!(builder().build(), Err(BuildError::NoHandlers)));
    }

    #[test]
    fn test_build_rejects_bad_settings() {
        let same_queues = WorkerBuilder::new(
            Arc::new(InMemoryBroker::new()),
            QueueNames::new("todo", "todo", "global/done"),
        )
        .fallback(Arc::new(Noop))
        .build();
        assert!(matches!(
            same_queues,
            Err(BuildError::InvalidQueues(QueueError::TakenIsInput))
        ));

        let no_set = builder()
            .fallback(Arc::new(Noop))
            .dedup(DedupMode::Enabled { set: String::new() })
            .build();
        assert!(matches!(no_set, Err(BuildError::MissingDedupSet)));

        let no_channel = builder()
            .fallback(Arc::new(Noop))
            .events(EventsMode::Enabled { channel: " ".into() })
            .build();
        assert!(matches!(no_channel, Err(BuildError::MissingEventsChannel)));

        let short = builder()
            .fallback(Arc::new(Noop))
            .poll_timeout(Duration::from_millis(500))
            .build();
        assert!(matches!(short, Err(BuildError::PollTimeoutTooShort)));
    }

    #[test]
    fn test_shared_runtime() {
        let mut registry = HandlerRegistry::new();
        registry.register("widget", Arc::new(Noop)).unwrap();
        let runtime = Runtime::new(Arc::new(registry));

        let first = builder().runtime(runtime.clone()).build().unwrap();
        let second = builder().runtime(runtime).build().unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_from_config() {
        let mut config = WorkerConfig::new(QueueConfig::new("trt/plantA/todo"));
        config.dedup.enabled = true;
        config.dedup.set_name = "trt/plantA/todo-set".into();
        config.poll_timeout_secs = 5;

        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let worker = WorkerBuilder::from_config(Arc::new(InMemoryBroker::new()), &config)
            .clock(Arc::new(FixedClock::new(at)))
            .fallback(Arc::new(Noop))
            .build()
            .unwrap();

        assert_eq!(worker.queues().taken, "trt/plantA/todo/taken");
        assert_eq!(
            worker.dedup(),
            &DedupMode::Enabled {
                set: "trt/plantA/todo-set".into()
            }
        );
        assert_eq!(worker.poll_timeout(), Duration::from_secs(5));
        assert_eq!(worker.id().as_ulid().timestamp_ms(), at.timestamp_millis() as u64);
    }
}
