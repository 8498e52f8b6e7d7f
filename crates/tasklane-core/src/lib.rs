//! tasklane-core
//!
//! Building blocks for a worker that consumes tasks from a shared,
//! broker-backed work queue.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（task_name, state, errors, events, ids）
//! - **ports**: 抽象化レイヤー（Broker, Clock）
//! - **app**: アプリケーションロジック（builder, runtime, worker_loop, group, backoff）
//! - **impls**: 実装（InMemoryBroker, RedisBroker, SimulatedHandler）
//! - **config**: JSON 設定ファイル
//!
//! # 既知の制約
//! - ワーカーがクラッシュすると、taken リストに残ったタスクは自動では回収されない
//! - 不正なタスク名も taken リストに残る（ログで警告のみ）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
