//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **WorkerBuilder**: ワーカーの構築とワイヤリング
//! - **Runtime**: handler の登録とディスパッチ
//! - **WorkerLoop**: タスク消費ループ（poll→dedup→parse→execute→notify→ack）
//! - **WorkerGroup**: 複数ワーカーの起動と停止
//! - **BackoffPolicy**: poll 失敗時の待ち時間

pub mod backoff;
pub mod builder;
pub mod group;
pub mod runtime;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::backoff::BackoffPolicy;
pub use self::builder::{BuildError, WorkerBuilder};
pub use self::group::WorkerGroup;
pub use self::runtime::{
    ExecuteError, HandlerError, HandlerRegistry, RegistryError, Runtime, TaskHandler,
};
pub use self::worker_loop::{DedupMode, EventsMode, QueueError, QueueNames, WorkerLoop};
