//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryBroker**: 開発・テスト用のブローカー
//! - **RedisBroker**: 本番用のブローカー
//! - **SimulatedHandler**: 作業を模した handler

pub mod inmem_broker;
pub mod redis_broker;
pub mod simulated;

// 主要な型を再エクスポート
pub use self::inmem_broker::InMemoryBroker;
pub use self::redis_broker::RedisBroker;
pub use self::simulated::SimulatedHandler;
