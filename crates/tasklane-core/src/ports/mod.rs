//! Ports - 抽象化レイヤー
//!
//! 外部システム（ブローカー、時計）へのインターフェースを trait として定義し、
//! 実装の詳細を隠蔽します。ワーカーループはここにある trait にしか依存しません。

pub mod broker;
pub mod clock;

pub use self::broker::{Broker, BrokerError, BrokerOp};
pub use self::clock::{Clock, FixedClock, SystemClock};
