//! RedisBroker - 本番用のブローカー
//!
//! | 操作 | Redis コマンド |
//! |---|---|
//! | atomic_transfer | `BRPOPLPUSH source dest timeout` |
//! | append_list | `LPUSH list value` |
//! | remove_one_from_list | `LREM list 1 value` |
//! | remove_from_set | `ZREM set value`（dedup セットは enqueue 時刻をスコアにした sorted set） |
//! | publish | `PUBLISH channel message` |
//!
//! 接続はワーカーごとに 1 本で、再接続やプーリングは行いません。

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use crate::ports::{Broker, BrokerError};

impl From<redis::RedisError> for BrokerError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            BrokerError::Transport(e.to_string())
        } else {
            BrokerError::Protocol(e.to_string())
        }
    }
}

pub struct RedisBroker {
    con: MultiplexedConnection,
}

impl RedisBroker {
    /// Opens one connection to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)?;
        let con = client.get_multiplexed_async_connection().await?;
        debug!(url, "got redis connection");
        Ok(Self { con })
    }

    pub fn from_connection(con: MultiplexedConnection) -> Self {
        Self { con }
    }
}

/// BRPOPLPUSH takes whole seconds and treats 0 as "block forever".
fn blocking_timeout_secs(timeout: Duration) -> u64 {
    timeout.as_secs().max(1)
}

#[async_trait]
impl Broker for RedisBroker {
    async fn atomic_transfer(
        &self,
        source: &str,
        dest: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrokerError> {
        let mut con = self.con.clone();
        let moved: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(source)
            .arg(dest)
            .arg(blocking_timeout_secs(timeout))
            .query_async(&mut con)
            .await?;
        Ok(moved)
    }

    async fn append_list(&self, list: &str, value: &str) -> Result<(), BrokerError> {
        let mut con = self.con.clone();
        con.lpush::<_, _, ()>(list, value).await?;
        Ok(())
    }

    async fn remove_one_from_list(&self, list: &str, value: &str) -> Result<(), BrokerError> {
        let mut con = self.con.clone();
        con.lrem::<_, _, ()>(list, 1, value).await?;
        Ok(())
    }

    async fn remove_from_set(&self, set: &str, value: &str) -> Result<(), BrokerError> {
        let mut con = self.con.clone();
        con.zrem::<_, _, ()>(set, value).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), BrokerError> {
        let mut con = self.con.clone();
        con.publish::<_, _, ()>(channel, message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Duration::from_secs(60), 60)]
    #[case(Duration::from_millis(1500), 1)]
    #[case(Duration::from_millis(200), 1)]
    #[case(Duration::ZERO, 1)]
    fn blocking_timeout_never_means_forever(#[case] timeout: Duration, #[case] expected: u64) {
        assert_eq!(blocking_timeout_secs(timeout), expected);
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_connecting() {
        let result = RedisBroker::connect("not a redis url").await;
        assert!(matches!(result, Err(BrokerError::Protocol(_))));
    }

    #[test]
    fn io_errors_are_transport_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: BrokerError = redis::RedisError::from(io).into();
        assert!(matches!(err, BrokerError::Transport(_)));

        let err: BrokerError =
            redis::RedisError::from((redis::ErrorKind::TypeError, "WRONGTYPE")).into();
        assert!(matches!(err, BrokerError::Protocol(_)));
    }
}
