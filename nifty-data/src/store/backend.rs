use crate::error::BackendError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::info;

/// Key-value store with `SETEX` / `GET` semantics over string keys and serialised values.
#[async_trait]
pub trait PersistentBackend: Send + Sync {
    /// Short name used in log lines, eg/ `redis`.
    fn name(&self) -> &'static str;

    /// Health probe, called once when the store is constructed.
    async fn ping(&self) -> Result<(), BackendError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError>;

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;
}

/// Redis backend over a single multiplexed connection shared by every store operation.
#[derive(Clone)]
pub struct RedisBackend {
    connection: MultiplexedConnection,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);

    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, BackendError> {
        let client = redis::Client::open(url)?;
        let connection =
            tokio::time::timeout(op_timeout, client.get_multiplexed_async_connection())
                .await
                .map_err(|_| BackendError::Timeout)??;

        info!(%url, "connected to redis");
        Ok(Self {
            connection,
            op_timeout,
        })
    }

    async fn bounded<F, T>(&self, operation: F) -> Result<T, BackendError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.op_timeout, operation)
            .await
            .map_err(|_| BackendError::Timeout)?
            .map_err(BackendError::from)
    }
}

#[async_trait]
impl PersistentBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut connection = self.connection.clone();
        let _pong: String = self
            .bounded(redis::cmd("PING").query_async(&mut connection))
            .await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let mut connection = self.connection.clone();
        let mut command = redis::cmd("SETEX");
        command.arg(key).arg(ttl.as_secs().max(1)).arg(value);
        let () = self.bounded(command.query_async(&mut connection)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut connection = self.connection.clone();
        let mut command = redis::cmd("GET");
        command.arg(key);
        self.bounded(command.query_async(&mut connection)).await
    }
}
