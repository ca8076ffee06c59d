use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("log client configuration error: {0}")]
    Config(String),
    #[error("publish failed: {0}")]
    Publish(String),
}

/// The write end of the partitioned log.
///
/// Publication is durable before it returns: an `Ok` means the partition's
/// in-sync replicas acknowledged the record. On `Err` nothing was
/// acknowledged and the caller owns the retry: the ingestion tier
/// surfaces it as a 500 and creates no partial state.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish `payload` on `topic`, partitioned by `key`.
    ///
    /// The key is the routing key: records sharing a key share a
    /// partition and are consumed in publication order.
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), LogError>;
}
