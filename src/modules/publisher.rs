use futures::future::BoxFuture;

pub type PublishFuture<'a> = BoxFuture<'a, Result<(), PublishError>>;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publisher unavailable: {0}")]
    Unavailable(String),
    #[error("failed to publish to topic {topic}: {reason}")]
    Rejected { topic: String, reason: String },
    #[error("failed to serialize record for topic {topic}: {source}")]
    Serialize {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Delivery boundary that modules hand serialized records to.
///
/// The pipeline never calls `publish` itself; it only checks reachability at
/// startup through [`EventPublisher::ping`].
pub trait EventPublisher: Send + Sync + 'static {
    fn publish<'a>(&'a self, topic: &'a str, payload: Vec<u8>) -> PublishFuture<'a>;

    fn ping(&self) -> PublishFuture<'_>;
}
