use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::producer::FutureProducer;

use crate::config::KafkaConfig;

/// Build a producer with full acknowledgement, used for both the accepted
/// and status topics. Per-write timeouts are supplied at send time.
pub fn new_producer(cfg: &KafkaConfig) -> Result<FutureProducer, KafkaError> {
    ClientConfig::new()
        .set("bootstrap.servers", &cfg.brokers)
        .set("acks", "all")
        .set("message.timeout.ms", "30000")
        .set("linger.ms", "10")
        .create()
}

/// Build a consumer subscribed to `topic` in the given consumer group.
/// Callers that want parallelism create one consumer per reader task; the
/// group balances partitions across them.
pub fn new_consumer(
    cfg: &KafkaConfig,
    topic: &str,
    group: &str,
) -> Result<StreamConsumer, KafkaError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &cfg.brokers)
        .set("group.id", group)
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "true")
        .set("session.timeout.ms", "6000")
        .create()?;

    consumer.subscribe(&[topic])?;

    Ok(consumer)
}
