use async_trait::async_trait;
use carshare_core::{Notifier, NotifyError};
use carshare_shared::{PushMessage, RideConfirmationEmail};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

use crate::app_config::KafkaConfig;

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!("Sent message to {}/{}: partition {} offset {}", topic, key, delivery.partition, delivery.offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Hands notifications to delivery workers as JSON records
pub struct KafkaNotifier {
    producer: EventProducer,
    email_topic: String,
    push_topic: String,
}

impl KafkaNotifier {
    pub fn new(config: &KafkaConfig) -> Result<Self, rdkafka::error::KafkaError> {
        Ok(Self {
            producer: EventProducer::new(&config.brokers)?,
            email_topic: config.email_topic.clone(),
            push_topic: config.push_topic.clone(),
        })
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn send_email(&self, email: &RideConfirmationEmail) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(email).map_err(|e| NotifyError::Delivery(e.to_string()))?;
        let key = format!("{}:{:?}", email.request_id, email.role);
        self.producer
            .publish(&self.email_topic, &key, &payload)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }

    async fn send_push(&self, message: &PushMessage) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(message).map_err(|e| NotifyError::Delivery(e.to_string()))?;
        self.producer
            .publish(&self.push_topic, &message.recipient_id, &payload)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}
