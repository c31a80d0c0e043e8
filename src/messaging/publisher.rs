use crate::{
    collaborators::{CacheLayer, CollaboratorError, LeagueService, NotificationFeed, QuestService},
    messaging::config::RabbitMqConfig,
    model::effects::NotificationKind
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

const NOTIFICATION_ROUTE: &str = "weekly.notifications";
const QUEST_ROUTE: &str = "weekly.quests";
const LEAGUE_SCORE_ROUTE: &str = "weekly.leagues.score";
const LEAGUE_FINALIZE_ROUTE: &str = "weekly.leagues.finalize";
const CACHE_ROUTE: &str = "weekly.cache";

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Failed to connect to RabbitMQ: {0}")]
    ConnectionError(#[from] lapin::Error),

    #[error("Failed to serialize message: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Publisher not initialized")]
    NotInitialized
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedNotificationMessage {
    pub user_id: i32,
    pub kind: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssignWeeklyQuestsMessage {
    pub user_id: i32,
    pub requested_at: DateTime<Utc>
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScoreLeagueWeekMessage {
    pub league_id: i32,
    pub week_number: i32,
    pub requested_at: DateTime<Utc>
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FinalizeLeagueMessage {
    pub league_id: i32,
    pub requested_at: DateTime<Utc>
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvalidateCacheMessage {
    pub pattern: String,
    pub requested_at: DateTime<Utc>
}

/// MassTransit message envelope structure
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MassTransitEnvelope<T> {
    message_id: String,
    conversation_id: String,
    correlation_id: Option<String>,
    source_address: String,
    destination_address: String,
    message_type: Vec<String>,
    message: T,
    sent_time: DateTime<Utc>
}

/// RabbitMQ publisher for the messages a weekly run hands to other services.
///
/// One instance is shared by every concurrent side effect. A disabled publisher
/// accepts and drops every message.
pub struct RabbitMqPublisher {
    config: RabbitMqConfig,
    connection: Option<Connection>,
    channel: Option<Channel>
}

impl RabbitMqPublisher {
    /// Creates a new RabbitMQ publisher from configuration
    pub fn from_config(config: &RabbitMqConfig) -> Self {
        Self {
            config: config.clone(),
            connection: None,
            channel: None
        }
    }

    /// Creates and connects a publisher from configuration
    pub async fn connect_from_config(config: &RabbitMqConfig) -> Result<Self, PublisherError> {
        let mut publisher = Self::from_config(config);
        publisher.connect_with_retry().await?;
        Ok(publisher)
    }

    /// Connects to RabbitMQ and declares the exchange
    pub async fn connect(&mut self) -> Result<(), PublisherError> {
        let connection = Connection::connect(&self.config.connection_url(), ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default()
            )
            .await?;

        self.connection = Some(connection);
        self.channel = Some(channel);

        info!(
            "Connected to RabbitMQ at {}:{}, exchange '{}' declared",
            self.config.host, self.config.port, self.config.exchange
        );

        Ok(())
    }

    /// Connects, retrying with a doubling delay capped at `max_retry_delay`
    pub async fn connect_with_retry(&mut self) -> Result<(), PublisherError> {
        let mut delay = self.config.retry_delay;
        let mut attempt = 1;

        loop {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.retry_attempts => {
                    warn!(
                        "RabbitMQ connection attempt {}/{} failed: {}",
                        attempt, self.config.retry_attempts, e
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.config.max_retry_delay);
                    attempt += 1;
                }
                Err(e) => return Err(e)
            }
        }
    }

    /// Checks if the publisher is connected
    pub fn is_connected(&self) -> bool {
        self.connection.is_some() && self.channel.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// True when both the connection and the channel report themselves open
    pub async fn health_check(&self) -> Result<bool, PublisherError> {
        match (&self.connection, &self.channel) {
            (Some(connection), Some(channel)) => Ok(connection.status().connected() && channel.status().connected()),
            _ => Ok(false)
        }
    }

    /// Wraps `message` in a MassTransit envelope and publishes it under `routing_key`
    pub async fn publish<T: Serialize + Send>(
        &self,
        routing_key: &str,
        message_name: &str,
        message: T
    ) -> Result<(), PublisherError> {
        if !self.config.enabled {
            debug!("Messaging disabled, dropping {} message", message_name);
            return Ok(());
        }

        let channel = self.channel.as_ref().ok_or(PublisherError::NotInitialized)?;
        let message_id = Uuid::new_v4().to_string();

        let envelope = MassTransitEnvelope {
            message_id: message_id.clone(),
            conversation_id: Uuid::new_v4().to_string(),
            correlation_id: None,
            source_address: format!("rabbitmq://{}/{}", self.config.host, self.config.exchange),
            destination_address: format!("rabbitmq://{}/{}", self.config.host, routing_key),
            message_type: vec![format!("urn:message:Velo.Messages:{}", message_name)],
            message,
            sent_time: Utc::now()
        };

        let payload = serde_json::to_vec(&envelope)?;

        let mut headers = BTreeMap::new();
        headers.insert(
            ShortString::from("Content-Type"),
            AMQPValue::LongString(LongString::from("application/vnd.masstransit+json"))
        );

        channel
            .basic_publish(
                &self.config.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/vnd.masstransit+json".into())
                    .with_headers(FieldTable::from(headers))
                    .with_message_id(message_id.into())
                    .with_timestamp(Utc::now().timestamp() as u64)
            )
            .await?;

        debug!("Published {} to '{}'", message_name, routing_key);
        Ok(())
    }

    /// Closes the connection to RabbitMQ
    pub async fn close(&mut self) -> Result<(), PublisherError> {
        if let Some(channel) = self.channel.take() {
            channel.close(200, "Normal shutdown").await?;
        }

        if let Some(connection) = self.connection.take() {
            connection.close(200, "Normal shutdown").await?;
        }

        info!("RabbitMQ connection closed");
        Ok(())
    }
}

impl Drop for RabbitMqPublisher {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("RabbitMQ publisher dropped without proper closure");
        }
    }
}

#[async_trait]
impl NotificationFeed for RabbitMqPublisher {
    async fn emit(&self, user_id: i32, kind: NotificationKind, payload: &Value) -> Result<(), CollaboratorError> {
        let message = FeedNotificationMessage {
            user_id,
            kind: kind.to_string(),
            payload: payload.clone(),
            created_at: Utc::now()
        };

        Ok(self.publish(NOTIFICATION_ROUTE, "FeedNotificationMessage", message).await?)
    }
}

#[async_trait]
impl QuestService for RabbitMqPublisher {
    async fn assign_weekly_quests(&self, user_id: i32) -> Result<(), CollaboratorError> {
        let message = AssignWeeklyQuestsMessage {
            user_id,
            requested_at: Utc::now()
        };

        Ok(self.publish(QUEST_ROUTE, "AssignWeeklyQuestsMessage", message).await?)
    }
}

#[async_trait]
impl LeagueService for RabbitMqPublisher {
    async fn score_week(&self, league_id: i32, week_number: i32) -> Result<(), CollaboratorError> {
        let message = ScoreLeagueWeekMessage {
            league_id,
            week_number,
            requested_at: Utc::now()
        };

        Ok(self.publish(LEAGUE_SCORE_ROUTE, "ScoreLeagueWeekMessage", message).await?)
    }

    async fn finalize(&self, league_id: i32) -> Result<(), CollaboratorError> {
        let message = FinalizeLeagueMessage {
            league_id,
            requested_at: Utc::now()
        };

        Ok(self.publish(LEAGUE_FINALIZE_ROUTE, "FinalizeLeagueMessage", message).await?)
    }
}

#[async_trait]
impl CacheLayer for RabbitMqPublisher {
    async fn invalidate(&self, pattern: &str) -> Result<(), CollaboratorError> {
        let message = InvalidateCacheMessage {
            pattern: pattern.to_string(),
            requested_at: Utc::now()
        };

        Ok(self.publish(CACHE_ROUTE, "InvalidateCacheMessage", message).await?)
    }
}
