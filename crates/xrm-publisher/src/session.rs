//! A single worker's AMQP connection and channel, with publish-confirm
//! mode enabled.

use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use xrm_types::QueueMessage;

use crate::error::PublishError;

/// Lifecycle of one worker's broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Stopped,
}

/// One worker's independent connection and publish-confirm channel.
pub struct PublisherSession {
    connection: Connection,
    channel: Channel,
    state: ConnectionState,
}

impl PublisherSession {
    /// Connect and open a channel in publish-confirm mode.
    pub async fn connect(url: &str) -> Result<Self, PublishError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(PublishError::Connection)?;
        let channel = connection.create_channel().await.map_err(PublishError::Channel)?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(PublishError::Channel)?;
        Ok(Self {
            connection,
            channel,
            state: ConnectionState::Ready,
        })
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Publish `msg` to `msg.exchange` (falling back to `default_exchange`
    /// when empty), with an empty routing key, `mandatory`/`immediate`
    /// false, and content-type `text/plain`. Returns only once the broker
    /// has confirmed the publish.
    pub async fn publish(&self, msg: &QueueMessage, default_exchange: &str) -> Result<(), PublishError> {
        let exchange = if msg.exchange.is_empty() {
            default_exchange
        } else {
            msg.exchange.as_str()
        };
        let confirm = self
            .channel
            .basic_publish(
                exchange,
                "",
                BasicPublishOptions::default(),
                &msg.bytes,
                BasicProperties::default()
                    .with_content_type("text/plain".into())
                    .with_headers(FieldTable::default()),
            )
            .await
            .map_err(PublishError::Channel)?;

        match confirm.await.map_err(PublishError::Confirm)? {
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
            Confirmation::Nack(_) => Err(PublishError::Nacked),
        }
    }

    pub async fn close(&mut self) {
        self.state = ConnectionState::Stopped;
        let _ = self.channel.close(200, "shutdown").await;
        let _ = self.connection.close(200, "shutdown").await;
    }
}
