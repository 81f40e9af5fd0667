//! Best-effort publisher for the drive topic

use std::sync::Arc;

use super::DRIVE_TOPIC;
use super::encoding::{ANGULAR_SPEED, DriveEncoding, DriveMessage, LINEAR_SPEED};
use crate::{Command, Error, Result};

/// Outbound message channel
///
/// Implementations must not block beyond local queuing: `publish` is called
/// from timer tasks and teardown paths.
pub trait MessageSink: Send + Sync {
    /// Queue a payload for delivery on `topic`
    ///
    /// # Errors
    ///
    /// Returns error if the payload could not be queued
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Whether the channel is currently connected
    fn is_connected(&self) -> bool;

    /// Release the channel after any queued payloads
    fn close(&self) {}
}

/// What happened to a publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Payload handed to the channel
    Sent,
    /// Payload dropped (channel down or queue full)
    Dropped,
}

/// Renders commands and hands them to the sink, never raising to the caller
#[derive(Clone)]
pub struct DrivePublisher {
    sink: Arc<dyn MessageSink>,
    encoding: DriveEncoding,
    linear_speed: f64,
    angular_speed: f64,
}

impl DrivePublisher {
    /// Create a publisher with default speeds
    #[must_use]
    pub fn new(sink: Arc<dyn MessageSink>, encoding: DriveEncoding) -> Self {
        Self {
            sink,
            encoding,
            linear_speed: LINEAR_SPEED,
            angular_speed: ANGULAR_SPEED,
        }
    }

    /// Override the speeds used by the velocity encoding
    #[must_use]
    pub const fn with_speeds(mut self, linear: f64, angular: f64) -> Self {
        self.linear_speed = linear;
        self.angular_speed = angular;
        self
    }

    /// Encoding in use
    #[must_use]
    pub const fn encoding(&self) -> DriveEncoding {
        self.encoding
    }

    /// Whether the underlying channel is connected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.sink.is_connected()
    }

    /// Close the underlying channel
    pub fn close(&self) {
        self.sink.close();
    }

    /// Publish a command
    ///
    /// Dropped with a warning when the channel is down.
    pub fn publish(&self, command: Command) -> PublishOutcome {
        if !self.sink.is_connected() {
            let err = Error::ChannelUnavailable("not connected".to_string());
            tracing::warn!(%command, error = %err, "dropping drive command");
            return PublishOutcome::Dropped;
        }

        let message = DriveMessage::encode(
            command,
            self.encoding,
            self.linear_speed,
            self.angular_speed,
        );

        let payload = match message.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(%command, error = %e, "failed to encode drive command");
                return PublishOutcome::Dropped;
            }
        };

        match self.sink.publish(DRIVE_TOPIC, payload) {
            Ok(()) => {
                tracing::info!(%command, topic = DRIVE_TOPIC, "published drive command");
                PublishOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(%command, error = %e, "drive publish failed");
                PublishOutcome::Dropped
            }
        }
    }
}
