//! MQTT transport for the drive channel

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;

use super::publisher::MessageSink;
use crate::{Error, Result};

/// Capacity of the client request queue
const REQUEST_QUEUE: usize = 32;

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Pause between reconnect attempts after a connection error
    pub reconnect_delay: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "voicedrive".to_string(),
            keep_alive: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// At-most-once MQTT sink with a background event loop
///
/// The event loop task keeps retrying the broker while the link is open and
/// tracks connectivity for [`MessageSink::is_connected`].
pub struct MqttLink {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttLink {
    /// Start the client and its event loop
    ///
    /// Does not wait for the broker; use [`Self::wait_connected`] for that.
    #[must_use]
    pub fn open(settings: &MqttSettings) -> Self {
        let mut options =
            MqttOptions::new(settings.client_id.clone(), settings.host.clone(), settings.port);
        options.set_keep_alive(settings.keep_alive);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_QUEUE);
        let connected = Arc::new(AtomicBool::new(false));
        let closing = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(drive_event_loop(
            eventloop,
            Arc::clone(&connected),
            Arc::clone(&closing),
            settings.reconnect_delay,
        ));

        tracing::debug!(
            host = %settings.host,
            port = settings.port,
            client_id = %settings.client_id,
            "mqtt link opened"
        );

        Self {
            client,
            connected,
            closing,
            task: Mutex::new(Some(task)),
        }
    }

    /// Wait up to `timeout` for the broker to accept the connection
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.connected.load(Ordering::SeqCst) {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    /// Queue a disconnect behind any pending publishes
    ///
    /// Idempotent. The event loop exits once the disconnect is sent.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "mqtt disconnect not queued");
        }
        tracing::debug!("mqtt link closing");
    }

    /// Close and wait up to `grace` for queued messages to flush
    pub async fn shutdown(&self, grace: Duration) {
        self.close();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut task) = task {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                tracing::warn!("mqtt event loop did not finish in time");
                task.abort();
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("mqtt link closed");
    }
}

impl MessageSink for MqttLink {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(Error::ChannelUnavailable("link closed".to_string()));
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| Error::ChannelUnavailable(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closing.load(Ordering::SeqCst)
    }

    fn close(&self) {
        Self::close(self);
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        Self::close(self);
    }
}

/// Poll the event loop until the link is closed
async fn drive_event_loop(
    mut eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    reconnect_delay: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    connected.store(true, Ordering::SeqCst);
                    tracing::info!("connected to mqtt broker");
                } else {
                    tracing::warn!(code = ?ack.code, "mqtt broker refused connection");
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                tracing::warn!("mqtt broker disconnected");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let was_connected = connected.swap(false, Ordering::SeqCst);
                if closing.load(Ordering::SeqCst) {
                    break;
                }
                if was_connected {
                    tracing::warn!(error = %e, "mqtt connection lost, retrying");
                } else {
                    tracing::debug!(error = %e, "mqtt connect failed, retrying");
                }
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
    tracing::debug!("mqtt event loop stopped");
}
