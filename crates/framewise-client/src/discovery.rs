//! Meeting discovery.
//!
//! The service announces meetings for an API key on a dedicated socket
//! (`/ws/api_key/{key}`). Each announcement is a JSON object carrying a
//! `meeting_id` and, when an agent is requested, an `agent_name`.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::{Backoff, Connection};
use crate::error::ConfigError;
use crate::shutdown::ShutdownHandle;
use crate::transport::{Transport, WsTransport};

/// Agent name logged for announcements that do not name one.
pub const UNNAMED_AGENT: &str = "unnamed_agent";

/// One message on the discovery socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Announcement {
    #[serde(default)]
    pub meeting_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Announcement {
    /// Returns the agent name, or [`UNNAMED_AGENT`].
    pub fn agent_name_or_default(&self) -> &str {
        self.agent_name.as_deref().unwrap_or(UNNAMED_AGENT)
    }
}

/// Reads announcements from the discovery socket, reconnecting as needed.
pub struct DiscoveryListener<T: Transport = WsTransport> {
    connection: Connection<T>,
    shutdown: ShutdownHandle,
}

impl DiscoveryListener<WsTransport> {
    /// Creates a listener for the configured API key.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingApiKey`] if no key is configured.
    pub fn from_config(config: &ClientConfig, shutdown: ShutdownHandle) -> Result<Self, ConfigError> {
        let transport = WsTransport::new(config.connection.connect_timeout());
        let reconnect = &config.reconnect;
        let connection = Connection::new(transport, config.discovery_url()?)
            .with_backoff(Backoff::new(reconnect.initial_delay(), reconnect.max_delay()));
        Ok(Self::new(connection, shutdown))
    }
}

impl<T: Transport> DiscoveryListener<T> {
    pub fn new(connection: Connection<T>, shutdown: ShutdownHandle) -> Self {
        Self {
            connection,
            shutdown,
        }
    }

    /// Returns the shutdown handle that stops this listener.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Waits for the next announcement.
    ///
    /// Connect failures and dropped sockets are retried with backoff.
    /// Messages that are not JSON objects are logged and skipped. Returns
    /// `None` once shutdown is triggered; the socket is closed by then.
    pub async fn next_announcement(&mut self) -> Option<Announcement> {
        loop {
            if self.shutdown.is_shutdown() {
                self.connection.disconnect().await;
                return None;
            }

            if !self.connection.is_connected() {
                let shutdown = self.shutdown.triggered();
                let result = tokio::select! {
                    result = self.connection.connect() => result,
                    _ = shutdown => continue,
                };
                if result.is_err() {
                    let delay = self.connection.next_reconnect_delay();
                    info!(delay_secs = delay.as_secs(), "retrying discovery connect");
                    self.shutdown.sleep(delay).await;
                }
                continue;
            }

            let shutdown = self.shutdown.triggered();
            let frame = tokio::select! {
                biased;
                _ = shutdown => continue,
                frame = self.connection.receive() => frame,
            };

            match frame {
                Ok(text) => match serde_json::from_str::<Announcement>(&text) {
                    Ok(announcement) => {
                        debug!(?announcement, "discovery message");
                        return Some(announcement);
                    }
                    Err(e) => warn!(error = %e, "skipping unreadable discovery message"),
                },
                Err(e) => {
                    let delay = self.connection.next_reconnect_delay();
                    warn!(error = %e, delay_secs = delay.as_secs(), "discovery socket lost");
                    self.shutdown.sleep(delay).await;
                }
            }
        }
    }

    /// Returns the first announced meeting ID.
    ///
    /// Announcements without a `meeting_id` are skipped. Returns `None` if
    /// `timeout` elapses or shutdown is triggered first.
    pub async fn await_meeting(&mut self, timeout: Option<Duration>) -> Option<String> {
        let wait = async {
            while let Some(announcement) = self.next_announcement().await {
                match announcement.meeting_id.as_deref() {
                    Some(meeting_id) if !meeting_id.is_empty() => {
                        info!(
                            meeting_id,
                            agent = announcement.agent_name_or_default(),
                            "meeting announced"
                        );
                        return Some(meeting_id.to_string());
                    }
                    _ => warn!("discovery message without meeting_id"),
                }
            }
            None
        };

        let found = match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(found) => found,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "timed out waiting for a meeting");
                    None
                }
            },
            None => wait.await,
        };
        self.connection.disconnect().await;
        found
    }
}

/// Connects to the discovery socket and waits for a meeting to be announced.
///
/// # Errors
///
/// [`ConfigError::MissingApiKey`] if no key is configured.
pub async fn await_meeting(
    config: &ClientConfig,
    timeout: Option<Duration>,
) -> Result<Option<String>, ConfigError> {
    let mut listener = DiscoveryListener::from_config(config, ShutdownHandle::new())?;
    Ok(listener.await_meeting(timeout).await)
}
