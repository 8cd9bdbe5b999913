// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One MQTT connection shared by every module of the process.
//!
//! [`SharedClient`] owns the `rumqttc` connection, drives its event loop on
//! a tokio task and feeds connection and message events into a
//! [`TopicRouter`]. Modules subscribe through it with their own callbacks
//! and publish on the same connection.
//!
//! # Examples
//!
//! ```no_run
//! use coop_mqtt::SharedClient;
//! use coop_mqtt::subscription::Callback;
//! use coop_mqtt::types::QoS;
//!
//! # async fn example() -> coop_mqtt::Result<()> {
//! let client = SharedClient::builder()
//!     .host("192.168.1.50")
//!     .port(1883)
//!     .credentials("coop", "secret")
//!     .build()
//!     .await?;
//!
//! let on_light = Callback::from_fn(|msg| println!("light: {:?}", msg.payload_str()));
//! client.subscribe("coop/light/set", QoS::AtLeastOnce, on_light)?;
//!
//! client
//!     .publish("coop/door/status", "OPEN", QoS::AtLeastOnce, true)
//!     .await?;
//!
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet};
use serde::{Deserialize, Deserializer};
use tokio::sync::oneshot;

use crate::error::{Result, TransportError, ValueError};
use crate::subscription::{Callback, Message};
use crate::types::{QoS, validate_name};

use super::{MqttLogLayer, TopicRouter};

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Connection settings for a [`SharedClient`].
///
/// Can be read from JSON; durations are given in whole seconds and every
/// field except `host` is optional:
///
/// ```
/// use coop_mqtt::protocol::BrokerConfig;
///
/// let config = BrokerConfig::from_json(r#"{"host": "coop.local", "reconnect_delay": 2}"#).unwrap();
/// assert_eq!(config.host(), "coop.local");
/// assert_eq!(config.port(), 1883);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    #[serde(deserialize_with = "duration_secs")]
    keep_alive: Duration,
    #[serde(deserialize_with = "duration_secs")]
    connection_timeout: Duration,
    #[serde(deserialize_with = "duration_secs")]
    reconnect_delay: Duration,
    request_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            username: None,
            password: None,
            client_id: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
            request_capacity: 64,
        }
    }
}

impl BrokerConfig {
    /// Parses a configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::InvalidConfig` if the document is not valid JSON
    /// or a field has the wrong type.
    pub fn from_json(json: &str) -> std::result::Result<Self, ValueError> {
        serde_json::from_str(json).map_err(|e| ValueError::InvalidConfig(e.to_string()))
    }

    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the credentials if both username and password are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.username.as_deref()?, self.password.as_deref()?))
    }

    /// Returns the configured client ID, if any.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Returns the keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Returns how long [`SharedClientBuilder::build`] waits for the broker.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns the pause between reconnection attempts.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Returns the capacity of the outgoing request queue.
    #[must_use]
    pub fn request_capacity(&self) -> usize {
        self.request_capacity
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(
                TransportError::InvalidAddress("MQTT broker host is required".to_string()).into(),
            );
        }
        if !self.keep_alive.is_zero() && self.keep_alive < Duration::from_secs(1) {
            return Err(ValueError::InvalidConfig(
                "keep-alive must be zero or at least one second".to_string(),
            )
            .into());
        }
        if self.request_capacity == 0 {
            return Err(ValueError::InvalidConfig(
                "request capacity must be at least 1".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

fn duration_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Parses a broker URL such as `mqtt://host:1883` into host and port.
///
/// The `mqtt://` and `tcp://` schemes are optional; the port defaults to
/// 1883.
///
/// # Errors
///
/// Returns `TransportError::InvalidAddress` if the host is empty or the
/// port is not a number.
pub fn parse_broker_url(url: &str) -> std::result::Result<(String, u16), TransportError> {
    let url = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port) = if let Some((h, p)) = url.rsplit_once(':') {
        let port = p
            .parse()
            .map_err(|_| TransportError::InvalidAddress(format!("Invalid port: {p}")))?;
        (h, port)
    } else {
        (url, 1883)
    };

    if host.is_empty() {
        return Err(TransportError::InvalidAddress(format!("Missing host in {url:?}")));
    }
    Ok((host.to_string(), port))
}

/// A broker connection shared by independent local subscribers.
///
/// `SharedClient` is cheaply cloneable (via `Arc`). Callbacks run on the
/// event loop task, one message at a time, so a slow callback delays every
/// later message.
#[derive(Clone)]
pub struct SharedClient {
    inner: Arc<SharedClientInner>,
}

struct SharedClientInner {
    /// The MQTT async client for publishing.
    client: AsyncClient,
    /// Router holding every local subscription.
    router: Arc<TopicRouter>,
    /// Configuration used for this connection.
    config: BrokerConfig,
    /// Set once `disconnect` has been requested.
    shutdown: Arc<AtomicBool>,
}

impl SharedClient {
    /// Creates a new builder for configuring a shared connection.
    #[must_use]
    pub fn builder() -> SharedClientBuilder {
        SharedClientBuilder::default()
    }

    /// Connects to the broker at `url` with default settings.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let (host, port) = parse_broker_url(url)?;
        Self::builder().host(host).port(port).build().await
    }

    /// Registers `callback` for messages on `topic`.
    ///
    /// See [`TopicRouter::subscribe`].
    ///
    /// # Errors
    ///
    /// Returns error if the topic is invalid or the request cannot be queued.
    pub fn subscribe(&self, topic: &str, qos: QoS, callback: Callback) -> Result<()> {
        self.inner.router.subscribe(topic, qos, callback)
    }

    /// Removes one registration of `callback` from `topic`.
    ///
    /// See [`TopicRouter::unsubscribe`].
    ///
    /// # Errors
    ///
    /// Returns error if the pair is not registered or the request cannot be
    /// queued.
    pub fn unsubscribe(&self, topic: &str, callback: &Callback) -> Result<()> {
        self.inner.router.unsubscribe(topic, callback)
    }

    /// Publishes a message.
    ///
    /// # Errors
    ///
    /// Returns error if the topic is invalid or contains wildcards, or the
    /// client has been shut down.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        validate_name(topic)?;
        tracing::debug!(topic = %topic, qos = %qos, retain, "Publishing MQTT message");
        self.inner
            .client
            .publish(topic, qos.into(), retain, payload)
            .await
            .map_err(TransportError::Mqtt)?;
        Ok(())
    }

    /// Publishes without waiting for space in the request queue.
    ///
    /// Usable from synchronous code such as timers and callbacks.
    ///
    /// # Errors
    ///
    /// Returns error if the topic is invalid or the queue is full.
    pub fn try_publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        validate_name(topic)?;
        self.inner
            .client
            .try_publish(topic, qos.into(), retain, payload)
            .map_err(TransportError::Mqtt)?;
        Ok(())
    }

    /// Creates a logging layer that publishes log events on `topic` at
    /// exactly-once QoS.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTopic` if `topic` is not a valid topic name.
    pub fn log_layer(&self, topic: &str) -> Result<MqttLogLayer> {
        validate_name(topic)?;
        Ok(MqttLogLayer::new(self.inner.client.clone(), topic))
    }

    /// Returns the router behind this connection.
    #[must_use]
    pub fn router(&self) -> &Arc<TopicRouter> {
        &self.inner.router
    }

    /// Returns whether the broker connection is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.router.is_connected()
    }

    /// Returns the configuration used for this connection.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Disconnects from the broker and stops the event loop.
    ///
    /// Local subscriptions are kept.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect request cannot be sent.
    pub async fn disconnect(&self) -> Result<()> {
        tracing::info!(
            host = %self.inner.config.host,
            port = %self.inner.config.port,
            "Disconnecting from MQTT broker"
        );

        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.router.on_disconnect();
        self.inner
            .client
            .disconnect()
            .await
            .map_err(TransportError::Mqtt)?;
        Ok(())
    }
}

impl std::fmt::Debug for SharedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedClient")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("router", &self.inner.router)
            .finish()
    }
}

/// Builder for creating a [`SharedClient`].
///
/// # Examples
///
/// ```no_run
/// use coop_mqtt::SharedClient;
/// use std::time::Duration;
///
/// # async fn example() -> coop_mqtt::Result<()> {
/// let client = SharedClient::builder()
///     .host("192.168.1.50")
///     .port(1883)
///     .client_id("coop-controller")
///     .keep_alive(Duration::from_secs(60))
///     .reconnect_delay(Duration::from_secs(2))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SharedClientBuilder {
    config: BrokerConfig,
}

impl SharedClientBuilder {
    /// Replaces every setting with `config`.
    #[must_use]
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    /// Sets the MQTT client ID (default: `coop_<pid>_<n>`).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Sets the pause between reconnection attempts (default: 5 seconds).
    #[must_use]
    pub fn reconnect_delay(mut self, duration: Duration) -> Self {
        self.config.reconnect_delay = duration;
        self
    }

    /// Sets the capacity of the outgoing request queue (default: 64).
    #[must_use]
    pub fn request_capacity(mut self, capacity: usize) -> Self {
        self.config.request_capacity = capacity;
        self
    }

    /// Builds the client and waits for the broker to accept the connection.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Host is not set or a setting is out of range
    /// - Connection fails
    /// - Connection times out (`TransportError::Timeout`, in milliseconds)
    pub async fn build(self) -> Result<SharedClient> {
        let config = self.config;
        config.validate()?;

        let client_id = config.client_id.clone().unwrap_or_else(|| {
            let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("coop_{}_{}", std::process::id(), counter)
        });

        let mut mqtt_options = MqttOptions::new(&client_id, &config.host, config.port);
        mqtt_options.set_keep_alive(config.keep_alive);
        mqtt_options.set_clean_session(true);
        if let Some((username, password)) = config.credentials() {
            mqtt_options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, config.request_capacity);
        let router = Arc::new(TopicRouter::new(Arc::new(client.clone())));
        let shutdown = Arc::new(AtomicBool::new(false));

        let (connack_tx, connack_rx) = oneshot::channel();
        let driver = EventDriver::new(
            Arc::clone(&router),
            Arc::clone(&shutdown),
            config.reconnect_delay,
        );
        let driver_task = tokio::spawn(driver.run(event_loop, connack_tx));

        let timeout = config.connection_timeout;
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => {
                tracing::info!(
                    host = %config.host,
                    port = %config.port,
                    client_id = %client_id,
                    "Connected to MQTT broker"
                );
            }
            Ok(Err(_)) => {
                return Err(TransportError::ConnectionFailed(
                    "MQTT event loop terminated unexpectedly".to_string(),
                )
                .into());
            }
            Err(_) => {
                // Dropping the event loop closes the socket, even if the
                // broker answers late.
                driver_task.abort();
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    host = %config.host,
                    port = %config.port,
                    timeout_ms,
                    "MQTT connection attempt timed out"
                );
                return Err(TransportError::Timeout(timeout_ms).into());
            }
        }

        Ok(SharedClient {
            inner: Arc::new(SharedClientInner {
                client,
                router,
                config,
                shutdown,
            }),
        })
    }
}

/// Feeds `rumqttc` events into the router until shutdown.
struct EventDriver {
    router: Arc<TopicRouter>,
    shutdown: Arc<AtomicBool>,
    reconnect_delay: Duration,
    /// Connected, but the subscription replay has not been queued yet.
    replay_pending: bool,
    replay_failures: u32,
}

impl EventDriver {
    fn new(router: Arc<TopicRouter>, shutdown: Arc<AtomicBool>, reconnect_delay: Duration) -> Self {
        Self {
            router,
            shutdown,
            reconnect_delay,
            replay_pending: false,
            replay_failures: 0,
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    async fn run(mut self, mut event_loop: EventLoop, connack_tx: oneshot::Sender<()>) {
        let mut connack_tx = Some(connack_tx);

        loop {
            // Every poll drains the request queue a little, so a replay that
            // found it full gets another chance after each event.
            if self.replay_pending {
                self.replay();
            }

            let event = event_loop.poll().await;

            if connack_tx.as_ref().is_some_and(oneshot::Sender::is_closed) {
                tracing::debug!("Connection attempt abandoned");
                break;
            }

            match event {
                Ok(event) => {
                    let connected = matches!(event, Event::Incoming(Packet::ConnAck(_)));
                    if !self.handle(event) {
                        tracing::debug!("MQTT event loop stopped");
                        break;
                    }
                    if connected && let Some(tx) = connack_tx.take() {
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    self.disconnected();
                    if self.is_shutdown() {
                        tracing::debug!(error = %e, "MQTT event loop stopped");
                        break;
                    }
                    tracing::error!(
                        error = %e,
                        retry_in_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                        "MQTT event loop error"
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    /// Applies one event to the router. Returns `false` once the loop
    /// should stop.
    fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Incoming(Packet::ConnAck(connack)) => {
                tracing::debug!(?connack, "MQTT broker connected");
                self.replay_failures = 0;
                self.replay();
            }
            Event::Incoming(Packet::SubAck(suback)) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let message = Message::from(publish);
                tracing::debug!(
                    topic = %message.topic(),
                    bytes = message.payload().len(),
                    "MQTT message received"
                );
                self.router.on_message(&message);
            }
            Event::Incoming(Packet::Disconnect) => {
                tracing::info!("MQTT broker sent disconnect");
                self.disconnected();
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                self.disconnected();
                if self.is_shutdown() {
                    return false;
                }
            }
            _ => {}
        }
        true
    }

    fn replay(&mut self) {
        match self.router.on_connect() {
            Ok(()) => {
                if self.replay_failures > 0 {
                    tracing::info!(attempts = self.replay_failures + 1, "Subscriptions replayed");
                }
                self.replay_pending = false;
                self.replay_failures = 0;
            }
            Err(e) => {
                self.replay_pending = true;
                self.replay_failures += 1;
                // Only the first failure is loud; a log layer on the same
                // connection would otherwise keep the queue full.
                if self.replay_failures == 1 {
                    tracing::warn!(error = %e, "Subscription replay failed, will retry");
                } else {
                    tracing::debug!(
                        error = %e,
                        attempt = self.replay_failures,
                        "Subscription replay retry failed"
                    );
                }
            }
        }
    }

    fn disconnected(&mut self) {
        self.replay_pending = false;
        self.router.on_disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::transport::mock::{Call, MockTransport};
    use std::sync::atomic::AtomicU32;

    fn driver() -> (EventDriver, Arc<TopicRouter>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let router = Arc::new(TopicRouter::new(transport.clone()));
        let driver = EventDriver::new(
            Arc::clone(&router),
            Arc::new(AtomicBool::new(false)),
            Duration::from_millis(10),
        );
        (driver, router, transport)
    }

    fn connack() -> Event {
        Event::Incoming(Packet::ConnAck(rumqttc::ConnAck::new(
            rumqttc::ConnectReturnCode::Success,
            false,
        )))
    }

    #[test]
    fn builder_default_values() {
        let builder = SharedClientBuilder::default();
        assert_eq!(builder.config.port, 1883);
        assert!(builder.config.host.is_empty());
        assert!(builder.config.credentials().is_none());
        assert_eq!(builder.config.keep_alive, Duration::from_secs(30));
        assert_eq!(builder.config.connection_timeout, Duration::from_secs(10));
        assert_eq!(builder.config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(builder.config.request_capacity, 64);
    }

    #[test]
    fn builder_chain() {
        let builder = SharedClientBuilder::default()
            .host("192.168.1.50")
            .port(8883)
            .credentials("coop", "secret")
            .client_id("coop-door")
            .keep_alive(Duration::from_secs(45))
            .connection_timeout(Duration::from_secs(15))
            .reconnect_delay(Duration::from_secs(1))
            .request_capacity(8);

        assert_eq!(builder.config.host(), "192.168.1.50");
        assert_eq!(builder.config.port(), 8883);
        assert_eq!(builder.config.credentials(), Some(("coop", "secret")));
        assert_eq!(builder.config.client_id(), Some("coop-door"));
        assert_eq!(builder.config.keep_alive(), Duration::from_secs(45));
        assert_eq!(builder.config.connection_timeout(), Duration::from_secs(15));
        assert_eq!(builder.config.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(builder.config.request_capacity(), 8);
    }

    #[tokio::test]
    async fn builder_missing_host_fails() {
        let err = SharedClientBuilder::default().build().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn builder_rejects_short_keep_alive() {
        let err = SharedClientBuilder::default()
            .host("localhost")
            .keep_alive(Duration::from_millis(200))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Value(ValueError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn builder_rejects_zero_capacity() {
        let err = SharedClientBuilder::default()
            .host("localhost")
            .request_capacity(0)
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Value(ValueError::InvalidConfig(_))));
    }

    #[test]
    fn config_from_json_with_defaults() {
        let config = BrokerConfig::from_json(
            r#"{"host": "coop.local", "username": "u", "password": "p", "keep_alive": 60}"#,
        )
        .unwrap();
        assert_eq!(config.host(), "coop.local");
        assert_eq!(config.port(), 1883);
        assert_eq!(config.credentials(), Some(("u", "p")));
        assert_eq!(config.keep_alive(), Duration::from_secs(60));
        assert_eq!(config.connection_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn config_credentials_need_both_parts() {
        let config = BrokerConfig::from_json(r#"{"host": "h", "username": "u"}"#).unwrap();
        assert!(config.credentials().is_none());
    }

    #[test]
    fn config_from_invalid_json() {
        let err = BrokerConfig::from_json(r#"{"port": "not a number"}"#).unwrap_err();
        assert!(matches!(err, ValueError::InvalidConfig(_)));
    }

    #[test]
    fn parse_url_variants() {
        assert_eq!(
            parse_broker_url("mqtt://192.168.1.50:1884").unwrap(),
            ("192.168.1.50".to_string(), 1884)
        );
        assert_eq!(
            parse_broker_url("tcp://broker").unwrap(),
            ("broker".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_url("localhost:1883").unwrap(),
            ("localhost".to_string(), 1883)
        );
    }

    #[test]
    fn parse_url_invalid() {
        assert!(matches!(
            parse_broker_url("mqtt://host:abc"),
            Err(TransportError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_broker_url("mqtt://:1883"),
            Err(TransportError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn connect_timeout_when_no_broker() {
        let err = SharedClient::builder()
            .host("127.0.0.1")
            .port(1)
            .connection_timeout(Duration::from_millis(300))
            .reconnect_delay(Duration::from_millis(50))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Timeout(300))
        ));
        assert_eq!(err.to_string(), "transport error: request timed out after 300 ms");
    }

    #[tokio::test]
    async fn late_connack_after_timeout_closes_connection() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let broker = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = socket.read(&mut buf).await;

            tokio::time::sleep(Duration::from_millis(600)).await;
            let _ = socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await;

            // With a 1 s keep-alive a live client would keep pinging.
            tokio::time::timeout(Duration::from_secs(3), async {
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return true,
                        Ok(_) => {}
                    }
                }
            })
            .await
            .unwrap_or(false)
        });

        let err = SharedClient::builder()
            .host("127.0.0.1")
            .port(port)
            .keep_alive(Duration::from_secs(1))
            .connection_timeout(Duration::from_millis(300))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Timeout(_))));

        assert!(broker.await.unwrap(), "connection stayed open after timeout");
    }

    #[test]
    fn connack_replays_subscriptions() {
        let (mut driver, router, transport) = driver();
        router
            .subscribe("coop/door", QoS::AtLeastOnce, Callback::from_fn(|_| {}))
            .unwrap();

        assert!(driver.handle(connack()));
        assert!(router.is_connected());
        assert!(!driver.replay_pending);
        assert_eq!(
            transport.calls(),
            vec![Call::SubscribeMany(vec![("coop/door".into(), QoS::AtLeastOnce)])]
        );
    }

    #[test]
    fn failed_replay_is_retried_until_queued() {
        let (mut driver, router, transport) = driver();
        router
            .subscribe("coop/door", QoS::AtLeastOnce, Callback::from_fn(|_| {}))
            .unwrap();

        transport.set_failing(true);
        driver.handle(connack());
        assert!(driver.replay_pending);
        assert!(!router.is_connected());

        driver.replay();
        assert!(driver.replay_pending);
        assert_eq!(driver.replay_failures, 2);

        transport.set_failing(false);
        driver.replay();
        assert!(!driver.replay_pending);
        assert!(router.is_connected());
        assert_eq!(
            transport.calls(),
            vec![Call::SubscribeMany(vec![("coop/door".into(), QoS::AtLeastOnce)])]
        );
    }

    #[test]
    fn disconnect_cancels_pending_replay() {
        let (mut driver, router, transport) = driver();
        router
            .subscribe("coop/fan", QoS::ExactlyOnce, Callback::from_fn(|_| {}))
            .unwrap();

        transport.set_failing(true);
        driver.handle(connack());
        assert!(driver.handle(Event::Incoming(Packet::Disconnect)));
        assert!(!driver.replay_pending);

        transport.set_failing(false);
        driver.handle(connack());
        assert!(router.is_connected());
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn publish_reaches_callbacks() {
        let (mut driver, router, _) = driver();
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();
        router
            .subscribe(
                "coop/door/status",
                QoS::AtLeastOnce,
                Callback::from_fn(move |msg| {
                    assert_eq!(msg.payload_str(), Some("OPEN"));
                    hits_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        driver.handle(connack());

        let publish = rumqttc::Publish::new("coop/door/status", rumqttc::QoS::AtLeastOnce, "OPEN");
        assert!(driver.handle(Event::Incoming(Packet::Publish(publish))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn outgoing_disconnect_stops_only_on_shutdown() {
        let (mut driver, router, _) = driver();
        driver.handle(connack());

        assert!(driver.handle(Event::Outgoing(Outgoing::Disconnect)));
        assert!(!router.is_connected());

        driver.shutdown.store(true, Ordering::Release);
        assert!(!driver.handle(Event::Outgoing(Outgoing::Disconnect)));
    }
}
