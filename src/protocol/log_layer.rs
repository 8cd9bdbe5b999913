// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Log forwarding over MQTT.
//!
//! [`MqttLogLayer`] is a `tracing-subscriber` layer that publishes each log
//! event as one text message on a fixed topic, so remote dashboards can
//! follow what the coop controller is doing.
//!
//! ```no_run
//! use coop_mqtt::SharedClient;
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! # async fn example() -> coop_mqtt::Result<()> {
//! let client = SharedClient::connect("mqtt://192.168.1.50:1883").await?;
//! let layer = client.log_layer("coop/log")?;
//! let subscriber = tracing_subscriber::registry().with(layer);
//! tracing::subscriber::set_global_default(subscriber).ok();
//! # Ok(())
//! # }
//! ```

use std::fmt::{self, Write as _};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rumqttc::AsyncClient;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::types::QoS;

/// Publishes log events on an MQTT topic.
///
/// Records are published at exactly-once QoS unless changed with
/// [`with_qos`](Self::with_qos) and are never retained. Publishing never blocks: when the request
/// queue is full the record is dropped and counted in
/// [`dropped`](Self::dropped). Events emitted by `rumqttc` itself are
/// ignored.
#[derive(Clone)]
pub struct MqttLogLayer {
    client: AsyncClient,
    topic: String,
    qos: QoS,
    max_level: Level,
    dropped: Arc<AtomicU64>,
}

impl MqttLogLayer {
    /// Creates a layer publishing `INFO` and more severe events.
    pub(crate) fn new(client: AsyncClient, topic: &str) -> Self {
        Self {
            client,
            topic: topic.to_string(),
            qos: QoS::ExactlyOnce,
            max_level: Level::INFO,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sets the most verbose level that is forwarded.
    #[must_use]
    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    /// Sets the QoS records are published with.
    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Returns the QoS records are published with.
    #[must_use]
    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Returns the topic records are published on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns how many records could not be queued.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for MqttLogLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttLogLayer")
            .field("topic", &self.topic)
            .field("qos", &self.qos)
            .field("max_level", &self.max_level)
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

impl<S: Subscriber> Layer<S> for MqttLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.max_level || metadata.target().starts_with("rumqttc") {
            return;
        }

        let mut record = LogRecord::default();
        event.record(&mut record);
        let line = record.format(*metadata.level(), metadata.target());

        // Logging from here would feed back into this layer.
        if self
            .client
            .try_publish(&self.topic, self.qos.into(), false, line)
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Collects the message and fields of one event.
#[derive(Debug, Default)]
struct LogRecord {
    message: String,
    fields: String,
}

impl LogRecord {
    fn format(&self, level: Level, target: &str) -> String {
        let mut line = format!("{level} {target}: {}", self.message);
        if !self.fields.is_empty() {
            line.push_str(&self.fields);
        }
        line
    }
}

impl Visit for LogRecord {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}
