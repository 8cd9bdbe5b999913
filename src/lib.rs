// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `coop_mqtt` - One MQTT connection shared by many home-automation modules.
//!
//! A coop controller runs several independent modules (door motor, lights,
//! fans, thermostat) that all talk to the same broker. This library gives
//! them a single connection and lets each one subscribe with its own
//! callback.
//!
//! # Features
//!
//! - **Shared subscriptions**: any number of callbacks per topic, one
//!   upstream subscription at the strictest requested QoS
//! - **Reconnect replay**: every tracked topic is re-subscribed whenever the
//!   connection comes back
//! - **Isolated callbacks**: a failing or panicking callback never stops
//!   delivery to the others
//! - **Log forwarding**: a `tracing` layer publishing log events over MQTT
//!
//! # Quick Start
//!
//! ```no_run
//! use coop_mqtt::{Callback, QoS, SharedClient};
//!
//! #[tokio::main]
//! async fn main() -> coop_mqtt::Result<()> {
//!     let client = SharedClient::connect("mqtt://192.168.1.50:1883").await?;
//!
//!     // Two modules, one topic, one upstream subscription at QoS 1
//!     let door = Callback::from_fn(|msg| println!("door: {:?}", msg.payload_str()));
//!     let logger = Callback::from_fn(|msg| println!("log: {}", msg.topic()));
//!     client.subscribe("coop/door/status", QoS::AtLeastOnce, door.clone())?;
//!     client.subscribe("coop/door/status", QoS::AtMostOnce, logger)?;
//!
//!     client.publish("coop/door/command", "OPEN", QoS::AtLeastOnce, false).await?;
//!
//!     client.unsubscribe("coop/door/status", &door)?;
//!     Ok(())
//! }
//! ```
//!
//! # Custom Transports
//!
//! The [`TopicRouter`] only needs something implementing
//! [`protocol::Transport`], which makes it usable with other clients and easy
//! to test:
//!
//! ```
//! use std::sync::Arc;
//! use coop_mqtt::{Callback, Message, QoS, TopicRouter, TransportError};
//! use coop_mqtt::protocol::Transport;
//!
//! struct Offline;
//!
//! impl Transport for Offline {
//!     fn subscribe(&self, _topic: &str, _qos: QoS) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//!     fn unsubscribe(&self, _topic: &str) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! let router = TopicRouter::new(Arc::new(Offline));
//! router.subscribe("coop/light", QoS::AtMostOnce, Callback::from_fn(|_| {})).unwrap();
//! let delivered = router.on_message(&Message::new("coop/light", "ON", QoS::AtMostOnce, false));
//! assert_eq!(delivered, 1);
//! ```

pub mod error;
pub mod protocol;
pub mod subscription;
pub mod types;

pub use error::{CallbackError, Error, Result, TransportError, ValueError};
#[cfg(feature = "mqtt")]
pub use protocol::{BrokerConfig, MqttLogLayer, SharedClient, SharedClientBuilder};
pub use protocol::TopicRouter;
pub use subscription::{Callback, CallbackResult, Message, Subscription};
pub use types::{QoS, topic_join};
