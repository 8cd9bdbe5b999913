// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker-facing side of the library.
//!
//! # Components
//!
//! - [`TopicRouter`]: multiplexes local callbacks onto one set of upstream
//!   subscriptions
//! - [`Transport`]: the requests the router issues upstream
//! - [`SharedClient`]: a `rumqttc` connection driving a router (feature `mqtt`)
//! - [`MqttLogLayer`]: forwards `tracing` events to a topic (feature `mqtt`)
//!
//! The router does not depend on `rumqttc`; any type implementing
//! [`Transport`] can sit underneath it.

#[cfg(feature = "mqtt")]
mod log_layer;
#[cfg(feature = "mqtt")]
mod shared_client;
mod topic_router;
pub(crate) mod transport;

#[cfg(feature = "mqtt")]
pub use log_layer::MqttLogLayer;
#[cfg(feature = "mqtt")]
pub use shared_client::{BrokerConfig, SharedClient, SharedClientBuilder, parse_broker_url};
pub use topic_router::TopicRouter;
pub use transport::Transport;
