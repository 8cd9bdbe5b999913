// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription bookkeeping for the topic router.
//!
//! - [`Callback`] - Identity-compared handle to a message handler
//! - [`Message`] - Topic, payload and delivery flags handed to callbacks
//! - [`Subscription`] - Callbacks and upstream QoS for one topic
//!
//! # Usage
//!
//! ```no_run
//! use coop_mqtt::SharedClient;
//! use coop_mqtt::subscription::Callback;
//! use coop_mqtt::types::QoS;
//!
//! # async fn example() -> coop_mqtt::Result<()> {
//! let client = SharedClient::builder().host("192.168.1.50").build().await?;
//!
//! let on_door = Callback::from_fn(|msg| {
//!     println!("door is {:?}", msg.payload_str());
//! });
//! client.subscribe("coop/door/status", QoS::AtLeastOnce, on_door.clone())?;
//!
//! // Later, with the same handle
//! client.unsubscribe("coop/door/status", &on_door)?;
//! # Ok(())
//! # }
//! ```

mod callback;
mod entry;
mod message;

pub use callback::{Callback, CallbackResult};
pub use entry::Subscription;
pub use message::Message;
