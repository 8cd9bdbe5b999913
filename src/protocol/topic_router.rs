// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic routing for local subscribers sharing one broker connection.
//!
//! The [`TopicRouter`] owns the desired subscription state. Any number of
//! local modules register callbacks per topic; the router collapses them
//! into a single upstream subscription at the strictest requested QoS and
//! fans inbound messages back out.
//!
//! # Architecture
//!
//! ```text
//! door module ──┐                          ┌── subscribe(topic, max qos)
//! light module ─┼─ subscribe/unsubscribe ─▶│   unsubscribe(topic)
//! fan module ───┘                          │
//!                  TopicRouter ────────────┴──▶ Transport (broker)
//!                      ▲
//!     on_connect ──────┤  replay every tracked topic
//!     on_disconnect ───┤  mark offline, keep callbacks
//!     on_message ──────┘  exact topic lookup → callbacks in order
//! ```
//!
//! The broker is not trusted to remember subscriptions across reconnects;
//! every `on_connect` re-subscribes the whole map in one request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result, TransportError};
use crate::subscription::{Callback, Message, Subscription};
use crate::types::{QoS, is_wildcard, validate_filter};

use super::Transport;

/// Routes broker messages to local callbacks and keeps the broker's
/// subscriptions in line with them.
///
/// A single lock guards both the connection flag and the subscription map.
/// Upstream requests for one operation are issued while it is held, so a
/// failed request can be rolled back before anyone else observes it.
/// Callbacks always run with the lock released and may subscribe or
/// unsubscribe from inside a dispatch.
pub struct TopicRouter {
    transport: Arc<dyn Transport>,
    state: Mutex<RouterState>,
}

#[derive(Debug, Default)]
struct RouterState {
    connected: bool,
    subscriptions: HashMap<String, Subscription>,
}

impl TopicRouter {
    /// Creates an empty, disconnected router issuing upstream requests
    /// through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Mutex::new(RouterState::default()),
        }
    }

    /// Registers `callback` for messages on `topic`.
    ///
    /// The first callback on a topic subscribes upstream at `qos`. Later
    /// callbacks only reach the broker when they ask for a stricter QoS, in
    /// which case the topic is re-subscribed at the new level. While
    /// disconnected nothing is sent; the next [`on_connect`](Self::on_connect)
    /// picks the topic up.
    ///
    /// Topics are matched exactly. A `+` or `#` filter is subscribed upstream
    /// as given, but its callbacks only see messages published to that
    /// literal string; messages the broker delivers for concrete topics under
    /// it have no subscription here and are dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTopic`] if `topic` is empty or malformed.
    /// - [`Error::Transport`] if the upstream request fails. The registration
    ///   is rolled back.
    pub fn subscribe(&self, topic: &str, qos: QoS, callback: Callback) -> Result<()> {
        validate_filter(topic)?;

        let mut state = self.state.lock();
        let connected = state.connected;

        if let Some(sub) = state.subscriptions.get_mut(topic) {
            let Some(previous) = sub.add(qos, callback) else {
                tracing::debug!(
                    topic = %topic,
                    callbacks = sub.len(),
                    "Added callback to existing subscription"
                );
                return Ok(());
            };

            if connected && let Err(e) = self.transport.subscribe(topic, qos) {
                sub.undo_add(Some(previous));
                tracing::warn!(topic = %topic, qos = %qos, error = %e, "QoS upgrade failed");
                return Err(e.into());
            }

            tracing::debug!(
                topic = %topic,
                from = %previous,
                to = %qos,
                connected,
                "Raised subscription QoS"
            );
            return Ok(());
        }

        if connected {
            self.transport.subscribe(topic, qos).inspect_err(|e| {
                tracing::warn!(topic = %topic, qos = %qos, error = %e, "Upstream subscribe failed");
            })?;
        }

        if is_wildcard(topic) {
            tracing::debug!(
                topic = %topic,
                "Wildcard filter is matched literally; messages on concrete topics will not be dispatched"
            );
        }
        tracing::debug!(topic = %topic, qos = %qos, connected, "Created subscription");
        state
            .subscriptions
            .insert(topic.to_string(), Subscription::new(topic.to_string(), qos, callback));
        Ok(())
    }

    /// Removes one registration of `callback` from `topic`.
    ///
    /// When `callback` was registered several times only the first
    /// registration goes. Removing the last callback drops the topic and, if
    /// connected, unsubscribes upstream. The stored QoS never goes down while
    /// other callbacks remain.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTopic`] if `topic` is empty or malformed.
    /// - [`Error::NotSubscribed`] if `callback` is not registered on `topic`.
    /// - [`Error::Transport`] if the upstream unsubscribe fails. The callback
    ///   is put back where it was.
    pub fn unsubscribe(&self, topic: &str, callback: &Callback) -> Result<()> {
        validate_filter(topic)?;

        let mut state = self.state.lock();
        let connected = state.connected;

        let Some(sub) = state.subscriptions.get_mut(topic) else {
            return Err(not_subscribed(topic));
        };
        let Some(index) = sub.remove(callback) else {
            return Err(not_subscribed(topic));
        };

        if !sub.is_empty() {
            tracing::debug!(
                topic = %topic,
                callbacks = sub.len(),
                "Removed callback from subscription"
            );
            return Ok(());
        }

        if connected && let Err(e) = self.transport.unsubscribe(topic) {
            sub.restore(index, callback.clone());
            tracing::warn!(topic = %topic, error = %e, "Upstream unsubscribe failed");
            return Err(e.into());
        }

        state.subscriptions.remove(topic);
        tracing::debug!(topic = %topic, connected, "Dropped subscription");
        Ok(())
    }

    /// Re-subscribes every tracked topic and marks the connection as up.
    ///
    /// All topics go out in one request, each at its stored QoS, however
    /// many callbacks share it.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the replay request fails. The router
    /// then stays disconnected: later subscribes are deferred as usual and
    /// the caller must call `on_connect` again until it succeeds.
    pub fn on_connect(&self) -> std::result::Result<(), TransportError> {
        let mut state = self.state.lock();

        let mut filters: Vec<(String, QoS)> = state
            .subscriptions
            .values()
            .map(|sub| (sub.topic().to_string(), sub.qos()))
            .collect();
        if filters.is_empty() {
            state.connected = true;
            tracing::debug!("Connected with no subscriptions to replay");
            return Ok(());
        }
        filters.sort();

        self.transport.subscribe_many(&filters).inspect_err(|e| {
            tracing::debug!(topics = filters.len(), error = %e, "Subscription replay failed");
        })?;
        state.connected = true;
        tracing::debug!(topics = filters.len(), "Replayed subscriptions");
        Ok(())
    }

    /// Marks the connection as down. Callbacks stay registered.
    pub fn on_disconnect(&self) {
        self.state.lock().connected = false;
        tracing::debug!("Router marked disconnected");
    }

    /// Delivers `message` to every callback registered for its exact topic.
    ///
    /// Callbacks run in registration order, outside the router lock. A
    /// callback that fails or panics is logged and skipped; the rest still
    /// run and the failing one stays registered. Messages for unknown topics
    /// are dropped.
    ///
    /// Returns the number of callbacks invoked.
    pub fn on_message(&self, message: &Message) -> usize {
        let callbacks = {
            let state = self.state.lock();
            state
                .subscriptions
                .get(message.topic())
                .map(|sub| sub.callbacks().to_vec())
        };

        let Some(callbacks) = callbacks else {
            tracing::debug!(topic = %message.topic(), "No subscription for topic, dropping message");
            return 0;
        };

        for (position, callback) in callbacks.iter().enumerate() {
            if let Err(e) = callback.invoke(message) {
                tracing::warn!(
                    topic = %message.topic(),
                    position,
                    error = %e,
                    "Message callback failed"
                );
            }
        }
        callbacks.len()
    }

    /// Returns whether the upstream connection is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Returns the number of subscribed topics.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Returns the QoS stored for `topic`, if subscribed.
    #[must_use]
    pub fn qos(&self, topic: &str) -> Option<QoS> {
        self.state.lock().subscriptions.get(topic).map(Subscription::qos)
    }

    /// Returns the number of registrations on `topic` (0 if unsubscribed).
    #[must_use]
    pub fn callback_count(&self, topic: &str) -> usize {
        self.state
            .lock()
            .subscriptions
            .get(topic)
            .map_or(0, Subscription::len)
    }

    /// Returns a snapshot of the subscription for `topic`.
    #[must_use]
    pub fn subscription(&self, topic: &str) -> Option<Subscription> {
        self.state.lock().subscriptions.get(topic).cloned()
    }

    /// Returns every subscribed topic with its QoS, sorted by topic.
    #[must_use]
    pub fn topics(&self) -> Vec<(String, QoS)> {
        let mut topics: Vec<_> = self
            .state
            .lock()
            .subscriptions
            .values()
            .map(|sub| (sub.topic().to_string(), sub.qos()))
            .collect();
        topics.sort();
        topics
    }
}

impl fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TopicRouter")
            .field("connected", &state.connected)
            .field("topics", &state.subscriptions.len())
            .finish_non_exhaustive()
    }
}

fn not_subscribed(topic: &str) -> Error {
    Error::NotSubscribed {
        topic: topic.to_string(),
    }
}
