// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The upstream side of the router.
//!
//! [`Transport`] is everything the [`TopicRouter`](super::TopicRouter) needs
//! from a broker connection. Implementations must return quickly and must
//! not call back into the router; they are invoked while the router holds
//! its lock.

use crate::error::TransportError;
use crate::types::QoS;

/// Upstream subscription requests issued by the router.
pub trait Transport: Send + Sync {
    /// Subscribes to (or upgrades the QoS of) one topic filter.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the request cannot be issued.
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    /// Subscribes to several topic filters at once.
    ///
    /// The default implementation issues one [`subscribe`](Self::subscribe)
    /// per filter and stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if any request cannot be issued.
    fn subscribe_many(&self, filters: &[(String, QoS)]) -> Result<(), TransportError> {
        filters
            .iter()
            .try_for_each(|(topic, qos)| self.subscribe(topic, *qos))
    }

    /// Unsubscribes from one topic filter.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the request cannot be issued.
    fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;
}

/// Queues requests on the client's outgoing channel without waiting for the
/// event loop, so it is safe to call from synchronous code and from inside
/// the event loop task itself.
#[cfg(feature = "mqtt")]
impl Transport for rumqttc::AsyncClient {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.try_subscribe(topic, qos.into())
            .map_err(TransportError::Mqtt)
    }

    fn subscribe_many(&self, filters: &[(String, QoS)]) -> Result<(), TransportError> {
        let filters = filters
            .iter()
            .map(|(topic, qos)| rumqttc::SubscribeFilter::new(topic.clone(), (*qos).into()));
        self.try_subscribe_many(filters)
            .map_err(TransportError::Mqtt)
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.try_unsubscribe(topic).map_err(TransportError::Mqtt)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Implements only the required methods.
    #[derive(Default)]
    struct SingleOnly {
        subscribed: Mutex<Vec<(String, QoS)>>,
        fail_on: Option<&'static str>,
    }

    impl Transport for SingleOnly {
        fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
            if self.fail_on == Some(topic) {
                return Err(TransportError::Rejected(topic.to_string()));
            }
            self.subscribed.lock().push((topic.to_string(), qos));
            Ok(())
        }

        fn unsubscribe(&self, _topic: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn default_subscribe_many_loops() {
        let transport = SingleOnly::default();
        let filters = vec![
            ("coop/door".to_string(), QoS::AtLeastOnce),
            ("coop/light".to_string(), QoS::AtMostOnce),
        ];
        transport.subscribe_many(&filters).unwrap();
        assert_eq!(*transport.subscribed.lock(), filters);
    }

    #[test]
    fn default_subscribe_many_stops_at_failure() {
        let transport = SingleOnly {
            fail_on: Some("coop/light"),
            ..Default::default()
        };
        let filters = vec![
            ("coop/door".to_string(), QoS::AtLeastOnce),
            ("coop/light".to_string(), QoS::AtMostOnce),
            ("coop/fan".to_string(), QoS::AtMostOnce),
        ];
        assert!(transport.subscribe_many(&filters).is_err());
        assert_eq!(transport.subscribed.lock().len(), 1);
    }
}
