// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-topic subscription state.

use crate::types::QoS;

use super::Callback;

/// Local interest in one topic.
///
/// Holds the callbacks registered for the topic in registration order and
/// the QoS asserted upstream. The QoS only ever rises while the subscription
/// is alive.
#[derive(Debug, Clone)]
pub struct Subscription {
    topic: String,
    qos: QoS,
    callbacks: Vec<Callback>,
}

impl Subscription {
    /// Creates a subscription holding a single callback.
    pub(crate) fn new(topic: String, qos: QoS, callback: Callback) -> Self {
        Self {
            topic,
            qos,
            callbacks: vec![callback],
        }
    }

    /// Returns the topic filter.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the QoS asserted upstream.
    #[must_use]
    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Returns the registered callbacks in invocation order.
    #[must_use]
    pub fn callbacks(&self) -> &[Callback] {
        &self.callbacks
    }

    /// Returns the number of registrations (duplicates counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Returns `true` when no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Appends a callback and raises the QoS if `qos` is stricter.
    ///
    /// Returns the previous QoS when it was raised.
    pub(crate) fn add(&mut self, qos: QoS, callback: Callback) -> Option<QoS> {
        self.callbacks.push(callback);
        if qos > self.qos {
            Some(std::mem::replace(&mut self.qos, qos))
        } else {
            None
        }
    }

    /// Undoes the most recent [`add`](Self::add).
    pub(crate) fn undo_add(&mut self, previous_qos: Option<QoS>) {
        self.callbacks.pop();
        if let Some(qos) = previous_qos {
            self.qos = qos;
        }
    }

    /// Removes the first registration of `callback`.
    ///
    /// Returns its position so the removal can be undone.
    pub(crate) fn remove(&mut self, callback: &Callback) -> Option<usize> {
        let index = self.callbacks.iter().position(|cb| cb.same_as(callback))?;
        self.callbacks.remove(index);
        Some(index)
    }

    /// Puts a removed callback back at its original position.
    pub(crate) fn restore(&mut self, index: usize, callback: Callback) {
        self.callbacks.insert(index, callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_raises_qos_only_upwards() {
        let cb = Callback::from_fn(|_| {});
        let mut sub = Subscription::new("coop/door".into(), QoS::AtLeastOnce, cb.clone());

        assert_eq!(sub.add(QoS::AtMostOnce, cb.clone()), None);
        assert_eq!(sub.qos(), QoS::AtLeastOnce);

        assert_eq!(sub.add(QoS::ExactlyOnce, cb), Some(QoS::AtLeastOnce));
        assert_eq!(sub.qos(), QoS::ExactlyOnce);
        assert_eq!(sub.len(), 3);
    }

    #[test]
    fn undo_add_restores_previous_state() {
        let cb = Callback::from_fn(|_| {});
        let mut sub = Subscription::new("coop/door".into(), QoS::AtMostOnce, cb.clone());

        let previous = sub.add(QoS::ExactlyOnce, Callback::from_fn(|_| {}));
        sub.undo_add(previous);

        assert_eq!(sub.qos(), QoS::AtMostOnce);
        assert_eq!(sub.callbacks(), &[cb]);
    }

    #[test]
    fn remove_takes_first_duplicate() {
        let a = Callback::from_fn(|_| {});
        let b = Callback::from_fn(|_| {});
        let mut sub = Subscription::new("coop/light".into(), QoS::AtMostOnce, a.clone());
        sub.add(QoS::AtMostOnce, b.clone());
        sub.add(QoS::AtMostOnce, a.clone());

        assert_eq!(sub.remove(&a), Some(0));
        assert_eq!(sub.callbacks(), &[b.clone(), a.clone()]);

        sub.restore(0, a.clone());
        assert_eq!(sub.callbacks(), &[a.clone(), b, a]);
    }

    #[test]
    fn remove_unknown_callback() {
        let mut sub =
            Subscription::new("coop/fan".into(), QoS::AtMostOnce, Callback::from_fn(|_| {}));
        assert_eq!(sub.remove(&Callback::from_fn(|_| {})), None);
        assert!(!sub.is_empty());
    }
}
