// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `coop_mqtt` library.
//!
//! Subscribe and unsubscribe failures surface synchronously as [`Error`].
//! Failures inside message callbacks are a separate concern: they are
//! reported as [`CallbackError`] values, logged by the router and never
//! propagated.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The topic is empty or malformed.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// No matching callback is registered for the topic.
    #[error("callback is not subscribed to topic {topic:?}")]
    NotSubscribed {
        /// The topic that was looked up.
        topic: String,
    },

    /// The upstream connection refused or failed the request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A value failed validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),
}

/// Errors raised by the upstream broker connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The MQTT client rejected the request.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connecting to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid broker URL or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The transport refused the request for another reason.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Errors related to value validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// QoS level outside 0-2.
    #[error("QoS level {0} is out of range [0, 2]")]
    InvalidQoS(u8),

    /// Configuration could not be read.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Error returned by a message callback.
///
/// Any error type converts into it with `?` or `.into()`.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_subscribed_display() {
        let err = Error::NotSubscribed {
            topic: "coop/door".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "callback is not subscribed to topic \"coop/door\""
        );
    }

    #[test]
    fn error_from_transport_error() {
        let err: Error = TransportError::Rejected("broker said no".to_string()).into();
        assert!(matches!(err, Error::Transport(TransportError::Rejected(_))));
        assert_eq!(err.to_string(), "transport error: request rejected: broker said no");
    }

    #[test]
    fn value_error_display() {
        assert_eq!(
            ValueError::InvalidQoS(3).to_string(),
            "QoS level 3 is out of range [0, 2]"
        );
    }

    #[test]
    fn callback_error_from_str() {
        let err: CallbackError = "sensor offline".into();
        assert_eq!(err.to_string(), "sensor offline");
    }
}
