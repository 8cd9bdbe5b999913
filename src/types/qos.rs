// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Quality-of-service levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// MQTT delivery guarantee requested for a topic.
///
/// Levels are ordered, so the strictest of several requests is simply the
/// maximum:
///
/// ```
/// use coop_mqtt::types::QoS;
///
/// assert!(QoS::ExactlyOnce > QoS::AtLeastOnce);
/// assert_eq!(QoS::AtMostOnce.max(QoS::AtLeastOnce), QoS::AtLeastOnce);
/// assert_eq!(QoS::try_from(2).unwrap(), QoS::ExactlyOnce);
/// assert!(QoS::try_from(3).is_err());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    /// Level 0, fire and forget.
    #[default]
    AtMostOnce,
    /// Level 1, acknowledged delivery, duplicates possible.
    AtLeastOnce,
    /// Level 2, four-step handshake, no duplicates.
    ExactlyOnce,
}

impl QoS {
    /// Returns the numeric level (0, 1 or 2).
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QoS{}", self.level())
    }
}

impl TryFrom<u8> for QoS {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(ValueError::InvalidQoS(other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos.level()
    }
}

impl FromStr for QoS {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level: u8 = s
            .trim()
            .parse()
            .map_err(|_| ValueError::InvalidConfig(format!("invalid QoS level: {s}")))?;
        Self::try_from(level)
    }
}

#[cfg(feature = "mqtt")]
impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::AtMostOnce,
            QoS::AtLeastOnce => Self::AtLeastOnce,
            QoS::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

#[cfg(feature = "mqtt")]
impl From<rumqttc::QoS> for QoS {
    fn from(qos: rumqttc::QoS) -> Self {
        match qos {
            rumqttc::QoS::AtMostOnce => Self::AtMostOnce,
            rumqttc::QoS::AtLeastOnce => Self::AtLeastOnce,
            rumqttc::QoS::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(QoS::AtMostOnce < QoS::AtLeastOnce);
        assert!(QoS::AtLeastOnce < QoS::ExactlyOnce);
        assert_eq!(QoS::default(), QoS::AtMostOnce);
    }

    #[test]
    fn try_from_rejects_out_of_range() {
        assert_eq!(QoS::try_from(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(QoS::try_from(7).unwrap_err(), ValueError::InvalidQoS(7));
    }

    #[test]
    fn parse_from_str() {
        assert_eq!(" 2 ".parse::<QoS>().unwrap(), QoS::ExactlyOnce);
        assert!("two".parse::<QoS>().is_err());
        assert!("5".parse::<QoS>().is_err());
    }

    #[test]
    fn display() {
        assert_eq!(QoS::AtLeastOnce.to_string(), "QoS1");
    }

    #[test]
    fn serde_as_number() {
        let qos: QoS = serde_json::from_str("2").unwrap();
        assert_eq!(qos, QoS::ExactlyOnce);
        assert_eq!(serde_json::to_string(&QoS::AtLeastOnce).unwrap(), "1");
        assert!(serde_json::from_str::<QoS>("3").is_err());
    }

    #[cfg(feature = "mqtt")]
    #[test]
    fn converts_to_rumqttc() {
        assert_eq!(rumqttc::QoS::from(QoS::ExactlyOnce), rumqttc::QoS::ExactlyOnce);
        assert_eq!(QoS::from(rumqttc::QoS::AtMostOnce), QoS::AtMostOnce);
    }
}
