// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by the router and the MQTT client.
//!
//! - [`QoS`] - Delivery guarantee level (0-2)
//! - [`topic_join`] - Builds a topic from its levels
//! - [`validate_filter`] / [`validate_name`] - Topic checks applied at the API boundary

mod qos;
mod topic;

pub use qos::QoS;
pub use topic::{
    MAX_TOPIC_LEN, TOPIC_SEPARATOR, is_wildcard, topic_join, validate_filter, validate_name,
};
