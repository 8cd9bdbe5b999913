// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic strings.
//!
//! Topics are opaque to the router: two topics match only when they are
//! byte-for-byte equal. The checks here only reject strings a broker would
//! refuse outright.

use crate::error::Error;

/// Separator between topic levels.
pub const TOPIC_SEPARATOR: char = '/';

/// Longest topic the MQTT wire format can carry, in bytes.
pub const MAX_TOPIC_LEN: usize = 65_535;

/// Joins topic levels with the `/` separator.
///
/// ```
/// use coop_mqtt::types::topic_join;
///
/// assert_eq!(topic_join(["coop", "door", "status"]), "coop/door/status");
/// ```
#[must_use]
pub fn topic_join<I, S>(levels: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut topic = String::new();
    for (i, level) in levels.into_iter().enumerate() {
        if i > 0 {
            topic.push(TOPIC_SEPARATOR);
        }
        topic.push_str(level.as_ref());
    }
    topic
}

/// Validates a topic filter passed to subscribe or unsubscribe.
///
/// Well-formed `+` and `#` wildcards are accepted and kept as opaque text.
///
/// # Errors
///
/// Returns [`Error::InvalidTopic`] if the topic is empty, too long, contains
/// a NUL character, or places a wildcard anywhere but a whole level (`#`
/// only as the last level).
pub fn validate_filter(topic: &str) -> Result<(), Error> {
    validate_common(topic)?;

    let mut levels = topic.split(TOPIC_SEPARATOR).peekable();
    while let Some(level) = levels.next() {
        let is_last = levels.peek().is_none();
        match level {
            "+" => {}
            "#" if is_last => {}
            "#" => return Err(invalid(topic, "'#' must be the last level")),
            _ if level.contains(['+', '#']) => {
                return Err(invalid(topic, "wildcards must occupy a whole level"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Returns `true` if `topic` contains a `+` or `#` wildcard.
///
/// ```
/// use coop_mqtt::types::is_wildcard;
///
/// assert!(is_wildcard("coop/+/status"));
/// assert!(!is_wildcard("coop/door/status"));
/// ```
#[must_use]
pub fn is_wildcard(topic: &str) -> bool {
    topic.contains(['+', '#'])
}

/// Validates a topic name used for publishing.
///
/// # Errors
///
/// Returns [`Error::InvalidTopic`] for the same reasons as
/// [`validate_filter`], and additionally if the topic contains any wildcard.
pub fn validate_name(topic: &str) -> Result<(), Error> {
    validate_common(topic)?;
    if is_wildcard(topic) {
        return Err(invalid(topic, "wildcards are not allowed when publishing"));
    }
    Ok(())
}

fn validate_common(topic: &str) -> Result<(), Error> {
    if topic.is_empty() {
        return Err(invalid(topic, "topic is empty"));
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(invalid(topic, "topic is longer than 65535 bytes"));
    }
    if topic.contains('\0') {
        return Err(invalid(topic, "topic contains a NUL character"));
    }
    Ok(())
}

fn invalid(topic: &str, reason: &str) -> Error {
    Error::InvalidTopic(format!("{reason}: {topic:?}"))
}
