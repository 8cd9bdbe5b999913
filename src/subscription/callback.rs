// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message callbacks.
//!
//! A [`Callback`] is a cheap, cloneable handle to a shared handler function.
//! The router compares handles by identity: every clone of a handle is the
//! same callback, while two handles built from separate closures never are,
//! even if the closures are textually identical.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::CallbackError;

use super::Message;

/// Result returned by a message callback.
pub type CallbackResult = Result<(), CallbackError>;

type HandlerFn = dyn Fn(&Message) -> CallbackResult + Send + Sync;

/// Handle to a function invoked for every message on a subscribed topic.
///
/// Keep a clone of the handle to unsubscribe later.
///
/// # Examples
///
/// ```
/// use coop_mqtt::subscription::Callback;
///
/// let on_status = Callback::from_fn(|msg| {
///     println!("{} -> {:?}", msg.topic(), msg.payload_str());
/// });
/// let same = on_status.clone();
/// assert!(on_status.same_as(&same));
///
/// let other = Callback::from_fn(|_| {});
/// assert!(!on_status.same_as(&other));
/// ```
#[derive(Clone)]
pub struct Callback {
    handler: Arc<HandlerFn>,
}

impl Callback {
    /// Creates a callback from a fallible handler.
    ///
    /// Errors are logged by the router; they never reach the transport and
    /// do not unregister the callback.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Message) -> CallbackResult + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Creates a callback from a handler that cannot fail.
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        Self::new(move |msg| {
            handler(msg);
            Ok(())
        })
    }

    /// Returns `true` if both handles refer to the same registered function.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        // Compare data pointers only; vtable pointers for one type may differ
        // between codegen units.
        std::ptr::addr_eq(Arc::as_ptr(&self.handler), Arc::as_ptr(&other.handler))
    }

    /// Invokes the handler, turning a panic into an error.
    pub(crate) fn invoke(&self, message: &Message) -> CallbackResult {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(message))) {
            Ok(result) => result,
            Err(payload) => Err(panic_message(&*payload).into()),
        }
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Callback {}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback")
            .field(&Arc::as_ptr(&self.handler).cast::<()>())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("callback panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("callback panicked: {s}")
    } else {
        "callback panicked".to_string()
    }
}
