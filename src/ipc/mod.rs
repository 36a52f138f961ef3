// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The IPC channel: messages, reply envelopes, the router, and the bridge
//! facade that ties them to a WebView instance.

mod bridge;
mod message;
mod result;
mod router;

pub use self::{
  bridge::Bridge,
  message::{Message, MessageCancellation},
  result::Result,
  router::{MessageCallback, ReplyCallback, ResultCallback, Router},
};

use std::hash::{Hash, Hasher};

/// The caller-chosen correlation id carried on a message. `"-1"` denotes
/// fire-and-forget semantics.
pub type Seq = String;

/// The unique identity of a WebView instance: a random 64-bit id plus the
/// window index. Equality and hashing consider the id only.
#[derive(Clone, Copy, Debug)]
pub struct Client {
  pub id: u64,
  pub index: i32,
}

impl Client {
  pub fn new(id: u64, index: i32) -> Self {
    Self { id, index }
  }
}

impl Default for Client {
  fn default() -> Self {
    Self {
      id: crate::crypto::rand64(),
      index: 0,
    }
  }
}

impl PartialEq for Client {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for Client {}

impl Hash for Client {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.id.hash(state);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn client_equality_is_by_id() {
    let left = Client::new(7, 0);
    let right = Client::new(7, 3);
    assert_eq!(left, right);
    assert_ne!(left, Client::new(8, 0));
  }
}
