// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use std::{
  fmt,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
  },
};

use super::{Client, Seq};
use crate::{
  bytes::BufferQueue,
  json,
  url::{decode_uri_component, Url},
};

/// A cooperative cancellation hook shared between the producer of a
/// long-running result and the code observing it.
///
/// Cancellation is one-way and sticky; the registered handler fires once,
/// on the transition. Handlers must poll [`is_cancelled`](Self::is_cancelled)
/// at safe points — nothing is interrupted for them.
#[derive(Default)]
pub struct MessageCancellation {
  cancelled: AtomicBool,
  handler: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl MessageCancellation {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register the hook invoked when cancellation triggers.
  pub fn on_cancel(&self, handler: impl Fn() + Send + Sync + 'static) {
    *self.handler.lock().expect("poisoned cancellation handler") = Some(Box::new(handler));
  }

  pub fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::SeqCst) {
      if let Some(handler) = &*self.handler.lock().expect("poisoned cancellation handler") {
        handler();
      }
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}

impl fmt::Debug for MessageCancellation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MessageCancellation")
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}

/// A parsed IPC URI of the form `ipc://<name>?<params>`.
#[derive(Clone, Debug)]
pub struct Message {
  pub uri: Url,
  /// The route name; equals `uri.hostname`.
  pub name: String,
  /// Caller correlation id from `seq=`, possibly `"-1"`.
  pub seq: Seq,
  /// The opaque payload string from `value=`.
  pub value: String,
  /// The window index from `index=`, `-1` when absent or malformed.
  pub index: i32,
  /// The request body, when one was attached.
  pub buffer: BufferQueue,
  pub client: Client,
  pub cancel: Option<Arc<MessageCancellation>>,
}

impl Default for Message {
  fn default() -> Self {
    Self {
      uri: Url::default(),
      name: String::new(),
      seq: String::new(),
      value: String::new(),
      index: -1,
      buffer: BufferQueue::new(),
      client: Client::new(0, -1),
      cancel: None,
    }
  }
}

impl Message {
  pub fn parse(source: &str) -> crate::Result<Self> {
    Self::parse_with_options(source, false)
  }

  /// Parse `source`; `decode_values` opts into percent-decoding of query
  /// parameter values.
  pub fn parse_with_options(source: &str, decode_values: bool) -> crate::Result<Self> {
    let uri = Url::parse_with_options(source, decode_values)?;
    let mut message = Message {
      name: uri.hostname.clone(),
      ..Message::default()
    };

    message.uri = uri;
    message.seq = message.get("seq");
    message.value = message.get("value");

    if let Some(index) = message.uri.search_params.get("index") {
      match index.parse() {
        Ok(index) => message.index = index,
        Err(_) => {
          #[cfg(feature = "tracing")]
          tracing::debug!("received non-integer index in message: {source}");
        }
      }
    }

    Ok(message)
  }

  pub fn has(&self, key: &str) -> bool {
    self.uri.search_params.contains(key)
  }

  /// The percent-decoded value of a query parameter, or an empty string.
  pub fn get(&self, key: &str) -> String {
    self.get_or(key, "")
  }

  pub fn get_or(&self, key: &str, fallback: &str) -> String {
    if key == "value" && !self.value.is_empty() {
      return self.value.clone();
    }

    match self.uri.search_params.get(key) {
      Some(value) => decode_uri_component(value),
      None => fallback.to_string(),
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self
      .cancel
      .as_ref()
      .map(|cancel| cancel.is_cancelled())
      .unwrap_or(false)
  }

  /// The raw query parameters.
  pub fn params(&self) -> &crate::url::SearchParams {
    &self.uri.search_params
  }

  pub fn str(&self) -> String {
    self.uri.to_string()
  }

  /// A diagnostic dump of the message and its parameters.
  pub fn json(&self) -> json::Value {
    let mut data = json::Object::new();
    for (key, value) in self.uri.search_params.iter() {
      data.set(key.clone(), value.clone());
    }

    let mut object = json::Object::new();
    object.set("name", self.name.clone());
    object.set("value", self.value.clone());
    object.set("index", self.index as i64);
    object.set("seq", self.seq.clone());
    object.set("data", data);
    json::Value::Object(object)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_reserved_keys() {
    let message =
      Message::parse_with_options("ipc://window.setTitle?seq=9&index=2&value=hello%20world", true)
        .unwrap();
    assert_eq!(message.name, "window.settitle");
    assert_eq!(message.seq, "9");
    assert_eq!(message.index, 2);
    assert_eq!(message.value, "hello world");
  }

  #[test]
  fn name_equals_uri_hostname() {
    let message = Message::parse("ipc://echo?seq=1").unwrap();
    assert_eq!(message.name, message.uri.hostname);
  }

  #[test]
  fn malformed_index_defaults_to_minus_one() {
    let message = Message::parse("ipc://echo?index=nope").unwrap();
    assert_eq!(message.index, -1);
    let message = Message::parse("ipc://echo").unwrap();
    assert_eq!(message.index, -1);
  }

  #[test]
  fn duplicate_parameters_are_last_write_wins() {
    let message = Message::parse("ipc://echo?seq=1&seq=2").unwrap();
    assert_eq!(message.seq, "2");
  }

  #[test]
  fn get_falls_back() {
    let message = Message::parse("ipc://echo?a=1").unwrap();
    assert_eq!(message.get("a"), "1");
    assert_eq!(message.get("b"), "");
    assert_eq!(message.get_or("b", "fallback"), "fallback");
  }

  #[test]
  fn cancellation_is_sticky_and_fires_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let cancellation = Arc::new(MessageCancellation::new());
    let fired = Arc::new(AtomicUsize::new(0));
    {
      let fired = fired.clone();
      cancellation.on_cancel(move || {
        fired.fetch_add(1, Ordering::SeqCst);
      });
    }

    let mut message = Message::parse("ipc://slow?seq=1").unwrap();
    message.cancel = Some(cancellation.clone());
    assert!(!message.is_cancelled());

    cancellation.cancel();
    cancellation.cancel();
    assert!(message.is_cancelled());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }
}
