// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use super::{Message, Seq};
use crate::{crypto::rand64, http::Headers, json, queued_response::QueuedResponse};

/// The reply envelope produced by a router handler.
///
/// Exactly one of `value`, `data`, or `err` carries the payload. When a
/// [`QueuedResponse`] is attached, its id is surfaced so a follow-up
/// scheme request can fetch the out-of-band body.
#[derive(Clone, Debug)]
pub struct Result {
  pub id: u64,
  pub seq: Seq,
  pub source: String,
  /// Opaque correlation or auth token from `ipc-token`; serialized as
  /// JSON `null` when empty.
  pub token: String,
  pub value: json::Value,
  pub data: json::Value,
  pub err: json::Value,
  pub headers: Headers,
  pub queued_response: Option<QueuedResponse>,
}

impl Default for Result {
  fn default() -> Self {
    Self {
      id: rand64(),
      seq: "-1".into(),
      source: String::new(),
      token: String::new(),
      value: json::Value::Empty,
      data: json::Value::Empty,
      err: json::Value::Empty,
      headers: Headers::new(),
      queued_response: None,
    }
  }
}

impl Result {
  /// An empty envelope correlated with `message`; `ipc-token` is plumbed
  /// through, never verified.
  pub fn from_message(seq: impl Into<Seq>, message: &Message) -> Self {
    Self {
      seq: seq.into(),
      source: message.name.clone(),
      token: message.get("ipc-token"),
      ..Self::default()
    }
  }

  /// A verbatim `value` payload, serialized with the envelope overlay
  /// rules of [`json`](Self::json).
  pub fn with_value(seq: impl Into<Seq>, message: &Message, value: json::Value) -> Self {
    Self {
      value,
      ..Self::from_message(seq, message)
    }
  }

  /// A successful `data` payload.
  pub fn data(message: &Message, data: json::Value) -> Self {
    Self {
      data,
      ..Self::from_message(message.seq.clone(), message)
    }
  }

  /// A successful `data` payload backed by an out-of-band body.
  pub fn data_with_queued_response(
    message: &Message,
    data: json::Value,
    queued_response: QueuedResponse,
  ) -> Self {
    let mut queued_response = queued_response;
    if queued_response.worker_id.is_empty() {
      queued_response.worker_id = message.get("runtime-worker-id");
    }
    Self {
      headers: queued_response.headers.clone(),
      queued_response: Some(queued_response),
      ..Self::data(message, data)
    }
  }

  /// An error payload. A string wraps into `{"message": …}`; any other
  /// value is carried verbatim.
  pub fn err(message: &Message, error: impl Into<json::Value>) -> Self {
    let error = match error.into() {
      json::Value::String(text) => {
        let mut object = json::Object::new();
        object.set("message", text);
        json::Value::Object(object)
      }
      error => error,
    };
    Self {
      err: error,
      ..Self::from_message(message.seq.clone(), message)
    }
  }

  fn token_json(&self) -> json::Value {
    if self.token.is_empty() {
      json::Value::Null
    } else {
      json::Value::from(self.token.clone())
    }
  }

  /// The reply JSON.
  ///
  /// A non-null `value` wins: when it is an object already carrying a
  /// `source` and one of `data`/`err`, the envelope's `source`/`token`/
  /// `id` are overlaid onto it; otherwise it is emitted as-is. Without a
  /// `value`, the envelope is `{source, token, id}` plus whichever of
  /// `err`/`data` is set — and an object payload may override `id`,
  /// `token`, and `source` by carrying its own.
  pub fn json(&self) -> json::Value {
    if !self.value.is_nullish() {
      if let Some(object) = self.value.as_object() {
        if object.has("source") && (object.has("data") || object.has("err")) {
          let mut object = object.clone();
          object.set("source", self.source.clone());
          object.set("token", self.token_json());
          object.set("id", self.id.to_string());
          return json::Value::Object(object);
        }
      }
      return self.value.clone();
    }

    let mut entries = json::Object::new();
    entries.set("source", self.source.clone());
    entries.set("token", self.token_json());
    entries.set("id", self.id.to_string());

    let payload = if !self.err.is_nullish() {
      Some(("err", &self.err))
    } else if !self.data.is_nullish() {
      Some(("data", &self.data))
    } else {
      None
    };

    if let Some((key, payload)) = payload {
      entries.set(key, payload.clone());
      if let Some(object) = payload.as_object() {
        for field in ["id", "token", "source"] {
          if let Some(value) = object.get(field) {
            entries.set(field, value.clone());
          }
        }
      }
    }

    json::Value::Object(entries)
  }

  pub fn str(&self) -> String {
    self.json().str()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn message(uri: &str) -> Message {
    Message::parse_with_options(uri, true).unwrap()
  }

  #[test]
  fn data_envelope_shape() {
    let message = message("ipc://echo?seq=1&value=hello");
    let result = Result::data(&message, json::Value::from(message.value.clone()));
    let parsed: serde_json::Value = serde_json::from_str(&result.str()).unwrap();

    assert_eq!(parsed["source"], "echo");
    assert_eq!(parsed["token"], serde_json::Value::Null);
    assert_eq!(parsed["id"], result.id.to_string());
    assert_eq!(parsed["data"], "hello");
    assert!(parsed.get("err").is_none());
  }

  #[test]
  fn err_string_wraps_into_message_object() {
    let message = message("ipc://broken?seq=2");
    let result = Result::err(&message, "bad");
    let parsed: serde_json::Value = serde_json::from_str(&result.str()).unwrap();
    assert_eq!(parsed["err"]["message"], "bad");
    assert!(parsed.get("data").is_none());
  }

  #[test]
  fn token_is_plumbed_from_the_message() {
    let message = message("ipc://secure?seq=3&ipc-token=abc");
    let result = Result::data(&message, json::Value::from(1));
    let parsed: serde_json::Value = serde_json::from_str(&result.str()).unwrap();
    assert_eq!(parsed["token"], "abc");
  }

  #[test]
  fn object_payload_may_override_envelope_fields() {
    let message = message("ipc://origin?seq=4");
    let mut payload = json::Object::new();
    payload.set("source", "overridden");
    payload.set("rows", 2);
    let result = Result::data(&message, json::Value::Object(payload));
    let parsed: serde_json::Value = serde_json::from_str(&result.str()).unwrap();
    assert_eq!(parsed["source"], "overridden");
    assert_eq!(parsed["data"]["rows"], 2);
  }

  #[test]
  fn value_object_with_envelope_keys_is_overlaid() {
    let message = message("ipc://value?seq=5&ipc-token=tok");
    let mut value = json::Object::new();
    value.set("source", "stale");
    value.set("data", 42);
    let result = Result::with_value(message.seq.clone(), &message, json::Value::Object(value));
    let parsed: serde_json::Value = serde_json::from_str(&result.str()).unwrap();
    assert_eq!(parsed["source"], "value");
    assert_eq!(parsed["token"], "tok");
    assert_eq!(parsed["data"], 42);
  }

  #[test]
  fn scalar_value_is_emitted_as_is() {
    let message = message("ipc://value?seq=6");
    let result = Result::with_value(message.seq.clone(), &message, json::Value::from("raw"));
    assert_eq!(result.str(), "\"raw\"");
  }

  #[test]
  fn queued_response_inherits_worker_id() {
    let message = message("ipc://stream?seq=7&runtime-worker-id=w1");
    let result = Result::data_with_queued_response(
      &message,
      json::Value::Empty,
      QueuedResponse::new(),
    );
    assert_eq!(result.queued_response.as_ref().unwrap().worker_id, "w1");
  }
}
