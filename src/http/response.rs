// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use super::{Headers, Status};
use crate::{bytes::Buffer, json};

/// A response head plus body. [`Response::str`] emits the status line and
/// header block only; the body is read through [`Response::data`].
#[derive(Clone, Debug, Default)]
pub struct Response {
  pub version: String,
  pub status: Status,
  pub headers: Headers,
  pub body: Buffer,
}

impl Response {
  pub fn new(status: Status) -> Self {
    Self {
      version: "1.1".into(),
      status,
      ..Self::default()
    }
  }

  pub fn with_headers(status: Status, headers: Headers) -> Self {
    Self {
      headers,
      ..Self::new(status)
    }
  }

  pub fn with_body(status: Status, body: impl AsRef<[u8]>) -> Self {
    Self {
      body: Buffer::from_slice(body.as_ref()),
      ..Self::new(status)
    }
  }

  /// A JSON body with the matching content type.
  pub fn json(status: Status, value: &json::Value) -> Self {
    let mut response = Self::with_body(status, value.str().as_bytes());
    response.headers.set("content-type", "application/json");
    response
  }

  pub fn set_header(&mut self, name: impl AsRef<str>, value: impl std::fmt::Display) -> &mut Self {
    self.headers.set(name, value);
    self
  }

  pub fn data(&self) -> Vec<u8> {
    self.body.to_vec()
  }

  pub fn size(&self) -> usize {
    self.body.len()
  }

  /// The status line and header block.
  pub fn str(&self) -> String {
    format!("HTTP/{} {}\r\n{}", self.version, self.status, self.headers)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn emits_status_line_and_headers() {
    let mut response = Response::with_body(Status::from_code(200), b"payload");
    response.set_header("content-type", "text/plain");
    assert_eq!(
      response.str(),
      "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n"
    );
    assert_eq!(response.data(), b"payload");
    assert_eq!(response.size(), 7);
  }

  #[test]
  fn json_bodies_set_the_content_type() {
    let value = json::Value::from("ok");
    let response = Response::json(Status::from_code(200), &value);
    assert_eq!(response.headers.get("content-type"), Some("application/json"));
    assert_eq!(response.data(), b"\"ok\"");
  }
}
