// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use std::fmt;

use crate::json;

/// A single header entry. Names are stored lower-cased; [`Headers`]
/// re-emits them header-cased.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
  pub name: String,
  pub value: String,
}

impl Header {
  pub fn new(name: impl AsRef<str>, value: impl fmt::Display) -> Self {
    Self {
      name: name.as_ref().trim().to_lowercase(),
      value: value.to_string().trim().to_string(),
    }
  }
}

/// An ordered list of headers.
///
/// Lookup is case-insensitive; `set` replaces the first match in place and
/// `erase` removes the first match. Serialization emits header-cased names
/// and always terminates with `\r\n\r\n`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
  entries: Vec<Header>,
}

impl Headers {
  pub fn new() -> Self {
    Self::default()
  }

  /// Parse `Name: value` lines from a raw source block.
  pub fn from_source(source: &str) -> Self {
    let mut headers = Self::new();
    for line in source.split(['\n', '\r']) {
      if let Some((name, value)) = line.split_once(':') {
        if !name.trim().is_empty() {
          headers.append(name, value.trim());
        }
      }
    }
    headers
  }

  pub fn set(&mut self, name: impl AsRef<str>, value: impl fmt::Display) -> &mut Self {
    let header = Header::new(name, value);
    match self
      .entries
      .iter_mut()
      .find(|entry| entry.name == header.name)
    {
      Some(entry) => entry.value = header.value,
      None => self.entries.push(header),
    }
    self
  }

  pub fn append(&mut self, name: impl AsRef<str>, value: impl fmt::Display) -> &mut Self {
    self.entries.push(Header::new(name, value));
    self
  }

  pub fn has(&self, name: &str) -> bool {
    let name = name.to_lowercase();
    self.entries.iter().any(|entry| entry.name == name)
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    let name = name.to_lowercase();
    self
      .entries
      .iter()
      .find(|entry| entry.name == name)
      .map(|entry| entry.value.as_str())
  }

  /// Remove the first header matching `name`.
  pub fn erase(&mut self, name: &str) -> bool {
    let name = name.to_lowercase();
    match self.entries.iter().position(|entry| entry.name == name) {
      Some(index) => {
        self.entries.remove(index);
        true
      }
      None => false,
    }
  }

  pub fn clear(&mut self) -> bool {
    if self.entries.is_empty() {
      return false;
    }
    self.entries.clear();
    true
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Header> {
    self.entries.iter()
  }

  /// Merge `other` into `self`, replacing matching names.
  pub fn extend(&mut self, other: &Headers) {
    for header in other.iter() {
      self.set(&header.name, &header.value);
    }
  }

  /// The headers as a JSON object with lower-cased names.
  pub fn json(&self) -> json::Value {
    let mut object = json::Object::new();
    for entry in &self.entries {
      object.set(entry.name.clone(), entry.value.clone());
    }
    json::Value::Object(object)
  }
}

impl fmt::Display for Headers {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (index, entry) in self.entries.iter().enumerate() {
      if index > 0 {
        f.write_str("\r\n")?;
      }
      write!(f, "{}: {}", to_header_case(&entry.name), entry.value)?;
    }
    f.write_str("\r\n\r\n")
  }
}

impl<N: AsRef<str>, V: fmt::Display> FromIterator<(N, V)> for Headers {
  fn from_iter<I: IntoIterator<Item = (N, V)>>(entries: I) -> Self {
    let mut headers = Headers::new();
    for (name, value) in entries {
      headers.set(name, value);
    }
    headers
  }
}

/// `x-custom-header` → `X-Custom-Header`.
pub fn to_header_case(source: &str) -> String {
  source
    .trim()
    .split('-')
    .map(proper_case)
    .collect::<Vec<_>>()
    .join("-")
}

fn proper_case(word: &str) -> String {
  let mut characters = word.chars();
  match characters.next() {
    Some(first) => first.to_uppercase().collect::<String>() + &characters.as_str().to_lowercase(),
    None => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lookup_is_case_insensitive() {
    let mut headers = Headers::new();
    headers.set("X-Foo", "1");
    assert_eq!(headers.get("x-foo"), Some("1"));
    assert_eq!(headers.get("X-FOO"), Some("1"));
  }

  #[test]
  fn serialization_is_header_cased_and_terminated() {
    let mut headers = Headers::new();
    headers.set("x-foo", "1");
    headers.set("content-type", "text/plain");
    assert_eq!(
      headers.to_string(),
      "X-Foo: 1\r\nContent-Type: text/plain\r\n\r\n"
    );
  }

  #[test]
  fn empty_headers_still_terminate() {
    assert_eq!(Headers::new().to_string(), "\r\n\r\n");
  }

  #[test]
  fn set_replaces_in_place() {
    let mut headers = Headers::new();
    headers.set("a", "1");
    headers.set("b", "2");
    headers.set("A", "3");
    assert_eq!(headers.to_string(), "A: 3\r\nB: 2\r\n\r\n");
  }

  #[test]
  fn erase_removes_the_first_match() {
    let mut headers = Headers::new();
    headers.append("dup", "1");
    headers.append("dup", "2");
    assert!(headers.erase("DUP"));
    assert_eq!(headers.get("dup"), Some("2"));
    assert!(!headers.erase("missing"));
  }

  #[test]
  fn parses_from_source() {
    let headers = Headers::from_source("Host: example.com\r\nX-A: 1\r\n");
    assert_eq!(headers.get("host"), Some("example.com"));
    assert_eq!(headers.get("x-a"), Some("1"));
  }

  #[test]
  fn header_case_conversion() {
    assert_eq!(to_header_case("content-security-policy"), "Content-Security-Policy");
    assert_eq!(to_header_case("ETAG"), "Etag");
  }
}
