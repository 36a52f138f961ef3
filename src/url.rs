// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! URL parsing for the IPC wire protocol.
//!
//! The parser accepts `scheme:[//[host[:port]]][/path][?query][#fragment]`
//! and deliberately does *not* normalize pathnames or re-encode queries —
//! the bridge's wire format requires `search` to round-trip byte-for-byte.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::{Error, Result};

/// Characters left intact by [`encode_uri_component`], mirroring the
/// JavaScript function of the same name.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
  .remove(b'-')
  .remove(b'_')
  .remove(b'.')
  .remove(b'!')
  .remove(b'~')
  .remove(b'*')
  .remove(b'\'')
  .remove(b'(')
  .remove(b')');

/// Percent-decode `input`, replacing invalid UTF-8 sequences.
pub fn decode_uri_component(input: &str) -> String {
  percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Percent-encode `input` the way JavaScript's `encodeURIComponent` does.
pub fn encode_uri_component(input: &str) -> String {
  utf8_percent_encode(input, COMPONENT).to_string()
}

/// An insertion-ordered multimap of query parameters.
///
/// `get` returns the *last* value for a key — duplicate parameters are
/// last-write-wins across the bridge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchParams {
  entries: Vec<(String, String)>,
}

impl SearchParams {
  pub fn new() -> Self {
    Self::default()
  }

  /// Parse `a=1&b=2` input. When `decode` is set, values are
  /// percent-decoded as they are read.
  pub fn parse(query: &str, decode: bool) -> Self {
    let mut params = Self::new();
    for pair in query.split('&') {
      if pair.is_empty() {
        continue;
      }
      let (key, value) = match pair.split_once('=') {
        Some((key, value)) => (key, value),
        None => (pair, ""),
      };
      let value = if decode {
        decode_uri_component(value)
      } else {
        value.to_string()
      };
      params.append(key, value);
    }
    params
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self
      .entries
      .iter()
      .rev()
      .find(|(name, _)| name == key)
      .map(|(_, value)| value.as_str())
  }

  pub fn get_all(&self, key: &str) -> Vec<&str> {
    self
      .entries
      .iter()
      .filter(|(name, _)| name == key)
      .map(|(_, value)| value.as_str())
      .collect()
  }

  /// Replace every value for `key` with a single entry at the position of
  /// the first occurrence.
  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
    let key = key.into();
    let value = value.into();
    match self.entries.iter().position(|(name, _)| *name == key) {
      Some(index) => {
        self.entries[index].1 = value;
        let mut seen = false;
        self.entries.retain(|(name, _)| {
          if *name == key {
            if seen {
              return false;
            }
            seen = true;
          }
          true
        });
      }
      None => self.entries.push((key, value)),
    }
  }

  pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.entries.push((key.into(), value.into()));
  }

  pub fn contains(&self, key: &str) -> bool {
    self.entries.iter().any(|(name, _)| name == key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
    self.entries.iter()
  }
}

impl fmt::Display for SearchParams {
  /// Stringify back to query form, percent-encoding values.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (index, (key, value)) in self.entries.iter().enumerate() {
      if index > 0 {
        f.write_str("&")?;
      }
      write!(f, "{key}={}", encode_uri_component(value))?;
    }
    Ok(())
  }
}

/// A parsed URL. Immutable after construction; `to_string` round-trips.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Url {
  pub scheme: String,
  pub hostname: String,
  pub port: Option<u16>,
  pub pathname: String,
  /// The raw query including its leading `?`, empty when absent.
  pub search: String,
  pub fragment: String,
  pub search_params: SearchParams,
}

impl Url {
  pub fn parse(input: &str) -> Result<Self> {
    Self::parse_with_options(input, false)
  }

  /// Parse `input`; `decode_values` opts into percent-decoding of query
  /// parameter values.
  pub fn parse_with_options(input: &str, decode_values: bool) -> Result<Self> {
    let (scheme, rest) = input
      .split_once(':')
      .ok_or_else(|| Error::Parse(format!("url has no scheme: {input}")))?;

    if scheme.is_empty() || !scheme.chars().all(is_scheme_character) {
      return Err(Error::Parse(format!("invalid url scheme: {input}")));
    }

    let mut url = Url {
      scheme: scheme.to_lowercase(),
      ..Url::default()
    };

    let rest = match rest.strip_prefix("//") {
      Some(rest) => {
        let authority_end = rest
          .find(|character| matches!(character, '/' | '?' | '#'))
          .unwrap_or(rest.len());
        let authority = &rest[..authority_end];
        match authority.split_once(':') {
          Some((hostname, port)) => {
            url.hostname = hostname.to_lowercase();
            url.port = Some(
              port
                .parse()
                .map_err(|_| Error::Parse(format!("invalid url port: {input}")))?,
            );
          }
          None => url.hostname = authority.to_lowercase(),
        }
        &rest[authority_end..]
      }
      None => rest,
    };

    let (rest, fragment) = match rest.split_once('#') {
      Some((rest, fragment)) => (rest, fragment.to_string()),
      None => (rest, String::new()),
    };
    url.fragment = fragment;

    match rest.split_once('?') {
      Some((pathname, query)) => {
        url.pathname = pathname.to_string();
        url.search = format!("?{query}");
        url.search_params = SearchParams::parse(query, decode_values);
      }
      None => url.pathname = rest.to_string(),
    }

    if url.pathname.is_empty() && !url.hostname.is_empty() {
      url.pathname = "/".into();
    }

    Ok(url)
  }
}

impl fmt::Display for Url {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:", self.scheme)?;
    if !self.hostname.is_empty() {
      write!(f, "//{}", self.hostname)?;
      if let Some(port) = self.port {
        write!(f, ":{port}")?;
      }
    }
    write!(f, "{}{}", self.pathname, self.search)?;
    if !self.fragment.is_empty() {
      write!(f, "#{}", self.fragment)?;
    }
    Ok(())
  }
}

fn is_scheme_character(character: char) -> bool {
  character.is_ascii_alphanumeric() || matches!(character, '+' | '-' | '.')
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_every_component() {
    let url = Url::parse("socket://Host.Example:8000/a/b?x=1&y=2#frag").unwrap();
    assert_eq!(url.scheme, "socket");
    assert_eq!(url.hostname, "host.example");
    assert_eq!(url.port, Some(8000));
    assert_eq!(url.pathname, "/a/b");
    assert_eq!(url.search, "?x=1&y=2");
    assert_eq!(url.fragment, "frag");
    assert_eq!(url.search_params.get("y"), Some("2"));
  }

  #[test]
  fn pathname_defaults_to_root_with_a_host() {
    let url = Url::parse("ipc://echo?seq=1").unwrap();
    assert_eq!(url.pathname, "/");
    assert_eq!(url.search, "?seq=1");
  }

  #[test]
  fn round_trips_field_wise() {
    for input in [
      "ipc://echo?seq=1&value=hello",
      "socket://bundle/index.html#top",
      "https://example.com:443/path?q=a%20b",
      "file:/local/path",
    ] {
      let url = Url::parse(input).unwrap();
      assert_eq!(Url::parse(&url.to_string()).unwrap(), url);
    }
  }

  #[test]
  fn rejects_malformed_input() {
    assert!(Url::parse("no-scheme-here").is_err());
    assert!(Url::parse("ipc://host:notaport/").is_err());
    assert!(Url::parse(":missing").is_err());
  }

  #[test]
  fn duplicate_parameters_are_last_write_wins() {
    let url = Url::parse("ipc://x?k=1&k=2").unwrap();
    assert_eq!(url.search_params.get("k"), Some("2"));
    assert_eq!(url.search_params.get_all("k"), vec!["1", "2"]);
  }

  #[test]
  fn decoding_is_opt_in() {
    let raw = Url::parse("ipc://x?v=a%20b").unwrap();
    assert_eq!(raw.search_params.get("v"), Some("a%20b"));

    let decoded = Url::parse_with_options("ipc://x?v=a%20b", true).unwrap();
    assert_eq!(decoded.search_params.get("v"), Some("a b"));
  }

  #[test]
  fn search_params_stringify_back() {
    let mut params = SearchParams::new();
    params.append("a", "1");
    params.append("b", "two words");
    assert_eq!(params.to_string(), "a=1&b=two%20words");
  }

  #[test]
  fn set_collapses_duplicates() {
    let mut params = SearchParams::parse("k=1&other=x&k=2", false);
    params.set("k", "3");
    assert_eq!(params.get_all("k"), vec!["3"]);
    assert_eq!(params.len(), 2);
  }

  #[test]
  fn component_coding_round_trips() {
    let input = "hello world/?&=#ü";
    assert_eq!(decode_uri_component(&encode_uri_component(input)), input);
  }
}
