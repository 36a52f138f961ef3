// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use ::http::Method;

use super::Headers;
use crate::{
  bytes::Buffer,
  url::{SearchParams, Url},
  Error, Result,
};

/// A raw HTTP request: request line, header block, body.
#[derive(Clone, Debug, Default)]
pub struct Request {
  pub version: String,
  pub method: Method,
  pub scheme: String,
  pub url: Url,
  pub headers: Headers,
  pub body: Buffer,
}

impl Request {
  /// Parse a request from raw bytes: `METHOD SP TARGET SP HTTP/VERSION
  /// CRLF`, headers until a blank line, then the body as the remainder.
  pub fn parse(input: &[u8]) -> Result<Self> {
    let head_end = find_subsequence(input, b"\r\n\r\n")
      .ok_or_else(|| Error::Parse("request is missing a header terminator".into()))?;
    let head = String::from_utf8(input[..head_end].to_vec())?;
    let (request_line, header_block) = head.split_once("\r\n").unwrap_or((head.as_str(), ""));

    let mut parts = request_line.split_whitespace();
    let method = parts
      .next()
      .ok_or_else(|| Error::Parse("request line is missing a method".into()))?;
    let target = parts
      .next()
      .ok_or_else(|| Error::Parse("request line is missing a target".into()))?;
    let version = parts
      .next()
      .and_then(|version| version.split_once('/'))
      .map(|(_, version)| version.to_string())
      .ok_or_else(|| Error::Parse("request line is missing an HTTP version".into()))?;

    let mut request = Request {
      version,
      method: Method::try_from(method)?,
      scheme: "http".into(),
      headers: Headers::from_source(header_block),
      body: Buffer::from_slice(&input[head_end + 4..]),
      ..Request::default()
    };

    match target.split_once('?') {
      Some((pathname, query)) => {
        request.url.pathname = pathname.to_string();
        request.url.search = format!("?{query}");
        request.url.search_params = SearchParams::parse(query, false);
      }
      None => request.url.pathname = target.to_string(),
    }

    if let Some(host) = request.headers.get("host") {
      match host.split_once(':') {
        Some((hostname, port)) => {
          request.url.hostname = hostname.to_lowercase();
          request.url.port = port.parse().ok();
        }
        None => request.url.hostname = host.to_lowercase(),
      }
    }

    Ok(request)
  }

  pub fn valid(&self) -> bool {
    !self.version.is_empty() && !self.url.pathname.is_empty()
  }

  /// Re-serialize the request head.
  pub fn str(&self) -> String {
    format!(
      "{} {}{} HTTP/{}\r\n{}",
      self.method, self.url.pathname, self.url.search, self.version, self.headers
    )
  }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
  haystack
    .windows(needle.len())
    .position(|window| window == needle)
}
