// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use std::{collections::HashMap, fmt};

use once_cell::sync::Lazy;

use crate::json;

static STATUSES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
  HashMap::from([
    (100, "Continue"),
    (101, "Switching Protocols"),
    (102, "Processing"),
    (103, "Early Hints"),
    (200, "OK"),
    (201, "Created"),
    (202, "Accepted"),
    (203, "Non-Authoritative Information"),
    (204, "No Content"),
    (205, "Reset Content"),
    (206, "Partial Content"),
    (207, "Multi-Status"),
    (208, "Already Reported"),
    (226, "IM Used"),
    (300, "Multiple Choices"),
    (301, "Moved Permanently"),
    (302, "Found"),
    (303, "See Other"),
    (304, "Not Modified"),
    (305, "Use Proxy"),
    (306, "Switch Proxy"),
    (307, "Temporary Redirect"),
    (308, "Permanent Redirect"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (402, "Payment Required"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (406, "Not Acceptable"),
    (407, "Proxy Authentication Required"),
    (408, "Request Timeout"),
    (409, "Conflict"),
    (410, "Gone"),
    (411, "Length Required"),
    (412, "Precondition Failed"),
    (413, "Payload Too Large"),
    (414, "URI Too Long"),
    (415, "Unsupported Media Type"),
    (416, "Range Not Satisfiable"),
    (417, "Expectation Failed"),
    (418, "I'm a Teapot"),
    (421, "Misdirected Request"),
    (422, "Unprocessable Entity"),
    (423, "Locked"),
    (424, "Failed Dependency"),
    (425, "Too Early"),
    (426, "Upgrade Required"),
    (428, "Precondition Required"),
    (429, "Too Many Requests"),
    (431, "Request Header Fields Too Large"),
    (451, "Unavailable For Legal Reasons"),
    (500, "Internal Server Error"),
    (501, "Not Implemented"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Timeout"),
    (505, "HTTP Version Not Supported"),
    (506, "Variant Also Negotiates"),
    (507, "Insufficient Storage"),
    (508, "Loop Detected"),
    (509, "Bandwidth Limit Exceeded"),
    (510, "Not Extended"),
    (511, "Network Authentication Required"),
  ])
});

/// The reason phrase for `code`, empty when unknown.
pub fn status_text(code: u16) -> &'static str {
  STATUSES.get(&code).copied().unwrap_or("")
}

/// Reverse lookup of a reason phrase, case-insensitive. Zero when unknown.
pub fn status_code(text: &str) -> u16 {
  let needle = text.to_lowercase();
  STATUSES
    .iter()
    .find(|(_, reason)| reason.to_lowercase() == needle)
    .map(|(code, _)| *code)
    .unwrap_or(0)
}

/// A status line: numeric code plus reason phrase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
  pub code: u16,
  pub text: String,
}

impl Default for Status {
  fn default() -> Self {
    Self {
      code: 200,
      text: "OK".into(),
    }
  }
}

impl Status {
  pub fn new(code: u16, text: impl Into<String>) -> Self {
    Self {
      code,
      text: text.into(),
    }
  }

  pub fn from_code(code: u16) -> Self {
    Self {
      code,
      text: status_text(code).into(),
    }
  }

  pub fn from_text(text: impl Into<String>) -> Self {
    let text = text.into();
    Self {
      code: status_code(&text),
      text,
    }
  }

  pub fn json(&self) -> json::Value {
    let mut object = json::Object::new();
    object.set("code", self.code as i64);
    object.set("text", normalize_status_text(&self.text));
    json::Value::Object(object)
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let text = normalize_status_text(&self.text);
    if text.is_empty() {
      write!(f, "{}", self.code)
    } else {
      write!(f, "{} {}", self.code, text)
    }
  }
}

fn normalize_status_text(text: &str) -> String {
  text
    .split_whitespace()
    .map(|word| {
      let mut characters = word.chars();
      match characters.next() {
        Some(first) => {
          first.to_uppercase().collect::<String>() + &characters.as_str().to_lowercase()
        }
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}
