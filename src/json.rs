// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The JSON value tree and the serializer that defines the bridge's wire
//! format.
//!
//! Values are built programmatically by handlers; no parser lives here.
//! Composites are plain values: `clone()` deep-copies, equality is
//! structural, and cyclic graphs are unrepresentable, so serialization is
//! always finite. Serializing the same value twice yields byte-identical
//! output.

use std::fmt;

/// A JSON value.
///
/// `Empty` is the absence of a value (distinct from an explicit `null`);
/// `Raw` holds an already-serialized fragment spliced verbatim into output.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
  #[default]
  Empty,
  Null,
  Boolean(bool),
  Number(f64),
  String(String),
  Array(Vec<Value>),
  Object(Object),
  Raw(String),
  Error(Error),
}

impl Value {
  pub fn type_of(&self) -> &'static str {
    match self {
      Value::Empty => "empty",
      Value::Null => "null",
      Value::Boolean(_) => "boolean",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::Array(_) => "array",
      Value::Object(_) => "object",
      Value::Raw(_) => "raw",
      Value::Error(_) => "error",
    }
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, Value::Empty)
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  /// Whether this value carries no payload (`Empty` or `Null`).
  pub fn is_nullish(&self) -> bool {
    matches!(self, Value::Empty | Value::Null)
  }

  pub fn is_object(&self) -> bool {
    matches!(self, Value::Object(_))
  }

  pub fn is_array(&self) -> bool {
    matches!(self, Value::Array(_))
  }

  pub fn is_string(&self) -> bool {
    matches!(self, Value::String(_))
  }

  pub fn is_number(&self) -> bool {
    matches!(self, Value::Number(_))
  }

  pub fn is_boolean(&self) -> bool {
    matches!(self, Value::Boolean(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Value::Error(_))
  }

  pub fn as_object(&self) -> Option<&Object> {
    match self {
      Value::Object(object) => Some(object),
      _ => None,
    }
  }

  pub fn as_object_mut(&mut self) -> Option<&mut Object> {
    match self {
      Value::Object(object) => Some(object),
      _ => None,
    }
  }

  pub fn as_array(&self) -> Option<&Vec<Value>> {
    match self {
      Value::Array(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(string) => Some(string),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Number(number) => Some(*number),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Boolean(boolean) => Some(*boolean),
      _ => None,
    }
  }

  /// The serialized form. `Empty` renders as an empty string at the top
  /// level; inside composites it renders as `null`.
  pub fn str(&self) -> String {
    match self {
      Value::Empty => String::new(),
      _ => self.to_string(),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Empty | Value::Null => f.write_str("null"),
      Value::Boolean(true) => f.write_str("true"),
      Value::Boolean(false) => f.write_str("false"),
      Value::Number(number) => f.write_str(&format_number(*number)),
      Value::String(string) => f.write_str(&escape(string)),
      Value::Array(items) => {
        f.write_str("[")?;
        for (index, item) in items.iter().enumerate() {
          if index > 0 {
            f.write_str(",")?;
          }
          write!(f, "{item}")?;
        }
        f.write_str("]")
      }
      Value::Object(object) => write!(f, "{object}"),
      Value::Raw(source) => f.write_str(source),
      Value::Error(error) => write!(f, "{}", Value::Object(error.to_object())),
    }
  }
}

/// Numbers with no fractional part render as integers; non-finite values
/// have no JSON form and render as `null`.
fn format_number(number: f64) -> String {
  if !number.is_finite() {
    return "null".into();
  }
  if number.fract() == 0.0 && number.abs() < 9.007_199_254_740_992e15 {
    return format!("{}", number as i64);
  }
  format!("{number}")
}

/// Quote and escape a string for the wire: `"` becomes `\"`, a pre-existing
/// backslash-n pair is preserved as text, and literal newlines become `\n`.
fn escape(input: &str) -> String {
  let escaped = input.replace('"', "\\\"");
  let escaped = escaped.replace("\\n", "\\\\n");
  format!("\"{}\"", escaped.replace('\n', "\\n"))
}

/// An insertion-ordered `String → Value` map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Object {
  entries: Vec<(String, Value)>,
}

impl Object {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self
      .entries
      .iter()
      .find(|(name, _)| name == key)
      .map(|(_, value)| value)
  }

  pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
    self
      .entries
      .iter_mut()
      .find(|(name, _)| name == key)
      .map(|(_, value)| value)
  }

  /// Insert or replace in place, preserving the key's original position.
  pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    let key = key.into();
    let value = value.into();
    match self.entries.iter_mut().find(|(name, _)| *name == key) {
      Some(entry) => entry.1 = value,
      None => self.entries.push((key, value)),
    }
  }

  pub fn has(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  pub fn remove(&mut self, key: &str) -> Option<Value> {
    let index = self.entries.iter().position(|(name, _)| name == key)?;
    Some(self.entries.remove(index).1)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
    self.entries.iter()
  }
}

impl fmt::Display for Object {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("{")?;
    for (index, (key, value)) in self.entries.iter().enumerate() {
      if index > 0 {
        f.write_str(",")?;
      }
      write!(f, "{}:{value}", escape(key))?;
    }
    f.write_str("}")
  }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(entries: I) -> Self {
    let mut object = Object::new();
    for (key, value) in entries {
      object.set(key, value);
    }
    object
  }
}

/// A JSON value that doubles as an exception-like carrier.
///
/// Serializes as an object holding only its non-empty fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Error {
  pub name: String,
  pub message: String,
  pub code: i64,
  pub location: String,
}

impl Error {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      ..Self::default()
    }
  }

  pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      message: message.into(),
      ..Self::default()
    }
  }

  pub fn with_code(mut self, code: i64) -> Self {
    self.code = code;
    self
  }

  pub fn with_location(mut self, location: impl Into<String>) -> Self {
    self.location = location.into();
    self
  }

  pub fn to_object(&self) -> Object {
    let mut object = Object::new();
    if !self.name.is_empty() {
      object.set("name", self.name.clone());
    }
    if !self.message.is_empty() {
      object.set("message", self.message.clone());
    }
    if self.code != 0 {
      object.set("code", self.code);
    }
    if !self.location.is_empty() {
      object.set("location", self.location.clone());
    }
    object
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.name.is_empty() {
      write!(f, "{}", self.message)
    } else if self.location.is_empty() {
      write!(f, "{}: {}", self.name, self.message)
    } else {
      write!(f, "{}: {} (from {})", self.name, self.message, self.location)
    }
  }
}

impl std::error::Error for Error {}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Boolean(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Number(value)
  }
}

impl From<i32> for Value {
  fn from(value: i32) -> Self {
    Value::Number(value as f64)
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Number(value as f64)
  }
}

impl From<u32> for Value {
  fn from(value: u32) -> Self {
    Value::Number(value as f64)
  }
}

impl From<u64> for Value {
  fn from(value: u64) -> Self {
    Value::Number(value as f64)
  }
}

impl From<usize> for Value {
  fn from(value: usize) -> Self {
    Value::Number(value as f64)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.into())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::String(value)
  }
}

impl From<Vec<Value>> for Value {
  fn from(value: Vec<Value>) -> Self {
    Value::Array(value)
  }
}

impl From<Object> for Value {
  fn from(value: Object) -> Self {
    Value::Object(value)
  }
}

impl From<Error> for Value {
  fn from(value: Error) -> Self {
    Value::Error(value)
  }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(value: Option<T>) -> Self {
    match value {
      Some(value) => value.into(),
      None => Value::Null,
    }
  }
}
