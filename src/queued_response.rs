// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Out-of-band reply bodies.
//!
//! A router handler that produces a payload too large (or too long-lived)
//! for the JSON envelope parks it here as a [`QueuedResponse`]; the reply
//! carries only the entry id, and a follow-up request on the reserved
//! scheme streams the stored body back.
//!
//! Streamed entries use connectable emitters: the producing handler holds
//! an [`EventStream`]/[`ChunkStream`] handle and pushes events through it,
//! while the serving layer connects the sink that writes them to the
//! platform. Emitting into a disconnected stream returns `false`, which is
//! the producer's signal to stop.

use std::{
  collections::HashMap,
  fmt,
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

use crate::{bytes::Buffer, crypto::rand64, http::Headers};

type EventSink = Box<dyn FnMut(Option<&str>, Option<&[u8]>, bool) -> bool + Send>;
type ChunkSink = Box<dyn FnMut(Option<&[u8]>, bool) -> bool + Send>;

/// A connectable sink for server-sent events.
#[derive(Clone, Default)]
pub struct EventStream {
  sink: Arc<Mutex<Option<EventSink>>>,
}

impl EventStream {
  pub fn new() -> Self {
    Self::default()
  }

  /// Install the sink that receives emitted events, replacing any
  /// previous one.
  pub fn connect(&self, sink: impl FnMut(Option<&str>, Option<&[u8]>, bool) -> bool + Send + 'static) {
    *self.sink.lock().expect("poisoned event stream") = Some(Box::new(sink));
  }

  pub fn disconnect(&self) {
    *self.sink.lock().expect("poisoned event stream") = None;
  }

  pub fn is_connected(&self) -> bool {
    self.sink.lock().expect("poisoned event stream").is_some()
  }

  /// Push one event. `finished` marks the terminal call. Returns `false`
  /// when no sink is connected or the sink asks the producer to stop.
  pub fn emit(&self, name: Option<&str>, data: Option<&[u8]>, finished: bool) -> bool {
    match self.sink.lock().expect("poisoned event stream").as_mut() {
      Some(sink) => sink(name, data, finished),
      None => false,
    }
  }
}

impl fmt::Debug for EventStream {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EventStream")
      .field("connected", &self.is_connected())
      .finish()
  }
}

/// A connectable sink for chunked transfer bodies.
#[derive(Clone, Default)]
pub struct ChunkStream {
  sink: Arc<Mutex<Option<ChunkSink>>>,
}

impl ChunkStream {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn connect(&self, sink: impl FnMut(Option<&[u8]>, bool) -> bool + Send + 'static) {
    *self.sink.lock().expect("poisoned chunk stream") = Some(Box::new(sink));
  }

  pub fn disconnect(&self) {
    *self.sink.lock().expect("poisoned chunk stream") = None;
  }

  pub fn is_connected(&self) -> bool {
    self.sink.lock().expect("poisoned chunk stream").is_some()
  }

  /// Push one chunk. `finished` marks the terminal call. Returns `false`
  /// when no sink is connected or the sink asks the producer to stop.
  pub fn emit(&self, chunk: Option<&[u8]>, finished: bool) -> bool {
    match self.sink.lock().expect("poisoned chunk stream").as_mut() {
      Some(sink) => sink(chunk, finished),
      None => false,
    }
  }
}

impl fmt::Debug for ChunkStream {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChunkStream")
      .field("connected", &self.is_connected())
      .finish()
  }
}

/// An out-of-band reply body: a completed buffer, an SSE emitter, or a
/// chunked emitter. With no body and no emitters the entry is empty.
#[derive(Clone, Debug)]
pub struct QueuedResponse {
  pub id: u64,
  /// Milliseconds the entry may stay in the store; zero means no
  /// expiration.
  pub ttl: u64,
  pub body: Option<Buffer>,
  pub headers: Headers,
  pub worker_id: String,
  pub event_stream: Option<EventStream>,
  pub chunk_stream: Option<ChunkStream>,
}

impl Default for QueuedResponse {
  fn default() -> Self {
    Self {
      id: rand64(),
      ttl: 0,
      body: None,
      headers: Headers::new(),
      worker_id: String::new(),
      event_stream: None,
      chunk_stream: None,
    }
  }
}

impl QueuedResponse {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_body(body: Buffer, headers: Headers) -> Self {
    Self {
      body: Some(body),
      headers,
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    self.body.is_none() && self.event_stream.is_none() && self.chunk_stream.is_none()
  }
}

struct Entry {
  response: QueuedResponse,
  expires: Option<Instant>,
}

/// The id-keyed store behind queued replies.
///
/// Entries with `ttl > 0` are swept lazily: every `put`/`get`/`remove`/
/// `len` drops entries whose deadline has passed. There is no timer
/// thread.
#[derive(Default)]
pub struct QueuedResponses {
  entries: Mutex<HashMap<u64, Entry>>,
}

impl QueuedResponses {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn put(&self, response: QueuedResponse) {
    let mut entries = self.entries.lock().expect("poisoned queued responses");
    Self::sweep(&mut entries);
    let expires = match response.ttl {
      0 => None,
      ttl => Some(Instant::now() + Duration::from_millis(ttl)),
    };
    entries.insert(response.id, Entry { response, expires });
  }

  pub fn get(&self, id: u64) -> Option<QueuedResponse> {
    let mut entries = self.entries.lock().expect("poisoned queued responses");
    Self::sweep(&mut entries);
    entries.get(&id).map(|entry| entry.response.clone())
  }

  pub fn remove(&self, id: u64) -> Option<QueuedResponse> {
    let mut entries = self.entries.lock().expect("poisoned queued responses");
    Self::sweep(&mut entries);
    entries.remove(&id).map(|entry| entry.response)
  }

  pub fn len(&self) -> usize {
    let mut entries = self.entries.lock().expect("poisoned queued responses");
    Self::sweep(&mut entries);
    entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn sweep(entries: &mut HashMap<u64, Entry>) {
    let now = Instant::now();
    entries.retain(|_, entry| match entry.expires {
      Some(deadline) => deadline > now,
      None => true,
    });
  }
}
