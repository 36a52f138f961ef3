// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use super::{Client, ResultCallback, Router};
use crate::{bytes::BufferQueue, dispatcher::Dispatcher, json, queued_response::QueuedResponse};

/// The per-WebView facade over the IPC channel.
///
/// A concrete bridge is created per WebView instance by the platform
/// shell. It owns exactly one [`Router`] and one [`Client`] identity, and
/// carries the delivery primitives the core cannot implement itself:
/// `emit` and `send` evaluate into the page, so only the shell can supply
/// them.
///
/// `active()` is the lifecycle gate — platform shutdown flips it to
/// `false`, after which no router invocation proceeds and in-flight work
/// drains safely.
///
/// Implementations are constructed with [`Arc::new_cyclic`] so the router
/// can hold a weak back-reference:
///
/// ```ignore
/// let bridge = Arc::new_cyclic(|weak: &Weak<MyBridge>| {
///   let weak: Weak<dyn Bridge> = weak.clone();
///   MyBridge { router: Router::new(weak), .. }
/// });
/// ```
pub trait Bridge: Send + Sync {
  /// Whether this bridge still accepts work.
  fn active(&self) -> bool;

  fn client(&self) -> &Client;

  fn router(&self) -> &Router;

  fn dispatcher(&self) -> &Dispatcher;

  /// Broadcast a named event to the JS side.
  fn emit(&self, name: &str, payload: json::Value) -> bool;

  /// Deliver a reply for `seq`, optionally backed by a queued body.
  fn send(&self, seq: &str, payload: String, queued_response: Option<QueuedResponse>) -> bool;

  /// Route an IPC uri through this bridge's router; the reply is
  /// dispatched back through [`send`](Self::send) on the dispatcher.
  ///
  /// This is the entry point scheme handlers use.
  fn route(&self, uri: &str, body: Option<BufferQueue>) -> bool {
    let weak = self.router().bridge_weak();
    self.router().invoke_with_body(
      uri,
      body,
      Arc::new(move |result| {
        let Some(bridge) = weak.upgrade() else {
          return;
        };
        let seq = result.seq.clone();
        let payload = result.str();
        let queued_response = result.queued_response.clone();
        let weak = weak.clone();
        bridge.dispatcher().dispatch(move || {
          if let Some(bridge) = weak.upgrade() {
            bridge.send(&seq, payload, queued_response);
          }
        });
      }),
    )
  }

  /// Route an IPC uri and observe the reply directly.
  fn route_with_callback(
    &self,
    uri: &str,
    body: Option<BufferQueue>,
    callback: ResultCallback,
  ) -> bool {
    self.router().invoke_with_body(uri, body, callback)
  }
}
