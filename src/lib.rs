// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! IPC bridge core for WebView-hosted application runtimes.
//!
//! This crate is the platform-agnostic heart of a runtime that hosts its UI
//! in the system WebView and runs its back end in native code. JavaScript
//! reaches native handlers through structured `ipc://<name>?<params>` URIs;
//! the crate routes those messages, shapes the JSON reply envelopes, and
//! drives custom-scheme request/response streaming.
//!
//! The moving parts, bottom up:
//!
//! - [`bytes`] — reference-counted byte buffers and their encodings.
//! - [`json`] — the tagged JSON value tree that defines the wire format.
//! - [`url`] / [`http`] — URL parsing and the ordered header/status types.
//! - [`crypto`] / [`uuid`] — request ids, tokens, and UUIDv7 generation.
//! - [`queued_response`] — out-of-band bodies (large buffers, SSE, chunked
//!   streams) fetched by a follow-up scheme request.
//! - [`preload`] — compiles the JavaScript shim injected into every
//!   document the WebView loads.
//! - [`dispatcher`] — the worker-thread task queue async handlers run on.
//! - [`ipc`] — [`Message`](ipc::Message), [`Result`](ipc::Result),
//!   [`Router`](ipc::Router) and the [`Bridge`](ipc::Bridge) facade.
//! - [`scheme_handlers`] — the request/response state machine behind
//!   custom URL schemes.
//!
//! Platform shells (Cocoa, WebKitGTK, WebView2, Android) sit outside this
//! crate. They implement [`scheme_handlers::PlatformResponder`] and a
//! concrete [`ipc::Bridge`], and call [`preload::insert_into_html`] before
//! handing documents to the WebView.

pub mod bytes;
pub mod crypto;
pub mod dispatcher;
pub mod http;
pub mod ipc;
pub mod json;
pub mod preload;
pub mod queued_response;
pub mod scheme_handlers;
pub mod url;
pub mod uuid;

pub use dispatcher::Dispatcher;
pub use queued_response::{QueuedResponse, QueuedResponses};
pub use url::Url;

/// Errors raised by the bridge core.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// Malformed URL, request line, or other unparsable input.
  #[error("failed to parse input: {0}")]
  Parse(String),
  /// The router was invoked for a name no route is mapped to.
  #[error("no route mapped for \"{0}\"")]
  RouteNotFound(String),
  /// An index or slice reached beyond a buffer view.
  #[error("buffer access out of range: {0} exceeds length {1}")]
  OutOfRange(usize, usize),
  /// A push into a non-resizable buffer queue would exceed its capacity.
  #[error("buffer capacity exceeded")]
  BufferOverflow,
  /// A request arrived on a scheme without a registered handler.
  #[error("no handler registered for scheme \"{0}\"")]
  SchemeNotRegistered(String),
  /// A handler was registered twice for the same scheme.
  #[error("a handler is already registered for scheme \"{0}\"")]
  DuplicateSchemeHandler(String),
  /// A response was driven outside its legal state machine.
  #[error("invalid response state: {0}")]
  ResponseState(&'static str),
  /// The operation observed its cancellation signal.
  #[error("operation cancelled")]
  Cancelled,
  /// The owning bridge has been shut down.
  #[error("bridge is inactive")]
  Inactive,
  /// A SHA-1 context was used after `finalize`.
  #[error("SHA-1 context already finalized")]
  Sha1Finalized,
  #[error(transparent)]
  InvalidMethod(#[from] ::http::method::InvalidMethod),
  #[error(transparent)]
  Utf8(#[from] std::string::FromUtf8Error),
}

/// Convenient type alias of Result type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
