// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Request/response machinery for custom URL schemes.
//!
//! When the hosting WebView issues a request under a registered scheme,
//! the platform shell builds a [`Request`] with the [`Builder`], hands the
//! core a [`PlatformResponder`] for the output side, and calls
//! [`SchemeHandlers::handle_request`]. The mapped handler then drives the
//! [`Response`] state machine: an optional `write_head`, any number of
//! `write` calls, and exactly one terminal `finish`/`fail`/`redirect`.
//!
//! The core never names a WebView type — each platform shell implements
//! [`PlatformResponder`] over its own primitives (`WKURLSchemeTask`,
//! `WebKitURISchemeRequest`, `ICoreWebView2WebResourceResponse`, …).

use std::{
  collections::HashMap,
  fmt,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, Weak,
  },
};

use ::http::Method;

use crate::{
  bytes::Buffer,
  crypto::rand64,
  http::{status_text, Headers},
  ipc::{Bridge, Client},
  json,
  queued_response::QueuedResponses,
  url::{SearchParams, Url},
  Error,
};

/// Output half of the platform capability interface.
///
/// Calls arrive in order: `write_head` once, `write_body` zero or more
/// times, then exactly one of `finish` or `fail`.
pub trait PlatformResponder: Send {
  fn write_head(&mut self, status_code: u16, status_text: &str, headers: &Headers);
  fn write_body(&mut self, bytes: &[u8]);
  fn finish(&mut self);
  fn fail(&mut self, error: &str);
}

/// Hooks observed over the lifetime of a request.
#[derive(Default)]
pub struct RequestCallbacks {
  pub cancel: Option<Box<dyn Fn() + Send + Sync>>,
  pub finish: Option<Box<dyn Fn() + Send + Sync>>,
  pub fail: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

/// A request intercepted from the WebView under a custom scheme.
///
/// Active from construction until its response's terminal call;
/// cancellation is one-way and sticky.
pub struct Request {
  pub id: u64,
  pub scheme: String,
  pub method: Method,
  pub hostname: String,
  pub pathname: String,
  pub query: String,
  pub fragment: String,
  pub headers: Headers,
  pub body: Option<Buffer>,
  pub client: Client,
  pub origin: String,
  pub original_url: String,
  callbacks: RequestCallbacks,
  finalized: AtomicBool,
  cancelled: AtomicBool,
}

impl Request {
  pub fn has_header(&self, name: &str) -> bool {
    self.headers.has(name)
  }

  pub fn get_header(&self, name: &str) -> Option<&str> {
    self.headers.get(name)
  }

  /// The request URL reassembled from its parts.
  pub fn url(&self) -> String {
    let mut url = format!("{}://{}{}", self.scheme, self.hostname, self.pathname);
    if !self.query.is_empty() {
      url.push('?');
      url.push_str(&self.query);
    }
    if !self.fragment.is_empty() {
      url.push('#');
      url.push_str(&self.fragment);
    }
    url
  }

  pub fn str(&self) -> String {
    self.url()
  }

  /// The parsed query parameters (values undecoded).
  pub fn params(&self) -> SearchParams {
    SearchParams::parse(&self.query, false)
  }

  pub fn is_active(&self) -> bool {
    !self.finalized.load(Ordering::SeqCst) && !self.cancelled.load(Ordering::SeqCst)
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }

  /// Flip the request out of its active state. Returns `false` when it
  /// was already finalized.
  pub(crate) fn finalize(&self) -> bool {
    !self.finalized.swap(true, Ordering::SeqCst)
  }

  /// Mark the request cancelled and fire the cancel hook once.
  pub fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::SeqCst) {
      if let Some(cancel) = &self.callbacks.cancel {
        cancel();
      }
    }
  }

  /// A diagnostic dump of the request head.
  pub fn json(&self) -> json::Value {
    let mut object = json::Object::new();
    object.set("id", self.id.to_string());
    object.set("scheme", self.scheme.clone());
    object.set("method", self.method.to_string());
    object.set("hostname", self.hostname.clone());
    object.set("pathname", self.pathname.clone());
    object.set("query", self.query.clone());
    object.set("headers", self.headers.json());
    json::Value::Object(object)
  }
}

impl fmt::Debug for Request {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Request")
      .field("id", &self.id)
      .field("method", &self.method)
      .field("url", &self.url())
      .field("active", &self.is_active())
      .finish()
  }
}

struct Parts {
  scheme: String,
  method: Method,
  hostname: String,
  pathname: String,
  query: String,
  fragment: String,
  headers: Headers,
  body: Option<Buffer>,
  client: Client,
  origin: String,
  original_url: String,
  callbacks: RequestCallbacks,
}

impl Default for Parts {
  fn default() -> Self {
    Self {
      scheme: String::new(),
      method: Method::GET,
      hostname: String::new(),
      pathname: "/".into(),
      query: String::new(),
      fragment: String::new(),
      headers: Headers::new(),
      body: None,
      client: Client::new(0, -1),
      origin: String::new(),
      original_url: String::new(),
      callbacks: RequestCallbacks::default(),
    }
  }
}

/// Builds a [`Request`] from whatever the platform delivered.
///
/// Errors latch: the first invalid input is reported by
/// [`build`](Self::build), so call sites can chain setters without
/// checking each one.
pub struct Builder {
  inner: crate::Result<Parts>,
}

impl Default for Builder {
  fn default() -> Self {
    Self {
      inner: Ok(Parts::default()),
    }
  }
}

impl Builder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed scheme, hostname, pathname, query, and fragment from an
  /// absolute URL.
  pub fn from_url(url: &str) -> Self {
    let original = url.to_string();
    match Url::parse(url) {
      Ok(url) => Self::new()
        .set_scheme(&url.scheme)
        .set_hostname(&url.hostname)
        .set_pathname(&url.pathname)
        .set_query(url.search.trim_start_matches('?'))
        .set_fragment(&url.fragment)
        .set_original_url(&original),
      Err(error) => Self { inner: Err(error) },
    }
  }

  pub fn set_scheme(self, scheme: &str) -> Self {
    let scheme = scheme.to_lowercase();
    self.and_then(move |mut parts| {
      parts.scheme = scheme;
      Ok(parts)
    })
  }

  pub fn set_method(self, method: &str) -> Self {
    let method = Method::try_from(method).map_err(Error::from);
    self.and_then(move |mut parts| {
      parts.method = method?;
      Ok(parts)
    })
  }

  pub fn set_hostname(self, hostname: &str) -> Self {
    let hostname = hostname.to_lowercase();
    self.and_then(move |mut parts| {
      parts.hostname = hostname;
      Ok(parts)
    })
  }

  pub fn set_pathname(self, pathname: &str) -> Self {
    let pathname = if pathname.is_empty() { "/" } else { pathname }.to_string();
    self.and_then(move |mut parts| {
      parts.pathname = pathname;
      Ok(parts)
    })
  }

  pub fn set_query(self, query: &str) -> Self {
    let query = query.to_string();
    self.and_then(move |mut parts| {
      parts.query = query;
      Ok(parts)
    })
  }

  pub fn set_fragment(self, fragment: &str) -> Self {
    let fragment = fragment.to_string();
    self.and_then(move |mut parts| {
      parts.fragment = fragment;
      Ok(parts)
    })
  }

  pub fn set_header(self, name: &str, value: impl fmt::Display) -> Self {
    let name = name.to_string();
    let value = value.to_string();
    self.and_then(move |mut parts| {
      parts.headers.set(name, value);
      Ok(parts)
    })
  }

  pub fn set_headers(self, headers: Headers) -> Self {
    self.and_then(move |mut parts| {
      parts.headers.extend(&headers);
      Ok(parts)
    })
  }

  pub fn set_body(self, body: Buffer) -> Self {
    self.and_then(move |mut parts| {
      parts.body = Some(body);
      Ok(parts)
    })
  }

  pub fn set_client(self, client: Client) -> Self {
    self.and_then(move |mut parts| {
      parts.client = client;
      Ok(parts)
    })
  }

  pub fn set_origin(self, origin: &str) -> Self {
    let origin = origin.to_string();
    self.and_then(move |mut parts| {
      parts.origin = origin;
      Ok(parts)
    })
  }

  pub fn set_original_url(self, url: &str) -> Self {
    let url = url.to_string();
    self.and_then(move |mut parts| {
      parts.original_url = url;
      Ok(parts)
    })
  }

  pub fn set_callbacks(self, callbacks: RequestCallbacks) -> Self {
    self.and_then(move |mut parts| {
      parts.callbacks = callbacks;
      Ok(parts)
    })
  }

  pub fn build(self) -> crate::Result<Arc<Request>> {
    self.inner.map(|parts| {
      Arc::new(Request {
        id: rand64(),
        scheme: parts.scheme,
        method: parts.method,
        hostname: parts.hostname,
        pathname: parts.pathname,
        query: parts.query,
        fragment: parts.fragment,
        headers: parts.headers,
        body: parts.body,
        client: parts.client,
        origin: parts.origin,
        original_url: parts.original_url,
        callbacks: parts.callbacks,
        finalized: AtomicBool::new(false),
        cancelled: AtomicBool::new(false),
      })
    })
  }

  fn and_then(self, f: impl FnOnce(Parts) -> crate::Result<Parts>) -> Self {
    Self {
      inner: self.inner.and_then(f),
    }
  }
}

/// A server-sent event frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Event {
  pub name: String,
  pub data: String,
}

impl Event {
  pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      data: data.into(),
    }
  }

  /// The wire form: `event:` and `data:` lines (each only when
  /// non-empty) terminated by a blank line.
  pub fn str(&self) -> String {
    let mut output = String::new();
    if !self.name.is_empty() {
      output.push_str("event: ");
      output.push_str(&self.name);
      output.push('\n');
    }
    if !self.data.is_empty() {
      output.push_str("data: ");
      output.push_str(&self.data);
      output.push('\n');
    }
    output.push('\n');
    output
  }
}

/// The response side of an intercepted request.
///
/// `write_head` is legal at most once and only before the first `write`;
/// the default head (status 200 plus `set_header` headers) is flushed at
/// the first `write` or the terminal call. After cancellation writes are
/// silently dropped; state violations fail with [`Error::ResponseState`].
pub struct Response {
  request: Arc<Request>,
  pub id: u64,
  status_code: u16,
  headers: Headers,
  head_flushed: bool,
  wrote_body: bool,
  finished: bool,
  platform: Box<dyn PlatformResponder>,
  handlers: Weak<SchemeHandlers>,
}

impl Response {
  pub fn new(
    handlers: &Arc<SchemeHandlers>,
    request: Arc<Request>,
    platform: Box<dyn PlatformResponder>,
  ) -> Self {
    Self {
      request,
      id: rand64(),
      status_code: 200,
      headers: Headers::new(),
      head_flushed: false,
      wrote_body: false,
      finished: false,
      platform,
      handlers: Arc::downgrade(handlers),
    }
  }

  pub fn request(&self) -> &Arc<Request> {
    &self.request
  }

  pub fn client(&self) -> &Client {
    &self.request.client
  }

  pub fn status_code(&self) -> u16 {
    self.status_code
  }

  pub fn headers(&self) -> &Headers {
    &self.headers
  }

  pub fn has_header(&self, name: &str) -> bool {
    self.headers.has(name)
  }

  pub fn get_header(&self, name: &str) -> Option<&str> {
    self.headers.get(name)
  }

  /// Stage a header for the head block.
  pub fn set_header(&mut self, name: &str, value: impl fmt::Display) -> crate::Result<()> {
    if self.head_flushed {
      return Err(Error::ResponseState("header set after head was written"));
    }
    self.headers.set(name, value);
    Ok(())
  }

  /// Send the status line and header block.
  pub fn write_head(&mut self, status_code: u16, headers: Headers) -> crate::Result<()> {
    if self.finished {
      return Err(Error::ResponseState("writeHead after finish"));
    }
    if self.wrote_body {
      return Err(Error::ResponseState("writeHead after write"));
    }
    if self.head_flushed {
      return Err(Error::ResponseState("writeHead may only be called once"));
    }
    self.status_code = status_code;
    self.headers.extend(&headers);
    self.flush_head();
    Ok(())
  }

  /// Append bytes to the body, flushing the default head first if
  /// necessary. Writes after cancellation are ignored.
  pub fn write(&mut self, bytes: &[u8]) -> crate::Result<()> {
    if self.finished {
      return Err(Error::ResponseState("write after finish"));
    }
    self.flush_head();
    self.wrote_body = true;
    if !self.request.is_cancelled() {
      self.platform.write_body(bytes);
    }
    Ok(())
  }

  /// A complete body in one call: `write` + `finish`.
  pub fn send(&mut self, body: &[u8]) -> crate::Result<()> {
    self.write(body)?;
    self.finish()
  }

  /// A complete JSON body with the matching content type.
  pub fn send_json(&mut self, value: &json::Value) -> crate::Result<()> {
    if !self.head_flushed {
      self.set_header("content-type", "application/json")?;
    }
    self.send(value.str().as_bytes())
  }

  /// Append one SSE frame.
  pub fn write_event(&mut self, event: &Event) -> crate::Result<()> {
    self.write(event.str().as_bytes())
  }

  /// Close the stream. Exactly one of `finish`, `fail`, or `redirect`
  /// must terminate every response.
  pub fn finish(&mut self) -> crate::Result<()> {
    if self.finished {
      return Err(Error::ResponseState("finish after finish"));
    }
    self.flush_head();
    if !self.request.is_cancelled() {
      self.platform.finish();
    }
    self.release();
    if let Some(finish) = &self.request.callbacks.finish {
      finish();
    }
    Ok(())
  }

  /// Terminate the request with a platform-level failure.
  pub fn fail(&mut self, reason: &str) -> crate::Result<()> {
    if self.finished {
      return Err(Error::ResponseState("fail after finish"));
    }
    if !self.request.is_cancelled() {
      self.platform.fail(reason);
    }
    self.release();
    if let Some(fail) = &self.request.callbacks.fail {
      fail(reason);
    }
    Ok(())
  }

  /// Terminate with a `Location` redirect.
  pub fn redirect(&mut self, location: &str, status_code: u16) -> crate::Result<()> {
    let mut headers = Headers::new();
    headers.set("location", location);
    self.write_head(status_code, headers)?;
    self.finish()
  }

  fn flush_head(&mut self) {
    if self.head_flushed {
      return;
    }
    self.head_flushed = true;
    if !self.request.is_cancelled() {
      self
        .platform
        .write_head(self.status_code, status_text(self.status_code), &self.headers);
    }
  }

  fn release(&mut self) {
    self.finished = true;
    self.request.finalize();
    if let Some(handlers) = self.handlers.upgrade() {
      handlers.remove_active(self.request.id);
    }
  }
}

impl Drop for Response {
  fn drop(&mut self) {
    // a response dropped without a terminal call fails its request so
    // the active-request registry cannot leak
    if !self.finished {
      let _ = self.fail("response dropped before completion");
    }
  }
}

impl fmt::Debug for Response {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Response")
      .field("id", &self.id)
      .field("status_code", &self.status_code)
      .field("finished", &self.finished)
      .finish()
  }
}

/// A scheme handler: receives the request, the owning bridge (when still
/// alive), and the response to drive.
pub type Handler = Arc<dyn Fn(Arc<Request>, Option<Arc<dyn Bridge>>, Response) + Send + Sync>;

/// The per-bridge registry of scheme handlers and in-flight requests.
pub struct SchemeHandlers {
  bridge: Weak<dyn Bridge>,
  handlers: Mutex<HashMap<String, Handler>>,
  active_requests: Mutex<HashMap<u64, Arc<Request>>>,
}

impl SchemeHandlers {
  pub fn new(bridge: Weak<dyn Bridge>) -> Arc<Self> {
    Arc::new(Self {
      bridge,
      handlers: Mutex::new(HashMap::new()),
      active_requests: Mutex::new(HashMap::new()),
    })
  }

  /// Register `handler` for `scheme`. Duplicate registrations fail with
  /// [`Error::DuplicateSchemeHandler`].
  pub fn register_scheme_handler(
    &self,
    scheme: &str,
    handler: impl Fn(Arc<Request>, Option<Arc<dyn Bridge>>, Response) + Send + Sync + 'static,
  ) -> crate::Result<()> {
    let scheme = scheme.to_lowercase();
    let mut handlers = self.handlers.lock().expect("poisoned scheme handlers");
    if handlers.contains_key(&scheme) {
      return Err(Error::DuplicateSchemeHandler(scheme));
    }
    handlers.insert(scheme, Arc::new(handler));
    Ok(())
  }

  pub fn has_handler_for_scheme(&self, scheme: &str) -> bool {
    self
      .handlers
      .lock()
      .expect("poisoned scheme handlers")
      .contains_key(&scheme.to_lowercase())
  }

  pub fn handler_for_scheme(&self, scheme: &str) -> Option<Handler> {
    self
      .handlers
      .lock()
      .expect("poisoned scheme handlers")
      .get(&scheme.to_lowercase())
      .cloned()
  }

  /// Dispatch an intercepted request to its scheme's handler.
  ///
  /// With no handler registered, the request is answered with `404` and
  /// [`Error::SchemeNotRegistered`] is returned.
  pub fn handle_request(
    self: &Arc<Self>,
    request: Arc<Request>,
    platform: Box<dyn PlatformResponder>,
  ) -> crate::Result<()> {
    self
      .active_requests
      .lock()
      .expect("poisoned active requests")
      .insert(request.id, request.clone());

    let mut response = Response::new(self, request.clone(), platform);

    let Some(handler) = self.handler_for_scheme(&request.scheme) else {
      response.write_head(404, Headers::new())?;
      response.finish()?;
      return Err(Error::SchemeNotRegistered(request.scheme.clone()));
    };

    // handler callbacks run outside the registry lock
    handler(request, self.bridge.upgrade(), response);
    Ok(())
  }

  /// Platform-initiated cancellation. Sticky; fires the request's cancel
  /// hook once. Returns `false` for unknown ids.
  pub fn cancel_request(&self, id: u64) -> bool {
    let request = {
      let active = self.active_requests.lock().expect("poisoned active requests");
      active.get(&id).cloned()
    };
    match request {
      Some(request) => {
        request.cancel();
        true
      }
      None => false,
    }
  }

  pub fn is_request_active(&self, id: u64) -> bool {
    self
      .active_requests
      .lock()
      .expect("poisoned active requests")
      .get(&id)
      .map(|request| request.is_active())
      .unwrap_or(false)
  }

  pub fn is_request_cancelled(&self, id: u64) -> bool {
    self
      .active_requests
      .lock()
      .expect("poisoned active requests")
      .get(&id)
      .map(|request| request.is_cancelled())
      .unwrap_or(false)
  }

  pub fn active_request_count(&self) -> usize {
    self
      .active_requests
      .lock()
      .expect("poisoned active requests")
      .len()
  }

  pub(crate) fn remove_active(&self, id: u64) {
    self
      .active_requests
      .lock()
      .expect("poisoned active requests")
      .remove(&id);
  }
}

impl fmt::Debug for SchemeHandlers {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SchemeHandlers")
      .field(
        "schemes",
        &self.handlers.lock().expect("poisoned scheme handlers").len(),
      )
      .field("active_requests", &self.active_request_count())
      .finish()
  }
}

/// Stream a stored [`QueuedResponse`] back for a follow-up request.
///
/// The request's `id=` query parameter selects the entry. Completed
/// bodies are written with the stored headers; SSE and chunked entries
/// connect the response as the stream sink, and the entry is removed on
/// the terminal event. Closing the follow-up request disconnects the
/// sink, so the producer's next emit returns `false`.
pub fn serve_queued_response(
  store: &Arc<QueuedResponses>,
  request: &Arc<Request>,
  mut response: Response,
) -> crate::Result<()> {
  let id = match request.params().get("id").and_then(|id| id.parse().ok()) {
    Some(id) => id,
    None => {
      response.write_head(400, Headers::new())?;
      response.finish()?;
      return Err(Error::Parse("queued response request has no id".into()));
    }
  };

  let Some(entry) = store.get(id) else {
    response.write_head(404, Headers::new())?;
    return response.finish();
  };

  if let Some(stream) = entry.event_stream.clone() {
    let mut headers = entry.headers.clone();
    if !headers.has("content-type") {
      headers.set("content-type", "text/event-stream");
    }
    headers.set("cache-control", "no-cache");
    response.write_head(200, headers)?;

    let store = store.clone();
    let mut slot = Some(response);
    stream.connect(move |name, data, finished| {
      let Some(active) = slot.as_mut() else {
        return false;
      };
      if active.request().is_cancelled() {
        let mut active = slot.take().expect("event stream response slot");
        let _ = active.finish();
        store.remove(id);
        return false;
      }
      if finished {
        let mut active = slot.take().expect("event stream response slot");
        let _ = active.finish();
        store.remove(id);
        return true;
      }
      let event = Event::new(
        name.unwrap_or(""),
        data.map(|data| String::from_utf8_lossy(data).into_owned()).unwrap_or_default(),
      );
      match active.write_event(&event) {
        Ok(()) => true,
        Err(_) => {
          slot.take();
          false
        }
      }
    });
    return Ok(());
  }

  if let Some(stream) = entry.chunk_stream.clone() {
    let mut headers = entry.headers.clone();
    if !headers.has("content-type") {
      headers.set("content-type", "application/octet-stream");
    }
    response.write_head(200, headers)?;

    let store = store.clone();
    let mut slot = Some(response);
    stream.connect(move |chunk, finished| {
      let Some(active) = slot.as_mut() else {
        return false;
      };
      if active.request().is_cancelled() {
        let mut active = slot.take().expect("chunk stream response slot");
        let _ = active.finish();
        store.remove(id);
        return false;
      }
      if let Some(chunk) = chunk {
        if active.write(chunk).is_err() {
          slot.take();
          return false;
        }
      }
      if finished {
        let mut active = slot.take().expect("chunk stream response slot");
        let _ = active.finish();
        store.remove(id);
      }
      true
    });
    return Ok(());
  }

  response.write_head(200, entry.headers.clone())?;
  if let Some(body) = &entry.body {
    response.write(&body.to_vec())?;
  }
  response.finish()?;
  store.remove(id);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_latches_the_first_error() {
    let result = Builder::from_url("socket://bundle/index.html?x=1")
      .set_method("NOT A METHOD")
      .set_header("x-late", "still applied to the latched error")
      .build();
    assert!(result.is_err());
  }

  #[test]
  fn builder_seeds_from_url() {
    let request = Builder::from_url("socket://Bundle/app/index.html?x=1#top")
      .set_method("GET")
      .set_header("Accept", "text/html")
      .build()
      .unwrap();
    assert_eq!(request.scheme, "socket");
    assert_eq!(request.hostname, "bundle");
    assert_eq!(request.pathname, "/app/index.html");
    assert_eq!(request.query, "x=1");
    assert_eq!(request.fragment, "top");
    assert_eq!(request.get_header("accept"), Some("text/html"));
    assert_eq!(request.url(), "socket://bundle/app/index.html?x=1#top");
  }

  #[test]
  fn event_framing() {
    assert_eq!(Event::new("tick", "1").str(), "event: tick\ndata: 1\n\n");
    assert_eq!(Event::new("", "payload").str(), "data: payload\n\n");
    assert_eq!(Event::default().str(), "\n");
  }
}
