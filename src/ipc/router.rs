// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use std::{
  collections::HashMap,
  fmt,
  sync::{Arc, Mutex, Weak},
};

use super::{Bridge, Message, Result};
use crate::{bytes::BufferQueue, crypto::rand64};

/// The reply sink handed to a message handler.
pub type ReplyCallback = Arc<dyn Fn(Result) + Send + Sync>;

/// The completion callback supplied by an invoker.
pub type ResultCallback = Arc<dyn Fn(Result) + Send + Sync>;

/// A route or listener callback.
pub type MessageCallback = Arc<dyn Fn(Message, &Router, ReplyCallback) + Send + Sync>;

#[derive(Clone)]
struct RouteContext {
  is_async: bool,
  callback: MessageCallback,
}

#[derive(Clone)]
struct ListenerContext {
  token: u64,
  callback: MessageCallback,
}

#[derive(Default)]
struct Tables {
  table: HashMap<String, RouteContext>,
  preserved: HashMap<String, RouteContext>,
  listeners: HashMap<String, Vec<ListenerContext>>,
}

/// The name → handler dispatch table of a bridge.
///
/// Names are case-insensitive. Routes mapped before [`init`](Self::init)
/// are preserved: `unmap` only touches the public table, so built-ins
/// survive user-map operations. Listeners observe invocations without
/// producing replies; `"*"` matches every name.
pub struct Router {
  bridge: Weak<dyn Bridge>,
  tables: Mutex<Tables>,
}

impl Router {
  /// Routers live inside their owning [`Bridge`]; construct the bridge
  /// with `Arc::new_cyclic` and pass the weak self-reference here.
  pub fn new(bridge: Weak<dyn Bridge>) -> Self {
    Self {
      bridge,
      tables: Mutex::new(Tables::default()),
    }
  }

  pub fn bridge(&self) -> Option<Arc<dyn Bridge>> {
    self.bridge.upgrade()
  }

  pub(crate) fn bridge_weak(&self) -> Weak<dyn Bridge> {
    self.bridge.clone()
  }

  /// Snapshot the current table as the preserved set of built-in routes.
  pub fn init(&self) {
    self.preserve_current_table();
  }

  pub fn preserve_current_table(&self) {
    let mut tables = self.lock();
    tables.preserved = tables.table.clone();
  }

  /// Map `name` to a handler. Async handlers run on the bridge's
  /// [`Dispatcher`](crate::Dispatcher) and may block; sync handlers run
  /// inline on the invoking thread and must not.
  pub fn map(
    &self,
    name: &str,
    is_async: bool,
    callback: impl Fn(Message, &Router, ReplyCallback) + Send + Sync + 'static,
  ) {
    let key = name.to_lowercase();
    self.lock().table.insert(
      key,
      RouteContext {
        is_async,
        callback: Arc::new(callback),
      },
    );
  }

  /// Remove a route from the public table. Preserved routes remain
  /// invocable.
  pub fn unmap(&self, name: &str) {
    self.lock().table.remove(&name.to_lowercase());
  }

  /// Observe invocations of `name` (or every name, with `"*"`). Returns
  /// the token for [`unlisten`](Self::unlisten).
  pub fn listen(
    &self,
    name: &str,
    callback: impl Fn(Message, &Router, ReplyCallback) + Send + Sync + 'static,
  ) -> u64 {
    let token = rand64();
    self
      .lock()
      .listeners
      .entry(name.to_lowercase())
      .or_default()
      .push(ListenerContext {
        token,
        callback: Arc::new(callback),
      });
    token
  }

  pub fn unlisten(&self, name: &str, token: u64) -> bool {
    let mut tables = self.lock();
    match tables.listeners.get_mut(&name.to_lowercase()) {
      Some(listeners) => match listeners.iter().position(|listener| listener.token == token) {
        Some(index) => {
          listeners.remove(index);
          true
        }
        None => false,
      },
      None => false,
    }
  }

  /// Invoke the route named by `uri`. Returns `false` when the bridge is
  /// inactive, the uri does not parse, or no route matches.
  pub fn invoke(&self, uri: &str, callback: ResultCallback) -> bool {
    self.invoke_with_body(uri, None, callback)
  }

  pub fn invoke_with_body(
    &self,
    uri: &str,
    body: Option<BufferQueue>,
    callback: ResultCallback,
  ) -> bool {
    let Some(bridge) = self.bridge.upgrade() else {
      return false;
    };
    if !bridge.active() {
      return false;
    }

    let message = match Message::parse_with_options(uri, true) {
      Ok(message) => message,
      Err(_) => return false,
    };

    self.invoke_message(message, body, callback)
  }

  pub fn invoke_message(
    &self,
    message: Message,
    body: Option<BufferQueue>,
    callback: ResultCallback,
  ) -> bool {
    let Some(bridge) = self.bridge.upgrade() else {
      return false;
    };
    if !bridge.active() {
      return false;
    }

    let name = message.name.to_lowercase();

    // preserved routes win over the public table so built-ins cannot be
    // shadowed or removed
    let (context, listeners) = {
      let tables = self.lock();
      let context = match tables
        .preserved
        .get(&name)
        .or_else(|| tables.table.get(&name))
      {
        Some(context) => context.clone(),
        None => return false,
      };

      let mut listeners = Vec::new();
      if let Some(named) = tables.listeners.get(&name) {
        listeners.extend(named.iter().map(|listener| listener.callback.clone()));
      }
      if let Some(wildcard) = tables.listeners.get("*") {
        listeners.extend(wildcard.iter().map(|listener| listener.callback.clone()));
      }
      (context, listeners)
    };

    let mut message = message;
    if let Some(body) = body {
      message.buffer = body;
    }

    // listeners observe; their reply sink is a no-op
    let noop: ReplyCallback = Arc::new(|_| {});
    for listener in listeners {
      listener(message.clone(), self, noop.clone());
    }

    let reply = self.reply_callback(callback);

    if context.is_async {
      let weak = self.bridge.clone();
      return bridge.dispatcher().dispatch(move || {
        let Some(bridge) = weak.upgrade() else {
          return;
        };
        (context.callback)(message, bridge.router(), reply);
      });
    }

    (context.callback)(message, self, reply);
    true
  }

  /// Wrap a completion callback with the fire-and-forget rule: replies
  /// whose `seq` is `"-1"` go out through [`Bridge::send`] even though a
  /// callback exists.
  fn reply_callback(&self, callback: ResultCallback) -> ReplyCallback {
    let weak = self.bridge.clone();
    Arc::new(move |result: Result| {
      if result.seq == "-1" {
        if let Some(bridge) = weak.upgrade() {
          bridge.send(&result.seq, result.str(), result.queued_response.clone());
        }
      } else {
        callback(result);
      }
    })
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
    self.tables.lock().expect("poisoned router tables")
  }
}

impl fmt::Debug for Router {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let tables = self.lock();
    f.debug_struct("Router")
      .field("routes", &tables.table.len())
      .field("preserved", &tables.preserved.len())
      .field("listeners", &tables.listeners.len())
      .finish()
  }
}
