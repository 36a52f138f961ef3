// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! End-to-end coverage of the bridge: router dispatch, reply envelopes,
//! scheme-handler lifecycles, queued-response streaming, and preload
//! injection, driven through a test bridge and an in-memory platform
//! responder.

use std::{
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, Weak,
  },
  time::Duration,
};

use crossbeam_channel::{unbounded, Receiver};

use socket_bridge::{
  bytes::Buffer,
  http::Headers,
  ipc::{Bridge, Client, Message, Result as IpcResult, Router},
  json,
  preload::{self, Features, InsertOptions},
  queued_response::{EventStream, QueuedResponse, QueuedResponses},
  scheme_handlers::{serve_queued_response, Builder, PlatformResponder, Response, SchemeHandlers},
  Dispatcher,
};

struct SentReply {
  seq: String,
  payload: String,
  queued_response: Option<QueuedResponse>,
}

struct TestBridge {
  client: Client,
  dispatcher: Dispatcher,
  router: Router,
  active: AtomicBool,
  sent: Mutex<Vec<SentReply>>,
  emitted: Mutex<Vec<(String, String)>>,
}

impl Bridge for TestBridge {
  fn active(&self) -> bool {
    self.active.load(Ordering::SeqCst)
  }

  fn client(&self) -> &Client {
    &self.client
  }

  fn router(&self) -> &Router {
    &self.router
  }

  fn dispatcher(&self) -> &Dispatcher {
    &self.dispatcher
  }

  fn emit(&self, name: &str, payload: json::Value) -> bool {
    self
      .emitted
      .lock()
      .unwrap()
      .push((name.to_string(), payload.str()));
    true
  }

  fn send(&self, seq: &str, payload: String, queued_response: Option<QueuedResponse>) -> bool {
    self.sent.lock().unwrap().push(SentReply {
      seq: seq.to_string(),
      payload,
      queued_response,
    });
    true
  }
}

fn test_bridge() -> Arc<TestBridge> {
  Arc::new_cyclic(|weak: &Weak<TestBridge>| {
    let bridge: Weak<dyn Bridge> = weak.clone();
    TestBridge {
      client: Client::default(),
      dispatcher: Dispatcher::new(),
      router: Router::new(bridge),
      active: AtomicBool::new(true),
      sent: Mutex::new(Vec::new()),
      emitted: Mutex::new(Vec::new()),
    }
  })
}

#[derive(Clone, Default)]
struct Platform(Arc<Mutex<PlatformOutput>>);

#[derive(Default)]
struct PlatformOutput {
  status: Option<u16>,
  status_text: String,
  headers: Option<Headers>,
  body: Vec<u8>,
  finished: bool,
  failed: Option<String>,
}

impl Platform {
  fn output(&self) -> std::sync::MutexGuard<'_, PlatformOutput> {
    self.0.lock().unwrap()
  }
}

impl PlatformResponder for Platform {
  fn write_head(&mut self, status_code: u16, status_text: &str, headers: &Headers) {
    let mut output = self.0.lock().unwrap();
    output.status = Some(status_code);
    output.status_text = status_text.to_string();
    output.headers = Some(headers.clone());
  }

  fn write_body(&mut self, bytes: &[u8]) {
    self.0.lock().unwrap().body.extend_from_slice(bytes);
  }

  fn finish(&mut self) {
    self.0.lock().unwrap().finished = true;
  }

  fn fail(&mut self, error: &str) {
    self.0.lock().unwrap().failed = Some(error.to_string());
  }
}

fn wait_for_reply(receiver: &Receiver<IpcResult>) -> IpcResult {
  receiver
    .recv_timeout(Duration::from_secs(5))
    .expect("timed out waiting for a reply")
}

#[test]
fn echo_round_trip() {
  let bridge = test_bridge();
  bridge.router().map("echo", true, |message, _, reply| {
    let value = json::Value::from(message.value.clone());
    reply(IpcResult::data(&message, value));
  });

  let (sender, receiver) = unbounded();
  let invoked = bridge.router().invoke(
    "ipc://echo?seq=1&value=hello",
    Arc::new(move |result| {
      sender.send(result).unwrap();
    }),
  );
  assert!(invoked);

  let result = wait_for_reply(&receiver);
  let parsed: serde_json::Value = serde_json::from_str(&result.str()).unwrap();
  assert_eq!(parsed["source"], "echo");
  assert_eq!(parsed["token"], serde_json::Value::Null);
  assert_eq!(parsed["data"], "hello");
  assert_eq!(parsed["id"], result.id.to_string());
}

#[test]
fn unmapped_names_are_not_dispatched() {
  let bridge = test_bridge();
  let replied = Arc::new(AtomicUsize::new(0));
  let observer = replied.clone();
  let invoked = bridge.router().invoke(
    "ipc://nope?seq=2",
    Arc::new(move |_| {
      observer.fetch_add(1, Ordering::SeqCst);
    }),
  );
  assert!(!invoked);

  std::thread::sleep(Duration::from_millis(50));
  assert_eq!(replied.load(Ordering::SeqCst), 0);
  assert!(bridge.sent.lock().unwrap().is_empty());
}

#[test]
fn handler_errors_reach_the_caller() {
  let bridge = test_bridge();
  bridge.router().map("broken", true, |message, _, reply| {
    reply(IpcResult::err(&message, "bad"));
  });

  let (sender, receiver) = unbounded();
  bridge.router().invoke(
    "ipc://broken?seq=2",
    Arc::new(move |result| {
      sender.send(result).unwrap();
    }),
  );

  let result = wait_for_reply(&receiver);
  let parsed: serde_json::Value = serde_json::from_str(&result.str()).unwrap();
  assert_eq!(parsed["source"], "broken");
  assert_eq!(parsed["err"]["message"], "bad");
  assert!(parsed.get("data").is_none());
}

#[test]
fn fire_and_forget_replies_go_through_send() {
  let bridge = test_bridge();
  bridge.router().map("notify", true, |message, _, reply| {
    reply(IpcResult::data(&message, json::Value::from("done")));
  });

  let replied = Arc::new(AtomicUsize::new(0));
  let observer = replied.clone();
  bridge.router().invoke(
    "ipc://notify?seq=-1",
    Arc::new(move |_| {
      observer.fetch_add(1, Ordering::SeqCst);
    }),
  );

  for _ in 0..100 {
    if !bridge.sent.lock().unwrap().is_empty() {
      break;
    }
    std::thread::sleep(Duration::from_millis(10));
  }

  let sent = bridge.sent.lock().unwrap();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].seq, "-1");
  assert!(sent[0].payload.contains("\"done\""));
  assert_eq!(replied.load(Ordering::SeqCst), 0);
}

#[test]
fn inactive_bridges_reject_invocations() {
  let bridge = test_bridge();
  bridge.router().map("echo", true, |message, _, reply| {
    reply(IpcResult::data(&message, json::Value::Null));
  });
  bridge.active.store(false, Ordering::SeqCst);
  assert!(!bridge.router().invoke("ipc://echo?seq=1", Arc::new(|_| {})));
}

#[test]
fn preserved_routes_survive_unmap() {
  let bridge = test_bridge();
  bridge.router().map("builtin.ping", true, |message, _, reply| {
    reply(IpcResult::data(&message, json::Value::from("pong")));
  });
  bridge.router().init();
  bridge.router().unmap("builtin.ping");

  let (sender, receiver) = unbounded();
  let invoked = bridge.router().invoke(
    "ipc://builtin.ping?seq=3",
    Arc::new(move |result| {
      sender.send(result).unwrap();
    }),
  );
  assert!(invoked);
  let result = wait_for_reply(&receiver);
  assert_eq!(result.data, json::Value::from("pong"));
}

#[test]
fn wildcard_listeners_fire_exactly_once_per_invoke() {
  let bridge = test_bridge();
  bridge.router().map("observed", false, |message, _, reply| {
    reply(IpcResult::data(&message, json::Value::Null));
  });

  let named = Arc::new(AtomicUsize::new(0));
  let wildcard = Arc::new(AtomicUsize::new(0));
  {
    let named = named.clone();
    bridge.router().listen("observed", move |_, _, _| {
      named.fetch_add(1, Ordering::SeqCst);
    });
  }
  let token = {
    let wildcard = wildcard.clone();
    bridge.router().listen("*", move |_, _, _| {
      wildcard.fetch_add(1, Ordering::SeqCst);
    })
  };

  bridge
    .router()
    .invoke("ipc://observed?seq=4", Arc::new(|_| {}));
  assert_eq!(named.load(Ordering::SeqCst), 1);
  assert_eq!(wildcard.load(Ordering::SeqCst), 1);

  assert!(bridge.router().unlisten("*", token));
  bridge
    .router()
    .invoke("ipc://observed?seq=5", Arc::new(|_| {}));
  assert_eq!(wildcard.load(Ordering::SeqCst), 1);
}

#[test]
fn sync_handlers_run_inline() {
  let bridge = test_bridge();
  bridge.router().map("inline", false, |message, _, reply| {
    reply(IpcResult::data(&message, json::Value::from(1)));
  });

  let replied = Arc::new(AtomicUsize::new(0));
  let observer = replied.clone();
  bridge.router().invoke(
    "ipc://inline?seq=6",
    Arc::new(move |_| {
      observer.fetch_add(1, Ordering::SeqCst);
    }),
  );
  // no dispatcher hop: the reply already happened
  assert_eq!(replied.load(Ordering::SeqCst), 1);
}

#[test]
fn scheme_request_lifecycle_returns_registry_to_baseline() {
  let bridge = test_bridge();
  let weak: Weak<dyn Bridge> = Arc::downgrade(&(bridge.clone() as Arc<dyn Bridge>));
  let handlers = SchemeHandlers::new(weak);

  handlers
    .register_scheme_handler("socket", |_request, _bridge, mut response| {
      response.write_head(200, Headers::new()).unwrap();
      response.write(b"ok").unwrap();
      response.finish().unwrap();
    })
    .unwrap();

  assert_eq!(handlers.active_request_count(), 0);

  let request = Builder::from_url("socket://bundle/index.html")
    .set_method("GET")
    .build()
    .unwrap();
  let platform = Platform::default();
  handlers
    .handle_request(request.clone(), Box::new(platform.clone()))
    .unwrap();

  assert_eq!(handlers.active_request_count(), 0);
  assert!(!request.is_active());
  let output = platform.output();
  assert_eq!(output.status, Some(200));
  assert_eq!(output.status_text, "OK");
  assert_eq!(output.body, b"ok");
  assert!(output.finished);
}

#[test]
fn emit_broadcasts_to_the_shell() {
  let bridge = test_bridge();
  assert!(bridge.emit("application.ready", json::Value::from(true)));
  let emitted = bridge.emitted.lock().unwrap();
  assert_eq!(emitted[0], ("application.ready".to_string(), "true".to_string()));
}

#[test]
fn unregistered_schemes_fail_with_not_found() {
  let bridge = test_bridge();
  let weak: Weak<dyn Bridge> = Arc::downgrade(&(bridge.clone() as Arc<dyn Bridge>));
  let handlers = SchemeHandlers::new(weak);

  let request = Builder::from_url("unknown://host/").build().unwrap();
  let platform = Platform::default();
  let result = handlers.handle_request(request, Box::new(platform.clone()));
  assert!(result.is_err());
  assert_eq!(platform.output().status, Some(404));
  assert_eq!(handlers.active_request_count(), 0);
}

#[test]
fn cancelled_requests_ignore_writes() {
  let bridge = test_bridge();
  let weak: Weak<dyn Bridge> = Arc::downgrade(&(bridge.clone() as Arc<dyn Bridge>));
  let handlers = SchemeHandlers::new(weak);

  let slot: Arc<Mutex<Option<Response>>> = Arc::new(Mutex::new(None));
  {
    let slot = slot.clone();
    handlers
      .register_scheme_handler("socket", move |_request, _bridge, response| {
        *slot.lock().unwrap() = Some(response);
      })
      .unwrap();
  }

  let request = Builder::from_url("socket://stream/").build().unwrap();
  let platform = Platform::default();
  handlers
    .handle_request(request.clone(), Box::new(platform.clone()))
    .unwrap();

  assert!(handlers.is_request_active(request.id));
  assert!(handlers.cancel_request(request.id));
  assert!(handlers.is_request_cancelled(request.id));

  let mut response = slot.lock().unwrap().take().unwrap();
  response.write(b"dropped").unwrap();
  response.finish().unwrap();

  let output = platform.output();
  assert!(output.body.is_empty());
  assert!(!output.finished);
  assert_eq!(handlers.active_request_count(), 0);
}

#[test]
fn dropping_a_response_fails_the_request() {
  let bridge = test_bridge();
  let weak: Weak<dyn Bridge> = Arc::downgrade(&(bridge.clone() as Arc<dyn Bridge>));
  let handlers = SchemeHandlers::new(weak);

  handlers
    .register_scheme_handler("socket", |_request, _bridge, _response| {
      // terminal call forgotten on purpose
    })
    .unwrap();

  let request = Builder::from_url("socket://leak/").build().unwrap();
  let platform = Platform::default();
  handlers
    .handle_request(request, Box::new(platform.clone()))
    .unwrap();

  assert_eq!(handlers.active_request_count(), 0);
  assert!(platform.output().failed.is_some());
}

fn queued_body_fixture(
  store: &Arc<QueuedResponses>,
  bridge: &Arc<TestBridge>,
) -> (Arc<SchemeHandlers>, u64) {
  let weak: Weak<dyn Bridge> = Arc::downgrade(&(bridge.clone() as Arc<dyn Bridge>));
  let handlers = SchemeHandlers::new(weak);

  let mut headers = Headers::new();
  headers.set("content-type", "application/octet-stream");
  let queued = QueuedResponse::from_body(
    Buffer::from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]),
    headers,
  );
  let id = queued.id;
  store.put(queued);
  (handlers, id)
}

#[test]
fn queued_bodies_stream_through_the_follow_up_scheme() {
  let bridge = test_bridge();
  let store = Arc::new(QueuedResponses::new());

  // the first reply carries the queue id inside `data`
  {
    let store = store.clone();
    bridge.router().map("download", true, move |message, _, reply| {
      let mut headers = Headers::new();
      headers.set("content-type", "application/octet-stream");
      let queued =
        QueuedResponse::from_body(Buffer::from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]), headers);
      let mut data = json::Object::new();
      data.set("id", queued.id.to_string());
      store.put(queued.clone());
      reply(IpcResult::data_with_queued_response(
        &message,
        json::Value::Object(data),
        queued,
      ));
    });
  }

  let (sender, receiver) = unbounded();
  bridge.router().invoke(
    "ipc://download?seq=7",
    Arc::new(move |result| {
      sender.send(result).unwrap();
    }),
  );
  let result = wait_for_reply(&receiver);
  let parsed: serde_json::Value = serde_json::from_str(&result.str()).unwrap();
  let id: u64 = parsed["data"]["id"].as_str().unwrap().parse().unwrap();

  // follow-up request on the reserved scheme streams the stored body
  let weak: Weak<dyn Bridge> = Arc::downgrade(&(bridge.clone() as Arc<dyn Bridge>));
  let handlers = SchemeHandlers::new(weak);
  let request = Builder::from_url(&format!("socket://queued-response?id={id}"))
    .build()
    .unwrap();
  let platform = Platform::default();
  let response = Response::new(&handlers, request.clone(), Box::new(platform.clone()));
  serve_queued_response(&store, &request, response).unwrap();

  let output = platform.output();
  assert_eq!(output.status, Some(200));
  assert_eq!(output.body, vec![1, 2, 3, 4, 5, 6, 7, 8]);
  assert_eq!(
    output.headers.as_ref().unwrap().get("content-type"),
    Some("application/octet-stream")
  );
  assert!(output.finished);
  drop(output);
  assert!(store.get(id).is_none());
}

#[test]
fn missing_queued_entries_answer_not_found() {
  let bridge = test_bridge();
  let store = Arc::new(QueuedResponses::new());
  let (handlers, _id) = queued_body_fixture(&store, &bridge);

  let request = Builder::from_url("socket://queued-response?id=42").build().unwrap();
  let platform = Platform::default();
  let response = Response::new(&handlers, request.clone(), Box::new(platform.clone()));
  serve_queued_response(&store, &request, response).unwrap();
  assert_eq!(platform.output().status, Some(404));
}

#[test]
fn event_streams_deliver_until_the_terminal_event() {
  let bridge = test_bridge();
  let store = Arc::new(QueuedResponses::new());
  let weak: Weak<dyn Bridge> = Arc::downgrade(&(bridge.clone() as Arc<dyn Bridge>));
  let handlers = SchemeHandlers::new(weak);

  let stream = EventStream::new();
  let queued = QueuedResponse {
    event_stream: Some(stream.clone()),
    ..QueuedResponse::new()
  };
  let id = queued.id;
  store.put(queued);

  let request = Builder::from_url(&format!("socket://queued-response?id={id}"))
    .build()
    .unwrap();
  let platform = Platform::default();
  let response = Response::new(&handlers, request.clone(), Box::new(platform.clone()));
  serve_queued_response(&store, &request, response).unwrap();

  assert!(stream.emit(Some("tick"), Some(b"1"), false));
  assert!(stream.emit(Some("tick"), Some(b"2"), false));
  assert!(stream.emit(None, None, true));

  let output = platform.output();
  assert_eq!(output.headers.as_ref().unwrap().get("content-type"), Some("text/event-stream"));
  assert_eq!(
    String::from_utf8_lossy(&output.body),
    "event: tick\ndata: 1\n\nevent: tick\ndata: 2\n\n"
  );
  assert!(output.finished);
  drop(output);

  assert!(store.get(id).is_none());
  // the terminal event disconnected the stream
  assert!(!stream.emit(Some("tick"), Some(b"3"), false));
}

#[test]
fn cancelling_the_follow_up_stops_the_stream_within_one_event() {
  let bridge = test_bridge();
  let store = Arc::new(QueuedResponses::new());
  let weak: Weak<dyn Bridge> = Arc::downgrade(&(bridge.clone() as Arc<dyn Bridge>));
  let handlers = SchemeHandlers::new(weak);

  let stream = EventStream::new();
  let queued = QueuedResponse {
    event_stream: Some(stream.clone()),
    ..QueuedResponse::new()
  };
  let id = queued.id;
  store.put(queued);

  let request = Builder::from_url(&format!("socket://queued-response?id={id}"))
    .build()
    .unwrap();
  let platform = Platform::default();
  let response = Response::new(&handlers, request.clone(), Box::new(platform.clone()));
  serve_queued_response(&store, &request, response).unwrap();

  assert!(stream.emit(Some("tick"), Some(b"1"), false));
  request.cancel();
  assert!(!stream.emit(Some("tick"), Some(b"2"), false));
  assert!(store.get(id).is_none());
}

#[test]
fn chunk_streams_concatenate_in_order() {
  let bridge = test_bridge();
  let store = Arc::new(QueuedResponses::new());
  let weak: Weak<dyn Bridge> = Arc::downgrade(&(bridge.clone() as Arc<dyn Bridge>));
  let handlers = SchemeHandlers::new(weak);

  let stream = socket_bridge::queued_response::ChunkStream::new();
  let queued = QueuedResponse {
    chunk_stream: Some(stream.clone()),
    ..QueuedResponse::new()
  };
  let id = queued.id;
  store.put(queued);

  let request = Builder::from_url(&format!("socket://queued-response?id={id}"))
    .build()
    .unwrap();
  let platform = Platform::default();
  let response = Response::new(&handlers, request.clone(), Box::new(platform.clone()));
  serve_queued_response(&store, &request, response).unwrap();

  assert!(stream.emit(Some(b"abc"), false));
  assert!(stream.emit(Some(b"def"), true));

  let output = platform.output();
  assert_eq!(output.body, b"abcdef");
  assert!(output.finished);
  drop(output);
  assert!(store.get(id).is_none());
}

#[test]
fn bridge_route_replies_through_send() {
  let bridge = test_bridge();
  bridge.router().map("route.me", true, |message, _, reply| {
    reply(IpcResult::data(&message, json::Value::from("routed")));
  });

  assert!(bridge.route("ipc://route.me?seq=8", None));

  for _ in 0..100 {
    if !bridge.sent.lock().unwrap().is_empty() {
      break;
    }
    std::thread::sleep(Duration::from_millis(10));
  }

  let sent = bridge.sent.lock().unwrap();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].seq, "8");
  assert!(sent[0].payload.contains("\"routed\""));
  assert!(sent[0].queued_response.is_none());
}

#[test]
fn request_bodies_reach_the_handler() {
  let bridge = test_bridge();
  let (sender, receiver) = unbounded();
  bridge.router().map("upload", true, move |message: Message, _, reply| {
    sender.send(message.buffer.to_vec()).unwrap();
    reply(IpcResult::data(&message, json::Value::Null));
  });

  let body = socket_bridge::bytes::BufferQueue::from_slice(b"payload bytes");
  bridge
    .router()
    .invoke_with_body("ipc://upload?seq=9", Some(body), Arc::new(|_| {}));

  let received = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
  assert_eq!(received, b"payload bytes");
}

#[test]
fn preload_insertion_matches_the_documented_shape() {
  let mut headers = Headers::new();
  headers.set("X-A", "1");
  let options = InsertOptions {
    preload: preload::Options {
      headless: true,
      argv: vec!["--foo".into()],
      headers,
      features: Features::default(),
      ..preload::Options::default()
    },
    ..InsertOptions::default()
  };

  let output = preload::insert_into_html(
    "<!doctype html><html><head></head><body></body></html>",
    &options,
  );

  assert!(output.contains("<meta http-equiv=\"X-A\" content=\"1\">"));
  assert!(output.contains("\"argv\":[\"--foo\"]"));
  assert!(output.contains("\"headless\":true"));
  assert!(output.contains("<script type=\"module\">"));

  // __args materializes the documented argv entry
  let args_start = output.find("globalThis.__args = ").unwrap();
  let json_start = args_start + "globalThis.__args = ".len();
  let json_end = output[json_start..].find(";\n").unwrap() + json_start;
  let parsed: serde_json::Value = serde_json::from_str(&output[json_start..json_end]).unwrap();
  assert_eq!(parsed["argv"][0], "--foo");
}
