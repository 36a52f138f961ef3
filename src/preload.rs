// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The preload compiler.
//!
//! Every document the WebView loads carries a compiled JavaScript shim
//! that exposes the `window`-level entry points into the bridge: the
//! `__ipc` primordials, the frozen `__args` snapshot, and optional
//! CommonJS/Node globals. [`insert_into_html`] splices the compiled shim
//! (plus `<meta>` tags for headers and metadata) immediately after the
//! document `<head>`, creating one when the markup has none.

use std::fmt::Write as _;

use crate::{
  http::{to_header_case, Headers},
  ipc::Client,
  json,
};

/// Compiler feature toggles.
#[derive(Clone, Copy, Debug)]
pub struct Features {
  /// Define `module`, `exports`, `require`, `__filename`, and
  /// `__dirname` as module-scoped bindings.
  pub use_global_common_js: bool,
  /// Expose `process` and `global` on `globalThis`.
  pub use_global_node_js: bool,
  /// Import the configured test script after initialization.
  pub use_test_script: bool,
  /// Wrap the output in `<script>` markup and emit headers/metadata as
  /// `<meta>` tags; without it the output is raw JavaScript.
  pub use_html_markup: bool,
  /// Use static `import` for the init module and scripts instead of
  /// dynamic `import()`.
  pub use_esm: bool,
  /// Expose the frozen `globalThis.__args` snapshot.
  pub use_global_args: bool,
}

impl Default for Features {
  fn default() -> Self {
    Self {
      use_global_common_js: true,
      use_global_node_js: true,
      use_test_script: false,
      use_html_markup: true,
      use_esm: true,
      use_global_args: true,
    }
  }
}

/// Input state for the compiler.
#[derive(Clone, Debug, Default)]
pub struct Options {
  pub headless: bool,
  pub debug: bool,
  pub features: Features,
  pub client: Client,
  pub index: i32,
  pub argv: Vec<String>,
  /// Emitted as `<meta http-equiv>` tags when markup is enabled.
  pub headers: Headers,
  /// Raw JavaScript appended after initialization.
  pub user_script: String,
  /// Path of the test script imported under `use_test_script`.
  pub test_script: String,
  /// Emitted as `<meta name>` tags when markup is enabled.
  pub metadata: Vec<(String, String)>,
  pub env: Vec<(String, String)>,
  pub user_config: Vec<(String, String)>,
  pub conduit: json::Object,
  /// Raw JavaScript spliced ahead of the primordials. Only use if you
  /// know what you are doing.
  pub runtime_primordial_overrides: String,
}

/// Options for [`insert_into_html`].
#[derive(Clone, Debug, Default)]
pub struct InsertOptions {
  pub preload: Options,
  /// Custom schemes registered with the document through
  /// `<meta http-equiv="Protocol-Handler-Scheme">` tags.
  pub protocol_handler_schemes: Vec<String>,
}

/// A compiled (or compilable) preload.
pub struct Preload {
  pub options: Options,
  pub headers: Headers,
  pub metadata: Vec<(String, String)>,
  buffer: Vec<String>,
  compiled: String,
}

impl Preload {
  /// Configure a preload from `options`. The shim sections land in the
  /// internal buffer; call [`compile`](Self::compile) to produce output.
  pub fn new(options: Options) -> Self {
    let mut preload = Self {
      headers: options.headers.clone(),
      metadata: options.metadata.clone(),
      options,
      buffer: Vec::new(),
      compiled: String::new(),
    };
    preload.configure();
    preload
  }

  /// Append raw source ahead of compilation.
  pub fn append(&mut self, source: impl Into<String>) -> &mut Self {
    self.buffer.push(source.into());
    self
  }

  /// Compile the buffer, wrapping it in markup when the feature is set.
  pub fn compile(&mut self) -> &str {
    let script = self.buffer.join("\n");
    if self.options.features.use_html_markup {
      let mut output = String::new();
      for header in self.headers.iter() {
        let _ = writeln!(
          output,
          "<meta http-equiv=\"{}\" content=\"{}\">",
          escape_attribute(&to_header_case(&header.name)),
          escape_attribute(&header.value)
        );
      }
      for (name, content) in &self.metadata {
        let _ = writeln!(
          output,
          "<meta name=\"{}\" content=\"{}\">",
          escape_attribute(name),
          escape_attribute(content)
        );
      }
      let attribute = if self.options.features.use_esm {
        " type=\"module\""
      } else {
        ""
      };
      let _ = write!(output, "<script{attribute}>\n{script}\n</script>");
      self.compiled = output;
    } else {
      self.compiled = script;
    }
    &self.compiled
  }

  /// The last compiled output.
  pub fn str(&self) -> &str {
    &self.compiled
  }

  fn configure(&mut self) {
    self.buffer.clear();
    let features = self.options.features;

    if !self.options.runtime_primordial_overrides.is_empty() {
      self
        .buffer
        .push(self.options.runtime_primordial_overrides.clone());
    }

    if features.use_global_args {
      self.buffer.push(self.compile_global_args());
    }

    self.buffer.push(IPC_PRIMORDIALS.trim_end().into());

    if features.use_global_common_js {
      self.buffer.push(COMMON_JS_BINDINGS.trim_end().into());
    }

    if features.use_global_node_js {
      self.buffer.push(NODE_JS_GLOBALS.trim_end().into());
    }

    if features.use_esm {
      self.buffer.push(format!("import '{INIT_MODULE}';"));
      if features.use_test_script && !self.options.test_script.is_empty() {
        self
          .buffer
          .push(format!("import '{}';", self.options.test_script));
      }
    } else {
      self.buffer.push(format!("import('{INIT_MODULE}');"));
      if features.use_test_script && !self.options.test_script.is_empty() {
        self
          .buffer
          .push(format!("import('{}');", self.options.test_script));
      }
    }

    if !self.options.user_script.is_empty() {
      self.buffer.push(self.options.user_script.clone());
    }
  }

  fn compile_global_args(&self) -> String {
    let mut client = json::Object::new();
    client.set("id", self.options.client.id.to_string());
    client.set("index", self.options.client.index as i64);

    let mut args = json::Object::new();
    args.set(
      "argv",
      json::Value::Array(
        self
          .options
          .argv
          .iter()
          .map(|argument| json::Value::from(argument.clone()))
          .collect(),
      ),
    );
    args.set("client", client);
    args.set(
      "config",
      json::Value::Object(
        self
          .options
          .user_config
          .iter()
          .map(|(key, value)| (key.clone(), json::Value::from(value.clone())))
          .collect(),
      ),
    );
    args.set("conduit", self.options.conduit.clone());
    args.set("debug", self.options.debug);
    args.set(
      "env",
      json::Value::Object(
        self
          .options
          .env
          .iter()
          .map(|(key, value)| (key.clone(), json::Value::from(value.clone())))
          .collect(),
      ),
    );
    args.set("headless", self.options.headless);
    args.set("index", self.options.index as i64);

    format!(
      "globalThis.__args = {};\nObject.freeze(globalThis.__args);",
      json::Value::Object(args).str()
    )
  }
}

/// Compile a preload from `options` in one shot.
pub fn compile(options: &Options) -> String {
  let mut preload = Preload::new(options.clone());
  preload.compile();
  preload.compiled
}

const INIT_MODULE: &str = "socket:internal/init";

const IPC_PRIMORDIALS: &str = r#"
if (!globalThis.__ipc) {
  const ipc = globalThis.__ipc = { nextSeq: 1 };

  ipc.postMessage = (uri) => (
    globalThis.webkit?.messageHandlers?.external?.postMessage?.(uri) ??
    globalThis.chrome?.webview?.postMessage?.(uri) ??
    globalThis.external?.invoke?.(uri)
  );

  ipc.resolve = async (seq, status, value) => {
    try { value = decodeURIComponent(value) } catch {}
    try { value = JSON.parse(value) } catch {}
    const request = ipc[seq];
    if (!request) {
      console.error('inbound IPC message with unknown sequence:', seq, value);
      return;
    }
    if (status === 0) {
      await request.resolve(value);
    } else {
      await request.reject(value);
    }
    delete ipc[seq];
  };

  ipc.send = (name, value) => {
    const seq = ipc.nextSeq++;
    const promise = new Promise((resolve, reject) => {
      ipc[seq] = { resolve, reject };
    });
    if (value !== undefined && typeof value !== 'string') {
      value = JSON.stringify(value);
    }
    const params = new URLSearchParams({
      index: globalThis.__args?.index ?? 0,
      seq,
      ...(value !== undefined ? { value } : {})
    });
    ipc.postMessage(`ipc://${name}?${params.toString().replace(/\+/g, '%20')}`);
    return promise;
  };

  ipc.emit = (name, detail) => {
    globalThis.dispatchEvent(new CustomEvent(name, { detail }));
  };
}
"#;

const COMMON_JS_BINDINGS: &str = r#"
const module = { exports: {} };
const exports = module.exports;
const require = (specifier) => globalThis.__ipc.send('module.require', { specifier });
const __filename = globalThis.location?.pathname ?? '/';
const __dirname = __filename.slice(0, __filename.lastIndexOf('/') + 1);
"#;

const NODE_JS_GLOBALS: &str = r#"
globalThis.global = globalThis;
globalThis.process = globalThis.process ?? {
  argv: globalThis.__args?.argv ?? [],
  env: globalThis.__args?.env ?? {},
  index: globalThis.__args?.index ?? 0
};
"#;

/// Splice the compiled preload into `html`, immediately after the opening
/// `<head>` tag (one is created when the markup has none). Protocol
/// handler schemes become `<meta http-equiv>` elements ahead of the
/// compiled headers, metadata, and `<script>` block.
///
/// The rest of the document is left byte-for-byte intact; a DOM
/// round-trip would re-serialize the user's markup. Pure: no state
/// outlives the call.
pub fn insert_into_html(html: &str, options: &InsertOptions) -> String {
  let mut preload_options = options.preload.clone();
  preload_options.features.use_html_markup = true;
  let compiled = compile(&preload_options);

  let mut injection = String::new();
  for scheme in &options.protocol_handler_schemes {
    let _ = writeln!(
      injection,
      "<meta http-equiv=\"Protocol-Handler-Scheme\" content=\"{}\">",
      escape_attribute(scheme)
    );
  }
  injection.push_str(&compiled);

  if let Some(insert_at) = find_tag_end(html, "head") {
    let mut output = String::with_capacity(html.len() + injection.len());
    output.push_str(&html[..insert_at]);
    output.push_str(&injection);
    output.push_str(&html[insert_at..]);
    return output;
  }

  // no <head>: create one, inside <html> when present
  if let Some(insert_at) = find_tag_end(html, "html") {
    let mut output = String::with_capacity(html.len() + injection.len() + 13);
    output.push_str(&html[..insert_at]);
    output.push_str("<head>");
    output.push_str(&injection);
    output.push_str("</head>");
    output.push_str(&html[insert_at..]);
    return output;
  }

  format!("<head>{injection}</head>{html}")
}

/// The byte offset just past `>` of the first opening `<tag>`,
/// case-insensitive. `<head` must be followed by `>` or whitespace so
/// that `<header>` does not match.
fn find_tag_end(html: &str, tag: &str) -> Option<usize> {
  // ASCII-only lowering keeps byte offsets aligned with the input
  let lower = html.to_ascii_lowercase();
  let needle = format!("<{tag}");
  let mut search_from = 0;
  while let Some(position) = lower[search_from..].find(&needle) {
    let start = search_from + position;
    let after = start + needle.len();
    match lower.as_bytes().get(after) {
      Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') => {
        let end = html[start..].find('>')?;
        return Some(start + end + 1);
      }
      _ => search_from = after,
    }
  }
  None
}

fn escape_attribute(input: &str) -> String {
  input
    .replace('&', "&amp;")
    .replace('"', "&quot;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
}
