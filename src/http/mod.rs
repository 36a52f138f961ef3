// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP support types for the bridge's scheme traffic.
//!
//! Headers and the status table are the crate's own ordered types because
//! the wire format requires insertion order, proper-case emission, and a
//! fixed reason-phrase table.

mod headers;
mod request;
mod response;
mod status;

pub use self::{
  headers::{to_header_case, Header, Headers},
  request::Request,
  response::Response,
  status::{status_code, status_text, Status},
};

// re-expose the default http method type
pub use ::http::Method;
