// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Random identifiers and the SHA-1 digest used by the bridge.

use rand::Rng;
use sha1::{Digest, Sha1 as Sha1Hasher};

use crate::{Error, Result};

/// A random 64-bit value from a non-deterministically seeded generator.
/// Used for request ids, listener tokens, and queued-response ids.
pub fn rand64() -> u64 {
  rand::thread_rng().gen()
}

/// A uniformly distributed integer in `lo..=hi`.
pub fn randint(lo: i32, hi: i32) -> i32 {
  if lo == 0 && hi == 0 {
    return 0;
  }
  rand::thread_rng().gen_range(lo..=hi)
}

/// An incremental SHA-1 context.
///
/// `update` may be called any number of times before a single `finalize`;
/// after `finalize` the context is wiped and further use fails with
/// [`Error::Sha1Finalized`].
#[derive(Default)]
pub struct Sha1 {
  hasher: Option<Sha1Hasher>,
}

impl Sha1 {
  pub fn new() -> Self {
    Self {
      hasher: Some(Sha1Hasher::new()),
    }
  }

  pub fn update(&mut self, input: &[u8]) -> Result<()> {
    match self.hasher.as_mut() {
      Some(hasher) => {
        hasher.update(input);
        Ok(())
      }
      None => Err(Error::Sha1Finalized),
    }
  }

  pub fn finalize(&mut self) -> Result<[u8; 20]> {
    match self.hasher.take() {
      Some(hasher) => Ok(hasher.finalize().into()),
      None => Err(Error::Sha1Finalized),
    }
  }
}

/// One-shot SHA-1 of `input`.
pub fn sha1(input: &[u8]) -> [u8; 20] {
  Sha1Hasher::digest(input).into()
}

/// One-shot SHA-1 rendered as uppercase hex.
pub fn sha1_hex(input: &[u8]) -> String {
  crate::bytes::hex::encode(&sha1(input))
}
