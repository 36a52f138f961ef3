// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Base64 encoding with the standard alphabet and `=` padding.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{Error, Result};

pub fn encode(input: &[u8]) -> String {
  STANDARD.encode(input)
}

pub fn decode(input: &str) -> Result<Vec<u8>> {
  STANDARD
    .decode(input)
    .map_err(|error| Error::Parse(format!("invalid base64: {error}")))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_arbitrary_bytes() {
    let inputs: [&[u8]; 4] = [b"", b"a", b"ab", b"\x00\x01\xfe\xff"];
    for input in inputs {
      assert_eq!(decode(&encode(input)).unwrap(), input);
    }
  }

  #[test]
  fn uses_standard_alphabet_and_padding() {
    assert_eq!(encode(b"hello"), "aGVsbG8=");
    assert_eq!(encode(b"\xfb\xff"), "+/8=");
  }

  #[test]
  fn rejects_invalid_input() {
    assert!(decode("not base64!").is_err());
  }
}
