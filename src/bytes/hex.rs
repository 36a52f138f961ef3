// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Hex encoding. Output is uppercase; decoding accepts either case.

use crate::{Error, Result};

pub fn encode(input: &[u8]) -> String {
  let mut output = String::with_capacity(input.len() * 2);
  for byte in input {
    output.push_str(&format!("{byte:02X}"));
  }
  output
}

pub fn decode(input: &str) -> Result<Vec<u8>> {
  if input.len() % 2 != 0 {
    return Err(Error::Parse("hex input has odd length".into()));
  }

  let mut output = Vec::with_capacity(input.len() / 2);
  let bytes = input.as_bytes();
  for pair in bytes.chunks(2) {
    let high = nybble(pair[0])?;
    let low = nybble(pair[1])?;
    output.push((high << 4) | low);
  }
  Ok(output)
}

fn nybble(digit: u8) -> Result<u8> {
  match digit {
    b'0'..=b'9' => Ok(digit - b'0'),
    b'a'..=b'f' => Ok(digit - b'a' + 10),
    b'A'..=b'F' => Ok(digit - b'A' + 10),
    _ => Err(Error::Parse(format!("invalid hex digit: {}", digit as char))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encodes_uppercase() {
    assert_eq!(encode(b"\x00\x0f\xab"), "000FAB");
  }

  #[test]
  fn round_trips() {
    let input = b"\x01\x23\x45\x67\x89\xab\xcd\xef";
    assert_eq!(decode(&encode(input)).unwrap(), input);
  }

  #[test]
  fn decodes_either_case() {
    assert_eq!(decode("ff").unwrap(), vec![0xff]);
    assert_eq!(decode("FF").unwrap(), vec![0xff]);
  }

  #[test]
  fn rejects_bad_input() {
    assert!(decode("f").is_err());
    assert!(decode("zz").is_err());
  }
}
