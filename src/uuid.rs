// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! UUIDv7 generation.
//!
//! The high-order bits carry a 60-bit millisecond timestamp, so values
//! generated at least one millisecond apart sort lexicographically in
//! generation order.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::crypto::rand64;

/// A 36-character UUIDv7 in canonical
/// `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form.
pub fn v7() -> String {
  let delta = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64;
  let timestamp = delta & ((1u64 << 60) - 1);

  let mut value = 0u64;
  for _ in 0..8 {
    value = (value << 8) | (rand64() % 256);
  }
  let value = value & ((1u64 << 62) - 1);

  // version nibble in the low bits of the first half, variant bits `10`
  // at the top of the second
  let part1 = (timestamp << 4) | 0x7;
  let part2 = (value & !0xc000_0000_0000_0000) | 0x8000_0000_0000_0000;

  format!(
    "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:012x}",
    (part1 >> 32) as u32,
    (part1 >> 16) as u16,
    part1 as u16,
    (part2 >> 56) as u8,
    (part2 >> 48) as u8,
    part2 & 0x0000_ffff_ffff_ffff
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn canonical_shape() {
    let uuid = v7();
    assert_eq!(uuid.len(), 36);
    let groups: Vec<&str> = uuid.split('-').collect();
    assert_eq!(
      groups.iter().map(|group| group.len()).collect::<Vec<_>>(),
      vec![8, 4, 4, 4, 12]
    );
    assert!(uuid
      .chars()
      .all(|character| character == '-' || character.is_ascii_hexdigit()));
  }

  #[test]
  fn version_and_variant_bits() {
    let uuid = v7();
    // version nibble sits at the end of the third group
    assert!(uuid[14..18].ends_with('7'));
    // variant bits `10` put the first nybble of the fourth group in 8..=b
    let variant = u8::from_str_radix(&uuid[19..20], 16).unwrap();
    assert!((0x8..=0xb).contains(&variant));
  }

  #[test]
  fn sorts_by_generation_time() {
    let first = v7();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = v7();
    assert!(first < second);
  }
}
