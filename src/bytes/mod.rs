// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Reference-counted byte buffers.
//!
//! [`ArrayBuffer`] owns an allocation, [`Buffer`] is an `(offset, length)`
//! view over one, and [`BufferQueue`] is a growable appender. Views share
//! the allocation; the bytes are freed when the last view drops.

pub mod base64;
pub mod hex;

use std::{
  cmp::Ordering,
  fmt,
  ops::{Add, Sub},
  sync::{Arc, RwLock},
};

use crate::{Error, Result};

/// Encodings understood by [`Buffer::str`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
  #[default]
  Utf8,
  Hex,
  Base64,
}

/// A reference-counted heap allocation of bytes.
///
/// Cloning an `ArrayBuffer` shares the allocation. [`ArrayBuffer::resize`]
/// reallocates for *this* handle only — other handles keep the old bytes.
#[derive(Clone, Default)]
pub struct ArrayBuffer {
  bytes: Arc<RwLock<Vec<u8>>>,
}

impl ArrayBuffer {
  /// Create a zero-filled allocation of `size` bytes.
  pub fn new(size: usize) -> Self {
    Self {
      bytes: Arc::new(RwLock::new(vec![0; size])),
    }
  }

  pub fn from_vec(bytes: Vec<u8>) -> Self {
    Self {
      bytes: Arc::new(RwLock::new(bytes)),
    }
  }

  pub fn from_slice(bytes: &[u8]) -> Self {
    Self::from_vec(bytes.to_vec())
  }

  pub fn len(&self) -> usize {
    self.read(|bytes| bytes.len())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Whether two handles share the same allocation.
  pub fn shares_allocation_with(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.bytes, &other.bytes)
  }

  /// A full-length [`Buffer`] view over this allocation (no copy).
  pub fn slice(&self, start: usize, end: usize) -> Result<Buffer> {
    Buffer::with_view(self.clone(), start, end.saturating_sub(start))
  }

  /// Reallocate to `size` bytes, copying the old contents (truncated or
  /// zero-extended). Other handles keep the previous allocation.
  pub fn resize(&mut self, size: usize) {
    let mut bytes = self.to_vec();
    bytes.resize(size, 0);
    self.bytes = Arc::new(RwLock::new(bytes));
  }

  pub fn to_vec(&self) -> Vec<u8> {
    self.read(|bytes| bytes.to_vec())
  }

  pub(crate) fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
    f(&self.bytes.read().expect("poisoned array buffer"))
  }

  pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
    f(&mut self.bytes.write().expect("poisoned array buffer"))
  }
}

impl fmt::Debug for ArrayBuffer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ArrayBuffer")
      .field("len", &self.len())
      .finish()
  }
}

/// An `(offset, length)` view over an [`ArrayBuffer`].
#[derive(Clone, Default)]
pub struct Buffer {
  buffer: ArrayBuffer,
  offset: usize,
  length: usize,
}

impl Buffer {
  pub fn empty() -> Self {
    Self::default()
  }

  /// A view over the whole of `buffer`.
  pub fn from_array_buffer(buffer: ArrayBuffer) -> Self {
    let length = buffer.len();
    Self {
      buffer,
      offset: 0,
      length,
    }
  }

  pub fn from_vec(bytes: Vec<u8>) -> Self {
    Self::from_array_buffer(ArrayBuffer::from_vec(bytes))
  }

  pub fn from_slice(bytes: &[u8]) -> Self {
    Self::from_vec(bytes.to_vec())
  }

  pub fn from_string(source: &str) -> Self {
    Self::from_vec(source.as_bytes().to_vec())
  }

  /// A view over `buffer` with an explicit window.
  pub fn with_view(buffer: ArrayBuffer, offset: usize, length: usize) -> Result<Self> {
    let size = buffer.len();
    if offset.saturating_add(length) > size {
      return Err(Error::OutOfRange(offset.saturating_add(length), size));
    }
    Ok(Self {
      buffer,
      offset,
      length,
    })
  }

  /// Concatenate views into a single freshly-allocated buffer. An empty
  /// input yields an empty buffer.
  pub fn concat(buffers: &[Buffer]) -> Self {
    let mut bytes = Vec::with_capacity(buffers.iter().map(Buffer::len).sum());
    for buffer in buffers {
      bytes.extend_from_slice(&buffer.to_vec());
    }
    Self::from_vec(bytes)
  }

  /// Lexicographic comparison over the viewed bytes.
  pub fn compare(left: &Buffer, right: &Buffer) -> Ordering {
    left.to_vec().cmp(&right.to_vec())
  }

  pub fn equals(left: &Buffer, right: &Buffer) -> bool {
    Self::compare(left, right) == Ordering::Equal
  }

  pub fn len(&self) -> usize {
    self.length
  }

  pub fn is_empty(&self) -> bool {
    self.length == 0
  }

  pub fn array_buffer(&self) -> &ArrayBuffer {
    &self.buffer
  }

  pub fn offset(&self) -> usize {
    self.offset
  }

  pub fn at(&self, index: usize) -> Result<u8> {
    if index >= self.length {
      return Err(Error::OutOfRange(index, self.length));
    }
    Ok(self.buffer.read(|bytes| bytes[self.offset + index]))
  }

  /// Write `bytes` through the view starting at `offset`. Never grows the
  /// underlying allocation.
  pub fn set(&mut self, bytes: &[u8], offset: usize) -> Result<()> {
    let end = offset.saturating_add(bytes.len());
    if end > self.length {
      return Err(Error::OutOfRange(end, self.length));
    }
    let start = self.offset + offset;
    self.buffer.write(|data| {
      data[start..start + bytes.len()].copy_from_slice(bytes);
    });
    Ok(())
  }

  /// Fill `start..end` of the view with `byte`. `end == usize::MAX` means
  /// the end of the view.
  pub fn fill(&mut self, byte: u8, start: usize, end: usize) -> Result<()> {
    let end = if end == usize::MAX { self.length } else { end };
    if start > end || end > self.length {
      return Err(Error::OutOfRange(end, self.length));
    }
    let offset = self.offset;
    self.buffer.write(|data| {
      for slot in &mut data[offset + start..offset + end] {
        *slot = byte;
      }
    });
    Ok(())
  }

  pub fn find(&self, byte: u8, start: usize) -> Option<usize> {
    let offset = self.offset;
    let length = self.length;
    self.buffer.read(|bytes| {
      bytes[offset..offset + length]
        .iter()
        .skip(start)
        .position(|candidate| *candidate == byte)
        .map(|position| position + start)
    })
  }

  pub fn contains(&self, byte: u8) -> bool {
    self.find(byte, 0).is_some()
  }

  /// A sub-view sharing the allocation. `end == usize::MAX` means the end
  /// of the view.
  pub fn slice(&self, start: usize, end: usize) -> Result<Buffer> {
    let end = if end == usize::MAX { self.length } else { end };
    if start > end || end > self.length {
      return Err(Error::OutOfRange(end, self.length));
    }
    Ok(Self {
      buffer: self.buffer.clone(),
      offset: self.offset + start,
      length: end - start,
    })
  }

  pub fn to_vec(&self) -> Vec<u8> {
    self
      .buffer
      .read(|bytes| bytes[self.offset..self.offset + self.length].to_vec())
  }

  /// Render the viewed bytes in the requested encoding. UTF-8 is lossy;
  /// hex is uppercase; base64 uses the standard alphabet with padding.
  pub fn str(&self, encoding: Encoding) -> String {
    let bytes = self.to_vec();
    match encoding {
      Encoding::Utf8 => String::from_utf8_lossy(&bytes).into_owned(),
      Encoding::Hex => hex::encode(&bytes),
      Encoding::Base64 => base64::encode(&bytes),
    }
  }
}

impl Add<usize> for Buffer {
  type Output = Buffer;

  /// Shift the view forward, shrinking it.
  fn add(self, shift: usize) -> Buffer {
    let shift = shift.min(self.length);
    Buffer {
      buffer: self.buffer,
      offset: self.offset + shift,
      length: self.length - shift,
    }
  }
}

impl Sub<usize> for Buffer {
  type Output = Buffer;

  /// Shift the view backward, growing it toward the allocation start.
  fn sub(self, shift: usize) -> Buffer {
    let shift = shift.min(self.offset);
    Buffer {
      buffer: self.buffer,
      offset: self.offset - shift,
      length: self.length + shift,
    }
  }
}

impl PartialEq for Buffer {
  fn eq(&self, other: &Self) -> bool {
    Self::equals(self, other)
  }
}

impl fmt::Debug for Buffer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Buffer")
      .field("offset", &self.offset)
      .field("length", &self.length)
      .finish()
  }
}

/// A growable [`Buffer`] specialization that appends on [`push`](Self::push).
///
/// A non-resizable queue keeps a fixed capacity; pushing past it fails with
/// [`Error::BufferOverflow`] and does not mutate the queue.
#[derive(Clone, Debug)]
pub struct BufferQueue {
  buffer: ArrayBuffer,
  length: usize,
  resizable: bool,
}

impl Default for BufferQueue {
  fn default() -> Self {
    Self {
      buffer: ArrayBuffer::default(),
      length: 0,
      resizable: true,
    }
  }
}

impl BufferQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// A fixed-capacity queue that refuses to grow.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      buffer: ArrayBuffer::new(capacity),
      length: 0,
      resizable: false,
    }
  }

  pub fn from_slice(bytes: &[u8]) -> Self {
    Self {
      buffer: ArrayBuffer::from_slice(bytes),
      length: bytes.len(),
      resizable: true,
    }
  }

  pub fn len(&self) -> usize {
    self.length
  }

  pub fn is_empty(&self) -> bool {
    self.length == 0
  }

  pub fn capacity(&self) -> usize {
    self.buffer.len()
  }

  pub fn is_resizable(&self) -> bool {
    self.resizable
  }

  /// Append bytes, growing the allocation when resizable.
  pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
    let required = self.length + bytes.len();
    if required > self.capacity() {
      if !self.resizable {
        return Err(Error::BufferOverflow);
      }
      self.buffer.resize(required);
    }
    let offset = self.length;
    self.buffer.write(|data| {
      data[offset..offset + bytes.len()].copy_from_slice(bytes);
    });
    self.length = required;
    Ok(())
  }

  /// Clear the queue without releasing capacity.
  pub fn reset(&mut self) {
    self.length = 0;
  }

  /// The used portion of the queue as a shared view.
  pub fn as_buffer(&self) -> Buffer {
    Buffer {
      buffer: self.buffer.clone(),
      offset: 0,
      length: self.length,
    }
  }

  pub fn to_vec(&self) -> Vec<u8> {
    self.as_buffer().to_vec()
  }

  pub fn str(&self, encoding: Encoding) -> String {
    self.as_buffer().str(encoding)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slices_share_the_allocation() {
    let buffer = Buffer::from_slice(b"hello world");
    let slice = buffer.slice(6, usize::MAX).unwrap();
    assert_eq!(slice.len(), 5);
    assert_eq!(slice.to_vec(), b"world");
    assert!(slice.array_buffer().shares_allocation_with(buffer.array_buffer()));
  }

  #[test]
  fn slice_bounds_are_checked() {
    let buffer = Buffer::from_slice(b"abc");
    assert!(matches!(buffer.slice(0, 4), Err(Error::OutOfRange(4, 3))));
    assert!(matches!(buffer.at(3), Err(Error::OutOfRange(3, 3))));
  }

  #[test]
  fn writes_through_a_view_are_visible_to_other_views() {
    let buffer = Buffer::from_slice(b"aaaa");
    let mut view = buffer.slice(1, 3).unwrap();
    view.set(b"zz", 0).unwrap();
    assert_eq!(buffer.to_vec(), b"azza");
  }

  #[test]
  fn resize_detaches_the_handle() {
    let original = Buffer::from_slice(b"abcd");
    let mut detached = original.array_buffer().clone();
    detached.resize(2);
    assert_eq!(detached.to_vec(), b"ab");
    assert_eq!(original.to_vec(), b"abcd");
  }

  #[test]
  fn concat_of_empty_input_is_empty() {
    assert!(Buffer::concat(&[]).is_empty());
  }

  #[test]
  fn compare_is_lexicographic() {
    let left = Buffer::from_slice(b"abc");
    let right = Buffer::from_slice(b"abd");
    assert_eq!(Buffer::compare(&left, &right), Ordering::Less);
    assert!(Buffer::equals(&left, &left.clone()));
  }

  #[test]
  fn shifting_moves_the_view() {
    let buffer = Buffer::from_slice(b"abcdef");
    let shifted = buffer.clone() + 2;
    assert_eq!(shifted.to_vec(), b"cdef");
    let restored = shifted - 2;
    assert_eq!(restored.to_vec(), b"abcdef");
  }

  #[test]
  fn queue_grows_when_resizable() {
    let mut queue = BufferQueue::new();
    queue.push(b"abc").unwrap();
    queue.push(b"def").unwrap();
    assert_eq!(queue.to_vec(), b"abcdef");
  }

  #[test]
  fn fixed_queue_rejects_overflow_without_mutation() {
    let mut queue = BufferQueue::with_capacity(4);
    queue.push(b"abc").unwrap();
    assert!(matches!(queue.push(b"de"), Err(Error::BufferOverflow)));
    assert_eq!(queue.to_vec(), b"abc");
  }

  #[test]
  fn reset_keeps_capacity() {
    let mut queue = BufferQueue::with_capacity(8);
    queue.push(b"abcd").unwrap();
    queue.reset();
    assert!(queue.is_empty());
    assert_eq!(queue.capacity(), 8);
    queue.push(b"12345678").unwrap();
    assert_eq!(queue.to_vec(), b"12345678");
  }

  #[test]
  fn encodings_render() {
    let buffer = Buffer::from_slice(b"\x01\x02\xff");
    assert_eq!(buffer.str(Encoding::Hex), "0102FF");
    assert_eq!(buffer.str(Encoding::Base64), "AQL/");
    assert_eq!(Buffer::from_slice(b"hi").str(Encoding::Utf8), "hi");
  }
}
