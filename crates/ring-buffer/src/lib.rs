//! A fixed-capacity ring buffer over a preallocated byte array.
//!
//! Used by the ANS-104 streaming parser as bounded lookahead: header fields
//! are read into the ring as bytes arrive and shifted out once a field's
//! length is known, without ever buffering the whole data item.

use thiserror::Error;

/// Errors raised by [`CircularByteBuffer`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingBufferError {
    /// A write would exceed the buffer's remaining capacity.
    #[error("ring buffer overflow: {requested} bytes requested, {available} available")]
    Overflow {
        /// Bytes the caller asked to write.
        requested: usize,
        /// Bytes actually free in the buffer.
        available: usize,
    },
    /// A read would consume more bytes than are currently buffered.
    #[error("ring buffer underflow: {requested} bytes requested, {available} used")]
    Underflow {
        /// Bytes the caller asked to read.
        requested: usize,
        /// Bytes actually buffered.
        available: usize,
    },
    /// `n` must be a positive integer for this operation.
    #[error("ring buffer length must be positive, got 0")]
    ZeroLength,
    /// `maxCapacity` must be at least 1.
    #[error("ring buffer capacity must be at least 1")]
    ZeroCapacity,
    /// A caller-supplied backing array was smaller than the requested capacity.
    #[error("backing array capacity {backing} is smaller than requested capacity {capacity}")]
    BackingTooSmall {
        /// Length of the caller-supplied array.
        backing: usize,
        /// Requested ring capacity.
        capacity: usize,
    },
}

/// A fixed-capacity ring over a preallocated byte array.
///
/// All operations are O(bytes moved); writes and reads that cross the end of
/// the backing array are split into at most two sub-copies.
#[derive(Debug, Clone)]
pub struct CircularByteBuffer {
    buf: Box<[u8]>,
    capacity: usize,
    /// Index of the oldest buffered byte.
    head: usize,
    /// Number of buffered bytes (the "used capacity").
    len: usize,
}

impl CircularByteBuffer {
    /// Allocates a new ring buffer with the given capacity.
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        if capacity == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        Ok(Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            capacity,
            head: 0,
            len: 0,
        })
    }

    /// Builds a ring buffer around a caller-supplied backing array, taking
    /// ownership of it for the lifetime of the ring. `backing.len()` must be
    /// at least `capacity`.
    pub fn with_backing(backing: Vec<u8>, capacity: usize) -> Result<Self, RingBufferError> {
        if capacity == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        if backing.len() < capacity {
            return Err(RingBufferError::BackingTooSmall {
                backing: backing.len(),
                capacity,
            });
        }
        Ok(Self {
            buf: backing.into_boxed_slice(),
            capacity,
            head: 0,
            len: 0,
        })
    }

    /// Number of bytes currently buffered.
    pub fn used_capacity(&self) -> usize {
        self.len
    }

    /// Number of bytes that can still be written before [`RingBufferError::Overflow`].
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.len
    }

    /// Total capacity of the ring.
    pub fn max_capacity(&self) -> usize {
        self.capacity
    }

    fn tail(&self) -> usize {
        (self.head + self.len) % self.capacity
    }

    /// Writes `n` bytes from `src[src_offset..src_offset + n]` into the tail
    /// of the ring, wrapping around the backing array if necessary.
    pub fn write_from(
        &mut self,
        src: &[u8],
        src_offset: usize,
        n: usize,
    ) -> Result<(), RingBufferError> {
        if n == 0 {
            return Err(RingBufferError::ZeroLength);
        }
        if n > self.remaining_capacity() {
            return Err(RingBufferError::Overflow {
                requested: n,
                available: self.remaining_capacity(),
            });
        }
        let src = &src[src_offset..src_offset + n];
        let tail = self.tail();
        let first_run = (self.capacity - tail).min(n);
        self.buf[tail..tail + first_run].copy_from_slice(&src[..first_run]);
        let remaining = n - first_run;
        if remaining > 0 {
            self.buf[..remaining].copy_from_slice(&src[first_run..]);
        }
        self.len += n;
        Ok(())
    }

    /// Convenience wrapper over [`Self::write_from`] writing the whole slice.
    pub fn write_all(&mut self, src: &[u8]) -> Result<(), RingBufferError> {
        self.write_from(src, 0, src.len())
    }

    /// Reads `n` bytes from the head of the ring into `dst[dst_offset..]`,
    /// advancing the read pointer and shrinking the used capacity.
    pub fn read_into(
        &mut self,
        dst: &mut [u8],
        dst_offset: usize,
        n: usize,
    ) -> Result<(), RingBufferError> {
        if n == 0 {
            return Err(RingBufferError::ZeroLength);
        }
        if n > self.len {
            return Err(RingBufferError::Underflow {
                requested: n,
                available: self.len,
            });
        }
        let first_run = (self.capacity - self.head).min(n);
        dst[dst_offset..dst_offset + first_run].copy_from_slice(&self.buf[self.head..self.head + first_run]);
        let remaining = n - first_run;
        if remaining > 0 {
            dst[dst_offset + first_run..dst_offset + n].copy_from_slice(&self.buf[..remaining]);
        }
        self.head = (self.head + n) % self.capacity;
        self.len -= n;
        Ok(())
    }

    /// Reads and removes `n` bytes from the head of the ring, returning them
    /// as a freshly allocated vector.
    pub fn shift(&mut self, n: usize) -> Result<Vec<u8>, RingBufferError> {
        let mut out = vec![0u8; n];
        self.read_into(&mut out, 0, n)?;
        Ok(out)
    }

    /// Pushes `n` bytes from `src[src_offset..]` back onto the front of the
    /// ring, extending the read pointer backwards. Used to "un-read" bytes
    /// a consumer peeked at but did not want to consume yet.
    pub fn unshift(
        &mut self,
        src: &[u8],
        src_offset: usize,
        n: usize,
    ) -> Result<(), RingBufferError> {
        if n == 0 {
            return Err(RingBufferError::ZeroLength);
        }
        if n > self.remaining_capacity() {
            return Err(RingBufferError::Overflow {
                requested: n,
                available: self.remaining_capacity(),
            });
        }
        let src = &src[src_offset..src_offset + n];
        let new_head = (self.head + self.capacity - n % self.capacity) % self.capacity;
        let first_run = (self.capacity - new_head).min(n);
        self.buf[new_head..new_head + first_run].copy_from_slice(&src[..first_run]);
        let remaining = n - first_run;
        if remaining > 0 {
            self.buf[..remaining].copy_from_slice(&src[first_run..]);
        }
        self.head = new_head;
        self.len += n;
        Ok(())
    }

    /// Renders the currently-buffered bytes as a lossy UTF-8 string, in
    /// logical (unwrapped) order.
    pub fn to_display_string(&self) -> String {
        String::from_utf8_lossy(&self.raw_buffer()).into_owned()
    }

    /// Returns a linear snapshot of the buffered bytes in logical order,
    /// unwrapping the ring if the used region currently straddles the end
    /// of the backing array.
    pub fn raw_buffer(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        let first_run = (self.capacity - self.head).min(self.len);
        out.extend_from_slice(&self.buf[self.head..self.head + first_run]);
        out.extend_from_slice(&self.buf[..self.len - first_run]);
        out
    }
}

impl std::fmt::Display for CircularByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_and_remaining_always_sum_to_capacity() {
        let mut ring = CircularByteBuffer::new(8).unwrap();
        ring.write_all(b"abcd").unwrap();
        assert_eq!(ring.used_capacity() + ring.remaining_capacity(), 8);
        ring.shift(2).unwrap();
        assert_eq!(ring.used_capacity() + ring.remaining_capacity(), 8);
    }

    #[test]
    fn write_then_read_same_length_returns_len_to_start_state() {
        let mut ring = CircularByteBuffer::new(8).unwrap();
        ring.write_all(b"abcd").unwrap();
        let len_before = ring.len;
        ring.write_all(b"ef").unwrap();
        ring.shift(2).unwrap();
        assert_eq!(ring.len, len_before);
    }

    #[test]
    fn overflow_is_rejected() {
        let mut ring = CircularByteBuffer::new(4).unwrap();
        let err = ring.write_all(b"abcde").unwrap_err();
        assert_eq!(
            err,
            RingBufferError::Overflow {
                requested: 5,
                available: 4
            }
        );
    }

    #[test]
    fn underflow_is_rejected() {
        let mut ring = CircularByteBuffer::new(4).unwrap();
        ring.write_all(b"ab").unwrap();
        let err = ring.shift(3).unwrap_err();
        assert_eq!(
            err,
            RingBufferError::Underflow {
                requested: 3,
                available: 2
            }
        );
    }

    #[test]
    fn wraparound_write_unshift_read_round_trip() {
        let mut ring = CircularByteBuffer::new(6).unwrap();
        ring.write_all(b"abcd").unwrap();
        ring.shift(4).unwrap();
        // head/tail have now wrapped past the end of the backing array.
        ring.write_all(b"wxyz").unwrap();
        assert_eq!(ring.raw_buffer(), b"wxyz");

        ring.shift(2).unwrap(); // consumes "wx", head moves across the wrap point
        ring.unshift(b"wx", 0, 2).unwrap(); // un-read it
        assert_eq!(ring.raw_buffer(), b"wxyz");

        let out = ring.shift(4).unwrap();
        assert_eq!(out, b"wxyz");
        assert_eq!(ring.used_capacity(), 0);
    }

    #[test]
    fn zero_length_rejected() {
        let mut ring = CircularByteBuffer::new(4).unwrap();
        assert_eq!(
            ring.write_from(b"a", 0, 0).unwrap_err(),
            RingBufferError::ZeroLength
        );
    }

    #[test]
    fn zero_capacity_rejected() {
        assert_eq!(
            CircularByteBuffer::new(0).unwrap_err(),
            RingBufferError::ZeroCapacity
        );
    }

    #[test]
    fn backing_array_ownership() {
        let backing = vec![0u8; 16];
        let mut ring = CircularByteBuffer::with_backing(backing, 8).unwrap();
        ring.write_all(b"hello").unwrap();
        assert_eq!(ring.raw_buffer(), b"hello");
    }

    proptest::proptest! {
        #[test]
        fn used_plus_remaining_is_invariant(writes in proptest::collection::vec(1usize..=5, 0..20)) {
            let mut ring = CircularByteBuffer::new(16).unwrap();
            let data = [1u8; 5];
            for n in writes {
                if n > ring.remaining_capacity() {
                    let _ = ring.shift(ring.used_capacity().min(n));
                }
                if n <= ring.remaining_capacity() {
                    ring.write_from(&data, 0, n).unwrap();
                }
                proptest::prop_assert_eq!(ring.used_capacity() + ring.remaining_capacity(), 16);
            }
        }
    }
}
