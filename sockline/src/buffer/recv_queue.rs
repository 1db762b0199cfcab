//! Cursor-based receive queue for bytes arriving as socket messages.
//!
//! Bytes live in `[read, write)` of a flat buffer. Appends go at `write`;
//! readers advance `read`. Unread bytes are only moved when the queue is
//! compacted or grown, and always land at offset 0.

use tracing::debug;

use crate::error::{Error, Result};
use crate::metrics;

pub struct RecvQueue {
    buf: Vec<u8>,
    read: usize,
    write: usize,
    max: usize,
}

impl RecvQueue {
    /// Create a queue with `capacity` bytes that may grow up to `max`.
    pub fn new(capacity: usize, max: usize) -> Self {
        let capacity = capacity.min(max);
        RecvQueue {
            buf: vec![0u8; capacity],
            read: 0,
            write: 0,
            max,
        }
    }

    /// Current buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes not yet read.
    pub fn unread_len(&self) -> usize {
        self.write - self.read
    }

    /// Read cursor.
    pub fn read_pos(&self) -> usize {
        self.read
    }

    /// Write cursor.
    pub fn write_pos(&self) -> usize {
        self.write
    }

    /// Move the read cursor. `pos` must lie within `[0, write]`.
    pub fn set_read_pos(&mut self, pos: usize) {
        debug_assert!(pos <= self.write, "read cursor {pos} past write cursor {}", self.write);
        self.read = pos.min(self.write);
    }

    /// Append a message. Grows the buffer first if it does not fit in the
    /// free tail.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.buf.len() - self.write {
            self.grow_or_compact(Some(data.len()))?;
        }
        self.buf[self.write..self.write + data.len()].copy_from_slice(data);
        self.write += data.len();
        Ok(())
    }

    /// Resize or compact the buffer.
    ///
    /// Without `min_fit`, the buffer doubles only when more than half of it
    /// is unread; otherwise unread bytes are just moved to the front. With
    /// `min_fit`, capacity becomes `8 * (unread + min_fit)`. Capacity is
    /// clamped to the configured maximum, and if the clamped buffer cannot
    /// hold the unread bytes plus `min_fit`, this fails with
    /// [`Error::BufferExceeded`] and leaves the queue untouched.
    pub fn grow_or_compact(&mut self, min_fit: Option<usize>) -> Result<()> {
        let unread = self.unread_len();
        let capacity = self.buf.len();
        let resize = match min_fit {
            Some(_) => true,
            None => unread > capacity / 2,
        };

        let mut new_capacity = capacity;
        if resize {
            new_capacity = match min_fit {
                None => capacity.saturating_mul(2),
                Some(fit) => unread.saturating_add(fit).saturating_mul(8),
            };
        }

        if new_capacity > self.max {
            new_capacity = self.max;
            let fit = min_fit.unwrap_or(0);
            if new_capacity - unread.min(new_capacity) < fit {
                return Err(Error::BufferExceeded {
                    required: unread + fit,
                    max: self.max,
                });
            }
        }

        if resize {
            debug!(from = capacity, to = new_capacity, unread, "resizing receive queue");
            metrics::RECV_RESIZES.increment();
            let mut buf = vec![0u8; new_capacity];
            buf[..unread].copy_from_slice(&self.buf[self.read..self.write]);
            self.buf = buf;
        } else {
            self.buf.copy_within(self.read..self.write, 0);
        }

        self.write = unread;
        self.read = 0;
        Ok(())
    }

    /// Housekeeping after a message was handled: reset when drained,
    /// otherwise compact once more than an eighth of the buffer is unread.
    pub fn settle(&mut self) -> Result<()> {
        if self.read == self.write {
            self.read = 0;
            self.write = 0;
        } else if self.unread_len() > self.buf.len() / 8 {
            self.grow_or_compact(None)?;
        }
        Ok(())
    }

    /// Discard all data.
    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    // ── readers over [read, write) ───────────────────────────────────

    pub fn peek8(&self) -> u8 {
        debug_assert!(self.unread_len() >= 1, "peek8 on empty queue");
        self.buf[self.read]
    }

    pub fn shift8(&mut self) -> u8 {
        let b = self.peek8();
        self.read += 1;
        b
    }

    pub fn skip8(&mut self) {
        self.skip_bytes(1);
    }

    pub fn skip_bytes(&mut self, n: usize) {
        debug_assert!(n <= self.unread_len(), "skip_bytes({n}) exceeds unread length {}", self.unread_len());
        self.read += n;
    }

    /// Big-endian u16.
    pub fn shift16(&mut self) -> u16 {
        let bytes = self.shift_bytes(2);
        u16::from_be_bytes([bytes[0], bytes[1]])
    }

    /// Big-endian u32.
    pub fn shift32(&mut self) -> u32 {
        let bytes = self.shift_bytes(4);
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn shift_bytes(&mut self, n: usize) -> &[u8] {
        debug_assert!(n <= self.unread_len(), "shift_bytes({n}) exceeds unread length {}", self.unread_len());
        let start = self.read;
        self.read += n;
        &self.buf[start..self.read]
    }

    /// Borrow every unread byte and advance to the write cursor.
    pub fn shift_all(&mut self) -> &[u8] {
        let n = self.unread_len();
        self.shift_bytes(n)
    }

    /// Copy `target.len()` bytes into `target` and advance past them.
    pub fn shift_to(&mut self, target: &mut [u8]) {
        let n = target.len();
        target.copy_from_slice(self.shift_bytes(n));
    }

    /// View `[start, end)` relative to the read cursor without consuming.
    /// `end = None` means up to the write cursor.
    pub fn slice(&self, start: usize, end: Option<usize>) -> &[u8] {
        let end = end.unwrap_or(self.unread_len());
        debug_assert!(start <= end && end <= self.unread_len(), "slice {start}..{end} out of range");
        &self.buf[self.read + start..self.read + end]
    }

    /// Everything written so far, including bytes already read.
    pub fn whole(&self) -> &[u8] {
        &self.buf[..self.write]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_shift() {
        let mut q = RecvQueue::new(64, 1024);
        q.append(b"\x01\x02\x03\x04\x05\x06\x07").unwrap();
        assert_eq!(q.unread_len(), 7);
        assert_eq!(q.peek8(), 1);
        assert_eq!(q.shift8(), 1);
        assert_eq!(q.shift16(), 0x0203);
        assert_eq!(q.shift32(), 0x0405_0607);
        assert_eq!(q.unread_len(), 0);
    }

    #[test]
    fn slice_does_not_consume() {
        let mut q = RecvQueue::new(64, 1024);
        q.append(b"hello world").unwrap();
        q.skip_bytes(6);
        assert_eq!(q.slice(0, Some(3)), b"wor");
        assert_eq!(q.slice(2, None), b"rld");
        assert_eq!(q.unread_len(), 5);
        assert_eq!(q.whole(), b"hello world");
    }

    #[test]
    fn read_cursor_rewinds_for_incomplete_frames() {
        let mut q = RecvQueue::new(64, 1024);
        q.append(b"\x16\x03\x03\x00\x05abc").unwrap();
        let start = q.read_pos();
        q.skip8();
        q.skip_bytes(2);
        let len = q.shift16() as usize;
        assert!(q.unread_len() < len);

        // Not enough bytes yet: rewind to the frame start.
        q.set_read_pos(start);
        assert_eq!(q.read_pos(), 0);
        assert_eq!(q.unread_len(), 8);
        q.append(b"de").unwrap();
        assert_eq!(q.shift_bytes(5), b"\x16\x03\x03\x00\x05");
        assert_eq!(q.shift_all(), b"abcde");
    }

    #[test]
    fn shift_to_copies_and_advances() {
        let mut q = RecvQueue::new(16, 64);
        q.append(b"abcdef").unwrap();
        let mut target = [0u8; 4];
        q.shift_to(&mut target);
        assert_eq!(&target, b"abcd");
        assert_eq!(q.shift_all(), b"ef");
    }

    #[test]
    fn grow_preserves_unread_bytes() {
        let mut q = RecvQueue::new(8, 1024);
        q.append(b"abcdefgh").unwrap();
        q.skip_bytes(3);
        // Does not fit: needs growth to 8 * (5 + 4) = 72.
        q.append(b"ijkl").unwrap();
        assert_eq!(q.capacity(), 72);
        assert_eq!(q.read_pos(), 0);
        assert_eq!(q.slice(0, None), b"defghijkl");
    }

    #[test]
    fn grow_clamps_to_max() {
        let mut q = RecvQueue::new(8, 40);
        q.append(b"12345678").unwrap();
        q.append(b"abcd").unwrap();
        assert_eq!(q.capacity(), 40);
        assert_eq!(q.read_pos(), 0);
        assert_eq!(q.slice(0, None), b"12345678abcd");
    }

    #[test]
    fn exceeding_max_fails_without_truncating() {
        let mut q = RecvQueue::new(8, 16);
        q.append(b"12345678").unwrap();
        let err = q.append(&[0u8; 9]).unwrap_err();
        assert!(matches!(err, Error::BufferExceeded { required: 17, max: 16 }));
        assert_eq!(q.slice(0, None), b"12345678");
        assert_eq!(q.capacity(), 8);
    }

    #[test]
    fn compaction_without_growth() {
        let mut q = RecvQueue::new(16, 64);
        q.append(b"0123456789").unwrap();
        q.skip_bytes(8);
        q.grow_or_compact(None).unwrap();
        assert_eq!(q.capacity(), 16);
        assert_eq!(q.read_pos(), 0);
        assert_eq!(q.write_pos(), 2);
        assert_eq!(q.slice(0, None), b"89");
    }

    #[test]
    fn compaction_doubles_when_mostly_unread() {
        let mut q = RecvQueue::new(16, 64);
        q.append(b"0123456789").unwrap();
        q.skip8();
        q.grow_or_compact(None).unwrap();
        assert_eq!(q.capacity(), 32);
        assert_eq!(q.read_pos(), 0);
        assert_eq!(q.slice(0, None), b"123456789");
    }

    #[test]
    fn settle_resets_when_drained() {
        let mut q = RecvQueue::new(16, 64);
        q.append(b"abc").unwrap();
        q.shift_all();
        q.settle().unwrap();
        assert_eq!(q.read_pos(), 0);
        assert_eq!(q.write_pos(), 0);
    }

    #[test]
    fn settle_compacts_past_soft_threshold() {
        let mut q = RecvQueue::new(16, 64);
        q.append(b"abcdefgh").unwrap();
        q.skip_bytes(4);
        q.settle().unwrap();
        assert_eq!(q.read_pos(), 0);
        assert_eq!(q.slice(0, None), b"efgh");
    }

    #[test]
    fn growth_sequence_keeps_bytes() {
        let mut q = RecvQueue::new(4, 4096);
        let mut expected = Vec::new();
        for round in 0u8..20 {
            let msg: Vec<u8> = (0..round + 3).map(|b| b.wrapping_mul(round)).collect();
            q.append(&msg).unwrap();
            expected.extend_from_slice(&msg);
            if round % 3 == 0 {
                q.skip_bytes(2);
                expected.drain(..2);
            }
            assert_eq!(q.slice(0, None), &expected[..]);
        }
    }
}
