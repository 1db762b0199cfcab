/// Fixed-capacity staging buffer for outbound socket messages.
///
/// Data is copied in at `len` and the pending region `[0, len)` is handed to
/// the socket as one message, after which the buffer is empty again.
pub struct SendQueue {
    backing: Vec<u8>,
    len: usize,
}

impl SendQueue {
    /// Create a queue holding at most `capacity` bytes per flush.
    pub fn new(capacity: usize) -> Self {
        SendQueue {
            backing: vec![0u8; capacity.max(1)],
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.backing.len()
    }

    /// Copy as much of `data` as fits and return the number of bytes taken.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.backing.len() - self.len);
        self.backing[self.len..self.len + n].copy_from_slice(&data[..n]);
        self.len += n;
        n
    }

    /// Bytes waiting to be flushed.
    pub fn pending(&self) -> &[u8] {
        &self.backing[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}
