use std::sync::{Mutex, PoisonError};

use bytes::BytesMut;

const INITIAL_CAPACITY: usize = 512;
const DEFAULT_MAX_IDLE: usize = 256;
/// Buffers grown past this by a large body are freed instead of pooled.
pub const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// Free list of body-capture buffers, so request bodies can be copied
/// without a fresh allocation per request.
pub struct BufferPool {
    free_list: Mutex<Vec<BytesMut>>,
    max_idle: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

impl BufferPool {
    /// A pool keeping at most `max_idle` buffers around.
    pub fn new(max_idle: usize) -> Self {
        Self {
            free_list: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Take an empty buffer, reusing a returned one when available.
    pub fn get(&self) -> BytesMut {
        self.free_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(INITIAL_CAPACITY))
    }

    /// Return a buffer. Its contents are discarded, and so is the buffer
    /// itself when it outgrew `MAX_RETAINED_CAPACITY`.
    pub fn put(&self, mut buf: BytesMut) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();
        let mut free = self.free_list.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }

    /// Buffers currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Bytes held by idle buffers.
    pub fn retained_bytes(&self) -> usize {
        self.free_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(BytesMut::capacity)
            .sum()
    }
}
