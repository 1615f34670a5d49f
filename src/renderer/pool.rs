//! Reusable render buffers

use std::sync::{Mutex, PoisonError};

/// Largest buffer kept for reuse; bigger ones are dropped after use
const MAX_RETAINED_CAPACITY: usize = 1 << 20;

/// A bounded pool of byte buffers shared by concurrent renders
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    size: usize,
}

impl BufferPool {
    /// Pool retaining at most `size` idle buffers
    pub fn new(size: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(size)),
            size,
        }
    }

    /// Take an empty buffer, reusing an idle one when available
    pub fn get(&self) -> Vec<u8> {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default()
    }

    /// Return a buffer to the pool
    pub fn put(&self, mut buffer: Vec<u8>) {
        if buffer.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buffer.clear();
        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        if buffers.len() < self.size {
            buffers.push(buffer);
        }
    }

    /// Number of idle buffers
    pub fn idle(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(64)
    }
}
