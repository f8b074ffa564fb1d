//! Thread-local scratch-buffer pools.
//!
//! Generalizes html5gum's single reusable scratch buffer
//! (`MachineHelper::temporary_buffer`, one `String` kept alive for the lifetime of one
//! `Tokenizer`) into a small per-thread stack of buffers that any parse or
//! serialization on that thread can borrow from, capped at 12 buffers, borrowed at
//! parse/serialize entry and released on every exit path — the borrow is expressed
//! as an RAII guard so release happens even on early returns and panics, without the
//! caller having to remember it.

use std::cell::RefCell;

const POOL_CAPACITY: usize = 12;

thread_local! {
    static STRING_POOL: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// A pooled [`String`] scratch buffer, returned to the pool on drop.
pub struct PooledString {
    buf: Option<String>,
}

impl PooledString {
    /// Borrow a cleared scratch buffer from the thread-local pool, allocating a fresh
    /// one if the pool is currently empty.
    #[must_use]
    pub fn acquire() -> Self {
        let buf = STRING_POOL.with(|pool| pool.borrow_mut().pop()).unwrap_or_default();
        PooledString { buf: Some(buf) }
    }
}

impl std::ops::Deref for PooledString {
    type Target = String;
    fn deref(&self) -> &String {
        self.buf.as_ref().expect("PooledString used after drop")
    }
}

impl std::ops::DerefMut for PooledString {
    fn deref_mut(&mut self) -> &mut String {
        self.buf.as_mut().expect("PooledString used after drop")
    }
}

impl Drop for PooledString {
    fn drop(&mut self) {
        if let Some(mut buf) = self.buf.take() {
            buf.clear();
            STRING_POOL.with(|pool| {
                let mut pool = pool.borrow_mut();
                if pool.len() < POOL_CAPACITY {
                    pool.push(buf);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_recycled_and_cleared() {
        {
            let mut s = PooledString::acquire();
            s.push_str("leftover");
        }
        let s = PooledString::acquire();
        assert!(s.is_empty());
    }

    #[test]
    fn pool_caps_at_capacity() {
        let mut guards = Vec::new();
        for _ in 0..(POOL_CAPACITY + 4) {
            guards.push(PooledString::acquire());
        }
        drop(guards);
        let count = STRING_POOL.with(|pool| pool.borrow().len());
        assert!(count <= POOL_CAPACITY);
    }
}
