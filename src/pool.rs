//! Reusable scratch buffers shared across requests.
//!
//! # Responsibilities
//! - Hand out byte buffers and JSON scratch maps without reallocating per request
//! - Reset every object before it goes back to the pool
//!
//! # Design Decisions
//! - Pools carry no request state; a guard resets on drop, so early returns
//!   and error paths release correctly
//! - Constructed once and passed by `Arc`, never a global

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};

/// Objects that can be cleared for reuse.
pub trait Reusable: Default {
    fn reset(&mut self);
}

impl Reusable for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reusable for Map<String, Value> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// A bounded free-list of reusable objects.
pub struct Pool<T: Reusable> {
    free: Mutex<Vec<T>>,
    max_idle: usize,
}

impl<T: Reusable> Pool<T> {
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// Take an object; it returns to the pool when the guard drops.
    pub fn acquire(&self) -> Pooled<'_, T> {
        let item = self.free.lock().pop().unwrap_or_default();
        Pooled {
            pool: self,
            item: Some(item),
        }
    }

    /// Number of idle objects waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn release(&self, mut item: T) {
        item.reset();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(item);
        }
    }
}

/// Scoped handle on a pooled object.
pub struct Pooled<'a, T: Reusable> {
    pool: &'a Pool<T>,
    item: Option<T>,
}

impl<T: Reusable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `drop` takes the item.
        self.item.as_ref().unwrap_or_else(|| unreachable!("pooled item taken"))
    }
}

impl<T: Reusable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().unwrap_or_else(|| unreachable!("pooled item taken"))
    }
}

impl<T: Reusable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

/// The pools one gateway process shares between its handlers.
pub struct Pools {
    pub buffers: Pool<Vec<u8>>,
    pub maps: Pool<Map<String, Value>>,
}

impl Pools {
    pub fn new(max_idle: usize) -> Self {
        Self {
            buffers: Pool::new(max_idle),
            maps: Pool::new(max_idle),
        }
    }
}

impl Default for Pools {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_reset_on_release() {
        let pool: Pool<Vec<u8>> = Pool::new(4);
        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(b"hello");
        }
        assert_eq!(pool.idle(), 1);
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 5);
    }

    #[test]
    fn test_release_on_early_return() {
        fn fails(pool: &Pool<Map<String, Value>>) -> Result<(), ()> {
            let mut map = pool.acquire();
            map.insert("k".into(), Value::Bool(true));
            Err(())
        }
        let pool = Pool::new(4);
        assert!(fails(&pool).is_err());
        assert_eq!(pool.idle(), 1);
        assert!(pool.acquire().is_empty());
    }

    #[test]
    fn test_idle_cap() {
        let pool: Pool<Vec<u8>> = Pool::new(1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }
}
