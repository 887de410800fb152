//! Cooperative reader/writer mutual exclusion over a single atomic `u32`.
//!
//! Mirrors `vkd3d_rw_spinlock.h`: readers add [`READ`], writers CAS from
//! [`IDLE`] to [`WRITE`]. There is no fairness guarantee either way; the
//! intended steady state is read-dominant.

use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};

const IDLE: u32 = 0;
const WRITE: u32 = 1;
const READ: u32 = 2;

/// A reader/writer spinlock with the exact bit layout of the original C
/// implementation: bit 0 is the writer flag, all higher bits are the reader
/// count (incremented in steps of 2).
#[derive(Debug, Default)]
pub struct RwSpinlock {
    state: AtomicU32,
}

impl RwSpinlock {
    pub const fn new() -> Self {
        RwSpinlock {
            state: AtomicU32::new(IDLE),
        }
    }

    /// Spins until a read lock is acquired, then returns a guard that
    /// releases it on drop.
    pub fn read(&self) -> ReadGuard<'_> {
        let mut count = self.state.fetch_add(READ, Ordering::Acquire);
        while count & WRITE != 0 {
            hint::spin_loop();
            count = self.state.load(Ordering::Acquire);
        }
        ReadGuard { lock: self }
    }

    /// Spins until the write lock is acquired, then returns a guard that
    /// releases it on drop.
    pub fn write(&self) -> WriteGuard<'_> {
        while self
            .state
            .compare_exchange(IDLE, WRITE, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        WriteGuard { lock: self }
    }

    fn release_read(&self) {
        self.state.fetch_sub(READ, Ordering::Release);
    }

    fn release_write(&self) {
        self.state.fetch_and(!WRITE, Ordering::Release);
    }
}

/// RAII read-lock guard. Dropping it releases the read lock.
pub struct ReadGuard<'a> {
    lock: &'a RwSpinlock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// RAII write-lock guard. Dropping it releases the write lock.
pub struct WriteGuard<'a> {
    lock: &'a RwSpinlock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn write_excludes_concurrent_write() {
        let lock = Arc::new(RwSpinlock::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let lock = lock.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let _guard = lock.write();
                    let prev = counter.fetch_add(1, Ordering::SeqCst);
                    // If another writer were concurrently inside its
                    // critical section, two threads could observe the same
                    // prev value; we only assert monotonic progress here.
                    assert!(prev < usize::MAX);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8000);
    }

    #[test]
    fn readers_do_not_block_each_other() {
        let lock = RwSpinlock::new();
        let a = lock.read();
        let b = lock.read();
        drop(a);
        drop(b);
    }

    #[test]
    fn write_after_reads_release() {
        let lock = RwSpinlock::new();
        {
            let _r = lock.read();
        }
        let _w = lock.write();
    }
}
