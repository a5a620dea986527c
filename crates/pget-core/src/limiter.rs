//! Admission limiter bounding how many fetches run at once.
//!
//! Each task acquires a slot before fetching and holds it until its callback
//! returns; the slot is released when the guard drops, so every exit path
//! (errors and unwinding panics included) gives it back.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Counting pool of `capacity` admission slots.
#[derive(Debug)]
pub struct AdmissionLimiter {
    capacity: usize,
    in_use: Mutex<usize>,
    freed: Condvar,
}

impl AdmissionLimiter {
    /// Create a limiter with `capacity` slots. Callers validate `capacity > 0`;
    /// a zero-capacity limiter would block every `acquire` forever.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_use: Mutex::new(0),
            freed: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    #[cfg(test)]
    fn in_use(&self) -> usize {
        *self.lock()
    }

    /// Block until a slot is free, then take it.
    pub fn acquire(&self) -> AdmissionSlot<'_> {
        let mut in_use = self.lock();
        while *in_use >= self.capacity {
            in_use = self
                .freed
                .wait(in_use)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *in_use += 1;
        AdmissionSlot { limiter: self }
    }

    /// Take a slot only if one is free right now.
    #[cfg(test)]
    fn try_acquire(&self) -> Option<AdmissionSlot<'_>> {
        let mut in_use = self.lock();
        if *in_use >= self.capacity {
            return None;
        }
        *in_use += 1;
        Some(AdmissionSlot { limiter: self })
    }

    fn release(&self) {
        let mut in_use = self.lock();
        *in_use = in_use.saturating_sub(1);
        drop(in_use);
        self.freed.notify_one();
    }

    // The counter stays consistent even if a holder panicked, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.in_use.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A held admission slot; released on drop.
#[must_use = "dropping the slot releases it immediately"]
#[derive(Debug)]
pub struct AdmissionSlot<'a> {
    limiter: &'a AdmissionLimiter,
}

impl Drop for AdmissionSlot<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_and_release() {
        let limiter = AdmissionLimiter::new(2);
        assert_eq!(limiter.capacity(), 2);
        let a = limiter.acquire();
        let b = limiter.acquire();
        assert_eq!(limiter.in_use(), 2);
        assert!(limiter.try_acquire().is_none());
        drop(a);
        assert_eq!(limiter.in_use(), 1);
        let c = limiter.try_acquire().expect("slot freed");
        drop(b);
        drop(c);
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    fn acquire_blocks_until_release() {
        let limiter = AdmissionLimiter::new(1);
        let held = limiter.acquire();
        let admitted = AtomicUsize::new(0);
        thread::scope(|s| {
            s.spawn(|| {
                let _slot = limiter.acquire();
                admitted.fetch_add(1, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(50));
            assert_eq!(admitted.load(Ordering::SeqCst), 0);
            drop(held);
        });
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    fn never_exceeds_capacity() {
        let limiter = AdmissionLimiter::new(3);
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        thread::scope(|s| {
            for _ in 0..12 {
                s.spawn(|| {
                    let _slot = limiter.acquire();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    fn slot_released_on_panic() {
        let limiter = AdmissionLimiter::new(1);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _slot = limiter.acquire();
            panic!("holder failed");
        }));
        assert!(res.is_err());
        assert_eq!(limiter.in_use(), 0);
        assert!(limiter.try_acquire().is_some());
    }
}
