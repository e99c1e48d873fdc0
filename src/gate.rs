//! Counting admission gate bounding simultaneous uploads
//!
//! One gate is shared by every pipeline in the process. Holding a [`GatePermit`] means holding one
//! upload slot; dropping (or [`ConcurrencyGate::release`]-ing) it frees the slot and wakes one
//! waiter. Admission order is the semaphore's FIFO queue.

use crate::config::MAX_UPLOAD_CONCURRENCY;
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded upload admission
#[derive(Clone, Debug)]
pub struct ConcurrencyGate {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// One admitted holder of a gate slot; the slot is freed on drop
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `capacity` holders (1-20)
    pub fn new(capacity: usize) -> Result<Self> {
        if !(1..=MAX_UPLOAD_CONCURRENCY).contains(&capacity) {
            return Err(Error::config(
                "upload_concurrency",
                format!("must be between 1 and {MAX_UPLOAD_CONCURRENCY}, got {capacity}"),
            ));
        }
        Ok(Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Wait until a slot is free and take it
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::ShuttingDown)?;
        Ok(GatePermit { _permit: permit })
    }

    /// Give a slot back
    pub fn release(&self, permit: GatePermit) {
        drop(permit);
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Slots currently held
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Refuse all further admissions; waiting tasks get [`Error::ShuttingDown`]
    pub fn close(&self) {
        self.slots.close();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn capacity_outside_one_to_twenty_is_rejected() {
        assert!(ConcurrencyGate::new(0).is_err());
        assert!(ConcurrencyGate::new(21).is_err());
        assert_eq!(ConcurrencyGate::new(1).unwrap().capacity(), 1);
        assert_eq!(ConcurrencyGate::new(20).unwrap().capacity(), 20);
    }

    #[tokio::test]
    async fn never_admits_more_than_capacity() {
        let gate = ConcurrencyGate::new(3).unwrap();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..25u64 {
            let gate = gate.clone();
            let current = current.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let permit = gate.acquire().await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1 + i % 4)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                gate.release(permit);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(gate.available(), 3);
    }

    #[tokio::test]
    async fn release_unblocks_exactly_one_waiter() {
        let gate = ConcurrencyGate::new(1).unwrap();
        let held = gate.acquire().await.unwrap();
        assert_eq!(gate.in_use(), 1);

        let admitted = Arc::new(AtomicUsize::new(0));
        let mut waiters = Vec::new();
        for _ in 0..2 {
            let gate = gate.clone();
            let admitted = admitted.clone();
            waiters.push(tokio::spawn(async move {
                let permit = gate.acquire().await.unwrap();
                admitted.fetch_add(1, Ordering::SeqCst);
                // hold until the test is done looking
                tokio::time::sleep(Duration::from_millis(200)).await;
                drop(permit);
            }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 0);

        gate.release(held);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 1);

        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn closed_gate_refuses_admission() {
        let gate = ConcurrencyGate::new(2).unwrap();
        gate.close();
        assert!(matches!(gate.acquire().await, Err(Error::ShuttingDown)));
    }
}
