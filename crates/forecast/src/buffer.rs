//! Append-only reading buffer shared between the ingestion path and the
//! control loop.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::reading::SensorReading;

/// Readings in arrival order.  Writers append under the write lock, so a
/// snapshot always sees a complete prefix.
#[derive(Debug, Default)]
pub struct ReadingBuffer {
    readings: RwLock<Vec<SensorReading>>,
}

impl ReadingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reading: SensorReading) {
        self.write().push(reading);
    }

    pub fn extend(&self, readings: impl IntoIterator<Item = SensorReading>) {
        self.write().extend(readings);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn latest(&self) -> Option<SensorReading> {
        self.read().last().cloned()
    }

    /// Copy of everything appended so far.
    pub fn snapshot(&self) -> Vec<SensorReading> {
        self.read().clone()
    }

    /// Copy of the last `n` readings (fewer if the buffer is shorter).
    pub fn tail(&self, n: usize) -> Vec<SensorReading> {
        let guard = self.read();
        guard[guard.len().saturating_sub(n)..].to_vec()
    }

    // A writer that panicked mid-push cannot leave a torn element behind,
    // so a poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, Vec<SensorReading>> {
        self.readings.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<SensorReading>> {
        self.readings.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
