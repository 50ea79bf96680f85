//! Per-vehicle serialization.
//!
//! Updates for the same vehicle queue behind one another; updates for
//! different vehicles never share a lock. Idle entries are removed when the
//! last guard for a vehicle is released.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::identifier::VehicleId;

#[derive(Debug, Clone, Default)]
pub struct VehicleLocks {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    locks: DashMap<VehicleId, Arc<Mutex<()>>>,
}

impl VehicleLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, vehicle: &VehicleId) -> VehicleGuard {
        let lock = self
            .inner
            .locks
            .entry(vehicle.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = lock.lock_owned().await;
        VehicleGuard {
            vehicle: vehicle.clone(),
            inner: Arc::clone(&self.inner),
            guard: Some(guard),
        }
    }

    /// Number of vehicles with a held or awaited lock.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.locks.is_empty()
    }
}

pub struct VehicleGuard {
    vehicle: VehicleId,
    inner: Arc<Inner>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for VehicleGuard {
    fn drop(&mut self) {
        self.guard.take();
        // the map holds one reference; anyone else means a waiter
        self.inner.locks.remove_if(&self.vehicle, |_, lock| Arc::strong_count(lock) == 1);
    }
}
