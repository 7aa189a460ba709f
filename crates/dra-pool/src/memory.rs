//! In-memory device pool
//!
//! `MemoryDevicePool` keeps inventory and reservations behind one mutex, so
//! every operation observes and mutates a consistent state.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, warn};

use dra_api::{Device, DeviceId};

use crate::error::{PoolError, PoolResult};
use crate::pool::*;

#[derive(Debug, Default)]
struct PoolState {
    generation: u64,
    devices: Vec<Device>,
    reservations: BTreeMap<DeviceId, Vec<Reservation>>,
    /// Owners that lost a device to an inventory change.
    invalidated: HashSet<ReservationId>,
}

impl PoolState {
    fn position(&self, id: &DeviceId) -> Option<usize> {
        self.devices
            .iter()
            .position(|d| d.driver_name == id.driver_name && d.name == id.name)
    }

    /// Drop reservations on `id` and mark their owners invalidated.
    fn evict(&mut self, id: &DeviceId) {
        if let Some(held) = self.reservations.remove(id) {
            for reservation in held {
                warn!(
                    device = %id,
                    owner = %reservation.owner,
                    "device left the pool while reserved"
                );
                self.invalidated.insert(reservation.owner);
            }
        }
    }
}

/// In-memory pool backed by a `Mutex<PoolState>`.
#[derive(Debug, Default)]
pub struct MemoryDevicePool {
    state: Mutex<PoolState>,
}

impl MemoryDevicePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool seeded with `devices`. Later duplicates of a device id are ignored.
    pub fn with_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let mut state = PoolState::default();
        for device in devices {
            if state.position(&device.id()).is_none() {
                state.devices.push(device);
            }
        }
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> PoolResult<MutexGuard<'_, PoolState>> {
        self.state.lock().map_err(|_| PoolError::LockPoisoned)
    }

    pub fn generation(&self) -> PoolResult<u64> {
        Ok(self.lock()?.generation)
    }

    pub fn len(&self) -> PoolResult<usize> {
        Ok(self.lock()?.devices.len())
    }

    pub fn is_empty(&self) -> PoolResult<bool> {
        Ok(self.lock()?.devices.is_empty())
    }

    /// Add a device to the inventory.
    pub fn add_device(&self, device: Device) -> PoolResult<()> {
        let mut state = self.lock()?;
        let id = device.id();
        if state.position(&id).is_some() {
            return Err(PoolError::DuplicateDevice(id));
        }
        state.devices.push(device);
        state.generation += 1;
        debug!(device = %id, generation = state.generation, "device added");
        Ok(())
    }

    /// Remove a device. Owners holding it are invalidated.
    pub fn remove_device(&self, id: &DeviceId) -> PoolResult<Device> {
        let mut state = self.lock()?;
        let index = state.position(id).ok_or_else(|| PoolError::UnknownDevice(id.clone()))?;
        let device = state.devices.remove(index);
        state.evict(id);
        state.generation += 1;
        debug!(device = %id, generation = state.generation, "device removed");
        Ok(device)
    }

    /// Replace the whole inventory, for example with a fresh slice
    /// publication. Reservations on devices that are still present survive.
    pub fn replace_inventory(&self, devices: impl IntoIterator<Item = Device>) -> PoolResult<()> {
        let mut state = self.lock()?;
        let mut next: Vec<Device> = Vec::new();
        for device in devices {
            if !next.iter().any(|d| d.id() == device.id()) {
                next.push(device);
            }
        }
        let gone: Vec<DeviceId> = state
            .reservations
            .keys()
            .filter(|id| !next.iter().any(|d| d.driver_name == id.driver_name && d.name == id.name))
            .cloned()
            .collect();
        for id in &gone {
            state.evict(id);
        }
        state.devices = next;
        state.generation += 1;
        debug!(
            devices = state.devices.len(),
            evicted = gone.len(),
            generation = state.generation,
            "inventory replaced"
        );
        Ok(())
    }
}

impl DevicePool for MemoryDevicePool {
    fn snapshot(&self) -> PoolResult<PoolSnapshot> {
        let state = self.lock()?;
        Ok(PoolSnapshot {
            generation: state.generation,
            devices: state.devices.clone(),
            reservations: state.reservations.clone(),
        })
    }

    fn try_reserve(&self, owner: &ReservationId, mode: ReservationMode, devices: &[DeviceId]) -> PoolResult<()> {
        let mut state = self.lock()?;

        // Check the whole batch before touching anything.
        for id in devices {
            if state.position(id).is_none() {
                return Err(PoolError::UnknownDevice(id.clone()));
            }
            let conflict = state
                .reservations
                .get(id)
                .and_then(|held| held.iter().find(|r| r.owner != *owner && r.mode.conflicts_with(mode)));
            if let Some(holder) = conflict {
                return Err(PoolError::Conflict {
                    device: id.clone(),
                    holder: holder.owner,
                });
            }
        }

        let now = Utc::now();
        for id in devices {
            let held = state.reservations.entry(id.clone()).or_default();
            if held.iter().any(|r| r.owner == *owner) {
                continue;
            }
            held.push(Reservation {
                owner: *owner,
                mode,
                phase: ReservationPhase::Staged,
                reserved_at: now,
            });
        }
        debug!(owner = %owner, mode = ?mode, devices = devices.len(), "devices staged");
        Ok(())
    }

    fn commit(&self, owner: &ReservationId) -> PoolResult<usize> {
        let mut state = self.lock()?;
        if state.invalidated.contains(owner) {
            return Err(PoolError::ReservationInvalidated(*owner));
        }
        let mut count = 0;
        for reservation in state.reservations.values_mut().flatten() {
            if reservation.owner == *owner {
                reservation.phase = ReservationPhase::Committed;
                count += 1;
            }
        }
        debug!(owner = %owner, devices = count, "reservations committed");
        Ok(count)
    }

    fn release(&self, owner: &ReservationId) -> PoolResult<usize> {
        let mut state = self.lock()?;
        let mut count = 0;
        for held in state.reservations.values_mut() {
            let before = held.len();
            held.retain(|r| r.owner != *owner);
            count += before - held.len();
        }
        state.reservations.retain(|_, held| !held.is_empty());
        state.invalidated.remove(owner);
        debug!(owner = %owner, devices = count, "reservations released");
        Ok(count)
    }

    fn reservations_of(&self, owner: &ReservationId) -> PoolResult<Vec<DeviceId>> {
        let state = self.lock()?;
        Ok(state
            .reservations
            .iter()
            .filter(|(_, held)| held.iter().any(|r| r.owner == *owner))
            .map(|(id, _)| id.clone())
            .collect())
    }
}
