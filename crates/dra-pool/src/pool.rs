//! Device pool abstractions
//!
//! - `ReservationId`: owner of a set of reservations (one per resolution attempt)
//! - `PoolSnapshot`: immutable view of inventory and reservations
//! - `DevicePool`: shared pool with atomic compare-and-reserve
//!
//! Reservations move Staged → Committed, or are released. A pool
//! implementation must make `try_reserve` atomic over the whole batch.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dra_api::{Device, DeviceId};

use crate::error::PoolResult;

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

/// Owner of a group of reservations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    /// Generate a new random ReservationId
    pub fn new() -> Self {
        ReservationId(Uuid::new_v4())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a reservation blocks other owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationMode {
    /// Blocks every other reservation.
    Exclusive,
    /// Blocks exclusive reservations only.
    Shared,
}

impl ReservationMode {
    pub fn conflicts_with(self, other: ReservationMode) -> bool {
        self == ReservationMode::Exclusive || other == ReservationMode::Exclusive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationPhase {
    /// Tentative, held while a resolution is in flight.
    Staged,
    /// Backs a completed allocation.
    Committed,
}

/// One owner's hold on one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub owner: ReservationId,
    pub mode: ReservationMode,
    pub phase: ReservationPhase,
    pub reserved_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time copy of the pool.
///
/// Resolution reads candidates from a snapshot; the snapshot can be stale by
/// the time devices are reserved, which `try_reserve` detects.
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    /// Bumped on every inventory change.
    pub generation: u64,
    /// Devices in inventory order.
    pub devices: Vec<Device>,
    pub reservations: BTreeMap<DeviceId, Vec<Reservation>>,
}

impl PoolSnapshot {
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn reservations_for(&self, id: &DeviceId) -> &[Reservation] {
        self.reservations.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First reservation by someone other than `owner` that conflicts with
    /// `mode`.
    pub fn conflicting(&self, id: &DeviceId, mode: ReservationMode, owner: &ReservationId) -> Option<&Reservation> {
        self.reservations_for(id)
            .iter()
            .find(|r| r.owner != *owner && r.mode.conflicts_with(mode))
    }

    /// Whether `owner` could reserve `id` in `mode` as of this snapshot.
    pub fn is_available(&self, id: &DeviceId, mode: ReservationMode, owner: &ReservationId) -> bool {
        self.conflicting(id, mode, owner).is_none()
    }

    pub fn is_reserved(&self, id: &DeviceId) -> bool {
        !self.reservations_for(id).is_empty()
    }
}

// ---------------------------------------------------------------------------
// DevicePool
// ---------------------------------------------------------------------------

/// Shared device pool.
///
/// Guarantees:
/// - `try_reserve` reserves every listed device or none of them.
/// - A device held `Exclusive` by one owner cannot be reserved by another.
/// - A device held `Shared` can be reserved `Shared` by other owners.
/// - `release` drops every reservation of an owner, staged or committed.
pub trait DevicePool: Send + Sync {
    /// Copy of the current inventory and reservations.
    fn snapshot(&self) -> PoolResult<PoolSnapshot>;

    /// Atomically reserve `devices` for `owner` in the `Staged` phase.
    ///
    /// Fails with `Conflict` when another owner holds any device in a
    /// conflicting mode, or `UnknownDevice` when a device left the pool.
    /// Devices the owner already holds are left as they are.
    fn try_reserve(&self, owner: &ReservationId, mode: ReservationMode, devices: &[DeviceId]) -> PoolResult<()>;

    /// Promote every staged reservation of `owner` to `Committed`.
    ///
    /// Returns the number of devices held. Fails with
    /// `ReservationInvalidated` when an inventory change took a device
    /// away from the owner after it was staged.
    fn commit(&self, owner: &ReservationId) -> PoolResult<usize>;

    /// Drop every reservation of `owner`. Returns how many were dropped.
    fn release(&self, owner: &ReservationId) -> PoolResult<usize>;

    /// Devices currently held by `owner`.
    fn reservations_of(&self, owner: &ReservationId) -> PoolResult<Vec<DeviceId>>;
}
