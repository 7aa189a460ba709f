//! Contract tests for DevicePool.
//!
//! Exercised against `MemoryDevicePool`; any conforming implementation must
//! pass these.

use std::sync::Arc;

use dra_api::{Device, DeviceId};
use dra_pool::{DevicePool, MemoryDevicePool, PoolError, ReservationId, ReservationMode, ReservationPhase};

fn gpus(n: usize) -> Vec<Device> {
    (0..n)
        .map(|i| Device::new("gpu.example.com", format!("gpu-{i}")))
        .collect()
}

fn id(name: &str) -> DeviceId {
    DeviceId::new("gpu.example.com", name)
}

// ===========================================================================
// Reservation modes
// ===========================================================================

#[test]
fn exclusive_blocks_everyone_else() {
    let pool = MemoryDevicePool::with_devices(gpus(1));
    let a = ReservationId::new();
    pool.try_reserve(&a, ReservationMode::Exclusive, &[id("gpu-0")]).unwrap();

    for mode in [ReservationMode::Exclusive, ReservationMode::Shared] {
        let err = pool.try_reserve(&ReservationId::new(), mode, &[id("gpu-0")]).unwrap_err();
        assert!(matches!(err, PoolError::Conflict { holder, .. } if holder == a));
        assert!(err.is_race());
    }
}

#[test]
fn shared_admits_shared_only() {
    let pool = MemoryDevicePool::with_devices(gpus(1));
    pool.try_reserve(&ReservationId::new(), ReservationMode::Shared, &[id("gpu-0")])
        .unwrap();
    pool.try_reserve(&ReservationId::new(), ReservationMode::Shared, &[id("gpu-0")])
        .unwrap();
    assert!(pool
        .try_reserve(&ReservationId::new(), ReservationMode::Exclusive, &[id("gpu-0")])
        .is_err());

    let snapshot = pool.snapshot().unwrap();
    assert_eq!(snapshot.reservations_for(&id("gpu-0")).len(), 2);
}

// ===========================================================================
// Lifecycle
// ===========================================================================

#[test]
fn staged_then_committed_then_released() {
    let pool = MemoryDevicePool::with_devices(gpus(2));
    let owner = ReservationId::new();

    pool.try_reserve(&owner, ReservationMode::Exclusive, &[id("gpu-0"), id("gpu-1")])
        .unwrap();
    let phases: Vec<_> = pool
        .snapshot()
        .unwrap()
        .reservations
        .values()
        .flatten()
        .map(|r| r.phase)
        .collect();
    assert_eq!(phases, vec![ReservationPhase::Staged, ReservationPhase::Staged]);

    assert_eq!(pool.commit(&owner).unwrap(), 2);
    assert_eq!(pool.reservations_of(&owner).unwrap(), vec![id("gpu-0"), id("gpu-1")]);

    assert_eq!(pool.release(&owner).unwrap(), 2);
    let other = ReservationId::new();
    pool.try_reserve(&other, ReservationMode::Exclusive, &[id("gpu-0")]).unwrap();
}

#[test]
fn inventory_changes_bump_generation() {
    let pool = MemoryDevicePool::with_devices(gpus(1));
    let g0 = pool.snapshot().unwrap().generation;

    pool.add_device(Device::new("gpu.example.com", "gpu-1")).unwrap();
    pool.remove_device(&id("gpu-0")).unwrap();
    pool.replace_inventory(gpus(3)).unwrap();

    let snapshot = pool.snapshot().unwrap();
    assert_eq!(snapshot.generation, g0 + 3);
    assert_eq!(snapshot.devices().len(), 3);

    // Reservations do not bump the generation.
    pool.try_reserve(&ReservationId::new(), ReservationMode::Exclusive, &[id("gpu-2")])
        .unwrap();
    assert_eq!(pool.snapshot().unwrap().generation, g0 + 3);
}

#[test]
fn vanished_device_is_a_race() {
    let pool = MemoryDevicePool::with_devices(gpus(2));
    let stale = pool.snapshot().unwrap();
    pool.remove_device(&id("gpu-1")).unwrap();

    let owner = ReservationId::new();
    let ids: Vec<_> = stale.devices().iter().map(Device::id).collect();
    let err = pool.try_reserve(&owner, ReservationMode::Exclusive, &ids).unwrap_err();
    assert_eq!(err, PoolError::UnknownDevice(id("gpu-1")));
    assert!(err.is_race());
    assert!(pool.reservations_of(&owner).unwrap().is_empty());
}

// ===========================================================================
// Concurrency
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_exclusive_reservations_never_double_book() {
    let pool = Arc::new(MemoryDevicePool::with_devices(gpus(4)));
    let mut handles = Vec::new();

    for _ in 0..16 {
        let pool = pool.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let owner = ReservationId::new();
            let snapshot = pool.snapshot().unwrap();
            let free: Vec<_> = snapshot
                .devices()
                .iter()
                .map(Device::id)
                .filter(|d| snapshot.is_available(d, ReservationMode::Exclusive, &owner))
                .take(2)
                .collect();
            if free.len() < 2 {
                return None;
            }
            match pool.try_reserve(&owner, ReservationMode::Exclusive, &free) {
                Ok(()) => {
                    pool.commit(&owner).unwrap();
                    Some(owner)
                }
                Err(e) => {
                    assert!(e.is_race());
                    None
                }
            }
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        if let Some(owner) = handle.await.unwrap() {
            winners.push(owner);
        }
    }

    assert!(!winners.is_empty() && winners.len() <= 2);
    let snapshot = pool.snapshot().unwrap();
    for held in snapshot.reservations.values() {
        assert_eq!(held.len(), 1);
    }
    let held: usize = winners.iter().map(|w| pool.reservations_of(w).unwrap().len()).sum();
    assert_eq!(held, winners.len() * 2);
}
