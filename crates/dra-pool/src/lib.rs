//! DRA Pool - shared device inventory and reservations
//!
//! Layer 1 of the resolver workspace. A [`DevicePool`] hands out snapshots
//! for candidate selection and performs atomic compare-and-reserve over
//! batches of devices, so concurrent resolutions never double-book an
//! exclusive device.
//!
//! [`MemoryDevicePool`] is the in-process implementation.

pub mod error;
pub mod memory;
pub mod pool;

pub use error::{PoolError, PoolResult};
pub use memory::MemoryDevicePool;
pub use pool::{DevicePool, PoolSnapshot, Reservation, ReservationId, ReservationMode, ReservationPhase};
