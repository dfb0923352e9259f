//! VRAM budget tracking.
//!
//! The tracker owns the budget arithmetic and the live-allocation table; the
//! actual reservations come from the injected [`HostMemory`] driver trait.
//! Every size is rounded up to [`VRAM_ALLOC_ALIGN`] before it is charged, so
//! the budget always reflects what the device actually set aside.

use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::backend::{DeviceAddress, HostMemory, HostMemoryError, MemoryClass};

/// Allocation granularity of the device page tables.
pub const VRAM_ALLOC_ALIGN: u64 = 4096;

/// Round `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be > 0.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);

    let add = alignment - 1;
    match value.checked_add(add) {
        Some(v) => v / alignment * alignment,
        None => u64::MAX / alignment * alignment,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("allocation size must be non-zero")]
    InvalidSize,
    #[error("allocation of {requested} bytes exceeds free budget ({free} bytes)")]
    OutOfBudget { requested: u64, free: u64 },
    #[error("driver failed to reserve {size} bytes")]
    AllocationFailed { size: u64 },
    #[error("no live allocation at {:#x}", .0 .0)]
    UnknownHandle(DeviceAddress),
    #[error("copy references dead or foreign allocation {:#x}", .0 .0)]
    InvalidHandle(DeviceAddress),
    #[error("copy of {len} bytes exceeds allocation size {size}")]
    CopyOutOfBounds { len: u64, size: u64 },
    #[error(transparent)]
    Host(#[from] HostMemoryError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct AllocationRecord {
    /// Aligned size actually charged against the budget.
    size: u64,
    class: MemoryClass,
    contiguous: bool,
}

/// Point-in-time budget numbers. `total == used + free` always holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BudgetReport {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Default)]
struct TrackerState {
    allocations: HashMap<DeviceAddress, AllocationRecord>,
    used: u64,
}

/// Budget-enforcing allocation table in front of a [`HostMemory`] driver.
pub struct MemoryTracker {
    total: u64,
    host: Arc<dyn HostMemory>,
    state: Mutex<TrackerState>,
}

impl MemoryTracker {
    pub fn new(budget: u64, host: Arc<dyn HostMemory>) -> Self {
        Self {
            total: budget,
            host,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Reserve `size` bytes (rounded up to [`VRAM_ALLOC_ALIGN`]).
    ///
    /// The budget is only charged once the driver reservation succeeds.
    pub fn alloc(
        &self,
        size: u64,
        class: MemoryClass,
        contiguous: bool,
    ) -> Result<DeviceAddress, MemoryError> {
        if size == 0 {
            return Err(MemoryError::InvalidSize);
        }
        let aligned = align_up(size, VRAM_ALLOC_ALIGN);

        let mut state = self.state.lock().unwrap();
        let free = self.total - state.used;
        if aligned > free {
            return Err(MemoryError::OutOfBudget {
                requested: aligned,
                free,
            });
        }
        let addr = self
            .host
            .reserve(aligned, class, contiguous)
            .ok_or(MemoryError::AllocationFailed { size: aligned })?;
        state.allocations.insert(
            addr,
            AllocationRecord {
                size: aligned,
                class,
                contiguous,
            },
        );
        state.used += aligned;
        debug!(addr = addr.0, size = aligned, "vram alloc");
        Ok(addr)
    }

    /// Release a live allocation and credit its aligned size back.
    pub fn free(&self, addr: DeviceAddress) -> Result<(), MemoryError> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .allocations
            .remove(&addr)
            .ok_or(MemoryError::UnknownHandle(addr))?;
        self.host.release(addr);
        state.used -= record.size;
        debug!(
            addr = addr.0,
            size = record.size,
            class = ?record.class,
            contiguous = record.contiguous,
            "vram free"
        );
        Ok(())
    }

    /// Copy host bytes into a live allocation.
    pub fn copy_to_device(&self, addr: DeviceAddress, src: &[u8]) -> Result<(), MemoryError> {
        let state = self.state.lock().unwrap();
        let record = state
            .allocations
            .get(&addr)
            .ok_or(MemoryError::InvalidHandle(addr))?;
        if src.len() as u64 > record.size {
            return Err(MemoryError::CopyOutOfBounds {
                len: src.len() as u64,
                size: record.size,
            });
        }
        self.host.write(addr, 0, src)?;
        Ok(())
    }

    /// Copy bytes out of a live allocation into `dst`.
    pub fn copy_from_device(&self, addr: DeviceAddress, dst: &mut [u8]) -> Result<(), MemoryError> {
        let state = self.state.lock().unwrap();
        let record = state
            .allocations
            .get(&addr)
            .ok_or(MemoryError::InvalidHandle(addr))?;
        if dst.len() as u64 > record.size {
            return Err(MemoryError::CopyOutOfBounds {
                len: dst.len() as u64,
                size: record.size,
            });
        }
        self.host.read(addr, 0, dst)?;
        Ok(())
    }

    pub fn budget(&self) -> BudgetReport {
        let state = self.state.lock().unwrap();
        BudgetReport {
            total: self.total,
            used: state.used,
            free: self.total - state.used,
        }
    }

    /// Force-free every live allocation (shutdown path).
    pub fn release_all(&self) {
        let mut state = self.state.lock().unwrap();
        for (addr, record) in state.allocations.drain() {
            self.host.release(addr);
            debug!(addr = addr.0, size = record.size, "vram force-free");
        }
        state.used = 0;
    }
}
