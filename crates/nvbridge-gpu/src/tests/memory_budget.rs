use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::backend::MemoryClass;
use crate::memory::{MemoryError, MemoryTracker, VRAM_ALLOC_ALIGN};
use crate::testing::VecHostMemory;

fn tracker(budget: u64) -> (MemoryTracker, Arc<VecHostMemory>) {
    let host = Arc::new(VecHostMemory::new());
    (MemoryTracker::new(budget, host.clone()), host)
}

#[test]
fn budget_reflects_aligned_sizes() {
    let (t, _) = tracker(64 * 1024);

    let a = t.alloc(4097, MemoryClass::Device, false).unwrap();
    let report = t.budget();
    assert_eq!(report.used, 8192);
    assert_eq!(report.free, report.total - 8192);

    t.free(a).unwrap();
    let report = t.budget();
    assert_eq!(report.used, 0);
    assert_eq!(report.free, report.total);
}

#[test]
fn used_plus_free_always_equals_total() {
    let (t, _) = tracker(10 * VRAM_ALLOC_ALIGN);
    let mut live = Vec::new();
    for _ in 0..4 {
        live.push(t.alloc(3000, MemoryClass::Device, false).unwrap());
    }
    t.free(live.remove(1)).unwrap();

    let report = t.budget();
    assert_eq!(report.used + report.free, report.total);
    assert_eq!(report.used, 3 * VRAM_ALLOC_ALIGN);
}

#[test]
fn zero_size_allocation_is_invalid() {
    let (t, _) = tracker(4096);
    assert_eq!(
        t.alloc(0, MemoryClass::System, false),
        Err(MemoryError::InvalidSize)
    );
}

#[test]
fn over_budget_allocation_is_rejected_without_side_effects() {
    let (t, host) = tracker(8192);
    t.alloc(4096, MemoryClass::Device, false).unwrap();

    let err = t.alloc(8192, MemoryClass::Device, false).unwrap_err();
    assert_eq!(
        err,
        MemoryError::OutOfBudget {
            requested: 8192,
            free: 4096
        }
    );
    assert_eq!(t.budget().used, 4096);
    assert_eq!(host.live_regions(), 1);
}

#[test]
fn driver_reservation_failure_leaves_budget_untouched() {
    let (t, host) = tracker(64 * 1024);
    host.fail_next_reservations(1);
    assert_eq!(
        t.alloc(4096, MemoryClass::Device, false),
        Err(MemoryError::AllocationFailed { size: 4096 })
    );
    assert_eq!(t.budget().used, 0);
}

#[test]
fn double_free_is_rejected() {
    let (t, _) = tracker(64 * 1024);
    let a = t.alloc(100, MemoryClass::Shared, true).unwrap();
    t.free(a).unwrap();
    assert_eq!(t.free(a), Err(MemoryError::UnknownHandle(a)));
    assert_eq!(t.budget().used, 0);
}

#[test]
fn copies_round_trip_through_the_driver() {
    let (t, _) = tracker(64 * 1024);
    let a = t.alloc(4096, MemoryClass::Device, false).unwrap();

    let src: Vec<u8> = (0..255).collect();
    t.copy_to_device(a, &src).unwrap();

    let mut dst = vec![0u8; src.len()];
    t.copy_from_device(a, &mut dst).unwrap();
    assert_eq!(dst, src);
}

#[test]
fn copies_to_dead_or_oversized_targets_fail() {
    let (t, _) = tracker(64 * 1024);
    let a = t.alloc(4096, MemoryClass::Device, false).unwrap();

    let too_big = vec![0u8; 4097];
    assert_eq!(
        t.copy_to_device(a, &too_big),
        Err(MemoryError::CopyOutOfBounds {
            len: 4097,
            size: 4096
        })
    );

    t.free(a).unwrap();
    assert_eq!(
        t.copy_to_device(a, &[1, 2, 3]),
        Err(MemoryError::InvalidHandle(a))
    );
    let mut dst = [0u8; 4];
    assert_eq!(
        t.copy_from_device(a, &mut dst),
        Err(MemoryError::InvalidHandle(a))
    );
}

#[test]
fn release_all_force_frees_everything() {
    let (t, host) = tracker(64 * 1024);
    for _ in 0..3 {
        t.alloc(4096, MemoryClass::Device, false).unwrap();
    }
    assert_eq!(host.live_regions(), 3);

    t.release_all();
    assert_eq!(host.live_regions(), 0);
    assert_eq!(t.budget().used, 0);
}
