//! Unit tests for the shared-memory region and framebuffer pool
//!
//! The server side is replaced by recording mocks so growth, recreation and
//! release bookkeeping can be checked without a compositor.

use super::*;
use crate::handler::Size;
use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Debug, Default)]
struct Ledger {
    pools_created: usize,
    pools_destroyed: usize,
    pool_resizes: Vec<usize>,
    buffers_created: Vec<(u32, Size)>,
    buffers_destroyed: Vec<u32>,
    presented: Vec<(u32, Size)>,
    next_buffer: u32,
}

type SharedLedger = Rc<RefCell<Ledger>>;

struct MockAllocator {
    ledger: SharedLedger,
}

struct MockPool {
    ledger: SharedLedger,
}

struct MockBuffer {
    id: u32,
    ledger: SharedLedger,
}

impl PartialEq for MockBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::fmt::Debug for MockBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "wl_buffer@{}", self.id)
    }
}

impl ShmAllocator for MockAllocator {
    type Pool = MockPool;

    fn create_pool(&self, _fd: BorrowedFd<'_>, _len: usize) -> MockPool {
        self.ledger.borrow_mut().pools_created += 1;
        MockPool {
            ledger: self.ledger.clone(),
        }
    }
}

impl PoolProxy for MockPool {
    type Buffer = MockBuffer;

    fn create_buffer(&self, size: Size) -> MockBuffer {
        let mut ledger = self.ledger.borrow_mut();
        ledger.next_buffer += 1;
        let id = ledger.next_buffer;
        ledger.buffers_created.push((id, size));
        MockBuffer {
            id,
            ledger: self.ledger.clone(),
        }
    }

    fn resize(&self, len: usize) {
        self.ledger.borrow_mut().pool_resizes.push(len);
    }

    fn destroy_pool(&self) {
        self.ledger.borrow_mut().pools_destroyed += 1;
    }
}

impl BufferProxy for MockBuffer {
    fn destroy_proxy(&self) {
        self.ledger.borrow_mut().buffers_destroyed.push(self.id);
    }
}

struct MockSurface {
    ledger: SharedLedger,
}

impl CommitTarget<MockBuffer> for MockSurface {
    fn present(&self, buffer: &MockBuffer, damage: Size) {
        self.ledger.borrow_mut().presented.push((buffer.id, damage));
    }
}

fn mock_pool() -> (BufferPool<MockAllocator>, MockSurface, SharedLedger) {
    let ledger = SharedLedger::default();
    let pool = BufferPool::new(MockAllocator {
        ledger: ledger.clone(),
    });
    let surface = MockSurface {
        ledger: ledger.clone(),
    };
    (pool, surface, ledger)
}

fn release(pool: &mut BufferPool<MockAllocator>, ledger: &SharedLedger, proxy_id: u32) -> bool {
    let released = MockBuffer {
        id: proxy_id,
        ledger: ledger.clone(),
    };
    pool.on_released(&released)
}

#[test]
fn test_region_is_sized_exactly() {
    let region = ShmRegion::new(100 * 100 * 4).unwrap();
    assert_eq!(region.len(), 40_000);
    assert_eq!(region.bytes().len(), 40_000);
}

#[test]
fn test_region_rejects_zero_size() {
    assert!(matches!(
        ShmRegion::new(0),
        Err(WindowError::ResourceExhaustion(_))
    ));
}

#[test]
fn test_region_grow_preserves_contents() {
    let mut region = ShmRegion::new(16).unwrap();
    region.bytes_mut().copy_from_slice(&[0xAB; 16]);

    assert!(region.grow(4096).unwrap());
    assert_eq!(region.len(), 4096);
    assert_eq!(&region.bytes()[..16], &[0xAB; 16]);
    assert!(region.bytes()[16..].iter().all(|&b| b == 0));

    // Shrinking requests are ignored
    assert!(!region.grow(32).unwrap());
    assert_eq!(region.len(), 4096);
}

#[cfg(target_os = "linux")]
#[test]
fn test_region_is_sealed_against_shrinking() {
    let region = ShmRegion::new(64).unwrap();
    let seals = region.seals().unwrap();
    assert_ne!(seals & libc::F_SEAL_SHRINK, 0);
    assert_ne!(seals & libc::F_SEAL_SEAL, 0);
    assert_eq!(seals & libc::F_SEAL_GROW, 0);
}

#[cfg(target_os = "linux")]
#[test]
fn test_region_is_sealed_against_exec_when_kernel_allows() {
    let region = ShmRegion::new(64).unwrap();
    let seals = region.seals().unwrap();
    assert_eq!(seals & F_SEAL_EXEC != 0, exec_seal_supported());
    assert_eq!(seals & libc::F_SEAL_WRITE, 0);
}

#[test]
fn test_acquire_submit_release_reuses_same_buffer() {
    let (mut pool, surface, ledger) = mock_pool();
    let size = Size::new(800, 600);

    let buffer = pool.acquire(size).unwrap();
    let id = buffer.id();
    let proxy_id = buffer.proxy().id;
    assert_eq!(pool.stats().created, 1);
    assert_eq!(ledger.borrow().pools_created, 1);

    pool.submit(buffer, &surface);
    assert_eq!(pool.in_flight_ids(), vec![id]);
    assert!(pool.usable_ids().is_empty());

    assert!(release(&mut pool, &ledger, proxy_id));
    assert_eq!(pool.usable_ids(), vec![id]);
    assert_eq!(pool.in_flight_len(), 0);

    let again = pool.acquire(size).unwrap();
    assert_eq!(again.id(), id);
    assert_eq!(pool.stats().created, 1);
    assert_eq!(pool.stats().reused, 1);
    assert_eq!(ledger.borrow().pools_created, 1);
}

#[test]
fn test_release_of_unknown_buffer_is_ignored() {
    let (mut pool, surface, ledger) = mock_pool();
    let buffer = pool.acquire(Size::new(10, 10)).unwrap();
    pool.submit(buffer, &surface);

    assert!(!release(&mut pool, &ledger, 999));
    assert_eq!(pool.in_flight_len(), 1);
    assert_eq!(pool.usable_len(), 0);
    assert_eq!(pool.stats().stale_releases, 1);
}

#[test]
fn test_in_flight_buffer_is_not_handed_out_again() {
    let (mut pool, surface, _ledger) = mock_pool();
    let size = Size::new(32, 32);

    let first = pool.acquire(size).unwrap();
    let first_id = first.id();
    pool.submit(first, &surface);

    let second = pool.acquire(size).unwrap();
    assert_ne!(second.id(), first_id);
    assert_eq!(pool.stats().created, 2);
}

#[test]
fn test_grow_from_small_buffer_grows_and_recreates_once() {
    let (mut pool, surface, ledger) = mock_pool();
    let small = Size::new(100, 100);
    let large = Size::new(800, 600);

    let mut buffer = pool.acquire(small).unwrap();
    assert_eq!(buffer.region_len(), small.byte_len());

    pool.draw(&mut buffer, large, |_, _| {}).unwrap();
    assert_eq!(pool.stats().growths, 1);
    assert_eq!(pool.stats().recreations, 1);
    assert_eq!(ledger.borrow().pool_resizes, vec![large.byte_len()]);
    assert!(buffer.region_len() >= large.byte_len());
    assert_eq!(buffer.extent(), large);

    pool.draw(&mut buffer, large, |_, _| {}).unwrap();
    pool.draw(&mut buffer, large, |_, _| {}).unwrap();
    assert_eq!(pool.stats().growths, 1);
    assert_eq!(pool.stats().recreations, 1);

    pool.submit(buffer, &surface);
    let ledger = ledger.borrow();
    let (_, damage) = ledger.presented.last().copied().unwrap();
    assert_eq!(damage, large);
}

#[test]
fn test_shrinking_recreates_proxy_without_growth() {
    let (mut pool, _surface, ledger) = mock_pool();
    let mut buffer = pool.acquire(Size::new(800, 600)).unwrap();
    let original_proxy = buffer.proxy().id;

    pool.draw(&mut buffer, Size::new(400, 300), |_, _| {}).unwrap();
    assert_eq!(pool.stats().growths, 0);
    assert_eq!(pool.stats().recreations, 1);
    assert_eq!(buffer.region_len(), 800 * 600 * 4);
    assert_ne!(buffer.proxy().id, original_proxy);
    assert!(ledger.borrow().buffers_destroyed.contains(&original_proxy));
}

#[test]
fn test_same_byte_count_different_shape_recreates() {
    let (mut pool, _surface, _ledger) = mock_pool();
    let mut buffer = pool.acquire(Size::new(200, 100)).unwrap();
    pool.draw(&mut buffer, Size::new(100, 200), |_, _| {}).unwrap();
    assert_eq!(pool.stats().growths, 0);
    assert_eq!(pool.stats().recreations, 1);
}

#[test]
fn test_writer_sees_exact_frame_extent() {
    let (mut pool, _surface, _ledger) = mock_pool();
    let size = Size::new(4, 2);
    let mut buffer = pool.acquire(Size::new(8, 8)).unwrap();

    let mut seen = None;
    pool.draw(&mut buffer, size, |pixels, s| {
        seen = Some((pixels.len(), s));
        pixels.fill(0x7F);
    })
    .unwrap();

    assert_eq!(seen, Some((4 * 2 * 4, size)));
    assert!(buffer.pixels().iter().all(|&b| b == 0x7F));
}

#[test]
fn test_zero_size_is_rejected() {
    let (mut pool, _surface, _ledger) = mock_pool();
    assert!(pool.acquire(Size::new(0, 0)).is_err());

    let mut buffer = pool.acquire(Size::new(1, 1)).unwrap();
    assert!(pool.draw(&mut buffer, Size::new(0, 600), |_, _| {}).is_err());
}

#[test]
fn test_oversized_frame_is_resource_exhaustion_before_allocating() {
    let (mut pool, _surface, ledger) = mock_pool();
    for size in [Size::new(32768, 32768), Size::new(i32::MAX / 2, 1)] {
        assert!(matches!(
            pool.acquire(size),
            Err(WindowError::ResourceExhaustion(_))
        ));
    }
    assert_eq!(ledger.borrow().pools_created, 0);
    assert_eq!(pool.stats().created, 0);
}

#[test]
fn test_oversized_draw_leaves_buffer_untouched() {
    let (mut pool, _surface, ledger) = mock_pool();
    let small = Size::new(100, 100);
    let mut buffer = pool.acquire(small).unwrap();

    let mut wrote = false;
    let result = pool.draw(&mut buffer, Size::new(32768, 32768), |_, _| wrote = true);
    assert!(matches!(result, Err(WindowError::ResourceExhaustion(_))));
    assert!(!wrote);
    assert_eq!(buffer.extent(), small);
    assert_eq!(buffer.region_len(), small.byte_len());
    assert!(ledger.borrow().pool_resizes.is_empty());
    assert_eq!(pool.stats().growths, 0);
    assert_eq!(pool.stats().recreations, 0);
}

#[test]
fn test_clear_destroys_all_proxies() {
    let (mut pool, surface, ledger) = mock_pool();
    let a = pool.acquire(Size::new(8, 8)).unwrap();
    let b = pool.acquire(Size::new(8, 8)).unwrap();
    let b_proxy = b.proxy().id;
    pool.submit(a, &surface);
    pool.submit(b, &surface);
    release(&mut pool, &ledger, b_proxy);

    pool.clear();
    let ledger_ref = ledger.borrow();
    assert_eq!(ledger_ref.pools_destroyed, 2);
    assert_eq!(ledger_ref.buffers_destroyed.len(), 2);
    drop(ledger_ref);

    // A late release after teardown is harmless
    assert!(!release(&mut pool, &ledger, b_proxy));
}

#[derive(Debug, Clone)]
enum PoolOp {
    Frame(i32, i32),
    Release(usize),
}

fn pool_op() -> impl Strategy<Value = PoolOp> {
    prop_oneof![
        (1i32..64, 1i32..64).prop_map(|(w, h)| PoolOp::Frame(w, h)),
        (0usize..8).prop_map(PoolOp::Release),
    ]
}

proptest! {
    #[test]
    fn prop_buffers_are_never_in_both_sets(ops in prop::collection::vec(pool_op(), 1..60)) {
        let (mut pool, surface, ledger) = mock_pool();
        let mut released_ids: HashSet<u64> = HashSet::new();
        let mut seen_ids: HashSet<u64> = HashSet::new();
        let mut proxy_of: HashMap<u64, u32> = HashMap::new();

        for op in ops {
            match op {
                PoolOp::Frame(w, h) => {
                    let size = Size::new(w, h);
                    let mut buffer = pool.acquire(size).unwrap();
                    let id = buffer.id();
                    // Fresh, or came back through a release
                    prop_assert!(!seen_ids.contains(&id) || released_ids.remove(&id));
                    seen_ids.insert(id);

                    pool.draw(&mut buffer, size, |_, _| {}).unwrap();
                    prop_assert!(buffer.region_len() >= size.byte_len());
                    proxy_of.insert(id, buffer.proxy().id);
                    pool.submit(buffer, &surface);
                    let last = ledger.borrow().presented.last().copied().unwrap();
                    prop_assert_eq!(last.1, size);
                }
                PoolOp::Release(index) => {
                    let ids = pool.in_flight_ids();
                    if ids.is_empty() {
                        continue;
                    }
                    let target = ids[index % ids.len()];
                    prop_assert!(release(&mut pool, &ledger, proxy_of[&target]));
                    released_ids.insert(target);
                }
            }

            let usable: HashSet<u64> = pool.usable_ids().into_iter().collect();
            let in_flight: HashSet<u64> = pool.in_flight_ids().into_iter().collect();
            prop_assert!(usable.is_disjoint(&in_flight));
        }
    }
}
