//! Heap identity, allocation registry and write barrier.
//!
//! A [`Heap`] is the allocation domain of one virtual machine. Container
//! values (arrays and objects) register themselves here on creation so the
//! collector can find them; scalars are reclaimed by reference counting
//! alone.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crossbeam::queue::SegQueue;
use crossbeam_deque::{Injector, Steal};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::gc::MarkColor;
use crate::value::{Value, ValueNode};

static NEXT_HEAP_ID: AtomicU64 = AtomicU64::new(1);

/// State shared by every value allocated from one heap.
pub(crate) struct HeapShared {
    id: u64,
    /// Containers created since the collector last linked them
    pending: SegQueue<Weak<ValueNode>>,
    /// Values shaded by mutators while marking is active
    barrier: Injector<Value>,
    /// Whether the write barrier is armed
    marking: AtomicBool,
    /// Mutators hold this shared; the collector takes it exclusively
    mutator_lock: RwLock<()>,
    containers_allocated: AtomicUsize,
}

impl HeapShared {
    /// Shades a value written or overwritten while marking is active.
    pub(crate) fn shade(&self, value: &Value) {
        if value.is_container() && value.node().header.try_shade() {
            self.barrier.push(value.clone());
        }
    }

    /// Queues a newly exposed value for scanning during an active cycle.
    ///
    /// Unlike [`HeapShared::shade`] this pushes regardless of the current
    /// color, since the value may not have been reset yet.
    pub(crate) fn expose_barrier(&self, value: &Value) {
        if value.is_container() && self.marking.load(Ordering::SeqCst) {
            value.node().header.try_shade();
            self.barrier.push(value.clone());
        }
    }

    /// Write barrier for container slot updates.
    ///
    /// Callers hold the mutator lock so the marking flag cannot change
    /// underneath them.
    pub(crate) fn write_barrier(&self, old: &Value, new: &Value) {
        if self.is_marking() {
            self.shade(old);
            self.shade(new);
        }
    }

    pub(crate) fn is_marking(&self) -> bool {
        self.marking.load(Ordering::SeqCst)
    }

    pub(crate) fn register(&self, node: &Arc<ValueNode>) {
        self.pending.push(Arc::downgrade(node));
        self.containers_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn mutator_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.mutator_lock.read_recursive()
    }
}

/// Allocation domain of one virtual machine.
///
/// Cloning a `Heap` yields another handle to the same domain.
#[derive(Clone)]
pub struct Heap {
    pub(crate) shared: Arc<HeapShared>,
}

impl Heap {
    /// Creates a new, empty heap.
    pub fn new() -> Self {
        Heap {
            shared: Arc::new(HeapShared {
                id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
                pending: SegQueue::new(),
                barrier: Injector::new(),
                marking: AtomicBool::new(false),
                mutator_lock: RwLock::new(()),
                containers_allocated: AtomicUsize::new(0),
            }),
        }
    }

    /// Unique identifier of this heap.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Whether two handles refer to the same heap.
    pub fn same_heap(&self, other: &Heap) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Whether `value` may be stored into this heap's registers and containers.
    ///
    /// Heap-free values (see [`Value::null`]) belong to every heap.
    pub fn owns(&self, value: &Value) -> bool {
        match value.heap_shared() {
            Some(shared) => Arc::ptr_eq(shared, &self.shared),
            None => true,
        }
    }

    /// Held by mutators while they touch script-visible state.
    ///
    /// Re-entrant on the same thread, so native functions that call back
    /// into the runtime do not deadlock against a waiting collector.
    pub fn mutator_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.shared.mutator_guard()
    }

    /// Stops all mutators. Used by the collector for its atomic phases.
    pub(crate) fn exclusive_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.shared.mutator_lock.write()
    }

    /// Whether the write barrier is currently armed.
    ///
    /// The barrier stays armed from the start of a cycle until the end of
    /// remark.
    pub fn is_marking(&self) -> bool {
        self.shared.is_marking()
    }

    pub(crate) fn set_marking(&self, marking: bool) {
        self.shared.marking.store(marking, Ordering::SeqCst);
    }

    /// Total number of containers ever allocated from this heap.
    pub fn containers_allocated(&self) -> usize {
        self.shared.containers_allocated.load(Ordering::Relaxed)
    }

    /// Moves newly registered containers into `tracked`.
    pub(crate) fn drain_pending(&self, tracked: &mut Vec<Weak<ValueNode>>) -> usize {
        let mut moved = 0;
        while let Some(node) = self.shared.pending.pop() {
            tracked.push(node);
            moved += 1;
        }
        moved
    }

    /// Takes one value shaded by the write barrier.
    pub(crate) fn steal_barrier(&self) -> Option<Value> {
        loop {
            match self.shared.barrier.steal() {
                Steal::Success(value) => return Some(value),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    /// Whether the barrier buffer holds no shaded values.
    pub(crate) fn barrier_is_empty(&self) -> bool {
        self.shared.barrier.is_empty()
    }

    /// Discards barrier contents and disarms it.
    pub(crate) fn clear_barrier(&self) {
        self.set_marking(false);
        while let Some(value) = self.steal_barrier() {
            value.node().header.set_color(MarkColor::White);
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("id", &self.id())
            .field("marking", &self.is_marking())
            .field("containers_allocated", &self.containers_allocated())
            .finish()
    }
}

/// Anything that can hand out the heap values are allocated from.
///
/// Implemented by [`Heap`] itself and by the virtual machine, so value
/// factories accept either.
pub trait AsHeap {
    /// The heap new values are allocated from.
    fn as_heap(&self) -> &Heap;
}

impl AsHeap for Heap {
    fn as_heap(&self) -> &Heap {
        self
    }
}

impl<T: AsHeap + ?Sized> AsHeap for &T {
    fn as_heap(&self) -> &Heap {
        (**self).as_heap()
    }
}
