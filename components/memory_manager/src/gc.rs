//! Incremental mark-and-sweep collector for container values.
//!
//! Reference counting reclaims acyclic garbage on its own. This collector
//! exists for cycles: it periodically traces from the virtual machine's roots
//! and from exposed values, then empties every tracked container it did not
//! reach. Emptying a container drops its references, which lets reference
//! counting free the rest of the cycle.
//!
//! A cycle walks through the phases of [`GcPhase`]. Every phase except
//! `MarkRoots` and `Remark` is time-sliced and runs concurrently with the
//! mutator; those two briefly take the heap's mutator lock exclusively.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use std::time::{Duration, Instant};

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;

use core_types::constants::{GC_DEFAULT_TIME_SLICE_MS, GC_DEFAULT_TIME_WAIT_MS};

use crate::concurrent_gc::{AtomicMarkColor, GcPhase, MarkStack};
use crate::heap::Heap;
use crate::value::{Value, ValueNode};

/// Deadline checks happen once per this many units of work.
const WORK_PER_DEADLINE_CHECK: usize = 64;

/// Mark colors for tri-color marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MarkColor {
    /// Unmarked (not yet visited)
    White = 0,
    /// In process (reachable, needs scanning)
    Gray = 1,
    /// Fully processed (reachable, all references scanned)
    Black = 2,
}

/// GC metadata carried by every value.
pub(crate) struct GcHeader {
    color: AtomicMarkColor,
    exposed: AtomicBool,
}

impl GcHeader {
    pub(crate) fn new() -> Self {
        GcHeader {
            color: AtomicMarkColor::new(MarkColor::White),
            exposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn color(&self) -> MarkColor {
        self.color.load(Ordering::Acquire)
    }

    pub(crate) fn set_color(&self, color: MarkColor) {
        self.color.store(color, Ordering::Release);
    }

    /// White to gray. Returns true for the caller that won the transition.
    pub(crate) fn try_shade(&self) -> bool {
        self.color
            .compare_exchange(
                MarkColor::White,
                MarkColor::Gray,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn is_exposed(&self) -> bool {
        self.exposed.load(Ordering::SeqCst)
    }

    pub(crate) fn set_exposed(&self, exposed: bool) {
        self.exposed.store(exposed, Ordering::SeqCst);
    }
}

/// Supplies the values directly reachable from the mutator.
///
/// Implementors must report every value the mutator can read without going
/// through another container: globals, constants, registers, frame locals
/// and operand stacks.
pub trait RootSource {
    /// Calls `visit` once per root value.
    fn visit_roots(&self, visit: &mut dyn FnMut(&Value));
}

/// How much work one call to [`GarbageCollector::step`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepMode {
    /// Work until the configured time slice expires or a cycle completes
    Slice,
    /// Finish any cycle in progress, then run one complete cycle
    Full,
}

/// Collector timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcConfig {
    /// Maximum duration of one incremental step
    pub time_slice: Duration,
    /// Idle time between background steps
    pub time_wait: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            time_slice: Duration::from_millis(u64::from(GC_DEFAULT_TIME_SLICE_MS)),
            time_wait: Duration::from_millis(u64::from(GC_DEFAULT_TIME_WAIT_MS)),
        }
    }
}

/// Collector statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Completed cycles
    pub cycles_completed: u64,
    /// Calls to `step`
    pub steps: u64,
    /// Containers in the tracked set at the end of the last cycle
    pub tracked: usize,
    /// Containers emptied by the last cycle
    pub freed_last_cycle: usize,
    /// Containers emptied since creation
    pub freed_total: u64,
    /// Wall time of the last cycle, from link to end of sweep
    pub last_cycle_time: Duration,
}

struct CollectorState {
    tracked: Vec<Weak<ValueNode>>,
    cursor: usize,
    mark_stack: MarkStack,
    freed_this_cycle: usize,
    cycle_started: Option<Instant>,
}

/// Incremental, time-sliced collector for one heap.
pub struct GarbageCollector {
    heap: Heap,
    config: GcConfig,
    phase: AtomicCell<GcPhase>,
    state: Mutex<CollectorState>,
    stats: Mutex<GcStats>,
}

impl GarbageCollector {
    /// Creates an idle collector for `heap`.
    pub fn new(heap: Heap, config: GcConfig) -> Self {
        GarbageCollector {
            heap,
            config,
            phase: AtomicCell::new(GcPhase::Idle),
            state: Mutex::new(CollectorState {
                tracked: Vec::new(),
                cursor: 0,
                mark_stack: MarkStack::new(),
                freed_this_cycle: 0,
                cycle_started: None,
            }),
            stats: Mutex::new(GcStats::default()),
        }
    }

    /// The heap being collected.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Timing configuration.
    pub fn config(&self) -> GcConfig {
        self.config
    }

    /// The current phase.
    pub fn phase(&self) -> GcPhase {
        self.phase.load()
    }

    /// A snapshot of the statistics.
    pub fn stats(&self) -> GcStats {
        self.stats.lock().clone()
    }

    /// Advances collection. Returns true if a cycle completed during the call.
    ///
    /// Must not be called by a thread that currently holds the heap's
    /// mutator guard.
    pub fn step(&self, roots: &dyn RootSource, mode: StepMode) -> bool {
        let mut state = self.state.lock();
        self.stats.lock().steps += 1;

        match mode {
            StepMode::Slice => {
                let deadline = Instant::now() + self.config.time_slice;
                self.advance(&mut state, roots, Some(deadline))
            }
            StepMode::Full => {
                if self.phase() != GcPhase::Idle {
                    self.advance(&mut state, roots, None);
                }
                self.advance(&mut state, roots, None)
            }
        }
    }

    /// Runs one complete cycle.
    pub fn collect(&self, roots: &dyn RootSource) {
        self.step(roots, StepMode::Full);
    }

    /// Empties every container still tracked and returns to idle.
    ///
    /// Used when the owning virtual machine is disposed; values the host
    /// still holds afterwards are valid but their containers are empty.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        self.heap.clear_barrier();
        state.mark_stack.clear();
        self.heap.drain_pending(&mut state.tracked);

        let tracked = std::mem::take(&mut state.tracked);
        let mut disposed = 0usize;
        for node in tracked.iter().filter_map(Weak::upgrade) {
            drop(node.dispose());
            disposed += 1;
        }
        state.cursor = 0;
        state.cycle_started = None;
        self.phase.store(GcPhase::Idle);
        log::debug!("gc shutdown: emptied {} containers", disposed);
    }

    fn set_phase(&self, next: GcPhase) {
        let previous = self.phase.swap(next);
        log::trace!("gc phase {} -> {}", previous.name(), next.name());
    }

    fn advance(
        &self,
        state: &mut CollectorState,
        roots: &dyn RootSource,
        deadline: Option<Instant>,
    ) -> bool {
        loop {
            let next = match self.phase() {
                GcPhase::Idle => {
                    state.cycle_started = Some(Instant::now());
                    state.freed_this_cycle = 0;
                    GcPhase::LinkPending
                }
                GcPhase::LinkPending => {
                    self.heap.set_marking(true);
                    self.heap.drain_pending(&mut state.tracked);
                    state.cursor = 0;
                    GcPhase::ResetState
                }
                GcPhase::ResetState => {
                    if !self.reset_state(state, deadline) {
                        return false;
                    }
                    GcPhase::MarkRoots
                }
                GcPhase::MarkRoots => {
                    let _exclusive = self.heap.exclusive_guard();
                    let linked_from = state.tracked.len();
                    self.heap.drain_pending(&mut state.tracked);
                    for index in linked_from..state.tracked.len() {
                        if let Some(node) = state.tracked[index].upgrade() {
                            Self::reset_node(node, &state.mark_stack);
                        }
                    }
                    Self::scan_roots(roots, &state.mark_stack);
                    GcPhase::Marking
                }
                GcPhase::Marking => {
                    if !self.mark(state, deadline) {
                        return false;
                    }
                    GcPhase::Remark
                }
                GcPhase::Remark => {
                    let _exclusive = self.heap.exclusive_guard();
                    Self::scan_roots(roots, &state.mark_stack);
                    self.mark(state, None);
                    self.heap.set_marking(false);
                    state.cursor = 0;
                    GcPhase::Sweeping
                }
                GcPhase::Sweeping => {
                    if !self.sweep(state, deadline) {
                        return false;
                    }
                    self.finish_cycle(state);
                    self.set_phase(GcPhase::Idle);
                    return true;
                }
            };
            self.set_phase(next);
        }
    }

    fn reset_node(node: std::sync::Arc<ValueNode>, stack: &MarkStack) {
        node.header.set_color(MarkColor::White);
        if node.header.is_exposed() && node.header.try_shade() {
            stack.push(Value::from_node(node));
        }
    }

    fn reset_state(&self, state: &mut CollectorState, deadline: Option<Instant>) -> bool {
        let mut work = 0usize;
        while state.cursor < state.tracked.len() {
            work += 1;
            if work % WORK_PER_DEADLINE_CHECK == 0 && expired(deadline) {
                return false;
            }
            let index = state.cursor;
            match state.tracked[index].upgrade() {
                None => {
                    state.tracked.swap_remove(index);
                }
                Some(node) => {
                    Self::reset_node(node, &state.mark_stack);
                    state.cursor += 1;
                }
            }
        }
        true
    }

    fn scan_roots(roots: &dyn RootSource, stack: &MarkStack) {
        roots.visit_roots(&mut |value| {
            if value.is_container() && value.node().header.try_shade() {
                stack.push(value.clone());
            }
        });
    }

    /// Drains the gray set. Returns false if the deadline expired first.
    fn mark(&self, state: &mut CollectorState, deadline: Option<Instant>) -> bool {
        let mut work = 0usize;
        loop {
            while let Some(shaded) = self.heap.steal_barrier() {
                state.mark_stack.push(shaded);
            }
            let Some(gray) = state.mark_stack.pop() else {
                if self.heap.barrier_is_empty() {
                    return true;
                }
                continue;
            };

            if gray.node().header.color() == MarkColor::Black {
                continue;
            }
            gray.node().header.set_color(MarkColor::Black);
            gray.node().for_each_child(&mut |child| {
                if child.is_container() && child.node().header.try_shade() {
                    state.mark_stack.push(child.clone());
                }
            });

            work += 1;
            if work % WORK_PER_DEADLINE_CHECK == 0 && expired(deadline) {
                return false;
            }
        }
    }

    fn sweep(&self, state: &mut CollectorState, deadline: Option<Instant>) -> bool {
        let mut work = 0usize;
        while state.cursor < state.tracked.len() {
            work += 1;
            if work % WORK_PER_DEADLINE_CHECK == 0 && expired(deadline) {
                return false;
            }
            let index = state.cursor;
            match state.tracked[index].upgrade() {
                None => {
                    state.tracked.swap_remove(index);
                }
                Some(node) => {
                    if node.header.color() == MarkColor::White && !node.header.is_exposed() {
                        state.tracked.swap_remove(index);
                        let contents = node.dispose();
                        drop(node);
                        drop(contents);
                        state.freed_this_cycle += 1;
                    } else {
                        state.cursor += 1;
                    }
                }
            }
        }
        true
    }

    fn finish_cycle(&self, state: &mut CollectorState) {
        let elapsed = state
            .cycle_started
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();

        let mut stats = self.stats.lock();
        stats.cycles_completed += 1;
        stats.tracked = state.tracked.len();
        stats.freed_last_cycle = state.freed_this_cycle;
        stats.freed_total += state.freed_this_cycle as u64;
        stats.last_cycle_time = elapsed;

        log::debug!(
            "gc cycle {} complete: {} tracked, {} freed in {:?}",
            stats.cycles_completed,
            stats.tracked,
            stats.freed_last_cycle,
            elapsed
        );
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("phase", &self.phase())
            .field("config", &self.config)
            .finish()
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}
