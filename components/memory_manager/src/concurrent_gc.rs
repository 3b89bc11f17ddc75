//! Concurrent collection support
//!
//! This module provides the pieces that let collection interleave with the
//! mutator:
//!
//! - **AtomicMarkColor**: Lock-free tri-color mark stored in every GC header.
//!
//! - **MarkStack**: Gray set for the collector, fed by its own scanning and by
//!   the heap's write-barrier buffer.
//!
//! - **GcThread**: Background thread that advances the collector one time
//!   slice at a time while the owning virtual machine is alive.
//!
//! # Tri-Color Marking
//!
//! Values are classified into three colors:
//! - **White**: Not yet visited (potentially garbage)
//! - **Gray**: Visited but children not yet scanned (in the mark stack)
//! - **Black**: Fully processed (definitely reachable)
//!
//! While marking is active every container write shades both the overwritten
//! and the stored value, so no black container ever ends up pointing only at
//! white values. A short stop-the-world remark rescans the roots before
//! sweeping begins.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Weak;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use crossbeam_deque::Worker;
use parking_lot::Mutex;

use core_types::{ErrorCode, HqError, HqResult};

use crate::gc::{GarbageCollector, MarkColor, RootSource, StepMode};
use crate::value::Value;

/// Atomic mark color for thread-safe marking operations.
///
/// Uses atomic operations to allow concurrent reading and writing of mark colors
/// without data races.
#[repr(transparent)]
pub struct AtomicMarkColor(AtomicU8);

impl AtomicMarkColor {
    /// Creates a new atomic mark color with the given initial value.
    pub fn new(color: MarkColor) -> Self {
        AtomicMarkColor(AtomicU8::new(color as u8))
    }

    /// Loads the current mark color with the specified memory ordering.
    pub fn load(&self, ordering: Ordering) -> MarkColor {
        Self::u8_to_color(self.0.load(ordering))
    }

    /// Stores a mark color with the specified memory ordering.
    pub fn store(&self, color: MarkColor, ordering: Ordering) {
        self.0.store(color as u8, ordering);
    }

    /// Atomically compares and exchanges the mark color.
    ///
    /// Returns Ok(old) if the exchange succeeded, Err(actual) if it failed.
    pub fn compare_exchange(
        &self,
        current: MarkColor,
        new: MarkColor,
        success: Ordering,
        failure: Ordering,
    ) -> Result<MarkColor, MarkColor> {
        match self
            .0
            .compare_exchange(current as u8, new as u8, success, failure)
        {
            Ok(v) => Ok(Self::u8_to_color(v)),
            Err(v) => Err(Self::u8_to_color(v)),
        }
    }

    fn u8_to_color(v: u8) -> MarkColor {
        match v {
            1 => MarkColor::Gray,
            2 => MarkColor::Black,
            _ => MarkColor::White,
        }
    }
}

impl std::fmt::Debug for AtomicMarkColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicMarkColor")
            .field(&self.load(Ordering::Relaxed))
            .finish()
    }
}

/// State of the collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GcPhase {
    /// No collection in progress
    #[default]
    Idle,
    /// Moving newly allocated containers into the tracked set
    LinkPending,
    /// Whitening tracked containers; exposed ones become gray roots
    ResetState,
    /// Brief stop-the-world scan of the virtual machine's roots
    MarkRoots,
    /// Time-sliced marking, concurrent with the mutator
    Marking,
    /// Stop-the-world root rescan and final drain
    Remark,
    /// Time-sliced disposal of unreachable, unexposed containers
    Sweeping,
}

impl GcPhase {
    /// Phase name used in trace output.
    pub fn name(self) -> &'static str {
        match self {
            GcPhase::Idle => "idle",
            GcPhase::LinkPending => "link-pending",
            GcPhase::ResetState => "reset-state",
            GcPhase::MarkRoots => "mark-roots",
            GcPhase::Marking => "marking",
            GcPhase::Remark => "remark",
            GcPhase::Sweeping => "sweeping",
        }
    }
}

/// Gray set owned by the collector.
///
/// Entries hold a strong reference, keeping gray values alive until they
/// are scanned.
pub struct MarkStack {
    local: Worker<Value>,
}

impl MarkStack {
    /// Creates a new empty mark stack.
    pub fn new() -> Self {
        MarkStack {
            local: Worker::new_lifo(),
        }
    }

    /// Pushes a gray value.
    pub fn push(&self, value: Value) {
        self.local.push(value);
    }

    /// Pops the next value to scan.
    pub fn pop(&self) -> Option<Value> {
        self.local.pop()
    }

    /// Returns the number of gray values waiting.
    pub fn len(&self) -> usize {
        self.local.len()
    }

    /// Returns true if the mark stack is empty.
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Clears the mark stack.
    pub fn clear(&self) {
        while self.pop().is_some() {}
    }
}

impl Default for MarkStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of a collector that a [`GcThread`] can drive.
pub trait GcHost: RootSource + Send + Sync + 'static {
    /// The collector to advance.
    fn collector(&self) -> &GarbageCollector;
}

/// Message types for the collector thread.
enum ThreadMessage {
    /// Stop the collector thread
    Stop,
}

/// Background thread that performs one collector time slice per wait period.
///
/// The thread holds only a weak reference to its host, so it never keeps a
/// virtual machine alive. It exits when stopped or when the host is gone.
pub struct GcThread {
    sender: Mutex<Option<Sender<ThreadMessage>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl GcThread {
    /// Spawns the collector thread.
    pub fn spawn<H: GcHost>(host: Weak<H>, stack_size: usize, wait: Duration) -> HqResult<Self> {
        let (sender, receiver) = channel::unbounded::<ThreadMessage>();

        let handle = thread::Builder::new()
            .name("gc-marker".into())
            .stack_size(stack_size)
            .spawn(move || {
                log::debug!("gc thread started");
                loop {
                    match receiver.recv_timeout(wait) {
                        Ok(ThreadMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    let Some(host) = host.upgrade() else {
                        break;
                    };
                    host.collector().step(&*host, StepMode::Slice);
                }
                log::debug!("gc thread stopped");
            })
            .map_err(|err| {
                HqError::new(
                    ErrorCode::UnspecifiedFailure,
                    format!("failed to spawn gc thread: {}", err),
                )
            })?;

        let thread_id = handle.thread().id();
        Ok(GcThread {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    /// Whether the thread has not been stopped yet.
    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Stops the thread and waits for it to exit.
    ///
    /// When called from the collector thread itself (the host was dropped
    /// there) the thread is signalled but not joined.
    pub fn stop_thread(&self) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(ThreadMessage::Stop);
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if thread::current().id() != self.thread_id {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for GcThread {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

impl std::fmt::Debug for GcThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcThread")
            .field("running", &self.is_running())
            .finish()
    }
}
