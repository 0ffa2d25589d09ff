//! Coalescing of document writes.
//!
//! Mutations hand a snapshot of the whole document to the coordinator. A
//! single pending slot keeps only the latest snapshot; a background worker
//! writes it once the quiet window has passed without new requests. Callers
//! that need durability before continuing use [`DebounceCoordinator::write_now`].

use crate::domain::Document;
use crate::error::Result;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(300);

/// Destination of coalesced writes
pub trait DocumentSink: Send + Sync {
    fn write_document(&self, document: &Document) -> Result<()>;
}

impl DocumentSink for super::store::DocumentStore {
    fn write_document(&self, document: &Document) -> Result<()> {
        self.write(document)
    }
}

struct Pending {
    keys: BTreeSet<String>,
    document: Document,
    generation: u64,
}

#[derive(Default)]
struct State {
    pending: Option<Pending>,
    /// When the pending request fires; `None` parks it until the next
    /// schedule or flush
    deadline: Option<Instant>,
    in_flight: bool,
    shutdown: bool,
    /// Bumped by every request so stale failures never overwrite newer data
    generation: u64,
    writes: u64,
    last_error: Option<crate::error::TodoError>,
}

impl State {
    fn is_busy(&self) -> bool {
        self.in_flight || (self.pending.is_some() && self.deadline.is_some())
    }

    fn record(&mut self, pending: Pending, result: Result<()>) {
        match result {
            Ok(()) => {
                self.writes += 1;
                self.last_error = None;
            }
            Err(e) => {
                tracing::warn!(keys = ?pending.keys, error = %e, "debounced write failed, keeping changes pending");
                if self.generation == pending.generation {
                    self.pending = Some(pending);
                    self.deadline = None;
                }
                self.last_error = Some(e);
            }
        }
    }
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
    /// Held for the duration of every physical write
    gate: Mutex<()>,
    sink: Arc<dyn DocumentSink>,
    window: Duration,
}

impl Shared {
    fn write(&self, pending: &Pending) -> Result<()> {
        let _gate = self.gate.lock();
        tracing::debug!(keys = ?pending.keys, todos = pending.document.todos.len(), "writing document");
        self.sink.write_document(&pending.document)
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        match (state.pending.is_some(), state.deadline) {
            (true, Some(deadline)) if Instant::now() >= deadline => {
                let Some(pending) = state.pending.take() else {
                    continue;
                };
                state.deadline = None;
                state.in_flight = true;
                let result = MutexGuard::unlocked(&mut state, || shared.write(&pending));
                state.in_flight = false;
                state.record(pending, result);
                shared.cond.notify_all();
            }
            (true, Some(deadline)) => {
                shared.cond.wait_until(&mut state, deadline);
            }
            _ => shared.cond.wait(&mut state),
        }
    }

    // Final attempt so nothing scheduled is lost on shutdown
    if let Some(pending) = state.pending.take() {
        state.in_flight = true;
        let result = MutexGuard::unlocked(&mut state, || shared.write(&pending));
        state.in_flight = false;
        state.record(pending, result);
    }
    shared.cond.notify_all();
    tracing::trace!("write worker stopped");
}

/// Single-slot write coalescer backed by one worker thread
pub struct DebounceCoordinator {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl DebounceCoordinator {
    pub fn new(sink: Arc<dyn DocumentSink>, window: Duration) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
            gate: Mutex::new(()),
            sink,
            window,
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("todo-writer".to_string())
            .spawn(move || worker_loop(worker_shared))?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Queue `document` for writing after the quiet window. Replaces any
    /// pending snapshot and restarts the window.
    pub fn schedule(&self, key: impl Into<String>, document: Document) {
        let key = key.into();
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        state.generation += 1;
        let generation = state.generation;
        match state.pending.as_mut() {
            Some(pending) => {
                pending.keys.insert(key);
                pending.document = document;
                pending.generation = generation;
                tracing::trace!(keys = ?pending.keys, "coalesced write request");
            }
            None => {
                state.pending = Some(Pending {
                    keys: BTreeSet::from([key]),
                    document,
                    generation,
                });
            }
        }
        state.deadline = Some(Instant::now() + self.shared.window);
        self.shared.cond.notify_all();
    }

    /// Write `document` on the calling thread, superseding anything pending
    pub fn write_now(&self, key: impl Into<String>, document: Document) -> Result<()> {
        let key = key.into();
        let generation = {
            let mut state = self.shared.state.lock();
            if let Some(superseded) = state.pending.take() {
                tracing::debug!(keys = ?superseded.keys, by = %key, "pending write superseded");
            }
            state.deadline = None;
            state.generation += 1;
            state.generation
        };

        let pending = Pending {
            keys: BTreeSet::from([key]),
            document,
            generation,
        };
        let result = self.shared.write(&pending);

        let mut state = self.shared.state.lock();
        let outcome = match result {
            Ok(()) => {
                state.writes += 1;
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                if state.generation == generation {
                    state.pending = Some(pending);
                    state.deadline = None;
                }
                Err(e)
            }
        };
        self.shared.cond.notify_all();
        outcome
    }

    /// Write anything pending now and wait until idle. Returns the error of
    /// the last failed write, if it has not been reported yet.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.pending.is_some() {
            state.deadline = Some(Instant::now());
            self.shared.cond.notify_all();
        }
        while state.is_busy() {
            self.shared.cond.wait(&mut state);
        }
        match state.last_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether a write is waiting (armed or parked after a failure)
    pub fn has_pending(&self) -> bool {
        self.shared.state.lock().pending.is_some()
    }

    /// Physical writes completed so far
    pub fn writes(&self) -> u64 {
        self.shared.state.lock().writes
    }
}

impl Drop for DebounceCoordinator {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.cond.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("write worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Todo;
    use crate::error::TodoError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<usize>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        fail: AtomicBool,
        delay: Mutex<Duration>,
    }

    impl DocumentSink for RecordingSink {
        fn write_document(&self, document: &Document) -> Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            thread::sleep(*self.delay.lock());
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(TodoError::io(
                    "data.json",
                    io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
                ));
            }
            self.writes.lock().push(document.todos.len());
            Ok(())
        }
    }

    fn doc(n: usize) -> Document {
        let mut doc = Document::default();
        for i in 0..n {
            doc.todos.push(Todo::new(format!("todo {}", i), None, i as u32));
        }
        doc
    }

    fn coordinator(window_ms: u64) -> (Arc<RecordingSink>, DebounceCoordinator) {
        let sink = Arc::new(RecordingSink::default());
        let coordinator =
            DebounceCoordinator::new(sink.clone(), Duration::from_millis(window_ms)).unwrap();
        (sink, coordinator)
    }

    #[test]
    fn test_rapid_requests_coalesce_into_one_write() {
        let (sink, coordinator) = coordinator(100);
        for n in 1..=20 {
            coordinator.schedule(format!("edit-{}", n), doc(n));
        }
        coordinator.flush().unwrap();
        assert_eq!(*sink.writes.lock(), vec![20]);
        assert_eq!(coordinator.writes(), 1);
        assert!(!coordinator.has_pending());
    }

    #[test]
    fn test_write_happens_after_quiet_window() {
        let (sink, coordinator) = coordinator(30);
        coordinator.schedule("create", doc(1));
        assert!(sink.writes.lock().is_empty());
        thread::sleep(Duration::from_millis(300));
        assert_eq!(*sink.writes.lock(), vec![1]);
    }

    #[test]
    fn test_write_now_supersedes_pending() {
        let (sink, coordinator) = coordinator(10_000);
        coordinator.schedule("create", doc(1));
        coordinator.write_now("reorder", doc(2)).unwrap();
        coordinator.flush().unwrap();
        assert_eq!(*sink.writes.lock(), vec![2]);
    }

    #[test]
    fn test_only_one_write_in_flight() {
        let (sink, coordinator) = coordinator(1);
        *sink.delay.lock() = Duration::from_millis(20);
        let coordinator = Arc::new(coordinator);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let c = Arc::clone(&coordinator);
                thread::spawn(move || {
                    for n in 0..5 {
                        if n % 2 == 0 {
                            c.schedule("bg", doc(i * 10 + n));
                        } else {
                            c.write_now("fg", doc(i * 10 + n)).unwrap();
                        }
                        thread::sleep(Duration::from_millis(3));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        coordinator.flush().unwrap();
        assert_eq!(sink.max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_write_is_kept_and_retried_on_flush() {
        let (sink, coordinator) = coordinator(5);
        sink.fail.store(true, Ordering::SeqCst);
        coordinator.schedule("create", doc(3));
        assert!(coordinator.flush().is_err());
        assert!(coordinator.has_pending());
        // still failing: retried and reported again
        assert!(coordinator.flush().is_err());

        sink.fail.store(false, Ordering::SeqCst);
        coordinator.flush().unwrap();
        assert_eq!(*sink.writes.lock(), vec![3]);
        assert!(!coordinator.has_pending());
    }

    #[test]
    fn test_failed_write_now_stays_pending() {
        let (sink, coordinator) = coordinator(10_000);
        sink.fail.store(true, Ordering::SeqCst);
        assert!(coordinator.write_now("save", doc(4)).is_err());
        assert!(coordinator.has_pending());

        sink.fail.store(false, Ordering::SeqCst);
        coordinator.flush().unwrap();
        assert_eq!(*sink.writes.lock(), vec![4]);
    }

    #[test]
    fn test_drop_writes_pending_snapshot() {
        let (sink, coordinator) = coordinator(60_000);
        coordinator.schedule("create", doc(5));
        drop(coordinator);
        assert_eq!(*sink.writes.lock(), vec![5]);
    }
}
