//! FIFO event dispatch with a single consumer worker.
//!
//! This crate decouples an event producer from the callback that consumes
//! events. Events are pushed onto an unbounded FIFO queue and drained by one
//! dedicated worker thread, which invokes a registered callback exactly once
//! per event, in submission order. A panicking callback is caught and logged;
//! it never terminates the worker.
//!
//! Because there is only one consumer, callback executions never overlap.
//! State mutated inside the callback is effectively single-threaded even when
//! events are produced concurrently with other activity.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use event_dispatch::DispatchQueue;
//!
//! let queue = DispatchQueue::new(Duration::from_millis(500), |event: u32| {
//!     println!("got {event}");
//! });
//! queue.execute(1);
//! queue.execute(2);
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

/// Default poll interval for both workers.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Producer-side handle for a [`DispatchQueue`].
///
/// Cheap to clone; every handle feeds the same FIFO.
#[derive(Clone)]
pub struct DispatchHandle<T> {
    tx: mpsc::Sender<T>,
}

impl<T: Send + 'static> DispatchHandle<T> {
    /// Enqueue an event for the dispatch worker.
    ///
    /// Returns `false` if the queue has been stopped and the event was
    /// dropped.
    pub fn execute(&self, event: T) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Unbounded FIFO queue drained by a single worker thread.
///
/// The worker blocks on the queue with a bounded timeout so it can observe
/// the stop flag periodically; the timeout is a poll interval, not a
/// correctness boundary. Workers run for the lifetime of the process unless
/// [`stop`](DispatchQueue::stop) is called; dropping the queue also stops the
/// worker.
pub struct DispatchQueue<T> {
    tx: mpsc::Sender<T>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> DispatchQueue<T> {
    /// Create a queue and start its worker thread.
    ///
    /// `callback` is invoked once per event, in submission order. A panic in
    /// the callback is caught and logged; subsequent events still run.
    pub fn new<F>(poll_interval: Duration, callback: F) -> Self
    where
        F: Fn(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<T>();
        let running = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&running);
        let worker = std::thread::Builder::new()
            .name("event-handler".into())
            .spawn(move || {
                while flag.load(Ordering::Relaxed) {
                    match rx.recv_timeout(poll_interval) {
                        Ok(event) => {
                            let outcome = catch_unwind(AssertUnwindSafe(|| callback(event)));
                            if outcome.is_err() {
                                warn!("event callback panicked; continuing with next event");
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("dispatch worker stopped");
            })
            .ok();

        if worker.is_none() {
            warn!("failed to spawn dispatch worker thread");
        }

        Self {
            tx,
            running,
            worker,
        }
    }

    /// Enqueue an event for the worker.
    ///
    /// Returns `false` if the worker is gone and the event was dropped.
    pub fn execute(&self, event: T) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Get a cloneable producer handle.
    pub fn handle(&self) -> DispatchHandle<T> {
        DispatchHandle {
            tx: self.tx.clone(),
        }
    }

    /// Cooperatively stop the worker and wait for it to finish.
    ///
    /// Events already queued when `stop` is called may be dropped; the
    /// ordering guarantee only covers events the callback actually receives.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl<T> Drop for DispatchQueue<T> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Receiver worker that pumps events from a blocking source into a queue.
///
/// The pump loops forever, calling `poll` with a bounded timeout. `None`
/// means the timeout elapsed without an event and the pump simply loops
/// again; `Some(event)` is enqueued on the dispatch queue. The pump stops
/// when [`stop`](EventPump::stop) is called, when it is dropped, or when the
/// queue it feeds is gone.
pub struct EventPump {
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl EventPump {
    /// Start a pump thread feeding `queue` from `poll`.
    pub fn start<T, F>(poll_interval: Duration, mut poll: F, queue: DispatchHandle<T>) -> Self
    where
        T: Send + 'static,
        F: FnMut(Duration) -> Option<T> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&running);
        let worker = std::thread::Builder::new()
            .name("event-receiver".into())
            .spawn(move || {
                while flag.load(Ordering::Relaxed) {
                    if let Some(event) = poll(poll_interval) {
                        if !queue.execute(event) {
                            debug!("dispatch queue closed; receiver stopping");
                            break;
                        }
                    }
                }
                debug!("receiver worker stopped");
            })
            .ok();

        if worker.is_none() {
            warn!("failed to spawn receiver worker thread");
        }

        Self { running, worker }
    }

    /// Cooperatively stop the pump and wait for it to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    const FAST_POLL: Duration = Duration::from_millis(20);

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn delivers_events_in_submission_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let queue = DispatchQueue::new(FAST_POLL, move |event: u32| {
            sink.lock().unwrap().push(event);
        });

        for i in 0..100 {
            assert!(queue.execute(i));
        }

        assert!(wait_until(Duration::from_secs(2), || {
            seen.lock().unwrap().len() == 100
        }));
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn panicking_callback_does_not_stop_later_deliveries() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let queue = DispatchQueue::new(FAST_POLL, move |event: u32| {
            if event % 2 == 0 {
                panic!("bad event {event}");
            }
            sink.lock().unwrap().push(event);
        });

        for i in 0..10 {
            queue.execute(i);
        }

        assert!(wait_until(Duration::from_secs(2), || {
            seen.lock().unwrap().len() == 5
        }));
        assert_eq!(*seen.lock().unwrap(), vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn stop_joins_the_worker() {
        let mut queue = DispatchQueue::new(FAST_POLL, |_: u32| {});
        queue.execute(1);
        queue.stop();
        // Worker is gone; handles observe the closed queue eventually.
        // (The sender kept by the queue itself stays alive, so execute may
        // still succeed; stopping twice must be safe.)
        queue.stop();
    }

    #[test]
    fn pump_forwards_polled_events() {
        let source = Arc::new(Mutex::new(VecDeque::from([10u32, 20, 30])));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let queue = DispatchQueue::new(FAST_POLL, move |event: u32| {
            sink.lock().unwrap().push(event);
        });

        let feed = Arc::clone(&source);
        let mut pump = EventPump::start(
            FAST_POLL,
            move |timeout| {
                let next = feed.lock().unwrap().pop_front();
                if next.is_none() {
                    // Emulate the bounded blocking read of a real source.
                    std::thread::sleep(timeout);
                }
                next
            },
            queue.handle(),
        );

        assert!(wait_until(Duration::from_secs(2), || {
            seen.lock().unwrap().len() == 3
        }));
        assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30]);
        pump.stop();
    }

    #[test]
    fn pump_stops_when_queue_is_dropped() {
        let queue = DispatchQueue::new(FAST_POLL, |_: u32| {});
        let handle = queue.handle();
        drop(queue);

        let mut pump = EventPump::start(FAST_POLL, move |_| Some(7u32), handle);
        // The pump notices the closed queue on its next enqueue and exits on
        // its own; stop() must still return promptly afterwards.
        std::thread::sleep(Duration::from_millis(100));
        pump.stop();
    }
}
