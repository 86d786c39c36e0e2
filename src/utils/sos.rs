use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Cooperative cancellation signal shared between a pipeline and its worker
/// thread.
///
/// The worker checks `cancelled()` every loop iteration and parks in
/// `wait_timeout()` for its inter-iteration delay, so a `cancel()` from the
/// owning thread is observed within one timeout window.
#[derive(Debug)]
pub struct SignalOfStop {
    // Shared state between clones
    shared: Arc<SharedState>,
}

#[derive(Debug)]
struct SharedState {
    closing: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl SignalOfStop {
    pub fn new() -> SignalOfStop {
        SignalOfStop {
            shared: Arc::new(SharedState {
                closing: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        self.shared.closing.store(true, Ordering::Relaxed);

        // Lock briefly to synchronize with threads blocked in wait_timeout
        let _guard = self.shared.mutex.lock().unwrap();
        self.shared.condvar.notify_all();
    }

    pub fn cancelled(&self) -> bool {
        self.shared.closing.load(Ordering::Relaxed)
    }

    /// Sleep for at most `timeout`, waking early on `cancel()`.
    ///
    /// Returns `true` if the signal was cancelled before or during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.mutex.lock().unwrap();

        while !self.cancelled() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, result) = self
                .shared
                .condvar
                .wait_timeout(guard, deadline - now)
                .unwrap();
            guard = next;
            if result.timed_out() {
                return self.cancelled();
            }
        }
        true
    }
}

impl Default for SignalOfStop {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SignalOfStop {
    fn clone(&self) -> SignalOfStop {
        SignalOfStop {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Join a worker thread, waiting at most `grace` for it to finish.
///
/// A worker that does not stop in time is abandoned (the handle is dropped)
/// and a warning is logged; the process keeps going either way.
pub fn join_with_grace(handle: JoinHandle<()>, grace: Duration, name: &str) {
    const POLL: Duration = Duration::from_millis(5);

    let deadline = Instant::now() + grace;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("{name} worker did not stop within {grace:?}, abandoning thread");
            return;
        }
        std::thread::sleep(POLL);
    }

    if handle.join().is_err() {
        warn!("{name} worker panicked before join");
    }
}
