use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

/// Stop flag shared between a sweeper and its thread.
struct Shared {
    stopped: Mutex<bool>,
    signal: Condvar,
}

/// A periodic background worker.
///
/// Runs `tick` on a dedicated thread every `interval`, with the first run one
/// full interval after spawning. The thread parks on a condvar between runs,
/// so [`stop`] takes effect immediately instead of waiting out the interval.
/// Stopping joins the thread; dropping an unstopped sweeper stops it first.
///
/// [`stop`]: Sweeper::stop
pub(crate) struct Sweeper {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawns the sweep thread.
    pub(crate) fn spawn<F>(interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            stopped: Mutex::new(false),
            signal: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || {
            debug!("cache sweeper started (interval: {:?})", interval);
            loop {
                {
                    let mut stopped = thread_shared.stopped.lock();
                    if *stopped {
                        break;
                    }
                    let result = thread_shared.signal.wait_for(&mut stopped, interval);
                    if *stopped {
                        break;
                    }
                    if !result.timed_out() {
                        continue;
                    }
                }
                // Lock released while the tick runs.
                tick();
            }
            debug!("cache sweeper stopped");
        });

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Signals the thread to stop and waits for it to finish.
    ///
    /// Idempotent; later calls are no-ops.
    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            {
                let mut stopped = self.shared.stopped.lock();
                *stopped = true;
            }
            self.shared.signal.notify_all();
            if handle.join().is_err() {
                warn!("cache sweeper thread panicked");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
