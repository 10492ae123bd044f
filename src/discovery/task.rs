use std::{
    any::Any,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crate::{
    discovery::{DiscoveryEngine, ScanSummary},
    runtime::LogSink,
    Error, Result,
};

/// Name of the background scan thread
pub const SCAN_THREAD_NAME: &str = "ownerscope-scan";

/// Clears the in-flight flag when the scan thread exits, panicking or not
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A scan running on its own thread.
///
/// The host polls it once per frame; the first poll after the thread finished yields the
/// outcome, later polls yield `None`.
pub struct ScanTask {
    handle: Option<JoinHandle<ScanSummary>>,
    sink: Arc<dyn LogSink>,
}

impl ScanTask {
    /// Start `engine.scan()` on a background thread.
    ///
    /// # Errors
    /// Returns [`Error::ScanFailed`] if the thread cannot be spawned.
    pub fn spawn(engine: Arc<DiscoveryEngine>, sink: Arc<dyn LogSink>) -> Result<Self> {
        Self::spawn_with(engine, sink, None)
    }

    fn spawn_with(
        engine: Arc<DiscoveryEngine>,
        sink: Arc<dyn LogSink>,
        in_flight: Option<Arc<AtomicBool>>,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name(SCAN_THREAD_NAME.to_string())
            .spawn(move || {
                let _in_flight = in_flight.map(InFlight);
                engine.scan()
            })
            .map_err(|e| Error::ScanFailed(format!("could not start scan thread: {e}")))?;

        Ok(ScanTask {
            handle: Some(handle),
            sink,
        })
    }

    /// True once the scan thread has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// The outcome of the scan if it finished since the last poll.
    ///
    /// A panic on the scan thread is logged at `Fatal` level and returned as
    /// [`Error::ScanFailed`].
    pub fn poll(&mut self) -> Option<Result<ScanSummary>> {
        if !self.handle.as_ref().is_some_and(JoinHandle::is_finished) {
            return None;
        }

        let handle = self.handle.take()?;
        Some(self.join(handle))
    }

    /// Block until the scan finishes.
    ///
    /// # Errors
    /// Returns [`Error::ScanFailed`] if the scan panicked or was already collected by
    /// [`ScanTask::poll`].
    pub fn wait(mut self) -> Result<ScanSummary> {
        match self.handle.take() {
            Some(handle) => self.join(handle),
            None => Err(Error::ScanFailed("outcome already collected".to_string())),
        }
    }

    fn join(&self, handle: JoinHandle<ScanSummary>) -> Result<ScanSummary> {
        handle.join().map_err(|payload| {
            let reason = panic_message(payload.as_ref());
            self.sink
                .fatal(&format!("Error during dynamic patching: {reason}"));
            Error::ScanFailed(reason)
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "scan thread panicked".to_string()
    }
}

/// Starts exactly one scan per network session start.
///
/// A trigger while a scan is still in flight is rejected with [`Error::ScanInProgress`].
pub struct ScanCoordinator {
    engine: Arc<DiscoveryEngine>,
    sink: Arc<dyn LogSink>,
    in_flight: Arc<AtomicBool>,
}

impl ScanCoordinator {
    /// Creates an idle coordinator
    pub fn new(engine: Arc<DiscoveryEngine>, sink: Arc<dyn LogSink>) -> Self {
        sink.info("Active, waiting for game to start before dynamic patching...");
        ScanCoordinator {
            engine,
            sink,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while a scan is running
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Start a scan for a freshly started network session.
    ///
    /// # Errors
    /// Returns [`Error::ScanInProgress`] if a scan is still running, or
    /// [`Error::ScanFailed`] if the scan thread cannot be started.
    pub fn on_session_started(&self) -> Result<ScanTask> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.sink
                .warning("A scan is already in progress, ignoring session start");
            return Err(Error::ScanInProgress);
        }

        let task = ScanTask::spawn_with(
            self.engine.clone(),
            self.sink.clone(),
            Some(self.in_flight.clone()),
        );
        if task.is_err() {
            self.in_flight.store(false, Ordering::Release);
        }
        task
    }
}
