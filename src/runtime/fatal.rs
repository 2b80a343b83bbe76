use anyhow::Error as AnyError;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records workers that terminated abnormally and keeps the first such error.
///
/// A worker exit does not stop its siblings; the runner surfaces the captured
/// error from `stop`.
#[derive(Clone, Default)]
pub struct FatalErrorHandler {
    inner: Arc<FatalInner>,
}

#[derive(Default)]
struct FatalInner {
    worker_exits: AtomicUsize,
    captured_error: Mutex<Option<CapturedFatalError>>,
}

#[derive(Clone)]
struct CapturedFatalError {
    inner: Arc<AnyError>,
}

impl CapturedFatalError {
    fn new(inner: AnyError) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl fmt::Debug for CapturedFatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapturedFatalError")
            .field(&self.inner)
            .finish()
    }
}

impl fmt::Display for CapturedFatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner.as_ref(), f)
    }
}

impl std::error::Error for CapturedFatalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref().as_ref())
    }
}

impl FatalErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_worker_exit(&self, worker: usize, error: AnyError) {
        let exits = self.inner.worker_exits.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::error!(
            worker,
            exits,
            error = %error,
            "worker terminated; remaining workers keep running"
        );

        let mut slot = self.inner.captured_error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(CapturedFatalError::new(error));
        }
    }

    pub fn worker_exits(&self) -> usize {
        self.inner.worker_exits.load(Ordering::SeqCst)
    }

    /// First recorded error, if any worker has terminated.
    pub fn error(&self) -> Option<AnyError> {
        self.inner
            .captured_error
            .lock()
            .unwrap()
            .as_ref()
            .map(|error| error.clone().into())
    }
}
