use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fluxion_error::{DbError, ErrorKind, Result};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Fixed size worker pool that runs transport deliveries.
///
/// Cloning shares the pool. The first error reported by any piece of work
/// stops the dispatcher, later work is skipped.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<ThreadPool>,
    throughput: usize,
    state: Arc<DispatcherState>,
}

struct DispatcherState {
    stopped: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    first_err: Mutex<Option<DbError>>,
    err_tx: watch::Sender<Option<DbError>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("num_threads", &self.pool.current_num_threads())
            .field("throughput", &self.throughput)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

/// Convert a panic payload into an error.
pub(crate) fn panic_error(msg: &str, payload: Box<dyn Any + Send>) -> DbError {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    DbError::new(msg)
        .with_kind(ErrorKind::Panic)
        .with_field("panic", detail)
}

impl Dispatcher {
    pub fn try_new(num_threads: usize, throughput: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .thread_name(|idx| format!("fluxion_dispatch_{idx}"))
            .num_threads(num_threads)
            .build()
            .map_err(|e| DbError::with_source("Failed to build dispatcher pool", Box::new(e)))?;

        let (err_tx, _) = watch::channel(None);
        Ok(Dispatcher {
            pool: Arc::new(pool),
            throughput: throughput.max(1),
            state: Arc::new(DispatcherState {
                stopped: AtomicBool::new(false),
                cancel: Mutex::new(None),
                first_err: Mutex::new(None),
                err_tx,
            }),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Max messages a transport should deliver per scheduled run.
    pub fn throughput(&self) -> usize {
        self.throughput
    }

    /// Bind the dispatcher to a cancellation token. Work scheduled after the
    /// token is cancelled is skipped.
    pub fn start(&self, cancel: CancellationToken) {
        debug!(num_threads = self.num_threads(), "starting dispatcher");
        *self.state.cancel.lock() = Some(cancel);
    }

    /// Stop the dispatcher, returning the first error reported to it.
    pub fn stop(&self) -> Result<()> {
        debug!("stopping dispatcher");
        self.state.stopped.store(true, Ordering::Release);
        match self.state.first_err.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn is_stopped(&self) -> bool {
        if self.state.stopped.load(Ordering::Acquire) {
            return true;
        }
        match self.state.cancel.lock().as_ref() {
            Some(cancel) => cancel.is_cancelled(),
            None => false,
        }
    }

    /// Returns true if the calling thread is one of this dispatcher's
    /// workers.
    pub fn on_worker_thread(&self) -> bool {
        self.pool.current_thread_index().is_some()
    }

    /// Record an error and stop the dispatcher. Only the first error is
    /// kept.
    pub fn set_error(&self, err: DbError) {
        let mut first = self.state.first_err.lock();
        if first.is_none() {
            error!(%err, "dispatcher error");
            *first = Some(err.clone());
            self.state.stopped.store(true, Ordering::Release);
            self.state.err_tx.send_replace(Some(err));
        }
    }

    /// Receiver that observes the first error.
    pub fn err_receiver(&self) -> watch::Receiver<Option<DbError>> {
        self.state.err_tx.subscribe()
    }

    /// Run `work` on the pool.
    ///
    /// Errors and panics are reported through `set_error`.
    pub fn schedule<F>(&self, work: F)
    where
        F: FnOnce(&Dispatcher) -> Result<()> + Send + 'static,
    {
        if self.is_stopped() {
            return;
        }
        let dispatcher = self.clone();
        self.pool.spawn(move || {
            if dispatcher.is_stopped() {
                return;
            }
            match catch_unwind(AssertUnwindSafe(|| work(&dispatcher))) {
                Ok(Ok(())) => (),
                Ok(Err(err)) => dispatcher.set_error(err),
                Err(payload) => {
                    dispatcher.set_error(panic_error("Dispatcher work panicked", payload))
                }
            }
        });
    }
}
