use std::fmt::Debug;
use std::panic::{AssertUnwindSafe, catch_unwind};

use fluxion_error::{DbError, ErrorKind, Result};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::dispatcher::{Dispatcher, panic_error};
use super::transformation::{DatasetId, Downstream};

/// A leaf of the execution graph that produces tables.
///
/// Sources push into their downstream on a blocking task of their own. The
/// executor finishes the downstream once `run` returns, sources should not
/// call `finish` themselves.
pub trait Source: Debug + Send {
    fn id(&self) -> &DatasetId;

    fn downstream(&self) -> &Downstream;

    /// Produce every table. Implementations should check `cancel` between
    /// tables, see `check_canceled`.
    fn run(&mut self, cancel: &CancellationToken) -> Result<()>;
}

/// Error if `cancel` has been cancelled.
pub fn check_canceled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(DbError::new("Query canceled").with_kind(ErrorKind::Canceled));
    }
    Ok(())
}

/// Run a source to completion and finish its downstream.
///
/// Errors and panics are reported to the dispatcher and passed on with
/// `finish`.
pub(crate) fn run_source(
    mut source: Box<dyn Source>,
    cancel: CancellationToken,
    dispatcher: Dispatcher,
) {
    let id = source.id().clone();
    trace!(source = %id, "starting source");

    let err = match catch_unwind(AssertUnwindSafe(|| source.run(&cancel))) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(payload) => Some(panic_error("Source panicked", payload).with_field("source", &id)),
    };
    if let Some(err) = &err {
        dispatcher.set_error(err.clone());
    }

    trace!(source = %id, failed = err.is_some(), "source finished");
    source.downstream().finish(&id, err);
}
