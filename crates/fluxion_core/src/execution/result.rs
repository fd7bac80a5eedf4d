use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fluxion_error::{DbError, ErrorKind, Result};
use futures::Stream;
use parking_lot::Mutex;
use tracing::debug;

use super::transformation::{DatasetId, Transformation};
use crate::arrays::group_key::GroupKey;
use crate::arrays::table::ColumnTable;
use crate::values::time::Time;

#[derive(Debug, Default)]
struct AbortState {
    err: Mutex<Option<DbError>>,
    reported: AtomicBool,
}

impl AbortState {
    fn abort(&self, err: DbError) -> bool {
        let mut slot = self.err.lock();
        if slot.is_none() {
            *slot = Some(err);
            return true;
        }
        false
    }

    /// Take the abort error the first time it is observed.
    fn take_report(&self) -> Option<DbError> {
        let slot = self.err.lock();
        match slot.as_ref() {
            Some(err) if !self.reported.swap(true, Ordering::AcqRel) => Some(err.clone()),
            _ => None,
        }
    }

    fn current(&self) -> Option<DbError> {
        self.err.lock().clone()
    }
}

/// Create a named result and the transformation that feeds it.
pub fn new_result(name: impl Into<String>, buffer_size: usize) -> (QueryResult, ResultWriter) {
    let (tx, rx) = async_channel::bounded(buffer_size.max(1));
    let abort = Arc::new(AbortState::default());
    let name = name.into();
    (
        QueryResult {
            name: name.clone(),
            rx,
            abort: abort.clone(),
        },
        ResultWriter { name, tx, abort },
    )
}

/// A named stream of tables produced by a query.
///
/// Yields `Err` once if the query was aborted, then ends.
#[derive(Debug, Clone)]
pub struct QueryResult {
    name: String,
    rx: async_channel::Receiver<ColumnTable>,
    abort: Arc<AbortState>,
}

impl QueryResult {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the next table, or `None` once the result is complete.
    pub async fn next_table(&self) -> Option<Result<ColumnTable>> {
        if let Some(err) = self.abort.take_report() {
            return Some(Err(err));
        }
        match self.rx.recv().await {
            Ok(table) => Some(Ok(table)),
            Err(_) => self.abort.take_report().map(Err),
        }
    }

    /// Collect every remaining table.
    pub async fn collect_tables(&self) -> Result<Vec<ColumnTable>> {
        let mut tables = Vec::new();
        while let Some(table) = self.next_table().await {
            tables.push(table?);
        }
        Ok(tables)
    }

    /// Consume the result as a stream of tables.
    pub fn into_stream(self) -> impl Stream<Item = Result<ColumnTable>> + Send + 'static {
        futures::stream::unfold(self, |result| async move {
            let table = result.next_table().await?;
            Some((table, result))
        })
    }

    /// Stop the result with an error. Producers see the error on their next
    /// push. Only the first abort has an effect.
    pub fn abort(&self, err: DbError) {
        abort_result(&self.name, &self.abort, &self.rx, err);
    }
}

fn abort_result(
    name: &str,
    state: &AbortState,
    channel: &async_channel::Receiver<ColumnTable>,
    err: DbError,
) {
    if state.abort(err) {
        debug!(result = name, "aborting result");
        channel.close();
    }
}

/// Producer side of a result, attached as a downstream transformation.
#[derive(Debug)]
pub struct ResultWriter {
    name: String,
    tx: async_channel::Sender<ColumnTable>,
    abort: Arc<AbortState>,
}

impl ResultWriter {
    fn aborted_error(&self) -> DbError {
        self.abort.current().unwrap_or_else(|| {
            DbError::new("Result consumer dropped")
                .with_kind(ErrorKind::Canceled)
                .with_field("result", &self.name)
        })
    }
}

impl Transformation for ResultWriter {
    fn retract_table(&mut self, _id: &DatasetId, _key: &GroupKey) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, _id: &DatasetId, table: ColumnTable) -> Result<()> {
        if let Some(err) = self.abort.current() {
            return Err(err);
        }
        self.tx.send_blocking(table).map_err(|_| self.aborted_error())
    }

    fn update_watermark(&mut self, _id: &DatasetId, _mark: Time) -> Result<()> {
        Ok(())
    }

    fn update_processing_time(&mut self, _id: &DatasetId, _time: Time) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _id: &DatasetId, err: Option<DbError>) {
        if let Some(err) = err {
            if self.abort.abort(err) {
                debug!(result = %self.name, "result finished with error");
            }
        }
        self.tx.close();
    }
}

/// Iterates over the results of a query in name order.
#[derive(Debug)]
pub struct ResultIterator {
    results: std::collections::btree_map::IntoIter<String, QueryResult>,
}

impl ResultIterator {
    pub fn new(results: BTreeMap<String, QueryResult>) -> Self {
        ResultIterator {
            results: results.into_iter(),
        }
    }
}

impl Iterator for ResultIterator {
    type Item = QueryResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.results.next().map(|(_, r)| r)
    }
}
