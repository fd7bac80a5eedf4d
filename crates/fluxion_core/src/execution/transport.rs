use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fluxion_error::{DbError, ErrorKind, Result};
use parking_lot::{Condvar, Mutex};
use tokio::sync::watch;
use tracing::trace;

use super::dispatcher::Dispatcher;
use super::transformation::{DatasetId, Transformation};
use crate::arrays::group_key::GroupKey;
use crate::arrays::table::ColumnTable;
use crate::values::time::Time;

/// How long a blocked producer waits before rechecking whether the
/// dispatcher stopped.
const FULL_WAIT: Duration = Duration::from_millis(10);

#[derive(Debug)]
enum Message {
    Process(DatasetId, ColumnTable),
    Retract(DatasetId, GroupKey),
    Watermark(DatasetId, Time),
    ProcessingTime(DatasetId, Time),
    Finish(DatasetId, Option<DbError>),
}

/// A transformation with one or more parents.
///
/// Every transport feeding the same transformation shares one of these.
/// Calls are serialized by the lock, and `finish` is forwarded once all
/// parents finished, or immediately on the first error.
#[derive(Debug)]
pub struct SharedTransformation {
    inner: Box<dyn Transformation>,
    remaining_parents: usize,
    finished: bool,
}

impl SharedTransformation {
    pub fn new(inner: Box<dyn Transformation>, num_parents: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(SharedTransformation {
            inner,
            remaining_parents: num_parents.max(1),
            finished: false,
        }))
    }

    /// Deliver a message. Returns true once the transformation finished.
    fn deliver(&mut self, msg: Message) -> Result<bool> {
        if self.finished {
            return Ok(true);
        }
        match msg {
            Message::Process(id, table) => self.inner.process(&id, table)?,
            Message::Retract(id, key) => self.inner.retract_table(&id, &key)?,
            Message::Watermark(id, mark) => self.inner.update_watermark(&id, mark)?,
            Message::ProcessingTime(id, time) => self.inner.update_processing_time(&id, time)?,
            Message::Finish(id, err) => {
                self.remaining_parents = self.remaining_parents.saturating_sub(1);
                if err.is_some() || self.remaining_parents == 0 {
                    self.finished = true;
                    self.inner.finish(&id, err);
                }
            }
        }
        Ok(self.finished)
    }

    fn fail(&mut self, id: &DatasetId, err: DbError) {
        if !self.finished {
            self.finished = true;
            self.inner.finish(id, Some(err));
        }
    }
}

struct TransportState {
    id: DatasetId,
    queue: Mutex<VecDeque<Message>>,
    not_full: Condvar,
    capacity: usize,
    /// Set while a delivery run is queued or running on the dispatcher.
    scheduled: AtomicBool,
    target: Arc<Mutex<SharedTransformation>>,
    /// Set once this edge delivered its last message.
    closed: AtomicBool,
    finished_tx: watch::Sender<bool>,
}

/// Ordered delivery from one producer to one consumer.
///
/// Producers push messages by calling the `Transformation` methods, the
/// messages are delivered to the consumer in order on the dispatcher's
/// pool. At most one delivery run per transport is active at a time.
#[derive(Clone)]
pub struct Transport {
    state: Arc<TransportState>,
    dispatcher: Dispatcher,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.state.id)
            .field("queued", &self.state.queue.lock().len())
            .field("closed", &self.state.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a transport for the edge from dataset `id` into `target`.
    pub fn new(
        id: DatasetId,
        dispatcher: Dispatcher,
        target: Arc<Mutex<SharedTransformation>>,
        capacity: usize,
    ) -> Self {
        let (finished_tx, _) = watch::channel(false);
        Transport {
            state: Arc::new(TransportState {
                id,
                queue: Mutex::new(VecDeque::new()),
                not_full: Condvar::new(),
                capacity: capacity.max(1),
                scheduled: AtomicBool::new(false),
                target,
                closed: AtomicBool::new(false),
                finished_tx,
            }),
            dispatcher,
        }
    }

    /// Receiver that flips to true once the transport finished.
    pub fn finished(&self) -> watch::Receiver<bool> {
        self.state.finished_tx.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        *self.state.finished_tx.borrow()
    }

    fn push(&self, msg: Message) -> Result<()> {
        if self.dispatcher.is_stopped() {
            return Err(DbError::new("Transport stopped").with_kind(ErrorKind::Canceled));
        }
        if self.state.closed.load(Ordering::Acquire) {
            return Err(DbError::new("Transport already finished")
                .with_field("dataset", &self.state.id));
        }

        {
            let mut queue = self.state.queue.lock();
            // Workers never wait, they already hold a dispatcher slot and
            // blocking them could stall the consumer.
            if !self.dispatcher.on_worker_thread() {
                while queue.len() >= self.state.capacity {
                    if self.dispatcher.is_stopped() {
                        return Err(DbError::new("Transport stopped").with_kind(ErrorKind::Canceled));
                    }
                    self.state.not_full.wait_for(&mut queue, FULL_WAIT);
                }
            }
            queue.push_back(msg);
        }
        self.schedule();
        Ok(())
    }

    fn schedule(&self) {
        if self
            .state
            .scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let transport = self.clone();
        self.dispatcher
            .schedule(move |dispatcher| transport.process_messages(dispatcher.throughput()));
    }

    /// Deliver up to `throughput` queued messages, then yield.
    fn process_messages(&self, throughput: usize) -> Result<()> {
        let mut delivered = 0;
        loop {
            let msg = {
                let mut queue = self.state.queue.lock();
                let msg = queue.pop_front();
                if msg.is_some() {
                    self.state.not_full.notify_one();
                }
                msg
            };

            match msg {
                Some(msg) => {
                    self.deliver(msg)?;
                    delivered += 1;
                    if delivered >= throughput {
                        self.state.scheduled.store(false, Ordering::Release);
                        if !self.state.queue.lock().is_empty() {
                            self.schedule();
                        }
                        return Ok(());
                    }
                }
                None => {
                    self.state.scheduled.store(false, Ordering::Release);
                    // A producer may have pushed between the pop and the
                    // store without being able to schedule.
                    if self.state.queue.lock().is_empty()
                        || self
                            .state
                            .scheduled
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_err()
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn deliver(&self, msg: Message) -> Result<()> {
        let is_finish = matches!(msg, Message::Finish(..));
        let mut target = self.state.target.lock();
        match target.deliver(msg) {
            Ok(_) => {
                drop(target);
                if is_finish {
                    self.close();
                }
                Ok(())
            }
            Err(err) => {
                target.fail(&self.state.id, err.clone());
                drop(target);
                self.close();
                Err(err)
            }
        }
    }

    fn close(&self) {
        if !self.state.closed.swap(true, Ordering::AcqRel) {
            trace!(dataset = %self.state.id, "transport finished");
            self.state.queue.lock().clear();
            self.state.not_full.notify_all();
            self.state.finished_tx.send_replace(true);
        }
    }
}

impl Transformation for Transport {
    fn retract_table(&mut self, id: &DatasetId, key: &GroupKey) -> Result<()> {
        self.push(Message::Retract(id.clone(), key.clone()))
    }

    fn process(&mut self, id: &DatasetId, table: ColumnTable) -> Result<()> {
        self.push(Message::Process(id.clone(), table))
    }

    fn update_watermark(&mut self, id: &DatasetId, mark: Time) -> Result<()> {
        self.push(Message::Watermark(id.clone(), mark))
    }

    fn update_processing_time(&mut self, id: &DatasetId, time: Time) -> Result<()> {
        self.push(Message::ProcessingTime(id.clone(), time))
    }

    fn finish(&mut self, id: &DatasetId, err: Option<DbError>) {
        if let Err(push_err) = self.push(Message::Finish(id.clone(), err.clone())) {
            // Dispatcher is gone, finish the consumer directly so results
            // still observe the failure.
            let err = err.unwrap_or(push_err);
            self.state.target.lock().fail(id, err);
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::testutil::{RecordedCall, RecordingTransformation};

    fn wait_finished(t: &Transport) {
        for _ in 0..500 {
            if t.is_finished() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("transport did not finish");
    }

    #[test]
    fn delivers_in_order() {
        let d = Dispatcher::try_new(4, 2).unwrap();
        d.start(CancellationToken::new());
        let rec = RecordingTransformation::new();
        let target = SharedTransformation::new(Box::new(rec.clone()), 1);
        let mut t = Transport::new(DatasetId::new("src"), d.clone(), target, 4);

        let id = DatasetId::new("src");
        for i in 0..50 {
            t.update_watermark(&id, Time(i)).unwrap();
        }
        t.finish(&id, None);
        wait_finished(&t);

        let calls = rec.calls();
        assert_eq!(51, calls.len());
        for (i, call) in calls[..50].iter().enumerate() {
            assert_eq!(&RecordedCall::Watermark(Time(i as i64)), call);
        }
        assert_eq!(RecordedCall::Finish(None), calls[50]);
        d.stop().unwrap();
    }

    #[test]
    fn finish_waits_for_all_parents() {
        let d = Dispatcher::try_new(2, 8).unwrap();
        let rec = RecordingTransformation::new();
        let target = SharedTransformation::new(Box::new(rec.clone()), 2);
        let a = DatasetId::new("a");
        let b = DatasetId::new("b");
        let mut ta = Transport::new(a.clone(), d.clone(), target.clone(), 8);
        let mut tb = Transport::new(b.clone(), d.clone(), target, 8);

        ta.finish(&a, None);
        wait_finished(&ta);
        assert!(rec.calls().is_empty());

        tb.finish(&b, None);
        wait_finished(&tb);
        assert_eq!(vec![RecordedCall::Finish(None)], rec.calls());
    }

    #[test]
    fn consumer_error_stops_dispatcher() {
        let d = Dispatcher::try_new(1, 8).unwrap();
        let rec = RecordingTransformation::new().fail_on_process("bad table");
        let target = SharedTransformation::new(Box::new(rec.clone()), 1);
        let id = DatasetId::new("src");
        let mut t = Transport::new(id.clone(), d.clone(), target, 8);

        let table = crate::testutil::table_from_rows(
            &[],
            &[("_value", crate::arrays::coltype::ColType::Int)],
            vec![vec![1i64.into()]],
        );
        t.process(&id, table).unwrap();
        wait_finished(&t);

        let err = d.stop().unwrap_err();
        assert_eq!("bad table", err.message());
        assert!(matches!(&rec.calls()[..], [RecordedCall::Finish(Some(msg))] if msg == "bad table"));
    }
}
