use std::sync::Arc;

use fluxion_error::{DbError, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::cache::TableBuilderCache;
use super::transformation::{DatasetId, Downstream, Transformation};
use super::trigger::{TriggerContext, TriggerSpec};
use crate::arrays::allocator::Allocator;
use crate::arrays::builder::TableBuilder;
use crate::arrays::group_key::GroupKey;
use crate::values::time::Time;

/// What a dataset does with a key's buffered rows after emitting them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationMode {
    /// Drop the key after emitting.
    Discarding,
    /// Keep accumulating rows under the key.
    #[default]
    Accumulating,
    /// Keep accumulating, and retract the previous emission before sending
    /// the next one.
    AccumulatingRetracting,
}

/// Buffers the output of a transformation per group key and emits tables
/// downstream when their triggers fire.
#[derive(Debug)]
pub struct Dataset {
    id: DatasetId,
    mode: AccumulationMode,
    cache: TableBuilderCache,
    watermark: Time,
    processing_time: Time,
    downstream: Downstream,
}

impl Dataset {
    pub fn new(id: DatasetId, mode: AccumulationMode, allocator: Arc<Allocator>) -> Self {
        Dataset {
            id,
            mode,
            cache: TableBuilderCache::new(allocator),
            watermark: Time::MIN,
            processing_time: Time::MIN,
            downstream: Downstream::new(),
        }
    }

    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    pub fn mode(&self) -> AccumulationMode {
        self.mode
    }

    pub fn watermark(&self) -> Time {
        self.watermark
    }

    pub fn processing_time(&self) -> Time {
        self.processing_time
    }

    /// Handle for adding consumers of this dataset.
    pub fn downstream(&self) -> &Downstream {
        &self.downstream
    }

    pub fn add_transformation(&self, t: Box<dyn Transformation>) {
        self.downstream.add_transformation(t);
    }

    pub fn set_trigger_spec(&mut self, spec: TriggerSpec) {
        self.cache.set_trigger_spec(spec);
    }

    pub fn cache(&self) -> &TableBuilderCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TableBuilderCache {
        &mut self.cache
    }

    pub fn allocator(&self) -> &Arc<Allocator> {
        self.cache.allocator()
    }

    /// Get the builder for `key`, creating it if needed.
    pub fn table_builder(&mut self, key: &GroupKey) -> (&mut TableBuilder, bool) {
        self.cache.table_builder(key)
    }

    /// Drop the rows buffered for `key` and forward the retraction.
    pub fn retract_table(&mut self, key: &GroupKey) -> Result<()> {
        self.cache.discard_table(key);
        self.downstream.retract_table(&self.id, key)
    }

    pub fn update_watermark(&mut self, mark: Time) -> Result<()> {
        self.watermark = mark;
        self.evaluate_triggers()?;
        self.downstream.update_watermark(&self.id, mark)
    }

    pub fn update_processing_time(&mut self, time: Time) -> Result<()> {
        self.processing_time = time;
        self.evaluate_triggers()?;
        self.downstream.update_processing_time(&self.id, time)
    }

    /// Emit every buffered table, then finish downstream.
    ///
    /// Buffered data is abandoned if `err` is set.
    pub fn finish(&mut self, err: Option<DbError>) {
        let mut err = err;
        if err.is_none() {
            for key in self.cache.keys() {
                if let Err(e) = self.trigger_table(&key) {
                    err = Some(e);
                    break;
                }
            }
        }
        self.cache.clear();
        self.downstream.finish(&self.id, err);
    }

    fn evaluate_triggers(&mut self) -> Result<()> {
        for key in self.cache.keys() {
            let (triggered, finished) = match self.cache.state_mut(&key) {
                Some(state) => {
                    let ctx = TriggerContext {
                        key: &key,
                        row_count: state.builder.num_rows(),
                        watermark: self.watermark,
                        processing_time: self.processing_time,
                    };
                    let triggered = state.trigger.triggered(&ctx);
                    (triggered, state.trigger.finished())
                }
                None => continue,
            };

            if triggered {
                self.trigger_table(&key)?;
            }
            if finished {
                trace!(dataset = %self.id, %key, "expiring table");
                self.cache.expire_table(&key);
            }
        }
        Ok(())
    }

    /// Emit the current table for `key` according to the accumulation mode.
    fn trigger_table(&mut self, key: &GroupKey) -> Result<()> {
        let state = match self.cache.state_mut(key) {
            Some(state) => state,
            None => return Ok(()),
        };
        let table = state.builder.table()?;
        let previously_emitted = state.emitted;
        state.emitted = true;
        trace!(dataset = %self.id, %key, rows = table.num_rows(), "triggering table");

        match self.mode {
            AccumulationMode::Discarding => {
                self.cache.expire_table(key);
            }
            AccumulationMode::Accumulating => (),
            AccumulationMode::AccumulatingRetracting => {
                if previously_emitted {
                    self.downstream.retract_table(&self.id, key)?;
                }
            }
        }
        self.downstream.process(&self.id, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::coltype::{ColMeta, ColType};
    use crate::arrays::group_key::GroupKeyBuilder;
    use crate::arrays::util::append_key_values;
    use crate::testutil::{RecordedCall, RecordingTransformation};

    fn window_key(stop: i64) -> GroupKey {
        let mut kb = GroupKeyBuilder::new();
        kb.add_key_value("_start", Time(stop - 100)).unwrap();
        kb.add_key_value("_stop", Time(stop)).unwrap();
        kb.build().unwrap()
    }

    fn append(ds: &mut Dataset, key: &GroupKey, values: &[f64]) {
        let (b, created) = ds.table_builder(key);
        if created {
            b.add_col(ColMeta::new("_start", ColType::Time)).unwrap();
            b.add_col(ColMeta::new("_stop", ColType::Time)).unwrap();
            b.add_col(ColMeta::new("_value", ColType::Float)).unwrap();
        }
        b.append_floats(2, values).unwrap();
        append_key_values(key, b, values.len()).unwrap();
    }

    fn dataset(mode: AccumulationMode) -> (Dataset, RecordingTransformation) {
        let ds = Dataset::new(DatasetId::new("ds"), mode, Arc::new(Allocator::new()));
        let recorder = RecordingTransformation::new();
        ds.add_transformation(Box::new(recorder.clone()));
        (ds, recorder)
    }

    #[test]
    fn watermark_triggers_and_expires() {
        let (mut ds, rec) = dataset(AccumulationMode::Accumulating);
        let k1 = window_key(100);
        let k2 = window_key(200);
        append(&mut ds, &k1, &[1.0, 2.0]);
        append(&mut ds, &k2, &[3.0]);

        ds.update_watermark(Time(150)).unwrap();
        let calls = rec.calls();
        assert_eq!(2, calls.len());
        match &calls[0] {
            RecordedCall::Process { key, rows, .. } => {
                assert_eq!(&k1, key);
                assert_eq!(2, *rows);
            }
            other => panic!("unexpected call: {other:?}"),
        }
        assert_eq!(RecordedCall::Watermark(Time(150)), calls[1]);
        assert!(!ds.cache().contains(&k1));
        assert!(ds.cache().contains(&k2));

        ds.finish(None);
        let calls = rec.calls();
        assert!(matches!(&calls[2], RecordedCall::Process { key, .. } if key == &k2));
        assert_eq!(RecordedCall::Finish(None), calls[3]);
    }

    #[test]
    fn retracting_mode_retracts_before_resend() {
        let (mut ds, rec) = dataset(AccumulationMode::AccumulatingRetracting);
        ds.set_trigger_spec(TriggerSpec::Repeated {
            trigger: Box::new(TriggerSpec::AfterAtLeastCount { count: 1 }),
        });
        let k = window_key(100);

        append(&mut ds, &k, &[1.0]);
        ds.update_processing_time(Time(1)).unwrap();
        append(&mut ds, &k, &[2.0]);
        ds.update_processing_time(Time(2)).unwrap();

        let calls = rec.calls();
        let kinds: Vec<&str> = calls.iter().map(|c| c.kind()).collect();
        assert_eq!(
            vec!["process", "processing_time", "retract", "process", "processing_time"],
            kinds
        );
        assert!(matches!(&calls[3], RecordedCall::Process { rows: 2, .. }));
    }

    #[test]
    fn discarding_mode_forgets_key() {
        let (mut ds, rec) = dataset(AccumulationMode::Discarding);
        ds.set_trigger_spec(TriggerSpec::AfterAtLeastCount { count: 1 });
        let k = GroupKey::empty();
        let (b, _) = ds.table_builder(&k);
        b.add_col(ColMeta::new("_value", ColType::Int)).unwrap();
        b.append_int(0, 1).unwrap();

        ds.update_processing_time(Time(1)).unwrap();
        assert!(ds.cache().is_empty());

        let (_, created) = ds.table_builder(&k);
        assert!(created);
        assert_eq!(2, rec.calls().len());
    }

    #[test]
    fn finish_with_error_abandons_buffered_tables() {
        let (mut ds, rec) = dataset(AccumulationMode::Accumulating);
        append(&mut ds, &window_key(100), &[1.0]);
        ds.finish(Some(DbError::new("upstream failed")));

        let calls = rec.calls();
        assert_eq!(1, calls.len());
        assert!(matches!(&calls[0], RecordedCall::Finish(Some(msg)) if msg == "upstream failed"));
    }

    #[test]
    fn retract_forwards_downstream() {
        let (mut ds, rec) = dataset(AccumulationMode::Accumulating);
        let k = window_key(100);
        append(&mut ds, &k, &[1.0]);
        ds.retract_table(&k).unwrap();
        assert_eq!(0, ds.cache().get(&k).unwrap().num_rows());
        assert_eq!(vec![RecordedCall::Retract(k)], rec.calls());
    }
}
