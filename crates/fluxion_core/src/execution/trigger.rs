use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::arrays::group_key::GroupKey;
use crate::arrays::scalar::ScalarValue;
use crate::values::time::{Duration, Time};

/// Label of the column holding the exclusive upper bound of a window.
pub const DEFAULT_STOP_COL_LABEL: &str = "_stop";

/// Describes when a buffered table should be emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Fire once the watermark passes the key's `_stop` value, finish once
    /// it passes `_stop + allowed_lateness`.
    AfterWatermark {
        #[serde(default)]
        allowed_lateness: Duration,
    },
    /// Re-arm the inner trigger every time it finishes.
    Repeated { trigger: Box<TriggerSpec> },
    /// Fire once processing time has advanced `duration` past the first
    /// evaluation.
    AfterProcessingTime { duration: Duration },
    /// Fire once the table holds at least `count` rows.
    AfterAtLeastCount { count: usize },
    /// Fire on `main`, or fire and finish when `finally` fires.
    OrFinally {
        main: Box<TriggerSpec>,
        finally: Box<TriggerSpec>,
    },
}

impl Default for TriggerSpec {
    fn default() -> Self {
        TriggerSpec::AfterWatermark {
            allowed_lateness: Duration::default(),
        }
    }
}

impl TriggerSpec {
    pub fn new_trigger(&self) -> Box<dyn Trigger> {
        match self {
            TriggerSpec::AfterWatermark { allowed_lateness } => Box::new(AfterWatermarkTrigger {
                allowed_lateness: *allowed_lateness,
                finished: false,
            }),
            TriggerSpec::Repeated { trigger } => Box::new(RepeatedTrigger {
                spec: trigger.as_ref().clone(),
                current: trigger.new_trigger(),
            }),
            TriggerSpec::AfterProcessingTime { duration } => {
                Box::new(AfterProcessingTimeTrigger {
                    duration: *duration,
                    trigger_time: None,
                    finished: false,
                })
            }
            TriggerSpec::AfterAtLeastCount { count } => Box::new(AfterAtLeastCountTrigger {
                count: *count,
                finished: false,
            }),
            TriggerSpec::OrFinally { main, finally } => Box::new(OrFinallyTrigger {
                main: main.new_trigger(),
                finally: finally.new_trigger(),
                finished: false,
            }),
        }
    }
}

/// State a trigger is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    pub key: &'a GroupKey,
    pub row_count: usize,
    pub watermark: Time,
    pub processing_time: Time,
}

pub trait Trigger: Debug + Send {
    /// Returns true if the table should be emitted now.
    fn triggered(&mut self, ctx: &TriggerContext<'_>) -> bool;

    /// Returns true if no more data is expected for the key.
    fn finished(&self) -> bool;
}

#[derive(Debug)]
struct AfterWatermarkTrigger {
    allowed_lateness: Duration,
    finished: bool,
}

impl Trigger for AfterWatermarkTrigger {
    fn triggered(&mut self, ctx: &TriggerContext<'_>) -> bool {
        let stop = match ctx.key.label_value(DEFAULT_STOP_COL_LABEL) {
            Some(ScalarValue::Time(stop)) => *stop,
            _ => return false,
        };
        let lateness_bound = stop.0.saturating_add(self.allowed_lateness.0);
        if ctx.watermark.0 >= lateness_bound {
            self.finished = true;
        }
        ctx.watermark >= stop
    }

    fn finished(&self) -> bool {
        self.finished
    }
}

#[derive(Debug)]
struct RepeatedTrigger {
    spec: TriggerSpec,
    current: Box<dyn Trigger>,
}

impl Trigger for RepeatedTrigger {
    fn triggered(&mut self, ctx: &TriggerContext<'_>) -> bool {
        let triggered = self.current.triggered(ctx);
        if self.current.finished() {
            self.current = self.spec.new_trigger();
        }
        triggered
    }

    fn finished(&self) -> bool {
        false
    }
}

#[derive(Debug)]
struct AfterProcessingTimeTrigger {
    duration: Duration,
    trigger_time: Option<Time>,
    finished: bool,
}

impl Trigger for AfterProcessingTimeTrigger {
    fn triggered(&mut self, ctx: &TriggerContext<'_>) -> bool {
        let trigger_time = *self
            .trigger_time
            .get_or_insert(Time(ctx.processing_time.0.saturating_add(self.duration.0)));
        self.finished = ctx.processing_time >= trigger_time;
        self.finished
    }

    fn finished(&self) -> bool {
        self.finished
    }
}

#[derive(Debug)]
struct AfterAtLeastCountTrigger {
    count: usize,
    finished: bool,
}

impl Trigger for AfterAtLeastCountTrigger {
    fn triggered(&mut self, ctx: &TriggerContext<'_>) -> bool {
        self.finished = ctx.row_count >= self.count;
        self.finished
    }

    fn finished(&self) -> bool {
        self.finished
    }
}

#[derive(Debug)]
struct OrFinallyTrigger {
    main: Box<dyn Trigger>,
    finally: Box<dyn Trigger>,
    finished: bool,
}

impl Trigger for OrFinallyTrigger {
    fn triggered(&mut self, ctx: &TriggerContext<'_>) -> bool {
        if self.finally.triggered(ctx) {
            self.finished = true;
            return true;
        }
        self.main.triggered(ctx)
    }

    fn finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::group_key::GroupKeyBuilder;

    fn window_key(start: i64, stop: i64) -> GroupKey {
        let mut kb = GroupKeyBuilder::new();
        kb.add_key_value("_start", Time(start)).unwrap();
        kb.add_key_value("_stop", Time(stop)).unwrap();
        kb.build().unwrap()
    }

    fn ctx(key: &GroupKey, rows: usize, watermark: i64, pt: i64) -> TriggerContext<'_> {
        TriggerContext {
            key,
            row_count: rows,
            watermark: Time(watermark),
            processing_time: Time(pt),
        }
    }

    #[test]
    fn after_watermark() {
        let key = window_key(0, 100);
        let mut t = TriggerSpec::default().new_trigger();
        assert!(!t.triggered(&ctx(&key, 1, 50, 0)));
        assert!(!t.finished());
        assert!(t.triggered(&ctx(&key, 1, 100, 0)));
        assert!(t.finished());
    }

    #[test]
    fn after_watermark_with_lateness() {
        let key = window_key(0, 100);
        let spec = TriggerSpec::AfterWatermark {
            allowed_lateness: Duration(20),
        };
        let mut t = spec.new_trigger();
        assert!(t.triggered(&ctx(&key, 1, 110, 0)));
        assert!(!t.finished());
        assert!(t.triggered(&ctx(&key, 1, 120, 0)));
        assert!(t.finished());
    }

    #[test]
    fn after_watermark_without_stop_never_fires() {
        let key = GroupKey::empty();
        let mut t = TriggerSpec::default().new_trigger();
        assert!(!t.triggered(&ctx(&key, 1, i64::MAX, 0)));
    }

    #[test]
    fn repeated_count() {
        let key = GroupKey::empty();
        let spec = TriggerSpec::Repeated {
            trigger: Box::new(TriggerSpec::AfterAtLeastCount { count: 2 }),
        };
        let mut t = spec.new_trigger();
        assert!(!t.triggered(&ctx(&key, 1, 0, 0)));
        assert!(t.triggered(&ctx(&key, 2, 0, 0)));
        assert!(!t.finished());
        assert!(t.triggered(&ctx(&key, 3, 0, 0)));
    }

    #[test]
    fn processing_time_and_finally() {
        let key = window_key(0, 100);
        let spec = TriggerSpec::OrFinally {
            main: Box::new(TriggerSpec::AfterProcessingTime {
                duration: Duration(10),
            }),
            finally: Box::new(TriggerSpec::default()),
        };
        let mut t = spec.new_trigger();
        assert!(!t.triggered(&ctx(&key, 1, 0, 5)));
        assert!(t.triggered(&ctx(&key, 1, 0, 15)));
        assert!(!t.finished());
        assert!(t.triggered(&ctx(&key, 1, 100, 16)));
        assert!(t.finished());
    }

    #[test]
    fn spec_json() {
        let spec = TriggerSpec::OrFinally {
            main: Box::new(TriggerSpec::AfterAtLeastCount { count: 10 }),
            finally: Box::new(TriggerSpec::default()),
        };
        let s = serde_json::to_string(&spec).unwrap();
        let back: TriggerSpec = serde_json::from_str(&s).unwrap();
        assert_eq!(spec, back);

        let parsed: TriggerSpec = serde_json::from_str(r#"{"type":"after_watermark"}"#).unwrap();
        assert_eq!(TriggerSpec::default(), parsed);
    }
}
