//! `from_csv`: a source reading tables from annotated CSV.

use std::any::Any;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use fluxion_core::arrays::allocator::Allocator;
use fluxion_core::execution::registry::{ExecutionContext, Registry, downcast_spec};
use fluxion_core::execution::source::{Source, check_canceled};
use fluxion_core::execution::transformation::{DatasetId, Downstream};
use fluxion_core::plan::{ProcedureKind, ProcedureSpec};
use fluxion_error::{DbError, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ResultDecoderConfig;
use crate::decoder::MultiResultDecoder;

pub const FROM_CSV_KIND: ProcedureKind = "from_csv";

/// Where the CSV text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvInput {
    /// Inline CSV text.
    Csv(String),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FromCsvProcedureSpec {
    pub input: CsvInput,
    #[serde(default)]
    pub config: ResultDecoderConfig,
}

impl FromCsvProcedureSpec {
    pub fn text(csv: impl Into<String>) -> Self {
        FromCsvProcedureSpec {
            input: CsvInput::Csv(csv.into()),
            config: ResultDecoderConfig::default(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        FromCsvProcedureSpec {
            input: CsvInput::File(path.into()),
            config: ResultDecoderConfig::default(),
        }
    }
}

impl ProcedureSpec for FromCsvProcedureSpec {
    fn kind(&self) -> ProcedureKind {
        FROM_CSV_KIND
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Decodes every result of its input and sends their tables on, in input
/// order. An error table in the input fails the source.
#[derive(Debug)]
pub struct FromCsvSource {
    id: DatasetId,
    spec: FromCsvProcedureSpec,
    allocator: Arc<Allocator>,
    downstream: Downstream,
}

impl FromCsvSource {
    pub fn new(id: DatasetId, spec: FromCsvProcedureSpec, allocator: Arc<Allocator>) -> Self {
        FromCsvSource {
            id,
            spec,
            allocator,
            downstream: Downstream::new(),
        }
    }

    fn open(&self) -> Result<Box<dyn Read + '_>> {
        let reader: Box<dyn Read + '_> = match &self.spec.input {
            CsvInput::Csv(text) => Box::new(text.as_bytes()),
            CsvInput::File(path) => Box::new(
                File::open(path)
                    .map_err(|e| DbError::from(e).with_field("path", path.display()))?,
            ),
        };
        Ok(reader)
    }
}

impl Source for FromCsvSource {
    fn id(&self) -> &DatasetId {
        &self.id
    }

    fn downstream(&self) -> &Downstream {
        &self.downstream
    }

    fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        check_canceled(cancel)?;
        let decoder = MultiResultDecoder::new(self.spec.config.clone());
        for result in decoder.decode(self.open()?, &self.allocator) {
            let result = result?;
            debug!(
                source = %self.id,
                result = result.name(),
                tables = result.tables().len(),
                "decoded csv result"
            );
            for table in result.into_tables() {
                check_canceled(cancel)?;
                self.downstream.process(&self.id, table)?;
            }
        }
        Ok(())
    }
}

pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register_source(
        FROM_CSV_KIND,
        |spec: &dyn ProcedureSpec, id: DatasetId, ctx: &ExecutionContext| {
            let spec = downcast_spec::<FromCsvProcedureSpec>(spec)?;
            let source = FromCsvSource::new(id, spec.clone(), ctx.allocator.clone());
            Ok(Box::new(source) as Box<dyn Source>)
        },
    )
}
