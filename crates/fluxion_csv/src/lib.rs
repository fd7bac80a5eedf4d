//! Annotated CSV encoding and decoding of query results.
//!
//! Each result is written as one or more blocks of `#datatype`, `#group`
//! and `#default` annotation rows, a header row, then data rows. The first
//! three columns of every row are the annotation slot, the result name and
//! the table id.

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod source;

mod datatype;

pub use config::{Annotation, ResultDecoderConfig, ResultEncoderConfig};
pub use decoder::{DecodedResult, DecodedResults, MultiResultDecoder, ResultDecoder};
pub use encoder::{MultiResultEncoder, ResultEncoder};
pub use source::{CsvInput, FROM_CSV_KIND, FromCsvProcedureSpec, FromCsvSource, register};
