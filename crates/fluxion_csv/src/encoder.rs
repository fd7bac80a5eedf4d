use std::io::{self, Write};

use fluxion_core::arrays::coltype::{ColMeta, ColType};
use fluxion_core::arrays::group_key::GroupKey;
use fluxion_core::arrays::table::ColumnTable;
use fluxion_core::execution::result::QueryResult;
use fluxion_error::{DbError, ErrorKind, Result};
use tracing::{debug, trace};

use crate::config::{Annotation, ResultEncoderConfig, check_delimiter};
use crate::datatype::{
    COMMENT_PREFIX, ERROR_LABEL, RECORD_START_IDX, REFERENCE_LABEL, RESULT_LABEL, TABLE_LABEL,
    datatype_name, format_value,
};

const RESULT_DELIMITER: &[u8] = b"\r\n";

/// Counts bytes passed through to the inner writer.
#[derive(Debug)]
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Tag a csv write failure as a broken writer or as unencodable data.
fn write_error(err: csv::Error) -> DbError {
    let kind = if err.is_io_error() {
        ErrorKind::Io
    } else {
        ErrorKind::Encode
    };
    DbError::with_source("Failed to write CSV", Box::new(err)).with_kind(kind)
}

/// Returns true for errors raised while writing, as opposed to errors the
/// query produced.
fn is_encoder_error(err: &DbError) -> bool {
    matches!(err.kind(), ErrorKind::Encode | ErrorKind::Io)
}

/// Schema of the last block written, used to decide when annotations need
/// to be repeated.
#[derive(Debug, PartialEq)]
struct BlockSchema {
    cols: Vec<ColMeta>,
    groups: Vec<bool>,
}

impl BlockSchema {
    fn new(table: &ColumnTable) -> Self {
        BlockSchema {
            cols: table.cols().to_vec(),
            groups: table
                .cols()
                .iter()
                .map(|c| table.key().has_col(&c.label))
                .collect(),
        }
    }
}

/// Encodes the tables of one result as annotated CSV.
#[derive(Debug)]
pub struct ResultEncoder {
    config: ResultEncoderConfig,
    /// Set once anything has been written by this encoder.
    written: bool,
}

/// Per result encoding state.
#[derive(Debug, Default)]
struct EncodeState {
    table_id: usize,
    last_schema: Option<BlockSchema>,
    last_empty: bool,
}

impl ResultEncoder {
    pub fn new(config: ResultEncoderConfig) -> Self {
        ResultEncoder {
            config,
            written: false,
        }
    }

    pub fn config(&self) -> &ResultEncoderConfig {
        &self.config
    }

    fn csv_writer<W: Write>(&self, w: W) -> csv::Writer<W> {
        csv::WriterBuilder::new()
            .delimiter(self.config.delimiter)
            .terminator(csv::Terminator::CRLF)
            .flexible(true)
            .from_writer(w)
    }

    /// Encode every table of `result`, returning the bytes written.
    ///
    /// An error produced by the query is returned as is. Failures to
    /// encode or write have kind `Encode` or `Io`.
    pub async fn encode<W: Write>(&mut self, w: W, result: &QueryResult) -> Result<u64> {
        let mut w = CountingWriter { inner: w, count: 0 };
        let mut state = EncodeState::default();
        while let Some(table) = result.next_table().await {
            self.encode_table(&mut w, &mut state, result.name(), &table?)?;
        }
        Ok(w.count)
    }

    /// Encode tables that are already in hand.
    pub fn encode_tables<W, I>(&mut self, w: W, name: &str, tables: I) -> Result<u64>
    where
        W: Write,
        I: IntoIterator<Item = Result<ColumnTable>>,
    {
        let mut w = CountingWriter { inner: w, count: 0 };
        let mut state = EncodeState::default();
        for table in tables {
            self.encode_table(&mut w, &mut state, name, &table?)?;
        }
        Ok(w.count)
    }

    fn encode_table<W: Write>(
        &mut self,
        w: &mut W,
        state: &mut EncodeState,
        name: &str,
        table: &ColumnTable,
    ) -> Result<()> {
        check_delimiter(self.config.delimiter)?;
        self.written = true;

        let table_id = state.table_id.to_string();
        let empty = table.is_empty();
        let schema = BlockSchema::new(table);
        let schema_changed = state.last_schema.as_ref() != Some(&schema);

        if state.last_empty || schema_changed || empty {
            if state.last_schema.is_some() {
                w.write_all(RESULT_DELIMITER)?;
            }
            let mut writer = self.csv_writer(&mut *w);
            self.write_schema(&mut writer, table, name, &table_id, empty)?;
            writer.flush()?;
        }

        // With a default row the result name is carried by the annotation.
        let result_cell = if self.config.has_annotation(Annotation::Default) {
            ""
        } else {
            name
        };

        let mut writer = self.csv_writer(&mut *w);
        table.do_columns(|cr| {
            let mut row = Vec::with_capacity(RECORD_START_IDX + cr.cols().len());
            for i in 0..cr.len() {
                row.clear();
                row.extend(["".to_string(), result_cell.to_string(), table_id.clone()]);
                for j in 0..cr.cols().len() {
                    row.push(format_value(&cr.value(i, j)?)?);
                }
                writer.write_record(&row).map_err(write_error)?;
            }
            Ok(())
        })?;
        writer.flush()?;
        trace!(result = name, table = state.table_id, rows = table.num_rows(), "encoded table");

        state.table_id += 1;
        state.last_schema = Some(schema);
        state.last_empty = empty;
        Ok(())
    }

    fn write_schema<W: Write>(
        &self,
        writer: &mut csv::Writer<W>,
        table: &ColumnTable,
        name: &str,
        table_id: &str,
        use_key_defaults: bool,
    ) -> Result<()> {
        let cols = table.cols();
        let key = table.key();

        for annotation in &self.config.annotations {
            let mut row = vec![
                format!("{COMMENT_PREFIX}{}", annotation.as_str()),
                String::new(),
                String::new(),
            ];
            match annotation {
                Annotation::Datatype => {
                    row[1] = datatype_name(ColType::String).to_string();
                    row[2] = datatype_name(ColType::Int).to_string();
                    row.extend(cols.iter().map(|c| datatype_name(c.typ).to_string()));
                }
                Annotation::Group => {
                    row[1] = "false".to_string();
                    row[2] = "false".to_string();
                    row.extend(cols.iter().map(|c| key.has_col(&c.label).to_string()));
                }
                Annotation::Default => {
                    row[1] = name.to_string();
                    if use_key_defaults {
                        row[2] = table_id.to_string();
                    }
                    for c in cols {
                        row.push(key_default(key, c, use_key_defaults)?);
                    }
                }
            }
            writer.write_record(&row).map_err(write_error)?;
        }

        if !self.config.no_header {
            let mut row = vec![String::new(), RESULT_LABEL.to_string(), TABLE_LABEL.to_string()];
            row.extend(cols.iter().map(|c| c.label.clone()));
            writer.write_record(&row).map_err(write_error)?;
        }
        Ok(())
    }

    /// Encode `err` as a two column error table.
    pub fn encode_error<W: Write>(&mut self, mut w: W, err: &DbError) -> Result<()> {
        check_delimiter(self.config.delimiter)?;
        if self.written {
            w.write_all(RESULT_DELIMITER)?;
        }
        let mut writer = self.csv_writer(&mut w);
        for annotation in &self.config.annotations {
            let prefixed = format!("{COMMENT_PREFIX}{}", annotation.as_str());
            let row = match annotation {
                Annotation::Datatype => [prefixed.as_str(), "string", "string"],
                Annotation::Group => [prefixed.as_str(), "true", "true"],
                Annotation::Default => [prefixed.as_str(), "", ""],
            };
            writer.write_record(row).map_err(write_error)?;
        }
        writer
            .write_record(["", ERROR_LABEL, REFERENCE_LABEL])
            .map_err(write_error)?;
        let msg = err.to_string();
        writer.write_record(["", msg.as_str(), ""]).map_err(write_error)?;
        writer.flush()?;
        self.written = true;
        Ok(())
    }
}

/// Default cell for column `c`. Only empty tables carry their key values as
/// defaults.
fn key_default(key: &GroupKey, c: &ColMeta, use_key_defaults: bool) -> Result<String> {
    if !use_key_defaults {
        return Ok(String::new());
    }
    match key.label_value(&c.label) {
        Some(value) => format_value(value),
        None => Ok(String::new()),
    }
}

/// Encodes several results, separated by an empty line.
///
/// If a result fails with an error from the query itself, the error is
/// encoded as an error table and encoding stops. Encoding and write
/// failures are returned.
#[derive(Debug)]
pub struct MultiResultEncoder {
    encoder: ResultEncoder,
}

impl MultiResultEncoder {
    pub fn new(config: ResultEncoderConfig) -> Self {
        MultiResultEncoder {
            encoder: ResultEncoder::new(config),
        }
    }

    pub async fn encode<W, I>(&mut self, w: W, results: I) -> Result<u64>
    where
        W: Write,
        I: IntoIterator<Item = QueryResult>,
    {
        let mut w = CountingWriter { inner: w, count: 0 };
        for result in results {
            debug!(result = result.name(), "encoding result");
            if let Err(err) = self.encoder.encode(&mut w, &result).await {
                if is_encoder_error(&err) {
                    return Err(err);
                }
                debug!(%err, result = result.name(), "encoding query error");
                self.encoder.encode_error(&mut w, &err)?;
                return Ok(w.count);
            }
            w.write_all(RESULT_DELIMITER)?;
            w.flush()?;
        }
        Ok(w.count)
    }
}

#[cfg(test)]
mod tests {
    use fluxion_core::arrays::group_key::GroupKeyBuilder;
    use fluxion_core::arrays::scalar::ScalarValue;
    use fluxion_core::execution::result::new_result;
    use fluxion_core::execution::transformation::{DatasetId, Transformation};
    use fluxion_core::testutil::{table_from_rows, table_with_key};
    use fluxion_core::values::time::Time;

    use super::*;

    fn time(s: &str) -> ScalarValue {
        ScalarValue::Time(Time::parse_rfc3339(s).unwrap())
    }

    fn cpu_table(host: &str, values: &[f64]) -> ColumnTable {
        table_from_rows(
            &["_start", "host"],
            &[
                ("_start", ColType::Time),
                ("_time", ColType::Time),
                ("host", ColType::String),
                ("_value", ColType::Float),
            ],
            values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    vec![
                        time("2018-04-17T00:00:00Z"),
                        time(&format!("2018-04-17T00:00:0{i}Z")),
                        host.into(),
                        ScalarValue::Float(*v),
                    ]
                })
                .collect(),
        )
    }

    fn encode(tables: Vec<ColumnTable>) -> String {
        let mut buf = Vec::new();
        let mut enc = ResultEncoder::new(ResultEncoderConfig::default());
        let n = enc
            .encode_tables(&mut buf, "_result", tables.into_iter().map(Ok))
            .unwrap();
        assert_eq!(buf.len() as u64, n);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn single_table() {
        let got = encode(vec![cpu_table("A", &[42.0, 43.5])]);
        let expected = "#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,string,double\r\n\
                        #group,false,false,true,false,true,false\r\n\
                        #default,_result,,,,,\r\n\
                        ,result,table,_start,_time,host,_value\r\n\
                        ,,0,2018-04-17T00:00:00Z,2018-04-17T00:00:00Z,A,42\r\n\
                        ,,0,2018-04-17T00:00:00Z,2018-04-17T00:00:01Z,A,43.5\r\n";
        assert_eq!(expected, got);
    }

    #[test]
    fn same_schema_shares_annotations() {
        let got = encode(vec![cpu_table("A", &[1.0]), cpu_table("B", &[2.0])]);
        assert_eq!(1, got.matches("#datatype").count());
        assert!(got.ends_with(",,1,2018-04-17T00:00:00Z,2018-04-17T00:00:00Z,B,2\r\n"));
    }

    #[test]
    fn schema_change_starts_new_block() {
        let other = table_from_rows(
            &["host"],
            &[("host", ColType::String), ("_value", ColType::Int)],
            vec![vec!["A".into(), ScalarValue::Int(1)]],
        );
        let got = encode(vec![cpu_table("A", &[1.0]), other]);
        assert_eq!(2, got.matches("#datatype").count());
        assert!(got.contains("\r\n\r\n#datatype,string,long,string,long\r\n"));
    }

    #[test]
    fn empty_table_carries_key_in_defaults() {
        let mut kb = GroupKeyBuilder::new();
        kb.add_key_value("host", "A").unwrap();
        let table = table_with_key(
            kb.build().unwrap(),
            &[("host", ColType::String), ("_value", ColType::Float)],
            Vec::new(),
        );
        let got = encode(vec![table]);
        let expected = "#datatype,string,long,string,double\r\n\
                        #group,false,false,true,false\r\n\
                        #default,_result,0,A,\r\n\
                        ,result,table,host,_value\r\n";
        assert_eq!(expected, got);
    }

    #[test]
    fn error_table() {
        let mut buf = Vec::new();
        let mut enc = ResultEncoder::new(ResultEncoderConfig::default());
        enc.encode_error(&mut buf, &DbError::new("query failed"))
            .unwrap();
        let expected = "#datatype,string,string\r\n\
                        #group,true,true\r\n\
                        #default,,\r\n\
                        ,error,reference\r\n\
                        ,query failed,\r\n";
        assert_eq!(expected, String::from_utf8(buf).unwrap());
    }

    #[test]
    fn custom_delimiter_no_header() {
        let mut buf = Vec::new();
        let mut enc = ResultEncoder::new(ResultEncoderConfig {
            annotations: vec![Annotation::Datatype],
            no_header: true,
            delimiter: b';',
        });
        let table = table_from_rows(&[], &[("_value", ColType::Int)], vec![vec![ScalarValue::Int(7)]]);
        enc.encode_tables(&mut buf, "r", [Ok(table)]).unwrap();
        assert_eq!(
            "#datatype;string;long;long\r\n;r;0;7\r\n",
            String::from_utf8(buf).unwrap()
        );
    }

    #[derive(Debug)]
    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("pipe closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_is_io() {
        let mut enc = ResultEncoder::new(ResultEncoderConfig::default());
        let err = enc
            .encode_tables(BrokenWriter, "_result", [Ok(cpu_table("A", &[1.0]))])
            .unwrap_err();
        assert_eq!(ErrorKind::Io, err.kind());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn multi_result_encodes_query_error() {
        let (ok, mut ok_writer) = new_result("a", 4);
        let (failed, mut failed_writer) = new_result("b", 4);
        let id = DatasetId::new("ds");
        ok_writer.process(&id, cpu_table("A", &[1.0])).unwrap();
        ok_writer.finish(&id, None);
        failed_writer.finish(&id, Some(DbError::new("boom")));

        let mut buf = Vec::new();
        let mut enc = MultiResultEncoder::new(ResultEncoderConfig::default());
        let n = enc.encode(&mut buf, [ok, failed]).await.unwrap();
        assert_eq!(buf.len() as u64, n);

        let got = String::from_utf8(buf).unwrap();
        assert!(got.starts_with("#datatype,string,long,dateTime:RFC3339"));
        assert!(got.contains(",,0,2018-04-17T00:00:00Z,2018-04-17T00:00:00Z,A,1\r\n\r\n"));
        assert!(got.ends_with(",error,reference\r\n,boom,\r\n"));
    }
}
