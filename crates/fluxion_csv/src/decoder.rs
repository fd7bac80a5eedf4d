use std::io::Read;
use std::mem;
use std::sync::Arc;

use fluxion_core::arrays::allocator::Allocator;
use fluxion_core::arrays::builder::TableBuilder;
use fluxion_core::arrays::coltype::{ColMeta, ColType};
use fluxion_core::arrays::group_key::GroupKey;
use fluxion_core::arrays::scalar::ScalarValue;
use fluxion_core::arrays::table::ColumnTable;
use fluxion_error::{DbError, ErrorKind, Result};
use tracing::{debug, trace};

use crate::config::{Annotation, ResultDecoderConfig};
use crate::datatype::{
    ANNOTATION_IDX, COMMENT_PREFIX, ERROR_LABEL, RECORD_START_IDX, RESULT_IDX, TABLE_IDX,
    parse_datatype, parse_value,
};

fn read_error(err: csv::Error) -> DbError {
    let kind = if err.is_io_error() {
        ErrorKind::Io
    } else {
        ErrorKind::Other
    };
    DbError::with_source("Failed to read CSV", Box::new(err)).with_kind(kind)
}

/// Reads CSV lines with one line of lookahead.
#[derive(Debug)]
struct LineReader<R> {
    csv: csv::Reader<R>,
    record: csv::StringRecord,
    pending: Option<Vec<String>>,
    /// Line number of the most recently read record.
    line: u64,
}

impl<R: Read> LineReader<R> {
    fn new(r: R, config: &ResultDecoderConfig) -> Self {
        let csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(config.delimiter)
            .from_reader(r);
        LineReader {
            csv,
            record: csv::StringRecord::new(),
            pending: None,
            line: 0,
        }
    }

    /// Next non-blank line, or `None` at the end of input.
    fn next_line(&mut self) -> Result<Option<Vec<String>>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        loop {
            if !self.csv.read_record(&mut self.record).map_err(read_error)? {
                return Ok(None);
            }
            if let Some(pos) = self.record.position() {
                self.line = pos.line();
            }
            if self.record.len() == 1 && self.record[0].is_empty() {
                continue;
            }
            return Ok(Some(self.record.iter().map(str::to_string).collect()));
        }
    }

    fn unread(&mut self, line: Vec<String>) {
        self.pending = Some(line);
    }

    fn peek(&mut self) -> Result<Option<&[String]>> {
        if self.pending.is_none() {
            self.pending = self.next_line()?;
        }
        Ok(self.pending.as_deref())
    }

    fn field_count_error(&self, expected: usize, got: usize) -> DbError {
        DbError::new("Unexpected number of fields")
            .with_kind(ErrorKind::FieldCountMismatch)
            .with_field("line", self.line)
            .with_field("expected", expected)
            .with_field("got", got)
    }
}

fn missing_annotation(annotation: Annotation) -> DbError {
    DbError::new("Missing expected annotation")
        .with_kind(ErrorKind::MissingAnnotation)
        .with_field("annotation", annotation.as_str())
}

/// Schema of one annotation block.
#[derive(Debug, Clone)]
struct TableMeta {
    result_id: String,
    table_id: String,
    cols: Vec<ColMeta>,
    groups: Vec<bool>,
    defaults: Vec<Option<ScalarValue>>,
    num_fields: usize,
}

/// Read annotation rows and the header.
///
/// Returns `None` when the input ends before any annotation. An error table
/// in place of a header is returned as an error carrying its message.
fn read_meta<R: Read>(
    reader: &mut LineReader<R>,
    config: &ResultDecoderConfig,
) -> Result<Option<TableMeta>> {
    let mut num_fields = None;
    let mut result_id = String::new();
    let mut table_id = String::new();
    let mut datatypes: Option<Vec<String>> = None;
    let mut groups: Option<Vec<String>> = None;
    let mut defaults: Option<Vec<String>> = None;

    let first_missing = |datatypes: &Option<_>, groups: &Option<_>| {
        if datatypes.is_none() {
            Annotation::Datatype
        } else if groups.is_none() {
            Annotation::Group
        } else {
            Annotation::Default
        }
    };

    while datatypes.is_none() || groups.is_none() || defaults.is_none() {
        let Some(line) = reader.next_line()? else {
            if datatypes.is_none() && groups.is_none() && defaults.is_none() {
                return Ok(None);
            }
            return Err(missing_annotation(first_missing(&datatypes, &groups)));
        };
        let n = *num_fields.get_or_insert(line.len());
        if line.len() != n || n < RECORD_START_IDX {
            return Err(reader
                .field_count_error(n, line.len())
                .with_field("reading", "annotations"));
        }

        let annotation = line[ANNOTATION_IDX]
            .strip_prefix(COMMENT_PREFIX)
            .unwrap_or(&line[ANNOTATION_IDX]);
        let fields = || line[RECORD_START_IDX..].to_vec();
        match annotation {
            a if a == Annotation::Datatype.as_str() => datatypes = Some(fields()),
            a if a == Annotation::Group.as_str() => groups = Some(fields()),
            a if a == Annotation::Default.as_str() => {
                result_id = line[RESULT_IDX].clone();
                table_id = line[TABLE_IDX].clone();
                defaults = Some(fields());
            }
            "" => return Err(missing_annotation(first_missing(&datatypes, &groups))),
            other => trace!(annotation = other, "skipping unknown annotation"),
        }
    }
    // Loop exits only once all three are set.
    let (Some(datatypes), Some(groups), Some(defaults), Some(num_fields)) =
        (datatypes, groups, defaults, num_fields)
    else {
        return Err(missing_annotation(Annotation::Datatype));
    };

    let labels: Vec<String> = if config.no_header {
        (0..datatypes.len()).map(|i| format!("col{i}")).collect()
    } else {
        let line = reader
            .next_line()?
            .ok_or_else(|| DbError::new("Missing expected header row"))?;
        if line.len() != num_fields {
            return Err(reader
                .field_count_error(num_fields, line.len())
                .with_field("reading", "header"));
        }
        if line[RESULT_IDX] == ERROR_LABEL {
            return Err(read_error_table(reader, num_fields));
        }
        line[RECORD_START_IDX..].to_vec()
    };

    let mut cols = Vec::with_capacity(labels.len());
    let mut default_values = Vec::with_capacity(labels.len());
    for (j, label) in labels.into_iter().enumerate() {
        let typ = parse_datatype(&datatypes[j]).map_err(|e| e.with_field("column", &label))?;
        let default = match defaults[j].as_str() {
            "" => None,
            cell => Some(parse_value(typ, cell).map_err(|e| {
                e.with_field("column", &label).with_field("reading", "defaults")
            })?),
        };
        cols.push(ColMeta::new(label, typ));
        default_values.push(default);
    }

    Ok(Some(TableMeta {
        result_id,
        table_id,
        cols,
        groups: groups.iter().map(|g| g == "true").collect(),
        defaults: default_values,
        num_fields,
    }))
}

/// Turn the row following an error header into the error it reports.
fn read_error_table<R: Read>(reader: &mut LineReader<R>, num_fields: usize) -> DbError {
    match reader.next_line() {
        Ok(Some(line)) if line.len() == num_fields => DbError::new(line[RESULT_IDX].clone()),
        Ok(Some(line)) => reader
            .field_count_error(num_fields, line.len())
            .with_field("reading", "error table"),
        Ok(None) => DbError::new("Unexpected end of input reading error table"),
        Err(err) => err,
    }
}

/// Builds one table from consecutive rows of a block.
#[derive(Debug)]
struct TableDecoder<'a> {
    meta: &'a TableMeta,
    allocator: &'a Arc<Allocator>,
    buffer_count: usize,
    table_id: String,
    builder: Option<TableBuilder>,
    batch: Vec<Vec<String>>,
}

impl<'a> TableDecoder<'a> {
    fn new(meta: &'a TableMeta, allocator: &'a Arc<Allocator>, buffer_count: usize) -> Self {
        TableDecoder {
            meta,
            allocator,
            buffer_count,
            table_id: String::new(),
            builder: None,
            batch: Vec::new(),
        }
    }

    /// Set up the group key and columns from the block defaults and the
    /// first row if there is one.
    fn init(&mut self, first: Option<&[String]>) -> Result<()> {
        self.table_id = match first {
            Some(line) if !line[TABLE_IDX].is_empty() => line[TABLE_IDX].clone(),
            _ if !self.meta.table_id.is_empty() => self.meta.table_id.clone(),
            _ => return Err(DbError::new("Missing table id")),
        };
        let record = first.map(|line| &line[RECORD_START_IDX..]);

        let mut key_cols = Vec::new();
        let mut key_values = Vec::new();
        for (j, col) in self.meta.cols.iter().enumerate() {
            if !self.meta.groups[j] {
                continue;
            }
            let value = match (&self.meta.defaults[j], record) {
                (Some(v), _) => v.clone(),
                (None, Some(record)) => parse_value(col.typ, &record[j])
                    .map_err(|e| e.with_field("column", &col.label))?,
                // An empty default cell is an empty string key value.
                (None, None) if col.typ == ColType::String => ScalarValue::String(String::new()),
                (None, None) => {
                    return Err(DbError::new("Missing value for group key column")
                        .with_field("column", &col.label));
                }
            };
            key_cols.push(col.clone());
            key_values.push(value);
        }

        let mut builder = TableBuilder::new(GroupKey::try_new(key_cols, key_values)?, self.allocator);
        for col in &self.meta.cols {
            builder.add_col(col.clone())?;
        }
        self.builder = Some(builder);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.builder.is_some()
    }

    fn push(&mut self, line: Vec<String>) -> Result<()> {
        self.batch.push(line);
        if self.batch.len() >= self.buffer_count {
            self.flush()?;
        }
        Ok(())
    }

    /// Append the buffered rows to the builder.
    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let Some(builder) = self.builder.as_mut() else {
            return Err(DbError::new("Rows buffered before table initialization"));
        };
        for line in self.batch.drain(..) {
            for (j, col) in self.meta.cols.iter().enumerate() {
                let cell = &line[RECORD_START_IDX + j];
                match &self.meta.defaults[j] {
                    Some(default) if cell.is_empty() => builder.append_value(j, default)?,
                    _ => {
                        let value = parse_value(col.typ, cell)
                            .map_err(|e| e.with_field("column", &col.label))?;
                        builder.append_value(j, &value)?;
                    }
                }
            }
        }
        trace!(table = %self.table_id, rows = builder.num_rows(), "appended batch");
        Ok(())
    }

    fn finish(mut self) -> Result<ColumnTable> {
        if !self.is_initialized() {
            self.init(None)?;
        }
        self.flush()?;
        self.builder
            .as_ref()
            .ok_or_else(|| DbError::new("Table builder missing after initialization"))?
            .table()
    }
}

/// Read the rows of one table. Stops at the end of input, at a new
/// annotation block, or when the table id changes. The line that ended the
/// table is left pending in `reader`.
fn read_table<R: Read>(
    reader: &mut LineReader<R>,
    meta: &TableMeta,
    allocator: &Arc<Allocator>,
    buffer_count: usize,
) -> Result<ColumnTable> {
    let mut table = TableDecoder::new(meta, allocator, buffer_count);
    while let Some(line) = reader.next_line()? {
        if line.len() != meta.num_fields {
            if line[ANNOTATION_IDX].is_empty() {
                return Err(reader
                    .field_count_error(meta.num_fields, line.len())
                    .with_field("reading", "rows"));
            }
            reader.unread(line);
            break;
        }
        if !line[ANNOTATION_IDX].is_empty() {
            reader.unread(line);
            break;
        }
        if !table.is_initialized() {
            table.init(Some(line.as_slice()))?;
        }
        if !line[TABLE_IDX].is_empty() && line[TABLE_IDX] != table.table_id {
            reader.unread(line);
            break;
        }
        table.push(line)?;
    }
    table.finish()
}

/// What follows a decoded result.
#[derive(Debug)]
enum Next {
    Start,
    Meta(TableMeta),
    Error(DbError),
    Done,
}

/// Tables of one decoded result.
#[derive(Debug, Clone)]
pub struct DecodedResult {
    name: String,
    tables: Vec<ColumnTable>,
}

impl DecodedResult {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tables(&self) -> &[ColumnTable] {
        &self.tables
    }

    pub fn into_tables(self) -> Vec<ColumnTable> {
        self.tables
    }
}

/// Decode every table of the result starting with `meta`.
fn decode_result<R: Read>(
    reader: &mut LineReader<R>,
    config: &ResultDecoderConfig,
    allocator: &Arc<Allocator>,
    mut meta: TableMeta,
) -> Result<(DecodedResult, Next)> {
    let name = meta.result_id.clone();
    let mut tables = Vec::new();
    let next = loop {
        tables.push(read_table(reader, &meta, allocator, config.buffer_count())?);

        let new_block = match reader.peek()? {
            None => break Next::Done,
            Some(line) => !line[ANNOTATION_IDX].is_empty(),
        };
        if !new_block {
            continue;
        }
        match read_meta(reader, config) {
            Ok(Some(m)) if m.result_id == name => meta = m,
            Ok(Some(m)) => break Next::Meta(m),
            Ok(None) => break Next::Done,
            Err(err) => break Next::Error(err),
        }
    };
    debug!(result = %name, tables = tables.len(), "decoded result");
    Ok((DecodedResult { name, tables }, next))
}

/// Decodes the first result of annotated CSV input.
#[derive(Debug, Clone, Default)]
pub struct ResultDecoder {
    config: ResultDecoderConfig,
}

impl ResultDecoder {
    pub fn new(config: ResultDecoderConfig) -> Self {
        ResultDecoder { config }
    }

    /// Decode the first result. Tables are allocated from `allocator`.
    pub fn decode<R: Read>(&self, r: R, allocator: &Arc<Allocator>) -> Result<DecodedResult> {
        let mut reader = LineReader::new(r, &self.config);
        let meta = read_meta(&mut reader, &self.config)?
            .ok_or_else(|| DbError::new("No result in CSV input"))?;
        let (result, _) = decode_result(&mut reader, &self.config, allocator, meta)?;
        Ok(result)
    }
}

/// Decodes a sequence of results from annotated CSV input.
#[derive(Debug, Clone, Default)]
pub struct MultiResultDecoder {
    config: ResultDecoderConfig,
}

impl MultiResultDecoder {
    pub fn new(config: ResultDecoderConfig) -> Self {
        MultiResultDecoder { config }
    }

    pub fn decode<R: Read>(&self, r: R, allocator: &Arc<Allocator>) -> DecodedResults<R> {
        DecodedResults {
            reader: LineReader::new(r, &self.config),
            config: self.config.clone(),
            allocator: allocator.clone(),
            next: Next::Start,
        }
    }
}

/// Iterator over decoded results.
///
/// An error table in the input is yielded as an `Err`, after which the
/// iterator ends.
#[derive(Debug)]
pub struct DecodedResults<R> {
    reader: LineReader<R>,
    config: ResultDecoderConfig,
    allocator: Arc<Allocator>,
    next: Next,
}

impl<R: Read> Iterator for DecodedResults<R> {
    type Item = Result<DecodedResult>;

    fn next(&mut self) -> Option<Self::Item> {
        let meta = match mem::replace(&mut self.next, Next::Done) {
            Next::Done => return None,
            Next::Error(err) => return Some(Err(err)),
            Next::Meta(meta) => meta,
            Next::Start => match read_meta(&mut self.reader, &self.config) {
                Ok(Some(meta)) => meta,
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            },
        };
        match decode_result(&mut self.reader, &self.config, &self.allocator, meta) {
            Ok((result, next)) => {
                self.next = next;
                Some(Ok(result))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use fluxion_core::arrays::coltype::ColType;
    use fluxion_core::arrays::group_key::GroupKeyBuilder;
    use fluxion_core::testutil::{assert_tables_equal, table_from_rows, table_rows, table_with_key};
    use fluxion_core::values::time::Time;

    use super::*;
    use crate::config::ResultEncoderConfig;
    use crate::encoder::ResultEncoder;

    fn alloc() -> Arc<Allocator> {
        Arc::new(Allocator::new())
    }

    fn time(s: &str) -> ScalarValue {
        ScalarValue::Time(Time::parse_rfc3339(s).unwrap())
    }

    fn decode(text: &str) -> Result<DecodedResult> {
        ResultDecoder::default().decode(text.as_bytes(), &alloc())
    }

    fn host_table(host: &str, values: &[i64]) -> ColumnTable {
        table_from_rows(
            &["host"],
            &[
                ("_time", ColType::Time),
                ("host", ColType::String),
                ("_value", ColType::Int),
            ],
            values
                .iter()
                .map(|v| {
                    vec![
                        time("2018-04-17T00:00:00.5Z"),
                        host.into(),
                        ScalarValue::Int(*v),
                    ]
                })
                .collect(),
        )
    }

    fn encode(name: &str, tables: Vec<ColumnTable>) -> String {
        let mut buf = Vec::new();
        ResultEncoder::new(ResultEncoderConfig::default())
            .encode_tables(&mut buf, name, tables.into_iter().map(Ok))
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn decodes_encoder_output() {
        let tables = vec![host_table("A", &[1, 2]), host_table("B", &[3])];
        let text = encode("_result", tables.clone());
        let result = decode(&text).unwrap();
        assert_eq!("_result", result.name());
        assert_eq!(2, result.tables().len());
        for (expected, got) in tables.iter().zip(result.tables()) {
            assert_tables_equal(expected, got);
        }
    }

    #[test]
    fn table_id_change_splits_tables() {
        let text = "#datatype,string,long,string,double\n\
                    #group,false,false,true,false\n\
                    #default,_result,,,\n\
                    ,result,table,host,_value\n\
                    ,,0,A,1\n\
                    ,,0,A,2\n\
                    ,,1,B,3\n";
        let result = decode(text).unwrap();
        let tables = result.tables();
        assert_eq!(2, tables.len());
        assert_eq!(Some(&ScalarValue::from("A")), tables[0].key().label_value("host"));
        assert_eq!(2, tables[0].num_rows());
        assert_eq!(Some(&ScalarValue::from("B")), tables[1].key().label_value("host"));
        assert_eq!(vec![vec![ScalarValue::from("B"), ScalarValue::Float(3.0)]], table_rows(&tables[1]));
    }

    #[test]
    fn defaults_fill_empty_cells() {
        let text = "#datatype,string,long,string,long\n\
                    #group,false,false,true,false\n\
                    #default,got,,cpu,\n\
                    ,result,table,host,_value\n\
                    ,,0,,1\n\
                    ,,0,,2\n";
        let result = decode(text).unwrap();
        assert_eq!("got", result.name());
        let table = &result.tables()[0];
        assert_eq!(Some(&ScalarValue::from("cpu")), table.key().label_value("host"));
        assert_eq!(
            vec![
                vec![ScalarValue::from("cpu"), ScalarValue::Int(1)],
                vec![ScalarValue::from("cpu"), ScalarValue::Int(2)],
            ],
            table_rows(table)
        );
    }

    #[test]
    fn empty_tables_from_defaults() {
        let mut kb = GroupKeyBuilder::new();
        kb.add_key_value("host", "A").unwrap();
        let empty = table_with_key(
            kb.build().unwrap(),
            &[
                ("_time", ColType::Time),
                ("host", ColType::String),
                ("_value", ColType::Int),
            ],
            Vec::new(),
        );
        let tables = vec![empty, host_table("B", &[5]), host_table("C", &[6])];
        let result = decode(&encode("_result", tables.clone())).unwrap();
        assert_eq!(3, result.tables().len());
        for (expected, got) in tables.iter().zip(result.tables()) {
            assert_tables_equal(expected, got);
        }
    }

    #[test]
    fn empty_string_key_from_empty_default() {
        let mut kb = GroupKeyBuilder::new();
        kb.add_key_value("host", "").unwrap();
        let empty = table_with_key(
            kb.build().unwrap(),
            &[("host", ColType::String), ("_value", ColType::Int)],
            Vec::new(),
        );
        let text = encode("_result", vec![empty.clone()]);
        assert!(text.contains("#default,_result,0,,\r\n"), "{text}");
        let result = decode(&text).unwrap();
        assert_eq!(1, result.tables().len());
        assert_tables_equal(&empty, &result.tables()[0]);
    }

    #[test]
    fn empty_long_key_without_default_is_error() {
        let text = "#datatype,string,long,long,long\n\
                    #group,false,false,true,false\n\
                    #default,_result,0,,\n\
                    ,result,table,id,_value\n";
        let err = decode(text).unwrap_err();
        assert_eq!(Some("id"), err.field("column"));
    }

    #[test]
    fn small_batches_build_whole_tables() {
        let text = encode("_result", vec![host_table("A", &[1, 2, 3, 4, 5])]);
        let decoder = ResultDecoder::new(ResultDecoderConfig {
            max_buffer_count: 2,
            ..Default::default()
        });
        let result = decoder.decode(text.as_bytes(), &alloc()).unwrap();
        assert_eq!(1, result.tables().len());
        assert_eq!(5, result.tables()[0].num_rows());
    }

    #[test]
    fn short_row_is_field_count_mismatch() {
        let text = "#datatype,string,long,long\n\
                    #group,false,false,false\n\
                    #default,_result,,\n\
                    ,result,table,_value\n\
                    ,,0,1\n\
                    ,,0\n";
        let err = decode(text).unwrap_err();
        assert_eq!(ErrorKind::FieldCountMismatch, err.kind());
        assert_eq!(Some("6"), err.field("line"));
    }

    #[test]
    fn unsupported_datatype() {
        let text = "#datatype,string,long,decimal\n\
                    #group,false,false,false\n\
                    #default,_result,,\n\
                    ,result,table,_value\n";
        let err = decode(text).unwrap_err();
        assert_eq!(ErrorKind::UnsupportedDatatype, err.kind());
        assert_eq!(Some("_value"), err.field("column"));
    }

    #[test]
    fn missing_annotation() {
        let text = "#datatype,string,long,long\n\
                    #group,false,false,false\n";
        let err = decode(text).unwrap_err();
        assert_eq!(ErrorKind::MissingAnnotation, err.kind());
        assert_eq!(Some("default"), err.field("annotation"));

        let text = "#datatype,string,long,long\n\
                    ,result,table,_value\n";
        let err = decode(text).unwrap_err();
        assert_eq!(Some("group"), err.field("annotation"));
    }

    #[test]
    fn no_header_names_columns() {
        let text = "#datatype,string,long,string,long\n\
                    #group,false,false,false,false\n\
                    #default,_result,,,\n\
                    ,,0,a,1\n";
        let decoder = ResultDecoder::new(ResultDecoderConfig {
            no_header: true,
            ..Default::default()
        });
        let result = decoder.decode(text.as_bytes(), &alloc()).unwrap();
        let labels: Vec<_> = result.tables()[0].cols().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(vec!["col0", "col1"], labels);
    }

    #[test]
    fn multiple_results() {
        let text = format!(
            "{}\r\n{}\r\n",
            encode("a", vec![host_table("A", &[1])]),
            encode("b", vec![host_table("B", &[2]), host_table("C", &[3])]),
        );
        let results: Vec<_> = MultiResultDecoder::default()
            .decode(text.as_bytes(), &alloc())
            .collect::<Result<_>>()
            .unwrap();
        let summary: Vec<_> = results.iter().map(|r| (r.name(), r.tables().len())).collect();
        assert_eq!(vec![("a", 1), ("b", 2)], summary);
    }

    #[test]
    fn error_table_ends_results() {
        let mut buf = encode("a", vec![host_table("A", &[1])]).into_bytes();
        buf.extend_from_slice(b"\r\n");
        let mut enc = ResultEncoder::new(ResultEncoderConfig::default());
        enc.encode_error(&mut buf, &DbError::new("query failed"))
            .unwrap();

        let mut results = MultiResultDecoder::default().decode(buf.as_slice(), &alloc());
        assert_eq!("a", results.next().unwrap().unwrap().name());
        let err = results.next().unwrap().unwrap_err();
        assert_eq!("query failed", err.message());
        assert!(results.next().is_none());
    }

    #[test]
    fn empty_input_has_no_results() {
        assert!(MultiResultDecoder::default().decode(&b""[..], &alloc()).next().is_none());
        assert!(decode("").is_err());
    }

    #[test]
    fn tables_accounted_against_allocator() {
        let text = encode("_result", vec![host_table("A", &[1, 2, 3])]);
        let alloc = Arc::new(Allocator::with_limit(16));
        let err = ResultDecoder::default()
            .decode(text.as_bytes(), &alloc)
            .unwrap_err();
        assert_eq!(ErrorKind::ResourceExhausted, err.kind());
    }
}
