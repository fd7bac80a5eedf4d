//! Column datatypes and cell values in their annotated CSV spelling.

use fluxion_core::arrays::coltype::ColType;
use fluxion_core::arrays::scalar::ScalarValue;
use fluxion_core::values::time::Time;
use fluxion_error::{DbError, ErrorKind, Result};

pub(crate) const ANNOTATION_IDX: usize = 0;
pub(crate) const RESULT_IDX: usize = 1;
pub(crate) const TABLE_IDX: usize = 2;
pub(crate) const RECORD_START_IDX: usize = 3;

pub(crate) const COMMENT_PREFIX: &str = "#";
pub(crate) const RESULT_LABEL: &str = "result";
pub(crate) const TABLE_LABEL: &str = "table";
pub(crate) const ERROR_LABEL: &str = "error";
pub(crate) const REFERENCE_LABEL: &str = "reference";

const STRING_DATATYPE: &str = "string";
const TIME_DATATYPE: &str = "dateTime";
const FLOAT_DATATYPE: &str = "double";
const BOOL_DATATYPE: &str = "boolean";
const INT_DATATYPE: &str = "long";
const UINT_DATATYPE: &str = "unsignedLong";

/// Datatype token written for a column type.
pub(crate) fn datatype_name(typ: ColType) -> &'static str {
    match typ {
        ColType::Bool => BOOL_DATATYPE,
        ColType::Int => INT_DATATYPE,
        ColType::UInt => UINT_DATATYPE,
        ColType::Float => FLOAT_DATATYPE,
        ColType::String => STRING_DATATYPE,
        ColType::Time => "dateTime:RFC3339",
    }
}

/// Parse a datatype token such as `long` or `dateTime:RFC3339Nano`.
pub(crate) fn parse_datatype(token: &str) -> Result<ColType> {
    let (name, format) = match token.split_once(':') {
        Some((name, format)) => (name, Some(format)),
        None => (token, None),
    };
    let typ = match name {
        BOOL_DATATYPE => ColType::Bool,
        INT_DATATYPE => ColType::Int,
        UINT_DATATYPE => ColType::UInt,
        FLOAT_DATATYPE => ColType::Float,
        STRING_DATATYPE => ColType::String,
        TIME_DATATYPE => ColType::Time,
        _ => return Err(unsupported_datatype(token)),
    };
    match (typ, format) {
        (_, None) => Ok(typ),
        (ColType::Time, Some("RFC3339" | "RFC3339Nano")) => Ok(typ),
        _ => Err(unsupported_datatype(token)),
    }
}

fn unsupported_datatype(token: &str) -> DbError {
    DbError::new("Unsupported datatype")
        .with_kind(ErrorKind::UnsupportedDatatype)
        .with_field("datatype", token)
}

fn parse_error(typ: ColType, cell: &str) -> DbError {
    DbError::new("Failed to parse value")
        .with_field("type", typ)
        .with_field("value", cell)
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Parse one cell as a value of `typ`.
pub(crate) fn parse_value(typ: ColType, cell: &str) -> Result<ScalarValue> {
    let value = match typ {
        ColType::Bool => parse_bool(cell).map(ScalarValue::Bool),
        ColType::Int => cell.parse().ok().map(ScalarValue::Int),
        ColType::UInt => cell.parse().ok().map(ScalarValue::UInt),
        ColType::Float => cell.parse().ok().map(ScalarValue::Float),
        ColType::String => Some(ScalarValue::String(cell.to_string())),
        ColType::Time => return Time::parse_rfc3339(cell).map(ScalarValue::Time),
    };
    value.ok_or_else(|| parse_error(typ, cell))
}

/// Format a value for a cell.
pub(crate) fn format_value(value: &ScalarValue) -> Result<String> {
    Ok(match value {
        ScalarValue::Bool(v) => v.to_string(),
        ScalarValue::Int(v) => v.to_string(),
        ScalarValue::UInt(v) => v.to_string(),
        ScalarValue::Float(v) => format_float(*v),
        ScalarValue::String(v) => v.clone(),
        ScalarValue::Time(v) => {
            if v.to_datetime().is_none() {
                return Err(DbError::new("Time out of range for RFC3339")
                    .with_kind(ErrorKind::Encode)
                    .with_field("nanos", v.nanos()));
            }
            v.to_string()
        }
    })
}

fn format_float(v: f64) -> String {
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    v.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datatypes() {
        assert_eq!(ColType::Time, parse_datatype("dateTime:RFC3339Nano").unwrap());
        assert_eq!(ColType::UInt, parse_datatype("unsignedLong").unwrap());
        for bad in ["decimal", "long:RFC3339", "dateTime:unix"] {
            let err = parse_datatype(bad).unwrap_err();
            assert_eq!(ErrorKind::UnsupportedDatatype, err.kind(), "{bad}");
        }
    }

    #[test]
    fn values_round_trip_through_text() {
        let cases = [
            (ColType::Bool, "true", ScalarValue::Bool(true)),
            (ColType::Int, "-42", ScalarValue::Int(-42)),
            (ColType::UInt, "42", ScalarValue::UInt(42)),
            (ColType::Float, "1.5", ScalarValue::Float(1.5)),
            (ColType::Float, "+Inf", ScalarValue::Float(f64::INFINITY)),
            (ColType::String, "a,b", ScalarValue::from("a,b")),
            (
                ColType::Time,
                "2018-05-22T19:53:26.000000001Z",
                ScalarValue::Time(Time(1_527_018_806_000_000_001)),
            ),
        ];
        for (typ, text, value) in cases {
            assert_eq!(value, parse_value(typ, text).unwrap(), "{text}");
            assert_eq!(text, format_value(&value).unwrap());
        }
    }

    #[test]
    fn bad_cells() {
        assert!(parse_value(ColType::Int, "1.5").is_err());
        assert!(parse_value(ColType::Bool, "yes").is_err());
        assert!(parse_value(ColType::Time, "yesterday").is_err());
    }
}
