use fluxion_error::{DbError, ErrorKind, Result};
use serde::{Deserialize, Serialize};

/// Annotation rows written before each schema block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Annotation {
    Datatype,
    Group,
    Default,
}

impl Annotation {
    pub const ALL: [Annotation; 3] = [Annotation::Datatype, Annotation::Group, Annotation::Default];

    pub fn as_str(&self) -> &'static str {
        match self {
            Annotation::Datatype => "datatype",
            Annotation::Group => "group",
            Annotation::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultEncoderConfig {
    pub annotations: Vec<Annotation>,
    /// Skip the column label row.
    pub no_header: bool,
    #[serde(with = "delimiter")]
    pub delimiter: u8,
}

impl Default for ResultEncoderConfig {
    fn default() -> Self {
        ResultEncoderConfig {
            annotations: Annotation::ALL.to_vec(),
            no_header: false,
            delimiter: b',',
        }
    }
}

impl ResultEncoderConfig {
    pub fn has_annotation(&self, annotation: Annotation) -> bool {
        self.annotations.contains(&annotation)
    }
}

/// Rows buffered per batch when decoding.
pub const DEFAULT_MAX_BUFFER_COUNT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultDecoderConfig {
    /// Input has no column label row. Columns are named `col0`, `col1`, ...
    pub no_header: bool,
    /// Rows read before they are appended to the table being built. Zero
    /// uses the default.
    pub max_buffer_count: usize,
    #[serde(with = "delimiter")]
    pub delimiter: u8,
}

impl Default for ResultDecoderConfig {
    fn default() -> Self {
        ResultDecoderConfig {
            no_header: false,
            max_buffer_count: DEFAULT_MAX_BUFFER_COUNT,
            delimiter: b',',
        }
    }
}

impl ResultDecoderConfig {
    pub(crate) fn buffer_count(&self) -> usize {
        if self.max_buffer_count == 0 {
            DEFAULT_MAX_BUFFER_COUNT
        } else {
            self.max_buffer_count
        }
    }
}

/// Delimiters that would make the output ambiguous.
pub(crate) fn check_delimiter(delimiter: u8) -> Result<()> {
    if matches!(delimiter, b'\r' | b'\n' | b'"') || !delimiter.is_ascii() {
        return Err(DbError::new("Invalid CSV delimiter")
            .with_kind(ErrorKind::Encode)
            .with_field("delimiter", delimiter.escape_ascii()));
    }
    Ok(())
}

/// Serialize a delimiter byte as a one character string.
mod delimiter {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delimiter: &u8, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&(*delimiter as char).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let s = String::deserialize(d)?;
        match s.as_bytes() {
            [] => Ok(b','),
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(D::Error::custom(format!(
                "delimiter must be a single ASCII character, got '{s}'"
            ))),
        }
    }
}
