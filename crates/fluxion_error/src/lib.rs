use std::error::Error;
use std::fmt;
use std::sync::Arc;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Broad classification of an error.
///
/// Kinds let callers distinguish compile failures (surfaced before anything
/// runs) from failures that abort a running query, and let the CSV encoder
/// tell bad data apart from a broken writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Other,
    /// Type unification failed during compilation.
    TypeError,
    /// The compiler does not know how to lower a node.
    UnsupportedNode,
    /// An expression statement whose value would be discarded.
    NoSideEffects,
    /// An evaluator was asked for a kind it does not produce.
    WrongKind,
    /// Typed column access on a column of a different type.
    ColumnTypeMismatch,
    ColumnNotFound,
    /// Attempted to aggregate or select on a group key column.
    KeyColumnConflict,
    UnsupportedSelectorType,
    /// Allocation would exceed the memory quota.
    ResourceExhausted,
    FieldCountMismatch,
    UnsupportedDatatype,
    MissingAnnotation,
    /// Data could not be encoded.
    Encode,
    /// The underlying reader or writer failed.
    Io,
    Canceled,
    /// A task panicked and the panic was recovered.
    Panic,
    InvalidPlan,
    DuplicateRegistration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Other => "other",
            Self::TypeError => "type error",
            Self::UnsupportedNode => "unsupported node",
            Self::NoSideEffects => "no side effects",
            Self::WrongKind => "wrong kind",
            Self::ColumnTypeMismatch => "column type mismatch",
            Self::ColumnNotFound => "column not found",
            Self::KeyColumnConflict => "key column conflict",
            Self::UnsupportedSelectorType => "unsupported selector type",
            Self::ResourceExhausted => "resource exhausted",
            Self::FieldCountMismatch => "field count mismatch",
            Self::UnsupportedDatatype => "unsupported datatype",
            Self::MissingAnnotation => "missing annotation",
            Self::Encode => "encode",
            Self::Io => "io",
            Self::Canceled => "canceled",
            Self::Panic => "panic",
            Self::InvalidPlan => "invalid plan",
            Self::DuplicateRegistration => "duplicate registration",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone)]
pub struct DbError {
    inner: Box<DbErrorInner>,
}

#[derive(Clone)]
struct DbErrorInner {
    kind: ErrorKind,
    msg: String,
    /// Additional key/value context attached to the error.
    fields: Vec<(String, String)>,
    source: Option<Arc<dyn Error + Send + Sync>>,
}

impl DbError {
    pub fn new(msg: impl Into<String>) -> Self {
        DbError {
            inner: Box::new(DbErrorInner {
                kind: ErrorKind::Other,
                msg: msg.into(),
                fields: Vec::new(),
                source: None,
            }),
        }
    }

    pub fn with_source(msg: impl Into<String>, source: Box<dyn Error + Send + Sync>) -> Self {
        let mut err = Self::new(msg);
        err.inner.source = Some(Arc::from(source));
        err
    }

    /// Set the kind for this error.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.inner.kind = kind;
        self
    }

    /// Attach a field to this error.
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.inner.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn message(&self) -> &str {
        &self.inner.msg
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.inner.fields
    }

    /// Get a field value by key.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.inner
            .fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Errors produced while compiling a function, before any execution.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TypeError | ErrorKind::UnsupportedNode | ErrorKind::NoSideEffects
        )
    }

    pub fn is_eval_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::WrongKind | ErrorKind::ColumnTypeMismatch
        )
    }

    pub fn is_schema_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ColumnNotFound
                | ErrorKind::KeyColumnConflict
                | ErrorKind::UnsupportedSelectorType
        )
    }

    pub fn is_codec_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::FieldCountMismatch
                | ErrorKind::UnsupportedDatatype
                | ErrorKind::MissingAnnotation
                | ErrorKind::Encode
        )
    }

    pub fn is_canceled(&self) -> bool {
        self.kind() == ErrorKind::Canceled
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.msg)?;
        if !self.inner.fields.is_empty() {
            write!(f, " (")?;
            for (idx, (k, v)) in self.inner.fields.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}: {v}")?;
            }
            write!(f, ")")?;
        }
        if let Some(source) = &self.inner.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbError")
            .field("kind", &self.inner.kind)
            .field("msg", &self.inner.msg)
            .field("fields", &self.inner.fields)
            .field("source", &self.inner.source)
            .finish()
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<fmt::Error> for DbError {
    fn from(value: fmt::Error) -> Self {
        DbError::with_source("Format error", Box::new(value))
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        DbError::with_source("IO error", Box::new(value)).with_kind(ErrorKind::Io)
    }
}

/// Extension trait for wrapping foreign errors with a message.
pub trait ResultExt<T, E> {
    fn context(self, msg: &'static str) -> Result<T>;
    fn context_fn<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Error + Send + Sync + 'static> ResultExt<T, E> for std::result::Result<T, E> {
    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| DbError::with_source(msg, Box::new(e)))
    }

    fn context_fn<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| DbError::with_source(f(), Box::new(e)))
    }
}

pub trait OptionExt<T> {
    /// Return an error if the option is None.
    fn required(self, msg: &'static str) -> Result<T>;

    /// Return the error built by `f` if the option is None.
    fn required_with<F: FnOnce() -> DbError>(self, f: F) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T> {
        self.ok_or_else(|| DbError::new(msg))
    }

    fn required_with<F: FnOnce() -> DbError>(self, f: F) -> Result<T> {
        self.ok_or_else(f)
    }
}

#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)+) => {{
        let msg = format!($($arg)+);
        return Err($crate::DbError::new(format!("Not yet implemented: {msg}")));
    }};
}
