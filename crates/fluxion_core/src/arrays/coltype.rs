use std::fmt;

use serde::{Deserialize, Serialize};

use crate::values::types::Type;

/// The fixed set of types a table column can hold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ColType {
    Bool,
    Int,
    UInt,
    Float,
    String,
    Time,
}

impl ColType {
    /// Get the column type for a semantic type, if there is one.
    pub fn from_type(typ: &Type) -> Option<ColType> {
        Some(match typ {
            Type::Bool => ColType::Bool,
            Type::Int => ColType::Int,
            Type::UInt => ColType::UInt,
            Type::Float => ColType::Float,
            Type::String => ColType::String,
            Type::Time => ColType::Time,
            _ => return None,
        })
    }

    pub fn as_type(&self) -> Type {
        match self {
            ColType::Bool => Type::Bool,
            ColType::Int => Type::Int,
            ColType::UInt => Type::UInt,
            ColType::Float => Type::Float,
            ColType::String => Type::String,
            ColType::Time => Type::Time,
        }
    }
}

impl fmt::Display for ColType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColType::Bool => "bool",
            ColType::Int => "int",
            ColType::UInt => "uint",
            ColType::Float => "float",
            ColType::String => "string",
            ColType::Time => "time",
        };
        write!(f, "{s}")
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColMeta {
    pub label: String,
    #[serde(rename = "type")]
    pub typ: ColType,
}

impl ColMeta {
    pub fn new(label: impl Into<String>, typ: ColType) -> Self {
        ColMeta {
            label: label.into(),
            typ,
        }
    }
}

/// Find the index of a column by label.
pub fn col_idx(label: &str, cols: &[ColMeta]) -> Option<usize> {
    cols.iter().position(|c| c.label == label)
}
