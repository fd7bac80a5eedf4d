use std::fmt::Debug;

use super::coltype::ColType;
use super::column::ColumnBuffer;
use super::scalar::ScalarValue;
use crate::values::time::Time;

/// Marker types tying a column type to its native storage.
///
/// Generic code is written once over `PhysicalType` and instantiated per
/// column type when an operator is set up, so the per-row path does not
/// branch on the column type.
pub trait PhysicalType: Debug + Default + Sync + Send + Clone + Copy + 'static {
    const COL_TYPE: ColType;

    type Native: Debug + Clone + Default + PartialEq + PartialOrd + Sync + Send + 'static;

    fn get(buffer: &ColumnBuffer) -> Option<&[Self::Native]>;

    fn get_mut(buffer: &mut ColumnBuffer) -> Option<&mut Vec<Self::Native>>;

    fn into_scalar(v: Self::Native) -> ScalarValue;

    fn from_scalar(v: &ScalarValue) -> Option<Self::Native>;

    /// Bytes held by a value beyond its inline size.
    fn heap_size(_v: &Self::Native) -> usize {
        0
    }
}

macro_rules! generate_physical {
    ($name:ident, $native:ty, $variant:ident) => {
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $name;

        impl PhysicalType for $name {
            const COL_TYPE: ColType = ColType::$variant;

            type Native = $native;

            fn get(buffer: &ColumnBuffer) -> Option<&[Self::Native]> {
                match buffer {
                    ColumnBuffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn get_mut(buffer: &mut ColumnBuffer) -> Option<&mut Vec<Self::Native>> {
                match buffer {
                    ColumnBuffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_scalar(v: Self::Native) -> ScalarValue {
                ScalarValue::$variant(v)
            }

            fn from_scalar(v: &ScalarValue) -> Option<Self::Native> {
                match v {
                    ScalarValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

generate_physical!(PhysicalBool, bool, Bool);
generate_physical!(PhysicalInt, i64, Int);
generate_physical!(PhysicalUInt, u64, UInt);
generate_physical!(PhysicalFloat, f64, Float);
generate_physical!(PhysicalTime, Time, Time);

#[derive(Debug, Default, Clone, Copy)]
pub struct PhysicalString;

impl PhysicalType for PhysicalString {
    const COL_TYPE: ColType = ColType::String;

    type Native = String;

    fn get(buffer: &ColumnBuffer) -> Option<&[Self::Native]> {
        match buffer {
            ColumnBuffer::String(v) => Some(v),
            _ => None,
        }
    }

    fn get_mut(buffer: &mut ColumnBuffer) -> Option<&mut Vec<Self::Native>> {
        match buffer {
            ColumnBuffer::String(v) => Some(v),
            _ => None,
        }
    }

    fn into_scalar(v: Self::Native) -> ScalarValue {
        ScalarValue::String(v)
    }

    fn from_scalar(v: &ScalarValue) -> Option<Self::Native> {
        match v {
            ScalarValue::String(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn heap_size(v: &Self::Native) -> usize {
        v.len()
    }
}
