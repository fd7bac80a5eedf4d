pub mod allocator;
pub mod builder;
pub mod coltype;
pub mod column;
pub mod format;
pub mod group_key;
pub mod physical;
pub mod scalar;
pub mod table;
pub mod util;
