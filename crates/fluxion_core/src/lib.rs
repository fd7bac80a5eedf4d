pub mod arrays;
pub mod compiler;
pub mod config;
pub mod execution;
pub mod functions;
pub mod plan;
pub mod values;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
