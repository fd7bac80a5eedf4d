//! Dataflow execution of physical plans.
//!
//! Sources push tables into transformations, each transformation buffers
//! into a [`dataset::Dataset`] whose triggers decide when tables flow on.
//! Edges between nodes are [`transport::Transport`]s that hand work to the
//! [`dispatcher::Dispatcher`] pool, and results are read through
//! [`result::QueryResult`].

pub mod aggregate;
pub mod cache;
pub mod dataset;
pub mod dispatcher;
pub mod executor;
pub mod registry;
pub mod result;
pub mod selector;
pub mod source;
pub mod transformation;
pub mod transport;
pub mod trigger;
