//! Marker traits separating writes from reads.
//!
//! Commands change import state and are logged at `info`; queries only read.

/// A request that mutates batches, files or rows
pub trait Command {}

/// A read-only request
pub trait Query {}
