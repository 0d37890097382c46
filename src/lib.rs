//! Group-by aggregation benchmark harness.
//!
//! Generates datasets with an exact number of `(g1, g2)` groups, runs the same
//! aggregation through several engines and reports the median wall clock time.

pub mod dataset;
pub mod engine;
pub mod keysum;
pub mod sweep;
pub mod timing;
