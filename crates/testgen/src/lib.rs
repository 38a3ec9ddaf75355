//! Random transaction event streams.
//!
//! Streams interleave many transactions the way a busy backend would and can
//! be salted with the irregularities a client must tolerate: events for ids
//! that never started, repeated terminal events, repeated starts, and lines
//! that are not valid wire messages at all.

pub mod generator;
