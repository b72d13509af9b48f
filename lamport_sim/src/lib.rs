//! A small, fixed-size cluster of TCP-connected nodes, each keeping a Lamport logical clock. Nodes
//! send each other their clock values at random, merge what they receive, and append every event
//! to a human-readable log for later analysis of clock skew and message ordering.
//!
//! See [`core`] for the node runtime and [`testkit`] for diagnostic logging.

pub mod core;
pub mod testkit;
