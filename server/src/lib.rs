//! Spanline server library
//!
//! Ingests trace segments, analyzes them into typed metric records, and
//! aggregates the records across a cluster before persisting them.

pub mod analysis;
pub mod api;
pub mod app;
pub mod cluster;
pub mod core;
pub mod data;
pub mod metrics;
pub mod resolve;
pub mod segment;
pub mod tasks;
pub mod utils;
