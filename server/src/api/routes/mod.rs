//! API route handlers

pub mod cluster;
pub mod health;
pub mod segments;
