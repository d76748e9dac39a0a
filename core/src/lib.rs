//! Core data model and algorithms for Beacon visibility analytics.
//!
//! Everything in this crate is pure: raw API payloads come in as
//! `serde_json::Value`, normalized rows and pivoted datasets come out. All
//! I/O lives in `beacon-mcp-runtime`.

pub mod citations;
pub mod config;
pub mod dataset;
pub mod error;
pub mod pivot;
pub mod render;
pub mod summary;
