//! services/api/src/lib.rs
//!
//! The library crate backing the `api` binary: configuration, the service
//! error type, the concrete adapters and the web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
