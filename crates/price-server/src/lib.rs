//! HTTP surface of the price prediction service
//!
//! Thin axum layer over `price_lib`: configuration, routing and error
//! mapping. The core calls are synchronous and run on the blocking pool.

pub mod api;
pub mod config;
