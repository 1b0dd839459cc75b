//! HTTP middleware shared by all routes
//!
//! Author: hephaex@gmail.com

pub mod metrics;
pub mod security_headers;

pub use metrics::metrics_middleware;
pub use security_headers::{no_store_middleware, security_headers_middleware};
