//! HTTP surface: the three endpoints plus 404 fallback.

pub mod handlers;
pub mod models;

pub use handlers::*;
