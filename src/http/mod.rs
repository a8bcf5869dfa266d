//! HTTP server module
//!
//! This module handles HTTP request routing and handling:
//! - Axum router with the conversion endpoints
//! - Multipart upload parsing and attachment responses
//! - Format listing, health, version and metrics endpoints
//! - CORS middleware

pub mod handlers;
pub mod routes;

pub use routes::create_router;
