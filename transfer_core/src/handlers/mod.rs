//! HTTP handlers for the transfer API

pub mod files;
pub mod routes;

pub use routes::create_routes;
