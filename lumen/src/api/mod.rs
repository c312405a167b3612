//! API module for the lumen HTTP server

pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig};
