// Library crate for integration tests and the binary.

pub mod config;
pub mod error;
pub mod quality;
pub mod routes;
pub mod server;
pub mod state;
