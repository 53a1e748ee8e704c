//! Connection-side reply delivery.

pub mod config;
pub mod connection;

pub use config::*;
pub use connection::*;
