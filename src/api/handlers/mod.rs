//! Endpoint handlers.

pub mod echo;
pub mod system;
