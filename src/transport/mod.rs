//! Transport layer: the HTTP server the pipeline runs on, and the shim that
//! routes upgrade events back into that pipeline.

pub mod server;
pub mod shim;

pub use server::{TransportServer, UpgradeListener};

/// How a transport server hands upgrade requests to the application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpgradeDelivery {
    /// Upgrade requests travel through the ordinary request pipeline.
    #[default]
    Native,
    /// Upgrade requests are raised as separate upgrade events and never
    /// reach the request pipeline unless the server is patched.
    Event,
}
