//! SCCP (Skinny Client Control Protocol) session layer and device
//! state machine: a framed TCP listener, per-connection session
//! handling, and a per-device registration/call-state state machine,
//! decoupled from any particular PBX core through the `host` adapter
//! traits.

pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod host;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod task;

pub use config::{ConfigSnapshot, SharedConfig};
pub use device::Device;
pub use error::{Error, Result};
pub use host::Host;
pub use server::Server;
