//! kdbg-stub — remote-control protocol for the in-kernel debug stub.
//!
//! This crate implements the host side of the debug-stub protocol: the
//! command and notification types, their byte framing, transport port
//! specifications, and a tokio-driven connection that sends commands
//! synchronously while delivering notifications asynchronously.

pub mod codec;
pub mod connection;
pub mod error;
pub mod port;
pub mod protocol;

// Re-export key types for convenience.
pub use connection::{connect, NotificationReceiver, StubConnection, StubTransport};
pub use error::StubError;
pub use port::PortSpec;
pub use protocol::{Notification, StubCommand};
