//! # H4 Tokio - Async HCI Transport Framing
//!
//! An async implementation of the H4 (UART) HCI transport layer: incremental
//! packet framing over a raw byte stream, early pool selection from the
//! smallest possible packet prefix, and per-class policy when a pool runs
//! dry.
//!
//! ## Features
//!
//! - **Async-First Design**: one receive task, real suspension points, no
//!   spin-waits
//! - **Early Classification**: the destination pool is chosen from at most
//!   seven prefix bytes, before the packet body arrives
//! - **Zero-Copy Tails**: the packet body is read straight into its
//!   destination buffer
//! - **Credit-Aware Pools**: events block, advertising reports drop, ACL
//!   overruns fail fast
//! - **Observability**: integrated tracing and global metrics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use h4_tokio::{H4Config, H4Host, RxEvent, StreamTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Any AsyncRead + AsyncWrite byte stream carries the link.
//!     let (link, _controller) = tokio::io::duplex(256);
//!     let transport = StreamTransport::from_stream(link);
//!
//!     let mut host = H4Host::open(transport, H4Config::central())?;
//!
//!     // HCI_Reset; the response buffer is reserved before the write.
//!     host.send_command(0x0c03, &[]).await?;
//!
//!     while let Some(event) = host.recv().await {
//!         match event {
//!             RxEvent::Packet(pkt) => println!("{:?}: {} bytes", pkt.kind, pkt.buf.len()),
//!             RxEvent::Fatal(err) => return Err(err.into()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   Host Driver       │  H4Host: lifecycle, TX framing, delivery queue
//! ├─────────────────────┤
//! │   Allocation Policy │  HostPools: pool routing per packet class
//! ├─────────────────────┤
//! │   Incremental Parser│  Parser: prefix accumulator, classification
//! ├─────────────────────┤
//! │   Transport Layer   │  Transport trait: UART/SPI/PTY byte pump
//! └─────────────────────┘
//! ```

pub mod alloc;
pub mod common;
pub mod config;
pub mod error;
pub mod host;
pub mod metrics;
pub mod parser;
pub mod pool;
pub mod transport;

// Re-exports
pub use alloc::{AllocResult, HostPools};
pub use common::{AllocClass, Classification, H4Stats, PacketKind};
pub use config::H4Config;
pub use error::{H4Error, Result};
pub use host::{H4Host, H4Packet, RxEvent};
pub use parser::{ParseStep, Parser};
pub use pool::{PacketBuf, PacketPool};
pub use transport::{StreamTransport, Transport};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
