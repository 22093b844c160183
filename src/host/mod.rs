//! Async host-side driver: receive task, delivery queue, TX framing

mod driver;
mod rx;

pub use driver::H4Host;
pub use rx::{H4Packet, RxEvent};
