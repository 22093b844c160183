//! Error types for the H4 transport layer

use thiserror::Error;

/// Result type for H4 operations
pub type Result<T> = std::result::Result<T, H4Error>;

/// Errors surfaced by framing, allocation, and transport I/O.
///
/// Transient conditions (a pool momentarily empty, a discardable event
/// dropped) are absorbed inside the receive path and never appear here.
#[derive(Error, Debug)]
pub enum H4Error {
    /// The type byte is not a value H4 defines. The stream is desynchronized
    /// and cannot be recovered without an out-of-band resync.
    #[error("unknown H4 frame type {ty:#04x}")]
    UnknownFrameType { ty: u8 },

    /// The type byte is legal H4 but this receive path does not carry the
    /// frame class (ISO with ISO disabled, SCO, or a command arriving on the
    /// receive side).
    #[error("unsupported H4 frame type {ty:#04x}")]
    UnsupportedFrameType { ty: u8 },

    /// The controller sent ACL data beyond the buffer credits it was
    /// granted. Exhaustion here is a protocol-contract violation by the
    /// peer, not transient pressure.
    #[error("controller exceeded its ACL buffer credits")]
    FlowControlViolation,

    /// Transport-level I/O failure, propagated unmodified.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host driver has shut down.
    #[error("H4 host closed")]
    Closed,

    /// Configuration errors
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl H4Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        H4Error::Config {
            message: message.into(),
        }
    }

    /// True when the receive path cannot continue past this error.
    ///
    /// A fatal error is equivalent to a hardware fault from the HCI layer's
    /// point of view: the link needs a reset, not a retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            H4Error::UnknownFrameType { .. }
                | H4Error::UnsupportedFrameType { .. }
                | H4Error::FlowControlViolation
                | H4Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(H4Error::UnknownFrameType { ty: 0x07 }.is_fatal());
        assert!(H4Error::FlowControlViolation.is_fatal());
        assert!(!H4Error::Closed.is_fatal());
        assert!(!H4Error::config("bad").is_fatal());
    }

    #[test]
    fn display_includes_type_byte() {
        let err = H4Error::UnknownFrameType { ty: 0x07 };
        assert!(err.to_string().contains("0x07"));
    }
}
