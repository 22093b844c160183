//! Pool selection policy for classified packets
//!
//! One call per packet, after classification is complete. The engine holds
//! no state of its own: given the same classification and unchanged pools it
//! returns the same result, so a deferred allocation is retried simply by
//! calling again after a pool-release wakeup.

use tracing::{trace, warn};

use crate::common::AllocClass;
use crate::config::H4Config;
use crate::error::{H4Error, Result};
use crate::pool::{CommandSlot, PacketBuf, PacketPool, RetryToken};

/// Outcome of an allocation attempt.
#[derive(Debug)]
pub enum AllocResult {
    /// A destination buffer was granted.
    Granted(PacketBuf),
    /// The pool is momentarily empty; await the token and re-invoke with the
    /// same classification.
    Deferred(RetryToken),
    /// The packet is intentionally discarded. Not an error; the stream still
    /// has to be drained past it.
    Dropped,
}

/// The pool set backing one H4 host.
#[derive(Debug)]
pub struct HostPools {
    evt: PacketPool,
    acl: PacketPool,
    discardable: PacketPool,
    /// Number Of Completed Packets is consumed synchronously by the upper
    /// layer, so one dedicated buffer suffices and event-pool exhaustion can
    /// never hold up flow-control credits.
    num_completed: PacketPool,
    cmd_slot: CommandSlot,
}

impl HostPools {
    /// Build the pool set from a validated configuration.
    pub fn new(config: &H4Config) -> Self {
        Self {
            evt: PacketPool::new(config.evt_buf_count, config.evt_buf_size),
            acl: PacketPool::new(config.acl_buf_count, config.acl_buf_size),
            discardable: PacketPool::new(
                config.discardable_buf_count,
                config.discardable_buf_size,
            ),
            num_completed: PacketPool::new(1, config.num_completed_buf_size()),
            cmd_slot: CommandSlot::new(),
        }
    }

    /// Select a destination buffer for a fully classified packet.
    ///
    /// Exhaustion policy by class: command responses reuse the buffer the
    /// sender reserved; generic and LE meta events block (deferred) because
    /// events carry no flow control of their own; advertising reports drop;
    /// ACL exhaustion means the controller overran the credits it was
    /// granted and is fatal.
    pub fn allocate(&self, class: &AllocClass) -> Result<AllocResult> {
        match class {
            AllocClass::CommandComplete { opcode } | AllocClass::CommandStatus { opcode } => {
                // opcode is non-zero by construction: unsolicited
                // completions were classified GenericEvent.
                match self.cmd_slot.take() {
                    Some(mut buf) => {
                        buf.clear();
                        trace!(opcode, "response granted from command slot");
                        Ok(AllocResult::Granted(buf))
                    }
                    None => {
                        // No command in flight reserved a buffer; treat the
                        // response like a normal event.
                        warn!(opcode, "command response with no reserved buffer");
                        Ok(self.blocking(&self.evt))
                    }
                }
            }

            AllocClass::LeMetaOther | AllocClass::GenericEvent => Ok(self.blocking(&self.evt)),

            AllocClass::LeMetaDiscardable => match self.discardable.try_alloc() {
                Some(buf) => Ok(AllocResult::Granted(buf)),
                None => {
                    trace!("discardable pool empty, dropping advertising report");
                    Ok(AllocResult::Dropped)
                }
            },

            AllocClass::NumCompletedPackets => Ok(self.blocking(&self.num_completed)),

            AllocClass::AclInbound => match self.acl.try_alloc() {
                Some(buf) => Ok(AllocResult::Granted(buf)),
                None => {
                    warn!(
                        capacity = self.acl.capacity(),
                        "ACL data beyond granted credits"
                    );
                    Err(H4Error::FlowControlViolation)
                }
            },
        }
    }

    fn blocking(&self, pool: &PacketPool) -> AllocResult {
        match pool.try_alloc() {
            Some(buf) => AllocResult::Granted(buf),
            None => AllocResult::Deferred(pool.retry_token()),
        }
    }

    /// The command-response reservation slot.
    pub fn command_slot(&self) -> &CommandSlot {
        &self.cmd_slot
    }

    /// The generic event pool.
    pub fn evt_pool(&self) -> &PacketPool {
        &self.evt
    }

    /// The inbound ACL pool.
    pub fn acl_pool(&self) -> &PacketPool {
        &self.acl
    }

    /// The discardable event pool.
    pub fn discardable_pool(&self) -> &PacketPool {
        &self.discardable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PacketBuf;

    fn pools() -> HostPools {
        HostPools::new(&H4Config::default())
    }

    fn exhaust(pool: &PacketPool) -> Vec<PacketBuf> {
        std::iter::from_fn(|| pool.try_alloc()).collect()
    }

    #[test]
    fn generic_event_uses_event_pool() {
        let pools = pools();
        let before = pools.evt_pool().in_use();

        let result = pools.allocate(&AllocClass::GenericEvent).unwrap();
        assert!(matches!(result, AllocResult::Granted(_)));
        assert_eq!(pools.evt_pool().in_use(), before + 1);
    }

    #[test]
    fn event_exhaustion_defers() {
        let pools = pools();
        let _held = exhaust(pools.evt_pool());

        let result = pools.allocate(&AllocClass::GenericEvent).unwrap();
        assert!(matches!(result, AllocResult::Deferred(_)));

        let result = pools.allocate(&AllocClass::LeMetaOther).unwrap();
        assert!(matches!(result, AllocResult::Deferred(_)));
    }

    #[test]
    fn deferred_is_idempotent_without_release() {
        let pools = pools();
        let _held = exhaust(pools.evt_pool());

        for _ in 0..3 {
            let result = pools.allocate(&AllocClass::GenericEvent).unwrap();
            assert!(matches!(result, AllocResult::Deferred(_)));
        }
    }

    #[test]
    fn command_response_takes_the_reserved_buffer() {
        let pools = pools();
        pools.command_slot().deposit(PacketBuf::detached(64));

        let result = pools
            .allocate(&AllocClass::CommandComplete { opcode: 0x0c03 })
            .unwrap();
        assert!(matches!(result, AllocResult::Granted(_)));
        assert!(!pools.command_slot().is_armed());
        // The event pool was not touched.
        assert_eq!(pools.evt_pool().in_use(), 0);
    }

    #[test]
    fn command_response_without_reservation_falls_back() {
        let pools = pools();

        let result = pools
            .allocate(&AllocClass::CommandStatus { opcode: 0x0c03 })
            .unwrap();
        assert!(matches!(result, AllocResult::Granted(_)));
        assert_eq!(pools.evt_pool().in_use(), 1);
    }

    #[test]
    fn discardable_drops_when_pool_empty() {
        let pools = pools();
        let _held = exhaust(pools.discardable_pool());

        let result = pools.allocate(&AllocClass::LeMetaDiscardable).unwrap();
        assert!(matches!(result, AllocResult::Dropped));
    }

    #[test]
    fn acl_exhaustion_is_fatal() {
        let pools = pools();
        let _held = exhaust(pools.acl_pool());

        let err = pools.allocate(&AllocClass::AclInbound).unwrap_err();
        assert!(matches!(err, H4Error::FlowControlViolation));
    }

    #[test]
    fn num_completed_survives_event_pool_exhaustion() {
        let pools = pools();
        let _held = exhaust(pools.evt_pool());

        let result = pools.allocate(&AllocClass::NumCompletedPackets).unwrap();
        assert!(matches!(result, AllocResult::Granted(_)));
    }
}
