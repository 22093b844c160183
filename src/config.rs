//! Configuration for the H4 host driver

use crate::common::constants;
use crate::error::{H4Error, Result};

/// Largest HCI event on the wire: header plus 255 parameter bytes.
const MAX_EVENT_SIZE: usize = constants::EVT_HDR_SIZE + u8::MAX as usize;

/// Smallest useful ACL buffer: header plus the minimum LE payload.
const MIN_ACL_SIZE: usize = constants::ACL_HDR_SIZE + 27;

/// H4 host configuration builder
#[derive(Debug, Clone)]
pub struct H4Config {
    /// Buffers in the generic event pool
    pub evt_buf_count: usize,
    /// Byte size of each event buffer
    pub evt_buf_size: usize,
    /// Buffers in the inbound ACL pool; bounds the credits granted to the
    /// controller
    pub acl_buf_count: usize,
    /// Byte size of each ACL buffer
    pub acl_buf_size: usize,
    /// Buffers for discardable events; zero means advertising reports are
    /// always dropped
    pub discardable_buf_count: usize,
    /// Byte size of each discardable buffer
    pub discardable_buf_size: usize,
    /// Connection count used to size the Number Of Completed Packets buffer
    pub max_conn: usize,
    /// Carry ISO data frames on the ACL path instead of rejecting them
    pub iso_enabled: bool,
    /// Depth of the delivery queue toward the upper layer
    pub event_queue_depth: usize,
}

impl Default for H4Config {
    fn default() -> Self {
        Self {
            evt_buf_count: 8,
            evt_buf_size: MAX_EVENT_SIZE,
            acl_buf_count: 4,
            acl_buf_size: constants::ACL_HDR_SIZE + 251,
            discardable_buf_count: 3,
            discardable_buf_size: 45,
            max_conn: 4,
            iso_enabled: false,
            event_queue_depth: 16,
        }
    }
}

impl H4Config {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the generic event pool shape
    pub fn event_buffers(mut self, count: usize, size: usize) -> Self {
        self.evt_buf_count = count;
        self.evt_buf_size = size;
        self
    }

    /// Set the inbound ACL pool shape
    pub fn acl_buffers(mut self, count: usize, size: usize) -> Self {
        self.acl_buf_count = count;
        self.acl_buf_size = size;
        self
    }

    /// Set the discardable event pool shape
    pub fn discardable_buffers(mut self, count: usize, size: usize) -> Self {
        self.discardable_buf_count = count;
        self.discardable_buf_size = size;
        self
    }

    /// Set the connection count the flow-control event buffer is sized for
    pub fn max_connections(mut self, conns: usize) -> Self {
        self.max_conn = conns;
        self
    }

    /// Enable or disable ISO data frames
    pub fn iso(mut self, enabled: bool) -> Self {
        self.iso_enabled = enabled;
        self
    }

    /// Set the delivery queue depth
    pub fn event_queue_depth(mut self, depth: usize) -> Self {
        self.event_queue_depth = depth;
        self
    }

    /// Size of the dedicated Number Of Completed Packets buffer: event
    /// header, handle count, and one handle/count pair per connection.
    pub fn num_completed_buf_size(&self) -> usize {
        constants::EVT_HDR_SIZE + 1 + 4 * self.max_conn
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.evt_buf_count == 0 {
            return Err(H4Error::config("event pool must hold at least one buffer"));
        }

        if self.evt_buf_size < MAX_EVENT_SIZE {
            return Err(H4Error::config(
                "event buffers must hold a maximum-size event (257 bytes)",
            ));
        }

        if self.acl_buf_count > 0 && self.acl_buf_size < MIN_ACL_SIZE {
            return Err(H4Error::config("ACL buffers too small for a minimum LE payload"));
        }

        if self.discardable_buf_count > 0 && self.discardable_buf_size < constants::EVT_HDR_SIZE + 1
        {
            return Err(H4Error::config("discardable buffers too small for an event"));
        }

        if self.max_conn == 0 {
            return Err(H4Error::config("max_conn must be at least 1"));
        }

        if self.event_queue_depth == 0 {
            return Err(H4Error::config("event queue depth must be at least 1"));
        }

        Ok(())
    }
}

/// Preset configurations for common roles
impl H4Config {
    /// Connection-oriented host: deeper ACL pool, modest discardable pool.
    pub fn central() -> Self {
        Self::default()
            .acl_buffers(8, constants::ACL_HDR_SIZE + 251)
            .max_connections(8)
            .discardable_buffers(4, 45)
    }

    /// Passive scanner: no ACL traffic expected, generous room for
    /// advertising reports.
    pub fn observer() -> Self {
        Self::default()
            .acl_buffers(0, 0)
            .max_connections(1)
            .discardable_buffers(16, 64)
    }

    /// Smallest legal footprint; advertising reports are always dropped.
    pub fn minimal() -> Self {
        Self::default()
            .event_buffers(1, MAX_EVENT_SIZE)
            .acl_buffers(1, MIN_ACL_SIZE)
            .discardable_buffers(0, 0)
            .max_connections(1)
            .event_queue_depth(1)
    }
}
