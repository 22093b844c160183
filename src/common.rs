//! Common types and wire-format helpers for H4 framing

use bytes::Buf;

/// H4 and HCI wire-format constants
pub mod constants {
    pub const H4_CMD: u8 = 0x01; // host -> controller command
    pub const H4_ACL: u8 = 0x02; // ACL data, both directions
    pub const H4_SCO: u8 = 0x03; // synchronous voice data
    pub const H4_EVT: u8 = 0x04; // controller -> host event
    pub const H4_ISO: u8 = 0x05; // isochronous data

    pub const H4_HDR_SIZE: usize = 1; // type tag
    pub const CMD_HDR_SIZE: usize = 3; // opcode (le16) + param_len
    pub const EVT_HDR_SIZE: usize = 2; // evt_code + param_len
    pub const ACL_HDR_SIZE: usize = 4; // handle (le16) + data_len (le16)

    pub const EVT_CMD_COMPLETE: u8 = 0x0e;
    pub const EVT_CMD_STATUS: u8 = 0x0f;
    pub const EVT_NUM_COMPLETED_PACKETS: u8 = 0x13;
    pub const EVT_LE_META: u8 = 0x3e;

    pub const LE_SUBEVT_ADV_REPORT: u8 = 0x02;

    /// Sub-header bytes needed past the event header before the pool
    /// for the packet can be chosen.
    pub const CMD_COMPLETE_SUB_SIZE: usize = 3; // ncmd + opcode (le16)
    pub const CMD_STATUS_SUB_SIZE: usize = 4; // status + ncmd + opcode (le16)
    pub const LE_META_SUB_SIZE: usize = 1; // subevent code
}

/// H4 packet type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Command,
    AclData,
    ScoData,
    Event,
    IsoData,
}

impl PacketKind {
    /// Decode a wire type byte. Returns `None` for a tag H4 does not define.
    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            constants::H4_CMD => Some(PacketKind::Command),
            constants::H4_ACL => Some(PacketKind::AclData),
            constants::H4_SCO => Some(PacketKind::ScoData),
            constants::H4_EVT => Some(PacketKind::Event),
            constants::H4_ISO => Some(PacketKind::IsoData),
            _ => None,
        }
    }

    /// The wire type byte prefixed to every packet of this kind.
    pub fn as_wire(self) -> u8 {
        match self {
            PacketKind::Command => constants::H4_CMD,
            PacketKind::AclData => constants::H4_ACL,
            PacketKind::ScoData => constants::H4_SCO,
            PacketKind::Event => constants::H4_EVT,
            PacketKind::IsoData => constants::H4_ISO,
        }
    }
}

/// HCI event header: event code plus parameter length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub code: u8,
    pub param_len: u8,
}

impl EventHeader {
    /// Decode from a buffer holding at least [`constants::EVT_HDR_SIZE`] bytes.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < constants::EVT_HDR_SIZE {
            return None;
        }

        Some(Self {
            code: buf.get_u8(),
            param_len: buf.get_u8(),
        })
    }

    /// Total packet length on the wire, including the H4 type byte.
    pub fn total_len(&self) -> usize {
        constants::H4_HDR_SIZE + constants::EVT_HDR_SIZE + self.param_len as usize
    }
}

/// ACL (or ISO) data header: connection handle plus payload length.
///
/// The handle field carries packet-boundary and broadcast flags in its high
/// bits; this layer passes them through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclHeader {
    pub handle: u16,
    pub data_len: u16,
}

impl AclHeader {
    /// Decode from a buffer holding at least [`constants::ACL_HDR_SIZE`] bytes.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < constants::ACL_HDR_SIZE {
            return None;
        }

        Some(Self {
            handle: buf.get_u16_le(),
            data_len: buf.get_u16_le(),
        })
    }

    /// Total packet length on the wire, including the H4 type byte.
    pub fn total_len(&self) -> usize {
        constants::H4_HDR_SIZE + constants::ACL_HDR_SIZE + self.data_len as usize
    }
}

/// Pool routing class, fully determined once the classification prefix of a
/// packet has been seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocClass {
    /// Command Complete responding to an in-flight command. The opcode is
    /// never zero here; unsolicited completions classify as
    /// [`AllocClass::GenericEvent`].
    CommandComplete { opcode: u16 },
    /// Command Status responding to an in-flight command (same opcode rule).
    CommandStatus { opcode: u16 },
    /// LE advertising report, lossy under memory pressure.
    LeMetaDiscardable,
    /// Any other LE meta event.
    LeMetaOther,
    /// Number Of Completed Packets; carries TX flow-control credits and must
    /// never be lost.
    NumCompletedPackets,
    /// Event with no special routing.
    GenericEvent,
    /// Inbound ACL (or ISO) data, bounded by host flow-control credits.
    AclInbound,
}

/// Immutable result of classifying one packet's prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// H4 type of the packet.
    pub kind: PacketKind,
    /// Full on-wire length including the type byte.
    pub total_len: usize,
    /// Prefix bytes already pulled off the stream at classification time.
    pub consumed: usize,
    /// Pool routing decision.
    pub class: AllocClass,
}

impl Classification {
    /// Bytes of the packet still waiting on the stream.
    pub fn remaining(&self) -> usize {
        self.total_len - self.consumed
    }
}

/// Per-host counters, snapshotted via [`H4Host::stats`](crate::host::H4Host::stats).
#[derive(Debug, Default, Clone)]
pub struct H4Stats {
    /// Packets delivered to the upper layer
    pub packets_delivered: u64,
    /// Discardable events dropped under pool pressure
    pub events_discarded: u64,
    /// Allocation attempts that had to wait for a pool release
    pub alloc_deferred: u64,
    /// Total bytes read off the transport
    pub bytes_received: u64,
    /// Total bytes written to the transport
    pub bytes_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_kind_wire_tags() {
        for tag in 0x01..=0x05u8 {
            let kind = PacketKind::from_wire(tag).unwrap();
            assert_eq!(kind.as_wire(), tag);
        }
        assert_eq!(PacketKind::from_wire(0x00), None);
        assert_eq!(PacketKind::from_wire(0x07), None);
    }

    #[test]
    fn event_header_decode() {
        let mut buf = &[0x0e, 0x04][..];
        let hdr = EventHeader::decode(&mut buf).unwrap();
        assert_eq!(hdr.code, constants::EVT_CMD_COMPLETE);
        assert_eq!(hdr.param_len, 4);
        assert_eq!(hdr.total_len(), 7);
    }

    #[test]
    fn acl_header_decode() {
        let mut buf = &[0x10, 0x00, 0x05, 0x00][..];
        let hdr = AclHeader::decode(&mut buf).unwrap();
        assert_eq!(hdr.handle, 0x0010);
        assert_eq!(hdr.data_len, 5);
        assert_eq!(hdr.total_len(), 10);
    }

    #[test]
    fn short_headers_decode_to_none() {
        let mut buf = &[0x0e][..];
        assert!(EventHeader::decode(&mut buf).is_none());

        let mut buf = &[0x10, 0x00, 0x05][..];
        assert!(AclHeader::decode(&mut buf).is_none());
    }
}
