//! Incremental classification of the H4 receive stream
//!
//! The parser owns a small lookahead buffer (the accumulator) and advances a
//! state machine byte by byte until a packet's type, total length, and pool
//! routing are all known. It performs no I/O and never allocates; the caller
//! reads bytes from the transport and feeds them in.

use bytes::Buf;
use tracing::{debug, error};

use crate::common::{constants, AclHeader, AllocClass, Classification, EventHeader, PacketKind};
use crate::error::H4Error;

/// Largest classification prefix any rule needs: the H4 type byte, the event
/// header, and the Command Status sub-header.
pub const MAX_PREFIX: usize =
    constants::H4_HDR_SIZE + constants::EVT_HDR_SIZE + constants::CMD_STATUS_SUB_SIZE;

/// Outcome of one [`Parser::feed`] call.
#[derive(Debug)]
pub enum ParseStep {
    /// At least this many more bytes are required before the next decision
    /// point.
    NeedMore(usize),
    /// The packet's type, length, and pool routing are fully known.
    Classified(Classification),
    /// The stream cannot be parsed further.
    Fatal(H4Error),
}

/// Fixed-capacity scratch holding the classification prefix of the packet
/// currently on the stream. Cleared, never resized, between packets.
#[derive(Debug)]
pub struct Accumulator {
    buf: [u8; MAX_PREFIX],
    len: usize,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            buf: [0u8; MAX_PREFIX],
            len: 0,
        }
    }

    /// Number of prefix bytes currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no prefix bytes are held.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The prefix bytes read so far, starting with the H4 type byte.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn push(&mut self, byte: u8) {
        debug_assert!(self.len < MAX_PREFIX);
        self.buf[self.len] = byte;
        self.len += 1;
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingType,
    AwaitingEventHeader,
    AwaitingEventSubclass {
        evt_code: u8,
        param_len: u8,
        need: usize,
    },
    AwaitingDataHeader {
        kind: PacketKind,
    },
    Classified(Classification),
    Failed {
        ty: u8,
        unsupported: bool,
    },
}

impl State {
    /// Total prefix bytes this state needs in the accumulator before it can
    /// decide anything.
    fn required_prefix(&self) -> usize {
        match self {
            State::AwaitingType => constants::H4_HDR_SIZE,
            State::AwaitingEventHeader => constants::H4_HDR_SIZE + constants::EVT_HDR_SIZE,
            State::AwaitingEventSubclass { need, .. } => {
                constants::H4_HDR_SIZE + constants::EVT_HDR_SIZE + need
            }
            State::AwaitingDataHeader { .. } => constants::H4_HDR_SIZE + constants::ACL_HDR_SIZE,
            State::Classified(_) | State::Failed { .. } => 0,
        }
    }
}

/// Incremental H4 packet parser.
///
/// Exactly one packet is in flight at a time: after a
/// [`ParseStep::Classified`] result the caller reads the packet tail out of
/// band and must call [`Parser::reset`] before feeding the next packet's
/// bytes. A [`ParseStep::Fatal`] result latches; only [`Parser::reset`]
/// clears it.
#[derive(Debug)]
pub struct Parser {
    state: State,
    accum: Accumulator,
    iso_enabled: bool,
}

impl Parser {
    /// Create a parser in its initial state. `iso_enabled` decides whether an
    /// ISO type byte is carried (sharing the ACL path) or fatal.
    pub fn new(iso_enabled: bool) -> Self {
        Self {
            state: State::AwaitingType,
            accum: Accumulator::new(),
            iso_enabled,
        }
    }

    /// The prefix bytes consumed so far for the current packet.
    pub fn prefix(&self) -> &[u8] {
        self.accum.as_slice()
    }

    /// Clear the accumulator and return to the initial state.
    pub fn reset(&mut self) {
        self.accum.clear();
        self.state = State::AwaitingType;
    }

    /// Consume bytes from `buf` until the next decision point.
    ///
    /// Only classification-prefix bytes are pulled from `buf`; payload bytes
    /// are left untouched for the caller to stream into the destination
    /// buffer. Re-feeding without a reset after a decisive step returns the
    /// same decision.
    pub fn feed(&mut self, buf: &mut impl Buf) -> ParseStep {
        loop {
            match self.state {
                State::Classified(c) => return ParseStep::Classified(c),
                State::Failed { ty, unsupported } => {
                    return ParseStep::Fatal(Self::frame_error(ty, unsupported))
                }
                _ => {}
            }

            let required = self.state.required_prefix();
            while self.accum.len() < required && buf.has_remaining() {
                self.accum.push(buf.get_u8());
            }
            if self.accum.len() < required {
                return ParseStep::NeedMore(required - self.accum.len());
            }

            if let Some(step) = self.advance() {
                return step;
            }
        }
    }

    /// Take one transition using the bytes already accumulated. `None` means
    /// the machine moved to a state that needs more prefix bytes.
    fn advance(&mut self) -> Option<ParseStep> {
        let prefix = self.accum.as_slice();

        match self.state {
            State::AwaitingType => {
                let tag = prefix[0];
                match PacketKind::from_wire(tag) {
                    Some(PacketKind::Event) => {
                        self.state = State::AwaitingEventHeader;
                        None
                    }
                    Some(PacketKind::AclData) => {
                        self.state = State::AwaitingDataHeader {
                            kind: PacketKind::AclData,
                        };
                        None
                    }
                    Some(PacketKind::IsoData) if self.iso_enabled => {
                        self.state = State::AwaitingDataHeader {
                            kind: PacketKind::IsoData,
                        };
                        None
                    }
                    Some(_) => Some(self.fail(tag, true)),
                    None => Some(self.fail(tag, false)),
                }
            }

            State::AwaitingEventHeader => {
                let mut hdr_bytes = &prefix[constants::H4_HDR_SIZE..];
                let hdr = EventHeader::decode(&mut hdr_bytes).unwrap();

                // A special event whose parameters cannot hold the required
                // sub-header is not a genuine instance of that event; route
                // it generically rather than peek past the packet boundary.
                let sub_need = match hdr.code {
                    constants::EVT_CMD_COMPLETE => Some(constants::CMD_COMPLETE_SUB_SIZE),
                    constants::EVT_CMD_STATUS => Some(constants::CMD_STATUS_SUB_SIZE),
                    constants::EVT_LE_META => Some(constants::LE_META_SUB_SIZE),
                    _ => None,
                }
                .filter(|need| hdr.param_len as usize >= *need);

                match sub_need {
                    Some(need) => {
                        self.state = State::AwaitingEventSubclass {
                            evt_code: hdr.code,
                            param_len: hdr.param_len,
                            need,
                        };
                        None
                    }
                    None => {
                        let class = if hdr.code == constants::EVT_NUM_COMPLETED_PACKETS {
                            AllocClass::NumCompletedPackets
                        } else {
                            AllocClass::GenericEvent
                        };
                        Some(self.classify(PacketKind::Event, hdr.total_len(), class))
                    }
                }
            }

            State::AwaitingEventSubclass {
                evt_code,
                param_len,
                need,
            } => {
                let sub_off = constants::H4_HDR_SIZE + constants::EVT_HDR_SIZE;
                let sub = &prefix[sub_off..sub_off + need];
                let total =
                    constants::H4_HDR_SIZE + constants::EVT_HDR_SIZE + param_len as usize;

                let class = match evt_code {
                    constants::EVT_CMD_COMPLETE => {
                        // sub = (ncmd, opcode le16)
                        let opcode = u16::from_le_bytes([sub[1], sub[2]]);
                        if opcode == 0 {
                            // Unsolicited completion: not a command response.
                            AllocClass::GenericEvent
                        } else {
                            AllocClass::CommandComplete { opcode }
                        }
                    }
                    constants::EVT_CMD_STATUS => {
                        // sub = (status, ncmd, opcode le16)
                        let opcode = u16::from_le_bytes([sub[2], sub[3]]);
                        if opcode == 0 {
                            AllocClass::GenericEvent
                        } else {
                            AllocClass::CommandStatus { opcode }
                        }
                    }
                    constants::EVT_LE_META => {
                        if sub[0] == constants::LE_SUBEVT_ADV_REPORT {
                            AllocClass::LeMetaDiscardable
                        } else {
                            AllocClass::LeMetaOther
                        }
                    }
                    _ => unreachable!("only special event codes reach the subclass state"),
                };

                Some(self.classify(PacketKind::Event, total, class))
            }

            State::AwaitingDataHeader { kind } => {
                let mut hdr_bytes = &prefix[constants::H4_HDR_SIZE..];
                let hdr = AclHeader::decode(&mut hdr_bytes).unwrap();
                Some(self.classify(kind, hdr.total_len(), AllocClass::AclInbound))
            }

            State::Classified(_) | State::Failed { .. } => unreachable!(),
        }
    }

    fn classify(&mut self, kind: PacketKind, total_len: usize, class: AllocClass) -> ParseStep {
        let classification = Classification {
            kind,
            total_len,
            consumed: self.accum.len(),
            class,
        };

        debug!(
            ?kind,
            ?class,
            total_len,
            consumed = classification.consumed,
            "packet classified"
        );

        self.state = State::Classified(classification);
        ParseStep::Classified(classification)
    }

    fn fail(&mut self, ty: u8, unsupported: bool) -> ParseStep {
        error!(ty, unsupported, "unparseable frame type");
        self.state = State::Failed { ty, unsupported };
        ParseStep::Fatal(Self::frame_error(ty, unsupported))
    }

    fn frame_error(ty: u8, unsupported: bool) -> H4Error {
        if unsupported {
            H4Error::UnsupportedFrameType { ty }
        } else {
            H4Error::UnknownFrameType { ty }
        }
    }
}
