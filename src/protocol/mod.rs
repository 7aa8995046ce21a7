pub mod wire;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::anyhow;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub use wire::DecodeError;


pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed frame header: version, semantics, opcode, flags, request id, payload length.
pub const HEADER_LEN: usize = 16;

/// Both sides receive into buffers of this size; the encoder must never produce a bigger
///  datagram. Payload texts (availability renderings) stay well below this at weekly
///  minute granularity.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Flags bit 0: the reply is an error, and the payload is a single human-readable string.
pub const FLAG_ERROR: u8 = 0x01;


/// Invocation semantics a process is configured for. The tag travels in every message header,
///  but a server acts on its *own* configured mode - the byte from the client is echoed back
///  and otherwise informational.
#[derive(Debug, Clone, Copy, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Semantics {
    /// The caller retransmits on timeout and the server re-executes every arrival. Acceptable
    ///  for idempotent operations only.
    AtLeastOnce = 0,
    /// Retransmissions never cause re-execution: the server intercepts duplicates with a reply
    ///  cache keyed by (peer, request id).
    AtMostOnce = 1,
}

impl Display for Semantics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Semantics::AtLeastOnce => write!(f, "ALO"),
            Semantics::AtMostOnce => write!(f, "AMO"),
        }
    }
}

impl FromStr for Semantics {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALO" => Ok(Semantics::AtLeastOnce),
            "AMO" => Ok(Semantics::AtMostOnce),
            _ => Err(anyhow!("invalid semantics {:?} (expected AMO or ALO)", s)),
        }
    }
}


#[derive(Debug, Clone, Copy, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Query = 1,
    Book = 2,
    Change = 3,
    MonitorRegister = 4,
    /// server -> client only
    MonitorUpdate = 5,
    Cancel = 6,
    Extend = 7,
    QueryBooking = 8,
}


/// A single request or reply datagram. Opcode and semantics are kept as raw bytes here: a
///  server must echo even an opcode it does not know back in its error reply, so the frame
///  cannot reject them at decode time. [Opcode::try_from] happens at dispatch.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    pub version: u8,
    pub semantics: u8,
    pub opcode: u8,
    pub flags: u8,
    pub req_id: u64,
    pub payload: Bytes,
}

impl Message {
    pub fn new(semantics: Semantics, opcode: Opcode, req_id: u64, payload: Bytes) -> Message {
        Message {
            version: PROTOCOL_VERSION,
            semantics: semantics.into(),
            opcode: opcode.into(),
            flags: 0,
            req_id,
            payload,
        }
    }

    pub fn is_error(&self) -> bool {
        self.flags & FLAG_ERROR != 0
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(self.version);
        buf.put_u8(self.semantics);
        buf.put_u8(self.opcode);
        buf.put_u8(self.flags);
        buf.put_u64(self.req_id);
        buf.put_i32(self.payload.len() as i32);
        buf.put_slice(&self.payload);
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Message, DecodeError> {
        let version = buf.try_get_u8()?;
        let semantics = buf.try_get_u8()?;
        let opcode = buf.try_get_u8()?;
        let flags = buf.try_get_u8()?;
        let req_id = buf.try_get_u64()?;
        let payload_len = buf.try_get_i32()?;

        if payload_len < 0 {
            return Err(DecodeError::Malformed("negative payload length"));
        }
        if payload_len as usize > buf.remaining() {
            return Err(DecodeError::Malformed("payload length exceeds datagram"));
        }

        Ok(Message {
            version,
            semantics,
            opcode,
            flags,
            req_id,
            payload: Bytes::copy_from_slice(&buf[..payload_len as usize]),
        })
    }
}
