//! PTP/IP packet encoding and decoding.
//!
//! Every packet starts with an 8-byte header:
//! ```text
//! ┌──────────┬──────────┬─────────────────────
//! │ Length   │ Type     │ type-specific body
//! │ uint32 LE│ uint32 LE│
//! └──────────┴──────────┴─────────────────────
//! ```
//!
//! The length covers the header. Bodies by type:
//!
//! | type | packet              | body                                             |
//! |------|---------------------|--------------------------------------------------|
//! | 1    | InitCommandRequest  | guid[16], name (UTF-16LE, NUL), version u32      |
//! | 2    | InitCommandAck      | conn u32, guid[16], name, version u32            |
//! | 3    | InitEventRequest    | conn u32                                         |
//! | 4    | InitEventAck        | -                                                |
//! | 5    | InitFail            | reason u32                                       |
//! | 6    | CommandRequest      | data_phase u32, code u16, tid u32, params        |
//! | 7    | CommandResponse     | code u16, tid u32, params                        |
//! | 8    | Event               | code u16, tid u32, params                        |
//! | 9    | StartData           | tid u32, total_length u64                        |
//! | 10   | Data                | tid u32, payload                                 |
//! | 11   | Cancel              | tid u32                                          |
//! | 12   | EndData             | tid u32, payload                                 |
//! | 13   | ProbeRequest        | -                                                |
//! | 14   | ProbeResponse       | -                                                |

use bytes::{BufMut, Bytes, BytesMut};

use super::bulk::MAX_PARAMS;
use crate::error::{Result, VcamError};

/// Common header size (length + type).
pub const PTPIP_HEADER_SIZE: usize = 8;

/// Fixed size of a CommandRequest without parameters.
pub const COMMAND_REQUEST_HEADER_SIZE: usize = 18;

/// Fixed size of a CommandResponse (or Event) without parameters.
pub const COMMAND_RESPONSE_HEADER_SIZE: usize = 14;

/// Size of a StartData packet.
pub const START_DATA_SIZE: usize = 20;

/// Fixed size of a Data/EndData packet without payload.
pub const END_DATA_HEADER_SIZE: usize = 12;

/// Length of the session GUID in init packets.
pub const GUID_SIZE: usize = 16;

/// Packet type constants.
pub mod packet_type {
    pub const INIT_COMMAND_REQUEST: u32 = 1;
    pub const INIT_COMMAND_ACK: u32 = 2;
    pub const INIT_EVENT_REQUEST: u32 = 3;
    pub const INIT_EVENT_ACK: u32 = 4;
    pub const INIT_FAIL: u32 = 5;
    pub const COMMAND_REQUEST: u32 = 6;
    pub const COMMAND_RESPONSE: u32 = 7;
    pub const EVENT: u32 = 8;
    pub const START_DATA: u32 = 9;
    pub const DATA: u32 = 10;
    pub const CANCEL: u32 = 11;
    pub const END_DATA: u32 = 12;
    pub const PROBE_REQUEST: u32 = 13;
    pub const PROBE_RESPONSE: u32 = 14;
}

/// Data phase indicator carried by CommandRequest.
pub mod data_phase {
    /// No data phase, or data flows responder to initiator.
    pub const NONE_OR_IN: u32 = 1;
    /// Data flows initiator to responder.
    pub const OUT: u32 = 2;
    /// Direction unknown.
    pub const UNKNOWN: u32 = 3;
}

/// Session identity exchanged by the init handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitIdentity {
    pub guid: [u8; GUID_SIZE],
    pub name: String,
    pub version: u32,
}

/// One PTP/IP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtpIpPacket {
    InitCommandRequest(InitIdentity),
    InitCommandAck {
        connection_number: u32,
        identity: InitIdentity,
    },
    InitEventRequest {
        connection_number: u32,
    },
    InitEventAck,
    InitFail {
        reason: u32,
    },
    CommandRequest {
        data_phase: u32,
        code: u16,
        transaction_id: u32,
        params: Vec<u32>,
    },
    CommandResponse {
        code: u16,
        transaction_id: u32,
        params: Vec<u32>,
    },
    Event {
        code: u16,
        transaction_id: u32,
        params: Vec<u32>,
    },
    StartData {
        transaction_id: u32,
        total_length: u64,
    },
    Data {
        transaction_id: u32,
        payload: Bytes,
    },
    Cancel {
        transaction_id: u32,
    },
    EndData {
        transaction_id: u32,
        payload: Bytes,
    },
    ProbeRequest,
    ProbeResponse,
}

impl PtpIpPacket {
    /// Wire value of the type field.
    pub fn packet_type(&self) -> u32 {
        use self::packet_type::*;
        match self {
            Self::InitCommandRequest(_) => INIT_COMMAND_REQUEST,
            Self::InitCommandAck { .. } => INIT_COMMAND_ACK,
            Self::InitEventRequest { .. } => INIT_EVENT_REQUEST,
            Self::InitEventAck => INIT_EVENT_ACK,
            Self::InitFail { .. } => INIT_FAIL,
            Self::CommandRequest { .. } => COMMAND_REQUEST,
            Self::CommandResponse { .. } => COMMAND_RESPONSE,
            Self::Event { .. } => EVENT,
            Self::StartData { .. } => START_DATA,
            Self::Data { .. } => DATA,
            Self::Cancel { .. } => CANCEL,
            Self::EndData { .. } => END_DATA,
            Self::ProbeRequest => PROBE_REQUEST,
            Self::ProbeResponse => PROBE_RESPONSE,
        }
    }

    /// Transaction id, for the packet types that carry one.
    pub fn transaction_id(&self) -> Option<u32> {
        match self {
            Self::CommandRequest { transaction_id, .. }
            | Self::CommandResponse { transaction_id, .. }
            | Self::Event { transaction_id, .. }
            | Self::StartData { transaction_id, .. }
            | Self::Data { transaction_id, .. }
            | Self::Cancel { transaction_id }
            | Self::EndData { transaction_id, .. } => Some(*transaction_id),
            _ => None,
        }
    }

    /// Encode to wire bytes, including the length prefix.
    pub fn encode(&self) -> Bytes {
        let mut body = BytesMut::new();
        match self {
            Self::InitCommandRequest(identity) => put_identity(&mut body, identity),
            Self::InitCommandAck {
                connection_number,
                identity,
            } => {
                body.put_u32_le(*connection_number);
                put_identity(&mut body, identity);
            }
            Self::InitEventRequest { connection_number } => body.put_u32_le(*connection_number),
            Self::InitEventAck | Self::ProbeRequest | Self::ProbeResponse => {}
            Self::InitFail { reason } => body.put_u32_le(*reason),
            Self::CommandRequest {
                data_phase,
                code,
                transaction_id,
                params,
            } => {
                body.put_u32_le(*data_phase);
                put_operation(&mut body, *code, *transaction_id, params);
            }
            Self::CommandResponse {
                code,
                transaction_id,
                params,
            }
            | Self::Event {
                code,
                transaction_id,
                params,
            } => put_operation(&mut body, *code, *transaction_id, params),
            Self::StartData {
                transaction_id,
                total_length,
            } => {
                body.put_u32_le(*transaction_id);
                body.put_u64_le(*total_length);
            }
            Self::Data {
                transaction_id,
                payload,
            }
            | Self::EndData {
                transaction_id,
                payload,
            } => {
                body.put_u32_le(*transaction_id);
                body.extend_from_slice(payload);
            }
            Self::Cancel { transaction_id } => body.put_u32_le(*transaction_id),
        }

        let mut buf = BytesMut::with_capacity(PTPIP_HEADER_SIZE + body.len());
        buf.put_u32_le((PTPIP_HEADER_SIZE + body.len()) as u32);
        buf.put_u32_le(self.packet_type());
        buf.extend_from_slice(&body);
        buf.freeze()
    }

    /// Decode one packet. `buf` must hold exactly the declared length.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < PTPIP_HEADER_SIZE {
            return Err(VcamError::truncated(
                "PTP/IP header",
                PTPIP_HEADER_SIZE,
                buf.len(),
            ));
        }
        let length = read_u32(buf, 0) as usize;
        if length != buf.len() {
            return Err(VcamError::Framing(format!(
                "PTP/IP packet declares {} bytes but {} were supplied",
                length,
                buf.len()
            )));
        }

        let kind = read_u32(buf, 4);
        let mut body = Reader::new(&buf[PTPIP_HEADER_SIZE..]);

        use self::packet_type::*;
        let packet = match kind {
            INIT_COMMAND_REQUEST => Self::InitCommandRequest(body.identity()?),
            INIT_COMMAND_ACK => Self::InitCommandAck {
                connection_number: body.u32("init ack")?,
                identity: body.identity()?,
            },
            INIT_EVENT_REQUEST => Self::InitEventRequest {
                connection_number: body.u32("init event request")?,
            },
            INIT_EVENT_ACK => Self::InitEventAck,
            INIT_FAIL => Self::InitFail {
                reason: body.u32("init fail")?,
            },
            COMMAND_REQUEST => Self::CommandRequest {
                data_phase: body.u32("command request")?,
                code: body.u16("command request")?,
                transaction_id: body.u32("command request")?,
                params: body.params()?,
            },
            COMMAND_RESPONSE => Self::CommandResponse {
                code: body.u16("command response")?,
                transaction_id: body.u32("command response")?,
                params: body.params()?,
            },
            EVENT => Self::Event {
                code: body.u16("event")?,
                transaction_id: body.u32("event")?,
                params: body.params()?,
            },
            START_DATA => Self::StartData {
                transaction_id: body.u32("start data")?,
                total_length: body.u64("start data")?,
            },
            DATA => Self::Data {
                transaction_id: body.u32("data")?,
                payload: body.rest(),
            },
            CANCEL => Self::Cancel {
                transaction_id: body.u32("cancel")?,
            },
            END_DATA => Self::EndData {
                transaction_id: body.u32("end data")?,
                payload: body.rest(),
            },
            PROBE_REQUEST => Self::ProbeRequest,
            PROBE_RESPONSE => Self::ProbeResponse,
            other => return Err(VcamError::UnsupportedContainer { kind: other }),
        };
        Ok(packet)
    }
}

/// Read the type field of an encoded packet without decoding the body.
pub fn peek_packet_type(buf: &[u8]) -> Option<u32> {
    (buf.len() >= PTPIP_HEADER_SIZE).then(|| read_u32(buf, 4))
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn put_identity(body: &mut BytesMut, identity: &InitIdentity) {
    body.extend_from_slice(&identity.guid);
    for unit in identity.name.encode_utf16() {
        body.put_u16_le(unit);
    }
    body.put_u16_le(0);
    body.put_u32_le(identity.version);
}

fn put_operation(body: &mut BytesMut, code: u16, transaction_id: u32, params: &[u32]) {
    body.put_u16_le(code);
    body.put_u32_le(transaction_id);
    for p in params {
        body.put_u32_le(*p);
    }
}

/// Bounds-checked cursor over a packet body.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        let available = self.buf.len() - self.pos;
        if available < n {
            return Err(VcamError::truncated(what, n, available));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u16(&mut self, what: &'static str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, what: &'static str) -> Result<u64> {
        let b = self.take(8, what)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    fn params(&mut self) -> Result<Vec<u32>> {
        let rest = &self.buf[self.pos..];
        if rest.len() % 4 != 0 || rest.len() > MAX_PARAMS * 4 {
            return Err(VcamError::Protocol(format!(
                "{}-byte parameter block is not 0..={} parameters",
                rest.len(),
                MAX_PARAMS
            )));
        }
        self.pos = self.buf.len();
        Ok(rest
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn identity(&mut self) -> Result<InitIdentity> {
        let mut guid = [0u8; GUID_SIZE];
        guid.copy_from_slice(self.take(GUID_SIZE, "init guid")?);

        let mut units = Vec::new();
        loop {
            let unit = self.u16("init friendly name")?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        let name = String::from_utf16_lossy(&units);
        let version = self.u32("init version")?;

        Ok(InitIdentity {
            guid,
            name,
            version,
        })
    }

    fn rest(&mut self) -> Bytes {
        let rest = Bytes::copy_from_slice(&self.buf[self.pos..]);
        self.pos = self.buf.len();
        rest
    }
}
