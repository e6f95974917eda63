//! USB bulk container <-> PTP/IP packet translation.
//!
//! | Bulk container | PTP/IP packets                         |
//! |----------------|----------------------------------------|
//! | Command        | CommandRequest                         |
//! | Response       | CommandResponse                        |
//! | Event          | Event                                  |
//! | Data           | StartData, (Data)*, EndData            |
//!
//! Outbound data is always split into exactly one StartData and one EndData.
//! Inbound data may arrive in any number of intermediate Data packets; the
//! chunks are joined in order. Parameter counts come from the container
//! length on both sides, so a round trip keeps them exactly.

use bytes::{Bytes, BytesMut};

use crate::error::{Result, VcamError};
use crate::protocol::{data_phase, BulkContainer, BulkKind, PtpIpPacket, MAX_PARAMS};

/// StartData length meaning "not known in advance".
pub const UNKNOWN_DATA_LENGTH: u64 = u64::MAX;

/// Stateless translator between the USB and PTP/IP representations.
pub struct PtpIpBridge;

impl PtpIpBridge {
    /// Translate one bulk container into the PTP/IP packet(s) that carry it.
    ///
    /// Commands are tagged with the no-data / data-in phase.
    #[inline]
    pub fn bulk_to_ptpip(container: &BulkContainer) -> Result<Vec<PtpIpPacket>> {
        Self::bulk_to_ptpip_with_phase(container, data_phase::NONE_OR_IN)
    }

    /// Like [`bulk_to_ptpip`](Self::bulk_to_ptpip) with an explicit data-phase tag for commands.
    pub fn bulk_to_ptpip_with_phase(
        container: &BulkContainer,
        phase: u32,
    ) -> Result<Vec<PtpIpPacket>> {
        if container.kind.has_params()
            && (container.payload.len() % 4 != 0 || container.param_count() > MAX_PARAMS)
        {
            return Err(VcamError::Protocol(format!(
                "{:?} container with {}-byte parameter block",
                container.kind,
                container.payload.len()
            )));
        }

        let code = container.code;
        let transaction_id = container.transaction_id;

        let packets = match container.kind {
            BulkKind::Command => vec![PtpIpPacket::CommandRequest {
                data_phase: phase,
                code,
                transaction_id,
                params: container.params(),
            }],
            BulkKind::Response => vec![PtpIpPacket::CommandResponse {
                code,
                transaction_id,
                params: container.params(),
            }],
            BulkKind::Event => vec![PtpIpPacket::Event {
                code,
                transaction_id,
                params: container.params(),
            }],
            BulkKind::Data => vec![
                PtpIpPacket::StartData {
                    transaction_id,
                    total_length: container.payload.len() as u64,
                },
                PtpIpPacket::EndData {
                    transaction_id,
                    payload: container.payload.clone(),
                },
            ],
        };

        Ok(packets)
    }

    /// Translate the PTP/IP packet(s) of one transaction step back into a bulk container.
    ///
    /// `op_code` is stamped on Data containers only, since StartData does not
    /// carry the operation it belongs to.
    ///
    /// # Errors
    ///
    /// - `UnsupportedContainer` for packet kinds with no bulk equivalent (init, probe, cancel)
    /// - `TransactionMismatch` if data chunks disagree on the transaction id
    /// - `Protocol` for a malformed sequence or a length that does not match StartData
    pub fn ptpip_to_bulk(packets: &[PtpIpPacket], op_code: u16) -> Result<BulkContainer> {
        match packets {
            [] => Err(VcamError::Protocol("no packets to translate".into())),
            [PtpIpPacket::StartData {
                transaction_id,
                total_length,
            }, rest @ ..] => join_data(*transaction_id, *total_length, rest, op_code),
            [single] => single_to_bulk(single),
            [first, ..] => Err(VcamError::Protocol(format!(
                "{} packets supplied for a non-data step starting with type {}",
                packets.len(),
                first.packet_type()
            ))),
        }
    }
}

fn single_to_bulk(packet: &PtpIpPacket) -> Result<BulkContainer> {
    let (build, code, transaction_id, params): (fn(u16, u32, &[u32]) -> BulkContainer, _, _, _) =
        match packet {
            PtpIpPacket::CommandRequest {
                code,
                transaction_id,
                params,
                ..
            } => (BulkContainer::command, code, transaction_id, params),
            PtpIpPacket::CommandResponse {
                code,
                transaction_id,
                params,
            } => (BulkContainer::response, code, transaction_id, params),
            PtpIpPacket::Event {
                code,
                transaction_id,
                params,
            } => (BulkContainer::event, code, transaction_id, params),
            other => {
                return Err(VcamError::UnsupportedContainer {
                    kind: other.packet_type(),
                })
            }
        };

    if params.len() > MAX_PARAMS {
        return Err(VcamError::Protocol(format!(
            "{} parameters exceed the bulk limit of {}",
            params.len(),
            MAX_PARAMS
        )));
    }

    Ok(build(*code, *transaction_id, params))
}

fn join_data(
    transaction_id: u32,
    total_length: u64,
    rest: &[PtpIpPacket],
    op_code: u16,
) -> Result<BulkContainer> {
    let (last, chunks) = rest
        .split_last()
        .ok_or_else(|| VcamError::Protocol("StartData without EndData".into()))?;

    let tail = match last {
        PtpIpPacket::EndData {
            transaction_id: found,
            payload,
        } => {
            check_transaction(transaction_id, *found)?;
            payload
        }
        other => {
            return Err(VcamError::Protocol(format!(
                "data phase ends with packet type {} instead of EndData",
                other.packet_type()
            )))
        }
    };

    let payload = if chunks.is_empty() {
        tail.clone()
    } else {
        let mut joined = BytesMut::new();
        for chunk in chunks {
            match chunk {
                PtpIpPacket::Data {
                    transaction_id: found,
                    payload,
                } => {
                    check_transaction(transaction_id, *found)?;
                    joined.extend_from_slice(payload);
                }
                other => {
                    return Err(VcamError::Protocol(format!(
                        "unexpected packet type {} inside data phase",
                        other.packet_type()
                    )))
                }
            }
        }
        joined.extend_from_slice(tail);
        joined.freeze()
    };

    check_length(total_length, &payload)?;
    Ok(BulkContainer::data(op_code, transaction_id, payload))
}

fn check_transaction(expected: u32, found: u32) -> Result<()> {
    if expected != found {
        return Err(VcamError::TransactionMismatch { expected, found });
    }
    Ok(())
}

fn check_length(advertised: u64, payload: &Bytes) -> Result<()> {
    if advertised != UNKNOWN_DATA_LENGTH && advertised != payload.len() as u64 {
        return Err(VcamError::Protocol(format!(
            "StartData advertised {} bytes, received {}",
            advertised,
            payload.len()
        )));
    }
    Ok(())
}
