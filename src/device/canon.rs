//! Canon EOS extension operations.
//!
//! Only the operations that drive the vendor state engine have behavior;
//! the rest of the EOS set is advertised and answered with OK so clients
//! that probe for it keep going.

use super::registry::{Command, OperationTable, Reply};
use super::session::Session;
use super::vendor::{ViewfinderFrame, VIEWFINDER_DELAY};
use crate::protocol::codes::{op, rc};

/// EOS operation codes answered with a bare OK.
const PASSIVE_RANGES: &[(u16, u16)] = &[
    (0x902F, 0x902F),
    (0x9033, 0x9033),
    (0x9052, 0x905F),
    (0x9068, 0x906F),
    (0x9101, 0x910F),
    (0x9113, 0x9113),
    (0x9117, 0x9118),
    (0x911A, 0x9124),
    (0x9127, 0x9127),
    (0x912B, 0x9143),
    (0x9154, 0x915A),
    (0x9160, 0x9160),
    (0x9180, 0x9185),
    (0x91C0, 0x91FF),
    (0x9801, 0x9805),
    (0x9996, 0x9996),
];

/// Bytes of a SetDevicePropValueEx payload: size, code, value.
const PROP_VALUE_EX_SIZE: usize = 12;

/// Register the EOS operations over whatever is already in `table`.
pub fn register(table: &mut OperationTable) {
    for &(first, last) in PASSIVE_RANGES {
        for code in first..=last {
            table.register(code, "EosVendorOperation", |_s, _c| Reply::ok());
        }
    }

    table.register(op::EOS_SET_REMOTE_MODE, "EosSetRemoteMode", set_event_mode);
    table.register(op::EOS_SET_EVENT_MODE, "EosSetEventMode", set_event_mode);
    table.register_with_data(
        op::EOS_SET_DEVICE_PROP_VALUE_EX,
        "EosSetDevicePropValueEx",
        |_s, _c| Reply::ok(),
        set_prop_value_ex,
    );
    table.register(op::EOS_GET_EVENT, "EosGetEvent", get_event);
    table.register(op::EOS_GET_VIEWFINDER_DATA, "EosGetViewFinderData", get_viewfinder_data);
    table.register(op::EOS_REMOTE_RELEASE_ON, "EosRemoteReleaseOn", remote_release_on);
    table.register(op::EOS_REMOTE_RELEASE_OFF, "EosRemoteReleaseOff", |_s, _c| {
        Reply::ok()
    });
}

fn set_event_mode(session: &mut Session, cmd: &Command) -> Reply {
    if cmd.params.len() != 1 {
        tracing::warn!(
            "{:#06x} expects one parameter, got {}",
            cmd.code,
            cmd.params.len()
        );
        return Reply::status(rc::INVALID_PARAMETER);
    }
    session.vendor.set_event_mode();
    Reply::ok()
}

fn set_prop_value_ex(session: &mut Session, _cmd: &Command, data: &[u8]) -> Result<(), u16> {
    if data.len() < PROP_VALUE_EX_SIZE {
        tracing::warn!(
            "SetDevicePropValueEx payload too short ({} bytes)",
            data.len()
        );
        return Err(rc::INVALID_PARAMETER);
    }
    let word = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
    let (code, value) = (word(4), word(8));

    tracing::debug!("EOS property {:#06x} <- {:#x}", code, value);
    if let Err(e) = session.vendor.set_property(code, value) {
        tracing::warn!("Dropped change of {:#06x}: {}", code, e);
    }
    Ok(())
}

fn get_event(session: &mut Session, _cmd: &Command) -> Reply {
    Reply::data(session.vendor.get_event())
}

fn get_viewfinder_data(session: &mut Session, _cmd: &Command) -> Reply {
    match session.vendor.viewfinder_frame() {
        ViewfinderFrame::NotReady => Reply::status(rc::CANON_NOT_READY),
        ViewfinderFrame::Ready(frame) => Reply::data(frame),
    }
    .after(VIEWFINDER_DELAY)
}

fn remote_release_on(session: &mut Session, cmd: &Command) -> Reply {
    let delay = session.vendor.remote_release(cmd.param(0));
    Reply::ok().after(delay)
}
