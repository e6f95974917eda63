//! Fujifilm X-series extension operations.

use super::dataset::DatasetWriter;
use super::registry::{Command, OperationTable, Reply};
use super::session::Session;
use crate::protocol::codes::op;

/// Register the Fuji operations over whatever is already in `table`.
pub fn register(table: &mut OperationTable) {
    table.register(op::FUJI_GET_DEVICE_INFO, "FujiGetDeviceInfo", get_device_info);
    table.register(op::INITIATE_OPEN_CAPTURE, "InitiateOpenCapture", open_remote_ports);
    table.register(op::TERMINATE_OPEN_CAPTURE, "TerminateOpenCapture", open_remote_ports);
}

/// Property descriptions for every known property, prefixed with their count.
fn get_device_info(session: &mut Session, _cmd: &Command) -> Reply {
    let codes = session.props.codes();
    let mut w = DatasetWriter::new();
    w.u32(codes.len() as u32);
    for code in codes {
        if let Some(property) = session.props.get(code) {
            let desc = property.encode_desc();
            w.u32(desc.len() as u32).raw(&desc);
        }
    }
    Reply::data(w.finish())
}

/// The camera app opens its event and liveview sockets after these.
fn open_remote_ports(session: &mut Session, cmd: &Command) -> Reply {
    tracing::debug!("Remote ports requested by {:#06x}", cmd.code);
    session.request_secondary_channels();
    Reply::ok()
}
