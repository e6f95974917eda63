//! Standard PTP operations shared by every model.

use bytes::Bytes;

use super::dataset::DatasetWriter;
use super::model::ModelProfile;
use super::registry::{Command, OperationTable, Reply};
use super::session::Session;
use crate::protocol::codes::{ec, format, op, rc};

const STANDARD_VERSION: u16 = 100;
const VENDOR_EXTENSION_VERSION: u16 = 100;
const SUPPORTED_EVENTS: &[u16] = &[ec::OBJECT_ADDED, ec::DEVICE_PROP_CHANGED];
const SUPPORTED_FORMATS: &[u16] = &[format::EXIF_JPEG];

/// Register the standard operations.
pub fn register(table: &mut OperationTable) {
    table.register(op::GET_DEVICE_INFO, "GetDeviceInfo", get_device_info);
    table.register(op::OPEN_SESSION, "OpenSession", open_session);
    table.register(op::CLOSE_SESSION, "CloseSession", close_session);
    table.register(op::GET_STORAGE_IDS, "GetStorageIDs", get_storage_ids);
    table.register(op::GET_DEVICE_PROP_DESC, "GetDevicePropDesc", get_prop_desc);
    table.register(op::GET_DEVICE_PROP_VALUE, "GetDevicePropValue", get_prop_value);
    table.register_with_data(
        op::SET_DEVICE_PROP_VALUE,
        "SetDevicePropValue",
        |_session, _cmd| Reply::ok(),
        set_prop_value_data,
    );
}

/// Encode the DeviceInfo dataset.
pub fn device_info(profile: &ModelProfile, operations: &[u16], properties: &[u16]) -> Bytes {
    let mut w = DatasetWriter::new();
    w.u16(STANDARD_VERSION)
        .u32(profile.vendor_extension_id)
        .u16(VENDOR_EXTENSION_VERSION)
        .string(profile.vendor_extension_desc)
        .u16(0) // functional mode
        .u16_array(operations)
        .u16_array(SUPPORTED_EVENTS)
        .u16_array(properties)
        .u16_array(SUPPORTED_FORMATS)
        .u16_array(SUPPORTED_FORMATS)
        .string(profile.manufacturer)
        .string(profile.model)
        .string(profile.device_version)
        .string(profile.serial_number);
    w.finish()
}

fn get_device_info(session: &mut Session, _cmd: &Command) -> Reply {
    Reply::data(session.device_info())
}

fn open_session(session: &mut Session, cmd: &Command) -> Reply {
    let id = cmd.param(0);
    if id == 0 {
        return Reply::status(rc::INVALID_PARAMETER);
    }
    if let Some(current) = session.id() {
        return Reply::status(rc::SESSION_ALREADY_OPEN).with_params(&[current]);
    }
    session.open(id);
    tracing::info!("Session {} opened", id);
    Reply::ok()
}

fn close_session(session: &mut Session, _cmd: &Command) -> Reply {
    if let Some(id) = session.id() {
        tracing::info!("Session {} closed", id);
    }
    session.close();
    Reply::ok()
}

fn get_storage_ids(_session: &mut Session, _cmd: &Command) -> Reply {
    let mut w = DatasetWriter::new();
    w.u32_array(&[]);
    Reply::data(w.finish())
}

fn get_prop_desc(session: &mut Session, cmd: &Command) -> Reply {
    match session.props.get(cmd.param(0) as u16) {
        Some(property) => Reply::data(property.encode_desc()),
        None => Reply::status(rc::DEVICE_PROP_NOT_SUPPORTED),
    }
}

fn get_prop_value(session: &mut Session, cmd: &Command) -> Reply {
    match session.props.get(cmd.param(0) as u16) {
        Some(property) => Reply::data(property.encode_value()),
        None => Reply::status(rc::DEVICE_PROP_NOT_SUPPORTED),
    }
}

fn set_prop_value_data(session: &mut Session, cmd: &Command, data: &[u8]) -> Result<(), u16> {
    let code = cmd.param(0) as u16;
    let value = session.props.set_from_wire(code, data)?;
    tracing::debug!("Property {:#06x} set to {}", code, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::model::Model;
    use crate::protocol::codes::prop;

    fn command(code: u16, params: &[u32]) -> Command {
        Command {
            code,
            transaction_id: 1,
            params: params.to_vec(),
        }
    }

    fn run(table: &OperationTable, session: &mut Session, cmd: &Command) -> Reply {
        table.get(cmd.code).unwrap().run(session, cmd)
    }

    #[test]
    fn test_device_info_strings_at_end() {
        let info = device_info(Model::Canon.profile(), &[0x1001], &[]);
        // Serial number is the last string: count 9, "12345678", NUL.
        let tail = &info[info.len() - 19..];
        assert_eq!(tail[0], 9);
        assert_eq!(tail[1], b'1');
        assert_eq!(&tail[17..], &[0, 0]);
    }

    #[test]
    fn test_device_info_header() {
        let info = device_info(Model::Canon.profile(), &[0x1001, 0x1002], &[]);
        assert_eq!(&info[0..2], &100u16.to_le_bytes());
        assert_eq!(&info[2..6], &0x0Bu32.to_le_bytes());
        // vendor desc "" then functional mode then 2 operations
        assert_eq!(info[8], 0);
        assert_eq!(&info[11..15], &2u32.to_le_bytes());
    }

    #[test]
    fn test_open_session_twice() {
        let mut table = OperationTable::new();
        register(&mut table);
        let mut session = Session::new(Bytes::new());

        let first = run(&table, &mut session, &command(op::OPEN_SESSION, &[1]));
        let second = run(&table, &mut session, &command(op::OPEN_SESSION, &[2]));

        assert_eq!(first.code, rc::OK);
        assert_eq!(second.code, rc::SESSION_ALREADY_OPEN);
        assert_eq!(second.params, vec![1]);
    }

    #[test]
    fn test_open_session_zero_id() {
        let mut table = OperationTable::new();
        register(&mut table);
        let reply = run(
            &table,
            &mut Session::new(Bytes::new()),
            &command(op::OPEN_SESSION, &[0]),
        );
        assert_eq!(reply.code, rc::INVALID_PARAMETER);
    }

    #[test]
    fn test_storage_ids_empty_array() {
        let mut table = OperationTable::new();
        register(&mut table);
        let reply = run(
            &table,
            &mut Session::new(Bytes::new()),
            &command(op::GET_STORAGE_IDS, &[]),
        );
        assert_eq!(reply.data.unwrap().as_ref(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_set_prop_value_round_trip() {
        let mut table = OperationTable::new();
        register(&mut table);
        let mut session = Session::new(Bytes::new());

        let set = command(op::SET_DEVICE_PROP_VALUE, &[u32::from(prop::EXPOSURE_TIME)]);
        let reply = table
            .get(set.code)
            .unwrap()
            .run_with_data(&mut session, &set, &333u32.to_le_bytes());
        assert_eq!(reply.code, rc::OK);

        let get = command(op::GET_DEVICE_PROP_VALUE, &[u32::from(prop::EXPOSURE_TIME)]);
        let value = run(&table, &mut session, &get).data.unwrap();
        assert_eq!(value.as_ref(), &333u32.to_le_bytes());
    }

    #[test]
    fn test_unknown_property() {
        let mut table = OperationTable::new();
        register(&mut table);
        let reply = run(
            &table,
            &mut Session::new(Bytes::new()),
            &command(op::GET_DEVICE_PROP_DESC, &[0x5999]),
        );
        assert_eq!(reply.code, rc::DEVICE_PROP_NOT_SUPPORTED);
    }
}
