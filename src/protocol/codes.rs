//! PTP code constants.
//!
//! Operation codes, response codes, event codes and device property codes
//! used by the emulated models. Only the codes the emulator routes or
//! returns are listed here; per-model tables reference these by name.

/// Standard operation codes (ISO 15740).
pub mod op {
    pub const GET_DEVICE_INFO: u16 = 0x1001;
    pub const OPEN_SESSION: u16 = 0x1002;
    pub const CLOSE_SESSION: u16 = 0x1003;
    pub const GET_STORAGE_IDS: u16 = 0x1004;
    pub const GET_DEVICE_PROP_DESC: u16 = 0x1014;
    pub const GET_DEVICE_PROP_VALUE: u16 = 0x1015;
    pub const SET_DEVICE_PROP_VALUE: u16 = 0x1016;
    pub const INITIATE_OPEN_CAPTURE: u16 = 0x101C;
    pub const TERMINATE_OPEN_CAPTURE: u16 = 0x1018;

    // Canon EOS extension
    pub const EOS_SET_DEVICE_PROP_VALUE_EX: u16 = 0x9110;
    pub const EOS_SET_REMOTE_MODE: u16 = 0x9114;
    pub const EOS_SET_EVENT_MODE: u16 = 0x9115;
    pub const EOS_GET_EVENT: u16 = 0x9116;
    pub const EOS_REMOTE_RELEASE_ON: u16 = 0x9128;
    pub const EOS_REMOTE_RELEASE_OFF: u16 = 0x9129;
    pub const EOS_GET_VIEWFINDER_DATA: u16 = 0x9153;

    // Fujifilm extension
    pub const FUJI_GET_DEVICE_INFO: u16 = 0x902B;
}

/// Response codes.
pub mod rc {
    pub const OK: u16 = 0x2001;
    pub const GENERAL_ERROR: u16 = 0x2002;
    pub const SESSION_NOT_OPEN: u16 = 0x2003;
    pub const OPERATION_NOT_SUPPORTED: u16 = 0x2005;
    pub const PARAMETER_NOT_SUPPORTED: u16 = 0x2006;
    pub const DEVICE_PROP_NOT_SUPPORTED: u16 = 0x200A;
    pub const ACCESS_DENIED: u16 = 0x200F;
    pub const INVALID_DEVICE_PROP_VALUE: u16 = 0x201C;
    pub const INVALID_PARAMETER: u16 = 0x201D;
    pub const SESSION_ALREADY_OPEN: u16 = 0x201E;

    /// Canon "not ready": sensor still warming up. A normal outcome, not a failure.
    pub const CANON_NOT_READY: u16 = 0xA102;

    /// Human-readable name for log lines.
    pub fn name(code: u16) -> &'static str {
        match code {
            OK => "OK",
            GENERAL_ERROR => "GeneralError",
            SESSION_NOT_OPEN => "SessionNotOpen",
            OPERATION_NOT_SUPPORTED => "OperationNotSupported",
            PARAMETER_NOT_SUPPORTED => "ParameterNotSupported",
            DEVICE_PROP_NOT_SUPPORTED => "DevicePropNotSupported",
            ACCESS_DENIED => "AccessDenied",
            INVALID_DEVICE_PROP_VALUE => "InvalidDevicePropValue",
            INVALID_PARAMETER => "InvalidParameter",
            SESSION_ALREADY_OPEN => "SessionAlreadyOpen",
            CANON_NOT_READY => "Canon_NotReady",
            _ => "Unknown",
        }
    }
}

/// Event codes.
pub mod ec {
    pub const OBJECT_ADDED: u16 = 0x4002;
    pub const DEVICE_PROP_CHANGED: u16 = 0x4006;

    /// EOS "property value changed" record tag.
    pub const EOS_PROP_VALUE_CHANGED: u32 = 0xC189;
    /// EOS "available list changed" record tag.
    pub const EOS_AVAIL_LIST_CHANGED: u32 = 0xC18A;
}

/// Device property codes.
pub mod prop {
    pub const BATTERY_LEVEL: u16 = 0x5001;
    pub const F_NUMBER: u16 = 0x5007;
    pub const EXPOSURE_TIME: u16 = 0x500D;
    pub const EXPOSURE_BIAS: u16 = 0x5010;

    pub const EOS_APERTURE: u32 = 0xD101;
    pub const EOS_SHUTTER_SPEED: u32 = 0xD102;
    pub const EOS_ISO_SPEED: u32 = 0xD103;
    pub const EOS_CAPTURE_DESTINATION: u32 = 0xD11C;
    pub const EOS_BATTERY_POWER: u32 = 0xD111;
}

/// Object format codes.
pub mod format {
    pub const EXIF_JPEG: u16 = 0x3801;
}

/// PTP dataset type codes used by the property store.
pub mod datatype {
    pub const INT8: u16 = 0x0001;
    pub const UINT8: u16 = 0x0002;
    pub const INT16: u16 = 0x0003;
    pub const UINT16: u16 = 0x0004;
    pub const INT32: u16 = 0x0005;
    pub const UINT32: u16 = 0x0006;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_names() {
        assert_eq!(rc::name(rc::OK), "OK");
        assert_eq!(rc::name(rc::CANON_NOT_READY), "Canon_NotReady");
        assert_eq!(rc::name(0x1234), "Unknown");
    }
}
