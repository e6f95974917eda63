//! Per-connection session state.

use bytes::Bytes;

use super::property::PropertyStore;
use super::vendor::VendorState;

/// State threaded through every operation handler.
///
/// Owned by the connection's command loop; handlers borrow it mutably for
/// the duration of one operation.
#[derive(Debug)]
pub struct Session {
    id: Option<u32>,
    device_info: Bytes,
    secondary_requested: bool,
    pub vendor: VendorState,
    pub props: PropertyStore,
}

impl Session {
    /// Create a closed session. `device_info` is the encoded DeviceInfo dataset.
    pub fn new(device_info: Bytes) -> Self {
        Self {
            id: None,
            device_info,
            secondary_requested: false,
            vendor: VendorState::new(),
            props: PropertyStore::with_defaults(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.id.is_some()
    }

    /// Session id chosen by the initiator, if open.
    pub fn id(&self) -> Option<u32> {
        self.id
    }

    /// Open with a fresh vendor and property state.
    pub fn open(&mut self, id: u32) {
        self.id = Some(id);
        self.vendor = VendorState::new();
        self.props = PropertyStore::with_defaults();
    }

    pub fn close(&mut self) {
        self.id = None;
    }

    pub fn device_info(&self) -> Bytes {
        self.device_info.clone()
    }

    /// Ask the transport to bring up its event/liveview channels.
    pub fn request_secondary_channels(&mut self) {
        self.secondary_requested = true;
    }

    /// Take a pending secondary-channel request, clearing it.
    pub fn take_secondary_request(&mut self) -> bool {
        std::mem::take(&mut self.secondary_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_resets_vendor_state() {
        let mut session = Session::new(Bytes::new());
        session.vendor.get_event();
        assert!(session.vendor.first_poll_done());

        session.open(1);

        assert!(session.is_open());
        assert_eq!(session.id(), Some(1));
        assert!(!session.vendor.first_poll_done());
    }

    #[test]
    fn test_secondary_request_taken_once() {
        let mut session = Session::new(Bytes::new());
        assert!(!session.take_secondary_request());
        session.request_secondary_channels();
        assert!(session.take_secondary_request());
        assert!(!session.take_secondary_request());
    }
}
