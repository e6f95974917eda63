//! Operation table for dispatching commands by operation code.
//!
//! The table maps a 16-bit operation code to a handler pair: a main handler
//! that produces the reply, and an optional data handler that consumes the
//! initiator's data phase first. Per-model tables are built by layering
//! vendor registrations over the generic ones; a later registration for the
//! same code replaces the earlier one.
//!
//! # Example
//!
//! ```
//! use ptp_vcam::device::{OperationTable, Reply};
//! use ptp_vcam::protocol::codes::rc;
//!
//! let mut table = OperationTable::new();
//! table.register(0x9114, "SetRemoteMode", |session, _cmd| {
//!     session.vendor.set_event_mode();
//!     Reply::ok()
//! });
//!
//! assert!(table.contains(0x9114));
//! assert_eq!(table.name(0x9114), Some("SetRemoteMode"));
//! # let _ = rc::OK;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;

use super::session::Session;
use crate::protocol::codes::rc;
use crate::protocol::BulkContainer;

/// A decoded command container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub code: u16,
    pub transaction_id: u32,
    pub params: Vec<u32>,
}

impl Command {
    /// Parameter at `index`, or 0 when absent.
    #[inline]
    pub fn param(&self, index: usize) -> u32 {
        self.params.get(index).copied().unwrap_or(0)
    }
}

impl From<&BulkContainer> for Command {
    fn from(container: &BulkContainer) -> Self {
        Self {
            code: container.code,
            transaction_id: container.transaction_id,
            params: container.params(),
        }
    }
}

/// What a handler wants sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Response code.
    pub code: u16,
    /// Response parameters.
    pub params: Vec<u32>,
    /// Responder-to-initiator data phase, sent before the response.
    pub data: Option<Bytes>,
    /// Simulated hardware time before anything is sent.
    pub delay: Duration,
}

impl Reply {
    /// Reply with the given response code and nothing else.
    pub fn status(code: u16) -> Self {
        Self {
            code,
            params: Vec::new(),
            data: None,
            delay: Duration::ZERO,
        }
    }

    pub fn ok() -> Self {
        Self::status(rc::OK)
    }

    /// OK with a data phase.
    pub fn data(data: Bytes) -> Self {
        Self::ok().with_data(data)
    }

    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_params(mut self, params: &[u32]) -> Self {
        self.params = params.to_vec();
        self
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Containers for this reply, data (if any) first.
    pub fn into_containers(self, command: &Command) -> Vec<BulkContainer> {
        let mut containers = Vec::with_capacity(2);
        if let Some(data) = self.data {
            containers.push(BulkContainer::data(
                command.code,
                command.transaction_id,
                data,
            ));
        }
        containers.push(BulkContainer::response(
            self.code,
            command.transaction_id,
            &self.params,
        ));
        containers
    }
}

/// Trait for main handlers.
pub trait Handler: Send + Sync + 'static {
    /// Run the operation.
    fn call(&self, session: &mut Session, command: &Command) -> Reply;
}

impl<F> Handler for F
where
    F: Fn(&mut Session, &Command) -> Reply + Send + Sync + 'static,
{
    fn call(&self, session: &mut Session, command: &Command) -> Reply {
        self(session, command)
    }
}

/// Trait for data-phase handlers.
///
/// `Err` carries the response code to send instead of running the main handler.
pub trait DataHandler: Send + Sync + 'static {
    fn call(&self, session: &mut Session, command: &Command, data: &[u8])
        -> Result<(), u16>;
}

impl<F> DataHandler for F
where
    F: Fn(&mut Session, &Command, &[u8]) -> Result<(), u16> + Send + Sync + 'static,
{
    fn call(&self, session: &mut Session, command: &Command, data: &[u8]) -> Result<(), u16> {
        self(session, command, data)
    }
}

/// Entry for a registered operation.
pub struct OperationEntry {
    name: &'static str,
    main: Box<dyn Handler>,
    data: Option<Box<dyn DataHandler>>,
}

impl OperationEntry {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the operation expects an initiator-to-responder data phase.
    pub fn has_data_phase(&self) -> bool {
        self.data.is_some()
    }

    /// Run the main handler.
    pub fn run(&self, session: &mut Session, command: &Command) -> Reply {
        self.main.call(session, command)
    }

    /// Run the data handler, then the main handler.
    pub fn run_with_data(&self, session: &mut Session, command: &Command, data: &[u8]) -> Reply {
        if let Some(handler) = &self.data {
            if let Err(code) = handler.call(session, command, data) {
                return Reply::status(code);
            }
        }
        self.main.call(session, command)
    }
}

/// Registry mapping operation codes to handlers.
#[derive(Default)]
pub struct OperationTable {
    entries: HashMap<u16, OperationEntry>,
}

impl OperationTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation without a data phase.
    pub fn register<F>(&mut self, code: u16, name: &'static str, main: F)
    where
        F: Fn(&mut Session, &Command) -> Reply + Send + Sync + 'static,
    {
        self.entries.insert(
            code,
            OperationEntry {
                name,
                main: Box::new(main),
                data: None,
            },
        );
    }

    /// Register an operation whose data phase runs `data` before `main`.
    pub fn register_with_data<F, D>(&mut self, code: u16, name: &'static str, main: F, data: D)
    where
        F: Fn(&mut Session, &Command) -> Reply + Send + Sync + 'static,
        D: Fn(&mut Session, &Command, &[u8]) -> Result<(), u16> + Send + Sync + 'static,
    {
        self.entries.insert(
            code,
            OperationEntry {
                name,
                main: Box::new(main),
                data: Some(Box::new(data)),
            },
        );
    }

    pub fn get(&self, code: u16) -> Option<&OperationEntry> {
        self.entries.get(&code)
    }

    pub fn contains(&self, code: u16) -> bool {
        self.entries.contains_key(&code)
    }

    /// Registered name for `code`.
    pub fn name(&self, code: u16) -> Option<&'static str> {
        self.entries.get(&code).map(|e| e.name)
    }

    /// All codes in ascending order, for the DeviceInfo dataset.
    pub fn codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.entries.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(Bytes::new())
    }

    fn command(code: u16) -> Command {
        Command {
            code,
            transaction_id: 9,
            params: vec![4],
        }
    }

    #[test]
    fn test_register_and_run() {
        let mut table = OperationTable::new();
        table.register(0x9000, "Echo", |_s: &mut Session, cmd: &Command| {
            Reply::ok().with_params(&[cmd.param(0)])
        });

        let reply = table.get(0x9000).unwrap().run(&mut session(), &command(0x9000));
        assert_eq!(reply.params, vec![4]);
        assert!(!table.get(0x9000).unwrap().has_data_phase());
    }

    #[test]
    fn test_later_registration_wins() {
        let mut table = OperationTable::new();
        table.register(0x101C, "InitiateOpenCapture", |_s: &mut Session, _c: &Command| {
            Reply::status(rc::OPERATION_NOT_SUPPORTED)
        });
        table.register(0x101C, "OpenRemotePorts", |_s: &mut Session, _c: &Command| {
            Reply::ok()
        });

        assert_eq!(table.len(), 1);
        assert_eq!(table.name(0x101C), Some("OpenRemotePorts"));
    }

    #[test]
    fn test_data_handler_runs_first() {
        let mut table = OperationTable::new();
        table.register_with_data(
            0x9110,
            "SetDevicePropValueEx",
            |s: &mut Session, _c: &Command| Reply::ok().with_params(&[s.vendor.pending_len() as u32]),
            |s: &mut Session, _c: &Command, data: &[u8]| {
                s.vendor.set_property(u32::from(data[0]), 1).map_err(|_| rc::GENERAL_ERROR)
            },
        );

        let entry = table.get(0x9110).unwrap();
        let mut s = session();
        let reply = entry.run_with_data(&mut s, &command(0x9110), &[7]);

        assert!(entry.has_data_phase());
        assert_eq!(reply.params, vec![1]);
    }

    #[test]
    fn test_data_handler_rejection() {
        let mut table = OperationTable::new();
        table.register_with_data(
            0x1016,
            "SetDevicePropValue",
            |_s: &mut Session, _c: &Command| Reply::ok(),
            |_s: &mut Session, _c: &Command, _d: &[u8]| Err(rc::INVALID_DEVICE_PROP_VALUE),
        );

        let reply = table
            .get(0x1016)
            .unwrap()
            .run_with_data(&mut session(), &command(0x1016), &[]);
        assert_eq!(reply.code, rc::INVALID_DEVICE_PROP_VALUE);
    }

    #[test]
    fn test_codes_sorted() {
        let mut table = OperationTable::new();
        for code in [0x1004u16, 0x1001, 0x9116] {
            table.register(code, "op", |_s: &mut Session, _c: &Command| Reply::ok());
        }
        assert_eq!(table.codes(), vec![0x1001, 0x1004, 0x9116]);
    }

    #[test]
    fn test_reply_containers() {
        let cmd = command(0x9116);
        let containers = Reply::data(Bytes::from_static(b"ev")).into_containers(&cmd);

        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0], BulkContainer::data(0x9116, 9, Bytes::from_static(b"ev")));
        assert_eq!(containers[1], BulkContainer::response(rc::OK, 9, &[]));
    }
}
