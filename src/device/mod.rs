//! Device module - the emulated camera behind every transport.
//!
//! Provides:
//! - [`Device`] - dispatches bulk containers to the model's operation table
//! - [`OperationTable`] - maps operation codes to handlers
//! - [`Session`] / [`VendorState`] - per-connection state threaded through handlers
//! - [`Model`] - which camera is emulated
//!
//! Transports hand the device one [`BulkContainer`] at a time and send back
//! whatever [`Outcome`] it produces. Operations with an inbound data phase
//! answer [`Outcome::AwaitData`] first; the transport then delivers the data
//! container and gets the reply.
//!
//! # Example
//!
//! ```
//! use ptp_vcam::device::{Device, Model, Outcome};
//! use ptp_vcam::protocol::{codes::op, BulkContainer};
//!
//! let mut device = Device::new(Model::Canon);
//! let outcome = device
//!     .process(BulkContainer::command(op::OPEN_SESSION, 1, &[1]))
//!     .unwrap();
//!
//! match outcome {
//!     Outcome::Reply { containers, .. } => assert_eq!(containers.len(), 1),
//!     _ => unreachable!(),
//! }
//! ```

mod canon;
mod dataset;
mod fuji;
mod generic;
mod model;
mod property;
mod registry;
mod session;
mod vendor;

use std::time::Duration;

pub use dataset::DatasetWriter;
pub use model::{Model, ModelProfile};
pub use property::{Property, PropertyStore};
pub use registry::{Command, DataHandler, Handler, OperationEntry, OperationTable, Reply};
pub use session::Session;
pub use vendor::{
    release, PropertyChange, VendorState, ViewfinderFrame, EVENT_QUEUE_CAPACITY,
    EVENT_RECORD_SIZE, FULL_PRESS_DELAY, HALF_PRESS_DELAY, LIVEVIEW_FRAME, LIVEVIEW_WARMUP_CALLS,
    VIEWFINDER_DELAY,
};

use crate::error::{Result, VcamError};
use crate::protocol::codes::{op, rc};
use crate::protocol::{BulkContainer, BulkKind};

/// Operations that work before OpenSession.
const SESSIONLESS_OPS: &[u16] = &[op::GET_DEVICE_INFO, op::OPEN_SESSION, op::FUJI_GET_DEVICE_INFO];

/// What the transport should do after handing the device a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The command has an inbound data phase; deliver the data container next.
    AwaitData,
    /// Nothing to send; the container was dropped.
    Discarded,
    /// Send these containers in order, after `delay`.
    Reply {
        containers: Vec<BulkContainer>,
        delay: Duration,
    },
}

impl Outcome {
    fn reply(reply: Reply, command: &Command) -> Self {
        let delay = reply.delay;
        Self::Reply {
            containers: reply.into_containers(command),
            delay,
        }
    }
}

/// One emulated camera.
pub struct Device {
    model: Model,
    table: OperationTable,
    session: Session,
    pending: Option<Command>,
}

impl Device {
    /// Build the device for `model` with a closed session.
    pub fn new(model: Model) -> Self {
        let table = model.operation_table();
        let props = PropertyStore::with_defaults().codes();
        let info = generic::device_info(model.profile(), &table.codes(), &props);
        Self {
            model,
            table,
            session: Session::new(info),
            pending: None,
        }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn table(&self) -> &OperationTable {
        &self.table
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Whether a command is waiting for its data phase.
    pub fn awaiting_data(&self) -> bool {
        self.pending.is_some()
    }

    /// Take a pending request for event/liveview channels.
    pub fn take_secondary_request(&mut self) -> bool {
        self.session.take_secondary_request()
    }

    /// Process one container from the initiator.
    ///
    /// # Errors
    ///
    /// Returns `TransactionMismatch` when a data container does not belong to
    /// the pending command, and `Protocol` for responses or events sent by the
    /// initiator. Both leave the stream out of step and should close the connection.
    pub fn process(&mut self, container: BulkContainer) -> Result<Outcome> {
        match container.kind {
            BulkKind::Command => Ok(self.command(Command::from(&container))),
            BulkKind::Data => self.data(container),
            kind => Err(VcamError::Protocol(format!(
                "initiator sent a {:?} container",
                kind
            ))),
        }
    }

    fn command(&mut self, command: Command) -> Outcome {
        if let Some(stale) = self.pending.take() {
            tracing::warn!(
                "Command {:#06x} abandoned its data phase (tid={})",
                stale.code,
                stale.transaction_id
            );
        }

        let Some(entry) = self.table.get(command.code) else {
            tracing::debug!("Unsupported operation {:#06x}", command.code);
            return Outcome::reply(Reply::status(rc::OPERATION_NOT_SUPPORTED), &command);
        };
        tracing::debug!(
            "{} ({:#06x}) tid={} params={:?}",
            entry.name(),
            command.code,
            command.transaction_id,
            command.params
        );

        if entry.has_data_phase() {
            self.pending = Some(command);
            return Outcome::AwaitData;
        }
        if let Some(reply) = self.gate(&command) {
            return Outcome::reply(reply, &command);
        }
        let reply = entry.run(&mut self.session, &command);
        Outcome::reply(reply, &command)
    }

    fn data(&mut self, container: BulkContainer) -> Result<Outcome> {
        let Some(command) = self.pending.take() else {
            tracing::warn!(
                "Dropping {} bytes of data for {:#06x} with no command pending",
                container.payload.len(),
                container.code
            );
            return Ok(Outcome::Discarded);
        };
        if container.transaction_id != command.transaction_id {
            return Err(VcamError::TransactionMismatch {
                expected: command.transaction_id,
                found: container.transaction_id,
            });
        }

        if let Some(reply) = self.gate(&command) {
            return Ok(Outcome::reply(reply, &command));
        }
        let reply = match self.table.get(command.code) {
            Some(entry) => entry.run_with_data(&mut self.session, &command, &container.payload),
            None => Reply::status(rc::OPERATION_NOT_SUPPORTED),
        };
        Ok(Outcome::reply(reply, &command))
    }

    fn gate(&self, command: &Command) -> Option<Reply> {
        if self.session.is_open() || SESSIONLESS_OPS.contains(&command.code) {
            None
        } else {
            Some(Reply::status(rc::SESSION_NOT_OPEN))
        }
    }
}
