//! USB gadget endpoint files.
//!
//! The kernel side (FunctionFS mount, descriptors, ep0 control traffic) is
//! set up outside the emulator. It only needs the two bulk endpoints as files.

use tokio::fs::{File, OpenOptions};

use crate::config::UsbEndpoints;
use crate::error::Result;

/// Opened bulk endpoints.
pub struct GadgetEndpoints {
    /// Host-to-device bulk OUT, read side.
    pub bulk_out: File,
    /// Device-to-host bulk IN, write side.
    pub bulk_in: File,
}

impl GadgetEndpoints {
    /// Open both endpoints.
    pub async fn open(paths: &UsbEndpoints) -> Result<Self> {
        let bulk_out = OpenOptions::new().read(true).open(&paths.bulk_out).await?;
        let bulk_in = OpenOptions::new().write(true).open(&paths.bulk_in).await?;
        tracing::info!(
            "Opened gadget endpoints out={} in={}",
            paths.bulk_out.display(),
            paths.bulk_in.display()
        );
        Ok(Self { bulk_out, bulk_in })
    }
}
