//! `ptp-vcam` binary: parse flags, install logging, run the configured driver
//! until Ctrl+C.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ptp_vcam::config::{
    EmulatorConfig, EmulatorConfigBuilder, UsbEndpoints, FUJI_ACCESS_POINT_ADDR,
};
use ptp_vcam::device::Model;

/// Virtual PTP camera.
#[derive(Debug, Parser)]
#[command(name = "ptp-vcam", version, about)]
struct Cli {
    /// Camera to emulate: generic, canon or fuji.
    #[arg(short, long)]
    model: Option<Model>,

    /// Address to listen on.
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Listen on the address the Fuji camera app expects on the camera's access point.
    #[arg(long, conflicts_with = "bind")]
    fuji_ap: bool,

    /// Command port (PTP/IP port, or the Fuji command port).
    #[arg(short, long)]
    port: Option<u16>,

    /// JSON configuration file. Flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve a single connection, then exit.
    #[arg(long)]
    once: bool,

    /// USB gadget bulk IN endpoint file. Requires --ep-out.
    #[arg(long, requires = "ep_out")]
    ep_in: Option<PathBuf>,

    /// USB gadget bulk OUT endpoint file. Requires --ep-in.
    #[arg(long, requires = "ep_in")]
    ep_out: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<EmulatorConfig> {
        let base = match &self.config {
            Some(path) => EmulatorConfig::from_json_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => EmulatorConfig::default(),
        };
        let mut builder = EmulatorConfigBuilder::from_config(base);

        if let Some(model) = self.model {
            builder = builder.model(model);
        }
        if let Some(addr) = self.bind {
            builder = builder.bind_address(addr);
        }
        if self.fuji_ap {
            builder = builder.bind_address(IpAddr::V4(FUJI_ACCESS_POINT_ADDR));
        }
        if self.once {
            builder = builder.serve_forever(false);
        }
        if let (Some(bulk_in), Some(bulk_out)) = (self.ep_in, self.ep_out) {
            builder = builder.usb(UsbEndpoints { bulk_in, bulk_out });
        }

        let mut config = builder.build();
        if let Some(port) = self.port {
            if config.model.uses_fuji_transport() {
                config.fuji_ports.command = port;
            } else {
                config.ptpip_port = port;
            }
        }
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.into_config()?;
    let token = CancellationToken::new();

    let shutdown = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {}", e),
        }
        shutdown.cancel();
    });

    ptp_vcam::driver::run(config, token)
        .await
        .context("emulator stopped")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> EmulatorConfig {
        let argv = std::iter::once("ptp-vcam").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().into_config().unwrap()
    }

    #[test]
    fn test_fuji_ap_binds_access_point_address() {
        let config = parse(&["--model", "fuji", "--fuji-ap"]);
        assert_eq!(config.bind_address, IpAddr::V4(FUJI_ACCESS_POINT_ADDR));
    }

    #[test]
    fn test_fuji_ap_conflicts_with_bind() {
        let argv = ["ptp-vcam", "--fuji-ap", "--bind", "127.0.0.1"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_port_goes_to_model_command_port() {
        let config = parse(&["--model", "fuji", "--port", "6000", "--once"]);
        assert_eq!(config.fuji_ports.command, 6000);
        assert!(!config.serve_forever);

        let config = parse(&["--model", "canon", "--port", "6000"]);
        assert_eq!(config.ptpip_port, 6000);
    }
}
