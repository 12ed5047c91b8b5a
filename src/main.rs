//! Two-port VNA instrument server, middle layer.
//!
//! Wires the relay stream, the RF switch, the VNA seam and the calibration
//! RPC together and runs the dispatcher until ctrl-c.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vna_middle::measure::Hardware;
use vna_middle::middle::{Coordinator, Middle};
use vna_middle::rpc::GrpcCalibrator;
use vna_middle::switch::RfSwitch;
use vna_middle::vna::{MockVna, Vna};
use vna_middle::{Config, Stream};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config = Config::from_env();
    info!(
        "starting: switch {} @ {} baud, calibration {}, relay {}",
        config.serial_port, config.baud, config.cal_addr, config.topic
    );

    let switch = RfSwitch::open(&config.serial_port, config.baud, config.timeout_usb)?;

    // The vendor VNA driver plugs in behind the Vna trait; the synthetic
    // instrument keeps the rig usable without it.
    let vna: Arc<dyn Vna> = Arc::new(MockVna::default());

    // A calibration service we cannot reach at startup is fatal.
    let cal = GrpcCalibrator::connect(&config.cal_addr)
        .await
        .context("calibration service unavailable")?;

    let hardware = Hardware::new(vna, Arc::new(switch));
    let coordinator = Coordinator::new(hardware, Arc::new(cal));
    let middle = Middle::new(coordinator, config.timeout_request);

    let stream = Stream::new(&config.topic);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c received, shutting down");
        let _ = shutdown_tx.send(());
    });

    middle.run(stream.request, stream.response, shutdown_rx).await;
    Ok(())
}
