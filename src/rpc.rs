//! Client for the two-port calibration gRPC service.
//!
//! The numerical calibration runs in a separate process; this module holds
//! the generated protocol types and a thin [`Calibrator`] seam so the
//! coordinator can be tested without a live service.

use anyhow::{Context, Result};
use async_trait::async_trait;

pub mod pb {
    tonic::include_proto!("calibrate.v1");
}

use pb::calibrate_client::CalibrateClient;

/// Something that can apply a two-port SOLT correction to a DUT sweep.
#[async_trait]
pub trait Calibrator: Send + Sync {
    async fn calibrate_two_port(
        &self,
        request: pb::CalibrateTwoPortRequest,
    ) -> Result<pb::CalibrateTwoPortResponse>;
}

/// The production implementation over a tonic channel. Connected once at
/// startup; a dial failure there is fatal for the process.
pub struct GrpcCalibrator {
    client: CalibrateClient<tonic::transport::Channel>,
}

impl GrpcCalibrator {
    pub async fn connect(addr: &str) -> Result<Self> {
        let client = CalibrateClient::connect(addr.to_string())
            .await
            .with_context(|| format!("did not connect to calibration gRPC service {addr}"))?;
        tracing::info!("connected to calibration service at {addr}");
        Ok(Self { client })
    }
}

#[async_trait]
impl Calibrator for GrpcCalibrator {
    async fn calibrate_two_port(
        &self,
        request: pb::CalibrateTwoPortRequest,
    ) -> Result<pb::CalibrateTwoPortResponse> {
        let mut client = self.client.clone();
        let response = client
            .calibrate_two_port(tonic::Request::new(request))
            .await
            .context("calibration RPC failed")?;
        Ok(response.into_inner())
    }
}

/// Echoes the raw DUT sweep back as the "corrected" result, on the
/// request's own frequency vector. Stands in for the numerical service when
/// running without one.
pub struct LoopbackCalibrator;

#[async_trait]
impl Calibrator for LoopbackCalibrator {
    async fn calibrate_two_port(
        &self,
        request: pb::CalibrateTwoPortRequest,
    ) -> Result<pb::CalibrateTwoPortResponse> {
        Ok(pb::CalibrateTwoPortResponse {
            frequency: request.frequency,
            result: request.dut,
        })
    }
}
