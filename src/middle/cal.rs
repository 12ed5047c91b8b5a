//! Calibration coordinator: owns the frozen range, the stored SOLT
//! standards, the readiness flags and the RPC request buffer.
//!
//! The state machine: `sc` freezes the range parameters and clears the four
//! standard flags; `mc` measures one standard at a time; `cc` requires all
//! four and produces the first calibrated result; `rc` is the atomic
//! one-shot equivalent. Once calibrated, DUT sweeps reuse the frozen range
//! with only the switch target (and averaging) rebound. Readiness advances
//! only on successful measurement, so a failed sweep never corrupts an
//! existing calibration.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::{debug, info};

use crate::convert::{cal_to_meas, meas_to_cal, meas_to_freq};
use crate::measure::Hardware;
use crate::rpc::{pb, Calibrator};
use crate::types::{CalibratedRangeQuery, RangeQuery, ReasonableFrequencyRange, SParam, SParamSelect};

/// Which calibration prerequisites are currently satisfied. `setup` gates
/// the four standards; all five gate `cc`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ready {
    pub setup: bool,
    pub short: bool,
    pub open: bool,
    pub load: bool,
    pub thru: bool,
}

impl Ready {
    fn clear_standards(&mut self) {
        self.short = false;
        self.open = false;
        self.load = false;
        self.thru = false;
    }
}

pub struct Coordinator {
    hardware: Hardware,
    cal: Arc<dyn Calibrator>,
    /// The frozen range captured at setup; `None` until the first `sc`/`rc`.
    rq: Option<RangeQuery>,
    short: Vec<SParam>,
    open: Vec<SParam>,
    load: Vec<SParam>,
    thru: Vec<SParam>,
    dut: Vec<SParam>,
    dutcal: Vec<SParam>,
    ctpr: pb::CalibrateTwoPortRequest,
    ready: Ready,
}

impl Coordinator {
    pub fn new(hardware: Hardware, cal: Arc<dyn Calibrator>) -> Self {
        Self {
            hardware,
            cal,
            rq: None,
            short: Vec::new(),
            open: Vec::new(),
            load: Vec::new(),
            thru: Vec::new(),
            dut: Vec::new(),
            dutcal: Vec::new(),
            ctpr: pb::CalibrateTwoPortRequest::default(),
            ready: Ready::default(),
        }
    }

    pub fn readiness(&self) -> Ready {
        self.ready
    }

    pub async fn reasonable_frequency_range(
        &mut self,
        request: &mut ReasonableFrequencyRange,
    ) -> Result<()> {
        self.hardware.reasonable_frequency_range(request).await
    }

    /// A raw, uncalibrated sweep. Does not touch calibration state.
    pub async fn measure_range(&mut self, request: &mut RangeQuery) -> Result<()> {
        self.hardware.measure_range(request).await
    }

    /// Freezes the request's range parameters as the calibration reference.
    ///
    /// The copy disconnects the frozen range from the inbound channel so
    /// later requests cannot mutate it. `what` is forced to `thru` (the
    /// canonical return for confirm) and the selection to all four
    /// parameters, regardless of what the user asked for. No hardware I/O.
    pub fn calibrate_setup(&mut self, request: &mut RangeQuery) -> Result<()> {
        request.what = "thru".to_string();

        let mut frozen = request.clone();
        frozen.select = SParamSelect::all();
        self.rq = Some(frozen);

        self.ready.setup = true;
        self.ready.clear_standards();
        info!(
            "calibration setup: {} points {}..{} Hz, log={}",
            request.size, request.frequency.start, request.frequency.end, request.log_distribution
        );
        Ok(())
    }

    /// Measures one SOLT standard into its slot under the frozen range.
    pub async fn calibrate_measure(&mut self, request: &RangeQuery) -> Result<()> {
        if self.rq.is_none() {
            bail!("not calibrated yet");
        }
        if !self.ready.setup {
            bail!("calibration not yet setup (use sc or setupcal command)");
        }

        match request.what.as_str() {
            "short" | "open" | "load" | "thru" => {
                self.measure_standard(&request.what, request.avg).await
            }
            other => bail!("unknown calibration standard: {other}"),
        }
    }

    /// Requires all four standards, then drives the RPC. The thru stands in
    /// for the DUT so the confirm trip produces a canonical result.
    pub async fn calibrate_confirm(&mut self, request: &mut RangeQuery) -> Result<()> {
        if self.rq.is_none() {
            bail!("not calibrated yet");
        }
        if !self.ready.setup {
            bail!("calibration not setup yet");
        }
        if !self.ready.short {
            bail!("calibration not complete (missing short, maybe others)");
        }
        if !self.ready.open {
            bail!("calibration not complete (missing open, maybe others)");
        }
        if !self.ready.load {
            bail!("calibration not complete (missing load, maybe others)");
        }
        if !self.ready.thru {
            bail!("calibration not complete (missing thru)");
        }

        self.dut = self.thru.clone();

        self.ctpr = pb::CalibrateTwoPortRequest {
            frequency: meas_to_freq(&self.short),
            short: Some(meas_to_cal(&self.short)),
            open: Some(meas_to_cal(&self.open)),
            load: Some(meas_to_cal(&self.load)),
            thru: Some(meas_to_cal(&self.thru)),
            dut: Some(meas_to_cal(&self.dut)),
        };

        request.result = self.apply().await?;
        info!("calibration confirmed over {} points", request.result.len());
        Ok(())
    }

    /// Atomic one-shot: setup, the four standards in SOLT order, confirm.
    /// Any measurement failure aborts the sequence; the readiness flags are
    /// left reflecting exactly what was measured.
    pub async fn calibrate_range(&mut self, request: &mut RangeQuery) -> Result<()> {
        self.calibrate_setup(request)?;
        for standard in ["short", "open", "load", "thru"] {
            self.measure_standard(standard, request.avg).await?;
        }
        self.calibrate_confirm(request).await
    }

    /// Sweeps a DUT under the applied calibration: the frozen range with
    /// only the switch target and averaging taken from this request.
    pub async fn measure_range_calibrated(
        &mut self,
        request: &mut CalibratedRangeQuery,
    ) -> Result<()> {
        let Some(rq) = self.rq.as_mut() else {
            bail!("not calibrated yet");
        };
        rq.what = request.what.clone();
        rq.avg = request.avg;
        self.hardware.measure_range(rq).await?;
        self.dut = rq.result.clone();

        // reuse the standards already in the buffer from the last confirm
        self.ctpr.dut = Some(meas_to_cal(&self.dut));

        request.result = self.apply().await?;
        Ok(())
    }

    async fn measure_standard(&mut self, what: &str, avg: u32) -> Result<()> {
        let Some(rq) = self.rq.as_mut() else {
            bail!("not calibrated yet");
        };
        rq.what = what.to_string();
        rq.avg = avg;
        self.hardware.measure_range(rq).await?;
        let result = rq.result.clone();
        debug!("measured {what} standard: {} points", result.len());

        match what {
            "short" => {
                self.short = result;
                self.ready.short = true;
            }
            "open" => {
                self.open = result;
                self.ready.open = true;
            }
            "load" => {
                self.load = result;
                self.ready.load = true;
            }
            "thru" => {
                self.thru = result;
                self.ready.thru = true;
            }
            other => bail!("unknown calibration standard: {other}"),
        }
        Ok(())
    }

    /// Sends the current buffer to the calibration service and stores the
    /// corrected DUT sweep.
    async fn apply(&mut self) -> Result<Vec<SParam>> {
        let reply = self.cal.calibrate_two_port(self.ctpr.clone()).await?;
        let result = reply
            .result
            .ok_or_else(|| anyhow!("calibration reply missing result"))?;
        self.dutcal = cal_to_meas(&reply.frequency, &result);
        Ok(self.dutcal.clone())
    }
}
