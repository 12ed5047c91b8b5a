//! Wire-level data model shared by the user stream, the measurement layer,
//! and the calibration coordinator.
//!
//! Every request type carries its original command tag so responses can be
//! echoed back to the relay in the shape the client sent them. Field names
//! follow the user wire protocol: all lowercase, one JSON object per frame.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complex value as a (real, imag) pair of doubles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Complex {
    pub real: f64,
    pub imag: f64,
}

/// One measurement point: the four S-parameters of a two-port network at a
/// single frequency. Produced by the measurement primitive and never mutated
/// after emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SParam {
    /// Frequency in Hz.
    pub freq: u64,
    pub s11: Complex,
    pub s12: Complex,
    pub s21: Complex,
    pub s22: Complex,
}

/// Which of the four S-parameters the user wants computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SParamSelect {
    #[serde(default)]
    pub s11: bool,
    #[serde(default)]
    pub s12: bool,
    #[serde(default)]
    pub s21: bool,
    #[serde(default)]
    pub s22: bool,
}

impl SParamSelect {
    /// All four parameters selected. Calibration steps measure everything
    /// regardless of what the user asked for.
    pub fn all() -> Self {
        Self {
            s11: true,
            s12: true,
            s21: true,
            s22: true,
        }
    }
}

/// Command tag and client-chosen correlation id, embedded in every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub id: String,
}

/// Inclusive sweep range in Hz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub end: u64,
}

/// A raw sweep request, also the carrier for the five calibration commands
/// (`rq`, `rc`, `sc`, `mc`, `cc`).
///
/// When a query of this type is frozen at calibration setup, `size`,
/// `range`, `islog` and `sparam` may not change until the calibration is
/// invalidated; `avg` may.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    #[serde(flatten)]
    pub command: Command,
    #[serde(default)]
    pub what: String,
    #[serde(default, rename = "sparam")]
    pub select: SParamSelect,
    #[serde(default)]
    pub size: usize,
    #[serde(default, rename = "islog")]
    pub log_distribution: bool,
    #[serde(default, rename = "range")]
    pub frequency: FrequencyRange,
    #[serde(default)]
    pub avg: u32,
    #[serde(default)]
    pub result: Vec<SParam>,
}

/// A sweep under the currently applied calibration. The range parameters
/// come from the frozen query; only the switch target and averaging are the
/// caller's to choose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibratedRangeQuery {
    #[serde(flatten)]
    pub command: Command,
    #[serde(default)]
    pub what: String,
    #[serde(default, rename = "sparam")]
    pub select: SParamSelect,
    #[serde(default)]
    pub avg: u32,
    #[serde(default)]
    pub result: Vec<SParam>,
}

/// Asks the VNA for the min/max sweep range it supports. Stateless.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasonableFrequencyRange {
    #[serde(flatten)]
    pub command: Command,
    #[serde(default, rename = "range")]
    pub frequency: FrequencyRange,
}

/// Error reply: the failure message plus the offending request echoed back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomResult {
    pub message: String,
    pub command: Value,
}

/// A typed request as delivered by the relay stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Request {
    ReasonableFrequencyRange(ReasonableFrequencyRange),
    RangeQuery(RangeQuery),
    CalibratedRangeQuery(CalibratedRangeQuery),
}

impl Request {
    /// Decodes one frame of the user wire protocol, discriminating on the
    /// `cmd` field.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let cmd = value
            .get("cmd")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("request has no cmd field"))?;

        match cmd.as_str() {
            "rr" | "reasonablefrequencyrange" => {
                Ok(Self::ReasonableFrequencyRange(serde_json::from_value(value)?))
            }
            "rq" | "rangequery" | "rc" | "rangecal" | "sc" | "setupcal" | "mc" | "measurecal"
            | "cc" | "confirmcal" => Ok(Self::RangeQuery(serde_json::from_value(value)?)),
            "crq" | "calibratedrangequery" => {
                Ok(Self::CalibratedRangeQuery(serde_json::from_value(value)?))
            }
            other => Err(anyhow!("unknown command: {other}")),
        }
    }

    /// JSON echo of the request as it arrived, for wrapping into a
    /// [`CustomResult`].
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A reply frame: the mutated request on success, a [`CustomResult`] on
/// failure.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    ReasonableFrequencyRange(ReasonableFrequencyRange),
    RangeQuery(RangeQuery),
    CalibratedRangeQuery(CalibratedRangeQuery),
    Error(CustomResult),
}
