//! Bridges between the measurement form (a list of [`SParam`]) and the
//! calibration RPC form (parallel arrays of complex pairs).
//!
//! All three conversions are index-stable: element `i` of the input maps to
//! element `i` of every output, and frequency order is never touched.

use crate::rpc::pb;
use crate::types::{Complex, SParam};

/// Extracts the frequency vector, widening integer Hz to double.
pub fn meas_to_freq(points: &[SParam]) -> Vec<f64> {
    points.iter().map(|p| p.freq as f64).collect()
}

/// Splits a measurement list into the four per-parameter arrays the RPC
/// wants.
pub fn meas_to_cal(points: &[SParam]) -> pb::SParams {
    let complex = |c: Complex| pb::Complex {
        real: c.real,
        imag: c.imag,
    };
    pb::SParams {
        s11: points.iter().map(|p| complex(p.s11)).collect(),
        s12: points.iter().map(|p| complex(p.s12)).collect(),
        s21: points.iter().map(|p| complex(p.s21)).collect(),
        s22: points.iter().map(|p| complex(p.s22)).collect(),
    }
}

/// Zips the RPC's parallel arrays back into a measurement list. The caller
/// guarantees the frequency vector and the four parameter arrays share one
/// length.
pub fn cal_to_meas(frequency: &[f64], params: &pb::SParams) -> Vec<SParam> {
    let complex = |c: &pb::Complex| Complex {
        real: c.real,
        imag: c.imag,
    };
    frequency
        .iter()
        .enumerate()
        .map(|(i, freq)| SParam {
            freq: *freq as u64,
            s11: params.s11.get(i).map(complex).unwrap_or_default(),
            s12: params.s12.get(i).map(complex).unwrap_or_default(),
            s21: params.s21.get(i).map(complex).unwrap_or_default(),
            s22: params.s22.get(i).map(complex).unwrap_or_default(),
        })
        .collect()
}
