//! Seam to the vector network analyzer.
//!
//! The vendor driver lives behind the [`Vna`] trait; this crate ships a
//! deterministic [`MockVna`] so the coordinator, the dispatcher and the
//! calibration flow can all run without instruments attached.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::types::{Complex, RangeQuery, ReasonableFrequencyRange, SParam};

/// A two-port VNA that can report its usable sweep range and run a sweep.
#[async_trait]
pub trait Vna: Send + Sync {
    /// Fills in the min/max frequency the instrument supports.
    async fn reasonable_frequency_range(&self, req: &mut ReasonableFrequencyRange) -> Result<()>;

    /// Runs the sweep described by `rq` and writes the S-parameter list
    /// into `rq.result`, in ascending frequency order.
    async fn measure_range(&self, rq: &mut RangeQuery) -> Result<()>;
}

/// Frequency points for a sweep of `size` points across `[start, end]` Hz.
///
/// Linear spacing by default; logarithmic (geometric) spacing when `log`
/// is set and the range permits it (a zero start has no log spacing and
/// falls back to linear).
pub fn sweep_points(start: u64, end: u64, size: usize, log: bool) -> Vec<u64> {
    match size {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let n = size as f64;
            if log && start > 0 && end > 0 {
                let ratio = (end as f64 / start as f64).powf(1.0 / (n - 1.0));
                (0..size)
                    .map(|i| (start as f64 * ratio.powi(i as i32)).round() as u64)
                    .collect()
            } else {
                let step = (end as f64 - start as f64) / (n - 1.0);
                (0..size)
                    .map(|i| (start as f64 + step * i as f64).round() as u64)
                    .collect()
            }
        }
    }
}

/// Deterministic synthetic VNA. Each switch position produces a distinct,
/// reproducible response so tests can tell which standard a result set came
/// from.
pub struct MockVna {
    pub min_hz: u64,
    pub max_hz: u64,
}

impl Default for MockVna {
    fn default() -> Self {
        // roughly the usable range of the pocket-sized VNAs this serves
        Self {
            min_hz: 500_000,
            max_hz: 4_000_000_000,
        }
    }
}

fn port_code(what: &str) -> f64 {
    match what {
        "short" => 1.0,
        "open" => 2.0,
        "load" => 3.0,
        "thru" => 4.0,
        "dut1" => 5.0,
        "dut2" => 6.0,
        "dut3" => 7.0,
        "dut4" => 8.0,
        _ => 0.0,
    }
}

impl MockVna {
    fn point(code: f64, param: f64, index: usize) -> Complex {
        Complex {
            real: code * 0.1 + param + index as f64 * 0.001,
            imag: -(code * 0.01) - index as f64 * 0.0001,
        }
    }
}

#[async_trait]
impl Vna for MockVna {
    async fn reasonable_frequency_range(&self, req: &mut ReasonableFrequencyRange) -> Result<()> {
        req.frequency.start = self.min_hz;
        req.frequency.end = self.max_hz;
        Ok(())
    }

    async fn measure_range(&self, rq: &mut RangeQuery) -> Result<()> {
        if rq.frequency.end < rq.frequency.start {
            bail!(
                "sweep range is inverted: {} > {}",
                rq.frequency.start,
                rq.frequency.end
            );
        }

        let code = port_code(&rq.what);
        let select = rq.select;
        let zero = Complex::default();
        rq.result = sweep_points(
            rq.frequency.start,
            rq.frequency.end,
            rq.size,
            rq.log_distribution,
        )
        .into_iter()
        .enumerate()
        .map(|(i, freq)| SParam {
            freq,
            s11: if select.s11 { Self::point(code, 1.0, i) } else { zero },
            s12: if select.s12 { Self::point(code, 2.0, i) } else { zero },
            s21: if select.s21 { Self::point(code, 3.0, i) } else { zero },
            s22: if select.s22 { Self::point(code, 4.0, i) } else { zero },
        })
        .collect();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FrequencyRange, SParamSelect};

    #[test]
    fn linear_sweep_hits_endpoints() {
        let points = sweep_points(1_000_000_000, 2_000_000_000, 3, false);
        assert_eq!(points, vec![1_000_000_000, 1_500_000_000, 2_000_000_000]);
    }

    #[test]
    fn log_sweep_is_geometric() {
        let points = sweep_points(1_000, 1_000_000, 4, true);
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], 1_000);
        assert_eq!(points[3], 1_000_000);
        // each step multiplies by ten
        assert_eq!(points[1], 10_000);
        assert_eq!(points[2], 100_000);
    }

    #[test]
    fn degenerate_sweeps() {
        assert!(sweep_points(1, 2, 0, false).is_empty());
        assert_eq!(sweep_points(5, 9, 1, true), vec![5]);
    }

    #[tokio::test]
    async fn unselected_parameters_stay_zero() {
        let vna = MockVna::default();
        let mut rq = RangeQuery {
            what: "load".into(),
            size: 2,
            frequency: FrequencyRange {
                start: 1_000_000,
                end: 2_000_000,
            },
            select: SParamSelect {
                s21: true,
                ..Default::default()
            },
            ..Default::default()
        };
        vna.measure_range(&mut rq).await.unwrap();

        assert_eq!(rq.result.len(), 2);
        for point in &rq.result {
            assert_eq!(point.s11, Complex::default());
            assert_ne!(point.s21, Complex::default());
        }
    }

    #[tokio::test]
    async fn positions_are_distinguishable() {
        let vna = MockVna::default();
        let mut a = RangeQuery {
            what: "short".into(),
            size: 1,
            frequency: FrequencyRange {
                start: 1_000_000,
                end: 1_000_000,
            },
            select: SParamSelect::all(),
            ..Default::default()
        };
        let mut b = a.clone();
        b.what = "dut1".into();

        vna.measure_range(&mut a).await.unwrap();
        vna.measure_range(&mut b).await.unwrap();
        assert_ne!(a.result[0].s11, b.result[0].s11);
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let vna = MockVna::default();
        let mut rq = RangeQuery {
            size: 2,
            frequency: FrequencyRange { start: 10, end: 1 },
            ..Default::default()
        };
        assert!(vna.measure_range(&mut rq).await.is_err());
    }
}
