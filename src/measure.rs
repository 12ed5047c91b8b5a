//! Measurement primitive: route the switch, then sweep the VNA.

use std::sync::Arc;

use anyhow::Result;

use crate::switch::Switch;
use crate::types::{RangeQuery, ReasonableFrequencyRange};
use crate::vna::Vna;

/// The two physical devices a measurement touches, behind their trait
/// seams so tests can substitute mocks.
pub struct Hardware {
    pub vna: Arc<dyn Vna>,
    pub switch: Arc<dyn Switch>,
}

impl Hardware {
    pub fn new(vna: Arc<dyn Vna>, switch: Arc<dyn Switch>) -> Self {
        Self { vna, switch }
    }

    /// Passes the range question straight to the instrument; no switch
    /// movement involved.
    pub async fn reasonable_frequency_range(
        &self,
        req: &mut ReasonableFrequencyRange,
    ) -> Result<()> {
        self.vna.reasonable_frequency_range(req).await
    }

    /// Sets the switch to the position named by `rq.what`, then runs the
    /// sweep. The VNA's result ordering is preserved as-is; any switch or
    /// instrument failure surfaces unchanged.
    pub async fn measure_range(&self, rq: &mut RangeQuery) -> Result<()> {
        self.switch.set_port(&rq.what).await?;
        self.vna.measure_range(rq).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switch::MockSwitch;
    use crate::types::{FrequencyRange, SParamSelect};
    use crate::vna::MockVna;

    #[tokio::test]
    async fn measure_routes_switch_then_sweeps() {
        let switch = Arc::new(MockSwitch::new());
        let hardware = Hardware::new(Arc::new(MockVna::default()), switch.clone());

        let mut rq = RangeQuery {
            what: "dut2".into(),
            size: 4,
            frequency: FrequencyRange {
                start: 1_000_000,
                end: 4_000_000,
            },
            select: SParamSelect::all(),
            ..Default::default()
        };
        hardware.measure_range(&mut rq).await.unwrap();

        assert_eq!(switch.current().await, "dut2");
        assert_eq!(rq.result.len(), 4);
    }

    #[tokio::test]
    async fn reasonable_range_reports_instrument_limits() {
        let hardware = Hardware::new(
            Arc::new(MockVna::default()),
            Arc::new(MockSwitch::new()),
        );
        let mut req = ReasonableFrequencyRange::default();
        hardware.reasonable_frequency_range(&mut req).await.unwrap();
        assert!(req.frequency.start > 0);
        assert!(req.frequency.end > req.frequency.start);
    }
}
