//! End-to-end scenarios: the dispatcher driven with mock hardware and a
//! loopback calibration service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use vna_middle::measure::Hardware;
use vna_middle::middle::{Coordinator, Middle};
use vna_middle::rpc::LoopbackCalibrator;
use vna_middle::switch::MockSwitch;
use vna_middle::Switch;
use vna_middle::types::{
    CalibratedRangeQuery, Command, FrequencyRange, RangeQuery, ReasonableFrequencyRange, Request,
    Response, SParamSelect,
};
use vna_middle::vna::{MockVna, Vna};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn middle_with_switch() -> (Middle, Arc<MockSwitch>) {
    let switch = Arc::new(MockSwitch::new());
    let hardware = Hardware::new(Arc::new(MockVna::default()), switch.clone());
    let coordinator = Coordinator::new(hardware, Arc::new(LoopbackCalibrator));
    (Middle::new(coordinator, REQUEST_TIMEOUT), switch)
}

fn range_query(cmd: &str) -> RangeQuery {
    RangeQuery {
        command: Command {
            cmd: cmd.into(),
            id: "test".into(),
        },
        size: 3,
        frequency: FrequencyRange {
            start: 1_000_000_000,
            end: 2_000_000_000,
        },
        avg: 1,
        ..Default::default()
    }
}

fn expect_range_query(response: Response) -> RangeQuery {
    match response {
        Response::RangeQuery(rq) => rq,
        other => panic!("expected a range query response, got {other:?}"),
    }
}

fn expect_error(response: Response) -> String {
    match response {
        Response::Error(result) => result.message,
        other => panic!("expected an error response, got {other:?}"),
    }
}

// Setup alone is not enough to confirm a calibration.
#[tokio::test]
async fn setup_then_confirm_without_measuring() {
    let (middle, _switch) = middle_with_switch();

    let response = middle.handle(Request::RangeQuery(range_query("sc"))).await;
    let echo = expect_range_query(response);
    assert_eq!(echo.what, "thru");

    let response = middle.handle(Request::RangeQuery(range_query("cc"))).await;
    assert_eq!(
        expect_error(response),
        "calibration not complete (missing short, maybe others)"
    );
}

/// sc, then mc for each standard in SOLT order.
async fn run_step_by_step(middle: &Middle) {
    expect_range_query(middle.handle(Request::RangeQuery(range_query("sc"))).await);

    for standard in ["short", "open", "load", "thru"] {
        let mut mc = range_query("mc");
        mc.what = standard.into();
        let echo = expect_range_query(middle.handle(Request::RangeQuery(mc)).await);
        assert_eq!(echo.what, standard);
    }
}

// The full step-by-step flow produces a calibrated result.
#[tokio::test]
async fn full_step_by_step_calibration() {
    let (middle, _switch) = middle_with_switch();

    run_step_by_step(&middle).await;

    let confirmed = expect_range_query(middle.handle(Request::RangeQuery(range_query("cc"))).await);
    assert_eq!(confirmed.result.len(), 3);

    // the confirm result rides on the frequencies the short standard swept
    let vna = MockVna::default();
    let mut short = range_query("rq");
    short.what = "short".into();
    short.select = SParamSelect::all();
    vna.measure_range(&mut short).await.unwrap();
    for (got, expected) in confirmed.result.iter().zip(&short.result) {
        assert_eq!(got.freq, expected.freq);
    }
}

// A new setup with different parameters invalidates the standards.
#[tokio::test]
async fn range_change_invalidates_calibration() {
    let (middle, _switch) = middle_with_switch();

    run_step_by_step(&middle).await;
    expect_range_query(middle.handle(Request::RangeQuery(range_query("cc"))).await);

    let mut resized = range_query("sc");
    resized.size = 5;
    expect_range_query(middle.handle(Request::RangeQuery(resized)).await);

    let response = middle.handle(Request::RangeQuery(range_query("cc"))).await;
    assert_eq!(
        expect_error(response),
        "calibration not complete (missing short, maybe others)"
    );
}

// The dispatcher deadline answers "timeout" while the handler is still
// busy.
#[tokio::test]
async fn slow_handler_times_out() {
    struct SlowVna;

    #[async_trait]
    impl Vna for SlowVna {
        async fn reasonable_frequency_range(
            &self,
            _req: &mut ReasonableFrequencyRange,
        ) -> Result<()> {
            Ok(())
        }

        async fn measure_range(&self, _rq: &mut RangeQuery) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }
    }

    let hardware = Hardware::new(Arc::new(SlowVna), Arc::new(MockSwitch::new()));
    let coordinator = Coordinator::new(hardware, Arc::new(LoopbackCalibrator));
    let middle = Middle::new(coordinator, Duration::from_millis(50));

    let mut rq = range_query("rq");
    rq.what = "short".into();

    let started = Instant::now();
    let response = middle.handle(Request::RangeQuery(rq)).await;
    let elapsed = started.elapsed();

    assert_eq!(expect_error(response), "timeout");
    assert!(
        elapsed < Duration::from_millis(150),
        "timeout took {elapsed:?}"
    );
}

// Calibrated DUT sweep after a one-shot calibration.
#[tokio::test]
async fn calibrated_dut_sweep() {
    let (middle, switch) = middle_with_switch();

    expect_range_query(middle.handle(Request::RangeQuery(range_query("rc"))).await);

    let crq = CalibratedRangeQuery {
        command: Command {
            cmd: "crq".into(),
            id: "test".into(),
        },
        what: "dut1".into(),
        select: SParamSelect {
            s21: true,
            ..Default::default()
        },
        avg: 1,
        ..Default::default()
    };
    let response = middle.handle(Request::CalibratedRangeQuery(crq)).await;
    let echo = match response {
        Response::CalibratedRangeQuery(crq) => crq,
        other => panic!("expected a calibrated range query response, got {other:?}"),
    };

    assert_eq!(switch.current().await, "dut1");
    assert_eq!(echo.result.len(), 3);

    // the loopback service echoes the DUT sweep back, so the result must be
    // exactly what the synthetic instrument reports at dut1
    let vna = MockVna::default();
    let mut dut1 = range_query("rq");
    dut1.what = "dut1".into();
    dut1.select = SParamSelect::all();
    vna.measure_range(&mut dut1).await.unwrap();
    assert_eq!(echo.result, dut1.result);
}

// Responses come back in request order.
#[tokio::test]
async fn responses_are_fifo() {
    let (middle, _switch) = middle_with_switch();
    let (request_tx, request_rx) = mpsc::channel(8);
    let (response_tx, mut response_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = oneshot::channel();

    let runner = tokio::spawn(async move {
        middle.run(request_rx, response_tx, shutdown_rx).await;
    });

    request_tx
        .send(Request::RangeQuery(range_query("sc")))
        .await
        .unwrap();
    request_tx
        .send(Request::RangeQuery(range_query("cc")))
        .await
        .unwrap();
    drop(request_tx);

    let first = response_rx.recv().await.unwrap();
    assert_eq!(expect_range_query(first).command.cmd, "sc");

    let second = response_rx.recv().await.unwrap();
    assert!(expect_error(second).contains("missing short"));

    runner.await.unwrap();
}

// Unrecognized commands inside a range query are an explicit error, not a
// silent success.
#[tokio::test]
async fn unknown_command_is_rejected() {
    let (middle, _switch) = middle_with_switch();

    let response = middle
        .handle(Request::RangeQuery(range_query("recalibrate")))
        .await;
    assert_eq!(expect_error(response), "unknown command: recalibrate");
}

// The frequency range question needs no calibration state at all.
#[tokio::test]
async fn reasonable_frequency_range_reports_limits() {
    let (middle, _switch) = middle_with_switch();

    let request = Request::ReasonableFrequencyRange(ReasonableFrequencyRange {
        command: Command {
            cmd: "rr".into(),
            id: "test".into(),
        },
        ..Default::default()
    });
    match middle.handle(request).await {
        Response::ReasonableFrequencyRange(rfr) => {
            assert!(rfr.frequency.start > 0);
            assert!(rfr.frequency.end > rfr.frequency.start);
        }
        other => panic!("expected a frequency range response, got {other:?}"),
    }
}
