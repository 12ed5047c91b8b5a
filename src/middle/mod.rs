//! Request dispatcher: one request in, one response out, FIFO.
//!
//! Each request runs in its own worker task under a per-request deadline.
//! The worker takes the coordinator lock for the duration of the handler,
//! so calibration state transitions are totally ordered with respect to
//! measurements. When the deadline fires first, the dispatcher answers
//! `"timeout"` and abandons the worker; it runs to completion in the
//! background still holding the lock, so at most one coordinator slot is
//! tied up per timed-out request.

mod cal;

pub use cal::{Coordinator, Ready};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::types::{CustomResult, Request, Response};

pub struct Middle {
    state: Arc<Mutex<Coordinator>>,
    timeout_request: Duration,
}

impl Middle {
    pub fn new(coordinator: Coordinator, timeout_request: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(coordinator)),
            timeout_request,
        }
    }

    /// Consumes requests until the inbound channel closes or `shutdown`
    /// fires. An in-flight request always resolves (completion or deadline)
    /// before the loop exits.
    pub async fn run(
        &self,
        mut requests: mpsc::Receiver<Request>,
        responses: mpsc::Sender<Response>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!("dispatcher running, request timeout {:?}", self.timeout_request);
        loop {
            tokio::select! {
                maybe = requests.recv() => {
                    let Some(request) = maybe else { break };
                    let response = self.handle(request).await;
                    if responses.send(response).await.is_err() {
                        break;
                    }
                }
                _ = &mut shutdown => break,
            }
        }
        info!("dispatcher stopped");
    }

    /// Runs one request to a response, racing the handler against the
    /// request deadline.
    pub async fn handle(&self, request: Request) -> Response {
        let echo = request.to_value();
        debug!(
            "handling request {}",
            echo.get("cmd").and_then(|c| c.as_str()).unwrap_or("?")
        );

        let state = self.state.clone();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let mut coordinator = state.lock().await;
            let _ = tx.send(dispatch(&mut coordinator, request).await);
        });

        match timeout(self.timeout_request, rx).await {
            Ok(Ok(Ok(response))) => response,
            Ok(Ok(Err(err))) => {
                error!("request failed: {err:#}");
                Response::Error(CustomResult {
                    message: format!("{err:#}"),
                    command: echo,
                })
            }
            Ok(Err(_dropped)) => Response::Error(CustomResult {
                message: "worker exited without replying".to_string(),
                command: echo,
            }),
            Err(_deadline) => {
                warn!("request deadline expired, abandoning worker");
                Response::Error(CustomResult {
                    message: "timeout".to_string(),
                    command: echo,
                })
            }
        }
    }
}

async fn dispatch(coordinator: &mut Coordinator, request: Request) -> Result<Response> {
    match request {
        Request::ReasonableFrequencyRange(mut req) => {
            coordinator.reasonable_frequency_range(&mut req).await?;
            Ok(Response::ReasonableFrequencyRange(req))
        }
        Request::RangeQuery(mut req) => {
            let cmd = req.command.cmd.clone();
            match cmd.as_str() {
                "rq" | "rangequery" => coordinator.measure_range(&mut req).await?,
                "rc" | "rangecal" => coordinator.calibrate_range(&mut req).await?,
                "sc" | "setupcal" => coordinator.calibrate_setup(&mut req)?,
                "mc" | "measurecal" => coordinator.calibrate_measure(&req).await?,
                "cc" | "confirmcal" => coordinator.calibrate_confirm(&mut req).await?,
                other => bail!("unknown command: {other}"),
            }
            Ok(Response::RangeQuery(req))
        }
        Request::CalibratedRangeQuery(mut req) => {
            coordinator.measure_range_calibrated(&mut req).await?;
            Ok(Response::CalibratedRangeQuery(req))
        }
    }
}
