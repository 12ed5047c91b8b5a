//! Runtime configuration: the three endpoints and the two timeouts.

use std::env;
use std::time::Duration;

/// Everything the middle layer needs to reach its collaborators.
#[derive(Debug, Clone)]
pub struct Config {
    /// gRPC endpoint of the calibration service, e.g. `http://127.0.0.1:9001`.
    /// Unlikely to be remote given the difficulty of proxying HTTP/2.
    pub cal_addr: String,
    /// Serial device of the RF switch, e.g. `/dev/ttyUSB0`.
    pub serial_port: String,
    pub baud: u32,
    /// WebSocket topic at the relay, e.g. `ws://localhost:8888/data`.
    pub topic: String,
    /// Per-read timeout on the switch serial port.
    pub timeout_usb: Duration,
    /// Deadline for one whole incoming request.
    pub timeout_request: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cal_addr: "http://127.0.0.1:9001".to_string(),
            serial_port: "/dev/ttyUSB0".to_string(),
            baud: 57_600,
            topic: "ws://localhost:8888/data".to_string(),
            timeout_usb: Duration::from_secs(2),
            timeout_request: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Defaults overridden by `VNA_MIDDLE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cal_addr: var("VNA_MIDDLE_CAL_ADDR", defaults.cal_addr),
            serial_port: var("VNA_MIDDLE_SERIAL_PORT", defaults.serial_port),
            baud: parsed("VNA_MIDDLE_BAUD", defaults.baud),
            topic: var("VNA_MIDDLE_TOPIC", defaults.topic),
            timeout_usb: Duration::from_millis(parsed(
                "VNA_MIDDLE_TIMEOUT_USB_MS",
                defaults.timeout_usb.as_millis() as u64,
            )),
            timeout_request: Duration::from_millis(parsed(
                "VNA_MIDDLE_TIMEOUT_REQUEST_MS",
                defaults.timeout_request.as_millis() as u64,
            )),
        }
    }
}

fn var(name: &str, default: String) -> String {
    env::var(name).unwrap_or(default)
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
