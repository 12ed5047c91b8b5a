//! Middle layer of a two-port VNA instrument server.
//!
//! A remote user sends JSON commands over a WebSocket relay; this crate
//! arbitrates access to the two physical devices and the calibration
//! service:
//! - RF switch matrix over a serial line (line-oriented JSON protocol)
//! - VNA sweeps behind a trait seam
//! - SOLT calibration state machine driving a gRPC service
//! - One-at-a-time request dispatch with per-request deadlines

pub mod config;
pub mod convert;
pub mod measure;
pub mod middle;
pub mod rpc;
pub mod stream;
pub mod switch;
pub mod types;
pub mod vna;

// Re-exports for convenience
pub use config::Config;
pub use measure::Hardware;
pub use middle::{Coordinator, Middle, Ready};
pub use stream::Stream;
pub use switch::{MockSwitch, RfSwitch, Switch};
pub use vna::{MockVna, Vna};
