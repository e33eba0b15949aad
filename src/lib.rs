//! forward-harness - black-box check for the HTTP forward sink
//!
//! Validates an externally-launched forwarding process from the outside:
//!
//! ```text
//! stimulus ──► process-under-test ──► mock collector ──► assertions
//! ```
//!
//! The harness stands up a catch-all collector, launches the forwarder as a
//! child process with a controlled environment, injects one synthetic event,
//! and diffs what arrives downstream (body envelope, auth and identifier
//! headers) against an expectation set. The forwarder itself is an opaque
//! box reachable only over HTTP: an ingress endpoint, a health endpoint, and
//! a forward target it reads from environment variables.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod assertions;
pub mod collector;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod stimulus;
pub mod supervisor;

pub use assertions::{evaluate, Expectation};
pub use collector::{CaptureLog, CapturedRequest, MockCollector};
pub use config::HarnessConfig;
pub use error::{HarnessError, Result};
pub use orchestrator::{Orchestrator, Phase, TestReport};
pub use stimulus::StimulusInjector;
pub use supervisor::{ensure_port_free, resolve_executable, ProcessSupervisor};
