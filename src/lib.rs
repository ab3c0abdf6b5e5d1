#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

//! iridium-sbd — a host-side driver for Iridium 9602/9603 Short Burst Data
//! (SBD) transceivers.
//!
//! This library re-exports the key building blocks:
//! - `transport` — CRLF line framing over any `AsyncRead + AsyncWrite` pair
//! - `engine` — the single-in-flight AT command engine
//! - `descriptor` — the request/response contract the engine dispatches on
//! - `catalog` — typed wrappers for every AT command in the 9602/9603 set
//! - `session` — the `SBDWB`/`waitForNetwork`/`SBDIXA` send pipeline
//! - `driver` — the public `IridiumSbd` handle tying the above together
//! - `tables` — vendor reference tables (`moStatus`, lock state, ...)
//! - `events` — the driver's log/inbound-message/ring-alert event surface
//! - `codec` — the pluggable text-compression seam
//! - `config` — configuration loading for the CLI binary
//!
//! Opening the physical serial port is not this crate's job by default —
//! [`transport::LineTransport`] works over anything implementing the
//! standard async I/O traits, including `tokio::io::duplex` in tests. A
//! reference implementation wiring it up to a real port via `tokio-serial`
//! is available behind the `serial` feature (see [`transport::serial`]).

pub mod catalog;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod session;
pub mod tables;
pub mod transport;

pub use driver::IridiumSbd;
pub use error::{BinaryWriteResult, ConfigError, IridiumError, SessionError};
pub use events::DriverEvent;
pub use session::{SbdSessionResult, SessionOptions};
pub use transport::LineTransport;
