#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # durable-timer
//!
//! Command-line front end for durable single-shot timers: configuration,
//! argument parsing and offline inspection. The timer machinery lives in
//! `timer-events` and `timer-actors`.

pub mod cli;
pub mod config;
pub mod inspect;

pub use config::{AppConfig, ConfigError};
pub use inspect::{InspectReport, inspect};
