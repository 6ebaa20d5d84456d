//! CLI command definitions using clap.

use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};

/// Durable single-shot timers
#[derive(Parser, Debug)]
#[command(name = "durable-timer")]
#[command(version)]
#[command(about = "Durable single-shot timers that survive restarts")]
#[command(
    long_about = "Records timer starts in an append-only journal and fires each timer once its execution time is reached, recovering pending timers after a restart."
)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding timer journals (overrides config and environment)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Durably start (or restart) a timer
    Start {
        /// Timer identifier
        id: String,

        #[command(flatten)]
        when: When,

        /// Stay up until this timer fires
        #[arg(short, long, default_value_t = false)]
        wait: bool,
    },

    /// Recover every stored timer and report fires until Ctrl+C
    Run,

    /// Print the recovered state of a timer without starting it
    Inspect {
        /// Timer identifier
        id: String,
    },
}

/// When a started timer should fire.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
#[group(required = true, multiple = false)]
pub struct When {
    /// Absolute execution time (RFC 3339)
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,

    /// Seconds from now; negative values lie in the past
    #[arg(long = "in", value_name = "SECS", allow_hyphen_values = true)]
    pub in_secs: Option<i64>,
}

impl When {
    /// Resolve to an absolute time relative to `now`.
    ///
    /// Returns `None` when the offset overflows the representable range.
    #[must_use]
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match (self.at, self.in_secs) {
            (Some(at), _) => Some(at),
            (None, Some(secs)) => {
                TimeDelta::try_seconds(secs).and_then(|delta| now.checked_add_signed(delta))
            }
            (None, None) => None,
        }
    }
}
