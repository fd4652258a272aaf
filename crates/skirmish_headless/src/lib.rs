//! Headless match runner for AI soak testing and CI verification.
//!
//! Drives [`skirmish_core`] matches without any presentation layer:
//!
//! - **Single matches** with optional ASCII frames and a JSON summary
//! - **Batches** of seeds in parallel, aggregated into win rates and
//!   durations
//! - **Verification** that a seed replays to identical state hashes
//! - **Observation** over a JSON-lines control protocol, the same clock
//!   controls an interactive viewer would use
//!
//! # Protocol
//!
//! - **stdin**: commands, one JSON object per line
//! - **stdout**: responses, one JSON object per line
//! - **stderr**: logs (human-readable)
//!
//! See [`protocol`] for the command and response shapes.
//!
//! # Example
//!
//! ```bash
//! echo '{"cmd":"step","count":200}' | cargo run -p skirmish_headless -- observe --seed 7
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

use std::path::Path;

use skirmish_core::tuning::Tuning;

pub mod ascii_visualizer;
pub mod batch;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod runner;

pub use ascii_visualizer::{render_ascii, AsciiConfig};
pub use batch::{run_batch, verify_seed, BatchConfig, BatchResults, VerifyReport};
pub use error::HeadlessError;
pub use metrics::{BatchSummary, GameMetrics, MetricsCollector};
pub use protocol::{Command, Response};
pub use runner::ObserverSession;

/// Load a tuning override from a RON file, or the shipped defaults when no
/// path is given.
pub fn load_tuning(path: Option<&Path>) -> Result<Tuning, HeadlessError> {
    let Some(path) = path else {
        return Ok(Tuning::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| HeadlessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let tuning = Tuning::from_ron_str(&text, &path.display().to_string())?;
    tracing::info!(path = %path.display(), "Loaded tuning override");
    Ok(tuning)
}
