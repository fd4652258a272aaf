//! Batch match runner for balance testing, and seed verification.
//!
//! Runs many seeds in parallel using rayon. Each match is independent and
//! fully deterministic, so results depend only on the seed range, the tick
//! limit and the tuning, never on thread count or scheduling.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use skirmish_core::error::GameError;
use skirmish_core::simulation::Match;
use skirmish_core::tuning::{Tuning, TICKS_PER_SECOND};
use tracing::{debug, info, warn};

use crate::error::HeadlessError;
use crate::metrics::{BatchSummary, GameMetrics, MetricsCollector};

/// Ten minutes of match time.
pub const DEFAULT_MAX_TICKS: u64 = 10 * 60 * TICKS_PER_SECOND as u64;

/// Configuration for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of matches to run.
    pub game_count: u32,
    /// Seed of the first match; the rest follow consecutively.
    pub seed_start: u64,
    /// Tick limit per match.
    pub max_ticks: u64,
    /// Worker threads (0 = rayon default).
    pub threads: usize,
    /// Where results are written.
    pub output_dir: PathBuf,
    /// Tuning every match uses.
    pub tuning: Tuning,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            game_count: 100,
            seed_start: 0,
            max_ticks: DEFAULT_MAX_TICKS,
            threads: 0,
            output_dir: PathBuf::from("results"),
            tuning: Tuning::default(),
        }
    }
}

impl BatchConfig {
    /// Config for `game_count` matches with everything else default.
    #[must_use]
    pub fn new(game_count: u32) -> Self {
        Self {
            game_count,
            ..Self::default()
        }
    }

    /// Set the output directory.
    #[must_use]
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set the first seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set the tick limit.
    #[must_use]
    pub const fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Set the tuning.
    #[must_use]
    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }
}

/// A match that could not be run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Seed used.
    pub seed: u64,
    /// Error message.
    pub message: String,
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used.
    pub config: BatchConfig,
    /// Per-match metrics, in seed order.
    pub games: Vec<GameMetrics>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Wall-clock runtime.
    pub duration_seconds: f64,
    /// Matches that failed to start.
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), HeadlessError> {
        let io_error = |source| HeadlessError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_error)
    }

    /// Load from a JSON file written by [`Self::save`].
    pub fn load(path: &Path) -> Result<Self, HeadlessError> {
        let json = std::fs::read_to_string(path).map_err(|source| HeadlessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Run one match to a decision or `max_ticks`, collecting its metrics.
pub fn run_single_game(seed: u64, max_ticks: u64, tuning: Tuning) -> Result<GameMetrics, GameError> {
    let mut game = Match::new(seed, tuning)?;
    let mut collector = MetricsCollector::new(&game);
    for _ in 0..max_ticks {
        let Some(report) = game.step() else { break };
        collector.observe(&game, &report);
    }
    let metrics = collector.finish(&game);
    debug!(
        seed,
        ticks = metrics.duration_ticks,
        winner = ?metrics.winner,
        "Match finished"
    );
    Ok(metrics)
}

/// Run a batch of matches.
pub fn run_batch(config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    let completed = AtomicU32::new(0);

    info!(
        games = config.game_count,
        seed_start = config.seed_start,
        max_ticks = config.max_ticks,
        "Starting batch run"
    );

    let play = || -> Vec<(u64, Result<GameMetrics, GameError>)> {
        (0..config.game_count)
            .into_par_iter()
            .map(|i| {
                let seed = config.seed_start.wrapping_add(u64::from(i));
                let result = run_single_game(seed, config.max_ticks, config.tuning.clone());
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % 10 == 0 {
                    debug!("Progress: {}/{}", done, config.game_count);
                }
                (seed, result)
            })
            .collect()
    };

    let outcomes = if config.threads > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
        {
            Ok(pool) => pool.install(play),
            Err(e) => {
                warn!(error = %e, "Could not build thread pool, using the global one");
                play()
            }
        }
    } else {
        play()
    };

    let mut games = Vec::with_capacity(outcomes.len());
    let mut errors = Vec::new();
    for (seed, result) in outcomes {
        match result {
            Ok(metrics) => games.push(metrics),
            Err(e) => {
                warn!(seed, error = %e, "Match failed to start");
                errors.push(BatchError {
                    seed,
                    message: e.to_string(),
                });
            }
        }
    }

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} games in {:.1}s ({:.1} games/sec)",
        games.len(),
        duration_seconds,
        games.len() as f64 / duration_seconds.max(f64::EPSILON)
    );

    BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        errors,
    }
}

/// Outcome of replaying one seed several times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Seed replayed.
    pub seed: u64,
    /// Runs compared.
    pub runs: u32,
    /// Ticks in the reference run.
    pub ticks: u64,
    /// State hash at the end of the reference run.
    pub final_hash: u64,
    /// First `(run, tick)` whose hash differed from the reference run.
    pub divergence: Option<(u32, u64)>,
}

impl VerifyReport {
    /// Whether every run matched the reference tick by tick.
    #[must_use]
    pub const fn is_deterministic(&self) -> bool {
        self.divergence.is_none()
    }
}

fn hash_trace(seed: u64, max_ticks: u64, tuning: Tuning) -> Result<Vec<u64>, GameError> {
    let mut game = Match::new(seed, tuning)?;
    let mut trace = vec![game.state_hash()];
    for _ in 0..max_ticks {
        if game.step().is_none() {
            break;
        }
        trace.push(game.state_hash());
    }
    Ok(trace)
}

/// Replay `seed` `runs` times and compare state hashes tick by tick.
pub fn verify_seed(
    seed: u64,
    max_ticks: u64,
    runs: u32,
    tuning: &Tuning,
) -> Result<VerifyReport, GameError> {
    let reference = hash_trace(seed, max_ticks, tuning.clone())?;
    let mut divergence = None;

    for run in 1..runs {
        let trace = hash_trace(seed, max_ticks, tuning.clone())?;
        let first_difference = reference
            .iter()
            .zip(&trace)
            .position(|(a, b)| a != b)
            .or_else(|| (reference.len() != trace.len()).then(|| reference.len().min(trace.len())));
        if let Some(tick) = first_difference {
            warn!(seed, run, tick, "Replay diverged");
            divergence = Some((run, tick as u64));
            break;
        }
    }

    Ok(VerifyReport {
        seed,
        runs: runs.max(1),
        ticks: reference.len() as u64 - 1,
        final_hash: reference.last().copied().unwrap_or_default(),
        divergence,
    })
}
