//! Determinism testing utilities.
//!
//! A match is a pure function of its seed and tuning. Anything that breaks
//! that shows up here as two runs with different state hashes.
//!
//! # Sources of non-determinism
//!
//! - **Floating-point math**: simulation state uses
//!   [`skirmish_core::math::Fixed`] and integers only.
//! - **Hash map iteration order**: entities live in ordered maps and are
//!   always visited by ascending id.
//! - **Unseeded randomness**: every random draw comes from a ChaCha stream
//!   derived from the match seed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use skirmish_core::simulation::Match;
use tracing::debug;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// All distinct hashes (one for a deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run ended in the same state.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation several times from the same setup and compare the
/// final hashes.
///
/// # Example
///
/// ```
/// use skirmish_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();
        for _ in 0..ticks {
            step(&mut state);
        }
        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run the same match twice and compare final hashes.
pub fn verify_match_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Match,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |game| {
            game.step();
        },
        Match::state_hash,
    )
    .is_deterministic
}

/// Step two copies of a match side by side and report the first tick after
/// which their states differ.
///
/// Returns `None` if they agree throughout; `Some(0)` means the initial
/// states already differ.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Match,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        first.step();
        second.step();
        if first.state_hash() != second.state_hash() {
            debug!(tick, "Matches diverged");
            return Some(tick);
        }
    }

    None
}

/// Per-tick hashes of one match, for comparing runs across processes.
pub fn hash_trace(game: &mut Match, num_ticks: u64) -> Vec<u64> {
    let mut trace = Vec::with_capacity(usize::try_from(num_ticks).unwrap_or(0) + 1);
    trace.push(game.state_hash());
    for _ in 0..num_ticks {
        if game.step().is_none() {
            break;
        }
        trace.push(game.state_hash());
    }
    trace
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
