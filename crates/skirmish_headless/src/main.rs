//! Headless skirmish runner.
//!
//! Runs matches without graphics, for AI soak tests, balance batches and
//! CI determinism checks.
//!
//! # Usage
//!
//! ```bash
//! # One match with an ASCII frame every 30 seconds of match time
//! cargo run -p skirmish_headless -- run --seed 7 --ascii-every 600
//!
//! # Balance batch
//! cargo run -p skirmish_headless -- batch --games 200 --output results/
//!
//! # Determinism check
//! cargo run -p skirmish_headless -- verify --seed 12345 --runs 5
//!
//! # JSON-lines observer loop on stdin/stdout
//! cargo run -p skirmish_headless -- observe --seed 7
//! ```
//!
//! Logs go to stderr so stdout stays clean for JSON.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skirmish_core::simulation::Match;
use skirmish_headless::{
    batch::{run_batch, verify_seed, BatchConfig, DEFAULT_MAX_TICKS},
    load_tuning, render_ascii, AsciiConfig, MetricsCollector, ObserverSession,
};

#[derive(Parser)]
#[command(name = "skirmish_headless")]
#[command(about = "Headless skirmish runner for AI testing and CI")]
#[command(version)]
struct Cli {
    /// More log output on stderr (-v debug, -vv trace). RUST_LOG wins when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// RON file overriding the shipped tuning
    #[arg(long, global = true)]
    tuning: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single match
    Run {
        /// Match seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Tick limit
        #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
        ticks: u64,

        /// Print an ASCII frame every N ticks (0 = final frame only)
        #[arg(long, default_value = "0")]
        ascii_every: u64,

        /// Print the final metrics as JSON on stdout instead of a frame
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Run many seeds in parallel for balance testing
    Batch {
        /// Number of matches
        #[arg(short, long, default_value = "100")]
        games: u32,

        /// First seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Tick limit per match
        #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
        ticks: u64,

        /// Worker threads (0 = one per core)
        #[arg(short, long, default_value = "0")]
        threads: usize,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },

    /// Replay one seed several times and compare state hashes
    Verify {
        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Ticks per run
        #[arg(long, default_value = "2000")]
        ticks: u64,

        /// Number of runs
        #[arg(short, long, default_value = "3")]
        runs: u32,
    },

    /// Serve the JSON-lines observer protocol on stdin/stdout
    Observe {
        /// Match seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let tuning = load_tuning(cli.tuning.as_deref())?;

    match cli.command {
        Commands::Run {
            seed,
            ticks,
            ascii_every,
            json,
            no_color,
        } => cmd_run(seed, ticks, ascii_every, json, !no_color, tuning),
        Commands::Batch {
            games,
            seed,
            ticks,
            threads,
            output,
        } => {
            let config = BatchConfig {
                game_count: games,
                seed_start: seed,
                max_ticks: ticks,
                threads,
                output_dir: output,
                tuning,
            };
            cmd_batch(config)
        }
        Commands::Verify { seed, ticks, runs } => cmd_verify(seed, ticks, runs, &tuning),
        Commands::Observe { seed } => {
            let mut session = ObserverSession::new(seed, tuning)?;
            session.serve(io::stdin().lock(), io::stdout().lock())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn cmd_run(
    seed: u64,
    ticks: u64,
    ascii_every: u64,
    json: bool,
    use_color: bool,
    tuning: skirmish_core::tuning::Tuning,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut game = Match::new(seed, tuning)?;
    let mut collector = MetricsCollector::new(&game);
    let ascii = AsciiConfig {
        show_legend: true,
        use_color,
    };
    let mut stdout = io::stdout().lock();

    for _ in 0..ticks {
        let Some(report) = game.step() else { break };
        collector.observe(&game, &report);
        if ascii_every > 0 && !json && game.tick() % ascii_every == 0 {
            write!(stdout, "{}", render_ascii(&game.snapshot(), &ascii))?;
        }
    }

    let metrics = collector.finish(&game);
    tracing::info!(
        seed,
        ticks = metrics.duration_ticks,
        winner = ?metrics.winner,
        hash = metrics.final_state_hash,
        "Match complete"
    );

    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&metrics)?)?;
    } else {
        write!(stdout, "{}", render_ascii(&game.snapshot(), &ascii))?;
        writeln!(
            stdout,
            "Result after {} ticks: {}",
            metrics.duration_ticks,
            metrics.winner.as_deref().unwrap_or("no winner")
        )?;
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_batch(config: BatchConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let output = config.output_dir.clone();
    let results = run_batch(config);

    let path = output.join("batch_results.json");
    results.save(&path)?;

    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Games played: {}", summary.total_games);
    if !results.errors.is_empty() {
        eprintln!("Games failed: {}", results.errors.len());
    }
    for (faction, rate) in &summary.win_rates {
        eprintln!("  {faction:<12}: {:>5.1}%", rate * 100.0);
    }
    eprintln!("  Draws       : {}", summary.draws);
    eprintln!("  Timeouts    : {}", summary.timeouts);
    eprintln!(
        "Duration: avg {:.0} ticks (min {}, max {})",
        summary.avg_duration_ticks, summary.min_duration_ticks, summary.max_duration_ticks
    );
    eprintln!("Results saved to {}", path.display());

    Ok(if results.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_verify(
    seed: u64,
    ticks: u64,
    runs: u32,
    tuning: &skirmish_core::tuning::Tuning,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing::info!(seed, ticks, runs, "Verifying determinism");
    let report = verify_seed(seed, ticks, runs, tuning)?;
    println!("{}", serde_json::to_string(&report)?);

    if report.is_deterministic() {
        eprintln!("PASS: {} runs of seed {} agree over {} ticks", report.runs, seed, report.ticks);
        Ok(ExitCode::SUCCESS)
    } else {
        if let Some((run, tick)) = report.divergence {
            eprintln!("FAIL: run {run} diverged at tick {tick}");
        }
        Ok(ExitCode::FAILURE)
    }
}
