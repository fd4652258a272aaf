//! Observer session: a match driven by protocol commands.

use std::io::{self, BufRead, Write};

use skirmish_core::error::GameError;
use skirmish_core::simulation::Match;
use skirmish_core::tuning::Tuning;
use tracing::{debug, info, warn};

use crate::protocol::{Command, Response};

/// Upper bound on ticks advanced by one `step` command.
pub const MAX_STEP_COUNT: u64 = 100_000;

/// A match plus the command handling around it.
#[derive(Debug)]
pub struct ObserverSession {
    game: Match,
}

impl ObserverSession {
    /// Start a session on a fresh match.
    pub fn new(seed: u64, tuning: Tuning) -> Result<Self, GameError> {
        Ok(Self {
            game: Match::new(seed, tuning)?,
        })
    }

    /// The match being observed.
    #[must_use]
    pub const fn game(&self) -> &Match {
        &self.game
    }

    /// Apply one command.
    pub fn handle(&mut self, command: Command) -> Response {
        match command {
            Command::Pause => {
                self.game.pause();
                Response::Ack { cmd: "pause" }
            }
            Command::Resume => {
                self.game.resume();
                Response::Ack { cmd: "resume" }
            }
            Command::Restart { seed } => Response::Restarted {
                seed: self.game.restart(seed),
            },
            Command::Step { count } => {
                let steps = self.game.run(count.min(MAX_STEP_COUNT));
                Response::Stepped {
                    tick: self.game.tick(),
                    steps,
                    paused: self.game.is_paused(),
                    outcome: self.game.outcome(),
                }
            }
            Command::Snapshot => Response::Snapshot {
                snapshot: Box::new(self.game.snapshot()),
            },
            Command::Hash => Response::StateHash {
                tick: self.game.tick(),
                hash: self.game.state_hash(),
            },
            Command::Quit => Response::Bye,
        }
    }

    /// Serve commands from `input` until `quit` or end of input.
    ///
    /// Malformed lines get an error response and the session carries on.
    pub fn serve(&mut self, input: impl BufRead, mut output: impl Write) -> io::Result<()> {
        info!(seed = self.game.seed(), "Observer session started");
        output.write_all(
            Response::ready(self.game.tick(), self.game.seed())
                .to_json_line()
                .as_bytes(),
        )?;
        output.flush()?;

        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let response = match Command::from_json(line) {
                Ok(command) => {
                    debug!(cmd = command.name(), "Command received");
                    let quit = command == Command::Quit;
                    let response = self.handle(command);
                    if quit {
                        output.write_all(response.to_json_line().as_bytes())?;
                        output.flush()?;
                        return Ok(());
                    }
                    response
                }
                Err(e) => {
                    warn!(error = %e, "Unreadable command");
                    Response::error(format!("Invalid command: {e}"))
                }
            };
            output.write_all(response.to_json_line().as_bytes())?;
            output.flush()?;
        }

        debug!("Input closed");
        Ok(())
    }
}
