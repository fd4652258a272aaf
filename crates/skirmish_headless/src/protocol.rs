//! JSON-lines protocol for observing a match.
//!
//! The observer drives the clock; the commanders play both sides. There are
//! no unit orders in the protocol.
//!
//! **Input (stdin):** one command per line
//! **Output (stdout):** one response per line
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","tick":0,"seed":7}
//! -> {"cmd":"step","count":100}
//! <- {"type":"stepped","tick":100,"steps":100,"paused":false,"outcome":null}
//! -> {"cmd":"pause"}
//! <- {"type":"ack","cmd":"pause"}
//! -> {"cmd":"restart","seed":11}
//! <- {"type":"restarted","seed":11}
//! -> {"cmd":"quit"}
//! <- {"type":"bye"}
//! ```

use serde::{Deserialize, Serialize};
use skirmish_core::simulation::Outcome;
use skirmish_core::snapshot::Snapshot;

/// Protocol version reported in the ready message.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Commands the observer can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Freeze the clock.
    Pause,
    /// Unfreeze the clock.
    Resume,
    /// Start over, on the given seed or the next drawn one.
    Restart {
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Advance up to `count` ticks (default 1).
    Step {
        #[serde(default = "default_step_count")]
        count: u64,
    },
    /// Full observable state.
    Snapshot,
    /// State hash, for determinism checks.
    Hash,
    /// End the session.
    Quit,
}

fn default_step_count() -> u64 {
    1
}

impl Command {
    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Command name for acknowledgments.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Restart { .. } => "restart",
            Self::Step { .. } => "step",
            Self::Snapshot => "snapshot",
            Self::Hash => "hash",
            Self::Quit => "quit",
        }
    }
}

/// Responses sent back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Session is ready for commands.
    Ready {
        version: &'static str,
        tick: u64,
        seed: u64,
    },
    /// Command applied.
    Ack { cmd: &'static str },
    /// Ticks were advanced (possibly zero while paused or decided).
    Stepped {
        tick: u64,
        steps: u64,
        paused: bool,
        outcome: Option<Outcome>,
    },
    /// Match restarted.
    Restarted { seed: u64 },
    /// Observable state.
    Snapshot { snapshot: Box<Snapshot> },
    /// State hash.
    StateHash { tick: u64, hash: u64 },
    /// The line could not be understood.
    Error { message: String },
    /// Goodbye message before shutdown.
    Bye,
}

impl Response {
    /// Ready message for a session at `tick` on `seed`.
    #[must_use]
    pub const fn ready(tick: u64, seed: u64) -> Self {
        Self::Ready {
            version: PROTOCOL_VERSION,
            tick,
            seed,
        }
    }

    /// Error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize to a JSON line (with newline).
    #[must_use]
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"Serialization failed: {e}"}}"#)
        });
        json.push('\n');
        json
    }
}
