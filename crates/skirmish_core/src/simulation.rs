//! The match clock.
//!
//! A [`Match`] owns everything: the world, both commander contexts, the
//! tuning table and the seed state. Each [`Match::step`] runs the phases in
//! a fixed order:
//!
//! 1. Economy (harvest cycles, then production and assembly)
//! 2. Movement
//! 3. Combat (damage, then removal of the dead)
//! 4. Commanders: intel every tick, decisions every `decision_interval`
//!    ticks, faction A before faction B
//! 5. Invariant check (debug builds or the `debug-validation` feature)
//!
//! Every phase sees the state the previous one committed. Pausing freezes
//! the tick counter without touching state; restarting throws the world
//! away and generates a new one.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::combat::{combat_system, CombatEvent};
use crate::commander::{self, intel, CommanderContext};
use crate::economy::{economy_system, EconomyEvent};
use crate::entities::EntityId;
use crate::error::{OrderRejection, Result};
use crate::factions::FactionId;
use crate::map_generation::generate_map;
use crate::movement::{movement_system, MovementEvent};
use crate::production::{production_system, ProductionEvent};
use crate::snapshot::Snapshot;
use crate::tuning::Tuning;
use crate::world::World;

/// Mixed into the match seed for the generator that supplies restart seeds.
const SEED_SOURCE_SALT: u64 = 0x5EED_5011_C3A5_E7D1;

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// One faction eliminated the other.
    Winner(FactionId),
    /// Both factions were eliminated on the same tick.
    Draw,
}

/// Everything that happened during one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// The tick that was simulated.
    pub tick: u64,
    /// Harvest and deposit events.
    pub economy: Vec<EconomyEvent>,
    /// Spawns, placements and research.
    pub production: Vec<ProductionEvent>,
    /// Arrivals and blocked units.
    pub movement: Vec<MovementEvent>,
    /// Hits and deaths.
    pub combat: Vec<CombatEvent>,
    /// Set on the tick the match is decided.
    pub outcome: Option<Outcome>,
}

/// A running skirmish.
#[derive(Debug, Clone)]
pub struct Match {
    tick: u64,
    paused: bool,
    seed: u64,
    seed_source: ChaCha8Rng,
    world: World,
    commanders: [CommanderContext; 2],
    tuning: Arc<Tuning>,
    outcome: Option<Outcome>,
}

impl Match {
    /// Generate a map from `seed` and set up both bases.
    ///
    /// # Errors
    ///
    /// Returns an error if `tuning` fails validation.
    pub fn new(seed: u64, tuning: Tuning) -> Result<Self> {
        tuning.validate()?;
        let tuning = Arc::new(tuning);
        let world = fresh_world(seed, &tuning);
        info!(seed, "Match started");
        Ok(Self {
            tick: 0,
            paused: false,
            seed,
            seed_source: ChaCha8Rng::seed_from_u64(seed ^ SEED_SOURCE_SALT),
            world,
            commanders: FactionId::BOTH.map(CommanderContext::new),
            tuning,
            outcome: None,
        })
    }

    /// Current tick; the number of steps taken since the last (re)start.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Seed of the current map.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Read-only world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Tuning in force.
    #[must_use]
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// A faction's commander state.
    #[must_use]
    pub const fn commander(&self, faction: FactionId) -> &CommanderContext {
        &self.commanders[faction.index()]
    }

    /// The result, once decided.
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Whether the clock is frozen.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Freeze the clock. Pausing a paused match does nothing.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.tick, "Paused");
        }
    }

    /// Unfreeze the clock. Resuming a running match does nothing.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            debug!(tick = self.tick, "Resumed");
        }
    }

    /// Throw the match away and start over.
    ///
    /// Without a seed the next one is drawn from the match's seed source.
    /// Returns the seed used. Always succeeds and always leaves the match
    /// running.
    pub fn restart(&mut self, seed: Option<u64>) -> u64 {
        let seed = seed.unwrap_or_else(|| self.seed_source.gen());
        self.world = fresh_world(seed, &self.tuning);
        self.commanders = FactionId::BOTH.map(CommanderContext::new);
        self.tick = 0;
        self.paused = false;
        self.seed = seed;
        self.outcome = None;
        info!(seed, "Match restarted");
        seed
    }

    /// Remove one of `faction`'s units.
    ///
    /// # Errors
    ///
    /// Rejected once the match is over, or if the unit is not the
    /// faction's.
    pub fn disband(
        &mut self,
        faction: FactionId,
        unit: EntityId,
    ) -> std::result::Result<(), OrderRejection> {
        if self.outcome.is_some() {
            return Err(OrderRejection::MatchOver);
        }
        self.world.disband(faction, unit)
    }

    /// Advance one tick. Returns `None`, changing nothing, while paused or
    /// after the match is decided.
    pub fn step(&mut self) -> Option<TickReport> {
        if self.paused || self.outcome.is_some() {
            return None;
        }
        let tick = self.tick;

        let economy = economy_system(&mut self.world);
        let production = production_system(&mut self.world, tick);
        let movement = movement_system(&mut self.world);
        let combat = combat_system(&mut self.world);

        let interval = self.tuning.commander.decision_interval.max(1);
        for ctx in &mut self.commanders {
            intel::observe(&mut self.world, ctx, tick);
            if tick % interval == 0 {
                let directives = ctx.decide(&self.world, tick);
                commander::apply(&mut self.world, ctx.faction(), &directives);
            }
        }

        #[cfg(any(debug_assertions, feature = "debug-validation"))]
        if let Err(violation) = self.world.check_invariants() {
            panic!("Invariant violated on tick {tick}: {violation}");
        }

        self.tick += 1;
        self.outcome = self.judge();
        if let Some(outcome) = self.outcome {
            info!(tick, ?outcome, "Match decided");
        }
        if cfg!(debug_assertions) && tracing::enabled!(tracing::Level::DEBUG) {
            debug!(tick, hash = self.state_hash(), "Tick complete");
        }

        Some(TickReport {
            tick,
            economy,
            production,
            movement,
            combat,
            outcome: self.outcome,
        })
    }

    /// Step until decided, paused or `max_ticks` steps have run. Returns the
    /// number of steps taken.
    pub fn run(&mut self, max_ticks: u64) -> u64 {
        let mut steps = 0;
        while steps < max_ticks && self.step().is_some() {
            steps += 1;
        }
        steps
    }

    fn judge(&self) -> Option<Outcome> {
        let a = self.world.faction(FactionId::A).is_eliminated();
        let b = self.world.faction(FactionId::B).is_eliminated();
        match (a, b) {
            (true, true) => Some(Outcome::Draw),
            (true, false) => Some(Outcome::Winner(FactionId::B)),
            (false, true) => Some(Outcome::Winner(FactionId::A)),
            (false, false) => None,
        }
    }

    /// Owned read-only view for renderers and drivers.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.world, self.tick, self.paused, self.outcome)
    }

    /// Hash of the full simulation state, for determinism checks.
    ///
    /// Two matches with equal hashes on every tick took the same course.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.seed.hash(&mut hasher);

        for faction in FactionId::BOTH {
            let record = self.world.faction(faction);
            record.resources.hash(&mut hasher);
            record.tech_level.hash(&mut hasher);
            record.deposited_total.hash(&mut hasher);
            record.known_nodes.hash(&mut hasher);
            self.commander(faction).hash(&mut hasher);
        }

        let store = self.world.entities();
        store.unit_count().hash(&mut hasher);
        for unit in store.units() {
            unit.id.hash(&mut hasher);
            unit.owner.hash(&mut hasher);
            unit.kind.hash(&mut hasher);
            unit.position.hash(&mut hasher);
            unit.health.hash(&mut hasher);
            unit.order.hash(&mut hasher);
            unit.nav.progress.to_bits().hash(&mut hasher);
            unit.nav.status.hash(&mut hasher);
            if let Some(cycle) = &unit.harvest {
                cycle.phase.hash(&mut hasher);
                cycle.carried.hash(&mut hasher);
            }
        }

        store.building_count().hash(&mut hasher);
        for building in store.buildings() {
            building.id.hash(&mut hasher);
            building.owner.hash(&mut hasher);
            building.kind.hash(&mut hasher);
            building.position.hash(&mut hasher);
            building.health.hash(&mut hasher);
            building.assembly_elapsed.hash(&mut hasher);
            for entry in building.queue.iter() {
                entry.item.hash(&mut hasher);
                entry.elapsed.hash(&mut hasher);
            }
        }

        for node in self.world.nodes() {
            node.remaining.hash(&mut hasher);
        }
        hasher.finish()
    }
}

fn fresh_world(seed: u64, tuning: &Arc<Tuning>) -> World {
    let config = tuning.map.clone().with_seed(seed);
    let generated = generate_map(&config);
    World::from_generated(generated, Arc::clone(tuning))
}
