//! Autonomous per-faction commander.
//!
//! Each faction gets its own [`CommanderContext`], the only state the AI
//! keeps between ticks: the build-order pointer, skipped build items, enemy
//! sightings, the current attack plan and an income estimate. Everything
//! else is re-read from the world on every decision, so the commander copes
//! with whatever the opponent or combat did since last time.
//!
//! Intel runs every tick. Decisions run every `decision_interval` ticks as
//! a stack of layers that read `&World` and emit [`Directive`]s:
//!
//! 1. [`expansion`]: keep the engineer count in line with known nodes.
//! 2. [`build_order`]: work through the structure list, slot in a lab,
//!    queue research, give up on stalled placements.
//! 3. [`army`]: queue units toward the tech-level mix with what is left
//!    after the build-order reserve.
//! 4. [`attack`]: defend home, launch and steer the attack force.
//!
//! Directives are applied through the same order methods any other caller
//! would use, so a commander can never bypass a rule. Rejections are
//! logged and dropped; the next decision simply sees unchanged state.

pub mod army;
pub mod attack;
pub mod build_order;
pub mod expansion;
pub mod intel;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, trace};

use crate::entities::{EntityId, UnitOrder};
use crate::factions::FactionId;
use crate::kinds::{BuildingKind, Producible};
use crate::world::World;

pub use attack::{AttackGoal, AttackPlan};
pub use intel::Sighting;

/// One action a commander wants taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Directive {
    /// Queue an item at a producer.
    Enqueue {
        /// Producing building.
        producer: EntityId,
        /// What to queue.
        item: Producible,
    },
    /// Cancel a queue entry.
    Cancel {
        /// Producing building.
        producer: EntityId,
        /// Queue index.
        index: usize,
    },
    /// Give a unit an order.
    Order {
        /// The unit.
        unit: EntityId,
        /// Its new order.
        order: UnitOrder,
    },
}

/// Resources a decision pass may still commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    available: u32,
    reserved: u32,
}

impl Budget {
    /// Start from the faction's pool.
    #[must_use]
    pub const fn new(available: u32) -> Self {
        Self {
            available,
            reserved: 0,
        }
    }

    /// Spend `cost` if it fits outside the reserve.
    pub fn try_spend(&mut self, cost: u32) -> bool {
        if self.spendable() >= cost {
            self.available -= cost;
            true
        } else {
            false
        }
    }

    /// Spend `cost` ignoring the reserve.
    pub fn try_spend_reserved(&mut self, cost: u32) -> bool {
        if self.available >= cost {
            self.available -= cost;
            true
        } else {
            false
        }
    }

    /// Hold back `amount` for a later purchase.
    pub fn reserve(&mut self, amount: u32) {
        self.reserved = self.reserved.max(amount);
    }

    /// Add a refund.
    pub fn credit(&mut self, amount: u32) {
        self.available = self.available.saturating_add(amount);
    }

    /// What may be spent without touching the reserve.
    #[must_use]
    pub const fn spendable(&self) -> u32 {
        self.available.saturating_sub(self.reserved)
    }
}

/// Per-faction AI state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommanderContext {
    faction: FactionId,
    /// Index of the build-order step being worked on.
    pub(crate) build_pointer: usize,
    /// Building kinds given up on, with the tick they may be retried.
    pub(crate) skipped: BTreeMap<BuildingKind, u64>,
    /// Last known enemy whereabouts.
    pub(crate) sightings: BTreeMap<EntityId, Sighting>,
    /// Current attack, if any.
    pub(crate) attack: Option<AttackPlan>,
    /// Deposits per 100 ticks over the last decision interval.
    pub(crate) income: u32,
    last_deposited: u64,
    last_decision: u64,
}

impl CommanderContext {
    /// Fresh state for `faction`.
    #[must_use]
    pub const fn new(faction: FactionId) -> Self {
        Self {
            faction,
            build_pointer: 0,
            skipped: BTreeMap::new(),
            sightings: BTreeMap::new(),
            attack: None,
            income: 0,
            last_deposited: 0,
            last_decision: 0,
        }
    }

    /// Faction this commander plays.
    #[must_use]
    pub const fn faction(&self) -> FactionId {
        self.faction
    }

    /// Current build-order step index.
    #[must_use]
    pub const fn build_pointer(&self) -> usize {
        self.build_pointer
    }

    /// Known enemy positions.
    #[must_use]
    pub const fn sightings(&self) -> &BTreeMap<EntityId, Sighting> {
        &self.sightings
    }

    /// Current attack plan.
    #[must_use]
    pub const fn attack_plan(&self) -> Option<&AttackPlan> {
        self.attack.as_ref()
    }

    /// Income estimate, resources per 100 ticks.
    #[must_use]
    pub const fn income(&self) -> u32 {
        self.income
    }

    /// Run the decision layers. Does not touch the world.
    pub fn decide(&mut self, world: &World, tick: u64) -> Vec<Directive> {
        self.update_income(world, tick);
        let mut budget = Budget::new(world.faction(self.faction).resources);
        let mut out = Vec::new();

        expansion::plan(world, self, &mut budget, &mut out);
        build_order::plan(world, self, tick, &mut budget, &mut out);
        army::plan(world, self, &mut budget, &mut out);
        attack::plan(world, self, &mut out);

        trace!(
            faction = %self.faction,
            tick,
            directives = out.len(),
            pointer = self.build_pointer,
            "Commander decision"
        );
        out
    }

    fn update_income(&mut self, world: &World, tick: u64) {
        let total = world.faction(self.faction).deposited_total;
        let span = tick.saturating_sub(self.last_decision);
        if span > 0 {
            let gained = total.saturating_sub(self.last_deposited);
            self.income = u32::try_from(gained * 100 / span).unwrap_or(u32::MAX);
        }
        self.last_deposited = total;
        self.last_decision = tick;
    }
}

/// Apply directives in order. Returns how many were accepted.
pub fn apply(world: &mut World, faction: FactionId, directives: &[Directive]) -> usize {
    let mut accepted = 0;
    for directive in directives {
        let result = match *directive {
            Directive::Enqueue { producer, item } => world.enqueue(faction, producer, item),
            Directive::Cancel { producer, index } => world.cancel(faction, producer, index),
            Directive::Order { unit, order } => world.order_unit(faction, unit, order),
        };
        match result {
            Ok(()) => accepted += 1,
            Err(reason) => debug!(%faction, ?directive, %reason, "Directive rejected"),
        }
    }
    accepted
}
