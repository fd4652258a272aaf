//! Match metrics for balance analysis.
//!
//! A [`MetricsCollector`] follows one match through its tick reports and
//! produces a [`GameMetrics`]; [`BatchSummary`] aggregates many of them.
//! Maps are ordered so saved results are byte-stable across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use skirmish_core::combat::CombatEvent;
use skirmish_core::economy::EconomyEvent;
use skirmish_core::entities::EntityId;
use skirmish_core::factions::FactionId;
use skirmish_core::production::ProductionEvent;
use skirmish_core::simulation::{Match, Outcome, TickReport};

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// One side was eliminated.
    Elimination,
    /// Both sides fell on the same tick.
    Draw,
    /// The tick limit ran out first.
    #[default]
    Timeout,
}

/// Complete metrics for a single match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameMetrics {
    /// Match seed.
    pub seed: u64,
    /// Ticks simulated.
    pub duration_ticks: u64,
    /// Winning faction's name (None = draw or timeout).
    pub winner: Option<String>,
    /// How the match ended.
    pub end_reason: EndReason,
    /// Per-faction metrics, keyed by faction name.
    pub factions: BTreeMap<String, FactionMetrics>,
    /// Final simulation state hash.
    pub final_state_hash: u64,
}

/// Metrics for one faction in one match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactionMetrics {
    /// Resources deposited.
    pub resources_gathered: u64,
    /// Units produced by kind.
    pub units_produced: BTreeMap<String, u32>,
    /// Units lost by kind.
    pub units_lost: BTreeMap<String, u32>,
    /// Structures that finished assembling, by kind.
    pub buildings_constructed: BTreeMap<String, u32>,
    /// Structures lost by kind.
    pub buildings_lost: BTreeMap<String, u32>,
    /// Enemy entities destroyed.
    pub kills: u32,
    /// Damage dealt.
    pub damage_dealt: u64,
    /// Damage taken.
    pub damage_taken: u64,
    /// Tick of the faction's first hit on anything.
    pub first_attack_tick: Option<u64>,
    /// Tick each tech level was reached.
    pub tech_unlock_ticks: Vec<(u8, u64)>,
    /// Tech level at the end.
    pub final_tech_level: u8,
    /// Largest army alive at once.
    pub peak_army_size: u32,
}

impl FactionMetrics {
    fn record(map: &mut BTreeMap<String, u32>, kind: &str) {
        *map.entry(kind.to_string()).or_default() += 1;
    }

    /// Kills per loss; kills alone when nothing was lost.
    #[must_use]
    pub fn kd_ratio(&self) -> f64 {
        let lost: u32 = self.units_lost.values().sum::<u32>() + self.buildings_lost.values().sum::<u32>();
        if lost == 0 {
            f64::from(self.kills)
        } else {
            f64::from(self.kills) / f64::from(lost)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Known {
    owner: FactionId,
    kind: &'static str,
    is_unit: bool,
}

/// Follows a match and accumulates its metrics.
#[derive(Debug)]
pub struct MetricsCollector {
    metrics: GameMetrics,
    known: BTreeMap<EntityId, Known>,
}

impl MetricsCollector {
    /// Start collecting for `game` in its current state.
    #[must_use]
    pub fn new(game: &Match) -> Self {
        let mut collector = Self {
            metrics: GameMetrics {
                seed: game.seed(),
                ..GameMetrics::default()
            },
            known: BTreeMap::new(),
        };
        for faction in FactionId::BOTH {
            collector
                .metrics
                .factions
                .insert(faction.name().to_string(), FactionMetrics::default());
        }
        let store = game.world().entities();
        for unit in store.units() {
            collector.remember_unit(unit.id, unit.owner, unit.kind.name());
        }
        for building in store.buildings() {
            collector.remember_building(building.id, building.owner, building.kind.name());
        }
        collector
    }

    fn remember_unit(&mut self, id: EntityId, owner: FactionId, kind: &'static str) {
        self.known.insert(
            id,
            Known {
                owner,
                kind,
                is_unit: true,
            },
        );
    }

    fn remember_building(&mut self, id: EntityId, owner: FactionId, kind: &'static str) {
        self.known.insert(
            id,
            Known {
                owner,
                kind,
                is_unit: false,
            },
        );
    }

    fn faction_mut(&mut self, faction: FactionId) -> &mut FactionMetrics {
        self.metrics
            .factions
            .entry(faction.name().to_string())
            .or_default()
    }

    /// Fold one tick's report in. `game` is the match after that tick.
    pub fn observe(&mut self, game: &Match, report: &TickReport) {
        let world = game.world();

        for event in &report.economy {
            if let EconomyEvent::Deposited {
                faction, amount, ..
            } = *event
            {
                self.faction_mut(faction).resources_gathered += u64::from(amount);
            }
        }

        for event in &report.production {
            match *event {
                ProductionEvent::UnitSpawned { unit, .. } => {
                    if let Some(unit) = world.unit(unit) {
                        let (id, owner, kind) = (unit.id, unit.owner, unit.kind.name());
                        self.remember_unit(id, owner, kind);
                        FactionMetrics::record(&mut self.faction_mut(owner).units_produced, kind);
                    }
                }
                ProductionEvent::BuildingPlaced { building, kind, .. } => {
                    if let Some(placed) = world.building(building) {
                        self.remember_building(building, placed.owner, kind.name());
                    }
                }
                ProductionEvent::BuildingCompleted { building } => {
                    if let Some(known) = self.known.get(&building).copied() {
                        FactionMetrics::record(
                            &mut self.faction_mut(known.owner).buildings_constructed,
                            known.kind,
                        );
                    }
                }
                ProductionEvent::ResearchCompleted { faction, level } => {
                    self.faction_mut(faction)
                        .tech_unlock_ticks
                        .push((level, report.tick));
                }
                ProductionEvent::DeliveryStalled { .. } => {}
            }
        }

        for event in &report.combat {
            match *event {
                CombatEvent::Hit {
                    attacker,
                    target,
                    amount,
                } => {
                    if let Some(known) = self.known.get(&attacker).copied() {
                        let stats = self.faction_mut(known.owner);
                        stats.damage_dealt += u64::from(amount);
                        stats.first_attack_tick.get_or_insert(report.tick);
                    }
                    if let Some(known) = self.known.get(&target).copied() {
                        self.faction_mut(known.owner).damage_taken += u64::from(amount);
                    }
                }
                CombatEvent::Destroyed { entity, owner } => {
                    self.faction_mut(owner.opponent()).kills += 1;
                    if let Some(known) = self.known.remove(&entity) {
                        let stats = self.faction_mut(owner);
                        let lost = if known.is_unit {
                            &mut stats.units_lost
                        } else {
                            &mut stats.buildings_lost
                        };
                        FactionMetrics::record(lost, known.kind);
                    }
                }
            }
        }

        for faction in FactionId::BOTH {
            let army = world.units_of(faction).filter(|u| u.kind.is_army()).count() as u32;
            let stats = self.faction_mut(faction);
            stats.peak_army_size = stats.peak_army_size.max(army);
        }
    }

    /// Close the books on `game`.
    #[must_use]
    pub fn finish(mut self, game: &Match) -> GameMetrics {
        for faction in FactionId::BOTH {
            let level = game.world().faction(faction).tech_level;
            self.faction_mut(faction).final_tech_level = level;
        }
        self.metrics.duration_ticks = game.tick();
        self.metrics.final_state_hash = game.state_hash();
        (self.metrics.winner, self.metrics.end_reason) = match game.outcome() {
            Some(Outcome::Winner(faction)) => {
                (Some(faction.name().to_string()), EndReason::Elimination)
            }
            Some(Outcome::Draw) => (None, EndReason::Draw),
            None => (None, EndReason::Timeout),
        };
        self.metrics
    }
}

/// Summary statistics across many matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Matches played.
    pub total_games: u32,
    /// Wins by faction name.
    pub wins_by_faction: BTreeMap<String, u32>,
    /// Win rate by faction name, 0 to 1.
    pub win_rates: BTreeMap<String, f64>,
    /// Same-tick mutual eliminations.
    pub draws: u32,
    /// Matches still running at the tick limit.
    pub timeouts: u32,
    /// Mean duration in ticks.
    pub avg_duration_ticks: f64,
    /// Shortest match.
    pub min_duration_ticks: u64,
    /// Longest match.
    pub max_duration_ticks: u64,
    /// Mean resources gathered per match, by faction name.
    pub avg_resources_gathered: BTreeMap<String, f64>,
    /// Mean kill/loss ratio, by faction name.
    pub avg_kd_ratio: BTreeMap<String, f64>,
}

impl BatchSummary {
    /// Aggregate a list of match metrics.
    #[must_use]
    pub fn from_games(games: &[GameMetrics]) -> Self {
        if games.is_empty() {
            return Self::default();
        }

        let mut summary = Self {
            total_games: games.len() as u32,
            min_duration_ticks: u64::MAX,
            ..Self::default()
        };
        let mut duration_sum = 0u64;
        let mut resources: BTreeMap<String, u64> = BTreeMap::new();
        let mut kd: BTreeMap<String, f64> = BTreeMap::new();

        for game in games {
            duration_sum += game.duration_ticks;
            summary.min_duration_ticks = summary.min_duration_ticks.min(game.duration_ticks);
            summary.max_duration_ticks = summary.max_duration_ticks.max(game.duration_ticks);

            match (&game.winner, game.end_reason) {
                (Some(winner), _) => *summary.wins_by_faction.entry(winner.clone()).or_default() += 1,
                (None, EndReason::Draw) => summary.draws += 1,
                (None, _) => summary.timeouts += 1,
            }

            for (name, faction) in &game.factions {
                *resources.entry(name.clone()).or_default() += faction.resources_gathered;
                *kd.entry(name.clone()).or_default() += faction.kd_ratio();
            }
        }

        let count = f64::from(summary.total_games);
        summary.avg_duration_ticks = duration_sum as f64 / count;
        for faction in FactionId::BOTH {
            let name = faction.name().to_string();
            let wins = summary.wins_by_faction.get(&name).copied().unwrap_or(0);
            summary.win_rates.insert(name, f64::from(wins) / count);
        }
        summary.avg_resources_gathered = resources
            .into_iter()
            .map(|(name, total)| (name, total as f64 / count))
            .collect();
        summary.avg_kd_ratio = kd
            .into_iter()
            .map(|(name, total)| (name, total / count))
            .collect();
        summary
    }
}
