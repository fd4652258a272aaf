//! The single tunable parameter table.
//!
//! Every balance number the simulation uses lives here: map generation,
//! per-kind stat tables, economy, movement, combat modifiers, research and
//! commander thresholds. [`Tuning::default`] carries the shipped values and
//! [`Tuning::from_ron_str`] loads overrides; any field left out of the RON
//! text keeps its default.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::kinds::{AttackerClass, BuildingKind, Producible, TargetClass, UnitKind};
use crate::map_generation::MapConfig;

/// Simulation ticks per simulated second.
pub const TICKS_PER_SECOND: u32 = 20;

/// Complete parameter table for a match.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Battlefield generation.
    pub map: MapConfig,
    /// Per-kind unit stats.
    pub units: UnitTable,
    /// Per-kind building stats.
    pub buildings: BuildingTable,
    /// Resource and production settings.
    pub economy: EconomyTuning,
    /// Movement costs and path search limits.
    pub movement: MovementTuning,
    /// Damage modifiers and target scanning.
    pub combat: CombatTuning,
    /// Research steps.
    pub tech: TechTuning,
    /// Commander AI thresholds.
    pub commander: CommanderTuning,
}

impl Tuning {
    /// Parse RON text and validate the result.
    ///
    /// `origin` names the source in error messages.
    pub fn from_ron_str(text: &str, origin: &str) -> Result<Self> {
        let tuning: Self = ron::from_str(text).map_err(|e| GameError::TuningParse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Render as pretty RON, e.g. to seed an override file.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()).map_err(|e| {
            GameError::TuningParse {
                origin: "<serialize>".to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &'static str, reason: &str| {
            Err(GameError::InvalidTuning {
                field,
                reason: reason.to_string(),
            })
        };

        let map = &self.map;
        if map.width < 16 || map.height < 16 {
            return invalid("map.width/height", "map must be at least 16x16");
        }
        if !(map.water_below <= map.grass_below && map.grass_below <= map.forest_below) {
            return invalid("map thresholds", "water <= grass <= forest required");
        }
        if map.start_inset + map.start_clear_radius >= map.width.min(map.height) / 2 {
            return invalid("map.start_inset", "start zones would overlap the centre");
        }
        if self.tech.levels.is_empty() || self.tech.levels.len() > usize::from(u8::MAX) {
            return invalid("tech.levels", "need between 1 and 255 research steps");
        }
        if self.commander.decision_interval == 0 {
            return invalid("commander.decision_interval", "must be positive");
        }
        if self.economy.max_queue_len == 0 {
            return invalid("economy.max_queue_len", "must be positive");
        }
        if self.movement.tile_unit_capacity == 0 {
            return invalid("movement.tile_unit_capacity", "must be positive");
        }
        for kind in UnitKind::ALL {
            let stats = self.units.get(kind);
            if stats.max_health == 0 || stats.speed == 0 {
                return invalid("units", "every unit needs health and speed");
            }
            if !stats.producer.can_produce(Producible::Unit(kind)) {
                return invalid("units.producer", "producer cannot build this unit");
            }
        }
        for kind in BuildingKind::ALL {
            if self.buildings.get(kind).max_health == 0 {
                return invalid("buildings", "every building needs health");
            }
        }
        let engineer = self.units.get(UnitKind::Engineer);
        if engineer.carry_capacity == 0 || engineer.harvest_rate == 0 {
            return invalid("units.engineer", "engineers must carry and harvest");
        }
        Ok(())
    }

    /// Cost of a producible item at the given research progress.
    #[must_use]
    pub fn cost_of(&self, item: Producible, tech_level: u8) -> u32 {
        match item {
            Producible::Unit(kind) => self.units.get(kind).cost,
            Producible::Building(kind) => self.buildings.get(kind).cost,
            Producible::Research => self.tech.step(tech_level).map_or(0, |s| s.cost),
        }
    }

    /// Build time of a producible item, in ticks.
    #[must_use]
    pub fn build_ticks_of(&self, item: Producible, tech_level: u8) -> u32 {
        match item {
            Producible::Unit(kind) => self.units.get(kind).build_ticks,
            Producible::Building(kind) => self.buildings.get(kind).build_ticks,
            Producible::Research => self.tech.step(tech_level).map_or(1, |s| s.ticks),
        }
    }

    /// Minimum tech level for a producible item.
    #[must_use]
    pub fn min_tech_of(&self, item: Producible) -> u8 {
        match item {
            Producible::Unit(kind) => self.units.get(kind).min_tech,
            Producible::Building(kind) => self.buildings.get(kind).min_tech,
            Producible::Research => 0,
        }
    }
}

/// Stats shared by every unit of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Resource cost, paid when queued.
    pub cost: u32,
    /// Production time in ticks.
    pub build_ticks: u32,
    /// Starting and maximum health.
    pub max_health: u32,
    /// Movement speed in milli-tiles per tick.
    pub speed: u32,
    /// Damage per tick while firing. Zero means unarmed.
    pub damage: u32,
    /// Weapon range in tiles.
    pub range: u32,
    /// Sight radius in tiles.
    pub vision: u32,
    /// Minimum tech level to queue.
    pub min_tech: u8,
    /// Building kind that trains this unit.
    pub producer: BuildingKind,
    /// Resources carried per trip (harvesters only).
    #[serde(default)]
    pub carry_capacity: u32,
    /// Resources gathered per tick (harvesters only).
    #[serde(default)]
    pub harvest_rate: u32,
    /// Fires over mountains.
    #[serde(default)]
    pub indirect_fire: bool,
}

impl UnitStats {
    /// Whether the unit has a weapon.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.damage > 0 && self.range > 0
    }
}

/// Unit stat table, one row per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitTable {
    /// Harvester.
    pub engineer: UnitStats,
    /// Line infantry.
    pub infantry: UnitStats,
    /// Skirmisher.
    pub ranger: UnitStats,
    /// Armor.
    pub tank: UnitStats,
    /// Siege gun.
    pub artillery: UnitStats,
}

impl UnitTable {
    /// Row for `kind`.
    #[must_use]
    pub const fn get(&self, kind: UnitKind) -> &UnitStats {
        match kind {
            UnitKind::Engineer => &self.engineer,
            UnitKind::Infantry => &self.infantry,
            UnitKind::Ranger => &self.ranger,
            UnitKind::Tank => &self.tank,
            UnitKind::Artillery => &self.artillery,
        }
    }
}

impl Default for UnitTable {
    fn default() -> Self {
        Self {
            engineer: UnitStats {
                cost: 50,
                build_ticks: 100,
                max_health: 80,
                speed: 120,
                damage: 0,
                range: 0,
                vision: 7,
                min_tech: 0,
                producer: BuildingKind::Hq,
                carry_capacity: 10,
                harvest_rate: 1,
                indirect_fire: false,
            },
            infantry: UnitStats {
                cost: 60,
                build_ticks: 120,
                max_health: 120,
                speed: 100,
                damage: 2,
                range: 4,
                vision: 8,
                min_tech: 0,
                producer: BuildingKind::Barracks,
                carry_capacity: 0,
                harvest_rate: 0,
                indirect_fire: false,
            },
            ranger: UnitStats {
                cost: 80,
                build_ticks: 140,
                max_health: 90,
                speed: 130,
                damage: 2,
                range: 6,
                vision: 10,
                min_tech: 1,
                producer: BuildingKind::Barracks,
                carry_capacity: 0,
                harvest_rate: 0,
                indirect_fire: false,
            },
            tank: UnitStats {
                cost: 160,
                build_ticks: 220,
                max_health: 400,
                speed: 80,
                damage: 4,
                range: 5,
                vision: 8,
                min_tech: 1,
                producer: BuildingKind::Factory,
                carry_capacity: 0,
                harvest_rate: 0,
                indirect_fire: false,
            },
            artillery: UnitStats {
                cost: 200,
                build_ticks: 260,
                max_health: 150,
                speed: 60,
                damage: 5,
                range: 10,
                vision: 9,
                min_tech: 2,
                producer: BuildingKind::Factory,
                carry_capacity: 0,
                harvest_rate: 0,
                indirect_fire: true,
            },
        }
    }
}

/// A building's turret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurretStats {
    /// Damage per tick.
    pub damage: u32,
    /// Range in tiles.
    pub range: u32,
}

/// Stats shared by every building of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingStats {
    /// Resource cost, paid when queued.
    pub cost: u32,
    /// Fabrication time at the producer, in ticks.
    pub build_ticks: u32,
    /// On-site assembly time after placement, in ticks.
    pub assembly_ticks: u32,
    /// Starting and maximum health.
    pub max_health: u32,
    /// Sight radius in tiles.
    pub vision: u32,
    /// Minimum tech level to queue.
    pub min_tech: u8,
    /// Engineers may unload here.
    pub accepts_deposits: bool,
    /// Optional defensive weapon.
    #[serde(default)]
    pub turret: Option<TurretStats>,
}

/// Building stat table, one row per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingTable {
    /// Headquarters.
    pub hq: BuildingStats,
    /// Drop-off.
    pub refinery: BuildingStats,
    /// Infantry production.
    pub barracks: BuildingStats,
    /// Vehicle production.
    pub factory: BuildingStats,
    /// Research.
    pub research_lab: BuildingStats,
}

impl BuildingTable {
    /// Row for `kind`.
    #[must_use]
    pub const fn get(&self, kind: BuildingKind) -> &BuildingStats {
        match kind {
            BuildingKind::Hq => &self.hq,
            BuildingKind::Refinery => &self.refinery,
            BuildingKind::Barracks => &self.barracks,
            BuildingKind::Factory => &self.factory,
            BuildingKind::ResearchLab => &self.research_lab,
        }
    }
}

impl Default for BuildingTable {
    fn default() -> Self {
        Self {
            hq: BuildingStats {
                cost: 0,
                build_ticks: 0,
                assembly_ticks: 0,
                max_health: 2000,
                vision: 10,
                min_tech: 0,
                accepts_deposits: true,
                turret: Some(TurretStats {
                    damage: 2,
                    range: 6,
                }),
            },
            refinery: BuildingStats {
                cost: 150,
                build_ticks: 200,
                assembly_ticks: 100,
                max_health: 600,
                vision: 6,
                min_tech: 0,
                accepts_deposits: true,
                turret: None,
            },
            barracks: BuildingStats {
                cost: 180,
                build_ticks: 240,
                assembly_ticks: 120,
                max_health: 800,
                vision: 6,
                min_tech: 0,
                accepts_deposits: false,
                turret: None,
            },
            factory: BuildingStats {
                cost: 300,
                build_ticks: 320,
                assembly_ticks: 160,
                max_health: 1000,
                vision: 6,
                min_tech: 1,
                accepts_deposits: false,
                turret: None,
            },
            research_lab: BuildingStats {
                cost: 220,
                build_ticks: 280,
                assembly_ticks: 140,
                max_health: 600,
                vision: 6,
                min_tech: 0,
                accepts_deposits: false,
                turret: None,
            },
        }
    }
}

/// Resource and production settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyTuning {
    /// Resources each faction starts (and restarts) with.
    pub starting_resources: u32,
    /// Engineers each faction starts with.
    pub starting_engineers: u32,
    /// Longest production queue a building accepts.
    pub max_queue_len: usize,
    /// Units a faction may field, queued ones included.
    pub unit_cap: u32,
    /// Search radius for placing a finished building.
    pub placement_radius: u32,
    /// Search radius for a unit's spawn tile around its producer.
    pub spawn_radius: u32,
}

impl Default for EconomyTuning {
    fn default() -> Self {
        Self {
            starting_resources: 250,
            starting_engineers: 2,
            max_queue_len: 5,
            unit_cap: 80,
            placement_radius: 9,
            spawn_radius: 3,
        }
    }
}

/// Movement costs and path search limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementTuning {
    /// Cost of a forest step, as a percentage of open ground.
    pub forest_cost_percent: u32,
    /// Extra cost per unit already standing on a tile.
    pub crowd_penalty: u32,
    /// Node expansions before a search gives up.
    pub max_search_nodes: u32,
    /// Units a tile takes before it counts as jammed.
    pub tile_unit_capacity: u16,
    /// Consecutive failed re-plans before a unit reports blocked.
    pub max_replan_failures: u8,
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            forest_cost_percent: 170,
            crowd_penalty: 40,
            max_search_nodes: 20_000,
            tile_unit_capacity: 3,
            max_replan_failures: 4,
        }
    }
}

/// One kind-vs-kind damage modifier row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageModifier {
    /// Who fires.
    pub attacker: AttackerClass,
    /// What is hit.
    pub target: TargetClass,
    /// Damage scale in percent.
    pub percent: u32,
}

/// Damage modifiers and target scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatTuning {
    /// Radius attackers re-scan when their target is gone.
    pub rescan_radius: u32,
    /// Floor on damage after modifiers.
    pub min_damage: u32,
    /// Kind-vs-kind modifier rows; unlisted pairs deal 100%.
    pub modifiers: Vec<DamageModifier>,
}

impl Default for CombatTuning {
    fn default() -> Self {
        let row = |attacker: UnitKind, target: TargetClass, percent: u32| DamageModifier {
            attacker: AttackerClass::Unit(attacker),
            target,
            percent,
        };
        Self {
            rescan_radius: 8,
            min_damage: 1,
            modifiers: vec![
                row(UnitKind::Ranger, TargetClass::Unit(UnitKind::Infantry), 150),
                row(UnitKind::Ranger, TargetClass::Unit(UnitKind::Tank), 50),
                row(UnitKind::Artillery, TargetClass::Building, 200),
                row(UnitKind::Tank, TargetClass::Unit(UnitKind::Infantry), 75),
                row(UnitKind::Infantry, TargetClass::Unit(UnitKind::Tank), 60),
            ],
        }
    }
}

impl CombatTuning {
    /// Modifier percentage for `attacker` hitting `target`.
    #[must_use]
    pub fn modifier(&self, attacker: AttackerClass, target: TargetClass) -> u32 {
        self.modifiers
            .iter()
            .find(|m| m.attacker == attacker && m.target == target)
            .map_or(100, |m| m.percent)
    }
}

/// One research step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchStep {
    /// Resource cost.
    pub cost: u32,
    /// Research time in ticks.
    pub ticks: u32,
}

/// Research steps; step `n` raises tech level `n` to `n + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechTuning {
    /// Ordered research steps.
    pub levels: Vec<ResearchStep>,
}

impl TechTuning {
    /// Highest reachable tech level.
    #[must_use]
    pub fn max_level(&self) -> u8 {
        u8::try_from(self.levels.len()).unwrap_or(u8::MAX)
    }

    /// The step that starts from `level`.
    #[must_use]
    pub fn step(&self, level: u8) -> Option<&ResearchStep> {
        self.levels.get(usize::from(level))
    }
}

impl Default for TechTuning {
    fn default() -> Self {
        Self {
            levels: vec![
                ResearchStep { cost: 200, ticks: 300 },
                ResearchStep { cost: 350, ticks: 450 },
                ResearchStep { cost: 500, ticks: 600 },
            ],
        }
    }
}

/// A build-order item: own at least `count` buildings of `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    /// Building kind.
    pub kind: BuildingKind,
    /// Cumulative count wanted.
    pub count: u32,
}

/// Army mix used from `min_tech` upward until a later row applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmyMix {
    /// First tech level this row applies to.
    pub min_tech: u8,
    /// Relative weights per kind.
    pub weights: Vec<(UnitKind, u32)>,
}

/// Commander AI thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommanderTuning {
    /// Ticks between decision passes.
    pub decision_interval: u64,
    /// Engineers wanted per known undepleted node, in percent.
    pub engineers_per_node_percent: u32,
    /// Engineer target floor.
    pub min_engineers: u32,
    /// Engineer target ceiling.
    pub max_engineers: u32,
    /// Ordered structure goals.
    pub build_order: Vec<BuildStep>,
    /// Income (per 100 ticks) at which a ResearchLab is slotted in.
    pub lab_income_threshold: u32,
    /// Ticks a finished building may wait for a tile before it is given up.
    pub placement_stall_ticks: u64,
    /// Ticks a skipped build-order item waits before it is retried.
    pub skip_retry_ticks: u64,
    /// Army mix rows by tech level.
    pub army_mix: Vec<ArmyMix>,
    /// Entries a commander keeps queued per producer.
    pub queue_depth: usize,
    /// Smallest army that will attack.
    pub min_attack_group: u32,
    /// Own strength must exceed known enemy strength by this percentage.
    pub attack_ratio_percent: u32,
    /// Survivors below this share of launch strength trigger a retarget.
    pub retarget_loss_percent: u32,
    /// Sightings this close to the HQ pull the army home.
    pub defend_radius: u32,
    /// Sightings older than this many ticks are forgotten.
    pub sighting_ttl: u64,
}

impl Default for CommanderTuning {
    fn default() -> Self {
        let step = |kind: BuildingKind, count: u32| BuildStep { kind, count };
        Self {
            decision_interval: 10,
            engineers_per_node_percent: 150,
            min_engineers: 3,
            max_engineers: 10,
            build_order: vec![
                step(BuildingKind::Refinery, 1),
                step(BuildingKind::Barracks, 1),
                step(BuildingKind::Refinery, 2),
                step(BuildingKind::Factory, 1),
                step(BuildingKind::Barracks, 2),
                step(BuildingKind::Factory, 2),
            ],
            lab_income_threshold: 20,
            placement_stall_ticks: 200,
            skip_retry_ticks: 600,
            army_mix: vec![
                ArmyMix {
                    min_tech: 0,
                    weights: vec![(UnitKind::Infantry, 1)],
                },
                ArmyMix {
                    min_tech: 1,
                    weights: vec![
                        (UnitKind::Infantry, 4),
                        (UnitKind::Ranger, 3),
                        (UnitKind::Tank, 3),
                    ],
                },
                ArmyMix {
                    min_tech: 2,
                    weights: vec![
                        (UnitKind::Infantry, 3),
                        (UnitKind::Ranger, 2),
                        (UnitKind::Tank, 3),
                        (UnitKind::Artillery, 2),
                    ],
                },
                ArmyMix {
                    min_tech: 3,
                    weights: vec![
                        (UnitKind::Infantry, 2),
                        (UnitKind::Ranger, 2),
                        (UnitKind::Tank, 4),
                        (UnitKind::Artillery, 2),
                    ],
                },
            ],
            queue_depth: 2,
            min_attack_group: 6,
            attack_ratio_percent: 130,
            retarget_loss_percent: 50,
            defend_radius: 14,
            sighting_ttl: 1200,
        }
    }
}

impl CommanderTuning {
    /// Mix row in force at `tech_level`.
    #[must_use]
    pub fn mix_for(&self, tech_level: u8) -> Option<&ArmyMix> {
        self.army_mix
            .iter()
            .filter(|m| m.min_tech <= tech_level)
            .max_by_key(|m| m.min_tech)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        Tuning::default().validate().unwrap();
    }

    #[test]
    fn test_empty_ron_keeps_defaults() {
        let tuning = Tuning::from_ron_str("()", "<inline>").unwrap();
        assert_eq!(tuning, Tuning::default());
    }

    #[test]
    fn test_partial_ron_overrides_one_field() {
        let text = "(economy: (starting_resources: 1000))";
        let tuning = Tuning::from_ron_str(text, "<inline>").unwrap();
        assert_eq!(tuning.economy.starting_resources, 1000);
        assert_eq!(tuning.economy.unit_cap, EconomyTuning::default().unit_cap);
    }

    #[test]
    fn test_ron_round_trips() {
        let text = Tuning::default().to_ron_string().unwrap();
        let back = Tuning::from_ron_str(&text, "<inline>").unwrap();
        assert_eq!(back, Tuning::default());
    }

    #[test]
    fn test_malformed_ron_is_a_parse_error() {
        let err = Tuning::from_ron_str("(economy: ", "bad.ron").unwrap_err();
        assert!(matches!(err, GameError::TuningParse { ref origin, .. } if origin == "bad.ron"));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let text = "(commander: (decision_interval: 0))";
        let err = Tuning::from_ron_str(text, "<inline>").unwrap_err();
        assert!(matches!(
            err,
            GameError::InvalidTuning {
                field: "commander.decision_interval",
                ..
            }
        ));
    }

    #[test]
    fn test_modifiers_default_to_full_damage() {
        let combat = CombatTuning::default();
        let ranger = AttackerClass::Unit(UnitKind::Ranger);
        assert_eq!(combat.modifier(ranger, TargetClass::Unit(UnitKind::Infantry)), 150);
        assert_eq!(combat.modifier(ranger, TargetClass::Building), 100);
        assert_eq!(
            combat.modifier(AttackerClass::Unit(UnitKind::Artillery), TargetClass::Building),
            200
        );
    }

    #[test]
    fn test_research_costs_follow_level() {
        let tuning = Tuning::default();
        assert_eq!(tuning.tech.max_level(), 3);
        assert_eq!(tuning.cost_of(Producible::Research, 0), 200);
        assert_eq!(tuning.cost_of(Producible::Research, 2), 500);
        assert_eq!(tuning.build_ticks_of(Producible::Research, 1), 450);
    }

    #[test]
    fn test_mix_row_tracks_tech_level() {
        let commander = CommanderTuning::default();
        assert_eq!(commander.mix_for(0).unwrap().min_tech, 0);
        assert_eq!(commander.mix_for(2).unwrap().min_tech, 2);
        assert_eq!(commander.mix_for(9).unwrap().min_tech, 3);
    }

    #[test]
    fn test_artillery_needs_more_tech_than_tanks() {
        let units = UnitTable::default();
        assert!(units.artillery.min_tech > units.tank.min_tech);
        assert!(units.artillery.indirect_fire);
        assert!(!units.engineer.is_armed());
    }
}
