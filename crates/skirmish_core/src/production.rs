//! Production queues, construction and research.
//!
//! Every building owns a queue of paid-for entries. The head entry advances
//! one tick at a time while its producer is fully assembled. On completion:
//!
//! - a unit appears on the free tile nearest the rally point;
//! - a building is placed on the nearest valid tile around the producer and
//!   starts assembling there;
//! - research raises the faction's tech level by one.
//!
//! Cost is paid when an entry is queued and refunded in full on cancel. A
//! completed entry that cannot be delivered (no free tile) stays at the
//! head at 100% and retries every tick.
//!
//! All calculations use integer math for deterministic simulation.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::EntityId;
use crate::error::OrderRejection;
use crate::factions::FactionId;
use crate::kinds::{BuildingKind, Producible};
use crate::math::TilePos;
use crate::terrain::TerrainMask;
use crate::world::World;

/// One paid-for entry in a production queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// What is being produced.
    pub item: Producible,
    /// Resources paid at enqueue time; refunded on cancel.
    pub cost: u32,
    /// Ticks needed.
    pub total_ticks: u32,
    /// Ticks done.
    pub elapsed: u32,
    /// Tick at which delivery first failed, while stalled.
    pub stalled_since: Option<u64>,
}

impl QueueEntry {
    /// A fresh entry.
    #[must_use]
    pub const fn new(item: Producible, cost: u32, total_ticks: u32) -> Self {
        Self {
            item,
            cost,
            total_ticks,
            elapsed: 0,
            stalled_since: None,
        }
    }

    /// Whether production time has run out.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.elapsed >= self.total_ticks
    }

    /// Progress as a percentage (0-100).
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.total_ticks == 0 {
            100
        } else {
            (self.elapsed.min(self.total_ticks) * 100) / self.total_ticks
        }
    }
}

/// Ordered pending production attached to a building.
///
/// The first entry is the one in progress.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductionQueue {
    entries: VecDeque<QueueEntry>,
}

impl ProductionQueue {
    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, head first.
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// The entry in progress.
    #[must_use]
    pub fn head(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    fn head_mut(&mut self) -> Option<&mut QueueEntry> {
        self.entries.front_mut()
    }

    fn push(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    fn remove(&mut self, index: usize) -> Option<QueueEntry> {
        self.entries.remove(index)
    }

    /// Entries that will produce a unit.
    #[must_use]
    pub fn pending_units(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.item, Producible::Unit(_)))
            .count()
    }

    /// Entries of exactly `item`.
    #[must_use]
    pub fn count_of(&self, item: Producible) -> usize {
        self.entries.iter().filter(|e| e.item == item).count()
    }
}

/// Events generated by the production system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionEvent {
    /// A unit left the line.
    UnitSpawned {
        /// Producing building.
        producer: EntityId,
        /// New unit.
        unit: EntityId,
        /// Where it appeared.
        position: TilePos,
    },
    /// A fabricated building was placed and began assembling.
    BuildingPlaced {
        /// Producing building.
        producer: EntityId,
        /// New building.
        building: EntityId,
        /// Its kind.
        kind: BuildingKind,
        /// Its tile.
        position: TilePos,
    },
    /// A placed building finished assembling.
    BuildingCompleted {
        /// The building.
        building: EntityId,
    },
    /// Research finished and the faction's tech level went up.
    ResearchCompleted {
        /// Researching faction.
        faction: FactionId,
        /// New tech level.
        level: u8,
    },
    /// A finished entry found no tile and is waiting at 100%.
    DeliveryStalled {
        /// Producing building.
        producer: EntityId,
        /// The stalled item.
        item: Producible,
    },
}

/// Validate and queue an order, paying for it. A rejection changes nothing.
///
/// Checks run in a fixed order so the same request always fails for the
/// same reason.
pub fn enqueue(
    world: &mut World,
    faction: FactionId,
    producer: EntityId,
    item: Producible,
) -> Result<(), OrderRejection> {
    let building = world
        .store
        .building(producer)
        .ok_or(OrderRejection::UnknownEntity(producer))?;
    if building.owner != faction {
        return Err(OrderRejection::NotOwned(producer));
    }
    if !building.is_constructed() {
        return Err(OrderRejection::NotConstructed(producer));
    }
    if !building.kind.can_produce(item) {
        return Err(OrderRejection::WrongProducer {
            producer: building.kind,
            item,
        });
    }

    let tuning = &world.tuning;
    let record = &world.factions[faction.index()];
    let required = tuning.min_tech_of(item);
    if record.tech_level < required {
        return Err(OrderRejection::TechLocked {
            required,
            current: record.tech_level,
        });
    }

    let pending_research = pending_research(world, faction);
    if item == Producible::Research {
        let max = tuning.tech.max_level();
        if usize::from(record.tech_level) + pending_research >= usize::from(max) {
            return Err(OrderRejection::ResearchMaxed { max });
        }
    }

    let limit = tuning.economy.max_queue_len;
    if building.queue.len() >= limit {
        return Err(OrderRejection::QueueFull { limit });
    }

    if matches!(item, Producible::Unit(_)) {
        let cap = tuning.economy.unit_cap;
        let queued: usize = world
            .buildings_of(faction)
            .map(|b| b.queue.pending_units())
            .sum();
        if record.units.len() + queued >= cap as usize {
            return Err(OrderRejection::UnitCapReached { cap });
        }
    }

    // Research is priced at the level it will start from.
    let level = u8::try_from(usize::from(record.tech_level) + pending_research).unwrap_or(u8::MAX);
    let cost = tuning.cost_of(item, level);
    if !record.can_afford(cost) {
        return Err(OrderRejection::InsufficientResources {
            required: cost,
            available: record.resources,
        });
    }
    let ticks = tuning.build_ticks_of(item, level).max(1);

    world.factions[faction.index()].spend(cost);
    if let Some(building) = world.store.building_mut(producer) {
        building.queue.push(QueueEntry::new(item, cost, ticks));
    }
    debug!(%faction, producer, ?item, cost, "Queued");
    Ok(())
}

/// Remove a queue entry and refund its full cost.
pub fn cancel(
    world: &mut World,
    faction: FactionId,
    producer: EntityId,
    index: usize,
) -> Result<(), OrderRejection> {
    let building = world
        .store
        .building_mut(producer)
        .ok_or(OrderRejection::UnknownEntity(producer))?;
    if building.owner != faction {
        return Err(OrderRejection::NotOwned(producer));
    }
    let entry = building
        .queue
        .remove(index)
        .ok_or(OrderRejection::NoSuchEntry(index))?;
    world.factions[faction.index()].refund(entry.cost);
    debug!(%faction, producer, item = ?entry.item, refund = entry.cost, "Cancelled");
    Ok(())
}

/// Research entries queued by `faction` and not yet finished.
#[must_use]
pub fn pending_research(world: &World, faction: FactionId) -> usize {
    world
        .buildings_of(faction)
        .map(|b| b.queue.count_of(Producible::Research))
        .sum()
}

/// Advance assembly and production queues by one tick.
pub fn production_system(world: &mut World, tick: u64) -> Vec<ProductionEvent> {
    let mut events = Vec::new();

    for id in world.store.building_ids() {
        let Some(building) = world.store.building_mut(id) else {
            continue;
        };

        if !building.is_constructed() {
            if building.tick_assembly() {
                debug!(building = id, kind = ?building.kind, "Assembly complete");
                events.push(ProductionEvent::BuildingCompleted { building: id });
            }
            continue;
        }

        let Some(head) = building.queue.head_mut() else {
            continue;
        };
        if !head.is_complete() {
            head.elapsed += 1;
        }
        if !head.is_complete() {
            continue;
        }

        let entry = *head;
        if deliver(world, id, entry.item, &mut events) {
            if let Some(building) = world.store.building_mut(id) {
                building.queue.pop();
            }
        } else if let Some(head) = world
            .store
            .building_mut(id)
            .and_then(|b| b.queue.head_mut())
        {
            if head.stalled_since.is_none() {
                head.stalled_since = Some(tick);
                debug!(producer = id, item = ?entry.item, "Delivery stalled, no free tile");
                events.push(ProductionEvent::DeliveryStalled {
                    producer: id,
                    item: entry.item,
                });
            }
        }
    }

    events
}

/// Hand over a finished item. Returns false when there is nowhere to put it.
fn deliver(
    world: &mut World,
    producer: EntityId,
    item: Producible,
    events: &mut Vec<ProductionEvent>,
) -> bool {
    let Some(building) = world.store.building(producer) else {
        return false;
    };
    let owner = building.owner;
    let origin = building.position;
    let rally = building.rally_point;

    match item {
        Producible::Unit(kind) => {
            let radius = world.tuning.economy.spawn_radius;
            let spot = world
                .free_unit_tile(rally, radius)
                .or_else(|| world.free_unit_tile(origin, radius));
            let Some(position) = spot else {
                return false;
            };
            let unit = world.spawn_unit(owner, kind, position);
            events.push(ProductionEvent::UnitSpawned {
                producer,
                unit,
                position,
            });
            true
        }
        Producible::Building(kind) => {
            let Some(position) = placement_tile(world, origin) else {
                return false;
            };
            let assembly = world.building_stats(kind).assembly_ticks;
            let building = world.spawn_building(owner, kind, position, assembly);
            events.push(ProductionEvent::BuildingPlaced {
                producer,
                building,
                kind,
                position,
            });
            true
        }
        Producible::Research => {
            let max = world.tuning.tech.max_level();
            let record = &mut world.factions[owner.index()];
            if record.tech_level < max {
                record.tech_level += 1;
            }
            let level = record.tech_level;
            debug!(faction = %owner, level, "Research complete");
            events.push(ProductionEvent::ResearchCompleted {
                faction: owner,
                level,
            });
            true
        }
    }
}

/// Nearest tile around `origin` a new building may go on.
#[must_use]
pub fn placement_tile(world: &World, origin: TilePos) -> Option<TilePos> {
    let radius = world.tuning.economy.placement_radius;
    let map = &world.map;
    world.spatial().nearest_tile(origin, radius, |tile| {
        map.is_passable(tile, TerrainMask::GROUND) && world.occupancy.is_free_to_build(map, tile)
    })
}
