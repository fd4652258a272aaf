//! ASCII battle visualizer.
//!
//! Renders a [`Snapshot`] one character per tile for quick terminal review.
//! Faction A is drawn in uppercase, faction B in lowercase.

use std::fmt::Write as _;

use skirmish_core::factions::FactionId;
use skirmish_core::kinds::{BuildingKind, UnitKind};
use skirmish_core::math::{Fixed, TilePos};
use skirmish_core::simulation::Outcome;
use skirmish_core::snapshot::Snapshot;

/// ASCII visualization configuration.
#[derive(Debug, Clone)]
pub struct AsciiConfig {
    /// Print the per-faction legend under the map.
    pub show_legend: bool,
    /// Use colored output (ANSI).
    pub use_color: bool,
}

impl Default for AsciiConfig {
    fn default() -> Self {
        Self {
            show_legend: true,
            use_color: true,
        }
    }
}

/// ANSI color codes.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const BLUE: &str = "\x1b[34m";
    pub const YELLOW: &str = "\x1b[33m";
}

const fn unit_glyph(kind: UnitKind) -> char {
    match kind {
        UnitKind::Engineer => 'E',
        UnitKind::Infantry => 'I',
        UnitKind::Ranger => 'R',
        UnitKind::Tank => 'T',
        UnitKind::Artillery => 'A',
    }
}

const fn building_glyph(kind: BuildingKind) -> char {
    match kind {
        BuildingKind::Hq => 'H',
        BuildingKind::Refinery => 'D',
        BuildingKind::Barracks => 'B',
        BuildingKind::Factory => 'F',
        BuildingKind::ResearchLab => 'L',
    }
}

fn for_faction(glyph: char, owner: FactionId) -> char {
    match owner {
        FactionId::A => glyph,
        FactionId::B => glyph.to_ascii_lowercase(),
    }
}

const fn faction_color(owner: FactionId) -> &'static str {
    match owner {
        FactionId::A => colors::RED,
        FactionId::B => colors::BLUE,
    }
}

#[derive(Clone, Copy)]
struct Cell {
    glyph: char,
    color: Option<&'static str>,
}

/// Render a snapshot as ASCII art.
#[must_use]
pub fn render_ascii(snapshot: &Snapshot, config: &AsciiConfig) -> String {
    let terrain = &snapshot.terrain;
    let (width, height) = (terrain.width() as usize, terrain.height() as usize);
    let mut grid: Vec<Cell> = terrain
        .tiles()
        .iter()
        .map(|kind| Cell {
            glyph: kind.glyph(),
            color: None,
        })
        .collect();
    let index = |pos: TilePos| pos.y as usize * width + pos.x as usize;

    for node in snapshot.nodes.iter().filter(|n| !n.depleted) {
        grid[index(node.tile)] = Cell {
            glyph: '$',
            color: Some(colors::YELLOW),
        };
    }
    for building in &snapshot.buildings {
        let mut glyph = building_glyph(building.kind);
        if building.progress < Fixed::from_num(1) {
            // Still assembling.
            glyph = '+';
        }
        grid[index(building.tile)] = Cell {
            glyph: for_faction(glyph, building.owner),
            color: Some(faction_color(building.owner)),
        };
    }
    for unit in &snapshot.units {
        grid[index(unit.tile)] = Cell {
            glyph: for_faction(unit_glyph(unit.kind), unit.owner),
            color: Some(faction_color(unit.owner)),
        };
    }

    let mut output = String::new();
    let (bold, reset) = if config.use_color {
        (colors::BOLD, colors::RESET)
    } else {
        ("", "")
    };
    let status = match snapshot.outcome {
        Some(Outcome::Winner(faction)) => format!("{faction} wins"),
        Some(Outcome::Draw) => "draw".to_string(),
        None if snapshot.paused => "paused".to_string(),
        None => "running".to_string(),
    };
    let _ = writeln!(
        output,
        "{bold}== Tick {} ({:.1}s) | {status} =={reset}",
        snapshot.tick,
        snapshot.elapsed_seconds.to_num::<f64>()
    );

    for row in grid.chunks(width.max(1)).take(height) {
        let mut current: Option<&'static str> = None;
        for cell in row {
            if config.use_color && cell.color != current {
                output.push_str(colors::RESET);
                match cell.color {
                    Some(color) => output.push_str(color),
                    None => output.push_str(colors::DIM),
                }
                current = cell.color;
            }
            output.push(cell.glyph);
        }
        if config.use_color {
            output.push_str(colors::RESET);
        }
        output.push('\n');
    }

    if config.show_legend {
        for faction in FactionId::BOTH {
            let summary = snapshot.faction(faction);
            let _ = writeln!(
                output,
                "{}: {} res | tech {} | {} units | {} buildings | army hp {}",
                summary.name,
                summary.resources,
                summary.tech_level,
                summary.units,
                summary.buildings,
                snapshot.army_health(faction)
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_test_utils::fixtures::small_match;

    fn plain() -> AsciiConfig {
        AsciiConfig {
            show_legend: false,
            use_color: false,
        }
    }

    #[test]
    fn test_plain_render_has_one_line_per_row() {
        let game = small_match(5);
        let snapshot = game.snapshot();
        let text = render_ascii(&snapshot, &plain());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + snapshot.terrain.height() as usize);
        for line in &lines[1..] {
            assert_eq!(line.chars().count(), snapshot.terrain.width() as usize);
        }
    }

    #[test]
    fn test_headquarters_drawn_in_faction_case() {
        let game = small_match(6);
        let snapshot = game.snapshot();
        let text = render_ascii(&snapshot, &plain());
        let rows: Vec<Vec<char>> = text.lines().skip(1).map(|l| l.chars().collect()).collect();
        for building in snapshot.buildings.iter().filter(|b| b.kind == BuildingKind::Hq) {
            let glyph = rows[building.tile.y as usize][building.tile.x as usize];
            let expected = if building.owner == FactionId::A { 'H' } else { 'h' };
            assert_eq!(glyph, expected);
        }
    }

    #[test]
    fn test_legend_lists_both_factions() {
        let game = small_match(8);
        let config = AsciiConfig {
            show_legend: true,
            use_color: false,
        };
        let text = render_ascii(&game.snapshot(), &config);
        assert!(text.contains(FactionId::A.name()));
        assert!(text.contains(FactionId::B.name()));
    }

    #[test]
    fn test_color_output_resets() {
        let game = small_match(9);
        let text = render_ascii(&game.snapshot(), &AsciiConfig::default());
        assert!(text.contains(colors::RESET));
    }
}
