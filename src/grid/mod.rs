//! Warehouse floor model
//!
//! Static tile layout with zones and shelf obstacles. Immutable after
//! construction; the pathfinder receives transient blocked cells per query.

pub mod pathfinding;

use crate::core::types::GridPos;
use serde::{Deserialize, Serialize};

/// Tile classification on the warehouse floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TileType {
    Floor,
    Obstacle,
    ZoneA,
    ZoneB,
    ZoneC,
    ZoneD,
}

/// Named warehouse zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    /// Pickup staging area
    #[serde(rename = "ZONE_A")]
    A,
    /// Storage shelving
    #[serde(rename = "ZONE_B")]
    B,
    /// Delivery bays
    #[serde(rename = "ZONE_C")]
    C,
    /// Charging area
    #[serde(rename = "ZONE_D")]
    D,
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Zone::A => write!(f, "ZONE_A"),
            Zone::B => write!(f, "ZONE_B"),
            Zone::C => write!(f, "ZONE_C"),
            Zone::D => write!(f, "ZONE_D"),
        }
    }
}

/// Robot count per zone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneOccupancy {
    #[serde(rename = "ZONE_A")]
    pub zone_a: u32,
    #[serde(rename = "ZONE_B")]
    pub zone_b: u32,
    #[serde(rename = "ZONE_C")]
    pub zone_c: u32,
    #[serde(rename = "ZONE_D")]
    pub zone_d: u32,
}

impl ZoneOccupancy {
    pub fn record(&mut self, zone: Zone) {
        match zone {
            Zone::A => self.zone_a += 1,
            Zone::B => self.zone_b += 1,
            Zone::C => self.zone_c += 1,
            Zone::D => self.zone_d += 1,
        }
    }
}

/// Charging dock inside Zone D
pub const CHARGE_DOCK: GridPos = GridPos { x: 1, y: 1 };

/// Shelf blocks scattered through the floor center
const OBSTACLES: [GridPos; 18] = [
    GridPos { x: 6, y: 3 },
    GridPos { x: 7, y: 3 },
    GridPos { x: 6, y: 5 },
    GridPos { x: 7, y: 5 },
    GridPos { x: 6, y: 7 },
    GridPos { x: 7, y: 7 },
    GridPos { x: 15, y: 3 },
    GridPos { x: 16, y: 3 },
    GridPos { x: 15, y: 5 },
    GridPos { x: 16, y: 5 },
    GridPos { x: 10, y: 2 },
    GridPos { x: 10, y: 3 },
    GridPos { x: 12, y: 2 },
    GridPos { x: 12, y: 3 },
    GridPos { x: 10, y: 11 },
    GridPos { x: 10, y: 12 },
    GridPos { x: 14, y: 8 },
    GridPos { x: 14, y: 9 },
];

/// The warehouse floor: tile grid plus precomputed walkable set
#[derive(Debug, Clone)]
pub struct WarehouseGrid {
    tiles: Vec<Vec<TileType>>,
    width: i32,
    height: i32,
    obstacles: Vec<GridPos>,
    walkable: Vec<GridPos>,
}

impl WarehouseGrid {
    /// Build the reference 20x15 layout with four zones and shelf blocks
    pub fn new(width: i32, height: i32) -> Self {
        let mut tiles = Vec::with_capacity(height as usize);
        for y in 0..height {
            let mut row = Vec::with_capacity(width as usize);
            for x in 0..width {
                let pos = GridPos::new(x, y);
                let tile = match Self::zone_for_unchecked(pos) {
                    Some(Zone::A) => TileType::ZoneA,
                    Some(Zone::B) => TileType::ZoneB,
                    Some(Zone::C) => TileType::ZoneC,
                    Some(Zone::D) => TileType::ZoneD,
                    None => TileType::Floor,
                };
                row.push(tile);
            }
            tiles.push(row);
        }

        let mut obstacles = Vec::new();
        for obs in OBSTACLES {
            if obs.x < width && obs.y < height {
                tiles[obs.y as usize][obs.x as usize] = TileType::Obstacle;
                obstacles.push(obs);
            }
        }

        let mut walkable = Vec::new();
        for y in 0..height {
            for x in 0..width {
                if tiles[y as usize][x as usize] != TileType::Obstacle {
                    walkable.push(GridPos::new(x, y));
                }
            }
        }

        Self {
            tiles,
            width,
            height,
            obstacles,
            walkable,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    pub fn tile(&self, pos: GridPos) -> Option<TileType> {
        if self.in_bounds(pos) {
            Some(self.tiles[pos.y as usize][pos.x as usize])
        } else {
            None
        }
    }

    /// Walkable = in bounds and not a shelf obstacle
    pub fn is_walkable(&self, pos: GridPos) -> bool {
        matches!(self.tile(pos), Some(t) if t != TileType::Obstacle)
    }

    /// Clamp a position onto the floor (used for externally-sourced targets)
    pub fn clamp(&self, pos: GridPos) -> GridPos {
        GridPos::new(
            pos.x.clamp(0, self.width - 1),
            pos.y.clamp(0, self.height - 1),
        )
    }

    /// All non-obstacle tiles, precomputed at construction
    pub fn walkable_positions(&self) -> &[GridPos] {
        &self.walkable
    }

    pub fn obstacles(&self) -> &[GridPos] {
        &self.obstacles
    }

    pub fn tiles(&self) -> &Vec<Vec<TileType>> {
        &self.tiles
    }

    /// Zone containing a position, if any
    pub fn zone_for(&self, pos: GridPos) -> Option<Zone> {
        if !self.in_bounds(pos) {
            return None;
        }
        Self::zone_for_unchecked(pos)
    }

    fn zone_for_unchecked(pos: GridPos) -> Option<Zone> {
        if (0..=3).contains(&pos.x) && (0..=3).contains(&pos.y) {
            Some(Zone::D)
        } else if (0..=5).contains(&pos.x) && (10..=14).contains(&pos.y) {
            Some(Zone::A)
        } else if (8..=14).contains(&pos.x) && (4..=10).contains(&pos.y) {
            Some(Zone::B)
        } else if (15..=19).contains(&pos.x) && (10..=14).contains(&pos.y) {
            Some(Zone::C)
        } else {
            None
        }
    }
}

impl Default for WarehouseGrid {
    fn default() -> Self {
        Self::new(20, 15)
    }
}
