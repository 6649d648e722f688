//! Operational incident generation
//!
//! Each auto-generated incident type is an independent renewal process: a
//! fresh interval is drawn uniformly from the type's range after every
//! firing. Congestion and battery alerts are only ever raised manually or by
//! the engine itself.

use crate::core::types::{EventId, GridPos};
use crate::grid::WarehouseGrid;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Incident kinds observed on the warehouse floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PackageDrop,
    Spill,
    HumanEntry,
    Congestion,
    BatteryLow,
}

impl EventType {
    /// Dispatch priority, fixed per type (higher = more urgent)
    pub fn priority(&self) -> i32 {
        match self {
            EventType::PackageDrop => 3,
            EventType::Spill => 4,
            EventType::HumanEntry => 5,
            EventType::Congestion => 2,
            EventType::BatteryLow => 4,
        }
    }

    /// Interval range in milliseconds for the renewal process, if this type
    /// is generated automatically
    pub fn auto_interval_ms(&self) -> Option<(u64, u64)> {
        match self {
            EventType::PackageDrop => Some((20_000, 40_000)),
            EventType::Spill => Some((60_000, 90_000)),
            EventType::HumanEntry => Some((30_000, 50_000)),
            EventType::Congestion | EventType::BatteryLow => None,
        }
    }

    fn describe(&self, pos: GridPos) -> String {
        match self {
            EventType::PackageDrop => format!("Package detected at {pos}"),
            EventType::Spill => format!("Spill reported at {pos}"),
            EventType::HumanEntry => format!("Human worker entered zone near {pos}"),
            EventType::Congestion => format!("Congestion detected near {pos}"),
            EventType::BatteryLow => "Low battery alert".to_string(),
        }
    }

    fn describe_manual(&self, pos: GridPos) -> String {
        match self {
            EventType::PackageDrop => format!("Manual: Package placed at {pos}"),
            EventType::Spill => format!("Manual: Spill created at {pos}"),
            EventType::HumanEntry => format!("Manual: Human worker deployed near {pos}"),
            EventType::Congestion => format!("Manual: Congestion alert at {pos}"),
            EventType::BatteryLow => "Manual: Battery alert triggered".to_string(),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::PackageDrop => write!(f, "PACKAGE_DROP"),
            EventType::Spill => write!(f, "SPILL"),
            EventType::HumanEntry => write!(f, "HUMAN_ENTRY"),
            EventType::Congestion => write!(f, "CONGESTION"),
            EventType::BatteryLow => write!(f, "BATTERY_LOW"),
        }
    }
}

/// One incident; short-lived dispatch trigger retained briefly for AI
/// context and logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub event_type: EventType,
    pub location: GridPos,
    pub priority: i32,
    pub timestamp_ms: u64,
    pub description: String,
    pub resolved: bool,
}

/// Location used when no walkable tile can be drawn (floor center)
const FALLBACK_LOCATION: GridPos = GridPos { x: 10, y: 7 };

/// Safe spot for the human-worker script when its row is fully blocked
const HUMAN_FALLBACK: GridPos = GridPos { x: 2, y: 12 };

#[derive(Debug, Clone)]
struct EventTiming {
    event_type: EventType,
    min_ms: u64,
    max_ms: u64,
    last_fired_ms: u64,
    next_interval_ms: u64,
}

/// Stochastic incident source
#[derive(Debug)]
pub struct EventGenerator {
    grid: WarehouseGrid,
    timings: Vec<EventTiming>,
    rng: StdRng,
}

impl EventGenerator {
    pub fn new(grid: &WarehouseGrid) -> Self {
        Self::with_rng(grid, StdRng::from_entropy())
    }

    /// Deterministic generator for tests
    pub fn with_seed(grid: &WarehouseGrid, seed: u64) -> Self {
        Self::with_rng(grid, StdRng::seed_from_u64(seed))
    }

    fn with_rng(grid: &WarehouseGrid, mut rng: StdRng) -> Self {
        let timings = [EventType::PackageDrop, EventType::Spill, EventType::HumanEntry]
            .into_iter()
            .filter_map(|event_type| {
                let (min_ms, max_ms) = event_type.auto_interval_ms()?;
                Some(EventTiming {
                    event_type,
                    min_ms,
                    max_ms,
                    last_fired_ms: 0,
                    next_interval_ms: rng.gen_range(min_ms..=max_ms),
                })
            })
            .collect();

        Self {
            grid: grid.clone(),
            timings,
            rng,
        }
    }

    /// Poll the renewal processes; any type whose scaled interval has
    /// elapsed fires once and redraws its next interval
    pub fn tick(&mut self, now_ms: u64, speed: f32) -> Vec<EventRecord> {
        let mut fired = Vec::new();
        for i in 0..self.timings.len() {
            let effective = (self.timings[i].next_interval_ms as f32 / speed.max(0.01)) as u64;
            if now_ms.saturating_sub(self.timings[i].last_fired_ms) >= effective {
                let event_type = self.timings[i].event_type;
                if let Some(event) = self.generate(event_type, now_ms) {
                    fired.push(event);
                }
                let (min_ms, max_ms) = (self.timings[i].min_ms, self.timings[i].max_ms);
                self.timings[i].last_fired_ms = now_ms;
                self.timings[i].next_interval_ms = self.rng.gen_range(min_ms..=max_ms);
            }
        }
        fired
    }

    /// Generate one incident at a random walkable tile
    pub fn generate(&mut self, event_type: EventType, now_ms: u64) -> Option<EventRecord> {
        let location = self.random_walkable()?;
        Some(EventRecord {
            id: EventId::new(),
            event_type,
            location,
            priority: event_type.priority(),
            timestamp_ms: now_ms,
            description: event_type.describe(location),
            resolved: false,
        })
    }

    /// Generate an operator-triggered incident at the given location, or a
    /// random walkable tile when none is supplied
    pub fn generate_manual(
        &mut self,
        event_type: EventType,
        location: Option<GridPos>,
        now_ms: u64,
    ) -> EventRecord {
        let pos = location
            .or_else(|| self.random_walkable())
            .unwrap_or(FALLBACK_LOCATION);
        EventRecord {
            id: EventId::new(),
            event_type,
            location: pos,
            priority: event_type.priority(),
            timestamp_ms: now_ms,
            description: event_type.describe_manual(pos),
            resolved: false,
        }
    }

    /// Script a human worker walking six tiles across the pickup area
    pub fn spawn_human_worker(&mut self) -> HumanWorker {
        let row = self.rng.gen_range(10..=14);
        let mut path: Vec<GridPos> = (0..=5)
            .map(|x| GridPos::new(x, row))
            .filter(|&p| self.grid.is_walkable(p))
            .collect();
        if path.is_empty() {
            path.push(HUMAN_FALLBACK);
        }

        HumanWorker {
            position: path[0],
            path,
            path_index: 0,
            active: true,
        }
    }

    fn random_walkable(&mut self) -> Option<GridPos> {
        let cells = self.grid.walkable_positions();
        if cells.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..cells.len());
        Some(cells[idx])
    }
}

/// A human worker walking a scripted path across the floor
///
/// While active, robots near the entry point are paused; they resume when
/// the walk completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanWorker {
    pub position: GridPos,
    pub path: Vec<GridPos>,
    pub path_index: usize,
    pub active: bool,
}

impl HumanWorker {
    /// Advance one step along the scripted path; returns false once the
    /// walk is complete and the worker has left the floor
    pub fn step(&mut self) -> bool {
        self.path_index += 1;
        if self.path_index >= self.path.len() {
            self.active = false;
            return false;
        }
        self.position = self.path[self.path_index];
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_are_type_determined() {
        assert_eq!(EventType::HumanEntry.priority(), 5);
        assert_eq!(EventType::Spill.priority(), 4);
        assert_eq!(EventType::Congestion.priority(), 2);
    }

    #[test]
    fn test_nothing_fires_before_minimum_interval() {
        let grid = WarehouseGrid::default();
        let mut gen = EventGenerator::with_seed(&grid, 7);
        // Shortest possible interval is PACKAGE_DROP at 20s
        assert!(gen.tick(19_999, 1.0).is_empty());
    }

    #[test]
    fn test_all_auto_types_fire_eventually() {
        let grid = WarehouseGrid::default();
        let mut gen = EventGenerator::with_seed(&grid, 7);
        let mut seen = std::collections::HashSet::new();
        let mut now = 0;
        for _ in 0..3000 {
            now += 100;
            for event in gen.tick(now, 1.0) {
                seen.insert(event.event_type);
            }
        }
        assert!(seen.contains(&EventType::PackageDrop));
        assert!(seen.contains(&EventType::Spill));
        assert!(seen.contains(&EventType::HumanEntry));
        assert!(!seen.contains(&EventType::Congestion));
        assert!(!seen.contains(&EventType::BatteryLow));
    }

    #[test]
    fn test_speed_scales_the_effective_wait() {
        let grid = WarehouseGrid::default();
        let mut slow = EventGenerator::with_seed(&grid, 11);
        let mut fast = EventGenerator::with_seed(&grid, 11);

        let count_in = |gen: &mut EventGenerator, speed: f32| {
            let mut total = 0;
            let mut now = 0;
            for _ in 0..600 {
                now += 100;
                total += gen.tick(now, speed).len();
            }
            total
        };

        let at_1x = count_in(&mut slow, 1.0);
        let at_4x = count_in(&mut fast, 4.0);
        assert!(at_4x > at_1x);
    }

    #[test]
    fn test_generated_locations_are_walkable() {
        let grid = WarehouseGrid::default();
        let mut gen = EventGenerator::with_seed(&grid, 3);
        for _ in 0..50 {
            let event = gen.generate(EventType::Spill, 0).unwrap();
            assert!(grid.is_walkable(event.location));
        }
    }

    #[test]
    fn test_manual_event_honors_supplied_location() {
        let grid = WarehouseGrid::default();
        let mut gen = EventGenerator::with_seed(&grid, 3);
        let pos = GridPos::new(4, 12);
        let event = gen.generate_manual(EventType::PackageDrop, Some(pos), 500);
        assert_eq!(event.location, pos);
        assert!(event.description.starts_with("Manual:"));
        assert_eq!(event.timestamp_ms, 500);
    }

    #[test]
    fn test_human_worker_walks_six_tiles_and_deactivates() {
        let grid = WarehouseGrid::default();
        let mut gen = EventGenerator::with_seed(&grid, 9);
        let mut worker = gen.spawn_human_worker();
        assert!(worker.active);
        assert!(worker.path.len() <= 6);
        assert_eq!(worker.position, worker.path[0]);
        // Rows 10-14 in x 0..=5 have no obstacles in the reference layout
        assert!((10..=14).contains(&worker.position.y));

        let mut steps = 0;
        while worker.step() {
            steps += 1;
            assert!(grid.is_walkable(worker.position));
        }
        assert!(!worker.active);
        assert_eq!(steps, worker.path.len() - 1);
    }
}
