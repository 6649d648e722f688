//! A* pathfinding over the warehouse grid
//!
//! 4-directional movement with uniform entry cost. Transient blocked cells
//! (other robots, congestion) are impassable except when one of them is the
//! goal itself. No state is cached between queries.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::{AHashMap, AHashSet};

use crate::core::types::GridPos;
use crate::grid::WarehouseGrid;

/// Node in the A* open set
#[derive(Debug, Clone, Copy)]
struct PathNode {
    pos: GridPos,
    f_cost: i32,
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.f_cost == other.f_cost
    }
}

impl Eq for PathNode {}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other.f_cost.cmp(&self.f_cost)
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find a shortest path from `start` to `goal`
///
/// Returns the tile sequence to traverse: the goal is included, the start is
/// not. `start == goal` yields the single-element path `[start]`.
///
/// If no route exists, returns the two-element straight line
/// `[start, goal]` as a best-effort fallback; callers that care must detect
/// the non-adjacent step rather than expect an error.
pub fn find_path(
    grid: &WarehouseGrid,
    start: GridPos,
    goal: GridPos,
    transient_blocked: &[GridPos],
) -> Vec<GridPos> {
    if start == goal {
        return vec![start];
    }

    let blocked: AHashSet<GridPos> = transient_blocked.iter().copied().collect();

    let mut open_set = BinaryHeap::new();
    let mut came_from: AHashMap<GridPos, GridPos> = AHashMap::new();
    let mut g_scores: AHashMap<GridPos, i32> = AHashMap::new();

    g_scores.insert(start, 0);
    open_set.push(PathNode {
        pos: start,
        f_cost: start.manhattan(&goal),
    });

    while let Some(current) = open_set.pop() {
        if current.pos == goal {
            return reconstruct_path(&came_from, current.pos);
        }

        let current_g = *g_scores.get(&current.pos).unwrap_or(&i32::MAX);

        for neighbor in current.pos.neighbors() {
            if !grid.is_walkable(neighbor) {
                continue;
            }
            // A robot may always approach its own destination even if the
            // cell is transiently occupied.
            if blocked.contains(&neighbor) && neighbor != goal {
                continue;
            }

            let tentative_g = current_g + 1;
            let neighbor_g = *g_scores.get(&neighbor).unwrap_or(&i32::MAX);

            if tentative_g < neighbor_g {
                came_from.insert(neighbor, current.pos);
                g_scores.insert(neighbor, tentative_g);
                open_set.push(PathNode {
                    pos: neighbor,
                    f_cost: tentative_g + neighbor.manhattan(&goal),
                });
            }
        }
    }

    // No route; degrade to a straight line rather than failing
    vec![start, goal]
}

/// Walk the came_from chain back to the start, dropping the start itself
fn reconstruct_path(came_from: &AHashMap<GridPos, GridPos>, goal: GridPos) -> Vec<GridPos> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.pop(); // the start tile is already underfoot
    path.reverse();
    path
}
