//! Robot state machine
//!
//! Each robot owns its position, battery, task queue, and remaining path,
//! and advances itself once per tick given scaled elapsed time. All task
//! writers (automatic dispatch, manual commands, rule-graph actions,
//! AI-sourced assignments) go through `assign_task`, which is where the
//! queue cap and the idle-implies-no-task invariant are enforced.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::config::SimulationConfig;
use crate::core::types::{GridPos, RobotId, TaskId};
use crate::grid::pathfinding::find_path;
use crate::grid::{WarehouseGrid, CHARGE_DOCK};
use crate::tasks::{Task, TaskStatus, TaskType};

/// Priority of the synthetic recharge task installed by preemption
const RECHARGE_PRIORITY: i32 = 5;

/// Milliseconds of accumulated charge time per battery increment
const CHARGE_STEP_MS: f32 = 1000.0;

/// Lifecycle state of one robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RobotState {
    Idle,
    Moving,
    Working,
    Paused,
    Charging,
}

/// Serializable robot snapshot, also used for tick-boundary restore
///
/// Sub-tile movement/charge/dwell accumulators are intentionally not part
/// of the snapshot; a restored robot starts its current tile and dwell
/// fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotData {
    pub id: RobotId,
    pub position: GridPos,
    pub target_position: Option<GridPos>,
    pub state: RobotState,
    pub battery: f32,
    pub current_task: Option<Task>,
    pub task_queue: Vec<Task>,
    pub path: Vec<GridPos>,
    pub color: String,
}

#[derive(Debug, Clone)]
pub struct Robot {
    id: RobotId,
    position: GridPos,
    target: Option<GridPos>,
    state: RobotState,
    battery: f32,
    current_task: Option<Task>,
    task_queue: Vec<Task>,
    path: VecDeque<GridPos>,
    color: String,
    move_progress_ms: f32,
    charge_accum_ms: f32,
    working_ms: f32,
}

impl Robot {
    pub fn new(id: RobotId, position: GridPos, color: &str, battery: f32) -> Self {
        Self {
            id,
            position,
            target: None,
            state: RobotState::Idle,
            battery,
            current_task: None,
            task_queue: Vec::new(),
            path: VecDeque::new(),
            color: color.to_string(),
            move_progress_ms: 0.0,
            charge_accum_ms: 0.0,
            working_ms: 0.0,
        }
    }

    pub fn id(&self) -> RobotId {
        self.id
    }

    pub fn position(&self) -> GridPos {
        self.position
    }

    pub fn target(&self) -> Option<GridPos> {
        self.target
    }

    pub fn state(&self) -> RobotState {
        self.state
    }

    pub fn battery(&self) -> f32 {
        self.battery
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.current_task.as_ref()
    }

    pub fn queue_len(&self) -> usize {
        self.task_queue.len()
    }

    /// Below the low-battery threshold and not already charging or on the
    /// way to the dock
    pub fn needs_charging(&self, config: &SimulationConfig) -> bool {
        self.battery < config.low_battery_threshold
            && self.state != RobotState::Charging
            && !self
                .current_task
                .as_ref()
                .is_some_and(|t| t.task_type == TaskType::Recharge)
    }

    /// Assignable by the default nearest-robot policy
    ///
    /// Single-sourced availability predicate; the task manager and the
    /// assist fallback both build on it (with documented relaxations).
    pub fn is_available(&self, config: &SimulationConfig) -> bool {
        matches!(self.state, RobotState::Idle | RobotState::Charging)
            && self.battery >= config.low_battery_threshold
            && self.task_queue.len() < config.task_queue_cap
    }

    /// Accept a task: start it immediately when idle/charging with nothing
    /// underway, otherwise queue it priority-sorted.
    ///
    /// Returns false when the queue is at cap; the task is NOT accepted.
    pub fn assign_task(
        &mut self,
        grid: &WarehouseGrid,
        config: &SimulationConfig,
        mut task: Task,
    ) -> bool {
        task.assigned_robot = Some(self.id);
        task.status = TaskStatus::Pending;

        if self.current_task.is_none()
            && matches!(self.state, RobotState::Idle | RobotState::Charging)
        {
            self.start_task(grid, task);
            return true;
        }

        if self.task_queue.len() >= config.task_queue_cap {
            return false;
        }
        self.enqueue_sorted(task);
        true
    }

    /// Insert keeping the queue sorted by descending priority, stable for
    /// equal priorities
    fn enqueue_sorted(&mut self, task: Task) {
        let pos = self
            .task_queue
            .iter()
            .position(|t| task.priority > t.priority)
            .unwrap_or(self.task_queue.len());
        self.task_queue.insert(pos, task);
    }

    fn start_task(&mut self, grid: &WarehouseGrid, mut task: Task) {
        task.status = TaskStatus::InProgress;
        let destination = if task.task_type == TaskType::Recharge {
            CHARGE_DOCK
        } else {
            task.location
        };
        self.current_task = Some(task);
        self.navigate_to(grid, destination, &[]);
    }

    /// Route toward a target; enters Moving even when the route degrades to
    /// the straight-line fallback
    pub fn navigate_to(&mut self, grid: &WarehouseGrid, target: GridPos, blocked: &[GridPos]) {
        self.target = Some(target);
        self.path = find_path(grid, self.position, target, blocked).into();
        if self.path.front() == Some(&self.position) {
            self.path.pop_front();
        }
        self.state = RobotState::Moving;
        self.move_progress_ms = 0.0;
    }

    /// Human-safety pause; only interrupts motion or work, never charging
    pub fn pause(&mut self) {
        if matches!(self.state, RobotState::Moving | RobotState::Working) {
            self.state = RobotState::Paused;
        }
    }

    /// Restore the state implied by remaining path / current task
    pub fn resume(&mut self) {
        if self.state != RobotState::Paused {
            return;
        }
        self.state = if !self.path.is_empty() {
            RobotState::Moving
        } else if self.current_task.is_some() {
            RobotState::Working
        } else {
            RobotState::Idle
        };
    }

    /// Preempt whatever is active and head for the charging dock
    ///
    /// The preempted task goes back to the FRONT of the queue as Pending.
    /// Preemption requeue is not a new assignment, so it may transiently
    /// push the queue past the cap.
    pub fn force_recharge(&mut self, grid: &WarehouseGrid, now_ms: u64) {
        let recharge = Task {
            id: TaskId::new(),
            task_type: TaskType::Recharge,
            priority: RECHARGE_PRIORITY,
            location: CHARGE_DOCK,
            assigned_robot: Some(self.id),
            status: TaskStatus::InProgress,
            created_ms: now_ms,
            description: format!(
                "{} auto-returning to charge (battery: {}%)",
                self.id,
                self.battery.round()
            ),
            dwell_ms: None,
            dwell_remaining_ms: None,
        };

        if let Some(mut preempted) = self.current_task.take() {
            preempted.status = TaskStatus::Pending;
            self.task_queue.insert(0, preempted);
        }

        self.current_task = Some(recharge);
        self.navigate_to(grid, CHARGE_DOCK, &[]);
    }

    /// Advance one tick; returns the task completed this tick, if any
    pub fn tick(
        &mut self,
        grid: &WarehouseGrid,
        config: &SimulationConfig,
        tick_ms: u64,
        speed: f32,
    ) -> Option<Task> {
        let elapsed_ms = tick_ms as f32 * speed;

        match self.state {
            RobotState::Paused => None,
            RobotState::Charging => self.tick_charging(grid, config, elapsed_ms),
            RobotState::Moving => {
                self.tick_moving(config, elapsed_ms);
                None
            }
            RobotState::Working => self.tick_working(grid, elapsed_ms),
            RobotState::Idle => {
                if !self.task_queue.is_empty() {
                    let next = self.task_queue.remove(0);
                    self.start_task(grid, next);
                }
                None
            }
        }
    }

    fn tick_charging(
        &mut self,
        grid: &WarehouseGrid,
        config: &SimulationConfig,
        elapsed_ms: f32,
    ) -> Option<Task> {
        self.charge_accum_ms += elapsed_ms;
        while self.charge_accum_ms >= CHARGE_STEP_MS {
            self.charge_accum_ms -= CHARGE_STEP_MS;
            self.battery = (self.battery + config.charge_rate_per_second).min(100.0);
        }
        if self.battery >= 100.0 {
            return self.complete_current_task(grid);
        }
        None
    }

    fn tick_moving(&mut self, config: &SimulationConfig, elapsed_ms: f32) {
        self.move_progress_ms += elapsed_ms;
        // Several tiles may be consumed in one tick at high speed
        while self.move_progress_ms >= config.tile_travel_ms && !self.path.is_empty() {
            self.move_progress_ms -= config.tile_travel_ms;
            if let Some(next) = self.path.pop_front() {
                self.position = next;
                self.battery = (self.battery - config.battery_drain_per_tile).max(0.0);
            }
        }

        if self.path.is_empty() {
            self.arrive();
        }
    }

    /// Path exhausted: transition based on the task being carried
    fn arrive(&mut self) {
        match self.current_task.as_mut() {
            Some(task) if task.task_type == TaskType::Recharge => {
                self.state = RobotState::Charging;
                self.charge_accum_ms = 0.0;
            }
            Some(task) => {
                let dwell = task.task_type.dwell_ms();
                task.dwell_ms = Some(dwell);
                task.dwell_remaining_ms = Some(dwell);
                self.state = RobotState::Working;
                self.working_ms = 0.0;
            }
            None => {
                self.state = RobotState::Idle;
                self.target = None;
            }
        }
    }

    fn tick_working(&mut self, grid: &WarehouseGrid, elapsed_ms: f32) -> Option<Task> {
        let Some(task) = self.current_task.as_mut() else {
            return None;
        };
        self.working_ms += elapsed_ms;
        let dwell = task.dwell_ms.unwrap_or_else(|| task.task_type.dwell_ms());
        task.dwell_remaining_ms = Some(dwell.saturating_sub(self.working_ms as u64));

        if self.working_ms as u64 >= dwell {
            return self.complete_current_task(grid);
        }
        None
    }

    fn complete_current_task(&mut self, grid: &WarehouseGrid) -> Option<Task> {
        let mut completed = self.current_task.take()?;
        completed.status = TaskStatus::Completed;
        self.target = None;
        self.state = RobotState::Idle;
        self.working_ms = 0.0;

        // Highest-priority queued task starts within the same tick
        if !self.task_queue.is_empty() {
            let next = self.task_queue.remove(0);
            self.start_task(grid, next);
        }

        Some(completed)
    }

    pub fn to_data(&self) -> RobotData {
        RobotData {
            id: self.id,
            position: self.position,
            target_position: self.target,
            state: self.state,
            battery: self.battery,
            current_task: self.current_task.clone(),
            task_queue: self.task_queue.clone(),
            path: self.path.iter().copied().collect(),
            color: self.color.clone(),
        }
    }

    /// Rebuild a robot from snapshot data at a tick boundary
    pub fn from_data(data: RobotData) -> Self {
        Self {
            id: data.id,
            position: data.position,
            target: data.target_position,
            state: data.state,
            battery: data.battery,
            current_task: data.current_task,
            task_queue: data.task_queue,
            path: data.path.into(),
            color: data.color,
            move_progress_ms: 0.0,
            charge_accum_ms: 0.0,
            working_ms: 0.0,
        }
    }
}
