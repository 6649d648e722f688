//! Task model, assignment policy, and fleet metrics
//!
//! Events become tasks through a fixed type mapping; tasks are handed to
//! robots by a nearest-available heuristic with two escalating fallbacks.
//! Only raw counters are stored; metrics are recomputed on demand.

use serde::{Deserialize, Serialize};

use crate::core::config::SimulationConfig;
use crate::core::types::{GridPos, RobotId, TaskId};
use crate::events::{EventRecord, EventType};
use crate::grid::{WarehouseGrid, CHARGE_DOCK};
use crate::llm::policy::AssistAssignment;
use crate::robot::{Robot, RobotState};

/// Work a robot can be dispatched to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Pickup,
    Clean,
    Escort,
    Recharge,
    Standby,
}

impl TaskType {
    /// Deterministic event-to-task mapping
    pub fn for_event(event_type: EventType) -> Self {
        match event_type {
            EventType::PackageDrop => TaskType::Pickup,
            EventType::Spill => TaskType::Clean,
            EventType::HumanEntry => TaskType::Escort,
            EventType::Congestion => TaskType::Standby,
            EventType::BatteryLow => TaskType::Recharge,
        }
    }

    /// On-site dwell after arrival, milliseconds
    ///
    /// Recharge never dwells; completion is driven by the battery instead.
    pub fn dwell_ms(&self) -> u64 {
        match self {
            TaskType::Pickup => 2000,
            TaskType::Clean => 3000,
            TaskType::Escort => 5000,
            TaskType::Recharge => 20_000,
            TaskType::Standby => 0,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Pickup => write!(f, "PICKUP"),
            TaskType::Clean => write!(f, "CLEAN"),
            TaskType::Escort => write!(f, "ESCORT"),
            TaskType::Recharge => write!(f, "RECHARGE"),
            TaskType::Standby => write!(f, "STANDBY"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One unit of dispatched work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub priority: i32,
    pub location: GridPos,
    pub assigned_robot: Option<RobotId>,
    pub status: TaskStatus,
    pub created_ms: u64,
    pub description: String,
    pub dwell_ms: Option<u64>,
    pub dwell_remaining_ms: Option<u64>,
}

/// Completed-task histogram by type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTypeDistribution {
    #[serde(rename = "PICKUP")]
    pub pickup: u64,
    #[serde(rename = "CLEAN")]
    pub clean: u64,
    #[serde(rename = "ESCORT")]
    pub escort: u64,
    #[serde(rename = "RECHARGE")]
    pub recharge: u64,
    #[serde(rename = "STANDBY")]
    pub standby: u64,
}

impl TaskTypeDistribution {
    fn record(&mut self, task_type: TaskType) {
        match task_type {
            TaskType::Pickup => self.pickup += 1,
            TaskType::Clean => self.clean += 1,
            TaskType::Escort => self.escort += 1,
            TaskType::Recharge => self.recharge += 1,
            TaskType::Standby => self.standby += 1,
        }
    }
}

/// Coarse per-robot utilization score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotUtilization {
    #[serde(rename = "R1")]
    pub r1: u32,
    #[serde(rename = "R2")]
    pub r2: u32,
    #[serde(rename = "R3")]
    pub r3: u32,
    #[serde(rename = "R4")]
    pub r4: u32,
}

impl RobotUtilization {
    fn set(&mut self, robot: RobotId, score: u32) {
        match robot {
            RobotId::R1 => self.r1 = score,
            RobotId::R2 => self.r2 = score,
            RobotId::R3 => self.r3 = score,
            RobotId::R4 => self.r4 = score,
        }
    }
}

/// One sample of the completed-task time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    pub timestamp_ms: u64,
    pub tasks_completed: u64,
}

/// An externally-reasoned assignment actually accepted by a robot
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedAssignment {
    pub task_id: TaskId,
    pub robot_id: RobotId,
    pub task_type: TaskType,
    pub location: GridPos,
}

/// Fleet metrics, recomputed on demand from raw counters
///
/// `response_time_total_ms` is carried so a restored engine reproduces the
/// same derived average exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub tasks_completed: u64,
    pub total_tasks: u64,
    pub avg_response_ms: u64,
    pub efficiency: u32,
    pub task_history: Vec<TaskHistoryEntry>,
    pub robot_utilization: RobotUtilization,
    pub task_type_distribution: TaskTypeDistribution,
    pub response_time_total_ms: u64,
}

/// Converts events into tasks, assigns them, and keeps completion counters
#[derive(Debug, Default)]
pub struct TaskManager {
    completed: u64,
    completed_by_type: TaskTypeDistribution,
    response_time_total_ms: u64,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the task an event calls for
    ///
    /// Recharge tasks always target the charging dock, whatever the event
    /// location was.
    pub fn create_task_from_event(&self, event: &EventRecord, now_ms: u64) -> Task {
        let task_type = TaskType::for_event(event.event_type);
        let location = if task_type == TaskType::Recharge {
            CHARGE_DOCK
        } else {
            event.location
        };
        Task {
            id: TaskId::new(),
            task_type,
            priority: event.priority,
            location,
            assigned_robot: None,
            status: TaskStatus::Pending,
            created_ms: now_ms,
            description: event.description.clone(),
            dwell_ms: None,
            dwell_remaining_ms: None,
        }
    }

    /// Three-tier nearest-robot assignment
    ///
    /// 1. fully available robots, nearest by Manhattan distance;
    /// 2. idle robots with queue headroom regardless of battery;
    /// 3. the robot with the globally shortest queue that still has room.
    ///
    /// Distance ties go to the first robot found in fleet order. Returns
    /// None when every tier is exhausted; the task stays unassigned.
    pub fn assign_nearest(
        &self,
        task: Task,
        robots: &mut [Robot],
        grid: &WarehouseGrid,
        config: &SimulationConfig,
    ) -> Option<RobotId> {
        let available: Vec<usize> = robots
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_available(config))
            .map(|(i, _)| i)
            .collect();
        if !available.is_empty() {
            return self.assign_to_closest(task, robots, &available, grid, config);
        }

        // Battery relaxation: idle robots with headroom
        let idle: Vec<usize> = robots
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.state() == RobotState::Idle && r.queue_len() < config.task_queue_cap
            })
            .map(|(i, _)| i)
            .collect();
        if !idle.is_empty() {
            return self.assign_to_closest(task, robots, &idle, grid, config);
        }

        // Last resort: shortest queue anywhere with headroom
        let least_busy = robots
            .iter()
            .enumerate()
            .filter(|(_, r)| r.queue_len() < config.task_queue_cap)
            .min_by_key(|(_, r)| r.queue_len())
            .map(|(i, _)| i)?;
        let robot = &mut robots[least_busy];
        robot.assign_task(grid, config, task).then(|| robot.id())
    }

    fn assign_to_closest(
        &self,
        task: Task,
        robots: &mut [Robot],
        candidates: &[usize],
        grid: &WarehouseGrid,
        config: &SimulationConfig,
    ) -> Option<RobotId> {
        let closest = candidates
            .iter()
            .copied()
            .min_by_key(|&i| robots[i].position().manhattan(&task.location))?;
        let robot = &mut robots[closest];
        robot.assign_task(grid, config, task).then(|| robot.id())
    }

    /// Apply externally-reasoned assignments to the fleet
    ///
    /// Targets are clamped onto the floor and every task goes through
    /// `Robot::assign_task`, so the queue cap holds for this writer too.
    /// Returns the (task, robot) pairs actually accepted.
    pub fn apply_assist_assignments(
        &self,
        assignments: &[AssistAssignment],
        robots: &mut [Robot],
        grid: &WarehouseGrid,
        config: &SimulationConfig,
        now_ms: u64,
    ) -> Vec<AppliedAssignment> {
        let mut applied = Vec::new();
        for assignment in assignments {
            let Some(robot) = robots.iter_mut().find(|r| r.id() == assignment.robot_id) else {
                continue;
            };
            let location = grid.clamp(assignment.target_location);
            let task = Task {
                id: TaskId::new(),
                task_type: assignment.task_type,
                priority: assignment.priority,
                location,
                assigned_robot: Some(assignment.robot_id),
                status: TaskStatus::Pending,
                created_ms: now_ms,
                description: assignment.reason.clone(),
                dwell_ms: None,
                dwell_remaining_ms: None,
            };
            let task_id = task.id;
            if robot.assign_task(grid, config, task) {
                applied.push(AppliedAssignment {
                    task_id,
                    robot_id: assignment.robot_id,
                    task_type: assignment.task_type,
                    location,
                });
            } else {
                tracing::warn!(
                    robot = %assignment.robot_id,
                    "assist assignment dropped: queue at cap"
                );
            }
        }
        applied
    }

    pub fn record_completion(&mut self, task: &Task, now_ms: u64) {
        self.completed += 1;
        self.completed_by_type.record(task.task_type);
        self.response_time_total_ms += now_ms.saturating_sub(task.created_ms);
    }

    pub fn completed_count(&self) -> u64 {
        self.completed
    }

    /// Mean completion-minus-creation time, rounded milliseconds
    pub fn avg_response_ms(&self) -> u64 {
        if self.completed == 0 {
            return 0;
        }
        (self.response_time_total_ms + self.completed / 2) / self.completed
    }

    pub fn response_time_total_ms(&self) -> u64 {
        self.response_time_total_ms
    }

    /// Percentage of the fleet currently moving or working
    pub fn efficiency(&self, robots: &[Robot]) -> u32 {
        if robots.is_empty() {
            return 0;
        }
        let busy = robots
            .iter()
            .filter(|r| matches!(r.state(), RobotState::Moving | RobotState::Working))
            .count();
        ((busy as f32 / robots.len() as f32) * 100.0).round() as u32
    }

    /// 100 while busy or charging, 50 while idle with queued work, else 0
    pub fn utilization(&self, robots: &[Robot]) -> RobotUtilization {
        let mut util = RobotUtilization::default();
        for robot in robots {
            let score = match robot.state() {
                RobotState::Moving | RobotState::Working | RobotState::Charging => 100,
                _ if robot.queue_len() > 0 => 50,
                _ => 0,
            };
            util.set(robot.id(), score);
        }
        util
    }

    pub fn distribution(&self) -> TaskTypeDistribution {
        self.completed_by_type
    }

    /// Reload counters from a snapshot at a tick boundary
    pub fn restore_counters(&mut self, metrics: &Metrics) {
        self.completed = metrics.tasks_completed;
        self.completed_by_type = metrics.task_type_distribution;
        self.response_time_total_ms = metrics.response_time_total_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EventId;

    fn event(event_type: EventType, location: GridPos) -> EventRecord {
        EventRecord {
            id: EventId::new(),
            event_type,
            location,
            priority: event_type.priority(),
            timestamp_ms: 0,
            description: format!("{event_type} at {location}"),
            resolved: false,
        }
    }

    fn fixtures() -> (TaskManager, WarehouseGrid, SimulationConfig) {
        (
            TaskManager::new(),
            WarehouseGrid::default(),
            SimulationConfig::default(),
        )
    }

    /// A robot mid-dwell at `position`, holding an in-progress clean task
    fn working_robot(id: RobotId, position: GridPos) -> Robot {
        let manager = TaskManager::new();
        let mut task = manager.create_task_from_event(&event(EventType::Spill, position), 0);
        task.status = TaskStatus::InProgress;
        task.assigned_robot = Some(id);
        Robot::from_data(crate::robot::RobotData {
            id,
            position,
            target_position: Some(position),
            state: crate::robot::RobotState::Working,
            battery: 80.0,
            current_task: Some(task),
            task_queue: vec![],
            path: vec![],
            color: "#ff6b35".into(),
        })
    }

    #[test]
    fn test_event_type_mapping() {
        let (manager, _, _) = fixtures();
        let cases = [
            (EventType::PackageDrop, TaskType::Pickup),
            (EventType::Spill, TaskType::Clean),
            (EventType::HumanEntry, TaskType::Escort),
            (EventType::Congestion, TaskType::Standby),
            (EventType::BatteryLow, TaskType::Recharge),
        ];
        for (event_type, expected) in cases {
            let task = manager.create_task_from_event(&event(event_type, GridPos::new(9, 9)), 0);
            assert_eq!(task.task_type, expected);
            assert_eq!(task.status, TaskStatus::Pending);
            assert!(task.assigned_robot.is_none());
        }
    }

    #[test]
    fn test_battery_low_task_targets_the_dock() {
        let (manager, _, _) = fixtures();
        let task =
            manager.create_task_from_event(&event(EventType::BatteryLow, GridPos::new(18, 13)), 0);
        assert_eq!(task.task_type, TaskType::Recharge);
        assert_eq!(task.location, CHARGE_DOCK);
    }

    #[test]
    fn test_single_idle_robot_wins_assignment() {
        let (manager, grid, config) = fixtures();
        // One idle robot five tiles from the drop; the rest are working
        let mut robots = vec![
            Robot::new(RobotId::R1, GridPos::new(10, 2), "#00d4ff", 100.0),
            working_robot(RobotId::R2, GridPos::new(5, 10)),
            working_robot(RobotId::R3, GridPos::new(12, 7)),
        ];

        let task = manager.create_task_from_event(&event(EventType::PackageDrop, GridPos::new(10, 7)), 0);
        let assigned = manager.assign_nearest(task, &mut robots, &grid, &config);

        assert_eq!(assigned, Some(RobotId::R1));
        let current = robots[0].current_task().unwrap();
        assert_eq!(current.task_type, TaskType::Pickup);
        assert_eq!(current.location, GridPos::new(10, 7));
    }

    #[test]
    fn test_distance_tie_goes_to_a_tied_robot() {
        let (manager, grid, config) = fixtures();
        let mut robots = vec![
            Robot::new(RobotId::R1, GridPos::new(8, 7), "#00d4ff", 100.0),
            Robot::new(RobotId::R2, GridPos::new(12, 7), "#ff6b35", 100.0),
        ];
        let task = manager.create_task_from_event(&event(EventType::Spill, GridPos::new(10, 7)), 0);
        let assigned = manager.assign_nearest(task, &mut robots, &grid, &config).unwrap();
        // Both are distance 2; either is a correct answer
        assert!(matches!(assigned, RobotId::R1 | RobotId::R2));
    }

    #[test]
    fn test_low_battery_fallback_tier() {
        let (manager, grid, config) = fixtures();
        // Only robot is idle but under the battery floor
        let mut robots = vec![Robot::new(RobotId::R1, GridPos::new(3, 3), "#00d4ff", 10.0)];
        let task = manager.create_task_from_event(&event(EventType::PackageDrop, GridPos::new(5, 5)), 0);
        let assigned = manager.assign_nearest(task, &mut robots, &grid, &config);
        assert_eq!(assigned, Some(RobotId::R1));
    }

    #[test]
    fn test_shortest_queue_fallback_tier() {
        let (manager, grid, config) = fixtures();
        let mut robots = vec![
            Robot::new(RobotId::R1, GridPos::new(0, 0), "#00d4ff", 100.0),
            Robot::new(RobotId::R2, GridPos::new(19, 14), "#ff6b35", 100.0),
        ];
        // Both mid-task; R1 carries two queued tasks, R2 none
        for (i, extra) in [(0usize, 2usize), (1, 0)] {
            let t = manager.create_task_from_event(&event(EventType::Spill, GridPos::new(9, 1)), 0);
            robots[i].assign_task(&grid, &config, t);
            for _ in 0..extra {
                let t = manager
                    .create_task_from_event(&event(EventType::Spill, GridPos::new(9, 1)), 0);
                robots[i].assign_task(&grid, &config, t);
            }
        }

        let task = manager.create_task_from_event(&event(EventType::PackageDrop, GridPos::new(1, 1)), 0);
        let assigned = manager.assign_nearest(task, &mut robots, &grid, &config);
        assert_eq!(assigned, Some(RobotId::R2));
    }

    #[test]
    fn test_assignment_exhaustion_returns_none() {
        let (manager, grid, config) = fixtures();
        let mut robots = vec![Robot::new(RobotId::R1, GridPos::new(0, 0), "#00d4ff", 100.0)];
        // Fill: one in progress plus a full queue
        for _ in 0..4 {
            let t = manager.create_task_from_event(&event(EventType::Spill, GridPos::new(9, 1)), 0);
            robots[0].assign_task(&grid, &config, t);
        }

        let task = manager.create_task_from_event(&event(EventType::PackageDrop, GridPos::new(1, 1)), 0);
        assert_eq!(manager.assign_nearest(task, &mut robots, &grid, &config), None);
    }

    #[test]
    fn test_metrics_counters() {
        let (mut manager, _, _) = fixtures();
        let mut task = manager.create_task_from_event(&event(EventType::PackageDrop, GridPos::new(1, 1)), 1000);
        task.status = TaskStatus::Completed;
        manager.record_completion(&task, 4000);

        let mut second = manager.create_task_from_event(&event(EventType::Spill, GridPos::new(2, 2)), 2000);
        second.status = TaskStatus::Completed;
        manager.record_completion(&second, 3001);

        assert_eq!(manager.completed_count(), 2);
        // (3000 + 1001) / 2 = 2000.5, rounds to 2001
        assert_eq!(manager.avg_response_ms(), 2001);
        assert_eq!(manager.distribution().pickup, 1);
        assert_eq!(manager.distribution().clean, 1);
    }

    #[test]
    fn test_efficiency_and_utilization() {
        let (manager, grid, config) = fixtures();
        let mut robots = vec![
            Robot::new(RobotId::R1, GridPos::new(0, 0), "#00d4ff", 100.0),
            Robot::new(RobotId::R2, GridPos::new(5, 10), "#ff6b35", 87.0),
            Robot::new(RobotId::R3, GridPos::new(12, 7), "#a855f7", 72.0),
            Robot::new(RobotId::R4, GridPos::new(17, 12), "#00ff88", 55.0),
        ];
        robots[0].navigate_to(&grid, GridPos::new(5, 0), &[]);
        let t = manager.create_task_from_event(&event(EventType::Spill, GridPos::new(9, 1)), 0);
        robots[1].assign_task(&grid, &config, t);

        // R1 and R2 moving: 2/4
        assert_eq!(manager.efficiency(&robots), 50);

        let util = manager.utilization(&robots);
        assert_eq!(util.r1, 100);
        assert_eq!(util.r2, 100);
        assert_eq!(util.r3, 0);
        assert_eq!(util.r4, 0);
    }

    #[test]
    fn test_restore_counters_reproduces_average() {
        let (mut manager, _, _) = fixtures();
        let mut task = manager.create_task_from_event(&event(EventType::PackageDrop, GridPos::new(1, 1)), 0);
        task.status = TaskStatus::Completed;
        manager.record_completion(&task, 777);

        let metrics = Metrics {
            tasks_completed: manager.completed_count(),
            avg_response_ms: manager.avg_response_ms(),
            task_type_distribution: manager.distribution(),
            response_time_total_ms: manager.response_time_total_ms(),
            ..Default::default()
        };

        let mut restored = TaskManager::new();
        restored.restore_counters(&metrics);
        assert_eq!(restored.avg_response_ms(), manager.avg_response_ms());
        assert_eq!(restored.distribution(), manager.distribution());
    }
}
