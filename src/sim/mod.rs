//! Simulation orchestrator
//!
//! Owns every tick-domain entity: the robot fleet, event lists, the human
//! worker, the rule graph, and the logical clock. One `tick()` advances all
//! of them in a fixed order and returns the notifications to publish.
//! External mutation arrives only through `sim::command` at tick
//! boundaries; components receive borrowed robot slices for the duration of
//! one call and never retain them.

pub mod command;
pub mod log;
pub mod runtime;

use serde::{Deserialize, Serialize};

use crate::core::config::SimulationConfig;
use crate::core::types::{EventId, GridPos, RobotId, TaskId};
use crate::events::{EventGenerator, EventRecord, EventType, HumanWorker};
use crate::grid::{TileType, WarehouseGrid, Zone, ZoneOccupancy};
use crate::llm::context::{EventSummary, PromptState, RobotSummary};
use crate::llm::policy::AssistResponse;
use crate::robot::{Robot, RobotData, RobotState};
use crate::sim::command::RobotCommand;
use crate::sim::log::{EventLog, LogCategory, LogEntry};
use crate::tasks::{Metrics, TaskHistoryEntry, TaskManager, TaskType};
use crate::workflow::{RawEdge, RawNode, WorkflowAction, WorkflowEngine};

/// Severity grade on safety alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Push notification emitted on state-changing occurrences
///
/// High-frequency kinds (robot positions, metrics) are rate-limited to a
/// fixed number of ticks by the orchestrator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Notification {
    #[serde(rename = "robot:update")]
    RobotUpdate(RobotData),
    #[serde(rename = "event:new")]
    EventNew(EventRecord),
    #[serde(rename = "task:assigned")]
    TaskAssigned {
        task_id: TaskId,
        robot_id: RobotId,
        task_type: TaskType,
        location: GridPos,
    },
    #[serde(rename = "task:completed")]
    TaskCompleted {
        task_id: TaskId,
        robot_id: RobotId,
        duration_ms: u64,
    },
    #[serde(rename = "alert:safety")]
    SafetyAlert {
        message: String,
        zone: Option<Zone>,
        severity: Severity,
    },
    #[serde(rename = "metrics:update")]
    MetricsUpdate(Metrics),
    #[serde(rename = "assist:response")]
    AssistResponse(AssistResponse),
    #[serde(rename = "assist:skipped")]
    AssistSkipped { event_type: EventType },
    #[serde(rename = "workflow:action")]
    WorkflowAction { message: String },
    #[serde(rename = "workflow:updated")]
    WorkflowUpdated {
        node_count: usize,
        edge_count: usize,
    },
    #[serde(rename = "events:cleared")]
    EventsCleared,
}

/// Full-state snapshot, queryable at any time and usable for a
/// tick-boundary state replacement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseState {
    pub robots: Vec<RobotData>,
    pub events: Vec<EventRecord>,
    pub active_events: Vec<EventRecord>,
    pub human_worker: Option<HumanWorker>,
    pub zone_occupancy: ZoneOccupancy,
    pub grid: Vec<Vec<TileType>>,
    pub obstacles: Vec<GridPos>,
    pub metrics: Metrics,
    pub simulation_speed: f32,
    pub tick: u64,
    pub clock_ms: u64,
}

/// Result of running the rule graph for one event
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub actions: Vec<WorkflowAction>,
    pub results: Vec<String>,
    pub needs_assist: bool,
}

pub struct WarehouseSimulation {
    config: SimulationConfig,
    grid: WarehouseGrid,
    robots: Vec<Robot>,
    task_manager: TaskManager,
    event_generator: EventGenerator,
    workflow: WorkflowEngine,
    active_events: Vec<EventRecord>,
    recent_events: Vec<EventRecord>,
    human_worker: Option<HumanWorker>,
    log: EventLog,
    speed: f32,
    tick: u64,
    clock_ms: u64,
    task_history: Vec<TaskHistoryEntry>,
    last_history_ms: u64,
    human_step_accum: f32,
}

impl WarehouseSimulation {
    pub fn new(config: SimulationConfig) -> Self {
        let grid = WarehouseGrid::new(config.grid_width, config.grid_height);
        let event_generator = EventGenerator::new(&grid);
        Self::build(config, grid, event_generator)
    }

    /// Deterministic engine for tests
    pub fn with_seed(config: SimulationConfig, seed: u64) -> Self {
        let grid = WarehouseGrid::new(config.grid_width, config.grid_height);
        let event_generator = EventGenerator::with_seed(&grid, seed);
        Self::build(config, grid, event_generator)
    }

    fn build(
        config: SimulationConfig,
        grid: WarehouseGrid,
        event_generator: EventGenerator,
    ) -> Self {
        let robots = vec![
            Robot::new(RobotId::R1, GridPos::new(2, 2), "#00d4ff", 100.0),
            Robot::new(RobotId::R2, GridPos::new(5, 10), "#ff6b35", 87.0),
            Robot::new(RobotId::R3, GridPos::new(12, 7), "#a855f7", 72.0),
            Robot::new(RobotId::R4, GridPos::new(17, 12), "#00ff88", 55.0),
        ];
        let log = EventLog::new(config.log_capacity, config.log_retain);

        Self {
            config,
            grid,
            robots,
            task_manager: TaskManager::new(),
            event_generator,
            workflow: WorkflowEngine::with_default_graph(),
            active_events: Vec::new(),
            recent_events: Vec::new(),
            human_worker: None,
            log,
            speed: 1.0,
            tick: 0,
            clock_ms: 0,
            task_history: Vec::new(),
            last_history_ms: 0,
            human_step_accum: 0.0,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn robots(&self) -> &[Robot] {
        &self.robots
    }

    pub fn robot(&self, id: RobotId) -> Option<&Robot> {
        self.robots.iter().find(|r| r.id() == id)
    }

    pub fn active_events(&self) -> &[EventRecord] {
        &self.active_events
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn logs(&self, limit: usize) -> &[LogEntry] {
        self.log.recent(limit)
    }

    /// Give the fleet initial motion: the weakest robot heads to charge and
    /// one robot goes out on patrol
    pub fn warm_start(&mut self) -> Vec<Notification> {
        let mut notes = Vec::new();
        if let Some(r4) = self.robots.iter_mut().find(|r| r.id() == RobotId::R4) {
            if r4.battery() < 60.0 {
                let battery = r4.battery();
                r4.force_recharge(&self.grid, self.clock_ms);
                self.log.push(
                    LogCategory::BatteryLow,
                    format!("R4 auto-returning to charge (battery: {}%)", battery.round()),
                    self.clock_ms,
                );
            }
        }
        if let Some(r2) = self.robots.iter_mut().find(|r| r.id() == RobotId::R2) {
            r2.navigate_to(&self.grid, GridPos::new(10, 8), &[]);
            self.log.push(
                LogCategory::TaskAssigned,
                "R2 dispatched to Zone B for patrol",
                self.clock_ms,
            );
            notes.push(Notification::RobotUpdate(r2.to_data()));
        }
        notes
    }

    /// Advance the whole simulation one tick
    pub fn tick(&mut self) -> Vec<Notification> {
        self.tick += 1;
        self.clock_ms += self.config.tick_ms;
        let mut notes = Vec::new();

        // Robots advance in fixed fleet order
        for i in 0..self.robots.len() {
            let completed =
                self.robots[i].tick(&self.grid, &self.config, self.config.tick_ms, self.speed);
            if let Some(completed) = completed {
                self.task_manager.record_completion(&completed, self.clock_ms);
                self.log.push(
                    LogCategory::TaskCompleted,
                    format!("{} completed {} task", self.robots[i].id(), completed.task_type),
                    self.clock_ms,
                );
                notes.push(Notification::TaskCompleted {
                    task_id: completed.id,
                    robot_id: self.robots[i].id(),
                    duration_ms: self.clock_ms.saturating_sub(completed.created_ms),
                });
            }

            if self.robots[i].needs_charging(&self.config) {
                let (id, battery, position) = (
                    self.robots[i].id(),
                    self.robots[i].battery(),
                    self.robots[i].position(),
                );
                self.robots[i].force_recharge(&self.grid, self.clock_ms);
                self.log.push(
                    LogCategory::BatteryLow,
                    format!("{} battery low ({}%), auto-recharging", id, battery.round()),
                    self.clock_ms,
                );
                notes.push(Notification::SafetyAlert {
                    message: format!("{id} battery critically low"),
                    zone: self.grid.zone_for(position),
                    severity: Severity::Medium,
                });
            }

            if self.tick % self.config.robot_update_interval_ticks == 0 {
                notes.push(Notification::RobotUpdate(self.robots[i].to_data()));
            }
        }

        // Congestion only after every robot has advanced this tick
        self.resolve_congestion();

        notes.extend(self.update_human_worker());

        let new_events = self.event_generator.tick(self.clock_ms, self.speed);
        for event in new_events {
            notes.extend(self.handle_new_event(event));
        }

        if self.clock_ms.saturating_sub(self.last_history_ms) >= self.config.history_interval_ms {
            self.task_history.push(TaskHistoryEntry {
                timestamp_ms: self.clock_ms,
                tasks_completed: self.task_manager.completed_count(),
            });
            self.last_history_ms = self.clock_ms;
        }

        if self.tick % self.config.metrics_interval_ticks == 0 {
            notes.push(Notification::MetricsUpdate(self.metrics()));
        }

        notes
    }

    /// Pairwise proximity check; the second robot of a congested pair is
    /// rerouted around the first
    fn resolve_congestion(&mut self) {
        for i in 0..self.robots.len() {
            for j in (i + 1)..self.robots.len() {
                let close = self.robots[i]
                    .position()
                    .manhattan(&self.robots[j].position())
                    <= self.config.congestion_radius;
                let both_moving = self.robots[i].state() == RobotState::Moving
                    && self.robots[j].state() == RobotState::Moving;
                if close && both_moving {
                    if let Some(target) = self.robots[j].target() {
                        let blocked = [self.robots[i].position()];
                        self.robots[j].navigate_to(&self.grid, target, &blocked);
                    }
                }
            }
        }
    }

    fn update_human_worker(&mut self) -> Vec<Notification> {
        let mut notes = Vec::new();
        let Some(worker) = self.human_worker.as_mut() else {
            return notes;
        };
        if !worker.active {
            self.human_worker = None;
            return notes;
        }

        self.human_step_accum += 1.0;
        let step_interval = (self.config.human_step_ticks / self.speed).max(1.0);
        if self.human_step_accum < step_interval {
            return notes;
        }
        self.human_step_accum -= step_interval;

        if worker.step() {
            return notes;
        }

        // Walk finished: clear the worker and release every paused robot
        self.human_worker = None;
        for robot in self.robots.iter_mut() {
            if robot.state() == RobotState::Paused {
                robot.resume();
                self.log.push(
                    LogCategory::SafetyAlert,
                    format!("{} resumed, human worker left zone", robot.id()),
                    self.clock_ms,
                );
                notes.push(Notification::SafetyAlert {
                    message: format!("{} resumed after human cleared", robot.id()),
                    zone: None,
                    severity: Severity::Low,
                });
            }
        }
        notes
    }

    /// Ingest one incident: record it, apply safety handling, create and
    /// assign its task, then retire it from the active set
    pub fn handle_new_event(&mut self, event: EventRecord) -> Vec<Notification> {
        let mut notes = Vec::new();
        let event_id = event.id;

        self.active_events.push(event.clone());
        self.recent_events.push(event.clone());
        if self.recent_events.len() > self.config.recent_events_cap {
            let cut = self.recent_events.len() - self.config.recent_events_cap;
            self.recent_events.drain(..cut);
        }

        self.log
            .push(event.event_type.into(), event.description.clone(), self.clock_ms);
        notes.push(Notification::EventNew(event.clone()));

        if event.event_type == EventType::HumanEntry {
            self.human_worker = Some(self.event_generator.spawn_human_worker());
            self.human_step_accum = 0.0;
            for robot in self.robots.iter_mut() {
                if robot.position().manhattan(&event.location) <= self.config.human_pause_radius {
                    robot.pause();
                    self.log.push(
                        LogCategory::SafetyAlert,
                        format!("{} paused, human worker nearby", robot.id()),
                        self.clock_ms,
                    );
                    notes.push(Notification::SafetyAlert {
                        message: format!("{} paused for human safety", robot.id()),
                        zone: self.grid.zone_for(event.location),
                        severity: Severity::High,
                    });
                }
            }
        }

        // Rule-based assignment; the workflow engine and the assist policy
        // may add further writers for the same event, all reconciled
        // through Robot::assign_task
        let task = self.task_manager.create_task_from_event(&event, self.clock_ms);
        let (task_id, task_type, location) = (task.id, task.task_type, task.location);
        let assigned =
            self.task_manager
                .assign_nearest(task, &mut self.robots, &self.grid, &self.config);
        if let Some(robot_id) = assigned {
            self.log.push(
                LogCategory::TaskAssigned,
                format!("{robot_id} assigned to {task_type} at {location}"),
                self.clock_ms,
            );
            notes.push(Notification::TaskAssigned {
                task_id,
                robot_id,
                task_type,
                location,
            });
        } else {
            tracing::debug!(event = %event.event_type, "no assignment made, all tiers exhausted");
        }

        self.resolve_event(event_id);
        notes
    }

    /// Mark an event resolved and drop it from the active set
    pub fn resolve_event(&mut self, id: EventId) {
        for event in self.active_events.iter_mut().chain(self.recent_events.iter_mut()) {
            if event.id == id {
                event.resolved = true;
            }
        }
        self.active_events.retain(|e| !e.resolved);
    }

    /// Operator-triggered incident; returns the event for follow-up
    /// workflow/assist handling
    pub fn trigger_manual_event(
        &mut self,
        event_type: EventType,
        location: Option<GridPos>,
    ) -> (EventRecord, Vec<Notification>) {
        let event = self
            .event_generator
            .generate_manual(event_type, location, self.clock_ms);
        let notes = self.handle_new_event(event.clone());
        (event, notes)
    }

    /// Run the rule graph for one event and apply its actions
    pub fn execute_workflow(&mut self, event: &EventRecord) -> (WorkflowOutcome, Vec<Notification>) {
        let actions = self.workflow.evaluate(event, &self.robots);
        let results = self.workflow.execute_actions(
            &actions,
            event,
            &mut self.robots,
            &self.grid,
            &self.config,
            self.clock_ms,
        );

        let mut notes = Vec::new();
        for line in &results {
            self.log.push(LogCategory::Workflow, line.clone(), self.clock_ms);
            notes.push(Notification::WorkflowAction {
                message: line.clone(),
            });
        }

        let needs_assist = WorkflowEngine::needs_assist(&actions);
        (
            WorkflowOutcome {
                actions,
                results,
                needs_assist,
            },
            notes,
        )
    }

    /// Snapshot for the reasoning collaborator
    pub fn prompt_state(&self) -> PromptState {
        PromptState {
            robots: self
                .robots
                .iter()
                .map(|r| RobotSummary {
                    id: r.id(),
                    position: r.position(),
                    state: r.state(),
                    battery: r.battery(),
                    current_task: r.current_task().map(|t| t.task_type),
                    queue_length: r.queue_len(),
                })
                .collect(),
            active_events: self
                .active_events
                .iter()
                .map(|e| EventSummary {
                    event_type: e.event_type,
                    location: e.location,
                    priority: e.priority,
                    timestamp_ms: e.timestamp_ms,
                })
                .collect(),
            zone_occupancy: self.zone_occupancy(),
            human_worker_position: self
                .human_worker
                .as_ref()
                .filter(|w| w.active)
                .map(|w| w.position),
        }
    }

    /// Apply a reasoning decision (live or fallback) to the fleet
    pub fn apply_assist_response(&mut self, response: &AssistResponse) -> Vec<Notification> {
        let mut notes = Vec::new();
        self.log.push(
            LogCategory::AssistDecision,
            response.reasoning.clone(),
            self.clock_ms,
        );

        let applied = self.task_manager.apply_assist_assignments(
            &response.assignments,
            &mut self.robots,
            &self.grid,
            &self.config,
            self.clock_ms,
        );
        for entry in applied {
            self.log.push(
                LogCategory::TaskAssigned,
                format!(
                    "{} assigned to {} at {} (AI)",
                    entry.robot_id, entry.task_type, entry.location
                ),
                self.clock_ms,
            );
            notes.push(Notification::TaskAssigned {
                task_id: entry.task_id,
                robot_id: entry.robot_id,
                task_type: entry.task_type,
                location: entry.location,
            });
        }
        notes
    }

    /// Manual robot command; false when the command cannot apply
    pub fn send_robot_command(&mut self, robot_id: RobotId, command: RobotCommand) -> bool {
        let grid = &self.grid;
        let clock_ms = self.clock_ms;
        let Some(robot) = self.robots.iter_mut().find(|r| r.id() == robot_id) else {
            return false;
        };
        match command {
            RobotCommand::Move { destination } => {
                if !grid.is_walkable(destination) {
                    return false;
                }
                robot.navigate_to(grid, destination, &[]);
            }
            RobotCommand::Pause => robot.pause(),
            RobotCommand::Resume => robot.resume(),
            RobotCommand::Recharge => robot.force_recharge(grid, clock_ms),
        }
        true
    }

    /// Drop all active events; a no-op when none are active
    pub fn clear_events(&mut self) -> Vec<Notification> {
        self.active_events.clear();
        vec![Notification::EventsCleared]
    }

    /// Replace the rule graph (arrives atomically at a tick boundary)
    pub fn sync_workflow(&mut self, nodes: &[RawNode], edges: &[RawEdge]) -> Vec<Notification> {
        let (node_count, edge_count) = self.workflow.update(nodes, edges);
        vec![Notification::WorkflowUpdated {
            node_count,
            edge_count,
        }]
    }

    pub fn set_speed(&mut self, multiplier: f32) {
        self.speed = multiplier.clamp(0.1, 16.0);
    }

    pub fn zone_occupancy(&self) -> ZoneOccupancy {
        let mut occupancy = ZoneOccupancy::default();
        for robot in &self.robots {
            if let Some(zone) = self.grid.zone_for(robot.position()) {
                occupancy.record(zone);
            }
        }
        occupancy
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            tasks_completed: self.task_manager.completed_count(),
            total_tasks: self.task_manager.completed_count() + self.active_events.len() as u64,
            avg_response_ms: self.task_manager.avg_response_ms(),
            efficiency: self.task_manager.efficiency(&self.robots),
            task_history: self.task_history.clone(),
            robot_utilization: self.task_manager.utilization(&self.robots),
            task_type_distribution: self.task_manager.distribution(),
            response_time_total_ms: self.task_manager.response_time_total_ms(),
        }
    }

    /// Full-state snapshot; serializable and replayable via `restore`
    pub fn snapshot(&self) -> WarehouseState {
        WarehouseState {
            robots: self.robots.iter().map(Robot::to_data).collect(),
            events: self.recent_events.clone(),
            active_events: self.active_events.clone(),
            human_worker: self.human_worker.clone(),
            zone_occupancy: self.zone_occupancy(),
            grid: self.grid.tiles().clone(),
            obstacles: self.grid.obstacles().to_vec(),
            metrics: self.metrics(),
            simulation_speed: self.speed,
            tick: self.tick,
            clock_ms: self.clock_ms,
        }
    }

    /// Tick-boundary state replacement from a snapshot
    ///
    /// Generator timers and sub-tile accumulators restart fresh; everything
    /// the snapshot carries is reproduced exactly.
    pub fn restore(&mut self, state: WarehouseState) {
        self.robots = state.robots.into_iter().map(Robot::from_data).collect();
        self.recent_events = state.events;
        self.active_events = state.active_events;
        self.human_worker = state.human_worker;
        self.speed = state.simulation_speed;
        self.tick = state.tick;
        self.clock_ms = state.clock_ms;
        self.task_manager.restore_counters(&state.metrics);
        self.task_history = state.metrics.task_history;
        self.last_history_ms = state.clock_ms;
        self.human_step_accum = 0.0;
    }
}
