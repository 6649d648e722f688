//! Prompt construction for dispatch reasoning
//!
//! Converts the orchestrator's fleet snapshot plus the triggering event
//! into the input schema for the external collaborator. The output contract
//! is strict JSON so the parser can stay dumb.

use serde::Serialize;

use crate::core::types::{GridPos, RobotId};
use crate::events::{EventRecord, EventType};
use crate::grid::ZoneOccupancy;
use crate::robot::RobotState;
use crate::tasks::TaskType;

/// Per-robot line of the reasoning snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RobotSummary {
    pub id: RobotId,
    pub position: GridPos,
    pub state: RobotState,
    pub battery: f32,
    pub current_task: Option<TaskType>,
    pub queue_length: usize,
}

/// Active-event line of the reasoning snapshot
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub event_type: EventType,
    pub location: GridPos,
    pub priority: i32,
    pub timestamp_ms: u64,
}

/// Fleet snapshot handed to the reasoning collaborator
#[derive(Debug, Clone, Serialize)]
pub struct PromptState {
    pub robots: Vec<RobotSummary>,
    pub active_events: Vec<EventSummary>,
    pub zone_occupancy: ZoneOccupancy,
    pub human_worker_position: Option<GridPos>,
}

/// Role and output contract, shared by every request
pub fn build_system_prompt() -> String {
    "You are the dispatch coordinator for a 20x15 grid warehouse with 4 mobile robots. \
     You assign exactly one robot to each incoming event. \
     Respond with ONLY raw JSON, no markdown fences, no extra text."
        .to_string()
}

/// Build the user message for one event
///
/// Robots are pre-sorted by distance so the model's job is mostly to apply
/// the stated rules; the deterministic fallback applies the same rules when
/// the model is unavailable.
pub fn build_prompt(state: &PromptState, event: &EventRecord) -> String {
    let required_task = TaskType::for_event(event.event_type);
    let priority = event.priority;
    let loc = event.location;

    let mut robots: Vec<&RobotSummary> = state.robots.iter().collect();
    robots.sort_by_key(|r| r.position.manhattan(&loc));

    let robot_lines: Vec<String> = robots
        .iter()
        .map(|r| {
            format!(
                "  {}: pos={} distance={} state={:?} battery={}% currentTask={} queueLength={}",
                r.id,
                r.position,
                r.position.manhattan(&loc),
                r.state,
                r.battery.round(),
                r.current_task
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "none".into()),
                r.queue_length,
            )
        })
        .collect();

    let human_note = state
        .human_worker_position
        .map(|p| format!("HUMAN WORKER at {p} - nearby robots must yield.\n\n"))
        .unwrap_or_default();

    format!(
        "EVENT: {} at {}\n\
         REQUIRED TASK: {}\n\n\
         ROBOTS (sorted closest to farthest):\n{}\n\n\
         {}\
         ASSIGNMENT RULES:\n\
         1. Pick EXACTLY ONE robot: the closest IDLE robot with battery > 20%.\n\
         2. If no IDLE robot qualifies, pick the closest with queueLength < 3.\n\
         3. Never pick a robot with battery < 15%.\n\
         4. taskType must be \"{}\", targetLocation must be {{\"x\":{},\"y\":{}}}, priority must be {}.\n\n\
         OUTPUT:\n\
         {{\"reasoning\":\"<1 sentence>\",\"assignments\":[{{\"robotId\":\"<ID>\",\"taskType\":\"{}\",\"priority\":{},\"targetLocation\":{{\"x\":{},\"y\":{}}},\"reason\":\"<short>\"}}],\"alerts\":[]}}",
        event.event_type,
        loc,
        required_task,
        robot_lines.join("\n"),
        human_note,
        required_task,
        loc.x,
        loc.y,
        priority,
        required_task,
        priority,
        loc.x,
        loc.y,
    )
}
