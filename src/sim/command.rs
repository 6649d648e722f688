//! Serialized command inbox
//!
//! Everything that mutates tick-domain state from outside arrives as one of
//! these, delivered over an mpsc channel and applied between ticks so the
//! engine never observes a half-applied command.

use crate::core::types::{GridPos, RobotId};
use crate::events::EventType;
use crate::llm::policy::AssistResponse;
use crate::sim::log::LogEntry;
use crate::sim::WarehouseState;
use crate::workflow::{RawEdge, RawNode};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Manual per-robot command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum RobotCommand {
    Move { destination: GridPos },
    Pause,
    Resume,
    Recharge,
}

/// One externally-sourced mutation, applied at a tick boundary
#[derive(Debug)]
pub enum SimCommand {
    /// Manual robot command from an operator
    Robot {
        robot_id: RobotId,
        command: RobotCommand,
    },
    /// Operator-triggered incident
    TriggerEvent {
        event_type: EventType,
        location: Option<GridPos>,
    },
    /// Drop all active events
    ClearEvents,
    /// Replace the rule graph
    SyncWorkflow {
        nodes: Vec<RawNode>,
        edges: Vec<RawEdge>,
    },
    /// Change the global speed multiplier
    SetSpeed { multiplier: f32 },
    /// Tick-boundary state replacement from a snapshot
    ReplaceState(Box<WarehouseState>),
    /// Completed external reasoning call coming back to the tick domain
    AssistResult {
        generation: u64,
        response: AssistResponse,
    },
    /// Pull the full-state snapshot
    QueryState { reply: oneshot::Sender<WarehouseState> },
    /// Pull the most recent operational log lines
    QueryLogs {
        limit: usize,
        reply: oneshot::Sender<Vec<LogEntry>>,
    },
    /// Stop the engine loop
    Shutdown,
}
