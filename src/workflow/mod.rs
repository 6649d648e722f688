//! Rule-graph evaluation
//!
//! Operators edit a directed graph of trigger, condition, action, and
//! AI-decision nodes. On every incoming event the engine finds the matching
//! triggers, walks the graph depth-first, and returns the ordered action
//! list to execute against the fleet. Node and edge payloads arrive as raw
//! string records from the editor and are parsed into closed enums with an
//! explicit Unknown fallback, so dispatch is exhaustiveness-checked.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::core::config::SimulationConfig;
use crate::core::types::GridPos;
use crate::events::{EventRecord, EventType};
use crate::grid::{WarehouseGrid, CHARGE_DOCK};
use crate::robot::{Robot, RobotState};
use crate::tasks::TaskType;

/// Raw node record as synced from the graph editor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: std::collections::HashMap<String, String>,
}

/// Raw edge record as synced from the graph editor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, alias = "sourceHandle")]
    pub source_handle: Option<String>,
}

/// Branch label on a condition node's outgoing edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeHandle {
    Yes,
    No,
}

/// Predicate evaluated against the incoming event and fleet state
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
    /// Event priority strictly exceeds the threshold
    PriorityExceeds(i32),
    /// Some idle robot has battery strictly above the threshold
    IdleBatteryAbove(f32),
    /// At least one robot is idle
    HasIdleRobot,
    /// Unrecognized predicate name; evaluates true (fail-open)
    Unknown(String),
}

impl ConditionKind {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("priority > ") {
            if let Ok(n) = rest.trim().parse() {
                return ConditionKind::PriorityExceeds(n);
            }
        }
        if let Some(rest) = raw.strip_prefix("priority_gt_") {
            if let Ok(n) = rest.parse() {
                return ConditionKind::PriorityExceeds(n);
            }
        }
        if let Some(rest) = raw.strip_prefix("battery_above_") {
            if let Ok(n) = rest.parse() {
                return ConditionKind::IdleBatteryAbove(n);
            }
        }
        match raw {
            "has_idle_robot" | "zone_has_idle" => ConditionKind::HasIdleRobot,
            _ => ConditionKind::Unknown(raw.to_string()),
        }
    }
}

/// Fleet operation an action node requests
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Send the nearest qualifying idle robot to the event location
    DispatchNearest,
    /// Force-recharge every robot not already charging
    RechargeAll,
    /// Force-recharge the idle robot nearest the dock
    RechargeNearest,
    /// Pause every moving or working robot
    PauseAll,
    /// Resume every paused robot
    ResumeAll,
    /// No fleet effect; records that a task was queued
    QueueTask,
    /// Ask the external reasoning collaborator for a plan
    RequestAssist,
    /// Write an alert line to the operational log
    LogAlert,
    /// Unrecognized action name; descriptive no-op
    Unknown(String),
}

impl ActionKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "dispatch_nearest" => ActionKind::DispatchNearest,
            "recharge_all" => ActionKind::RechargeAll,
            "recharge" => ActionKind::RechargeNearest,
            "pause_all" | "pause_zone" => ActionKind::PauseAll,
            "resume_all" => ActionKind::ResumeAll,
            "queue_task" => ActionKind::QueueTask,
            "execute_ai" | "request_ai" | "ask_ai" => ActionKind::RequestAssist,
            "log_alert" => ActionKind::LogAlert,
            other => ActionKind::Unknown(other.to_string()),
        }
    }
}

/// Typed graph node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Trigger(EventType),
    Condition(ConditionKind),
    Action(ActionKind),
    AiDecision,
}

#[derive(Debug, Clone)]
struct WorkflowNode {
    id: String,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
struct WorkflowEdge {
    source: String,
    target: String,
    handle: Option<EdgeHandle>,
}

/// One action collected during evaluation, tagged with its source node
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowAction {
    pub kind: ActionKind,
    pub triggered_by: String,
}

/// The rule graph and its evaluator
///
/// Nodes live in an arena addressed by stable string IDs; traversal state
/// is an explicit per-call visited set, never shared across evaluations.
#[derive(Debug, Default)]
pub struct WorkflowEngine {
    nodes: Vec<WorkflowNode>,
    index: AHashMap<String, usize>,
    edges: Vec<WorkflowEdge>,
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine preloaded with the stock rule set: package handling with a
    /// priority gate, human-safety pause, battery recharge, and an
    /// AI-assisted spill response
    pub fn with_default_graph() -> Self {
        let mut engine = Self::new();
        let nodes = vec![
            raw_node("pkg-trigger", "triggerNode", &[("eventType", "PACKAGE_DROP")]),
            raw_node("pkg-priority", "conditionNode", &[("condition", "priority > 3")]),
            raw_node("pkg-dispatch-high", "actionNode", &[("action", "dispatch_nearest")]),
            raw_node("pkg-idle-check", "conditionNode", &[("condition", "zone_has_idle")]),
            raw_node("pkg-dispatch-idle", "actionNode", &[("action", "dispatch_nearest")]),
            raw_node("pkg-queue", "actionNode", &[("action", "queue_task")]),
            raw_node("human-trigger", "triggerNode", &[("eventType", "HUMAN_ENTRY")]),
            raw_node("human-pause", "actionNode", &[("action", "pause_zone")]),
            raw_node("battery-trigger", "triggerNode", &[("eventType", "BATTERY_LOW")]),
            raw_node("battery-charge", "actionNode", &[("action", "recharge")]),
            raw_node("spill-trigger", "triggerNode", &[("eventType", "SPILL")]),
            raw_node("spill-ai", "aiDecisionNode", &[]),
            raw_node("spill-action", "actionNode", &[("action", "execute_ai")]),
        ];
        let edges = vec![
            raw_edge("e-pkg-1", "pkg-trigger", "pkg-priority", None),
            raw_edge("e-pkg-2", "pkg-priority", "pkg-dispatch-high", Some("yes")),
            raw_edge("e-pkg-3", "pkg-priority", "pkg-idle-check", Some("no")),
            raw_edge("e-pkg-4", "pkg-idle-check", "pkg-dispatch-idle", Some("yes")),
            raw_edge("e-pkg-5", "pkg-idle-check", "pkg-queue", Some("no")),
            raw_edge("e-human-1", "human-trigger", "human-pause", None),
            raw_edge("e-battery-1", "battery-trigger", "battery-charge", None),
            raw_edge("e-spill-1", "spill-trigger", "spill-ai", None),
            raw_edge("e-spill-2", "spill-ai", "spill-action", None),
        ];
        engine.update(&nodes, &edges);
        engine
    }

    /// Replace the whole graph; applied atomically at a tick boundary by
    /// the orchestrator. Returns (nodes kept, edges kept).
    pub fn update(&mut self, raw_nodes: &[RawNode], raw_edges: &[RawEdge]) -> (usize, usize) {
        self.nodes.clear();
        self.index.clear();
        self.edges.clear();

        for raw in raw_nodes {
            let kind = match raw.node_type.as_str() {
                "triggerNode" => raw
                    .data
                    .get("eventType")
                    .and_then(|s| parse_event_type(s))
                    .map(NodeKind::Trigger),
                "conditionNode" => raw
                    .data
                    .get("condition")
                    .map(|s| NodeKind::Condition(ConditionKind::parse(s))),
                "actionNode" => raw
                    .data
                    .get("action")
                    .map(|s| NodeKind::Action(ActionKind::parse(s))),
                "aiDecisionNode" => Some(NodeKind::AiDecision),
                other => {
                    tracing::warn!(node = %raw.id, node_type = other, "skipping unknown node type");
                    None
                }
            };
            if let Some(kind) = kind {
                self.index.insert(raw.id.clone(), self.nodes.len());
                self.nodes.push(WorkflowNode {
                    id: raw.id.clone(),
                    kind,
                });
            }
        }

        for raw in raw_edges {
            let handle = match raw.source_handle.as_deref() {
                Some("yes") => Some(EdgeHandle::Yes),
                Some("no") => Some(EdgeHandle::No),
                _ => None,
            };
            self.edges.push(WorkflowEdge {
                source: raw.source.clone(),
                target: raw.target.clone(),
                handle,
            });
        }

        tracing::debug!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "rule graph replaced"
        );
        (self.nodes.len(), self.edges.len())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Collect the ordered action list this event triggers
    pub fn evaluate(&self, event: &EventRecord, robots: &[Robot]) -> Vec<WorkflowAction> {
        let mut actions = Vec::new();
        let mut visited = AHashSet::new();

        let triggers: Vec<&WorkflowNode> = self
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Trigger(t) if t == event.event_type))
            .collect();

        for trigger in triggers {
            self.visit(&trigger.id, event, robots, &mut actions, &mut visited);
        }
        actions
    }

    /// Depth-first walk; each node is visited at most once per evaluation,
    /// which also makes cyclic graphs safe
    fn visit(
        &self,
        node_id: &str,
        event: &EventRecord,
        robots: &[Robot],
        actions: &mut Vec<WorkflowAction>,
        visited: &mut AHashSet<String>,
    ) {
        if !visited.insert(node_id.to_string()) {
            return;
        }
        let Some(&idx) = self.index.get(node_id) else {
            return;
        };

        match &self.nodes[idx].kind {
            NodeKind::Trigger(_) => self.visit_all_edges(node_id, event, robots, actions, visited),
            NodeKind::Condition(kind) => {
                let result = evaluate_condition(kind, event, robots);
                for edge in self.edges.iter().filter(|e| e.source == node_id) {
                    // An unlabeled edge is the yes branch
                    let follow = match edge.handle {
                        Some(EdgeHandle::Yes) | None => result,
                        Some(EdgeHandle::No) => !result,
                    };
                    if follow {
                        self.visit(&edge.target, event, robots, actions, visited);
                    }
                }
            }
            NodeKind::Action(kind) => {
                actions.push(WorkflowAction {
                    kind: kind.clone(),
                    triggered_by: node_id.to_string(),
                });
                self.visit_all_edges(node_id, event, robots, actions, visited);
            }
            NodeKind::AiDecision => {
                actions.push(WorkflowAction {
                    kind: ActionKind::RequestAssist,
                    triggered_by: node_id.to_string(),
                });
                self.visit_all_edges(node_id, event, robots, actions, visited);
            }
        }
    }

    fn visit_all_edges(
        &self,
        node_id: &str,
        event: &EventRecord,
        robots: &[Robot],
        actions: &mut Vec<WorkflowAction>,
        visited: &mut AHashSet<String>,
    ) {
        for edge in self.edges.iter().filter(|e| e.source == node_id) {
            self.visit(&edge.target, event, robots, actions, visited);
        }
    }

    /// Whether evaluation asked for external reasoning
    pub fn needs_assist(actions: &[WorkflowAction]) -> bool {
        actions.iter().any(|a| a.kind == ActionKind::RequestAssist)
    }

    /// Interpret each action against the fleet, returning what was done
    pub fn execute_actions(
        &self,
        actions: &[WorkflowAction],
        event: &EventRecord,
        robots: &mut [Robot],
        grid: &WarehouseGrid,
        config: &SimulationConfig,
        now_ms: u64,
    ) -> Vec<String> {
        let mut results = Vec::new();

        for action in actions {
            match &action.kind {
                ActionKind::DispatchNearest => {
                    if let Some(i) = nearest_idle(robots, event.location, config) {
                        robots[i].navigate_to(grid, event.location, &[]);
                        results.push(format!(
                            "Workflow: {} dispatched to {}",
                            robots[i].id(),
                            event.location
                        ));
                    }
                }
                ActionKind::RechargeAll => {
                    for robot in robots.iter_mut() {
                        let already_recharging = robot.state() == RobotState::Charging
                            || robot
                                .current_task()
                                .is_some_and(|t| t.task_type == TaskType::Recharge);
                        if !already_recharging {
                            robot.force_recharge(grid, now_ms);
                            results.push(format!(
                                "Workflow: {} sent to charging station",
                                robot.id()
                            ));
                        }
                    }
                }
                ActionKind::RechargeNearest => {
                    if let Some(i) = nearest_idle(robots, CHARGE_DOCK, config) {
                        robots[i].force_recharge(grid, now_ms);
                        results.push(format!(
                            "Workflow: {} dispatched to charging zone",
                            robots[i].id()
                        ));
                    }
                }
                ActionKind::PauseAll => {
                    for robot in robots.iter_mut() {
                        if matches!(robot.state(), RobotState::Moving | RobotState::Working) {
                            robot.pause();
                            results.push(format!("Workflow: {} paused", robot.id()));
                        }
                    }
                }
                ActionKind::ResumeAll => {
                    for robot in robots.iter_mut() {
                        if robot.state() == RobotState::Paused {
                            robot.resume();
                            results.push(format!("Workflow: {} resumed", robot.id()));
                        }
                    }
                }
                ActionKind::QueueTask => {
                    results.push(format!(
                        "Workflow: task queued for event at {}",
                        event.location
                    ));
                }
                ActionKind::RequestAssist => {
                    results.push("Workflow: AI analysis requested".to_string());
                }
                ActionKind::LogAlert => {
                    results.push(format!(
                        "Workflow: alert logged for {} at {}",
                        event.event_type, event.location
                    ));
                }
                ActionKind::Unknown(name) => {
                    results.push(format!("Workflow: unknown action \"{name}\""));
                }
            }
        }

        results
    }
}

fn evaluate_condition(kind: &ConditionKind, event: &EventRecord, robots: &[Robot]) -> bool {
    match kind {
        ConditionKind::PriorityExceeds(n) => event.priority > *n,
        ConditionKind::IdleBatteryAbove(threshold) => robots
            .iter()
            .any(|r| r.state() == RobotState::Idle && r.battery() > *threshold),
        ConditionKind::HasIdleRobot => robots.iter().any(|r| r.state() == RobotState::Idle),
        ConditionKind::Unknown(_) => true,
    }
}

/// Nearest idle robot fit for dispatch (strictly above the battery floor,
/// queue headroom)
fn nearest_idle(robots: &[Robot], target: GridPos, config: &SimulationConfig) -> Option<usize> {
    robots
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            r.state() == RobotState::Idle
                && r.battery() > config.low_battery_threshold
                && r.queue_len() < config.task_queue_cap
        })
        .min_by_key(|(_, r)| r.position().manhattan(&target))
        .map(|(i, _)| i)
}

fn parse_event_type(raw: &str) -> Option<EventType> {
    match raw {
        "PACKAGE_DROP" => Some(EventType::PackageDrop),
        "SPILL" => Some(EventType::Spill),
        "HUMAN_ENTRY" => Some(EventType::HumanEntry),
        "CONGESTION" => Some(EventType::Congestion),
        "BATTERY_LOW" => Some(EventType::BatteryLow),
        _ => None,
    }
}

fn raw_node(id: &str, node_type: &str, data: &[(&str, &str)]) -> RawNode {
    RawNode {
        id: id.to_string(),
        node_type: node_type.to_string(),
        data: data
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn raw_edge(id: &str, source: &str, target: &str, handle: Option<&str>) -> RawEdge {
    RawEdge {
        id: id.to_string(),
        source: source.to_string(),
        target: target.to_string(),
        source_handle: handle.map(str::to_string),
    }
}
