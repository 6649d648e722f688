//! Integration tests for the workflow engine and the AI-assist policy
//! running against a live simulation.

use robofleet::core::config::SimulationConfig;
use robofleet::core::types::{GridPos, RobotId};
use robofleet::events::EventType;
use robofleet::llm::{AssistPolicy, AssistRequest, LlmClient};
use robofleet::robot::RobotState;
use robofleet::sim::{Notification, WarehouseSimulation};
use robofleet::tasks::TaskType;
use robofleet::workflow::{RawEdge, RawNode};

fn sim() -> WarehouseSimulation {
    WarehouseSimulation::with_seed(SimulationConfig::default(), 42)
}

// ============================================================================
// Workflow over live fleet state
// ============================================================================

/// The stock spill workflow requests AI assist; the fallback policy then
/// produces a deterministic assignment that the engine applies.
#[tokio::test]
async fn test_spill_pipeline_with_fallback_assist() {
    let mut sim = sim();
    let config = SimulationConfig::default();
    let mut policy = AssistPolicy::new(None, &config);

    let (event, _) = sim.trigger_manual_event(EventType::Spill, Some(GridPos::new(9, 9)));
    let (outcome, _) = sim.execute_workflow(&event);
    assert!(outcome.needs_assist, "stock spill workflow asks for AI");

    let state = sim.prompt_state();
    let response = policy.analyze(&state, &event).await;
    assert!(response.fallback);
    assert_eq!(response.assignments.len(), 1);
    assert_eq!(response.assignments[0].task_type, TaskType::Clean);
    assert_eq!(response.assignments[0].target_location, GridPos::new(9, 9));

    let notes = sim.apply_assist_response(&response);
    let applied = notes.iter().any(|n| {
        matches!(
            n,
            Notification::TaskAssigned {
                task_type: TaskType::Clean,
                ..
            }
        )
    });
    assert!(applied, "fallback assignment must reach a robot");
}

/// Replacing the rule graph changes dispatch behavior at the next event:
/// a graph that pauses on package drops takes effect immediately.
#[test]
fn test_workflow_replacement_changes_behavior() {
    let mut sim = sim();

    let nodes = vec![
        RawNode {
            id: "t".into(),
            node_type: "triggerNode".into(),
            data: [("eventType".to_string(), "PACKAGE_DROP".to_string())]
                .into_iter()
                .collect(),
        },
        RawNode {
            id: "a".into(),
            node_type: "actionNode".into(),
            data: [("action".to_string(), "pause_all".to_string())]
                .into_iter()
                .collect(),
        },
    ];
    let edges = vec![RawEdge {
        id: "e".into(),
        source: "t".into(),
        target: "a".into(),
        source_handle: None,
    }];
    let notes = sim.sync_workflow(&nodes, &edges);
    assert!(matches!(
        notes[0],
        Notification::WorkflowUpdated {
            node_count: 2,
            edge_count: 1
        }
    ));

    // Put a robot in motion, then drop a package: the new graph pauses it
    sim.send_robot_command(
        RobotId::R1,
        robofleet::sim::command::RobotCommand::Move {
            destination: GridPos::new(9, 1),
        },
    );
    let (event, _) = sim.trigger_manual_event(EventType::PackageDrop, Some(GridPos::new(4, 12)));
    let (outcome, _) = sim.execute_workflow(&event);

    assert!(!outcome.needs_assist);
    assert!(outcome.results.iter().any(|r| r.contains("paused")));
    assert_eq!(sim.robot(RobotId::R1).unwrap().state(), RobotState::Paused);
}

// ============================================================================
// Debounce and staleness
// ============================================================================

/// Two invocations inside the debounce window: the second never reaches the
/// collaborator and comes back flagged as a fallback.
#[tokio::test]
async fn test_debounced_second_call_is_fallback() {
    let mut sim = sim();
    let config = SimulationConfig::default();
    // A configured client that must NOT be contacted on the second call
    let client = LlmClient::new("key".into(), "https://api.example.com".into(), "m".into());
    let mut policy = AssistPolicy::new(Some(client), &config);

    let (event, _) = sim.trigger_manual_event(EventType::PackageDrop, Some(GridPos::new(10, 7)));
    let state = sim.prompt_state();

    let first = policy.prepare(&state, &event);
    assert!(matches!(first, AssistRequest::Call(_)));

    let second = policy.prepare(&state, &event);
    let AssistRequest::Resolved(response) = second else {
        panic!("second invocation within the window must resolve locally");
    };
    assert!(response.fallback);
    assert_eq!(response.assignments.len(), 1);
}

/// A response from an abandoned call is stale once a newer request has been
/// issued, and the engine must drop it.
#[test]
fn test_stale_assist_response_is_detected() {
    let mut sim = sim();
    let config = SimulationConfig {
        assist_debounce_ms: 0,
        ..Default::default()
    };
    let client = LlmClient::new("key".into(), "https://api.example.com".into(), "m".into());
    let mut policy = AssistPolicy::new(Some(client), &config);

    let (event, _) = sim.trigger_manual_event(EventType::Spill, Some(GridPos::new(9, 9)));
    let state = sim.prompt_state();

    let AssistRequest::Call(old) = policy.prepare(&state, &event) else {
        panic!("expected a call")
    };
    let AssistRequest::Call(new) = policy.prepare(&state, &event) else {
        panic!("expected a call")
    };

    assert!(!policy.is_current(old.generation()));
    assert!(policy.is_current(new.generation()));
}

// ============================================================================
// Fallback determinism
// ============================================================================

/// With identical fleet state the fallback picks the same robot every time.
#[test]
fn test_fallback_is_deterministic() {
    let sim = sim();
    let state = sim.prompt_state();
    let first =
        AssistPolicy::fallback_assignment(&state, EventType::PackageDrop, GridPos::new(10, 7));
    let second =
        AssistPolicy::fallback_assignment(&state, EventType::PackageDrop, GridPos::new(10, 7));
    assert_eq!(first.assignments, second.assignments);
    assert!(first.fallback && second.fallback);
    // R3 at (12,7) is the nearest idle robot to (10,7)
    assert_eq!(first.assignments[0].robot_id, RobotId::R3);
}
