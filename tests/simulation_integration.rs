//! Integration tests for the simulation orchestrator
//!
//! These drive the whole engine through its public surface: manual events,
//! robot commands, the tick loop, and snapshot restore. Component-level
//! behavior is covered by unit tests next to each module.

use robofleet::core::config::SimulationConfig;
use robofleet::core::types::{GridPos, RobotId};
use robofleet::events::EventType;
use robofleet::grid::CHARGE_DOCK;
use robofleet::robot::{RobotData, RobotState};
use robofleet::sim::command::RobotCommand;
use robofleet::sim::{Notification, WarehouseSimulation};
use robofleet::tasks::{TaskStatus, TaskType};

fn sim() -> WarehouseSimulation {
    WarehouseSimulation::with_seed(SimulationConfig::default(), 42)
}

// ============================================================================
// Dispatch pipeline
// ============================================================================

/// A manual package drop flows through event -> task -> robot -> completion,
/// and the completion lands in the metrics counters.
#[test]
fn test_package_drop_end_to_end() {
    let mut sim = sim();
    let (_, notes) = sim.trigger_manual_event(EventType::PackageDrop, Some(GridPos::new(4, 2)));

    let assigned = notes.iter().find_map(|n| match n {
        Notification::TaskAssigned {
            robot_id,
            task_type,
            location,
            ..
        } => Some((*robot_id, *task_type, *location)),
        _ => None,
    });
    let (robot_id, task_type, location) = assigned.expect("an idle robot must take the task");
    assert_eq!(task_type, TaskType::Pickup);
    assert_eq!(location, GridPos::new(4, 2));

    // Drive the engine until that robot has fetched the package
    let mut completed = false;
    for _ in 0..300 {
        for note in sim.tick() {
            if let Notification::TaskCompleted { robot_id: done, .. } = note {
                if done == robot_id {
                    completed = true;
                }
            }
        }
        if completed {
            break;
        }
    }
    assert!(completed, "pickup should finish within the tick budget");
    assert!(sim.metrics().tasks_completed >= 1);
    assert!(sim.metrics().task_type_distribution.pickup >= 1);
    assert_eq!(sim.robot(robot_id).unwrap().position(), GridPos::new(4, 2));
}

/// A battery alert produces a recharge task aimed at the dock, wherever the
/// event itself was located.
#[test]
fn test_battery_low_event_routes_to_the_dock() {
    let mut sim = sim();
    let (_, notes) = sim.trigger_manual_event(EventType::BatteryLow, Some(GridPos::new(18, 2)));

    let assigned = notes.iter().find_map(|n| match n {
        Notification::TaskAssigned {
            task_type, location, ..
        } => Some((*task_type, *location)),
        _ => None,
    });
    let (task_type, location) = assigned.expect("recharge should be assigned");
    assert_eq!(task_type, TaskType::Recharge);
    assert_eq!(location, CHARGE_DOCK);
}

/// Low battery preempts mid-route: the active task is requeued at the front
/// as Pending and the robot redirects to the charging dock.
#[test]
fn test_low_battery_preempts_active_task() {
    let mut sim = sim();

    // Drain R1 close to the threshold, then send it far away
    let mut snapshot = sim.snapshot();
    robot_mut(&mut snapshot.robots, RobotId::R1).battery = 16.0;
    sim.restore(snapshot);
    sim.send_robot_command(
        RobotId::R1,
        RobotCommand::Move {
            destination: GridPos::new(19, 0),
        },
    );

    // Two ticks of travel cost one battery unit, crossing the threshold
    for _ in 0..8 {
        sim.tick();
    }

    let r1 = sim.robot(RobotId::R1).unwrap();
    let current = r1.current_task().expect("recharge task installed");
    assert_eq!(current.task_type, TaskType::Recharge);
    assert_eq!(r1.target(), Some(CHARGE_DOCK));
    assert_eq!(r1.state(), RobotState::Moving);
}

// ============================================================================
// Human safety
// ============================================================================

/// A human entry pauses nearby moving robots; when the worker's walk ends,
/// every paused robot resumes.
#[test]
fn test_human_entry_pauses_then_resumes_nearby_robots() {
    let mut sim = sim();

    // Put R3 in motion near the entry point so the pause can bite
    sim.send_robot_command(
        RobotId::R3,
        RobotCommand::Move {
            destination: GridPos::new(19, 7),
        },
    );
    let (_, notes) = sim.trigger_manual_event(EventType::HumanEntry, Some(GridPos::new(12, 8)));

    assert_eq!(sim.robot(RobotId::R3).unwrap().state(), RobotState::Paused);
    assert!(notes
        .iter()
        .any(|n| matches!(n, Notification::SafetyAlert { .. })));

    // The scripted walk is six tiles at ten ticks per step
    let mut resumed = false;
    for _ in 0..120 {
        for note in sim.tick() {
            if let Notification::SafetyAlert { message, .. } = note {
                if message.contains("resumed") {
                    resumed = true;
                }
            }
        }
        if resumed {
            break;
        }
    }
    assert!(resumed, "paused robots must resume when the worker leaves");
    assert_ne!(sim.robot(RobotId::R3).unwrap().state(), RobotState::Paused);
}

// ============================================================================
// Congestion
// ============================================================================

/// Two moving robots within the congestion radius: the second is rerouted
/// around the first robot's current tile.
#[test]
fn test_congestion_reroutes_the_second_robot() {
    let mut sim = sim();
    let mut snapshot = sim.snapshot();

    // R1 crosses (5,5) heading east; R2 sits one tile south heading north
    // straight through R1's tile
    place_moving(
        robot_mut(&mut snapshot.robots, RobotId::R1),
        GridPos::new(5, 5),
        &[GridPos::new(6, 5), GridPos::new(7, 5)],
    );
    place_moving(
        robot_mut(&mut snapshot.robots, RobotId::R2),
        GridPos::new(5, 6),
        &[
            GridPos::new(5, 5),
            GridPos::new(5, 4),
            GridPos::new(5, 3),
            GridPos::new(5, 2),
        ],
    );
    sim.restore(snapshot);

    sim.tick();

    let r2 = sim.robot(RobotId::R2).unwrap().to_data();
    assert!(
        !r2.path.contains(&GridPos::new(5, 5)),
        "rerouted path must avoid the congested tile"
    );
    assert_eq!(r2.path.last(), Some(&GridPos::new(5, 2)));
}

// ============================================================================
// Snapshot round-trip
// ============================================================================

/// Serialize the full state, deserialize it, replace a fresh engine's state
/// with it at a tick boundary, and get an identical snapshot back.
#[test]
fn test_snapshot_serde_restore_round_trip() {
    let mut sim = sim();
    sim.warm_start();
    sim.trigger_manual_event(EventType::Spill, Some(GridPos::new(9, 9)));
    for _ in 0..150 {
        sim.tick();
    }
    sim.trigger_manual_event(EventType::PackageDrop, None);
    for _ in 0..37 {
        sim.tick();
    }

    let original = sim.snapshot();
    let json = serde_json::to_string(&original).expect("snapshot serializes");
    let decoded = serde_json::from_str(&json).expect("snapshot deserializes");

    let mut replica = WarehouseSimulation::with_seed(SimulationConfig::default(), 7);
    replica.restore(decoded);
    assert_eq!(replica.snapshot(), original);
}

/// Clearing events with none active leaves the engine untouched.
#[test]
fn test_clear_events_is_idempotent() {
    let mut sim = sim();
    for _ in 0..10 {
        sim.tick();
    }
    let before = sim.snapshot();
    sim.clear_events();
    sim.clear_events();
    assert_eq!(sim.snapshot(), before);
}

// ============================================================================
// Invariants under load
// ============================================================================

/// Soak the engine and check the structural invariants hold at every tick:
/// batteries stay in range, idle robots carry no task, queues stay bounded.
#[test]
fn test_invariants_hold_over_a_long_run() {
    let mut sim = sim();
    sim.warm_start();
    sim.set_speed(4.0);

    for i in 0..2000 {
        if i % 250 == 0 {
            sim.trigger_manual_event(EventType::PackageDrop, None);
        }
        if i % 400 == 0 {
            sim.trigger_manual_event(EventType::Spill, None);
        }
        sim.tick();

        for robot in sim.robots() {
            assert!((0.0..=100.0).contains(&robot.battery()));
            if robot.state() == RobotState::Idle {
                assert!(robot.current_task().is_none());
            }
            // Cap plus at most one preemption-requeued task
            assert!(robot.queue_len() <= sim.config().task_queue_cap + 1);
            if let Some(task) = robot.current_task() {
                assert_eq!(task.status, TaskStatus::InProgress);
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn robot_mut(robots: &mut [RobotData], id: RobotId) -> &mut RobotData {
    robots.iter_mut().find(|r| r.id == id).unwrap()
}

fn place_moving(data: &mut RobotData, position: GridPos, path: &[GridPos]) {
    data.position = position;
    data.state = RobotState::Moving;
    data.path = path.to_vec();
    data.target_position = path.last().copied();
}
