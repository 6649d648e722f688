//! Engine loop
//!
//! One task owns the simulation: a `select!` over the fixed tick interval,
//! the serialized command inbox, and nothing else. External reasoning calls
//! are spawned so the ticker never waits on the network; their results come
//! back through the same inbox stamped with a generation, and stale ones
//! are dropped.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use crate::core::error::Result;
use crate::events::EventType;
use crate::llm::policy::{AssistPolicy, AssistRequest};
use crate::sim::command::SimCommand;
use crate::sim::{Notification, WarehouseSimulation};

/// Event types worth consulting the external collaborator about
const ASSIST_EVENT_TYPES: [EventType; 2] = [EventType::Spill, EventType::PackageDrop];

/// Run the engine until a `Shutdown` command or inbox closure
pub async fn run(
    mut sim: WarehouseSimulation,
    mut policy: AssistPolicy,
    mut commands: mpsc::Receiver<SimCommand>,
    command_tx: mpsc::Sender<SimCommand>,
    notify: broadcast::Sender<Notification>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(sim.config().tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(tick_ms = sim.config().tick_ms, "simulation loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                publish(&notify, sim.tick());
            }
            command = commands.recv() => {
                match command {
                    Some(SimCommand::Shutdown) | None => break,
                    Some(command) => {
                        handle_command(&mut sim, &mut policy, command, &command_tx, &notify);
                    }
                }
            }
        }
    }

    tracing::info!(tick = sim.current_tick(), "simulation loop stopped");
    Ok(())
}

/// Apply one external command between ticks
fn handle_command(
    sim: &mut WarehouseSimulation,
    policy: &mut AssistPolicy,
    command: SimCommand,
    command_tx: &mpsc::Sender<SimCommand>,
    notify: &broadcast::Sender<Notification>,
) {
    match command {
        SimCommand::Robot { robot_id, command } => {
            if !sim.send_robot_command(robot_id, command.clone()) {
                tracing::warn!(robot = %robot_id, ?command, "robot command rejected");
            }
        }
        SimCommand::TriggerEvent {
            event_type,
            location,
        } => {
            let (event, notes) = sim.trigger_manual_event(event_type, location);
            publish(notify, notes);

            let (outcome, notes) = sim.execute_workflow(&event);
            publish(notify, notes);

            // Consult the collaborator only for the event types it can
            // help with, and only when the rule graph asked for it or
            // produced nothing
            let eligible = ASSIST_EVENT_TYPES.contains(&event.event_type)
                && (outcome.needs_assist || outcome.actions.is_empty());
            if eligible {
                let state = sim.prompt_state();
                match policy.prepare(&state, &event) {
                    AssistRequest::Resolved(response) => {
                        publish(notify, sim.apply_assist_response(&response));
                        let _ = notify.send(Notification::AssistResponse(response));
                    }
                    AssistRequest::Call(pending) => {
                        // The call runs outside the tick loop; its result
                        // re-enters through the inbox with its stamp
                        let tx = command_tx.clone();
                        let generation = pending.generation();
                        tokio::spawn(async move {
                            let response = pending.run().await;
                            let _ = tx
                                .send(SimCommand::AssistResult {
                                    generation,
                                    response,
                                })
                                .await;
                        });
                    }
                }
            } else if !ASSIST_EVENT_TYPES.contains(&event.event_type) {
                let _ = notify.send(Notification::AssistSkipped {
                    event_type: event.event_type,
                });
            }
        }
        SimCommand::AssistResult {
            generation,
            response,
        } => {
            if policy.is_current(generation) {
                publish(notify, sim.apply_assist_response(&response));
                let _ = notify.send(Notification::AssistResponse(response));
            } else {
                tracing::debug!(generation, "stale assist response dropped");
            }
        }
        SimCommand::QueryState { reply } => {
            let _ = reply.send(sim.snapshot());
        }
        SimCommand::QueryLogs { limit, reply } => {
            let _ = reply.send(sim.logs(limit).to_vec());
        }
        SimCommand::ClearEvents => publish(notify, sim.clear_events()),
        SimCommand::SyncWorkflow { nodes, edges } => {
            publish(notify, sim.sync_workflow(&nodes, &edges));
        }
        SimCommand::SetSpeed { multiplier } => sim.set_speed(multiplier),
        SimCommand::ReplaceState(state) => sim.restore(*state),
        SimCommand::Shutdown => unreachable!("handled by the caller"),
    }
}

fn publish(notify: &broadcast::Sender<Notification>, notes: Vec<Notification>) {
    for note in notes {
        // A send only fails when nobody is subscribed, which is fine
        let _ = notify.send(note);
    }
}
