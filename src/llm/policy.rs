//! AI-assist fallback policy
//!
//! Owns the debounce window, the hard timeout, and the generation stamp
//! that protects the engine from late responses. All state is instance
//! fields so multiple simulations can coexist in tests.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::config::SimulationConfig;
use crate::core::types::{GridPos, RobotId};
use crate::events::{EventRecord, EventType};
use crate::llm::client::LlmClient;
use crate::llm::context::{build_prompt, build_system_prompt, PromptState};
use crate::llm::parser::parse_assist_response;
use crate::robot::RobotState;
use crate::tasks::TaskType;

/// Battery floor for the deterministic fallback (strict)
const FALLBACK_BATTERY_FLOOR: f32 = 20.0;

/// Queue headroom limit for the deterministic fallback
const FALLBACK_QUEUE_CAP: usize = 3;

/// One robot assignment from the collaborator (or the fallback)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistAssignment {
    pub robot_id: RobotId,
    pub task_type: TaskType,
    pub priority: i32,
    pub target_location: GridPos,
    pub reason: String,
}

/// Full decision payload
///
/// `fallback` distinguishes deterministic decisions from AI-sourced ones
/// for observers; `latency_ms` is only present on live responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistResponse {
    pub reasoning: String,
    #[serde(default)]
    pub assignments: Vec<AssistAssignment>,
    #[serde(default)]
    pub alerts: Vec<String>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub fallback: bool,
}

/// Outcome of `AssistPolicy::prepare`
pub enum AssistRequest {
    /// Decision available now (debounced, or no collaborator configured)
    Resolved(AssistResponse),
    /// An external call should be made; run it outside the tick loop
    Call(PendingCall),
}

/// A prepared external call, self-contained so it can be spawned
pub struct PendingCall {
    generation: u64,
    client: LlmClient,
    system: String,
    user: String,
    timeout: Duration,
    fallback: AssistResponse,
}

impl PendingCall {
    /// Stamp to check against the policy when the response lands
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Race the collaborator against the timeout; degrade locally on any
    /// failure. Never returns an error.
    pub async fn run(self) -> AssistResponse {
        let started = Instant::now();
        let call = self.client.complete(&self.system, &self.user);

        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => parse_assist_response(&text),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(crate::core::error::SimError::AssistError(format!(
                "reasoning call timed out after {:?}",
                self.timeout
            ))),
        };

        match outcome {
            Ok(mut response) => {
                response.latency_ms = Some(started.elapsed().as_millis() as u64);
                response.fallback = false;
                response
            }
            Err(e) => {
                tracing::warn!(error = %e, "assist call failed, using fallback");
                let mut fb = self.fallback;
                fb.reasoning = format!("AI unavailable, using fallback logic. Error: {e}");
                fb
            }
        }
    }
}

/// Debounce + timeout + fallback policy around the reasoning collaborator
#[derive(Debug)]
pub struct AssistPolicy {
    client: Option<LlmClient>,
    debounce: Duration,
    timeout: Duration,
    last_call: Option<Instant>,
    generation: u64,
}

impl AssistPolicy {
    pub fn new(client: Option<LlmClient>, config: &SimulationConfig) -> Self {
        Self {
            client,
            debounce: Duration::from_millis(config.assist_debounce_ms),
            timeout: Duration::from_millis(config.assist_timeout_ms),
            last_call: None,
            generation: 0,
        }
    }

    /// Policy with whatever the environment provides; fallback-only when
    /// no API key is configured
    pub fn from_env(config: &SimulationConfig) -> Self {
        let client = LlmClient::from_env().ok();
        if client.is_none() {
            tracing::warn!("ASSIST_API_KEY not set, assist runs fallback-only");
        }
        Self::new(client, config)
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Whether a response stamped with `generation` is still the newest
    /// outstanding request; stale responses must be dropped
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Decide how to handle one event: immediate deterministic answer, or
    /// a prepared external call for the caller to spawn
    pub fn prepare(&mut self, state: &PromptState, event: &EventRecord) -> AssistRequest {
        let now = Instant::now();
        if let Some(last) = self.last_call {
            if now.duration_since(last) < self.debounce {
                tracing::debug!(event = %event.event_type, "assist debounced");
                return AssistRequest::Resolved(Self::fallback_assignment(
                    state,
                    event.event_type,
                    event.location,
                ));
            }
        }
        self.last_call = Some(now);

        let Some(client) = self.client.clone() else {
            return AssistRequest::Resolved(Self::fallback_assignment(
                state,
                event.event_type,
                event.location,
            ));
        };

        self.generation += 1;
        AssistRequest::Call(PendingCall {
            generation: self.generation,
            client,
            system: build_system_prompt(),
            user: build_prompt(state, event),
            timeout: self.timeout,
            fallback: Self::fallback_assignment(state, event.event_type, event.location),
        })
    }

    /// Prepare and run inline; used where blocking on the result is fine
    pub async fn analyze(&mut self, state: &PromptState, event: &EventRecord) -> AssistResponse {
        match self.prepare(state, event) {
            AssistRequest::Resolved(response) => response,
            AssistRequest::Call(pending) => pending.run().await,
        }
    }

    /// Deterministic nearest-available assignment
    ///
    /// Same heuristic the prompt instructs the collaborator to follow:
    /// nearest robot that is idle or charging, battery above 20, queue
    /// under 3. Flagged as a fallback so observers can tell the source.
    pub fn fallback_assignment(
        state: &PromptState,
        event_type: EventType,
        location: GridPos,
    ) -> AssistResponse {
        let task_type = TaskType::for_event(event_type);

        let chosen = state
            .robots
            .iter()
            .filter(|r| {
                matches!(r.state, RobotState::Idle | RobotState::Charging)
                    && r.battery > FALLBACK_BATTERY_FLOOR
                    && r.queue_length < FALLBACK_QUEUE_CAP
            })
            .min_by_key(|r| r.position.manhattan(&location));

        let Some(chosen) = chosen else {
            return AssistResponse {
                reasoning: "No available robots. All robots are busy or have low battery. Task queued.".into(),
                assignments: vec![],
                alerts: vec!["All robots occupied, task may be delayed".into()],
                latency_ms: None,
                fallback: true,
            };
        };

        AssistResponse {
            reasoning: format!(
                "Fallback logic: assigned nearest available robot {} (distance: {} tiles, battery: {}%)",
                chosen.id,
                chosen.position.manhattan(&location),
                chosen.battery.round()
            ),
            assignments: vec![AssistAssignment {
                robot_id: chosen.id,
                task_type,
                priority: event_type.priority(),
                target_location: location,
                reason: "Nearest available robot with sufficient battery".into(),
            }],
            alerts: vec![],
            latency_ms: None,
            fallback: true,
        }
    }
}
