// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health events and scheduler run state

use serde::{Deserialize, Serialize};

/// Closed vocabulary of health observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthEventType {
    StuckDispatch,
    SessionDisappeared,
    UnknownExitState,
    DispatchFailed,
    GatewayCritical,
    GatewayRestartSuccess,
    BeadChurnBlocked,
}

impl HealthEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthEventType::StuckDispatch => "stuck_dispatch",
            HealthEventType::SessionDisappeared => "session_disappeared",
            HealthEventType::UnknownExitState => "unknown_exit_state",
            HealthEventType::DispatchFailed => "dispatch_failed",
            HealthEventType::GatewayCritical => "gateway_critical",
            HealthEventType::GatewayRestartSuccess => "gateway_restart_success",
            HealthEventType::BeadChurnBlocked => "bead_churn_blocked",
        }
    }
}

impl std::str::FromStr for HealthEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stuck_dispatch" => Ok(HealthEventType::StuckDispatch),
            "session_disappeared" => Ok(HealthEventType::SessionDisappeared),
            "unknown_exit_state" => Ok(HealthEventType::UnknownExitState),
            "dispatch_failed" => Ok(HealthEventType::DispatchFailed),
            "gateway_critical" => Ok(HealthEventType::GatewayCritical),
            "gateway_restart_success" => Ok(HealthEventType::GatewayRestartSuccess),
            "bead_churn_blocked" => Ok(HealthEventType::BeadChurnBlocked),
            other => Err(format!("unknown health event type: {}", other)),
        }
    }
}

/// Structured observation emitted by the reaper, backends, or control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEvent {
    pub id: i64,
    pub event_type: HealthEventType,
    /// Associated dispatch id; `0` for global events.
    pub dispatch_id: i64,
    pub message: String,
    pub created_at_ms: i64,
}

/// Persisted scheduler run state. Read on every tick, mutated only through
/// the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerRunState {
    Running,
    Paused,
}

impl SchedulerRunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerRunState::Running => "running",
            SchedulerRunState::Paused => "paused",
        }
    }
}

impl std::str::FromStr for SchedulerRunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SchedulerRunState::Running),
            "paused" => Ok(SchedulerRunState::Paused),
            other => Err(format!("unknown scheduler state: {}", other)),
        }
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
