// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn event_type_round_trips_through_str() {
    for t in [
        HealthEventType::StuckDispatch,
        HealthEventType::SessionDisappeared,
        HealthEventType::UnknownExitState,
        HealthEventType::DispatchFailed,
        HealthEventType::GatewayCritical,
        HealthEventType::GatewayRestartSuccess,
        HealthEventType::BeadChurnBlocked,
    ] {
        let parsed: HealthEventType = t.as_str().parse().unwrap();
        assert_eq!(parsed, t);
    }
}

#[test]
fn scheduler_state_round_trips() {
    for s in [SchedulerRunState::Running, SchedulerRunState::Paused] {
        let parsed: SchedulerRunState = s.as_str().parse().unwrap();
        assert_eq!(parsed, s);
    }
}

#[test]
fn serde_matches_wire_vocabulary() {
    let json = serde_json::to_string(&HealthEventType::SessionDisappeared).unwrap();
    assert_eq!(json, "\"session_disappeared\"");
    let json = serde_json::to_string(&SchedulerRunState::Paused).unwrap();
    assert_eq!(json, "\"paused\"");
}
