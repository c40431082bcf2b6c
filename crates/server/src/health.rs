use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use callcoach_agent::orchestrator::AdvisoryStatus;
use callcoach_agent::runtime::CoachHandle;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    coach: CoachHandle,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub bridge: HealthCheck,
    pub advisory: HealthCheck,
    pub checked_at: String,
}

pub fn router(coach: CoachHandle) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { coach })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let now = Utc::now();
    let running = state.coach.is_running();
    let snapshot = state.coach.snapshot();

    let service = if running {
        HealthCheck { status: "ready", detail: "coach runtime accepting events".to_string() }
    } else {
        HealthCheck { status: "unavailable", detail: "coach runtime has stopped".to_string() }
    };
    let advisory = advisory_check(&snapshot.advisory, now);
    let status = match (running, advisory.status) {
        (false, _) => "unavailable",
        (true, "degraded") => "degraded",
        (true, _) => "ready",
    };

    let payload = HealthResponse {
        status,
        service,
        bridge: bridge_check(snapshot.bridge_seen_at, now),
        advisory,
        checked_at: now.to_rfc3339(),
    };

    let status_code = if running { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn bridge_check(seen_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> HealthCheck {
    match seen_at {
        Some(seen_at) => HealthCheck {
            status: "ready",
            detail: format!(
                "last bridge-ready {}s ago",
                (now - seen_at).num_seconds().max(0)
            ),
        },
        None => {
            HealthCheck { status: "waiting", detail: "no bridge-ready received yet".to_string() }
        }
    }
}

fn advisory_check(status: &AdvisoryStatus, now: DateTime<Utc>) -> HealthCheck {
    match status {
        AdvisoryStatus::Disabled => {
            HealthCheck { status: "disabled", detail: "advisory service not configured".to_string() }
        }
        AdvisoryStatus::Idle => {
            HealthCheck { status: "ready", detail: "no advisory call made yet".to_string() }
        }
        AdvisoryStatus::Ok { at, confidence } => HealthCheck {
            status: "ready",
            detail: format!(
                "last call succeeded {}s ago (confidence {confidence:.2})",
                (now - *at).num_seconds().max(0)
            ),
        },
        AdvisoryStatus::Unavailable { at, reason } => HealthCheck {
            status: "degraded",
            detail: format!("last call failed {}s ago: {reason}", (now - *at).num_seconds().max(0)),
        },
    }
}
