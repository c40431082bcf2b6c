//! Capture ingress and overlay control routes.
//!
//! The capture bridge posts caption and liveness messages; anything from an unexpected
//! origin or in an unexpected shape is acknowledged and dropped. Operator actions go
//! through the coach runtime and answer with the refreshed snapshot.

use axum::{
    extract::{Path, State},
    http::{header::ORIGIN, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use callcoach_agent::runtime::{CoachEvent, CoachHandle, CoachSnapshot};
use callcoach_core::battlecards::Battlecard;
use callcoach_core::errors::{ApplicationError, DomainError, InterfaceError};
use callcoach_core::feed::Caption;
use callcoach_core::phase::SpinPhase;
use callcoach_core::session::SessionProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct CaptureState {
    coach: CoachHandle,
    allowed_origin: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureAck {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPhaseRequest {
    pub phase: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum CaptureMessage {
    #[serde(rename_all = "camelCase")]
    Caption {
        timestamp: WireTimestamp,
        text: String,
        #[serde(default)]
        speaker_label: Option<String>,
    },
    BridgeReady {
        timestamp: WireTimestamp,
    },
}

/// Bridges send either epoch milliseconds or RFC 3339.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(i64),
    Rfc3339(DateTime<Utc>),
}

impl WireTimestamp {
    fn resolve(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(millis) => DateTime::from_timestamp_millis(millis),
            Self::Rfc3339(at) => Some(at),
        }
    }
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn router(coach: CoachHandle, allowed_origin: Option<String>) -> Router {
    Router::new()
        .route("/capture", post(capture))
        .route("/session/start", post(start_session))
        .route("/session/end", post(end_session))
        .route("/session/pause", post(pause_session))
        .route("/session/resume", post(resume_session))
        .route("/session/phase", post(set_phase))
        .route("/cards/augment", post(augment_cards))
        .route("/cards/{key}/use", post(use_card))
        .route("/cards/{key}/dismiss", post(dismiss_card))
        .route("/state", get(state_snapshot))
        .with_state(CaptureState { coach, allowed_origin })
}

pub async fn capture(
    State(state): State<CaptureState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> ApiResult<(StatusCode, Json<CaptureAck>)> {
    if !origin_allowed(&headers, state.allowed_origin.as_deref()) {
        debug!(
            event_name = "ingress.capture.ignored",
            reason = "unexpected_origin",
            origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok()).unwrap_or("none"),
            "capture message ignored"
        );
        return Ok(ignored("unexpected_origin"));
    }

    let message = match serde_json::from_value::<CaptureMessage>(payload) {
        Ok(message) => message,
        Err(error) => {
            debug!(
                event_name = "ingress.capture.ignored",
                reason = "unrecognized_shape",
                error = %error,
                "capture message ignored"
            );
            return Ok(ignored("unrecognized_shape"));
        }
    };

    let event = match message {
        CaptureMessage::Caption { timestamp, text, speaker_label } => {
            let Some(timestamp) = timestamp.resolve() else {
                return Ok(ignored("invalid_timestamp"));
            };
            CoachEvent::Caption(Caption { timestamp, text, speaker_label })
        }
        CaptureMessage::BridgeReady { timestamp } => {
            CoachEvent::BridgeReady { timestamp: timestamp.resolve().unwrap_or_else(Utc::now) }
        }
    };

    state.coach.try_send(event).map_err(|error| {
        warn!(
            event_name = "ingress.capture.rejected",
            error = %error,
            "capture message could not be queued"
        );
        api_error(error, &state.coach)
    })?;

    Ok((StatusCode::ACCEPTED, Json(CaptureAck { accepted: true, reason: None })))
}

pub async fn start_session(
    State(state): State<CaptureState>,
    Json(profile): Json<SessionProfile>,
) -> ApiResult<Json<CoachSnapshot>> {
    dispatch(&state, CoachEvent::StartSession { profile }).await
}

pub async fn end_session(State(state): State<CaptureState>) -> ApiResult<Json<CoachSnapshot>> {
    dispatch(&state, CoachEvent::EndSession).await
}

pub async fn pause_session(State(state): State<CaptureState>) -> ApiResult<Json<CoachSnapshot>> {
    dispatch(&state, CoachEvent::Pause).await
}

pub async fn resume_session(State(state): State<CaptureState>) -> ApiResult<Json<CoachSnapshot>> {
    dispatch(&state, CoachEvent::Resume).await
}

pub async fn set_phase(
    State(state): State<CaptureState>,
    Json(request): Json<SetPhaseRequest>,
) -> ApiResult<Json<CoachSnapshot>> {
    let phase = request
        .phase
        .parse::<SpinPhase>()
        .map_err(|error| api_error(DomainError::from(error).into(), &state.coach))?;
    dispatch(&state, CoachEvent::SetPhase { phase }).await
}

pub async fn use_card(
    State(state): State<CaptureState>,
    Path(key): Path<String>,
) -> ApiResult<Json<CoachSnapshot>> {
    dispatch(&state, CoachEvent::UseCard { key }).await
}

pub async fn dismiss_card(
    State(state): State<CaptureState>,
    Path(key): Path<String>,
) -> ApiResult<Json<CoachSnapshot>> {
    dispatch(&state, CoachEvent::DismissCard { key }).await
}

pub async fn augment_cards(
    State(state): State<CaptureState>,
    Json(cards): Json<Vec<Battlecard>>,
) -> ApiResult<Json<CoachSnapshot>> {
    dispatch(&state, CoachEvent::AugmentLibrary { cards }).await
}

pub async fn state_snapshot(State(state): State<CaptureState>) -> Json<CoachSnapshot> {
    Json(state.coach.snapshot())
}

async fn dispatch(state: &CaptureState, event: CoachEvent) -> ApiResult<Json<CoachSnapshot>> {
    state.coach.request(event).await.map_err(|error| api_error(error, &state.coach))?;
    Ok(Json(state.coach.snapshot()))
}

fn origin_allowed(headers: &HeaderMap, allowed: Option<&str>) -> bool {
    let Some(allowed) = allowed else {
        return true;
    };
    headers
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|origin| origin.trim_end_matches('/') == allowed.trim_end_matches('/'))
}

fn ignored(reason: &'static str) -> (StatusCode, Json<CaptureAck>) {
    (StatusCode::ACCEPTED, Json(CaptureAck { accepted: false, reason: Some(reason) }))
}

fn api_error(error: ApplicationError, coach: &CoachHandle) -> (StatusCode, Json<ApiError>) {
    let correlation_id = coach.snapshot().session_id.unwrap_or_else(|| "none".to_string());
    let interface = error.into_interface(correlation_id);
    let (status, detail, correlation_id) = match &interface {
        InterfaceError::BadRequest { message, correlation_id } => {
            (StatusCode::BAD_REQUEST, message.clone(), correlation_id.clone())
        }
        InterfaceError::ServiceUnavailable { message, correlation_id } => {
            (StatusCode::SERVICE_UNAVAILABLE, message.clone(), correlation_id.clone())
        }
        InterfaceError::Internal { message, correlation_id } => {
            (StatusCode::INTERNAL_SERVER_ERROR, message.clone(), correlation_id.clone())
        }
    };

    (status, Json(ApiError { error: interface.user_message(), detail, correlation_id }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        extract::State,
        http::{header::ORIGIN, HeaderMap, HeaderValue, Request, StatusCode},
        Json,
    };
    use callcoach_agent::llm::DisabledAdvisoryClient;
    use callcoach_agent::runtime::{CoachEvent, CoachHandle, CoachRuntime, SystemClock};
    use callcoach_core::battlecards::BattlecardLibrary;
    use callcoach_core::config::CoachingConfig;
    use callcoach_core::session::SessionProfile;
    use chrono::Utc;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::capture::{capture, router, CaptureState};

    fn coach() -> CoachHandle {
        let (runtime, coach) = CoachRuntime::new(
            BattlecardLibrary::builtin(),
            &CoachingConfig::default(),
            Arc::new(DisabledAdvisoryClient),
            Arc::new(SystemClock),
            16,
        );
        runtime.spawn();
        coach
    }

    fn state(coach: CoachHandle, allowed_origin: Option<&str>) -> State<CaptureState> {
        State(CaptureState { coach, allowed_origin: allowed_origin.map(str::to_string) })
    }

    fn origin(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static(value));
        headers
    }

    #[tokio::test]
    async fn caption_from_allowed_origin_reaches_runtime() {
        let coach = coach();
        coach
            .request(CoachEvent::StartSession { profile: SessionProfile::default() })
            .await
            .expect("session starts");

        let (status, Json(ack)) = capture(
            state(coach.clone(), Some("https://meet.example.com")),
            origin("https://meet.example.com/"),
            Json(json!({
                "type": "caption",
                "timestamp": Utc::now().timestamp_millis(),
                "text": "No, máme na to rozpočet problém",
                "speakerLabel": "Zákazník"
            })),
        )
        .await
        .expect("caption queued");
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(ack.accepted);

        coach.request(CoachEvent::Tick).await.expect("flush");
        let snapshot = coach.snapshot();
        assert_eq!(snapshot.feed_lines, 1);
        assert_eq!(snapshot.active_card.map(|card| card.card), Some("price".to_string()));
    }

    #[tokio::test]
    async fn unexpected_origin_or_shape_is_ignored() {
        let coach = coach();

        let (_, Json(ack)) = capture(
            state(coach.clone(), Some("https://meet.example.com")),
            origin("https://evil.example.com"),
            Json(json!({"type": "caption", "timestamp": 0, "text": "drahé"})),
        )
        .await
        .expect("acknowledged");
        assert_eq!(ack.reason, Some("unexpected_origin"));

        let (_, Json(ack)) = capture(
            state(coach.clone(), None),
            HeaderMap::new(),
            Json(json!({"type": "reaction", "emoji": "👍"})),
        )
        .await
        .expect("acknowledged");
        assert!(!ack.accepted);
        assert_eq!(ack.reason, Some("unrecognized_shape"));
    }

    #[tokio::test]
    async fn bridge_ready_is_recorded() {
        let coach = coach();
        capture(
            state(coach.clone(), None),
            HeaderMap::new(),
            Json(json!({"type": "bridge-ready", "timestamp": "2026-03-02T09:00:00Z"})),
        )
        .await
        .expect("queued");

        coach.request(CoachEvent::Tick).await.expect("flush");
        assert!(coach.snapshot().bridge_seen_at.is_some());
    }

    #[tokio::test]
    async fn operator_routes_drive_session_and_report_errors() {
        let app = router(coach(), None);

        let response = app
            .clone()
            .oneshot(
                Request::post("/session/start")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"dealState":"pilot","proofPoints":["ISO 27001"]}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        let snapshot: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(snapshot["status"], json!("live"));

        let response = app
            .clone()
            .oneshot(
                Request::post("/session/phase")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"phase":"need-payoff"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(Request::post("/cards/ghost/use").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        let error: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert!(error["detail"].as_str().is_some_and(|detail| detail.contains("ghost")));

        let response = app
            .oneshot(Request::get("/state").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        let snapshot: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(snapshot["phase"]["currentPhase"], json!("payoff"));
        assert_eq!(snapshot["status"], json!("live"));
    }
}
