//! Advisory request/response model.
//!
//! The advisory service is a best-effort language model. Its payload is parsed
//! leniently: anything that is not a usable JSON object collapses to the
//! "no suggestion" default for the current stage instead of surfacing an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use callcoach_core::config::CoachingConfig;
use callcoach_core::phase::{PhaseState, SpinPhase};
use callcoach_core::session::SessionContext;

pub const PAUSE: &str = "(pause)";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisoryRequest {
    pub stage: SpinPhase,
    pub transcript_window: Vec<String>,
    pub recap: String,
    pub deal_state: String,
    pub proof_pack: Vec<String>,
    pub stage_timers: PhaseState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// Size limits applied while building a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestLimits {
    pub transcript_lines: usize,
    pub transcript_char_cap: usize,
    pub recap_lines: usize,
    pub recap_char_cap: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self::from(&CoachingConfig::default())
    }
}

impl From<&CoachingConfig> for RequestLimits {
    fn from(config: &CoachingConfig) -> Self {
        Self {
            transcript_lines: config.transcript_lines,
            transcript_char_cap: config.transcript_char_cap,
            recap_lines: config.recap_lines,
            recap_char_cap: config.recap_char_cap,
        }
    }
}

impl AdvisoryRequest {
    pub fn from_session(
        session: &SessionContext,
        limits: &RequestLimits,
        now: DateTime<Utc>,
    ) -> Self {
        let transcript = session
            .feed()
            .recent(limits.transcript_lines)
            .map(|line| line.formatted())
            .collect::<Vec<_>>();
        let recap = session
            .feed()
            .recent(limits.recap_lines)
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let profile = session.profile();

        Self {
            stage: session.phase().current(),
            transcript_window: truncate_oldest(transcript, limits.transcript_char_cap),
            recap: tail_chars(&recap, limits.recap_char_cap),
            deal_state: profile.deal_state.clone(),
            proof_pack: profile.proof_points.clone(),
            stage_timers: session.phase().state().clone(),
            company: profile.company.clone(),
            industry: profile.industry.clone(),
            requested_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisoryResponse {
    #[serde(default)]
    pub stage: Option<SpinPhase>,
    pub say_next: String,
    #[serde(default)]
    pub coach_whisper: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
    #[serde(default)]
    pub meta: Value,
}

impl AdvisoryResponse {
    /// "No suggestion" for the given stage.
    pub fn fallback(stage: SpinPhase) -> Self {
        Self {
            stage: Some(stage),
            say_next: PAUSE.to_string(),
            coach_whisper: String::new(),
            confidence: 0.0,
            risk: None,
            meta: Value::Null,
        }
    }

    /// Parses a raw payload, tolerating code fences, snake_case keys, numeric strings
    /// and unknown stages. Confidence is always clamped into `[0, 1]`.
    pub fn parse(raw: &str, current: SpinPhase) -> Self {
        let Some(map) = json_object(raw) else {
            return Self::fallback(current);
        };
        let Some(say_next) = string_field(&map, &["sayNext", "say_next"]) else {
            return Self::fallback(current);
        };

        let stage = string_field(&map, &["stage"])
            .and_then(|stage| stage.parse::<SpinPhase>().ok())
            .or(Some(current));
        let confidence = map.get("confidence").and_then(number_value).unwrap_or(0.0);

        Self {
            stage,
            say_next,
            coach_whisper: string_field(&map, &["coachWhisper", "coach_whisper"])
                .unwrap_or_default(),
            confidence: clamp_confidence(confidence),
            risk: string_field(&map, &["risk"]).filter(|risk| !risk.is_empty()),
            meta: map.get("meta").cloned().unwrap_or(Value::Null),
        }
    }

    /// Replaces sub-threshold output with the pause marker and clears the whisper.
    pub fn gated(mut self, threshold: f64) -> Self {
        if !self.is_actionable(threshold) {
            self.say_next = PAUSE.to_string();
            self.coach_whisper.clear();
        }
        self
    }

    pub fn is_actionable(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }

    /// Card key named in `meta.cardKey` (or `meta.card`), if any.
    pub fn suggested_card(&self) -> Option<&str> {
        ["cardKey", "card_key", "card"]
            .iter()
            .find_map(|key| self.meta.get(key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn json_object(raw: &str) -> Option<Map<String, Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&raw[start..=end]).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(|value| value.trim().to_string())
}

fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Drops whole lines from the oldest end until the joined window fits `cap` chars.
/// A single oversized line keeps its newest `cap` chars.
pub fn truncate_oldest(mut lines: Vec<String>, cap: usize) -> Vec<String> {
    let joined_len = |lines: &[String]| {
        lines.iter().map(|line| line.chars().count()).sum::<usize>() + lines.len().saturating_sub(1)
    };

    while lines.len() > 1 && joined_len(&lines) > cap {
        lines.remove(0);
    }
    if let Some(only) = lines.first_mut() {
        if only.chars().count() > cap {
            *only = tail_chars(only, cap);
        }
    }
    lines
}

pub fn tail_chars(text: &str, cap: usize) -> String {
    let count = text.chars().count();
    if count <= cap {
        return text.to_string();
    }
    text.chars().skip(count - cap).collect::<String>().trim_start().to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use callcoach_core::battlecards::BattlecardLibrary;
    use callcoach_core::config::CoachingConfig;
    use callcoach_core::feed::Caption;
    use callcoach_core::phase::SpinPhase;
    use callcoach_core::session::{SessionContext, SessionProfile};

    use super::{
        tail_chars, truncate_oldest, AdvisoryRequest, AdvisoryResponse, RequestLimits, PAUSE,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid timestamp")
    }

    #[test]
    fn malformed_payload_becomes_pause_for_current_stage() {
        for raw in ["", "not json", "[1,2,3]", "{\"coachWhisper\": \"hi\"}", "{\"sayNext\": 7}"] {
            let response = AdvisoryResponse::parse(raw, SpinPhase::Problem);
            assert_eq!(response, AdvisoryResponse::fallback(SpinPhase::Problem), "payload: {raw}");
            assert_eq!(response.say_next, PAUSE);
        }
    }

    #[test]
    fn parses_fenced_payload_with_string_confidence() {
        let raw = "```json\n{\"stage\":\"implication\",\"sayNext\":\"Co to stojí měsíčně?\",\"coachWhisper\":\"zpomal\",\"confidence\":\"0.8\",\"meta\":{\"cardKey\":\"price\"}}\n```";
        let response = AdvisoryResponse::parse(raw, SpinPhase::Problem);

        assert_eq!(response.stage, Some(SpinPhase::Implication));
        assert_eq!(response.say_next, "Co to stojí měsíčně?");
        assert_eq!(response.coach_whisper, "zpomal");
        assert!((response.confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(response.suggested_card(), Some("price"));
    }

    #[test]
    fn confidence_is_clamped_into_unit_range() {
        let high = AdvisoryResponse::parse(r#"{"sayNext":"a","confidence":3.5}"#, SpinPhase::Situation);
        let low = AdvisoryResponse::parse(r#"{"sayNext":"a","confidence":-1}"#, SpinPhase::Situation);

        assert!((high.confidence - 1.0).abs() < f64::EPSILON);
        assert!(low.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn sub_threshold_confidence_pauses_and_clears_whisper() {
        for confidence in [0.0, 0.1, 0.2, 0.3, 0.349] {
            let raw = format!(
                r#"{{"sayNext":"Zeptej se na rozpočet","coachWhisper":"teď","confidence":{confidence}}}"#
            );
            let response = AdvisoryResponse::parse(&raw, SpinPhase::Situation).gated(0.35);
            assert_eq!(response.say_next, PAUSE);
            assert!(response.coach_whisper.is_empty());
        }

        let kept = AdvisoryResponse::parse(
            r#"{"sayNext":"Zeptej se na rozpočet","coachWhisper":"teď","confidence":0.35}"#,
            SpinPhase::Situation,
        )
        .gated(0.35);
        assert_eq!(kept.say_next, "Zeptej se na rozpočet");
        assert_eq!(kept.coach_whisper, "teď");
    }

    #[test]
    fn unknown_stage_keeps_current_phase() {
        let response =
            AdvisoryResponse::parse(r#"{"stage":"closing","sayNext":"ok"}"#, SpinPhase::Payoff);
        assert_eq!(response.stage, Some(SpinPhase::Payoff));
    }

    #[test]
    fn truncation_drops_oldest_lines_first() {
        let lines = vec!["a".repeat(10), "b".repeat(10), "c".repeat(10)];
        assert_eq!(truncate_oldest(lines.clone(), 21), vec!["b".repeat(10), "c".repeat(10)]);
        assert_eq!(truncate_oldest(lines.clone(), 100), lines);
        assert_eq!(truncate_oldest(vec!["abcdef".to_string()], 3), vec!["def".to_string()]);
        assert_eq!(tail_chars("příliš dlouhé", 6), "dlouhé");
    }

    #[test]
    fn request_carries_formatted_window_recap_and_profile() {
        let mut session =
            SessionContext::new(BattlecardLibrary::builtin(), &CoachingConfig::default());
        session.start(SessionProfile {
            deal_state: "pilot running".to_string(),
            proof_points: vec!["ISO 27001".to_string()],
            company: Some("Acme".to_string()),
            ..SessionProfile::default()
        });
        for index in 0..20 {
            let at = t0() + Duration::seconds(index);
            session
                .ingest(Caption::new(at, format!("věta {index}")).with_speaker("Zákazník"), at)
                .expect("live");
        }

        let limits = RequestLimits::default();
        let request = AdvisoryRequest::from_session(&session, &limits, t0() + Duration::seconds(20));

        assert_eq!(request.transcript_window.len(), 14);
        assert_eq!(request.transcript_window.first().map(String::as_str), Some("Zákazník: věta 6"));
        assert_eq!(request.recap, "věta 16 věta 17 věta 18 věta 19");
        assert_eq!(request.deal_state, "pilot running");
        assert_eq!(request.proof_pack, vec!["ISO 27001".to_string()]);
        assert_eq!(request.stage, SpinPhase::Situation);

        let wire = serde_json::to_value(&request).expect("serializable");
        assert!(wire.get("transcriptWindow").is_some());
        assert!(wire.get("stageTimers").is_some());
    }
}
