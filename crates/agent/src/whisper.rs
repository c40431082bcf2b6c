use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhisperPriority {
    Normal,
    High,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Whisper {
    pub text: String,
    pub priority: WhisperPriority,
    pub shown_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Single time-boxed coaching note. Showing a new note replaces the old one and
/// restarts the timer.
#[derive(Clone, Debug)]
pub struct WhisperSlot {
    ttl: Duration,
    current: Option<Whisper>,
}

impl WhisperSlot {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000)),
            current: None,
        }
    }

    pub fn show(
        &mut self,
        text: impl Into<String>,
        priority: WhisperPriority,
        now: DateTime<Utc>,
    ) -> &Whisper {
        self.current.insert(Whisper {
            text: text.into(),
            priority,
            shown_at: now,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        })
    }

    /// Removes the note once its time box has elapsed, returning it.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Option<Whisper> {
        if self.current.as_ref().is_some_and(|whisper| whisper.expires_at <= now) {
            return self.current.take();
        }
        None
    }

    pub fn current(&self, now: DateTime<Utc>) -> Option<&Whisper> {
        self.current.as_ref().filter(|whisper| whisper.expires_at > now)
    }

    pub fn clear(&mut self) -> Option<Whisper> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{WhisperPriority, WhisperSlot};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid timestamp")
    }

    #[test]
    fn whisper_expires_after_time_box() {
        let mut slot = WhisperSlot::new(8);
        slot.show("zeptej se na termín", WhisperPriority::Normal, t0());

        assert!(slot.current(t0() + Duration::seconds(7)).is_some());
        assert!(slot.expire(t0() + Duration::seconds(7)).is_none());
        let expired = slot.expire(t0() + Duration::seconds(8)).expect("expired whisper");
        assert_eq!(expired.text, "zeptej se na termín");
        assert!(slot.current(t0() + Duration::seconds(8)).is_none());
    }

    #[test]
    fn new_whisper_preempts_and_restarts_timer() {
        let mut slot = WhisperSlot::new(8);
        slot.show("první", WhisperPriority::Normal, t0());
        slot.show("druhá", WhisperPriority::High, t0() + Duration::seconds(6));

        let visible = slot.current(t0() + Duration::seconds(10)).expect("second still visible");
        assert_eq!(visible.text, "druhá");
        assert_eq!(visible.priority, WhisperPriority::High);
        assert!(slot.expire(t0() + Duration::seconds(13)).is_none());
        assert!(slot.expire(t0() + Duration::seconds(14)).is_some());
    }

    #[test]
    fn oversized_time_box_never_expires() {
        let mut slot = WhisperSlot::new(u64::MAX);
        let shown = slot.show("drž se tématu", WhisperPriority::Normal, t0());
        assert_eq!(shown.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(slot.expire(t0() + Duration::days(365)).is_none());
    }
}
