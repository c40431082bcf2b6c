//! Caption ingestion buffer.
//!
//! Accepts raw caption events in arrival order, drops re-deliveries, and keeps a bounded
//! window of recent lines: anything older than the matching window or beyond capacity
//! is discarded.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Inbound caption as delivered by the capture source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caption {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub speaker_label: Option<String>,
}

impl Caption {
    pub fn new(timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self { timestamp, text: text.into(), speaker_label: None }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker_label = Some(speaker.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedLine {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub speaker_label: Option<String>,
}

impl FeedLine {
    fn from_caption(caption: Caption) -> Option<Self> {
        let text = caption.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return None;
        }
        let speaker_label = caption
            .speaker_label
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty());

        Some(Self {
            id: line_id(&text, caption.timestamp, speaker_label.as_deref()),
            timestamp: caption.timestamp,
            text,
            speaker_label,
        })
    }

    /// `speaker: text`, falling back to a neutral label when the speaker is unknown.
    pub fn formatted(&self) -> String {
        format!("{}: {}", self.speaker_label.as_deref().unwrap_or("speaker"), self.text)
    }
}

fn line_id(text: &str, timestamp: DateTime<Utc>, speaker: Option<&str>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(text.as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(&timestamp.timestamp_millis().to_le_bytes());
    hasher.update(&[0x1f]);
    hasher.update(speaker.unwrap_or_default().as_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

#[derive(Clone, Debug)]
pub struct FeedBuffer {
    lines: VecDeque<FeedLine>,
    /// Ids of accepted lines still inside the window, including ones evicted by capacity.
    seen: HashMap<String, DateTime<Utc>>,
    capacity: usize,
    window: Duration,
    accepted: u64,
}

impl FeedBuffer {
    pub fn new(capacity: usize, window_secs: u64) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            seen: HashMap::new(),
            capacity: capacity.max(1),
            window: Duration::seconds(i64::try_from(window_secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000)),
            accepted: 0,
        }
    }

    /// Accepts a caption. Returns `None` for blank text, re-delivered lines, and lines
    /// already older than the matching window.
    pub fn push(&mut self, caption: Caption, now: DateTime<Utc>) -> Option<&FeedLine> {
        let line = FeedLine::from_caption(caption)?;
        if line.timestamp < self.cutoff(now) {
            return None;
        }
        if self.seen.contains_key(&line.id) {
            return None;
        }

        self.seen.insert(line.id.clone(), line.timestamp);
        self.lines.push_back(line);
        self.accepted += 1;
        self.prune(now);
        self.lines.back()
    }

    /// Drops lines older than the matching window and trims to capacity.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = self.cutoff(now);
        self.lines.retain(|line| line.timestamp >= cutoff);
        self.seen.retain(|_, timestamp| *timestamp >= cutoff);
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// Lines still inside the matching window, oldest first.
    pub fn window(&self, now: DateTime<Utc>) -> impl Iterator<Item = &FeedLine> {
        let cutoff = self.cutoff(now);
        self.lines.iter().filter(move |line| line.timestamp >= cutoff)
    }

    pub fn window_texts(&self, now: DateTime<Utc>) -> Vec<&str> {
        self.window(now).map(|line| line.text.as_str()).collect()
    }

    /// The last `count` retained lines, oldest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &FeedLine> {
        self.lines.iter().skip(self.lines.len().saturating_sub(count))
    }

    /// Monotonic count of accepted lines; survives pruning, reset by `clear`.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.seen.clear();
        self.accepted = 0;
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
