//! Thread data model — schedules and content blocks.
//!
//! A thread is a user-authored recurring content-gathering configuration:
//! a schedule (interval or daily, in the user's timezone) plus an ordered
//! list of content blocks. The wire shape is the frontend JSON the original
//! service speaks; parsing resolves it into explicit sum types so dispatch
//! can match exhaustively instead of sniffing string tags at runtime.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TidingsError};

/// A user-defined content-gathering thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,
    pub user_id: String,
    /// Fallback profile lookup key when the user_id misses.
    pub email: String,
    pub display_name: String,
    /// None means "run once immediately, register no jobs".
    pub schedule: Option<ScheduleSpec>,
    pub blocks: Vec<ContentBlock>,
    pub running: bool,
}

/// Hour/minute of day, as parsed from an "HH:MM" string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    /// Parse "HH:MM". Returns None for malformed or out-of-range values.
    pub fn parse(s: &str) -> Option<Self> {
        let (h, m) = s.split_once(':')?;
        let hour: u32 = h.trim().parse().ok()?;
        let minute: u32 = m.trim().parse().ok()?;
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self { hour, minute })
    }

    /// Compact "HHMM" form used in daily job ids (e.g. "0900").
    pub fn hhmm(&self) -> String {
        format!("{:02}{:02}", self.hour, self.minute)
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Interval step unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl IntervalUnit {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "minutes" => Some(Self::Minutes),
            "hours" => Some(Self::Hours),
            "days" => Some(Self::Days),
            "weeks" => Some(Self::Weeks),
            _ => None,
        }
    }
}

/// How a thread's gathering runs repeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScheduleSpec {
    /// Every `every` units, anchored at `start_time` in `timezone`.
    Interval {
        unit: IntervalUnit,
        every: u32,
        start_time: TimeOfDay,
        timezone: Tz,
    },
    /// At each listed local time, every day, in `timezone`.
    Daily {
        times: Vec<TimeOfDay>,
        timezone: Tz,
    },
}

impl ScheduleSpec {
    /// The schedule's timezone.
    pub fn timezone(&self) -> Tz {
        match self {
            Self::Interval { timezone, .. } | Self::Daily { timezone, .. } => *timezone,
        }
    }

    /// Parse the wire descriptor:
    /// `{"type": "interval"|"daily", "unit": ..., "interval": ..., "startTime": "HH:MM",
    ///   "times": [...], "timezone": "<IANA zone>"}`.
    ///
    /// An unknown timezone falls back to `fallback_tz` with a warning — never
    /// an error. Malformed "HH:MM" entries in a daily schedule are skipped,
    /// the valid ones proceed.
    pub fn from_descriptor(v: &serde_json::Value, fallback_tz: Tz) -> Result<Self> {
        let timezone = resolve_timezone(v.get("timezone").and_then(|t| t.as_str()), fallback_tz);

        match v.get("type").and_then(|t| t.as_str()) {
            Some("interval") => {
                let unit_str = v.get("unit").and_then(|u| u.as_str()).unwrap_or("minutes");
                let unit = IntervalUnit::parse(unit_str).ok_or_else(|| {
                    TidingsError::Schedule(format!("Unknown interval unit: {unit_str}"))
                })?;
                let every = v.get("interval").and_then(|i| i.as_u64()).unwrap_or(60) as u32;
                if every == 0 {
                    return Err(TidingsError::Schedule("Interval must be >= 1".into()));
                }
                let start_str = v.get("startTime").and_then(|s| s.as_str()).unwrap_or("00:00");
                let start_time = TimeOfDay::parse(start_str).ok_or_else(|| {
                    TidingsError::Schedule(format!("Invalid startTime: {start_str}"))
                })?;
                Ok(Self::Interval { unit, every, start_time, timezone })
            }
            Some("daily") => {
                let raw_times = v
                    .get("times")
                    .and_then(|t| t.as_array())
                    .cloned()
                    .unwrap_or_default();
                let mut times = Vec::new();
                for raw in &raw_times {
                    let Some(s) = raw.as_str() else { continue };
                    match TimeOfDay::parse(s) {
                        Some(t) => times.push(t),
                        None => tracing::warn!("Skipping invalid daily time '{s}'"),
                    }
                }
                if times.is_empty() {
                    return Err(TidingsError::Schedule(
                        "Daily schedule has no valid times".into(),
                    ));
                }
                Ok(Self::Daily { times, timezone })
            }
            Some(other) => Err(TidingsError::Schedule(format!(
                "Unknown schedule type: {other}"
            ))),
            None => Err(TidingsError::Schedule("Schedule missing 'type'".into())),
        }
    }
}

/// Resolve an IANA zone name, falling back (with a warning) when unknown or absent.
pub fn resolve_timezone(name: Option<&str>, fallback: Tz) -> Tz {
    match name {
        Some(s) if !s.is_empty() => s.parse().unwrap_or_else(|_| {
            tracing::warn!("Unknown timezone '{s}', defaulting to {fallback}");
            fallback
        }),
        _ => fallback,
    }
}

/// Execution mode of a content block (the wire `ai` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockMode {
    /// Route through the LLM retrieval path.
    Smart,
    /// Deterministic fetch, curated ordering.
    Selective,
    /// Deterministic fetch, newest first.
    Newest,
}

impl BlockMode {
    fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "smart" => Self::Smart,
            "newest" => Self::Newest,
            _ => Self::Selective,
        }
    }
}

/// One unit of gathering work within a thread.
///
/// `Unknown` survives parsing on purpose: the executor reports it as an
/// error entry instead of silently dropping the block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentBlock {
    GeneralSearch { query: String, mode: BlockMode },
    XFromUser { handles: Vec<String>, mode: BlockMode },
    XFromTopic { topics: Vec<String>, mode: BlockMode },
    Unknown { kind: String },
}

impl ContentBlock {
    /// Wire name of the block type.
    pub fn kind(&self) -> &str {
        match self {
            Self::GeneralSearch { .. } => "general-search",
            Self::XFromUser { .. } => "x-from-user",
            Self::XFromTopic { .. } => "x-from-topic",
            Self::Unknown { kind } => kind,
        }
    }

    /// Parse a wire block `{"type": ..., "tags": [...], "body": "...", "ai": "..."}`.
    ///
    /// Tags take precedence over the legacy `body` field; `x-from-user` tags
    /// are normalized to an `@` prefix. A block with neither tags nor body
    /// yields None (skipped with a warning by the caller).
    pub fn from_wire(v: &serde_json::Value) -> Option<Self> {
        let kind = v.get("type").and_then(|t| t.as_str()).unwrap_or("").to_ascii_lowercase();
        let mode = BlockMode::parse(v.get("ai").and_then(|m| m.as_str()).unwrap_or("selective"));

        let tags: Vec<String> = v
            .get("tags")
            .and_then(|t| t.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|t| t.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let body = v.get("body").and_then(|b| b.as_str()).unwrap_or("").to_string();

        if tags.is_empty() && body.is_empty() {
            return None;
        }

        match kind.as_str() {
            "general-search" => {
                let query = if tags.is_empty() { body } else { tags.join(", ") };
                Some(Self::GeneralSearch { query, mode })
            }
            "x-from-user" => {
                let handles = if tags.is_empty() {
                    body.split(',').map(|s| at_prefixed(s.trim())).collect()
                } else {
                    tags.iter().map(|t| at_prefixed(t)).collect()
                };
                Some(Self::XFromUser { handles, mode })
            }
            "x-from-topic" => {
                let topics = if tags.is_empty() {
                    body.split(',').map(|s| s.trim().to_string()).collect()
                } else {
                    tags
                };
                Some(Self::XFromTopic { topics, mode })
            }
            other => Some(Self::Unknown { kind: other.to_string() }),
        }
    }
}

fn at_prefixed(handle: &str) -> String {
    if handle.starts_with('@') {
        handle.to_string()
    } else {
        format!("@{handle}")
    }
}

impl Thread {
    /// Parse the full frontend request body into a thread.
    ///
    /// Shape (original wire format):
    /// `{"thread_id", "name", "user_id", "email", "notification_schedule": {...},
    ///   "blocks": [...]}`.
    pub fn from_request(v: &serde_json::Value, fallback_tz: Tz) -> Result<Self> {
        let thread_id = v
            .get("thread_id")
            .and_then(|t| t.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TidingsError::Schedule("Request missing thread_id".into()))?
            .to_string();

        let schedule = match v.get("notification_schedule") {
            Some(s) if !s.is_null() => Some(ScheduleSpec::from_descriptor(s, fallback_tz)?),
            _ => None,
        };

        let mut blocks = Vec::new();
        if let Some(raw_blocks) = v.get("blocks").and_then(|b| b.as_array()) {
            for raw in raw_blocks {
                match ContentBlock::from_wire(raw) {
                    Some(block) => blocks.push(block),
                    None => tracing::warn!(
                        thread_id = %thread_id,
                        "Skipping block with no tags or body"
                    ),
                }
            }
        }

        Ok(Self {
            thread_id,
            user_id: v.get("user_id").and_then(|u| u.as_str()).unwrap_or("").to_string(),
            email: v.get("email").and_then(|e| e.as_str()).unwrap_or("").to_string(),
            display_name: v.get("name").and_then(|n| n.as_str()).unwrap_or("User").to_string(),
            schedule,
            blocks,
            running: false,
        })
    }
}
