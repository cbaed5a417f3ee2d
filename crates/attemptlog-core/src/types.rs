use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ─── Channel ──────────────────────────────────────────────────────

/// Kind tag shared by patches and merged log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Stdout,
    Stderr,
    NormalizedEntry,
    ProcessStart,
}

impl Channel {
    pub const ALL: [Self; 4] = [
        Self::Stdout,
        Self::Stderr,
        Self::NormalizedEntry,
        Self::ProcessStart,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "STDOUT",
            Self::Stderr => "STDERR",
            Self::NormalizedEntry => "NORMALIZED_ENTRY",
            Self::ProcessStart => "PROCESS_START",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STDOUT" => Ok(Self::Stdout),
            "STDERR" => Ok(Self::Stderr),
            "NORMALIZED_ENTRY" => Ok(Self::NormalizedEntry),
            "PROCESS_START" => Ok(Self::ProcessStart),
            _ => Err(PatchError::UnknownChannel(s.to_owned())),
        }
    }
}

// ─── Delivery Mode ────────────────────────────────────────────────

/// How a batch of patches is applied to the unified sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Replace the whole sequence with the batch.
    Initial,
    /// Merge live output into the sequence.
    Running,
    /// Merge a backfill batch without touching entries already present.
    Historic,
}

impl DeliveryMode {
    pub const ALL: [Self; 3] = [Self::Initial, Self::Running, Self::Historic];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Running => "running",
            Self::Historic => "historic",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "initial" => Ok(Self::Initial),
            "running" => Ok(Self::Running),
            "historic" => Ok(Self::Historic),
            _ => Err(PatchError::UnknownMode(s.to_owned())),
        }
    }
}

// ─── Normalized Entry ─────────────────────────────────────────────

/// Discriminated `entry_type` of a normalized entry. Only `type` is
/// interpreted; the remaining fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryType {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EntryType {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEntry {
    pub entry_type: EntryType,
    #[serde(default)]
    pub content: String,
    /// RFC 3339 timestamp, when the producing executor recorded one.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

// ─── Process Start ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorAction {
    pub action_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Launch metadata for an execution process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStartPayload {
    pub process_id: String,
    pub run_reason: String,
    pub started_at: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ExecutorAction>,
}

// ─── Patch ────────────────────────────────────────────────────────

/// One unit of process output, tagged by channel.
///
/// Wire form: `{"type": "STDOUT", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Patch {
    Stdout { content: String },
    Stderr { content: String },
    NormalizedEntry { content: NormalizedEntry },
    ProcessStart { content: ProcessStartPayload },
}

impl Patch {
    pub fn stdout(line: impl Into<String>) -> Self {
        Self::Stdout {
            content: line.into(),
        }
    }

    pub fn stderr(line: impl Into<String>) -> Self {
        Self::Stderr {
            content: line.into(),
        }
    }

    pub fn normalized(entry: NormalizedEntry) -> Self {
        Self::NormalizedEntry { content: entry }
    }

    pub fn process_start(payload: ProcessStartPayload) -> Self {
        Self::ProcessStart { content: payload }
    }

    pub fn channel(&self) -> Channel {
        match self {
            Self::Stdout { .. } => Channel::Stdout,
            Self::Stderr { .. } => Channel::Stderr,
            Self::NormalizedEntry { .. } => Channel::NormalizedEntry,
            Self::ProcessStart { .. } => Channel::ProcessStart,
        }
    }

    /// Timestamp embedded in the payload, as epoch milliseconds.
    ///
    /// Raw stream lines never carry one; unparseable strings count as absent.
    pub fn payload_timestamp_ms(&self) -> Option<i64> {
        match self {
            Self::Stdout { .. } | Self::Stderr { .. } => None,
            Self::NormalizedEntry { content } => {
                content.timestamp.as_deref().and_then(parse_timestamp_ms)
            }
            Self::ProcessStart { content } => parse_timestamp_ms(&content.started_at),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Stdout { content } | Self::Stderr { content } => Some(content),
            _ => None,
        }
    }

    pub fn as_normalized(&self) -> Option<&NormalizedEntry> {
        match self {
            Self::NormalizedEntry { content } => Some(content),
            _ => None,
        }
    }

    pub fn as_process_start(&self) -> Option<&ProcessStartPayload> {
        match self {
            Self::ProcessStart { content } => Some(content),
            _ => None,
        }
    }
}

// ─── Keyed Patch ──────────────────────────────────────────────────

/// A [`Patch`] attributed to its execution process.
///
/// `(execution_process_id, patch_key)` is unique for the lifetime of a feed.
/// Missing keys deserialize as empty strings so a batch with one malformed
/// patch still decodes; [`KeyedPatch::validate`] rejects it at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyedPatch {
    #[serde(flatten)]
    pub patch: Patch,
    #[serde(default)]
    pub patch_key: String,
    #[serde(default)]
    pub execution_process_id: String,
    /// Explicit epoch-ms timestamp supplied by the transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl KeyedPatch {
    pub fn new(
        execution_process_id: impl Into<String>,
        patch_key: impl Into<String>,
        patch: Patch,
    ) -> Self {
        Self {
            patch,
            patch_key: patch_key.into(),
            execution_process_id: execution_process_id.into(),
            ts: None,
        }
    }

    pub fn with_ts(mut self, ts: i64) -> Self {
        self.ts = Some(ts);
        self
    }

    pub fn validate(&self) -> Result<(), PatchError> {
        if self.execution_process_id.trim().is_empty() {
            return Err(PatchError::MissingProcessId);
        }
        if self.patch_key.trim().is_empty() {
            return Err(PatchError::MissingPatchKey {
                process_id: self.execution_process_id.clone(),
            });
        }
        Ok(())
    }

    /// Stable entry id for this patch (see [`entry_id`]).
    pub fn entry_id(&self) -> String {
        entry_id(&self.execution_process_id, &self.patch_key)
    }
}

/// Deterministic entry id for `(process_id, patch_key)`.
///
/// The process id is length-prefixed so ids stay unambiguous when either
/// part contains the separator.
pub fn entry_id(process_id: &str, patch_key: &str) -> String {
    format!("{}:{process_id}:{patch_key}", process_id.len())
}

/// Inverse of [`entry_id`]: `(process_id, patch_key)`, or `None` if `id` is
/// not a well-formed entry id.
pub fn split_entry_id(id: &str) -> Option<(&str, &str)> {
    let (len, rest) = id.split_once(':')?;
    let len: usize = len.parse().ok()?;
    let process_id = rest.get(..len)?;
    let patch_key = rest.get(len..)?.strip_prefix(':')?;
    Some((process_id, patch_key))
}

// ─── Unified Log Entry ────────────────────────────────────────────

/// Display-ready unit of the merged feed.
///
/// Wire form: `{"id", "ts", "processId", "processName", "channel", "payload"}`.
/// The patch key is not serialized; it is recovered from `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedLogEntry {
    pub id: String,
    /// Epoch milliseconds; primary ordering key.
    pub ts: i64,
    pub process_id: String,
    pub process_name: String,
    pub patch_key: String,
    pub patch: Patch,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryWireRef<'a> {
    id: &'a str,
    ts: i64,
    process_id: &'a str,
    process_name: &'a str,
    channel: Channel,
    payload: PayloadRef<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PayloadRef<'a> {
    Text(&'a str),
    Normalized(&'a NormalizedEntry),
    ProcessStart(&'a ProcessStartPayload),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryWire {
    id: String,
    ts: i64,
    process_id: String,
    process_name: String,
    channel: Channel,
    payload: Value,
}

impl Serialize for UnifiedLogEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload = match &self.patch {
            Patch::Stdout { content } | Patch::Stderr { content } => PayloadRef::Text(content),
            Patch::NormalizedEntry { content } => PayloadRef::Normalized(content),
            Patch::ProcessStart { content } => PayloadRef::ProcessStart(content),
        };
        EntryWireRef {
            id: &self.id,
            ts: self.ts,
            process_id: &self.process_id,
            process_name: &self.process_name,
            channel: self.channel(),
            payload,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UnifiedLogEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = EntryWire::deserialize(deserializer)?;
        let patch_key = split_entry_id(&wire.id)
            .map(|(_, key)| key.to_owned())
            .ok_or_else(|| D::Error::custom(format!("malformed entry id: {}", wire.id)))?;
        let patch = match wire.channel {
            Channel::Stdout => Patch::Stdout {
                content: serde_json::from_value(wire.payload).map_err(D::Error::custom)?,
            },
            Channel::Stderr => Patch::Stderr {
                content: serde_json::from_value(wire.payload).map_err(D::Error::custom)?,
            },
            Channel::NormalizedEntry => Patch::NormalizedEntry {
                content: serde_json::from_value(wire.payload).map_err(D::Error::custom)?,
            },
            Channel::ProcessStart => Patch::ProcessStart {
                content: serde_json::from_value(wire.payload).map_err(D::Error::custom)?,
            },
        };
        Ok(Self {
            id: wire.id,
            ts: wire.ts,
            process_id: wire.process_id,
            process_name: wire.process_name,
            patch_key,
            patch,
        })
    }
}

impl UnifiedLogEntry {
    pub fn channel(&self) -> Channel {
        self.patch.channel()
    }
}

// ─── Patch Batch ──────────────────────────────────────────────────

/// Unit delivered by the ingestion adapter for one attempt session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchBatch {
    pub session_id: String,
    pub mode: DeliveryMode,
    #[serde(default)]
    pub patches: Vec<KeyedPatch>,
    /// More batches for this mode are still on their way.
    #[serde(default)]
    pub loading: bool,
}

impl PatchBatch {
    pub fn new(session_id: impl Into<String>, mode: DeliveryMode, patches: Vec<KeyedPatch>) -> Self {
        Self {
            session_id: session_id.into(),
            mode,
            patches,
            loading: false,
        }
    }

    pub fn still_loading(mut self) -> Self {
        self.loading = true;
        self
    }
}

// ─── Todos ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: String,
}

/// Most recent TODO-list snapshot found in the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedTodos {
    pub todos: Vec<TodoItem>,
    pub last_updated: Option<String>,
}

// ─── Queue ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub message: String,
    pub variant: Option<String>,
}

/// Single-slot follow-up queue state for one attempt session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Empty,
    Queued { message: QueuedMessage },
}

impl QueueStatus {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    pub fn queued_message(&self) -> Option<&QueuedMessage> {
        match self {
            Self::Queued { message } => Some(message),
            Self::Empty => None,
        }
    }
}

// ─── Timestamps ───────────────────────────────────────────────────

/// Parse an RFC 3339 timestamp into epoch milliseconds.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

pub fn to_epoch_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

// ─── Error ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("patch is missing executionProcessId")]
    MissingProcessId,

    #[error("patch from process {process_id} is missing patchKey")]
    MissingPatchKey { process_id: String },

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("unknown delivery mode: {0}")]
    UnknownMode(String),
}

// ─── Tests ────────────────────────────────────────────────────────
