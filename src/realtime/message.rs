/// Wire message schema for the client-facing WebSocket protocol
///
/// Every server->client message is a JSON envelope:
///
/// ```text
/// { "type": "<category or control type>", "timestamp": "<ISO-8601>", "data": { ... } }
/// ```
///
/// Event envelopes carry an additional `"stale": true` marker when the
/// payload is a republished last-known-good snapshot during an engine outage.
/// Client->server control messages use the same `type`/`data` shape and are
/// parsed into a closed tagged enum, matched exhaustively.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// EVENT CATEGORIES
// ============================================================================

/// Backend-sourced event categories clients can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    SystemStatus,
    JobProgress,
    WorkerStatus,
}

impl EventCategory {
    pub const ALL: [EventCategory; 3] = [
        EventCategory::SystemStatus,
        EventCategory::JobProgress,
        EventCategory::WorkerStatus,
    ];

    /// Categories every new client starts subscribed to
    pub const DEFAULT: [EventCategory; 1] = [EventCategory::SystemStatus];

    /// Wire code used in the envelope `type` field
    pub fn code(&self) -> &'static str {
        match self {
            EventCategory::SystemStatus => "system-status",
            EventCategory::JobProgress => "job-progress",
            EventCategory::WorkerStatus => "worker-status",
        }
    }

    /// Parse category from wire code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "system-status" => Some(EventCategory::SystemStatus),
            "job-progress" => Some(EventCategory::JobProgress),
            "worker-status" => Some(EventCategory::WorkerStatus),
            _ => None,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// MESSAGE ENVELOPE (server -> client)
// ============================================================================

/// Standard outbound message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Event category code or control type
    #[serde(rename = "type")]
    pub kind: String,

    /// Server timestamp (ISO-8601)
    pub timestamp: String,

    /// Payload - the hub never inspects its contents
    pub data: Value,

    /// Present and true only on republished last-known-good payloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
}

impl Envelope {
    fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
            stale: None,
        }
    }

    /// Fresh event for a category
    pub fn event(category: EventCategory, data: Value) -> Self {
        Self::new(category.code(), data)
    }

    /// Republished last-known-good event during an outage
    pub fn stale_event(category: EventCategory, data: Value) -> Self {
        let mut envelope = Self::new(category.code(), data);
        envelope.stale = Some(true);
        envelope
    }

    /// Server keepalive probe
    pub fn ping() -> Self {
        Self::new("ping", Value::Null)
    }

    /// Reply to a client ping; echoes the client-supplied payload
    pub fn pong(data: Option<Value>) -> Self {
        Self::new("pong", data.unwrap_or(Value::Null))
    }

    /// Error report for malformed client input
    pub fn error(message: &str, code: &str) -> Self {
        Self::new(
            "error",
            serde_json::json!({ "message": message, "code": code }),
        )
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// CLIENT MESSAGES (client -> server)
// ============================================================================

/// Client control messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to categories (`data` = list of category names)
    Subscribe {
        #[serde(default)]
        data: Vec<String>,
    },

    /// Unsubscribe from categories (`data` = list of category names)
    Unsubscribe {
        #[serde(default)]
        data: Vec<String>,
    },

    /// Client liveness probe
    Ping {
        #[serde(default)]
        data: Option<Value>,
    },

    /// Client reply to a server keepalive ping
    Pong {
        #[serde(default)]
        data: Option<Value>,
    },
}

/// Resolve a list of wire codes into categories.
/// Returns the first unknown name as the error.
pub fn parse_categories(names: &[String]) -> Result<Vec<EventCategory>, String> {
    let mut categories = Vec::with_capacity(names.len());
    for name in names {
        match EventCategory::from_code(name) {
            Some(category) => categories.push(category),
            None => return Err(name.clone()),
        }
    }
    Ok(categories)
}
