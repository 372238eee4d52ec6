/// Structured error types for nasbridge
///
/// Every failure mode the gateway surfaces maps to one of these variants.
/// Breaker rejections and engine failures are ordinary returned errors and
/// never panic the process; client-level errors stay scoped to one connection.
use std::time::Duration;

// =============================================================================
// MAIN ERROR TYPE
// =============================================================================

#[derive(Debug, Clone)]
pub enum GatewayError {
    /// Call rejected by the circuit breaker without execution.
    /// Always recoverable by the caller - try again later.
    CircuitOpen { retry_after: Duration },

    /// The wrapped engine operation itself failed
    Engine(EngineError),

    /// Malformed message from a client - reported to that client only
    ClientProtocol { reason: String },

    /// Client outbound queue overflow - the connection is closed
    SlowConsumer { client_id: u64, queue_size: usize },

    /// Configuration errors
    Configuration { message: String },
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::CircuitOpen { retry_after } => {
                write!(
                    f,
                    "Circuit open: call rejected, retry in {:.1}s",
                    retry_after.as_secs_f64()
                )
            }
            GatewayError::Engine(e) => write!(f, "Engine Error: {}", e),
            GatewayError::ClientProtocol { reason } => {
                write!(f, "Client protocol error: {}", reason)
            }
            GatewayError::SlowConsumer {
                client_id,
                queue_size,
            } => {
                write!(
                    f,
                    "Client {} dropped: outbound queue full ({} messages)",
                    client_id, queue_size
                )
            }
            GatewayError::Configuration { message } => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for GatewayError {}

// =============================================================================
// ENGINE ERROR TYPES
// =============================================================================

/// Failures of the backend engine RPC call.
/// All variants are treated uniformly as circuit breaker failures.
#[derive(Debug, Clone)]
pub enum EngineError {
    ConnectionRefused {
        endpoint: String,
        reason: String,
    },
    Timeout {
        endpoint: String,
        timeout_ms: u64,
    },
    HttpStatus {
        endpoint: String,
        status: u16,
        body: Option<String>,
    },
    /// Application-level "unavailable" response from the engine
    Unavailable {
        method: String,
        message: String,
    },
    InvalidResponse {
        method: String,
        error: String,
    },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::ConnectionRefused { endpoint, reason } => {
                write!(f, "Connection refused to {}: {}", endpoint, reason)
            }
            EngineError::Timeout {
                endpoint,
                timeout_ms,
            } => {
                write!(f, "Timeout calling {} after {}ms", endpoint, timeout_ms)
            }
            EngineError::HttpStatus {
                endpoint,
                status,
                body,
            } => {
                write!(
                    f,
                    "HTTP {} from {}: {}",
                    status,
                    endpoint,
                    body.as_deref().unwrap_or("No body")
                )
            }
            EngineError::Unavailable { method, message } => {
                write!(f, "Engine unavailable for {}: {}", method, message)
            }
            EngineError::InvalidResponse { method, error } => {
                write!(f, "Invalid response for {}: {}", method, error)
            }
        }
    }
}

impl std::error::Error for EngineError {}

// =============================================================================
// CONVERSIONS
// =============================================================================

impl From<EngineError> for GatewayError {
    fn from(err: EngineError) -> Self {
        GatewayError::Engine(err)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::ClientProtocol {
            reason: format!("Invalid JSON: {}", err),
        }
    }
}

impl EngineError {
    /// Classify a reqwest transport failure against the endpoint it targeted
    pub fn from_reqwest(err: reqwest::Error, endpoint: &str, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            EngineError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms,
            }
        } else if err.is_connect() {
            EngineError::ConnectionRefused {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        } else {
            EngineError::InvalidResponse {
                method: "unknown".to_string(),
                error: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let e = GatewayError::CircuitOpen {
            retry_after: Duration::from_secs(3),
        };
        assert!(e.to_string().contains("Circuit open"));

        let e = GatewayError::SlowConsumer {
            client_id: 7,
            queue_size: 256,
        };
        assert!(e.to_string().contains("Client 7"));

        let e = EngineError::Unavailable {
            method: "system.status".to_string(),
            message: "maintenance".to_string(),
        };
        assert!(e.to_string().contains("system.status"));
    }
}
