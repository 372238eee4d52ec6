//! HTTP RPC client for the backend processing engine
//!
//! The engine is an external collaborator reached over loopback HTTP. Every
//! request is a POST of `{"method": ..., "params": ...}`; responses carry
//! either `{"result": ...}` or `{"error": ...}`. Transport failures and
//! application-level errors are both mapped into `EngineError` so the
//! circuit breaker treats them uniformly.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::logger::{self, LogTag};

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    params: Value,
}

/// Shared client for engine RPC queries
#[derive(Debug, Clone)]
pub struct EngineClient {
    http: reqwest::Client,
    url: String,
    request_timeout: Duration,
}

impl EngineClient {
    pub fn new(cfg: &EngineConfig) -> Self {
        let request_timeout = Duration::from_secs(cfg.request_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            url: cfg.url.clone(),
            request_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Execute one engine query.
    ///
    /// The request timeout bounds how long the call may run; the circuit
    /// breaker only gates whether it is attempted at all.
    pub async fn query(&self, method: &str, params: Value) -> Result<Value, EngineError> {
        logger::debug(LogTag::Engine, &format!("Query {} -> {}", method, self.url));

        let request = RpcRequest { method, params };
        let timeout_ms = self.request_timeout.as_millis() as u64;

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::from_reqwest(e, &self.url, timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.ok();
            return Err(EngineError::HttpStatus {
                endpoint: self.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse {
                method: method.to_string(),
                error: e.to_string(),
            })?;

        Self::unwrap_result(method, body)
    }

    /// Separate the `{"result"}` / `{"error"}` envelope from the payload
    fn unwrap_result(method: &str, body: Value) -> Result<Value, EngineError> {
        if let Some(err) = body.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("engine reported an error")
                .to_string();
            return Err(EngineError::Unavailable {
                method: method.to_string(),
                message,
            });
        }

        match body.get("result") {
            Some(result) => Ok(result.clone()),
            None => Err(EngineError::InvalidResponse {
                method: method.to_string(),
                error: "response has neither result nor error".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_result_success() {
        let body = json!({"result": {"uptime_secs": 12}});
        let result = EngineClient::unwrap_result("system.status", body).unwrap();
        assert_eq!(result["uptime_secs"], 12);
    }

    #[test]
    fn test_unwrap_result_application_error() {
        let body = json!({"error": {"message": "engine restarting"}});
        let err = EngineClient::unwrap_result("system.status", body).unwrap_err();
        match err {
            EngineError::Unavailable { method, message } => {
                assert_eq!(method, "system.status");
                assert_eq!(message, "engine restarting");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unwrap_result_malformed() {
        let body = json!({"unexpected": true});
        let err = EngineClient::unwrap_result("jobs.progress", body).unwrap_err();
        assert!(matches!(err, EngineError::InvalidResponse { .. }));
    }
}
