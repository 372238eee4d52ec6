/// Backend engine access layer
///
/// Everything the gateway asks of the backend processing engine goes through
/// here: the RPC client and the circuit breaker that guards every call to it.
pub mod breaker;
pub mod client;

pub use breaker::{BreakerSettings, CircuitBreaker, CircuitState};
pub use client::EngineClient;
