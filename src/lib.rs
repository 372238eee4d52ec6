pub mod arguments;
pub mod config;
pub mod engine;
pub mod errors; // Structured error handling
pub mod logger;
pub mod realtime; // Hub, connections, pollers
pub mod server;
