/// Realtime event distribution
///
/// The hub fans engine events out to WebSocket clients, the connection
/// handler runs the per-client protocol, and the sources translate the
/// pull-based engine into the push stream the hub distributes.
pub mod connection;
pub mod hub;
pub mod keepalive;
pub mod message;
pub mod metrics;
pub mod sources;

pub use hub::{ClientId, Hub};
pub use message::{Envelope, EventCategory};
