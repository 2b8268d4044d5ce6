//! 2 Man Socket - persistent realtime connection for the 2 Man client.
//!
//! This crate provides the duplex-socket subsystem:
//! - JSON envelope wire model with typed per-message payloads
//! - Payload validation before construction and dispatch
//! - FIFO queueing of outbound messages across reconnects
//! - Type-keyed publish/subscribe fan-out of inbound events
//! - Connection lifecycle: authentication, heartbeat liveness checking,
//!   capped exponential backoff, credential refresh, manual retry

pub mod dispatcher;
pub mod envelope;
pub mod manager;
pub mod queue;
pub mod transport;
pub mod validator;

// Re-export key types
pub use dispatcher::{EventDispatcher, Subscription};
pub use envelope::{
    ConnectionStatus, ErrorBody, FailureCode, MessageEnvelope, ResponseEnvelope, ResponseKind,
};
pub use manager::ConnectionManager;
pub use queue::MessageQueue;
pub use transport::{Connection, Transport, TransportEvent, WsTransport};
pub use validator::MessageValidator;
