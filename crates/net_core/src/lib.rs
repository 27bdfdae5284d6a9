//! net_core: the wire-facing half of the server.
//!
//! Packets are `{id, bytes}` frames; the handshake and compression layers
//! live outside this crate. What lives here: the field codec, length
//! framing, blocking transports (TCP and an in-process loopback), the
//! bounded per-client outbound queue, chat message texts, and the
//! keepalive service.

pub mod codec;
pub mod frame;
pub mod keepalive;
pub mod message;
pub mod packet;
pub mod queue;
pub mod transport;

pub use message::Message;
pub use packet::Packet;
