//! Wire protocol: message model, binary codec and packet framing.

pub mod codec;
mod message;
mod packet;

pub use message::{Message, MessageKind, MoosValue, Sequence, ValueKind, SKEW_TOLERANCE};
pub use packet::{Packet, MAX_PACKET_BYTES};
