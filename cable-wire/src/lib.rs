//! Wire format for the Cable protocol: codec primitives, the property
//! map, and the nine packet kinds with their self-delimiting frame
//! header. No I/O and no async runtime — this crate only knows how to
//! turn bytes into typed packets and back.

pub mod codec;
pub mod error;
pub mod frame;
pub mod identity;
pub mod packet;
pub mod property;

pub use error::{CodecError, PacketError};
pub use frame::{PacketType, MAX_LEN};
pub use identity::Identity;
pub use packet::{
    ClosePacket, CloseCode, ConnackCode, ConnackPacket, ConnectPacket, MessackPacket,
    MessagePacket, Packet, PingPongPacket, Qos, RequestPacket, ResponsePacket, StatusCode,
};
pub use property::{Property, PropertyMap};
