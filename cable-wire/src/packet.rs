//! The nine packet kinds and their payload layouts.

use bytes::BytesMut;

use crate::codec::{Decoder, Encoder};
use crate::error::PacketError;
use crate::frame::{self, PacketType};
use crate::identity::Identity;
use crate::property::PropertyMap;

const MAX_KIND: u8 = 0x3F;

/// Handshake result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnackCode {
    Accepted,
    Rejected,
    Duplicate,
    Other(u8),
}

impl From<u8> for ConnackCode {
    fn from(v: u8) -> Self {
        match v {
            0 => ConnackCode::Accepted,
            1 => ConnackCode::Rejected,
            2 => ConnackCode::Duplicate,
            other => ConnackCode::Other(other),
        }
    }
}

impl From<ConnackCode> for u8 {
    fn from(c: ConnackCode) -> Self {
        match c {
            ConnackCode::Accepted => 0,
            ConnackCode::Rejected => 1,
            ConnackCode::Duplicate => 2,
            ConnackCode::Other(v) => v,
        }
    }
}

/// Terminal reason carried by a `Close` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    PolicyViolation,
    AuthFailure,
    InternalError,
    Other(u8),
}

impl From<u8> for CloseCode {
    fn from(v: u8) -> Self {
        match v {
            0 => CloseCode::Normal,
            1 => CloseCode::GoingAway,
            2 => CloseCode::ProtocolError,
            3 => CloseCode::PolicyViolation,
            4 => CloseCode::AuthFailure,
            5 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }
}

impl From<CloseCode> for u8 {
    fn from(c: CloseCode) -> Self {
        match c {
            CloseCode::Normal => 0,
            CloseCode::GoingAway => 1,
            CloseCode::ProtocolError => 2,
            CloseCode::PolicyViolation => 3,
            CloseCode::AuthFailure => 4,
            CloseCode::InternalError => 5,
            CloseCode::Other(v) => v,
        }
    }
}

/// Result code carried by a `Response` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    NotFound,
    InternalError,
    Other(u8),
}

impl StatusCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

impl From<u8> for StatusCode {
    fn from(v: u8) -> Self {
        match v {
            0 => StatusCode::Ok,
            1 => StatusCode::BadRequest,
            2 => StatusCode::NotFound,
            3 => StatusCode::InternalError,
            other => StatusCode::Other(other),
        }
    }
}

impl From<StatusCode> for u8 {
    fn from(c: StatusCode) -> Self {
        match c {
            StatusCode::Ok => 0,
            StatusCode::BadRequest => 1,
            StatusCode::NotFound => 2,
            StatusCode::InternalError => 3,
            StatusCode::Other(v) => v,
        }
    }
}

/// Quality of service for a `Message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    Qos0,
    Qos1,
}

impl Qos {
    fn bit(self) -> u8 {
        match self {
            Qos::Qos0 => 0,
            Qos::Qos1 => 1,
        }
    }

    fn from_bit(bit: u8) -> Self {
        if bit == 0 { Qos::Qos0 } else { Qos::Qos1 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub version: u8,
    pub identity: Identity,
    pub props: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnackPacket {
    pub code: ConnackCode,
    pub props: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePacket {
    pub id: u16,
    pub qos: Qos,
    pub dup: bool,
    pub kind: u8,
    pub payload: Vec<u8>,
    pub props: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessackPacket {
    pub id: u16,
    pub props: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPacket {
    pub id: u16,
    pub method: String,
    pub body: Vec<u8>,
    pub props: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    pub id: u16,
    pub code: StatusCode,
    pub body: Vec<u8>,
    pub props: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingPongPacket {
    pub props: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosePacket {
    pub code: CloseCode,
}

/// Any of the nine wire packet kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(ConnectPacket),
    Connack(ConnackPacket),
    Message(MessagePacket),
    Messack(MessackPacket),
    Request(RequestPacket),
    Response(ResponsePacket),
    Ping(PingPongPacket),
    Pong(PingPongPacket),
    Close(ClosePacket),
}

impl Packet {
    fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Connack(_) => PacketType::Connack,
            Packet::Message(_) => PacketType::Message,
            Packet::Messack(_) => PacketType::Messack,
            Packet::Request(_) => PacketType::Request,
            Packet::Response(_) => PacketType::Response,
            Packet::Ping(_) => PacketType::Ping,
            Packet::Pong(_) => PacketType::Pong,
            Packet::Close(_) => PacketType::Close,
        }
    }

    /// Encodes this packet into a complete, self-delimiting frame.
    pub fn encode(&self) -> Result<BytesMut, PacketError> {
        let payload = self.encode_payload()?;
        frame::encode_frame(self.packet_type(), &payload)
    }

    fn encode_payload(&self) -> Result<BytesMut, PacketError> {
        let mut enc = Encoder::new();
        match self {
            Packet::Connect(p) => {
                enc.put_u8(p.version);
                enc.put_string(p.identity.user_id());
                enc.put_string(p.identity.client_id());
                enc.put_string(p.identity.password());
                enc.put_u8_string_map(p.props.as_pairs())?;
            }
            Packet::Connack(p) => {
                enc.put_u8(p.code.into());
                enc.put_u8_string_map(p.props.as_pairs())?;
            }
            Packet::Message(p) => {
                if p.kind > MAX_KIND {
                    return Err(PacketError::MessageKindTooLarge { kind: p.kind });
                }
                let flags = (p.qos.bit() << 7) | ((p.dup as u8) << 6) | p.kind;
                enc.put_u8(flags);
                enc.put_u16(p.id);
                enc.put_u8_string_map(p.props.as_pairs())?;
                enc.put_raw(&p.payload);
            }
            Packet::Messack(p) => {
                enc.put_u16(p.id);
                enc.put_u8_string_map(p.props.as_pairs())?;
            }
            Packet::Request(p) => {
                enc.put_u16(p.id);
                enc.put_string(&p.method);
                enc.put_u8_string_map(p.props.as_pairs())?;
                enc.put_raw(&p.body);
            }
            Packet::Response(p) => {
                enc.put_u16(p.id);
                enc.put_u8(p.code.into());
                enc.put_u8_string_map(p.props.as_pairs())?;
                enc.put_raw(&p.body);
            }
            Packet::Ping(p) | Packet::Pong(p) => {
                enc.put_u8_string_map(p.props.as_pairs())?;
            }
            Packet::Close(p) => {
                enc.put_u8(p.code.into());
            }
        }
        Ok(enc.into_bytes())
    }

    /// Decodes a complete frame into a typed packet.
    pub fn decode(buf: &[u8]) -> Result<Packet, PacketError> {
        let (packet_type, payload) = frame::decode_frame(buf)?;
        let mut dec = Decoder::new(payload);

        Ok(match packet_type {
            PacketType::Connect => {
                let version = dec.get_u8()?;
                let user_id = dec.get_string()?;
                let client_id = dec.get_string()?;
                let password = dec.get_string()?;
                let props = PropertyMap::from_pairs(dec.get_u8_string_map()?);
                Packet::Connect(ConnectPacket {
                    version,
                    identity: Identity::new(user_id, client_id, password),
                    props,
                })
            }
            PacketType::Connack => {
                let code = ConnackCode::from(dec.get_u8()?);
                let props = PropertyMap::from_pairs(dec.get_u8_string_map()?);
                Packet::Connack(ConnackPacket { code, props })
            }
            PacketType::Message => {
                let flags = dec.get_u8()?;
                let id = dec.get_u16()?;
                let props = PropertyMap::from_pairs(dec.get_u8_string_map()?);
                let payload = dec.remaining_slice().to_vec();
                Packet::Message(MessagePacket {
                    id,
                    qos: Qos::from_bit((flags >> 7) & 0x01),
                    dup: (flags >> 6) & 0x01 == 1,
                    kind: flags & MAX_KIND,
                    payload,
                    props,
                })
            }
            PacketType::Messack => {
                let id = dec.get_u16()?;
                let props = PropertyMap::from_pairs(dec.get_u8_string_map()?);
                Packet::Messack(MessackPacket { id, props })
            }
            PacketType::Request => {
                let id = dec.get_u16()?;
                let method = dec.get_string()?;
                let props = PropertyMap::from_pairs(dec.get_u8_string_map()?);
                let body = dec.remaining_slice().to_vec();
                Packet::Request(RequestPacket {
                    id,
                    method,
                    body,
                    props,
                })
            }
            PacketType::Response => {
                let id = dec.get_u16()?;
                let code = StatusCode::from(dec.get_u8()?);
                let props = PropertyMap::from_pairs(dec.get_u8_string_map()?);
                let body = dec.remaining_slice().to_vec();
                Packet::Response(ResponsePacket {
                    id,
                    code,
                    body,
                    props,
                })
            }
            PacketType::Ping => {
                let props = PropertyMap::from_pairs(dec.get_u8_string_map()?);
                Packet::Ping(PingPongPacket { props })
            }
            PacketType::Pong => {
                let props = PropertyMap::from_pairs(dec.get_u8_string_map()?);
                Packet::Pong(PingPongPacket { props })
            }
            PacketType::Close => {
                let code = CloseCode::from(dec.get_u8()?);
                Packet::Close(ClosePacket { code })
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::property::Property;

    #[test]
    fn connect_roundtrip_preserves_identity_and_property() {
        let mut props = PropertyMap::new();
        props.insert(Property::ConnId, "x");
        let packet = Packet::Connect(ConnectPacket {
            version: 1,
            identity: Identity::new("u", "c", "p"),
            props,
        });

        let frame = packet.encode().unwrap();
        let decoded = Packet::decode(&frame).unwrap();

        let Packet::Connect(c) = decoded else {
            panic!("expected Connect");
        };
        assert_eq!(c.identity, Identity::new("u", "c", "p"));
        assert_eq!(c.props.get(Property::ConnId), Some("x"));
    }

    #[test]
    fn message_roundtrip_flags_bit_exact() {
        let packet = MessagePacket {
            id: 456,
            qos: Qos::Qos1,
            dup: true,
            kind: 60,
            payload: b"QoS1".to_vec(),
            props: PropertyMap::new(),
        };

        let frame = Packet::Message(packet.clone()).encode().unwrap();
        // header(2) + flags(1) + id(2) + props_count(1) + payload(4)
        let flags = frame[2];
        assert_eq!(flags, 0b1111_1100);

        let decoded = Packet::decode(&frame).unwrap();
        let Packet::Message(m) = decoded else {
            panic!("expected Message");
        };
        assert_eq!(m, packet);
    }

    #[test]
    fn message_kind_too_large_rejected() {
        let packet = Packet::Message(MessagePacket {
            id: 1,
            qos: Qos::Qos0,
            dup: false,
            kind: 64,
            payload: vec![],
            props: PropertyMap::new(),
        });
        assert!(matches!(
            packet.encode(),
            Err(PacketError::MessageKindTooLarge { kind: 64 })
        ));
    }

    #[test]
    fn message_with_large_payload_uses_long_header() {
        let payload = vec![b'a'; 10_000];
        let packet = Packet::Message(MessagePacket {
            id: u16::MAX,
            qos: Qos::Qos0,
            dup: false,
            kind: 0,
            payload: payload.clone(),
            props: PropertyMap::new(),
        });

        let frame = packet.encode().unwrap();
        let decoded = Packet::decode(&frame).unwrap();
        let Packet::Message(m) = decoded else {
            panic!("expected Message");
        };
        assert_eq!(m.id, u16::MAX);
        assert_eq!(m.payload, payload);
    }

    #[test]
    fn request_then_response_roundtrip() {
        let request = Packet::Request(RequestPacket {
            id: 1,
            method: "m".to_string(),
            body: vec![],
            props: PropertyMap::new(),
        });
        let frame = request.encode().unwrap();
        let Packet::Request(decoded_request) = Packet::decode(&frame).unwrap() else {
            panic!("expected Request");
        };

        let response = Packet::Response(ResponsePacket {
            id: decoded_request.id,
            code: StatusCode::Ok,
            body: b"ok".to_vec(),
            props: PropertyMap::new(),
        });
        let frame = response.encode().unwrap();
        let Packet::Response(r) = Packet::decode(&frame).unwrap() else {
            panic!("expected Response");
        };
        assert_eq!(r.id, 1);
        assert!(r.code.is_ok());
        assert_eq!(r.body, b"ok");
    }

    #[test]
    fn close_encodes_to_three_bytes_with_no_property_map() {
        let packet = Packet::Close(ClosePacket {
            code: CloseCode::AuthFailure,
        });
        let frame = packet.encode().unwrap();
        assert_eq!(&frame[..], &[PacketType::Close as u8 * 16, 0x01, 0x04]);
    }
}
