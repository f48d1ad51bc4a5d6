//! Packet framing: `header ‖ payload`.
//!
//! ```text
//! byte0: TTTT LL XX    TTTT = PacketType (0..15)
//!                      LL   = extra length bytes (0..3) beyond the baseline 2
//!                      XX   = high 2 bits of baseline length
//! byte1: XXXXXXXX      low 8 bits of baseline length
//! [optional LL extra bytes, big-endian, extending the length on the HIGH side]
//! ```
//!
//! Short regime (`len <= 0x3FF`): a 2-byte header, `LL = 0`.
//! Long regime (`0x3FF < len <= MAX_LEN`): `LL` extra bytes carry the low
//! order bits of `len`, with the 10-bit baseline in byte0/byte1 carrying
//! the high order bits: `len == (baseline << (8*LL)) | extra`.

use bytes::{BufMut, BytesMut};

use crate::error::PacketError;

/// Largest payload length representable by the framing header.
pub const MAX_LEN: u32 = 0x3FFF_FFFF;

const SHORT_LEN_MAX: u32 = 0x3FF;
const MAX_EXTRA_BYTES: u32 = 3;

/// The nine wire packet kinds, packed into the header's high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 0,
    Connack = 1,
    Message = 2,
    Messack = 3,
    Request = 4,
    Response = 5,
    Ping = 6,
    Pong = 7,
    Close = 8,
}

impl TryFrom<u8> for PacketType {
    type Error = PacketError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => PacketType::Connect,
            1 => PacketType::Connack,
            2 => PacketType::Message,
            3 => PacketType::Messack,
            4 => PacketType::Request,
            5 => PacketType::Response,
            6 => PacketType::Ping,
            7 => PacketType::Pong,
            8 => PacketType::Close,
            other => return Err(PacketError::UnknownPacketType(other)),
        })
    }
}

/// Picks the smallest number of extra bytes (0..=3) such that the
/// remaining baseline fits in 10 bits, matching the decode formula
/// `len == (baseline << (8*ll)) | extra`.
fn split_len(len: u32) -> (u32, u32, u32) {
    let mut ll = 0;
    while ll < MAX_EXTRA_BYTES && (len >> (8 * ll)) > SHORT_LEN_MAX {
        ll += 1;
    }
    let baseline = len >> (8 * ll);
    let extra = if ll == 0 { 0 } else { len & ((1u32 << (8 * ll)) - 1) };
    (baseline, ll, extra)
}

/// Encodes the frame header for `packet_type` and `len`, appending it to
/// `buf`. Does not write the payload.
pub fn encode_header(buf: &mut BytesMut, packet_type: PacketType, len: u32) -> Result<(), PacketError> {
    if len > MAX_LEN {
        return Err(PacketError::PacketSizeTooLarge { len, max: MAX_LEN });
    }

    let (baseline, ll, extra) = split_len(len);
    let type_nibble = packet_type as u8;

    let byte0 = (type_nibble << 4) | ((ll as u8) << 2) | ((baseline >> 8) as u8 & 0x03);
    let byte1 = (baseline & 0xFF) as u8;

    buf.put_u8(byte0);
    buf.put_u8(byte1);

    for i in (0..ll).rev() {
        buf.put_u8(((extra >> (8 * i)) & 0xFF) as u8);
    }

    Ok(())
}

/// Encodes a complete frame (`header ‖ payload`).
pub fn encode_frame(packet_type: PacketType, payload: &[u8]) -> Result<BytesMut, PacketError> {
    let len = u32::try_from(payload.len()).map_err(|_| PacketError::PacketSizeTooLarge {
        len: u32::MAX,
        max: MAX_LEN,
    })?;
    let mut buf = BytesMut::with_capacity(2 + payload.len());
    encode_header(&mut buf, packet_type, len)?;
    buf.put_slice(payload);
    Ok(buf)
}

/// Decodes a frame header from the front of `buf`, returning the packet
/// type, the declared payload length, and the payload slice.
pub fn decode_frame(buf: &[u8]) -> Result<(PacketType, &[u8]), PacketError> {
    if buf.len() < 2 {
        return Err(PacketError::InvalidReadLen);
    }
    let byte0 = buf[0];
    let byte1 = buf[1];

    let packet_type = PacketType::try_from(byte0 >> 4)?;
    let ll = ((byte0 >> 2) & 0x03) as usize;
    let baseline = (((byte0 & 0x03) as u32) << 8) | byte1 as u32;

    if buf.len() < 2 + ll {
        return Err(PacketError::InvalidReadLen);
    }
    let mut extra: u32 = 0;
    for i in 0..ll {
        extra = (extra << 8) | buf[2 + i] as u32;
    }

    let len = (baseline << (8 * ll as u32)) | extra;
    let header_len = 2 + ll;

    if buf.len() < header_len + len as usize {
        return Err(PacketError::InvalidReadLen);
    }

    Ok((packet_type, &buf[header_len..header_len + len as usize]))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn framing_lengths_roundtrip() {
        const MID_LEN: u32 = SHORT_LEN_MAX;
        for len in [0u32, 1, MID_LEN, MID_LEN + 1, 65535, 1 << 20] {
            let payload = vec![0xABu8; len as usize];
            let frame = encode_frame(PacketType::Ping, &payload).unwrap();
            let (ty, decoded_payload) = decode_frame(&frame).unwrap();
            assert_eq!(ty, PacketType::Ping);
            assert_eq!(decoded_payload.len(), len as usize);
        }
    }

    #[test]
    fn split_len_at_max_stays_in_three_extra_bytes() {
        let (baseline, ll, extra) = split_len(MAX_LEN);
        assert_eq!(ll, MAX_EXTRA_BYTES);
        assert!(baseline <= SHORT_LEN_MAX);
        assert_eq!((baseline << (8 * ll)) | extra, MAX_LEN);
    }

    #[test]
    fn oversized_len_rejected() {
        let mut buf = BytesMut::new();
        let err = encode_header(&mut buf, PacketType::Ping, MAX_LEN + 1).unwrap_err();
        assert!(matches!(err, PacketError::PacketSizeTooLarge { .. }));
    }

    #[test]
    fn short_regime_uses_two_byte_header() {
        let frame = encode_frame(PacketType::Ping, &[0u8; 10]).unwrap();
        // header(2) + payload(10)
        assert_eq!(frame.len(), 12);
    }

    #[test]
    fn unknown_packet_type_rejected() {
        let buf = [0xF0u8, 0x00];
        assert!(matches!(
            decode_frame(&buf),
            Err(PacketError::UnknownPacketType(15))
        ));
    }

    #[test]
    fn truncated_frame_rejected() {
        let frame = encode_frame(PacketType::Ping, &[0u8; 10]).unwrap();
        assert!(matches!(
            decode_frame(&frame[..frame.len() - 1]),
            Err(PacketError::InvalidReadLen)
        ));
    }
}
