use std::str::Utf8Error;

/// Failures raised while reading or writing primitive values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("buffer too short: needed {needed} bytes, {remaining} remaining")]
    BufferTooShort { needed: usize, remaining: usize },

    #[error("varint exceeded 10 bytes without a terminating byte")]
    VarintOverflow,

    #[error("value {value} does not fit in {bits}-bit wire width")]
    BigIntOverflow { value: u64, bits: u32 },

    #[error(transparent)]
    InvalidUtf8(#[from] Utf8Error),
}

/// Failures raised while framing or parsing a packet.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("frame shorter than its declared length")]
    InvalidReadLen,

    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("packet size {len} exceeds MAX_LEN {max}")]
    PacketSizeTooLarge { len: u32, max: u32 },

    #[error("message kind {kind:#04x} exceeds 0x3F")]
    MessageKindTooLarge { kind: u8 },
}
