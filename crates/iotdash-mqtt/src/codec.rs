//! MQTT 3.1.1 packet codec.
//!
//! Only the packets a QoS 0 subscriber needs are supported. Every packet is:
//!
//! ```text
//! byte 0      packet type (high nibble) | flags (low nibble)
//! byte 1..=4  remaining length, 7 bits per byte, high bit = continuation
//! ...         variable header and payload
//! ```
//!
//! WebSocket frames do not line up with packet boundaries, so [`Packet::decode`]
//! consumes from a growing buffer and returns `Ok(None)` until a whole packet
//! is available.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// Largest value the remaining-length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;
const CLEAN_SESSION_FLAG: u8 = 0b0000_0010;

const CONNECT: u8 = 1;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const PUBACK: u8 = 4;
const SUBSCRIBE: u8 = 8;
const SUBACK: u8 = 9;
const PINGREQ: u8 = 12;
const PINGRESP: u8 = 13;
const DISCONNECT: u8 = 14;

/// Return code of a SUBACK entry for a refused subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

/// CONNECT packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// Client identifier.
    pub client_id: String,
    /// Keep-alive interval in seconds.
    pub keep_alive: u16,
    /// Discard any previous session state.
    pub clean_session: bool,
}

/// CONNACK packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    /// The broker resumed a stored session.
    pub session_present: bool,
    /// `0` for accepted, anything else is a refusal.
    pub return_code: u8,
}

/// PUBLISH packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    /// Topic name.
    pub topic: String,
    /// Quality of service, `0`, `1` or `2`.
    pub qos: u8,
    /// Retained message flag.
    pub retain: bool,
    /// Present for QoS 1 and 2.
    pub packet_id: Option<u16>,
    /// Application payload.
    pub payload: Bytes,
}

/// SUBSCRIBE packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    /// Non-zero packet identifier.
    pub packet_id: u16,
    /// Topic filters with their requested QoS.
    pub filters: Vec<(String, u8)>,
}

/// SUBACK packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    /// Identifier of the acknowledged SUBSCRIBE.
    pub packet_id: u16,
    /// One granted QoS (or [`SUBACK_FAILURE`]) per filter.
    pub return_codes: Vec<u8>,
}

/// A control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Client → broker session request.
    Connect(Connect),
    /// Broker → client session response.
    ConnAck(ConnAck),
    /// Application message, either direction.
    Publish(Publish),
    /// QoS 1 acknowledgement.
    PubAck {
        /// Identifier of the acknowledged PUBLISH.
        packet_id: u16,
    },
    /// Client → broker subscription request.
    Subscribe(Subscribe),
    /// Broker → client subscription response.
    SubAck(SubAck),
    /// Keep-alive request.
    PingReq,
    /// Keep-alive response.
    PingResp,
    /// Graceful client disconnect.
    Disconnect,
}

impl Packet {
    /// Append the encoded packet to `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::StringTooLong`] for a string over 65535 bytes and
    /// [`CodecError::PacketTooLarge`] when the body exceeds
    /// [`MAX_REMAINING_LENGTH`].
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let mut body = BytesMut::new();
        let first_byte = match self {
            Self::Connect(connect) => {
                put_string(&mut body, PROTOCOL_NAME)?;
                body.put_u8(PROTOCOL_LEVEL);
                body.put_u8(if connect.clean_session {
                    CLEAN_SESSION_FLAG
                } else {
                    0
                });
                body.put_u16(connect.keep_alive);
                put_string(&mut body, &connect.client_id)?;
                CONNECT << 4
            }
            Self::ConnAck(ack) => {
                body.put_u8(u8::from(ack.session_present));
                body.put_u8(ack.return_code);
                CONNACK << 4
            }
            Self::Publish(publish) => {
                put_string(&mut body, &publish.topic)?;
                if publish.qos > 0 {
                    body.put_u16(publish.packet_id.ok_or(CodecError::Malformed(
                        "QoS > 0 publish without packet id",
                    ))?);
                }
                body.put_slice(&publish.payload);
                (PUBLISH << 4) | ((publish.qos & 0b11) << 1) | u8::from(publish.retain)
            }
            Self::PubAck { packet_id } => {
                body.put_u16(*packet_id);
                PUBACK << 4
            }
            Self::Subscribe(subscribe) => {
                body.put_u16(subscribe.packet_id);
                for (filter, qos) in &subscribe.filters {
                    put_string(&mut body, filter)?;
                    body.put_u8(*qos);
                }
                // SUBSCRIBE carries fixed flags 0b0010.
                (SUBSCRIBE << 4) | 0b0010
            }
            Self::SubAck(ack) => {
                body.put_u16(ack.packet_id);
                body.put_slice(&ack.return_codes);
                SUBACK << 4
            }
            Self::PingReq => PINGREQ << 4,
            Self::PingResp => PINGRESP << 4,
            Self::Disconnect => DISCONNECT << 4,
        };

        buf.put_u8(first_byte);
        put_remaining_length(buf, body.len())?;
        buf.put_slice(&body);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Take one complete packet off the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched when more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] for a malformed or unsupported packet. The
    /// stream cannot be resynchronized after an error.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, CodecError> {
        if buf.len() < 2 {
            return Ok(None);
        }
        let Some((remaining, length_bytes)) = read_remaining_length(&buf[1..])? else {
            return Ok(None);
        };
        let header_len = 1 + length_bytes;
        if buf.len() < header_len + remaining {
            return Ok(None);
        }

        let first_byte = buf[0];
        let mut frame = buf.split_to(header_len + remaining).freeze();
        frame.advance(header_len);

        let packet = match first_byte >> 4 {
            CONNECT => Self::Connect(decode_connect(&mut frame)?),
            CONNACK => {
                let flags = read_u8(&mut frame)?;
                let return_code = read_u8(&mut frame)?;
                Self::ConnAck(ConnAck {
                    session_present: flags & 0x01 == 0x01,
                    return_code,
                })
            }
            PUBLISH => Self::Publish(decode_publish(first_byte & 0x0F, &mut frame)?),
            PUBACK => Self::PubAck {
                packet_id: read_u16(&mut frame)?,
            },
            SUBSCRIBE => {
                let packet_id = read_u16(&mut frame)?;
                let mut filters = Vec::new();
                while frame.has_remaining() {
                    let filter = read_string(&mut frame)?;
                    filters.push((filter, read_u8(&mut frame)?));
                }
                Self::Subscribe(Subscribe { packet_id, filters })
            }
            SUBACK => {
                let packet_id = read_u16(&mut frame)?;
                Self::SubAck(SubAck {
                    packet_id,
                    return_codes: frame.to_vec(),
                })
            }
            PINGREQ => Self::PingReq,
            PINGRESP => Self::PingResp,
            DISCONNECT => Self::Disconnect,
            other => return Err(CodecError::UnsupportedPacketType(other)),
        };
        Ok(Some(packet))
    }
}

fn decode_connect(frame: &mut Bytes) -> Result<Connect, CodecError> {
    let protocol = read_string(frame)?;
    let level = read_u8(frame)?;
    if protocol != PROTOCOL_NAME || level != PROTOCOL_LEVEL {
        return Err(CodecError::Malformed("unsupported protocol version"));
    }
    let flags = read_u8(frame)?;
    let keep_alive = read_u16(frame)?;
    let client_id = read_string(frame)?;
    Ok(Connect {
        client_id,
        keep_alive,
        clean_session: flags & CLEAN_SESSION_FLAG != 0,
    })
}

fn decode_publish(flags: u8, frame: &mut Bytes) -> Result<Publish, CodecError> {
    let qos = (flags >> 1) & 0b11;
    if qos == 3 {
        return Err(CodecError::Malformed("publish with QoS 3"));
    }
    let topic = read_string(frame)?;
    let packet_id = if qos > 0 {
        Some(read_u16(frame)?)
    } else {
        None
    };
    Ok(Publish {
        topic,
        qos,
        retain: flags & 0x01 == 0x01,
        packet_id,
        payload: frame.split_off(0),
    })
}

fn put_remaining_length(buf: &mut BytesMut, mut len: usize) -> Result<(), CodecError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(CodecError::PacketTooLarge(len));
    }
    loop {
        // Masked to 7 bits, cannot truncate.
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if len == 0 {
            return Ok(());
        }
    }
}

/// Returns `(value, bytes used)`, or `None` if the field is still incomplete.
fn read_remaining_length(bytes: &[u8]) -> Result<Option<(usize, usize)>, CodecError> {
    let mut value = 0usize;
    for (i, byte) in bytes.iter().take(4).enumerate() {
        value += usize::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if bytes.len() >= 4 {
        return Err(CodecError::Malformed("remaining length longer than 4 bytes"));
    }
    Ok(None)
}

fn put_string(buf: &mut BytesMut, value: &str) -> Result<(), CodecError> {
    let len = u16::try_from(value.len()).map_err(|_| CodecError::StringTooLong(value.len()))?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn read_u8(frame: &mut Bytes) -> Result<u8, CodecError> {
    if frame.remaining() < 1 {
        return Err(CodecError::Malformed("truncated packet"));
    }
    Ok(frame.get_u8())
}

fn read_u16(frame: &mut Bytes) -> Result<u16, CodecError> {
    if frame.remaining() < 2 {
        return Err(CodecError::Malformed("truncated packet"));
    }
    Ok(frame.get_u16())
}

fn read_string(frame: &mut Bytes) -> Result<String, CodecError> {
    let len = usize::from(read_u16(frame)?);
    if frame.remaining() < len {
        return Err(CodecError::Malformed("truncated string"));
    }
    let raw = frame.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}
