//! MQTT 3.1.1 control packet codec.
//!
//! Packets are written into and read out of caller-owned byte buffers through
//! the [`Writer`] and [`Reader`] cursors. Every access is length checked, and
//! decoding borrows topic names and payloads straight out of the input buffer.
//!
//! Serializers return the number of bytes written. Deserializers take a whole
//! packet (fixed header included) and check its type before decoding it.

use super::config::Options;
use super::error::Error;
use super::{Message, QoS};

/// Protocol name carried in CONNECT.
pub const PROTOCOL_NAME: &str = "MQTT";
/// Protocol level for MQTT 3.1.1.
pub const PROTOCOL_LEVEL: u8 = 4;
/// Largest value the remaining-length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;
/// Most bytes the remaining-length field may occupy.
pub const MAX_REMAINING_LENGTH_BYTES: usize = 4;
/// SUBACK return code signalling a refused subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

/// Control packet types (upper nibble of the fixed header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    /// Client request to connect.
    Connect = 1,
    /// Connect acknowledgment.
    Connack = 2,
    /// Publish message.
    Publish = 3,
    /// QoS1 publish acknowledgment.
    Puback = 4,
    /// QoS2 publish received.
    Pubrec = 5,
    /// QoS2 publish release.
    Pubrel = 6,
    /// QoS2 publish complete.
    Pubcomp = 7,
    /// Subscribe request.
    Subscribe = 8,
    /// Subscribe acknowledgment.
    Suback = 9,
    /// Unsubscribe request.
    Unsubscribe = 10,
    /// Unsubscribe acknowledgment.
    Unsuback = 11,
    /// Ping request.
    Pingreq = 12,
    /// Ping response.
    Pingresp = 13,
    /// Client is disconnecting.
    Disconnect = 14,
}

impl PacketType {
    /// Map a 4-bit type value.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => PacketType::Connect,
            2 => PacketType::Connack,
            3 => PacketType::Publish,
            4 => PacketType::Puback,
            5 => PacketType::Pubrec,
            6 => PacketType::Pubrel,
            7 => PacketType::Pubcomp,
            8 => PacketType::Subscribe,
            9 => PacketType::Suback,
            10 => PacketType::Unsubscribe,
            11 => PacketType::Unsuback,
            12 => PacketType::Pingreq,
            13 => PacketType::Pingresp,
            14 => PacketType::Disconnect,
            _ => return None,
        })
    }
}

/// The first byte of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FixedHeader {
    /// Packet type.
    pub packet_type: PacketType,
    /// Duplicate delivery flag.
    pub dup: bool,
    /// Raw QoS bits.
    pub qos: u8,
    /// Retain flag.
    pub retain: bool,
}

impl FixedHeader {
    /// A header with all flags cleared.
    pub const fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            dup: false,
            qos: 0,
            retain: false,
        }
    }

    /// Pack into `type << 4 | dup << 3 | qos << 1 | retain`.
    pub fn to_byte(self) -> u8 {
        ((self.packet_type as u8) << 4)
            | (u8::from(self.dup) << 3)
            | ((self.qos & 0x03) << 1)
            | u8::from(self.retain)
    }

    /// Unpack a header byte.
    pub fn from_byte(byte: u8) -> Result<Self, Error> {
        let packet_type = PacketType::from_u8(byte >> 4).ok_or(Error::InvalidPacketType)?;
        Ok(Self {
            packet_type,
            dup: byte & 0x08 != 0,
            qos: (byte >> 1) & 0x03,
            retain: byte & 0x01 != 0,
        })
    }
}

/// Encode `len` as a remaining-length field into `out`, returning the number
/// of bytes used.
pub fn encode_remaining_length(len: usize, out: &mut [u8; MAX_REMAINING_LENGTH_BYTES]) -> Result<usize, Error> {
    if len > MAX_REMAINING_LENGTH {
        return Err(Error::TxBufferTooShort);
    }
    let mut value = len;
    let mut i = 0;
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        out[i] = byte;
        i += 1;
        if value == 0 {
            return Ok(i);
        }
    }
}

/// Number of bytes the remaining-length field takes for `len`.
pub fn remaining_length_size(len: usize) -> usize {
    match len {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Decode a remaining-length field one byte at a time from `next_byte`.
///
/// Fails with [`Error::DecodeRemainingLength`] when a fifth byte would be
/// needed. Errors from `next_byte` are passed through unchanged.
pub fn decode_remaining_length_with<F>(mut next_byte: F) -> Result<usize, Error>
where
    F: FnMut() -> Result<u8, Error>,
{
    let mut value = 0usize;
    let mut multiplier = 1usize;
    let mut consumed = 0;
    loop {
        consumed += 1;
        if consumed > MAX_REMAINING_LENGTH_BYTES {
            return Err(Error::DecodeRemainingLength);
        }
        let byte = next_byte()?;
        value += usize::from(byte & 0x7F) * multiplier;
        multiplier *= 128;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

/// Decode a remaining-length field from the start of `bytes`, returning the
/// value and the number of bytes consumed.
pub fn decode_remaining_length(bytes: &[u8]) -> Result<(usize, usize), Error> {
    let mut iter = bytes.iter();
    let mut consumed = 0;
    let value = decode_remaining_length_with(|| {
        consumed += 1;
        iter.next().copied().ok_or(Error::MalformedPacket)
    })?;
    Ok((value, consumed))
}

/// A bounds-checked write cursor over an outbound buffer.
#[derive(Debug)]
pub struct Writer<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl<'b> Writer<'b> {
    /// Start writing at the beginning of `buf`.
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Append raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self
            .pos
            .checked_add(bytes.len())
            .ok_or(Error::TxBufferTooShort)?;
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(Error::TxBufferTooShort)?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Append one byte.
    pub fn put_u8(&mut self, value: u8) -> Result<(), Error> {
        self.put_bytes(&[value])
    }

    /// Append a big-endian `u16`.
    pub fn put_u16(&mut self, value: u16) -> Result<(), Error> {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Append a length-prefixed UTF-8 string (or binary field).
    pub fn put_utf8(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let len = u16::try_from(bytes.len()).map_err(|_| Error::InvalidArgument)?;
        self.put_u16(len)?;
        self.put_bytes(bytes)
    }

    /// Append a fixed header and the remaining-length field.
    pub fn put_header(&mut self, header: FixedHeader, remaining_length: usize) -> Result<(), Error> {
        let mut encoded = [0u8; MAX_REMAINING_LENGTH_BYTES];
        let n = encode_remaining_length(remaining_length, &mut encoded)?;
        self.put_u8(header.to_byte())?;
        self.put_bytes(&encoded[..n])
    }
}

/// A bounds-checked read cursor over an inbound packet.
#[derive(Debug, Clone)]
pub struct Reader<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> Reader<'b> {
    /// Start reading at the beginning of `buf`.
    pub fn new(buf: &'b [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take `n` bytes.
    pub fn get_bytes(&mut self, n: usize) -> Result<&'b [u8], Error> {
        let end = self.pos.checked_add(n).ok_or(Error::MalformedPacket)?;
        let bytes = self.buf.get(self.pos..end).ok_or(Error::MalformedPacket)?;
        self.pos = end;
        Ok(bytes)
    }

    /// Take one byte.
    pub fn get_u8(&mut self) -> Result<u8, Error> {
        Ok(self.get_bytes(1)?[0])
    }

    /// Take a big-endian `u16`.
    pub fn get_u16(&mut self) -> Result<u16, Error> {
        let bytes = self.get_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Take a length-prefixed field.
    pub fn get_utf8(&mut self) -> Result<&'b [u8], Error> {
        let len = usize::from(self.get_u16()?);
        self.get_bytes(len)
    }

    /// Take everything that is left.
    pub fn rest(&mut self) -> &'b [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}

/// Split a whole packet into its header and a reader over exactly its body.
pub fn read_header(packet: &[u8]) -> Result<(FixedHeader, Reader<'_>), Error> {
    let first = *packet.first().ok_or(Error::MalformedPacket)?;
    let header = FixedHeader::from_byte(first)?;
    let (remaining_length, consumed) = decode_remaining_length(&packet[1..])?;
    let start = 1 + consumed;
    let body = packet
        .get(start..start + remaining_length)
        .ok_or(Error::MalformedPacket)?;
    Ok((header, Reader::new(body)))
}

fn expect_header(packet: &[u8], expected: PacketType) -> Result<(FixedHeader, Reader<'_>), Error> {
    let (header, reader) = read_header(packet)?;
    if header.packet_type != expected {
        return Err(Error::InvalidPacketType);
    }
    Ok((header, reader))
}

/// Serialize a CONNECT packet.
pub fn serialize_connect(buf: &mut [u8], options: &Options<'_>) -> Result<usize, Error> {
    let mut remaining = 10 + 2 + options.client_id.len();
    let mut flags = 0u8;
    if options.clean_session {
        flags |= 1 << 1;
    }
    if let Some(will) = &options.will {
        remaining += 2 + will.topic.len() + 2 + will.message.len();
        flags |= 1 << 2;
        flags |= (will.qos as u8) << 3;
        if will.retain {
            flags |= 1 << 5;
        }
    }
    if let Some(username) = options.username {
        remaining += 2 + username.len();
        flags |= 1 << 7;
    }
    if let Some(password) = options.password {
        remaining += 2 + password.len();
        flags |= 1 << 6;
    }

    let mut w = Writer::new(buf);
    w.put_header(FixedHeader::new(PacketType::Connect), remaining)?;
    w.put_utf8(PROTOCOL_NAME.as_bytes())?;
    w.put_u8(PROTOCOL_LEVEL)?;
    w.put_u8(flags)?;
    w.put_u16(options.keep_alive_seconds)?;
    w.put_utf8(options.client_id.as_bytes())?;
    if let Some(will) = &options.will {
        w.put_utf8(will.topic.as_bytes())?;
        w.put_utf8(will.message)?;
    }
    if let Some(username) = options.username {
        w.put_utf8(username.as_bytes())?;
    }
    if let Some(password) = options.password {
        w.put_utf8(password.as_bytes())?;
    }
    Ok(w.position())
}

/// A decoded CONNACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connack {
    /// The broker resumed a stored session.
    pub session_present: bool,
    /// Raw return code; `0` means accepted.
    pub return_code: u8,
}

/// Deserialize a CONNACK packet. Its remaining length must be exactly 2.
pub fn deserialize_connack(packet: &[u8]) -> Result<Connack, Error> {
    let (_, mut r) = expect_header(packet, PacketType::Connack)?;
    if r.remaining() != 2 {
        return Err(Error::MalformedPacket);
    }
    let flags = r.get_u8()?;
    let return_code = r.get_u8()?;
    Ok(Connack {
        session_present: flags & 0x01 != 0,
        return_code,
    })
}

/// Serialize a PUBLISH packet. `packet_id` is only written when `qos` is not
/// [`QoS::AtMostOnce`].
pub fn serialize_publish(
    buf: &mut [u8],
    topic: &str,
    payload: &[u8],
    qos: QoS,
    retain: bool,
    dup: bool,
    packet_id: u16,
) -> Result<usize, Error> {
    let mut remaining = 2 + topic.len() + payload.len();
    if qos != QoS::AtMostOnce {
        remaining += 2;
    }
    let header = FixedHeader {
        packet_type: PacketType::Publish,
        dup,
        qos: qos as u8,
        retain,
    };

    let mut w = Writer::new(buf);
    w.put_header(header, remaining)?;
    w.put_utf8(topic.as_bytes())?;
    if qos != QoS::AtMostOnce {
        w.put_u16(packet_id)?;
    }
    w.put_bytes(payload)?;
    Ok(w.position())
}

/// A decoded PUBLISH, borrowing topic and payload from the packet buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publish<'b> {
    /// Topic name.
    pub topic: &'b str,
    /// Flags, packet id and payload.
    pub message: Message<'b>,
}

/// Deserialize a PUBLISH packet.
pub fn deserialize_publish(packet: &[u8]) -> Result<Publish<'_>, Error> {
    let (header, mut r) = expect_header(packet, PacketType::Publish)?;
    let qos = QoS::from_u8(header.qos).ok_or(Error::MalformedPacket)?;
    let topic = core::str::from_utf8(r.get_utf8()?).map_err(|_| Error::MalformedPacket)?;
    let id = if qos == QoS::AtMostOnce { 0 } else { r.get_u16()? };
    let payload = r.rest();
    Ok(Publish {
        topic,
        message: Message {
            qos,
            retain: header.retain,
            dup: header.dup,
            id,
            payload,
        },
    })
}

/// Serialize a two-byte acknowledgment (PUBACK, PUBREC, PUBCOMP, ...).
pub fn serialize_ack(buf: &mut [u8], packet_type: PacketType, dup: bool, packet_id: u16) -> Result<usize, Error> {
    let header = FixedHeader {
        packet_type,
        dup,
        qos: if packet_type == PacketType::Pubrel { 1 } else { 0 },
        retain: false,
    };
    let mut w = Writer::new(buf);
    w.put_header(header, 2)?;
    w.put_u16(packet_id)?;
    Ok(w.position())
}

/// Deserialize a two-byte acknowledgment, returning its type, DUP flag and
/// packet id.
pub fn deserialize_ack(packet: &[u8]) -> Result<(PacketType, bool, u16), Error> {
    let (header, mut r) = read_header(packet)?;
    if r.remaining() != 2 {
        return Err(Error::MalformedPacket);
    }
    Ok((header.packet_type, header.dup, r.get_u16()?))
}

/// Serialize a SUBSCRIBE packet for one or more filters.
pub fn serialize_subscribe(buf: &mut [u8], dup: bool, packet_id: u16, filters: &[(&str, QoS)]) -> Result<usize, Error> {
    let remaining = 2 + filters.iter().map(|(t, _)| 2 + t.len() + 1).sum::<usize>();
    let header = FixedHeader {
        packet_type: PacketType::Subscribe,
        dup,
        qos: 1,
        retain: false,
    };
    let mut w = Writer::new(buf);
    w.put_header(header, remaining)?;
    w.put_u16(packet_id)?;
    for (topic, qos) in filters {
        w.put_utf8(topic.as_bytes())?;
        w.put_u8(*qos as u8)?;
    }
    Ok(w.position())
}

/// Deserialize a SUBACK, copying granted QoS codes into `granted`. Returns the
/// packet id and the number of codes.
pub fn deserialize_suback(packet: &[u8], granted: &mut [u8]) -> Result<(u16, usize), Error> {
    let (_, mut r) = expect_header(packet, PacketType::Suback)?;
    let packet_id = r.get_u16()?;
    let codes = r.rest();
    let slots = granted.get_mut(..codes.len()).ok_or(Error::MalformedPacket)?;
    slots.copy_from_slice(codes);
    Ok((packet_id, codes.len()))
}

/// Serialize an UNSUBSCRIBE packet for one or more filters.
pub fn serialize_unsubscribe(buf: &mut [u8], dup: bool, packet_id: u16, filters: &[&str]) -> Result<usize, Error> {
    let remaining = 2 + filters.iter().map(|t| 2 + t.len()).sum::<usize>();
    let header = FixedHeader {
        packet_type: PacketType::Unsubscribe,
        dup,
        qos: 1,
        retain: false,
    };
    let mut w = Writer::new(buf);
    w.put_header(header, remaining)?;
    w.put_u16(packet_id)?;
    for topic in filters {
        w.put_utf8(topic.as_bytes())?;
    }
    Ok(w.position())
}

/// Deserialize an UNSUBACK, returning its packet id.
pub fn deserialize_unsuback(packet: &[u8]) -> Result<u16, Error> {
    let (packet_type, _, packet_id) = deserialize_ack(packet)?;
    if packet_type != PacketType::Unsuback {
        return Err(Error::InvalidPacketType);
    }
    Ok(packet_id)
}

/// Serialize a packet with no variable header or payload (PINGREQ, DISCONNECT).
pub fn serialize_zero(buf: &mut [u8], packet_type: PacketType) -> Result<usize, Error> {
    let mut w = Writer::new(buf);
    w.put_header(FixedHeader::new(packet_type), 0)?;
    Ok(w.position())
}
