//! The 3-byte header at the front of every session packet payload.

use serde::Serialize;

/// Encoded size of [`SessionHeader`].
pub const HEADER_SIZE: usize = 3;

/// What a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PacketType {
    /// Handshake packet; payload is empty.
    StartSession = 0,
    /// Application traffic for the established session.
    NormalTraffic = 1,
    /// Diagnostic text. With session id 0 it is delivered in any state.
    LogMessage = 2,
}

impl PacketType {
    /// Lowercase name for display.
    pub fn name(&self) -> &'static str {
        match self {
            PacketType::StartSession => "start_session",
            PacketType::NormalTraffic => "normal_traffic",
            PacketType::LogMessage => "log_message",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PacketType::StartSession),
            1 => Ok(PacketType::NormalTraffic),
            2 => Ok(PacketType::LogMessage),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Session id and packet type, as sent ahead of each payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionHeader {
    pub session_id: u16,
    pub packet_type: PacketType,
}

impl SessionHeader {
    pub fn new(session_id: u16, packet_type: PacketType) -> Self {
        Self {
            session_id,
            packet_type,
        }
    }

    /// Wire form: session id little-endian, then the type byte.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let [lo, hi] = self.session_id.to_le_bytes();
        [lo, hi, self.packet_type as u8]
    }

    /// Parse a header. An unknown type byte is returned as the error.
    pub fn decode(raw: [u8; HEADER_SIZE]) -> Result<Self, u8> {
        Ok(Self {
            session_id: u16::from_le_bytes([raw[0], raw[1]]),
            packet_type: PacketType::try_from(raw[2])?,
        })
    }

    /// Parse the header at the front of `bytes`, if it is long enough and valid.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; HEADER_SIZE] = bytes.get(..HEADER_SIZE)?.try_into().ok()?;
        Self::decode(raw).ok()
    }

    /// Low byte of the session id: the initiator's nonce.
    pub fn initiator_nonce(&self) -> u8 {
        self.session_id.to_le_bytes()[0]
    }

    /// High byte of the session id: the responder's nonce, 0 in a request.
    pub fn responder_nonce(&self) -> u8 {
        self.session_id.to_le_bytes()[1]
    }
}
