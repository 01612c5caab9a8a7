use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;

// encode and decode bypass traditional libraries
// like serde or message pack

pub const PING: u8 = 1;
pub const SUBMIT_MESSAGE: u8 = 2;
pub const USER_WROTE_MESSAGE: u8 = 3;
pub const SUBMIT_USER_STATUS: u8 = 4;
pub const USER_STATUS_WAS_UPDATED: u8 = 5;
pub const LOGIN: u8 = 6;
pub const LOGIN_RESPONSE: u8 = 7;

/// Largest payload (and largest string field) a frame can carry.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Longest name, in bytes, a client may log in with.
pub const MAX_NAME_LEN: usize = 32;

/// Status broadcast by the server about some user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    LoggedIn,
    LoggedOut,
    Typing,
    NotTyping,
}

/// The subset of statuses a client may submit about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingStatus {
    Typing,
    NotTyping,
}

impl UserStatus {
    pub fn to_u8(self) -> u8 {
        match self {
            UserStatus::LoggedIn => 1,
            UserStatus::LoggedOut => 2,
            UserStatus::Typing => 3,
            UserStatus::NotTyping => 4,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(UserStatus::LoggedIn),
            2 => Ok(UserStatus::LoggedOut),
            3 => Ok(UserStatus::Typing),
            4 => Ok(UserStatus::NotTyping),
            v => Err(ProtocolError::InvalidStatus(v)),
        }
    }
}

impl TypingStatus {
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match UserStatus::from_u8(value)? {
            UserStatus::Typing => Ok(TypingStatus::Typing),
            UserStatus::NotTyping => Ok(TypingStatus::NotTyping),
            _ => Err(ProtocolError::InvalidStatus(value)),
        }
    }
}

impl From<TypingStatus> for UserStatus {
    fn from(status: TypingStatus) -> Self {
        match status {
            TypingStatus::Typing => UserStatus::Typing,
            TypingStatus::NotTyping => UserStatus::NotTyping,
        }
    }
}

/// Every message that travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Ping,
    // client -> server
    Login { name: Option<String> },
    SubmitMessage { message: String },
    SubmitUserStatus { status: TypingStatus },
    // server -> client
    LoginResponse { success: bool, message: String },
    UserWroteMessage { name: String, message: String },
    UserStatusWasUpdated { name: String, status: UserStatus },
}

type DecodeFn = fn(&[u8]) -> Result<Packet, ProtocolError>;

// opcode -> payload decoder
static DECODERS: [(u8, DecodeFn); 7] = [
    (PING, decode_ping),
    (SUBMIT_MESSAGE, decode_submit_message),
    (USER_WROTE_MESSAGE, decode_user_wrote_message),
    (SUBMIT_USER_STATUS, decode_submit_user_status),
    (USER_STATUS_WAS_UPDATED, decode_user_status_was_updated),
    (LOGIN, decode_login),
    (LOGIN_RESPONSE, decode_login_response),
];

impl Packet {
    pub fn opcode(&self) -> u8 {
        match self {
            Packet::Ping => PING,
            Packet::Login { .. } => LOGIN,
            Packet::SubmitMessage { .. } => SUBMIT_MESSAGE,
            Packet::SubmitUserStatus { .. } => SUBMIT_USER_STATUS,
            Packet::LoginResponse { .. } => LOGIN_RESPONSE,
            Packet::UserWroteMessage { .. } => USER_WROTE_MESSAGE,
            Packet::UserStatusWasUpdated { .. } => USER_STATUS_WAS_UPDATED,
        }
    }

    /// Serializes the type specific payload, without the frame header.
    pub fn encode_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = Vec::new();

        match self {
            Packet::Ping => {}
            Packet::Login { name } => {
                payload.extend_from_slice(checked(name.as_deref().unwrap_or_default())?);
            }
            Packet::SubmitMessage { message } => {
                payload.extend_from_slice(checked(message)?);
            }
            Packet::SubmitUserStatus { status } => {
                payload.push(UserStatus::from(*status).to_u8());
            }
            Packet::LoginResponse { success, message } => {
                payload.push(u8::from(*success));
                payload.extend_from_slice(checked(message)?);
            }
            Packet::UserWroteMessage { name, message } => {
                let name = checked(name)?;
                payload.push(name.len() as u8); // fits, checked above
                payload.extend_from_slice(name);
                payload.extend_from_slice(checked(message)?);
            }
            Packet::UserStatusWasUpdated { name, status } => {
                payload.push(status.to_u8());
                payload.extend_from_slice(checked(name)?);
            }
        }

        if payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge { len: payload.len() });
        }

        Ok(payload)
    }

    /// Writes the complete frame `[len][opcode][payload]` into `dst`.
    /// Nothing is written if the packet cannot be framed.
    pub fn encode_to(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload = self.encode_payload()?;
        dst.reserve(2 + payload.len());
        dst.put_u8(payload.len() as u8);
        dst.put_u8(self.opcode());
        dst.extend_from_slice(&payload);
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut dst = BytesMut::new();
        self.encode_to(&mut dst)?;
        Ok(dst.to_vec())
    }

    pub fn decode(opcode: u8, payload: &[u8]) -> Result<Packet, ProtocolError> {
        let (_, decode) = DECODERS
            .iter()
            .find(|(op, _)| *op == opcode)
            .ok_or(ProtocolError::UnknownPacketType(opcode))?;

        decode(payload)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Ping => write!(f, "Ping"),
            Packet::Login { name } => write!(f, "Login({})", name.as_deref().unwrap_or_default()),
            Packet::SubmitMessage { message } => write!(f, "SubmitMessage('{}')", message),
            Packet::SubmitUserStatus { status } => write!(f, "SubmitUserStatus({:?})", status),
            Packet::LoginResponse { success, message } => {
                write!(f, "LoginResponse(success={}, message={})", success, message)
            }
            Packet::UserWroteMessage { name, message } => {
                write!(f, "UserWroteMessage({}: '{}')", name, message)
            }
            Packet::UserStatusWasUpdated { name, status } => {
                write!(f, "UserStatusWasUpdated({} - {:?})", name, status)
            }
        }
    }
}

fn checked(field: &str) -> Result<&[u8], ProtocolError> {
    let bytes = field.as_bytes();
    if bytes.len() > MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge { len: bytes.len() });
    }
    Ok(bytes)
}

fn utf8(bytes: &[u8]) -> Result<String, ProtocolError> {
    Ok(String::from_utf8(bytes.to_vec())?)
}

// split off the leading status/flag byte that several payloads start with
fn lead_byte(opcode: u8, payload: &[u8]) -> Result<(u8, &[u8]), ProtocolError> {
    payload
        .split_first()
        .map(|(b, rest)| (*b, rest))
        .ok_or(ProtocolError::MalformedPayload { opcode, reason: "empty payload" })
}

// length is already known from the frame header, content is irrelevant
fn decode_ping(_payload: &[u8]) -> Result<Packet, ProtocolError> {
    Ok(Packet::Ping)
}

fn decode_submit_message(payload: &[u8]) -> Result<Packet, ProtocolError> {
    Ok(Packet::SubmitMessage { message: utf8(payload)? })
}

fn decode_user_wrote_message(payload: &[u8]) -> Result<Packet, ProtocolError> {
    let (name_len, rest) = lead_byte(USER_WROTE_MESSAGE, payload)?;
    let name_len = name_len as usize;
    if rest.len() < name_len {
        return Err(ProtocolError::MalformedPayload {
            opcode: USER_WROTE_MESSAGE,
            reason: "name length exceeds payload",
        });
    }

    let (name, message) = rest.split_at(name_len);
    Ok(Packet::UserWroteMessage { name: utf8(name)?, message: utf8(message)? })
}

fn decode_submit_user_status(payload: &[u8]) -> Result<Packet, ProtocolError> {
    let (status, _) = lead_byte(SUBMIT_USER_STATUS, payload)?;
    Ok(Packet::SubmitUserStatus { status: TypingStatus::from_u8(status)? })
}

fn decode_user_status_was_updated(payload: &[u8]) -> Result<Packet, ProtocolError> {
    let (status, name) = lead_byte(USER_STATUS_WAS_UPDATED, payload)?;
    Ok(Packet::UserStatusWasUpdated { name: utf8(name)?, status: UserStatus::from_u8(status)? })
}

fn decode_login(payload: &[u8]) -> Result<Packet, ProtocolError> {
    let name = if payload.is_empty() { None } else { Some(utf8(payload)?) };
    Ok(Packet::Login { name })
}

fn decode_login_response(payload: &[u8]) -> Result<Packet, ProtocolError> {
    let (success, message) = lead_byte(LOGIN_RESPONSE, payload)?;
    Ok(Packet::LoginResponse { success: success != 0, message: utf8(message)? })
}
