//! Boundary value types: opaque byte-sequence addressing and strict UTF-8 text decoding.

/// Identifies a remote peer. Opaque bytes; equality is byte-exact, stable for the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        PeerId(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode as text. Peer ids cross the boundary as raw bytes; text is strict UTF-8.
    pub fn to_text(&self) -> Result<&str, DecodeError> {
        decode_str("peer id", &self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.as_bytes().to_vec())
    }
}

/// Names a gossip channel. Opaque bytes; not hierarchical. Empty is valid but discouraged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(Vec<u8>);

impl Topic {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Topic(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_text(&self) -> Result<&str, DecodeError> {
        decode_str("topic", &self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Topic(s.as_bytes().to_vec())
    }
}

/// Names an RPC procedure. Same shape as [`Topic`], for request/response traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method(Vec<u8>);

impl Method {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Method(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_text(&self) -> Result<&str, DecodeError> {
        decode_str("method", &self.0)
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        Method(s.as_bytes().to_vec())
    }
}

/// Which side of an RPC exchange a message represents. Carried explicitly on
/// every RPC operation and event; the bridge holds no correlation state to
/// infer it from.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Request = 0,
    Response = 1,
}

impl Direction {
    /// Wire flag for this direction (0 = request, 1 = response).
    pub fn flag(self) -> u8 {
        self as u8
    }

    pub fn from_flag(flag: u8) -> Result<Self, DecodeError> {
        match flag {
            0 => Ok(Direction::Request),
            1 => Ok(Direction::Response),
            other => Err(DecodeError::DirectionFlag(other)),
        }
    }
}

/// A byte sequence failed the documented boundary encoding. Never recovered by
/// substitution; the offending event or value is rejected outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{field} is not valid utf-8 (first invalid byte at offset {valid_up_to})")]
    Utf8 {
        field: &'static str,
        valid_up_to: usize,
    },
    #[error("invalid rpc direction flag: {0}")]
    DirectionFlag(u8),
}

/// Decode a text field crossing the boundary. Strict: invalid UTF-8 fails
/// explicitly rather than substituting replacement characters.
pub fn decode_text(field: &'static str, bytes: &[u8]) -> Result<String, DecodeError> {
    decode_str(field, bytes).map(str::to_string)
}

fn decode_str<'a>(field: &'static str, bytes: &'a [u8]) -> Result<&'a str, DecodeError> {
    std::str::from_utf8(bytes).map_err(|e| DecodeError::Utf8 {
        field,
        valid_up_to: e.valid_up_to(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_roundtrip() {
        let topic = Topic::from("shard-7");
        assert_eq!(topic.as_bytes(), b"shard-7");
        assert_eq!(topic.to_text().unwrap(), "shard-7");
        let peer = PeerId::from("16Uiu2HAm");
        assert_eq!(peer.to_text().unwrap(), "16Uiu2HAm");
    }

    #[test]
    fn bytes_preserved_exactly() {
        let raw = vec![0u8, 1, 2, 254, 255];
        let method = Method::new(raw.clone());
        assert_eq!(method.as_bytes(), raw.as_slice());
    }

    #[test]
    fn empty_topic_is_valid() {
        let topic = Topic::new(Vec::new());
        assert_eq!(topic.to_text().unwrap(), "");
    }

    #[test]
    fn invalid_utf8_fails_explicitly() {
        let topic = Topic::new(vec![b't', 0xff, b'x']);
        let err = topic.to_text().unwrap_err();
        assert_eq!(
            err,
            DecodeError::Utf8 {
                field: "topic",
                valid_up_to: 1
            }
        );
    }

    #[test]
    fn decode_text_owned() {
        assert_eq!(decode_text("peer id", b"abc").unwrap(), "abc");
        assert!(decode_text("peer id", &[0x80]).is_err());
    }

    #[test]
    fn direction_flags() {
        assert_eq!(Direction::Request.flag(), 0);
        assert_eq!(Direction::Response.flag(), 1);
        assert_eq!(Direction::from_flag(0).unwrap(), Direction::Request);
        assert_eq!(Direction::from_flag(1).unwrap(), Direction::Response);
        assert!(matches!(
            Direction::from_flag(2),
            Err(DecodeError::DirectionFlag(2))
        ));
    }
}
