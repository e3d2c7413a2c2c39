use std::fmt;

#[derive(Debug)]
pub enum ComError {
    Io(std::io::Error),
    Decode(infer_codec::DecodeError),
    ConnectionClosed,
    MessageTooLarge(u64),
    /// The peer sent something the framing layer cannot interpret.
    Protocol(String),
    Timeout,
    PoolClosed,
}

impl ComError {
    /// True when the failure belongs to the connection rather than the message,
    /// so the same request may succeed on a fresh connection.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, ComError::Io(_) | ComError::ConnectionClosed)
    }
}

impl fmt::Display for ComError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComError::Io(err) => write!(f, "io error: {err}"),
            ComError::Decode(err) => write!(f, "decode error: {err}"),
            ComError::ConnectionClosed => write!(f, "connection closed"),
            ComError::MessageTooLarge(len) => write!(f, "message too large: {len} bytes"),
            ComError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            ComError::Timeout => write!(f, "operation timed out"),
            ComError::PoolClosed => write!(f, "connection pool is closed"),
        }
    }
}

impl std::error::Error for ComError {}

impl From<std::io::Error> for ComError {
    fn from(err: std::io::Error) -> Self {
        ComError::Io(err)
    }
}

impl From<infer_codec::DecodeError> for ComError {
    fn from(err: infer_codec::DecodeError) -> Self {
        ComError::Decode(err)
    }
}

impl From<http::Error> for ComError {
    fn from(err: http::Error) -> Self {
        ComError::Protocol(err.to_string())
    }
}
