//! Wire codec for tensors and the binary message protocol.
//!
//! `Codec` is the little-endian binary encoding used by the streaming
//! transport. `tensor::encode`/`tensor::decode` convert between a `Tensor`
//! and its raw payload bytes, which both transports carry unchanged.

mod primitives;
pub mod tensor;

pub use infer_codec_derive::Codec;
pub use primitives::{decode_bytes, encode_bytes};
pub use tensor::{CodecError, decode, decode_wire, encode, shape_from_wire};

use infer_base::TensorError;
use std::fmt;

#[derive(Debug, PartialEq)]
pub enum DecodeError {
    UnexpectedEof,
    InvalidUtf8,
    InvalidBool(u8),
    InvalidVariant(u32),
    TrailingBytes(usize),
    LengthOverflow(u64),
    Tensor(TensorError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "unexpected end of buffer"),
            DecodeError::InvalidUtf8 => write!(f, "invalid UTF-8 in string"),
            DecodeError::InvalidBool(v) => write!(f, "invalid bool value: {v}"),
            DecodeError::InvalidVariant(v) => write!(f, "invalid enum variant: {v}"),
            DecodeError::TrailingBytes(n) => write!(f, "{n} trailing bytes after message"),
            DecodeError::LengthOverflow(v) => write!(f, "length {v} does not fit in memory"),
            DecodeError::Tensor(err) => write!(f, "invalid tensor: {err}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TensorError> for DecodeError {
    fn from(err: TensorError) -> Self {
        DecodeError::Tensor(err)
    }
}

pub trait Codec: Sized {
    fn encode(&self, buf: &mut Vec<u8>);
    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, DecodeError>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    /// Decode a complete message; leftover bytes are an error.
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut pos = 0;
        let value = Self::decode(bytes, &mut pos)?;
        if pos != bytes.len() {
            return Err(DecodeError::TrailingBytes(bytes.len() - pos));
        }
        Ok(value)
    }
}
