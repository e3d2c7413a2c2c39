use crate::{Codec, DecodeError, decode_bytes, encode_bytes};
use infer_base::{DType, Tensor, TensorError, tensor::shape_numel};
use std::fmt;

#[derive(Debug, PartialEq)]
pub enum CodecError {
    /// Payload length disagrees with the declared shape and dtype.
    SizeMismatch { declared: usize, actual: usize },
    UnsupportedDtype(String),
    Decode(DecodeError),
    /// Text payload that does not describe a valid tensor or message.
    Malformed(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::SizeMismatch { declared, actual } => {
                write!(f, "declared size {declared} bytes, payload has {actual}")
            }
            CodecError::UnsupportedDtype(name) => write!(f, "unsupported dtype: {name}"),
            CodecError::Decode(err) => write!(f, "decode error: {err}"),
            CodecError::Malformed(msg) => write!(f, "malformed payload: {msg}"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<DecodeError> for CodecError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Tensor(err) => err.into(),
            err => CodecError::Decode(err),
        }
    }
}

impl From<TensorError> for CodecError {
    fn from(err: TensorError) -> Self {
        match err {
            TensorError::UnsupportedDtype(name) => CodecError::UnsupportedDtype(name),
            TensorError::ShapeMismatch { expected, got } => CodecError::SizeMismatch {
                declared: expected,
                actual: got,
            },
            err => CodecError::Malformed(err.to_string()),
        }
    }
}

/// Raw payload of a tensor: its elements in little-endian order.
pub fn encode(tensor: &Tensor) -> Vec<u8> {
    tensor.data().to_vec()
}

/// Rebuild a tensor from its raw payload and declared metadata.
pub fn decode(name: &str, bytes: &[u8], shape: &[usize], dtype: DType) -> Result<Tensor, CodecError> {
    let declared = shape_numel(shape)?
        .checked_mul(dtype.byte_size())
        .ok_or_else(|| CodecError::Malformed(format!("shape {shape:?} overflows")))?;
    if declared != bytes.len() {
        return Err(CodecError::SizeMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    Ok(Tensor::new(name, dtype, shape.to_vec(), bytes.to_vec())?)
}

/// `decode` with the dtype given by its wire name.
pub fn decode_wire(
    name: &str,
    bytes: &[u8],
    shape: &[usize],
    wire_dtype: &str,
) -> Result<Tensor, CodecError> {
    let dtype = DType::from_wire(wire_dtype)?;
    decode(name, bytes, shape, dtype)
}

/// Convert wire dimensions to `usize`, rejecting negative or oversized values.
pub fn shape_from_wire(dims: &[i64]) -> Result<Vec<usize>, CodecError> {
    dims.iter()
        .map(|&dim| {
            usize::try_from(dim).map_err(|_| CodecError::Malformed(format!("invalid dimension {dim}")))
        })
        .collect()
}

// Binary message layout: name, wire dtype, u64 dims, length-prefixed payload.
impl Codec for Tensor {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.name().to_string().encode(buf);
        self.dtype().wire_name().to_string().encode(buf);
        let dims: Vec<u64> = self.shape().iter().map(|&d| d as u64).collect();
        dims.encode(buf);
        encode_bytes(buf, self.data());
    }

    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, DecodeError> {
        let name = String::decode(buf, pos)?;
        let dtype = DType::from_wire(&String::decode(buf, pos)?)?;
        let dims = Vec::<u64>::decode(buf, pos)?;
        let shape = dims
            .into_iter()
            .map(|d| usize::try_from(d).map_err(|_| DecodeError::LengthOverflow(d)))
            .collect::<Result<Vec<_>, _>>()?;
        let data = decode_bytes(buf, pos)?.to_vec();
        Ok(Tensor::new(name, dtype, shape, data)?)
    }
}
