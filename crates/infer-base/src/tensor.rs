use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TensorError {
    ShapeOverflow,
    ShapeMismatch { expected: usize, got: usize },
    DtypeMismatch { expected: DType, got: DType },
    UnsupportedDtype(String),
    /// A `BOOL` element byte other than 0 or 1.
    InvalidBool(u8),
}

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorError::ShapeOverflow => write!(f, "shape dimensions overflow when multiplied"),
            TensorError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {expected} bytes, got {got}")
            }
            TensorError::DtypeMismatch { expected, got } => {
                write!(f, "dtype mismatch: expected {expected}, got {got}")
            }
            TensorError::UnsupportedDtype(name) => write!(f, "unsupported dtype: {name}"),
            TensorError::InvalidBool(byte) => write!(f, "invalid BOOL element: {byte}"),
        }
    }
}

impl std::error::Error for TensorError {}

/// Element type tag of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F16,
    F32,
    F64,
}

// Fixed dtype <-> wire name table shared by both transports.
const WIRE_NAMES: [(DType, &str); 12] = [
    (DType::Bool, "BOOL"),
    (DType::U8, "UINT8"),
    (DType::U16, "UINT16"),
    (DType::U32, "UINT32"),
    (DType::U64, "UINT64"),
    (DType::I8, "INT8"),
    (DType::I16, "INT16"),
    (DType::I32, "INT32"),
    (DType::I64, "INT64"),
    (DType::F16, "FP16"),
    (DType::F32, "FP32"),
    (DType::F64, "FP64"),
];

impl DType {
    /// Width of one element in bytes.
    pub fn byte_size(self) -> usize {
        match self {
            DType::Bool | DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 | DType::F16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::F32 | DType::F64)
    }

    pub fn wire_name(self) -> &'static str {
        WIRE_NAMES
            .iter()
            .find(|(dtype, _)| *dtype == self)
            .map(|(_, name)| *name)
            .unwrap_or("INVALID")
    }

    /// Look up a dtype by its wire name (`"UINT32"`, `"FP32"`, ...).
    pub fn from_wire(name: &str) -> Result<Self, TensorError> {
        WIRE_NAMES
            .iter()
            .find(|(_, wire)| *wire == name)
            .map(|(dtype, _)| *dtype)
            .ok_or_else(|| TensorError::UnsupportedDtype(name.to_string()))
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A Rust scalar type that can be stored in a `Tensor`.
pub trait Element: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;

    /// Append the little-endian representation of `self`.
    fn write_le(self, out: &mut Vec<u8>);

    /// Read one element. `bytes` is exactly `DTYPE.byte_size()` long.
    fn read_le(bytes: &[u8]) -> Self;

    fn to_f64(self) -> f64;
}

macro_rules! impl_element_for_numeric {
    ($($ty:ty => $dtype:ident),*) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_element_for_numeric!(
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    f32 => F32, f64 => F64
);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(u8::from(self));
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn to_f64(self) -> f64 {
        if self { 1.0 } else { 0.0 }
    }
}

/// Number of elements described by `shape`. An empty shape is a scalar.
pub fn shape_numel(shape: &[usize]) -> Result<usize, TensorError> {
    shape.iter().try_fold(1usize, |acc, &dim| {
        acc.checked_mul(dim).ok_or(TensorError::ShapeOverflow)
    })
}

/// Named tensor with a contiguous little-endian byte buffer.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    name: String,
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("name", &self.name)
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("byte_len", &self.data.len())
            .finish()
    }
}

impl Tensor {
    /// Build a tensor from raw little-endian bytes.
    ///
    /// Fails with `ShapeMismatch` unless `data.len()` equals the element count
    /// of `shape` times the width of `dtype`. `BOOL` bytes must be 0 or 1.
    pub fn new(
        name: impl Into<String>,
        dtype: DType,
        shape: Vec<usize>,
        data: Vec<u8>,
    ) -> Result<Self, TensorError> {
        let expected = shape_numel(&shape)?
            .checked_mul(dtype.byte_size())
            .ok_or(TensorError::ShapeOverflow)?;
        if expected != data.len() {
            return Err(TensorError::ShapeMismatch {
                expected,
                got: data.len(),
            });
        }
        if dtype == DType::Bool {
            if let Some(&byte) = data.iter().find(|&&b| b > 1) {
                return Err(TensorError::InvalidBool(byte));
            }
        }
        Ok(Self {
            name: name.into(),
            dtype,
            shape,
            data,
        })
    }

    /// Build a tensor from typed values; the dtype follows `T`.
    pub fn from_slice<T: Element>(
        name: impl Into<String>,
        shape: Vec<usize>,
        values: &[T],
    ) -> Result<Self, TensorError> {
        let mut data = Vec::with_capacity(values.len() * T::DTYPE.byte_size());
        for value in values {
            value.write_le(&mut data);
        }
        Self::new(name, T::DTYPE, shape, data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn element_count(&self) -> usize {
        self.data.len() / self.dtype.byte_size()
    }

    /// Same contents under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Decode the elements as `T`; `T` must match the tensor dtype.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, TensorError> {
        if T::DTYPE != self.dtype {
            return Err(TensorError::DtypeMismatch {
                expected: self.dtype,
                got: T::DTYPE,
            });
        }
        Ok(self
            .data
            .chunks_exact(self.dtype.byte_size())
            .map(T::read_le)
            .collect())
    }

    /// Every element widened to `f64`, whatever the dtype.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let width = self.dtype.byte_size();
        self.data
            .chunks_exact(width)
            .map(|chunk| match self.dtype {
                DType::Bool => bool::read_le(chunk).to_f64(),
                DType::U8 => u8::read_le(chunk).to_f64(),
                DType::U16 => u16::read_le(chunk).to_f64(),
                DType::U32 => u32::read_le(chunk).to_f64(),
                DType::U64 => u64::read_le(chunk).to_f64(),
                DType::I8 => i8::read_le(chunk).to_f64(),
                DType::I16 => i16::read_le(chunk).to_f64(),
                DType::I32 => i32::read_le(chunk).to_f64(),
                DType::I64 => i64::read_le(chunk).to_f64(),
                DType::F16 => f64::from(f16_to_f32(u16::read_le(chunk))),
                DType::F32 => f32::read_le(chunk).to_f64(),
                DType::F64 => f64::read_le(chunk),
            })
            .collect()
    }

    /// Elements rendered for diagnostics, exact for integer dtypes.
    pub fn format_elements(&self) -> Vec<String> {
        let width = self.dtype.byte_size();
        self.data
            .chunks_exact(width)
            .map(|chunk| match self.dtype {
                DType::Bool => bool::read_le(chunk).to_string(),
                DType::U8 => u8::read_le(chunk).to_string(),
                DType::U16 => u16::read_le(chunk).to_string(),
                DType::U32 => u32::read_le(chunk).to_string(),
                DType::U64 => u64::read_le(chunk).to_string(),
                DType::I8 => i8::read_le(chunk).to_string(),
                DType::I16 => i16::read_le(chunk).to_string(),
                DType::I32 => i32::read_le(chunk).to_string(),
                DType::I64 => i64::read_le(chunk).to_string(),
                DType::F16 => f16_to_f32(u16::read_le(chunk)).to_string(),
                DType::F32 => f32::read_le(chunk).to_string(),
                DType::F64 => f64::read_le(chunk).to_string(),
            })
            .collect()
    }
}

/// IEEE 754 binary16 bits to `f32`.
pub fn f16_to_f32(bits: u16) -> f32 {
    let sign = u32::from(bits >> 15) << 31;
    let exponent = u32::from((bits >> 10) & 0x1f);
    let mantissa = u32::from(bits & 0x3ff);

    let magnitude = match (exponent, mantissa) {
        (0, 0) => 0,
        (0, _) => {
            // Subnormal: renormalize into an f32 exponent.
            let shift = mantissa.leading_zeros() - 21;
            let mantissa = (mantissa << shift) & 0x3ff;
            ((127 - 15 + 1 - shift) << 23) | (mantissa << 13)
        }
        (0x1f, 0) => 0x7f80_0000,
        (0x1f, _) => 0x7fc0_0000 | (mantissa << 13),
        _ => ((exponent + 127 - 15) << 23) | (mantissa << 13),
    };
    f32::from_bits(sign | magnitude)
}
